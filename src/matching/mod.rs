mod geometry;
mod haversine;
mod matcher;

pub use geometry::{Projection, RouteGeometry};
pub use haversine::{haversine_m, EARTH_RADIUS_M};
pub use matcher::{MapMatcher, MatchError, Snapped, DEFAULT_TOLERANCE_M};
