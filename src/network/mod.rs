mod error;
mod loader;
mod roles;
mod types;

pub use error::ReferenceError;
pub use loader::{Assignment, Network};
pub use roles::{Role, RoleRegistry};
pub use types::{Driver, Route, Stop, Vehicle};
