use thiserror::Error;

use super::geometry::RouteGeometry;

/// Default distance beyond which a match is flagged low-confidence.
pub const DEFAULT_TOLERANCE_M: f64 = 50.0;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum MatchError {
    #[error("vehicle has no assigned route")]
    NoRoute,
}

/// Outcome of snapping a raw coordinate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Snapped {
    pub point: (f64, f64),
    /// Route progress in [0, 1]; `None` when the vehicle could not be matched.
    pub progress: Option<f64>,
    pub distance_m: Option<f64>,
    pub low_confidence: bool,
}

impl Snapped {
    /// Position that mirrors the raw coordinate, used when no route applies.
    pub fn unmatched(raw: (f64, f64)) -> Self {
        Self {
            point: raw,
            progress: None,
            distance_m: None,
            low_confidence: false,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MapMatcher {
    tolerance_m: f64,
}

impl Default for MapMatcher {
    fn default() -> Self {
        Self {
            tolerance_m: DEFAULT_TOLERANCE_M,
        }
    }
}

impl MapMatcher {
    pub fn new(tolerance_m: f64) -> Self {
        Self { tolerance_m }
    }

    pub fn tolerance_m(&self) -> f64 {
        self.tolerance_m
    }

    /// Snaps `raw` onto `route`.
    ///
    /// Points outside the tolerance are still matched to the nearest segment
    /// and flagged low-confidence.
    pub fn snap(
        &self,
        raw: (f64, f64),
        route: Option<&RouteGeometry>,
    ) -> Result<Snapped, MatchError> {
        let route = route.ok_or(MatchError::NoRoute)?;
        let projection = route.project(raw);
        let low_confidence = projection.distance_m > self.tolerance_m;

        if low_confidence {
            log::warn!(
                "Low-confidence match: ({:.6}, {:.6}) is {:.1}m from route (tolerance {:.1}m)",
                raw.0,
                raw.1,
                projection.distance_m,
                self.tolerance_m
            );
        }

        Ok(Snapped {
            point: projection.point,
            progress: Some(projection.progress),
            distance_m: Some(projection.distance_m),
            low_confidence,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn straight() -> RouteGeometry {
        RouteGeometry::new(vec![(40.0, -88.0), (40.0, -87.99)]).unwrap()
    }

    #[test]
    fn test_no_route_is_soft_error() {
        let matcher = MapMatcher::default();
        assert_eq!(matcher.snap((40.0, -88.0), None), Err(MatchError::NoRoute));

        let fallback = Snapped::unmatched((40.0, -88.0));
        assert_eq!(fallback.point, (40.0, -88.0));
        assert!(fallback.progress.is_none());
    }

    #[test]
    fn test_within_tolerance() {
        let matcher = MapMatcher::new(50.0);
        let route = straight();

        // ~11m off the route
        let snapped = matcher.snap((40.0001, -87.995), Some(&route)).unwrap();

        assert!(!snapped.low_confidence);
        assert!(snapped.distance_m.unwrap() <= matcher.tolerance_m());
        assert!((snapped.progress.unwrap() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_far_point_is_matched_but_flagged() {
        let matcher = MapMatcher::new(50.0);
        let route = straight();

        // ~1.1km off the route
        let snapped = matcher.snap((40.01, -87.995), Some(&route)).unwrap();

        assert!(snapped.low_confidence);
        assert!(snapped.distance_m.unwrap() > matcher.tolerance_m());
        assert!((snapped.point.0 - 40.0).abs() < 1e-9);
    }
}
