use super::haversine::haversine_m;

/// Two candidate projections closer than this are considered equally near.
const TIE_EPSILON_M: f64 = 1e-6;

/// A route polyline with precomputed arc lengths.
///
/// Points are (latitude, longitude) tuples. The geometry always has at least
/// two points and a positive total length.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteGeometry {
    points: Vec<(f64, f64)>,
    /// Arc length from the first point to each point, in metres.
    cumulative_m: Vec<f64>,
}

/// Nearest point on a route to some raw coordinate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projection {
    /// Snapped (lat, lng) on the polyline.
    pub point: (f64, f64),
    /// Index of the chosen segment (segment `i` runs from point `i` to `i + 1`).
    pub segment: usize,
    /// Arc length from the route start to `point`, in metres.
    pub arc_m: f64,
    /// `arc_m` normalised by the total route length.
    pub progress: f64,
    /// Distance from the raw coordinate to `point`, in metres.
    pub distance_m: f64,
}

impl RouteGeometry {
    /// Builds the geometry, or `None` when it has fewer than two points or
    /// zero length.
    pub fn new(points: Vec<(f64, f64)>) -> Option<Self> {
        if points.len() < 2 {
            return None;
        }

        let mut cumulative_m = Vec::with_capacity(points.len());
        let mut total = 0.0;
        cumulative_m.push(total);
        for pair in points.windows(2) {
            total += haversine_m(pair[0], pair[1]);
            cumulative_m.push(total);
        }

        if !(total > 0.0) {
            return None;
        }

        Some(Self {
            points,
            cumulative_m,
        })
    }

    pub fn points(&self) -> &[(f64, f64)] {
        &self.points
    }

    pub fn total_length_m(&self) -> f64 {
        self.cumulative_m[self.cumulative_m.len() - 1]
    }

    pub fn segment_count(&self) -> usize {
        self.points.len() - 1
    }

    /// Projects `point` onto every segment and keeps the nearest projection.
    ///
    /// Equally near segments resolve to the one furthest along the route.
    pub fn project(&self, point: (f64, f64)) -> Projection {
        let mut best: Option<Projection> = None;

        for segment in 0..self.segment_count() {
            let candidate = self.project_onto(segment, point);
            best = match best {
                Some(current) if candidate.distance_m > current.distance_m + TIE_EPSILON_M => {
                    Some(current)
                }
                _ => Some(candidate),
            };
        }

        best.unwrap_or_else(|| self.project_onto(0, point))
    }

    /// Nearest projection at or after `min_arc_m` along the route.
    ///
    /// Equally near candidates resolve to the earliest one, so a point on a
    /// street the route passes twice lands on the first pass after
    /// `min_arc_m`. When nothing lies that far along, this is [`project`].
    /// Used to place stops in visiting order.
    ///
    /// [`project`]: Self::project
    pub fn project_from(&self, point: (f64, f64), min_arc_m: f64) -> Projection {
        let mut best: Option<Projection> = None;

        for segment in 0..self.segment_count() {
            let candidate = self.project_onto(segment, point);
            if candidate.arc_m + TIE_EPSILON_M < min_arc_m {
                continue;
            }
            best = match best {
                Some(current) if candidate.distance_m + TIE_EPSILON_M >= current.distance_m => {
                    Some(current)
                }
                _ => Some(candidate),
            };
        }

        best.unwrap_or_else(|| self.project(point))
    }

    fn project_onto(&self, segment: usize, point: (f64, f64)) -> Projection {
        let (start, end) = (self.points[segment], self.points[segment + 1]);
        let snapped = project_onto_segment(point, start, end);

        let segment_len = self.cumulative_m[segment + 1] - self.cumulative_m[segment];
        let offset = haversine_m(start, snapped).min(segment_len);
        let arc_m = self.cumulative_m[segment] + offset;

        Projection {
            point: snapped,
            segment,
            arc_m,
            progress: (arc_m / self.total_length_m()).clamp(0.0, 1.0),
            distance_m: haversine_m(point, snapped),
        }
    }
}

/// Perpendicular projection of `point` onto the segment `start..end`, clamped
/// to the endpoints.
///
/// Works in a local equirectangular frame centred on `point`, which is
/// accurate for the short segments of a campus route.
fn project_onto_segment(point: (f64, f64), start: (f64, f64), end: (f64, f64)) -> (f64, f64) {
    let lng_scale = point.0.to_radians().cos();

    let ax = (start.1 - point.1) * lng_scale;
    let ay = start.0 - point.0;
    let dx = (end.1 - start.1) * lng_scale;
    let dy = end.0 - start.0;

    let length_sq = dx * dx + dy * dy;
    if length_sq == 0.0 {
        return start;
    }

    // t = (p - a) . (b - a) / |b - a|^2, with p at the origin
    let t = ((-ax) * dx + (-ay) * dy) / length_sq;
    let t = t.clamp(0.0, 1.0);

    (
        start.0 + t * (end.0 - start.0),
        start.1 + t * (end.1 - start.1),
    )
}
