//! Arrival predictions from matched route progress.
//!
//! Estimates are derived on every query from the latest position and the
//! route's stops; nothing here is stored.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::network::Route;
use crate::store::SnappedPosition;

/// Cruise speed assumed when a vehicle reports none, in m/s (~18 km/h).
pub const DEFAULT_CRUISE_SPEED_MPS: f64 = 5.0;

/// Reported speeds below this (m/s) count as stopped and use the cruise speed.
pub const MIN_MOVING_SPEED_MPS: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct EtaEstimate {
    pub vehicle_id: String,
    pub stop_id: String,
    pub stop_name: String,
    pub sequence: u32,
    pub estimated_arrival: DateTime<Utc>,
    pub distance_m: f64,
    /// The stop is behind the vehicle and reached on the next lap.
    pub next_lap: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct EtaEngine {
    default_speed_mps: f64,
}

impl Default for EtaEngine {
    fn default() -> Self {
        Self {
            default_speed_mps: DEFAULT_CRUISE_SPEED_MPS,
        }
    }
}

impl EtaEngine {
    /// Non-positive or non-finite speeds fall back to
    /// [`DEFAULT_CRUISE_SPEED_MPS`].
    pub fn new(default_speed_mps: f64) -> Self {
        if default_speed_mps.is_finite() && default_speed_mps > 0.0 {
            Self { default_speed_mps }
        } else {
            Self::default()
        }
    }

    pub fn default_speed_mps(&self) -> f64 {
        self.default_speed_mps
    }

    /// Speed used for a position: its reported speed when the vehicle is
    /// moving, otherwise the cruise speed.
    pub fn speed_for(&self, position: &SnappedPosition) -> f64 {
        position
            .speed
            .filter(|s| s.is_finite() && *s >= MIN_MOVING_SPEED_MPS)
            .unwrap_or(self.default_speed_mps)
    }

    /// Arrival estimates at the downstream stops of `route`, soonest first.
    ///
    /// Returns nothing for unmatched positions. Stops behind the vehicle are
    /// only included on loop routes.
    pub fn estimate(
        &self,
        position: &SnappedPosition,
        route: &Route,
        now: DateTime<Utc>,
    ) -> Vec<EtaEstimate> {
        let Some(progress) = position.route_progress else {
            return Vec::new();
        };
        if position.route_id.as_deref() != Some(route.id.as_str()) {
            return Vec::new();
        }

        let length = route.length_m();
        let speed = self.speed_for(position);

        let mut estimates: Vec<EtaEstimate> = route
            .stops
            .iter()
            .filter_map(|stop| {
                let (fraction, next_lap) = if stop.progress >= progress {
                    (stop.progress - progress, false)
                } else if route.is_loop {
                    (1.0 - progress + stop.progress, true)
                } else {
                    return None;
                };

                let distance_m = fraction * length;
                let Some(estimated_arrival) = arrival_after(now, distance_m / speed) else {
                    log::warn!(
                        "Skipping ETA for vehicle {} at stop {}: {:.0} m at {} m/s is out of range",
                        position.vehicle_id,
                        stop.id,
                        distance_m,
                        speed
                    );
                    return None;
                };

                Some(EtaEstimate {
                    vehicle_id: position.vehicle_id.clone(),
                    stop_id: stop.id.clone(),
                    stop_name: stop.name.clone(),
                    sequence: stop.sequence,
                    estimated_arrival,
                    distance_m,
                    next_lap,
                })
            })
            .collect();

        estimates.sort_by_key(|e| (e.estimated_arrival, e.sequence));
        estimates
    }
}

/// `now` plus `seconds` of travel, or `None` when that is not a representable
/// time.
fn arrival_after(now: DateTime<Utc>, seconds: f64) -> Option<DateTime<Utc>> {
    let millis = (seconds * 1000.0).round();
    if !millis.is_finite() || millis.abs() >= i64::MAX as f64 {
        return None;
    }
    now.checked_add_signed(Duration::try_milliseconds(millis as i64)?)
}
