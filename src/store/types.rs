use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// A GPS sample as recorded in history. Never mutated once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RawPing {
    pub id: Uuid,
    pub vehicle_id: String,
    pub lat: f64,
    pub lng: f64,
    /// Capture time on the device.
    pub timestamp: DateTime<Utc>,
    pub speed: Option<f64>,
    pub heading: Option<f64>,
    pub accuracy: Option<f64>,
    pub battery: Option<f64>,
    pub received_at: DateTime<Utc>,
}

/// Current matched position of a vehicle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SnappedPosition {
    pub vehicle_id: String,
    pub lat: f64,
    pub lng: f64,
    pub snapped_lat: f64,
    pub snapped_lng: f64,
    pub route_id: Option<String>,
    /// Progress fraction along `route_id`; absent for unmatched vehicles.
    pub route_progress: Option<f64>,
    pub distance_from_route_m: Option<f64>,
    pub low_confidence: bool,
    /// Capture time of the ping this position was derived from.
    pub timestamp: DateTime<Utc>,
    pub speed: Option<f64>,
    pub heading: Option<f64>,
    pub accuracy: Option<f64>,
    pub battery: Option<f64>,
    pub updated_at: DateTime<Utc>,
}
