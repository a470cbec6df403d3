use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::error::RejectionReason;

/// A ping as sent by a tracking device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PingPayload {
    #[serde(default)]
    pub vehicle_label: String,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lng: Option<f64>,
    /// Capture time, RFC 3339.
    #[serde(default)]
    pub timestamp: Option<String>,
    /// Metres per second.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    /// Degrees clockwise from north.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading: Option<f64>,
    /// Horizontal accuracy in metres.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
    /// Battery level in percent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub battery: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BatchRequest {
    pub pings: Vec<PingPayload>,
}

/// Outcome for one rejected item, by position in the submitted batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Rejection {
    pub index: usize,
    pub reason: RejectionReason,
    pub retryable: bool,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct BatchResponse {
    pub success: bool,
    pub processed: usize,
    pub total: usize,
    /// Present only when some items were rejected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rejections: Vec<Rejection>,
    pub message: String,
}

impl BatchResponse {
    pub fn new(total: usize, rejections: Vec<Rejection>) -> Self {
        let processed = total - rejections.len();
        let errors = if rejections.is_empty() {
            None
        } else {
            Some(rejections.iter().map(|r| r.message.clone()).collect())
        };

        BatchResponse {
            success: true,
            processed,
            total,
            errors,
            rejections,
            message: format!("Successfully processed {} of {} pings", processed, total),
        }
    }
}
