use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use crate::store::StoreError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Invalid ping data - missing required fields")]
    MissingFields,
    #[error("Invalid coordinates")]
    Coordinates,
    #[error("Invalid timestamp")]
    Timestamp,
}

/// Why a single ping in a batch was not processed.
#[derive(Debug, Error)]
pub enum ItemError {
    #[error("Ping for vehicle {0} rejected - not assigned to driver")]
    Admission(String),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Failed to insert ping: {0}")]
    Persistence(#[from] StoreError),
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, strum_macros::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RejectionReason {
    Admission,
    Validation,
    Persistence,
}

impl RejectionReason {
    /// Transient rejections are worth sending again; the rest never succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RejectionReason::Persistence)
    }
}

impl ItemError {
    pub fn reason(&self) -> RejectionReason {
        match self {
            ItemError::Admission(_) => RejectionReason::Admission,
            ItemError::Validation(_) => RejectionReason::Validation,
            ItemError::Persistence(_) => RejectionReason::Persistence,
        }
    }
}
