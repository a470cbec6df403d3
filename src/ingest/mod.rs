mod error;
mod pipeline;
mod types;

pub use error::{ItemError, RejectionReason, ValidationError};
pub use pipeline::{validate, Pipeline, ValidPing, DEFAULT_PERSIST_TIMEOUT};
pub use types::{BatchRequest, BatchResponse, PingPayload, Rejection};
