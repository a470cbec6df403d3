use axum::{body::Bytes, extract::State, Json};

use crate::ingest::{BatchRequest, BatchResponse};
use crate::web::api::error::{ApiError, ApiResult, ErrorResponse};
use crate::web::auth::{require_permission, AppState, AuthenticatedUser};
use crate::web::config::Permission;

const INVALID_PINGS: &str = "Invalid pings data";

#[utoipa::path(
    post,
    path = "/api/ingest",
    request_body = BatchRequest,
    security(
        ("api_key" = [])
    ),
    responses(
        (status = 200, description = "Batch processed, possibly partially", body = BatchResponse),
        (status = 400, description = "Body is not a non-empty pings list", body = ErrorResponse),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse),
        (status = 403, description = "Not an active driver with an assigned vehicle", body = ErrorResponse)
    ),
    tag = "ingest"
)]
pub async fn ingest(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    body: Bytes,
) -> ApiResult<Json<BatchResponse>> {
    let request: BatchRequest = serde_json::from_slice(&body).map_err(|e| {
        log::debug!("Malformed ingest body from {}: {}", user.user_id, e);
        ApiError::BadRequest(INVALID_PINGS)
    })?;
    if request.pings.is_empty() {
        return Err(ApiError::BadRequest(INVALID_PINGS));
    }

    require_permission(&user, Permission::Ingest).map_err(|_| ApiError::NotAssigned)?;
    let assignment = state
        .network
        .assignment_for(&user.user_id)
        .ok_or(ApiError::NotAssigned)?;

    let response = state.pipeline.ingest(&assignment, request.pings).await;
    Ok(Json(response))
}
