use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::eta::EtaEstimate;
use crate::store::{RawPing, SnappedPosition};
use crate::web::api::error::{ApiError, ApiResult, ErrorResponse};
use crate::web::auth::{require_permission, AppState, AuthenticatedUser};
use crate::web::config::Permission;

const DEFAULT_PING_LIMIT: usize = 50;
const MAX_PING_LIMIT: usize = 1000;

#[derive(Debug, Serialize, ToSchema)]
pub struct VehicleStatus {
    pub id: String,
    pub label: String,
    pub route_id: Option<String>,
    pub active: bool,
    /// Absent until the vehicle reports its first position.
    pub position: Option<SnappedPosition>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PingsQuery {
    /// Maximum number of pings, newest first.
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct EtasQuery {
    /// Only estimates for this stop.
    pub stop: Option<String>,
}

#[utoipa::path(
    get,
    path = "/api/vehicles",
    security(
        ("api_key" = [])
    ),
    responses(
        (status = 200, description = "All vehicles with their latest position", body = Vec<VehicleStatus>),
        (status = 401, description = "Unauthorized", body = ErrorResponse)
    ),
    tag = "vehicles"
)]
pub async fn list_vehicles(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> ApiResult<Json<Vec<VehicleStatus>>> {
    require_permission(&user, Permission::ReadPositions)?;

    let latest = state.pipeline.latest();
    let vehicles = state
        .network
        .vehicles()
        .into_iter()
        .map(|v| VehicleStatus {
            id: v.id.clone(),
            label: v.label.clone(),
            route_id: v.route_id.clone(),
            active: v.active,
            position: latest.get(&v.id),
        })
        .collect();

    Ok(Json(vehicles))
}

#[utoipa::path(
    get,
    path = "/api/vehicles/{id}",
    params(
        ("id" = String, Path, description = "Vehicle ID")
    ),
    security(
        ("api_key" = [])
    ),
    responses(
        (status = 200, description = "Latest position", body = SnappedPosition),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 404, description = "Unknown vehicle or no position yet", body = ErrorResponse)
    ),
    tag = "vehicles"
)]
pub async fn get_vehicle(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<String>,
) -> ApiResult<Json<SnappedPosition>> {
    require_permission(&user, Permission::ReadPositions)?;
    latest_position(&state, &id).map(Json)
}

#[utoipa::path(
    get,
    path = "/api/vehicles/{id}/etas",
    params(
        ("id" = String, Path, description = "Vehicle ID")
    ),
    security(
        ("api_key" = [])
    ),
    responses(
        (status = 200, description = "Arrival estimates, soonest first", body = Vec<EtaEstimate>),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 404, description = "Unknown vehicle or no position yet", body = ErrorResponse)
    ),
    tag = "vehicles"
)]
pub async fn vehicle_etas(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<EtaEstimate>>> {
    require_permission(&user, Permission::ReadPositions)?;

    let position = latest_position(&state, &id)?;
    Ok(Json(estimates_for(&state, &position)))
}

#[utoipa::path(
    get,
    path = "/api/vehicles/{id}/pings",
    params(
        ("id" = String, Path, description = "Vehicle ID"),
        PingsQuery
    ),
    security(
        ("api_key" = [])
    ),
    responses(
        (status = 200, description = "Raw ping history, newest first", body = Vec<RawPing>),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 404, description = "Unknown vehicle", body = ErrorResponse)
    ),
    tag = "vehicles"
)]
pub async fn vehicle_pings(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<String>,
    Query(query): Query<PingsQuery>,
) -> ApiResult<Json<Vec<RawPing>>> {
    require_permission(&user, Permission::ReadPositions)?;

    if state.network.vehicle(&id).is_none() {
        return Err(ApiError::NotFound("Vehicle not found"));
    }
    let limit = query
        .limit
        .unwrap_or(DEFAULT_PING_LIMIT)
        .min(MAX_PING_LIMIT);

    Ok(Json(state.pipeline.recent(&id, limit).await?))
}

#[utoipa::path(
    get,
    path = "/api/etas",
    params(EtasQuery),
    security(
        ("api_key" = [])
    ),
    responses(
        (status = 200, description = "Estimates for all vehicles, soonest first", body = Vec<EtaEstimate>),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 404, description = "Unknown stop", body = ErrorResponse)
    ),
    tag = "vehicles"
)]
pub async fn list_etas(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<EtasQuery>,
) -> ApiResult<Json<Vec<EtaEstimate>>> {
    require_permission(&user, Permission::ReadPositions)?;

    if let Some(stop) = query.stop.as_deref() {
        let known = state
            .network
            .routes()
            .iter()
            .any(|r| r.stops.iter().any(|s| s.id == stop));
        if !known {
            return Err(ApiError::NotFound("Stop not found"));
        }
    }

    let mut estimates: Vec<EtaEstimate> = state
        .pipeline
        .latest()
        .all()
        .iter()
        .flat_map(|position| estimates_for(&state, position))
        .filter(|e| query.stop.as_deref().is_none_or(|stop| e.stop_id == stop))
        .collect();
    estimates.sort_by(|a, b| {
        a.estimated_arrival
            .cmp(&b.estimated_arrival)
            .then_with(|| a.vehicle_id.cmp(&b.vehicle_id))
    });

    Ok(Json(estimates))
}

fn latest_position(state: &AppState, id: &str) -> ApiResult<SnappedPosition> {
    if state.network.vehicle(id).is_none() {
        return Err(ApiError::NotFound("Vehicle not found"));
    }
    state
        .pipeline
        .latest()
        .get(id)
        .ok_or(ApiError::NotFound("No position recorded"))
}

fn estimates_for(state: &AppState, position: &SnappedPosition) -> Vec<EtaEstimate> {
    position
        .route_id
        .as_deref()
        .and_then(|id| state.network.route(id))
        .map(|route| state.eta.estimate(position, route, Utc::now()))
        .unwrap_or_default()
}
