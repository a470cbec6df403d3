use axum::{extract::State, response::IntoResponse};
use chrono::{SecondsFormat, Utc};

use crate::web::auth::AppState;

use super::templates::{DashboardTemplate, VehicleRow};

/// Public status page: vehicle labels, route progress and next stop.
///
/// Served without a token, like a departure board. Raw coordinates and
/// history stay behind the authenticated JSON API.
pub async fn dashboard(State(state): State<AppState>) -> impl IntoResponse {
    let now = Utc::now();
    let latest = state.pipeline.latest();

    let vehicles = state
        .network
        .vehicles()
        .into_iter()
        .map(|vehicle| {
            let position = latest.get(&vehicle.id);
            let route = vehicle
                .route_id
                .as_deref()
                .and_then(|id| state.network.route(id));

            let next_stop = match (&position, route) {
                (Some(p), Some(r)) => state
                    .eta
                    .estimate(p, r, now)
                    .into_iter()
                    .next()
                    .map(|e| {
                        let minutes = (e.estimated_arrival - now).num_seconds().max(0) / 60;
                        format!("{} in {} min", e.stop_name, minutes)
                    }),
                _ => None,
            };

            VehicleRow {
                label: vehicle.label.clone(),
                route: route
                    .map(|r| r.short_name.clone())
                    .unwrap_or_else(|| "-".into()),
                last_seen: position
                    .as_ref()
                    .map(|p| p.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true))
                    .unwrap_or_else(|| "never".into()),
                progress: position
                    .as_ref()
                    .and_then(|p| p.route_progress)
                    .map(|f| format!("{:.0}%", f * 100.0))
                    .unwrap_or_else(|| "-".into()),
                next_stop: next_stop.unwrap_or_else(|| "-".into()),
                low_confidence: position.as_ref().is_some_and(|p| p.low_confidence),
            }
        })
        .collect();

    DashboardTemplate {
        generated_at: now.to_rfc3339_opts(SecondsFormat::Secs, true),
        route_count: state.network.routes().len(),
        driver_count: state.network.driver_count(),
        subscriber_count: state.pipeline.distributor().subscriber_count(),
        vehicles,
    }
}
