use std::convert::Infallible;

use axum::{
    extract::{Query, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::{self, Stream};
use serde::Deserialize;
use utoipa::IntoParams;

use crate::realtime::{Signal, VehicleFilter};
use crate::web::api::error::{ApiResult, ErrorResponse};
use crate::web::auth::{require_permission, AppState, AuthenticatedUser};
use crate::web::config::Permission;

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct RealtimeQuery {
    /// Comma-separated vehicle IDs. All vehicles when omitted.
    pub vehicles: Option<String>,
}

#[utoipa::path(
    get,
    path = "/api/realtime",
    params(RealtimeQuery),
    security(
        ("api_key" = [])
    ),
    responses(
        (status = 200, description = "Server-sent stream of position change signals", body = Signal, content_type = "text/event-stream"),
        (status = 401, description = "Unauthorized", body = ErrorResponse)
    ),
    tag = "realtime"
)]
pub async fn subscribe(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<RealtimeQuery>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    require_permission(&user, Permission::ReadPositions)?;

    let filter = VehicleFilter::from_list(query.vehicles.as_deref());
    let subscription = state.pipeline.distributor().subscribe(filter);
    log::debug!("{} subscribed to realtime signals", user.user_id);

    let events = stream::unfold(subscription, |mut subscription| async move {
        let signal = subscription.recv().await?;
        Some((Ok::<_, Infallible>(to_event(&signal)), subscription))
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

fn to_event(signal: &Signal) -> Event {
    let data = serde_json::to_string(signal).unwrap_or_else(|e| {
        log::error!("Could not encode realtime signal: {}", e);
        String::from("{}")
    });
    Event::default().event(signal.event_name()).data(data)
}
