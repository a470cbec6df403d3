use utoipa::{
    openapi::security::{Http, HttpAuthScheme, SecurityScheme},
    Modify, OpenApi,
};

use super::api::error::ErrorResponse;
use super::api::vehicles::VehicleStatus;

#[derive(OpenApi)]
#[openapi(
    paths(
        super::api::ingest::ingest,
        super::api::vehicles::list_vehicles,
        super::api::vehicles::get_vehicle,
        super::api::vehicles::vehicle_etas,
        super::api::vehicles::vehicle_pings,
        super::api::vehicles::list_etas,
        super::api::realtime::subscribe,
    ),
    components(
        schemas(
            ErrorResponse,
            VehicleStatus,
            crate::ingest::BatchRequest,
            crate::ingest::BatchResponse,
            crate::ingest::PingPayload,
            crate::ingest::Rejection,
            crate::ingest::RejectionReason,
            crate::store::SnappedPosition,
            crate::store::RawPing,
            crate::eta::EtaEstimate,
            crate::realtime::Signal,
        )
    ),
    modifiers(&SecurityAddon),
    info(
        title = "Shuttle-O-Mat API",
        description = "Shuttle telemetry ingestion, positions and arrival estimates",
        version = "0.1.0"
    ),
    tags(
        (name = "ingest", description = "Driver telemetry ingestion"),
        (name = "vehicles", description = "Latest positions, history and ETAs"),
        (name = "realtime", description = "Position change notifications")
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "api_key",
                SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
            );
        }
    }
}
