use axum::{routing::get, routing::post, Router};
use std::sync::Arc;
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::eta::EtaEngine;
use crate::ingest::Pipeline;
use crate::matching::MapMatcher;
use crate::network::{Network, ReferenceError, RoleRegistry};
use crate::realtime::Distributor;
use crate::store::{JsonlHistory, MemoryHistory, PingHistory, StoreError};

use super::api::ingest as ingest_handlers;
use super::api::realtime as realtime_handlers;
use super::api::vehicles as vehicle_handlers;
use super::api_doc::ApiDoc;
use super::auth::AppState;
use super::config::{Config, ConfigError};
use super::ui::handlers as ui_handlers;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Failed to load reference data: {0}")]
    Reference(#[from] ReferenceError),
    #[error("Failed to open ping history: {0}")]
    Store(#[from] StoreError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Load reference data and wire up the pipeline described by `config`.
pub fn build_state(config: Config) -> Result<AppState, ServerError> {
    let network = Arc::new(Network::load(&config.reference.path)?);

    let history: Arc<dyn PingHistory> = match &config.store.history_path {
        Some(path) => Arc::new(JsonlHistory::open(path)?),
        None => {
            log::info!("Keeping ping history in memory");
            Arc::new(MemoryHistory::new())
        }
    };

    let pipeline = Pipeline::new(
        Arc::clone(&network),
        history,
        MapMatcher::new(config.pipeline.match_tolerance_m),
        Distributor::new(config.realtime.capacity),
        config.persist_timeout()?,
    );
    let restored = pipeline.restore()?;
    if restored > 0 {
        log::info!("Restored latest positions for {} vehicles from history", restored);
    }

    Ok(AppState {
        eta: EtaEngine::new(config.pipeline.default_speed_mps),
        config: Arc::new(config),
        network,
        roles: Arc::new(RoleRegistry::new()),
        pipeline,
    })
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // UI routes
        .route("/", get(ui_handlers::dashboard))
        // Ingestion
        .route("/api/ingest", post(ingest_handlers::ingest))
        // Read side
        .route("/api/vehicles", get(vehicle_handlers::list_vehicles))
        .route("/api/vehicles/{id}", get(vehicle_handlers::get_vehicle))
        .route(
            "/api/vehicles/{id}/etas",
            get(vehicle_handlers::vehicle_etas),
        )
        .route(
            "/api/vehicles/{id}/pings",
            get(vehicle_handlers::vehicle_pings),
        )
        .route("/api/etas", get(vehicle_handlers::list_etas))
        .route("/api/realtime", get(realtime_handlers::subscribe))
        // OpenAPI / Swagger
        .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()))
        // Middleware
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run_server(config: Config) -> Result<(), ServerError> {
    let bind_addr = config.web.bind.clone();
    let state = build_state(config)?;
    let app = router(state);

    log::info!("Starting server on {}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
