pub mod api;
pub mod config;
pub mod infrastructure;
pub mod models;
pub mod services;
pub mod utils;

use crate::config::RelayConfig;
use crate::services::cloud_providers::DriveProvider;
use crate::services::progress_channel::ProgressChannel;
use crate::services::relay_service::RelayService;
use crate::services::resumable::ResumableUploader;
use crate::services::storage::LocalStorage;
use crate::services::upload_dispatcher::UploadDispatcher;
use axum::{
    Router,
    http::HeaderValue,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::relay::fetch_and_relay,
        api::handlers::progress::progress_events,
        api::handlers::health::health_check,
    ),
    components(
        schemas(
            api::handlers::relay::RelayRequestBody,
            api::handlers::health::HealthResponse,
            models::RelayResult,
            models::TokenBody,
            models::Protocol,
        )
    ),
    tags(
        (name = "relay", description = "Remote file relay endpoints"),
        (name = "system", description = "Service status")
    )
)]
pub struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub relay: Arc<RelayService>,
    pub progress: Arc<ProgressChannel>,
    pub storage: LocalStorage,
    pub config: RelayConfig,
}

impl AppState {
    /// Wires the relay pipeline around a provider client and an uploader.
    pub fn new(
        config: RelayConfig,
        storage: LocalStorage,
        provider: Arc<dyn DriveProvider>,
        uploader: Arc<dyn ResumableUploader>,
        http: reqwest::Client,
    ) -> Self {
        let progress = Arc::new(ProgressChannel::new(config.progress_ttl()));
        let dispatcher = UploadDispatcher::new(
            http,
            uploader,
            progress.clone(),
            storage.clone(),
            config.delete_after_upload,
        );
        let relay = Arc::new(RelayService::new(provider, storage.clone(), dispatcher));

        Self {
            relay,
            progress,
            storage,
            config,
        }
    }
}

pub fn create_app(state: AppState) -> Router {
    let origins: Vec<HeaderValue> = state
        .config
        .allowed_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(api::handlers::health::health_check))
        .route("/google/get", post(api::handlers::relay::fetch_and_relay))
        .route(
            "/google/progress/:token",
            get(api::handlers::progress::progress_events),
        )
        .layer(
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(origins))
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
