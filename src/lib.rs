pub mod api;
pub mod config;
pub mod infrastructure;
pub mod models;
pub mod services;

use crate::services::transfer::TransferService;
use axum::{Router, middleware::from_fn, routing::get};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::transfer::transfer_video,
        api::handlers::health::health_check,
    ),
    components(
        schemas(
            models::TransferResponse,
            api::handlers::health::HealthResponse,
        )
    ),
    tags(
        (name = "transfer", description = "Relay a remote video into the bucket"),
        (name = "system", description = "Service status")
    )
)]
pub struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub transfer: Arc<TransferService>,
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(api::handlers::health::health_check))
        .route("/transfer", get(api::handlers::transfer::transfer_video))
        .layer(from_fn(api::middleware::metrics::metrics_middleware))
        .layer(from_fn(api::middleware::request_id::request_id_middleware))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
