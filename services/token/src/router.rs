//! Axum Router Configuration
//!
//! Defines the HTTP routing for the token service plus the OpenAPI
//! documentation endpoint.

use crate::{
    handlers,
    models::{ErrorResponse, SessionTokenResponse},
    state::AppState,
};

use axum::{Router, routing::post};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(handlers::mint_realtime_session),
    components(schemas(SessionTokenResponse, ErrorResponse)),
    tags(
        (name = "Voicebar Token API", description = "Ephemeral credential minting for realtime voice sessions")
    )
)]
pub struct ApiDoc;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    let api_router = Router::new()
        .route(
            "/api/realtime-session",
            post(handlers::mint_realtime_session),
        )
        .with_state(app_state);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(api_router)
}
