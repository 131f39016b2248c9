//! Axum Handlers for the Token API
//!
//! The single job of this service is to exchange the long-lived provider
//! API key for a short-lived client secret that is safe to hand to a
//! browser. The long-lived key never appears in a response.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use std::sync::Arc;
use tracing::error;

use crate::{
    models::{ErrorResponse, SessionTokenResponse, UpstreamClientSecret},
    state::AppState,
};

pub enum ApiError {
    UpstreamFailure(String),
    InternalServerError(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::UpstreamFailure(message) => {
                (StatusCode::BAD_GATEWAY, Json(ErrorResponse { message })).into_response()
            }
            ApiError::InternalServerError(err) => {
                error!("Internal Server Error: {:?}", err);
                let message = "An internal server error occurred.".to_string();
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse { message }),
                )
                    .into_response()
            }
        }
    }
}

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::InternalServerError(err.into())
    }
}

/// Mint a short-lived client secret for one realtime voice session.
#[utoipa::path(
    post,
    path = "/api/realtime-session",
    responses(
        (status = 200, description = "Ephemeral client secret minted", body = SessionTokenResponse),
        (status = 502, description = "The voice provider rejected the request", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn mint_realtime_session(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let url = format!(
        "{}/v1/realtime/client_secrets",
        state.config.openai_base_url
    );

    // Minimal body: only the session type and model are decided here. All
    // other session configuration (voice, turn detection) belongs to the
    // client that redeems the secret.
    let response = state
        .http
        .post(&url)
        .bearer_auth(&state.config.openai_api_key)
        .json(&serde_json::json!({
            "session": {
                "type": "realtime",
                "model": state.config.realtime_model,
            }
        }))
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        error!(%status, "client secret request rejected: {body}");
        return Err(ApiError::UpstreamFailure(
            "Failed to generate an ephemeral client key".to_string(),
        ));
    }

    let secret: UpstreamClientSecret = response.json().await?;
    Ok((
        StatusCode::OK,
        Json(SessionTokenResponse {
            client_secret: secret.value,
        }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use axum::body::to_bytes;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn state_against(base_url: String) -> Arc<AppState> {
        Arc::new(AppState {
            http: reqwest::Client::new(),
            config: Arc::new(Config {
                bind_address: "127.0.0.1:0".parse().unwrap(),
                openai_api_key: "sk-test".to_string(),
                openai_base_url: base_url,
                realtime_model: "gpt-4o-mini-realtime-preview".to_string(),
                log_level: tracing::Level::INFO,
            }),
        })
    }

    #[tokio::test]
    async fn mints_a_client_secret() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/realtime/client_secrets"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(serde_json::json!({
                "session": {"type": "realtime", "model": "gpt-4o-mini-realtime-preview"}
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"value": "ek_abc123"})),
            )
            .mount(&server)
            .await;

        let result = mint_realtime_session(State(state_against(server.uri()))).await;
        let response = result.map_err(|_| "handler returned an error").unwrap();
        let response = response.into_response();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: SessionTokenResponse = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body.client_secret, "ek_abc123");
    }

    #[tokio::test]
    async fn upstream_rejection_maps_to_bad_gateway() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/realtime/client_secrets"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
            .mount(&server)
            .await;

        let result = mint_realtime_session(State(state_against(server.uri()))).await;
        let error = match result {
            Ok(_) => panic!("expected an upstream failure"),
            Err(error) => error,
        };
        let response = error.into_response();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: ErrorResponse = serde_json::from_slice(&bytes).unwrap();
        // The upstream body must not leak to the caller.
        assert!(!body.message.contains("invalid api key"));
    }

    #[tokio::test]
    async fn unreachable_upstream_is_an_internal_error() {
        // Nothing is listening on this port.
        let result =
            mint_realtime_session(State(state_against("http://127.0.0.1:9".to_string()))).await;
        let error = match result {
            Ok(_) => panic!("expected an error"),
            Err(error) => error,
        };

        assert_eq!(
            error.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
