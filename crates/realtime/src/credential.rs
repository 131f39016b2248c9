//! Ephemeral credential retrieval.
//!
//! The backend mints a short-lived client secret so the long-lived API key
//! never reaches the client. The secret is used once to negotiate the
//! transport and discarded with the [`Credential`] afterwards.

use crate::error::RealtimeError;
use secrecy::SecretString;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// How long a credential request may take before the attempt fails.
const CREDENTIAL_TIMEOUT: Duration = Duration::from_secs(10);

/// A short-lived bearer secret, plus an optional connection URL override.
#[derive(Debug)]
pub struct Credential {
    pub client_secret: SecretString,
    pub base_url: Option<String>,
}

#[derive(Deserialize)]
struct TokenResponse {
    #[serde(default)]
    client_secret: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

/// Fetches ephemeral credentials from the backend token endpoint.
pub struct CredentialFetcher {
    http: reqwest::Client,
    endpoint: String,
}

impl CredentialFetcher {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }

    /// Requests one credential. Any failure (non-success status, timeout,
    /// missing or empty `client_secret` field) is terminal for this
    /// attempt; there is no retry.
    pub async fn fetch(&self) -> Result<Credential, RealtimeError> {
        debug!(endpoint = %self.endpoint, "fetching ephemeral credential");
        let response = self
            .http
            .post(&self.endpoint)
            .timeout(CREDENTIAL_TIMEOUT)
            .send()
            .await
            .map_err(|e| {
                RealtimeError::Credential(format!("request to {} failed: {e}", self.endpoint))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RealtimeError::Credential(format!(
                "token endpoint returned {status}: {body}"
            )));
        }

        let body: TokenResponse = response.json().await.map_err(|e| {
            RealtimeError::Credential(format!("unparsable token response: {e}"))
        })?;
        match body.client_secret {
            Some(secret) if !secret.is_empty() => Ok(Credential {
                client_secret: secret.into(),
                base_url: body.url,
            }),
            _ => Err(RealtimeError::Credential(
                "token response is missing the client_secret field".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher_against(server: &MockServer) -> CredentialFetcher {
        CredentialFetcher::new(format!("{}/api/realtime-session", server.uri()))
    }

    #[tokio::test]
    async fn parses_secret_and_optional_url() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/realtime-session"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "client_secret": "ek_test_123",
                "url": "wss://example.test/v1/realtime"
            })))
            .mount(&server)
            .await;

        let credential = fetcher_against(&server).fetch().await.unwrap();
        assert_eq!(credential.client_secret.expose_secret(), "ek_test_123");
        assert_eq!(
            credential.base_url.as_deref(),
            Some("wss://example.test/v1/realtime")
        );
    }

    #[tokio::test]
    async fn url_is_optional() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/realtime-session"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"client_secret": "ek_test_123"})),
            )
            .mount(&server)
            .await;

        let credential = fetcher_against(&server).fetch().await.unwrap();
        assert!(credential.base_url.is_none());
    }

    #[tokio::test]
    async fn non_success_status_is_a_credential_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/realtime-session"))
            .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
            .mount(&server)
            .await;

        let error = fetcher_against(&server).fetch().await.unwrap_err();
        match error {
            RealtimeError::Credential(message) => {
                assert!(message.contains("500"), "message: {message}");
                assert!(message.contains("upstream exploded"), "message: {message}");
            }
            other => panic!("expected credential error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_secret_field_is_a_credential_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/realtime-session"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&server)
            .await;

        let error = fetcher_against(&server).fetch().await.unwrap_err();
        assert!(matches!(error, RealtimeError::Credential(_)));
    }

    #[tokio::test]
    async fn empty_secret_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/realtime-session"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"client_secret": ""})),
            )
            .mount(&server)
            .await;

        let error = fetcher_against(&server).fetch().await.unwrap_err();
        assert!(matches!(error, RealtimeError::Credential(_)));
    }
}
