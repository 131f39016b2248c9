//! API Models
//!
//! Wire shapes for the mint endpoint and for generating OpenAPI
//! documentation with `utoipa`.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// What the browser client receives: the ephemeral secret it uses to
/// negotiate its realtime connection.
#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct SessionTokenResponse {
    #[schema(example = "ek_abc123")]
    pub client_secret: String,
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct ErrorResponse {
    pub message: String,
}

/// Shape of the provider's `/v1/realtime/client_secrets` response; only
/// the secret value is consumed.
#[derive(Deserialize, Debug)]
pub struct UpstreamClientSecret {
    pub value: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_token_response_serialization() {
        let response = SessionTokenResponse {
            client_secret: "ek_abc123".to_string(),
        };

        let json = serde_json::to_string(&response).unwrap();
        assert_eq!(json, r#"{"client_secret":"ek_abc123"}"#);
    }

    #[test]
    fn test_error_response_serialization() {
        let error = ErrorResponse {
            message: "Failed to generate an ephemeral client key".to_string(),
        };

        let json = serde_json::to_string(&error).unwrap();
        assert!(json.contains("Failed to generate an ephemeral client key"));
    }

    #[test]
    fn test_upstream_client_secret_deserialization() {
        let json = r#"{"value":"ek_abc123","expires_at":1735689600}"#;
        let secret: UpstreamClientSecret = serde_json::from_str(json).unwrap();

        assert_eq!(secret.value, "ek_abc123");
    }

    #[test]
    fn test_upstream_client_secret_missing_value() {
        let result: Result<UpstreamClientSecret, _> = serde_json::from_str("{}");
        assert!(result.is_err());
    }
}
