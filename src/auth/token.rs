use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Successful token endpoint response, with `expires_in` resolved to an
/// absolute expiration time at receipt.
///
/// # Example
/// ```no_run
/// use oidc_session::auth::TokenResponse;
///
/// let response = TokenResponse {
///     token_type: Some("bearer".to_string()),
///     access_token: Some("access".to_string()),
///     access_token_expiration_time: None,
///     id_token: None,
///     refresh_token: Some("refresh".to_string()),
///     scope: Some("openid offline_access".to_string()),
/// };
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token_expiration_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl TokenResponse {
    pub(crate) fn from_wire(payload: WireTokenResponse, received_at: DateTime<Utc>) -> Self {
        Self {
            token_type: payload.token_type,
            access_token: payload.access_token,
            access_token_expiration_time: payload
                .expires_in
                .map(|secs| received_at + Duration::seconds(secs)),
            id_token: payload.id_token,
            refresh_token: payload.refresh_token,
            scope: payload.scope,
        }
    }
}

/// Grant carried by a token endpoint request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenRequest {
    AuthorizationCode {
        code: String,
        redirect_uri: String,
        code_verifier: Option<String>,
    },
    RefreshToken {
        refresh_token: String,
        scope: Option<String>,
    },
}

impl TokenRequest {
    pub fn grant_type(&self) -> &'static str {
        match self {
            Self::AuthorizationCode { .. } => "authorization_code",
            Self::RefreshToken { .. } => "refresh_token",
        }
    }

    /// Form parameters, excluding client authentication.
    pub fn form_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![("grant_type", self.grant_type().to_string())];
        match self {
            Self::AuthorizationCode {
                code,
                redirect_uri,
                code_verifier,
            } => {
                params.push(("code", code.clone()));
                params.push(("redirect_uri", redirect_uri.clone()));
                if let Some(verifier) = code_verifier {
                    params.push(("code_verifier", verifier.clone()));
                }
            }
            Self::RefreshToken {
                refresh_token,
                scope,
            } => {
                params.push(("refresh_token", refresh_token.clone()));
                if let Some(scope) = scope {
                    params.push(("scope", scope.clone()));
                }
            }
        }
        params
    }
}

/// Token endpoint JSON body as sent by the server.
#[derive(Debug, Deserialize)]
pub(crate) struct WireTokenResponse {
    pub token_type: Option<String>,
    pub access_token: Option<String>,
    pub expires_in: Option<i64>,
    pub id_token: Option<String>,
    pub refresh_token: Option<String>,
    pub scope: Option<String>,
}

/// OAuth error body (`error`, `error_description`, `error_uri`).
#[derive(Debug, Deserialize)]
pub(crate) struct WireErrorResponse {
    pub error: String,
    pub error_description: Option<String>,
    pub error_uri: Option<String>,
}
