use std::collections::HashMap;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use url::Url;

use super::configuration::ServiceConfiguration;
use super::token::TokenRequest;
use crate::config::ClientSettings;
use crate::error::OidcError;

const RESPONSE_TYPE_CODE: &str = "code";
const CODE_CHALLENGE_METHOD_S256: &str = "S256";

/// Authorization code request with PKCE, `state` and `nonce`.
///
/// The request is kept inside the resulting [`AuthorizationResponse`] (and
/// therefore inside the persisted state) so the code exchange can be built
/// from it later.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationRequest {
    pub configuration: ServiceConfiguration,
    pub client_id: String,
    pub response_type: String,
    pub redirect_uri: Url,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login_hint: Option<String>,
    pub state: String,
    pub nonce: String,
    pub code_verifier: String,
    pub code_verifier_challenge: String,
    pub code_verifier_challenge_method: String,
}

impl AuthorizationRequest {
    /// Build a fresh request for `configuration` from the client settings.
    ///
    /// Every call generates a new `state`, `nonce` and code verifier.
    pub fn new(configuration: ServiceConfiguration, client: &ClientSettings) -> Self {
        let code_verifier = generate_code_verifier();
        let code_verifier_challenge = compute_code_challenge(&code_verifier);
        Self {
            configuration,
            client_id: client.client_id.clone(),
            response_type: RESPONSE_TYPE_CODE.to_string(),
            redirect_uri: client.redirect_uri.clone(),
            scope: Some(client.scope.clone()).filter(|scope| !scope.trim().is_empty()),
            login_hint: client.login_hint.clone(),
            state: random_hex(16),
            nonce: random_hex(16),
            code_verifier,
            code_verifier_challenge,
            code_verifier_challenge_method: CODE_CHALLENGE_METHOD_S256.to_string(),
        }
    }

    /// URL the user agent must open to start the interactive step.
    pub fn to_url(&self) -> Url {
        let mut url = self.configuration.authorization_endpoint.clone();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("client_id", &self.client_id)
                .append_pair("response_type", &self.response_type)
                .append_pair("redirect_uri", self.redirect_uri.as_str());
            if let Some(scope) = &self.scope {
                query.append_pair("scope", scope);
            }
            if let Some(hint) = &self.login_hint {
                query.append_pair("login_hint", hint);
            }
            query
                .append_pair("state", &self.state)
                .append_pair("nonce", &self.nonce)
                .append_pair("code_challenge", &self.code_verifier_challenge)
                .append_pair("code_challenge_method", &self.code_verifier_challenge_method);
        }
        url
    }
}

/// Successful result of the interactive step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationResponse {
    pub request: AuthorizationRequest,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token_expiration_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl AuthorizationResponse {
    /// Parse the redirect the authorization server sent back to the app.
    ///
    /// Query parameters take precedence; a fragment is read when the query
    /// carries no response parameters. An `error` parameter or a `state`
    /// mismatch yields an authorization error.
    pub fn from_redirect(
        request: &AuthorizationRequest,
        redirect: &Url,
    ) -> Result<Self, AuthorizationException> {
        if redirect.scheme() != request.redirect_uri.scheme()
            || redirect.host_str() != request.redirect_uri.host_str()
            || redirect.path() != request.redirect_uri.path()
        {
            return Err(AuthorizationException::general(format!(
                "redirect {redirect} does not match {}",
                request.redirect_uri
            )));
        }

        let mut params: HashMap<String, String> = redirect.query_pairs().into_owned().collect();
        if !params.contains_key("code") && !params.contains_key("error") {
            if let Some(fragment) = redirect.fragment() {
                params = url::form_urlencoded::parse(fragment.as_bytes())
                    .into_owned()
                    .collect();
            }
        }

        if let Some(error) = params.remove("error") {
            return Err(AuthorizationException {
                kind: ExceptionKind::Authorization,
                error,
                error_description: params.remove("error_description"),
                error_uri: params.remove("error_uri"),
            });
        }

        let state = params.remove("state");
        if state.as_deref() != Some(request.state.as_str()) {
            return Err(AuthorizationException {
                kind: ExceptionKind::Authorization,
                error: "state_mismatch".to_string(),
                error_description: Some(
                    "Returned state parameter does not match the request".to_string(),
                ),
                error_uri: None,
            });
        }

        let authorization_code = params.remove("code");
        if authorization_code.is_none() && !params.contains_key("access_token") {
            return Err(AuthorizationException::general(
                "redirect carries neither a code nor an error",
            ));
        }

        let access_token_expiration_time = params
            .get("expires_in")
            .and_then(|raw| raw.parse::<i64>().ok())
            .map(|secs| Utc::now() + chrono::Duration::seconds(secs));

        Ok(Self {
            request: request.clone(),
            state,
            authorization_code,
            access_token: params.remove("access_token"),
            access_token_expiration_time,
            id_token: params.remove("id_token"),
            scope: params.remove("scope"),
        })
    }

    /// Token request exchanging this response's code, if it carries one.
    pub fn token_exchange_request(&self) -> Option<TokenRequest> {
        let code = self.authorization_code.clone()?;
        Some(TokenRequest::AuthorizationCode {
            code,
            redirect_uri: self.request.redirect_uri.to_string(),
            code_verifier: Some(self.request.code_verifier.clone()),
        })
    }
}

/// Where an [`AuthorizationException`] came from.
///
/// Only OAuth protocol errors are recorded in the auth state; general
/// (transport, parsing) failures leave it untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExceptionKind {
    General,
    Authorization,
    TokenEndpoint,
}

/// Error reported by the interactive step or the token endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationException {
    pub kind: ExceptionKind,
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_uri: Option<String>,
}

impl AuthorizationException {
    pub fn general(message: impl Into<String>) -> Self {
        Self {
            kind: ExceptionKind::General,
            error: message.into(),
            error_description: None,
            error_uri: None,
        }
    }

    pub(crate) fn token_endpoint(
        error: String,
        error_description: Option<String>,
        error_uri: Option<String>,
    ) -> Self {
        Self {
            kind: ExceptionKind::TokenEndpoint,
            error,
            error_description,
            error_uri,
        }
    }

    fn message(&self) -> String {
        match &self.error_description {
            Some(description) => format!("{}: {description}", self.error),
            None => self.error.clone(),
        }
    }

    /// Error surfaced when this exception ends an authorization attempt.
    pub fn into_authorization_error(self) -> OidcError {
        OidcError::authorization(self.error, self.error_description)
    }

    /// Error surfaced when this exception ends a code exchange.
    pub fn into_exchange_error(self) -> OidcError {
        OidcError::TokenExchangeFailed(self.message())
    }

    /// Error surfaced when this exception ends a token refresh.
    pub fn into_refresh_error(self) -> OidcError {
        OidcError::TokenRefreshFailed(self.message())
    }
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn random_hex(byte_count: usize) -> String {
    let mut buf = vec![0u8; byte_count];
    fill_random(&mut buf);
    buf.iter().map(|byte| format!("{byte:02x}")).collect()
}

fn generate_code_verifier() -> String {
    let mut buf = [0u8; 48];
    fill_random(&mut buf);
    URL_SAFE_NO_PAD.encode(buf)
}

fn fill_random(buf: &mut [u8]) {
    for chunk in buf.chunks_mut(16) {
        let id = uuid::Uuid::new_v4();
        let len = chunk.len();
        chunk.copy_from_slice(&id.as_bytes()[..len]);
    }
}

pub(crate) fn compute_code_challenge(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configuration() -> ServiceConfiguration {
        ServiceConfiguration::new(
            Url::parse("http://dex.localtest.me:4190/dex/auth").unwrap(),
            Url::parse("http://dex.localtest.me:4190/dex/token").unwrap(),
        )
    }

    fn request() -> AuthorizationRequest {
        AuthorizationRequest::new(configuration(), &ClientSettings::default())
    }

    #[test]
    fn to_url_carries_pkce_and_client_parameters() {
        let request = request();
        let url = request.to_url();
        let params: HashMap<_, _> = url.query_pairs().into_owned().collect();

        assert_eq!(params["response_type"], "code");
        assert_eq!(params["client_id"], "oauth2-proxy");
        assert_eq!(params["scope"], "openid email profile offline_access");
        assert_eq!(params["login_hint"], "admin@example.com");
        assert_eq!(params["state"], request.state);
        assert_eq!(params["code_challenge_method"], "S256");
        assert_eq!(
            params["code_challenge"],
            compute_code_challenge(&request.code_verifier)
        );
    }

    #[test]
    fn new_generates_unique_state_and_verifier() {
        let a = request();
        let b = request();
        assert_ne!(a.state, b.state);
        assert_ne!(a.code_verifier, b.code_verifier);
        assert!(a.code_verifier.len() >= 43 && a.code_verifier.len() <= 128);
    }

    #[test]
    fn from_redirect_accepts_matching_state() {
        let request = request();
        let redirect = Url::parse(&format!(
            "{}?code=auth-code&state={}",
            request.redirect_uri, request.state
        ))
        .unwrap();

        let response = AuthorizationResponse::from_redirect(&request, &redirect).unwrap();

        assert_eq!(response.authorization_code.as_deref(), Some("auth-code"));
        let exchange = response.token_exchange_request().unwrap();
        assert_eq!(
            exchange,
            TokenRequest::AuthorizationCode {
                code: "auth-code".to_string(),
                redirect_uri: request.redirect_uri.to_string(),
                code_verifier: Some(request.code_verifier.clone()),
            }
        );
    }

    #[test]
    fn from_redirect_rejects_state_mismatch() {
        let request = request();
        let redirect =
            Url::parse(&format!("{}?code=auth-code&state=other", request.redirect_uri)).unwrap();

        let err = AuthorizationResponse::from_redirect(&request, &redirect).unwrap_err();

        assert_eq!(err.kind, ExceptionKind::Authorization);
        assert_eq!(err.error, "state_mismatch");
    }

    #[test]
    fn from_redirect_reports_server_error() {
        let request = request();
        let redirect = Url::parse(&format!(
            "{}?error=access_denied&error_description=denied&state={}",
            request.redirect_uri, request.state
        ))
        .unwrap();

        let err = AuthorizationResponse::from_redirect(&request, &redirect).unwrap_err();

        assert_eq!(err.kind, ExceptionKind::Authorization);
        assert!(matches!(
            err.into_authorization_error(),
            OidcError::AuthorizationFailed { ref error, .. } if error == "access_denied"
        ));
    }

    #[test]
    fn from_redirect_rejects_foreign_redirect() {
        let request = request();
        let redirect = Url::parse("https://elsewhere.example.com/cb?code=x").unwrap();
        let err = AuthorizationResponse::from_redirect(&request, &redirect).unwrap_err();
        assert_eq!(err.kind, ExceptionKind::General);
    }
}
