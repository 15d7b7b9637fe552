use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::configuration::ServiceConfiguration;
use super::id_token::IdToken;
use super::request::{AuthorizationException, AuthorizationResponse, ExceptionKind};
use super::token::TokenResponse;
use crate::error::Result;

/// Access tokens expiring within this window are treated as expired.
const EXPIRY_TIME_TOLERANCE_SECS: i64 = 60;

/// Combined record of the client's configuration, tokens and last
/// authorization/token results.
///
/// `AuthState` is a value: every update method borrows `self` and returns a
/// new state, so references held by a committed session are never mutated.
///
/// # Example
/// ```no_run
/// use oidc_session::auth::AuthState;
///
/// let empty = AuthState::default();
/// let forced = empty.with_needs_token_refresh(true);
/// assert!(!empty.is_authorized());
/// assert!(forced.needs_token_refresh(chrono::Utc::now()));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<ServiceConfiguration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_authorization_response: Option<AuthorizationResponse>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_token_response: Option<TokenResponse>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_exception: Option<AuthorizationException>,
    #[serde(default)]
    pub needs_token_refresh_override: bool,
}

impl AuthState {
    /// Empty, unauthorized state carrying a service configuration.
    pub fn new(config: ServiceConfiguration) -> Self {
        Self {
            config: Some(config),
            ..Self::default()
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn access_token(&self) -> Option<&str> {
        if self.authorization_exception.is_some() {
            return None;
        }
        if let Some(token) = self
            .last_token_response
            .as_ref()
            .and_then(|resp| resp.access_token.as_deref())
        {
            return Some(token);
        }
        self.last_authorization_response
            .as_ref()
            .and_then(|resp| resp.access_token.as_deref())
    }

    pub fn access_token_expiration_time(&self) -> Option<DateTime<Utc>> {
        if self.authorization_exception.is_some() {
            return None;
        }
        if let Some(resp) = &self.last_token_response {
            if resp.access_token.is_some() {
                return resp.access_token_expiration_time;
            }
        }
        self.last_authorization_response
            .as_ref()
            .filter(|resp| resp.access_token.is_some())
            .and_then(|resp| resp.access_token_expiration_time)
    }

    pub fn id_token(&self) -> Option<&str> {
        if self.authorization_exception.is_some() {
            return None;
        }
        if let Some(token) = self
            .last_token_response
            .as_ref()
            .and_then(|resp| resp.id_token.as_deref())
        {
            return Some(token);
        }
        self.last_authorization_response
            .as_ref()
            .and_then(|resp| resp.id_token.as_deref())
    }

    /// Claims of the current ID token; `None` when absent or unreadable.
    pub fn parsed_id_token(&self) -> Option<IdToken> {
        IdToken::parse(self.id_token()?).ok()
    }

    /// Authorized when no error is recorded and an access or ID token exists.
    pub fn is_authorized(&self) -> bool {
        self.authorization_exception.is_none()
            && (self.access_token().is_some() || self.id_token().is_some())
    }

    /// Whether a refresh must run before the access token is handed out.
    pub fn needs_token_refresh(&self, now: DateTime<Utc>) -> bool {
        if self.needs_token_refresh_override {
            return true;
        }
        if self.access_token().is_none() {
            return true;
        }
        match self.access_token_expiration_time() {
            Some(expires_at) => expires_at <= now + Duration::seconds(EXPIRY_TIME_TOLERANCE_SECS),
            None => false,
        }
    }

    /// An authorization code was received but never exchanged for tokens.
    pub fn has_pending_code_exchange(&self) -> bool {
        self.authorization_exception.is_none()
            && self.last_token_response.is_none()
            && self
                .last_authorization_response
                .as_ref()
                .is_some_and(|resp| resp.authorization_code.is_some())
    }

    pub fn with_needs_token_refresh(&self, needs_refresh: bool) -> Self {
        Self {
            needs_token_refresh_override: needs_refresh,
            ..self.clone()
        }
    }

    /// Merge the outcome of the interactive step.
    pub fn with_authorization_result(
        &self,
        result: &std::result::Result<AuthorizationResponse, AuthorizationException>,
    ) -> Self {
        let mut next = self.clone();
        match result {
            Ok(response) => {
                next.config = Some(response.request.configuration.clone());
                next.refresh_token = None;
                next.last_token_response = None;
                next.authorization_exception = None;
                next.needs_token_refresh_override = false;
                next.scope = response
                    .scope
                    .clone()
                    .or_else(|| response.request.scope.clone());
                next.last_authorization_response = Some(response.clone());
            }
            Err(exception) => {
                if exception.kind == ExceptionKind::Authorization {
                    next.authorization_exception = Some(exception.clone());
                }
            }
        }
        next
    }

    /// Merge the outcome of a token endpoint call (exchange or refresh).
    pub fn with_token_result(
        &self,
        result: &std::result::Result<TokenResponse, AuthorizationException>,
    ) -> Self {
        let mut next = self.clone();
        match result {
            Ok(response) => {
                next.authorization_exception = None;
                next.needs_token_refresh_override = false;
                if let Some(scope) = &response.scope {
                    next.scope = Some(scope.clone());
                }
                if let Some(refresh_token) = &response.refresh_token {
                    next.refresh_token = Some(refresh_token.clone());
                }
                let mut response = response.clone();
                // Refresh responses may omit the ID token.
                if response.id_token.is_none() {
                    response.id_token = self
                        .last_token_response
                        .as_ref()
                        .and_then(|previous| previous.id_token.clone());
                }
                next.last_token_response = Some(response);
            }
            Err(exception) => {
                if exception.kind == ExceptionKind::TokenEndpoint {
                    next.authorization_exception = Some(exception.clone());
                }
            }
        }
        next
    }
}
