//! Error types for oidc-session.

use thiserror::Error;

/// Primary error type for all session operations.
#[derive(Error, Debug)]
pub enum OidcError {
    #[error("Configuration fetch failed: {0}")]
    ConfigurationFetchFailed(String),

    #[error("Authorization failed: {error}{}", description_suffix(.description))]
    AuthorizationFailed {
        error: String,
        description: Option<String>,
    },

    #[error("Token exchange failed: {0}")]
    TokenExchangeFailed(String),

    #[error("Token refresh failed: {0}")]
    TokenRefreshFailed(String),

    #[error("Not logged in")]
    NotLoggedIn,

    #[error("Stale user session")]
    StaleSession,

    /// Stored blob could not be decoded. Store reads degrade this to "no state".
    #[error("Stored auth state is unreadable: {0}")]
    StorageDeserializationFailed(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("API request failed with status {status}")]
    ApiRequestFailed { status: u16, body: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Broad error category for routing recovery logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Authentication,
    Session,
    Network,
    Server,
    Api,
    Configuration,
    Storage,
    Serialization,
}

impl OidcError {
    /// Build an authorization error from an OAuth `error` code.
    pub fn authorization(error: impl Into<String>, description: Option<String>) -> Self {
        Self::AuthorizationFailed {
            error: error.into(),
            description,
        }
    }

    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::AuthorizationFailed { .. }
            | Self::TokenExchangeFailed(_)
            | Self::TokenRefreshFailed(_) => ErrorCategory::Authentication,
            Self::NotLoggedIn | Self::StaleSession => ErrorCategory::Session,
            Self::ConfigurationFetchFailed(_) | Self::Network(_) => ErrorCategory::Network,
            Self::ApiRequestFailed { status, .. } => match status {
                401 | 403 => ErrorCategory::Authentication,
                500..=599 => ErrorCategory::Server,
                _ => ErrorCategory::Api,
            },
            Self::InvalidResponse(_) => ErrorCategory::Api,
            Self::Configuration(_) => ErrorCategory::Configuration,
            Self::Storage(_) | Self::StorageDeserializationFailed(_) => ErrorCategory::Storage,
            Self::Serialization(_) => ErrorCategory::Serialization,
        }
    }

    /// Whether retrying the same call later could succeed.
    ///
    /// Nothing in this crate retries on its own; callers decide.
    pub fn is_retryable(&self) -> bool {
        matches!(self.category(), ErrorCategory::Network | ErrorCategory::Server)
    }
}

fn description_suffix(description: &Option<String>) -> String {
    match description {
        Some(text) => format!(" ({text})"),
        None => String::new(),
    }
}

impl From<std::io::Error> for OidcError {
    fn from(error: std::io::Error) -> Self {
        Self::Storage(error.to_string())
    }
}

impl From<toml::de::Error> for OidcError {
    fn from(error: toml::de::Error) -> Self {
        Self::Configuration(error.to_string())
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, OidcError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authorization_error_display_includes_description() {
        let err = OidcError::authorization("access_denied", Some("user cancelled".into()));
        assert_eq!(
            err.to_string(),
            "Authorization failed: access_denied (user cancelled)"
        );
    }

    #[test]
    fn authorization_error_display_without_description() {
        let err = OidcError::authorization("access_denied", None);
        assert_eq!(err.to_string(), "Authorization failed: access_denied");
    }

    #[test]
    fn session_errors_are_not_retryable() {
        assert_eq!(OidcError::NotLoggedIn.category(), ErrorCategory::Session);
        assert!(!OidcError::StaleSession.is_retryable());
    }

    #[test]
    fn api_status_maps_to_category() {
        let unauthorized = OidcError::ApiRequestFailed {
            status: 401,
            body: String::new(),
        };
        let unavailable = OidcError::ApiRequestFailed {
            status: 503,
            body: String::new(),
        };
        assert_eq!(unauthorized.category(), ErrorCategory::Authentication);
        assert_eq!(unavailable.category(), ErrorCategory::Server);
        assert!(unavailable.is_retryable());
    }

    #[test]
    fn io_errors_become_storage_errors() {
        let err: OidcError = std::io::Error::other("disk full").into();
        assert!(matches!(err, OidcError::Storage(ref msg) if msg.contains("disk full")));
    }
}
