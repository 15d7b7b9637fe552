use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{OidcError, Result};

/// Path appended to an issuer URL to locate its discovery document.
pub const WELL_KNOWN_PATH: &str = ".well-known/openid-configuration";

/// Issuer-published endpoints used by the authorization and token requests.
///
/// Fetched once via discovery, then cached as part of
/// [`AuthState`](super::AuthState) so later starts skip the network call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfiguration {
    pub authorization_endpoint: Url,
    pub token_endpoint: Url,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_session_endpoint: Option<Url>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registration_endpoint: Option<Url>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discovery_doc: Option<DiscoveryDocument>,
}

impl ServiceConfiguration {
    /// Configuration with explicit endpoints and no discovery document.
    pub fn new(authorization_endpoint: Url, token_endpoint: Url) -> Self {
        Self {
            authorization_endpoint,
            token_endpoint,
            end_session_endpoint: None,
            registration_endpoint: None,
            discovery_doc: None,
        }
    }

    /// Build a configuration from a parsed discovery document.
    pub fn from_discovery(doc: DiscoveryDocument) -> Result<Self> {
        let authorization_endpoint = parse_endpoint("authorization_endpoint", &doc.authorization_endpoint)?;
        let token_endpoint = parse_endpoint("token_endpoint", &doc.token_endpoint)?;
        let end_session_endpoint = doc
            .end_session_endpoint
            .as_deref()
            .map(|raw| parse_endpoint("end_session_endpoint", raw))
            .transpose()?;
        let registration_endpoint = doc
            .registration_endpoint
            .as_deref()
            .map(|raw| parse_endpoint("registration_endpoint", raw))
            .transpose()?;
        Ok(Self {
            authorization_endpoint,
            token_endpoint,
            end_session_endpoint,
            registration_endpoint,
            discovery_doc: Some(doc),
        })
    }

    /// Issuer named by the discovery document, if one was fetched.
    pub fn issuer(&self) -> Option<&str> {
        self.discovery_doc.as_ref().map(|doc| doc.issuer.as_str())
    }
}

/// Subset of the OpenID Provider metadata this crate reads.
///
/// Unknown members are kept in `additional` so the cached copy round-trips.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryDocument {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_session_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registration_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub userinfo_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwks_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scopes_supported: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_types_supported: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_challenge_methods_supported: Option<Vec<String>>,
    #[serde(flatten)]
    pub additional: serde_json::Map<String, serde_json::Value>,
}

/// Discovery URL for an issuer: `{issuer}/.well-known/openid-configuration`.
pub fn discovery_url(issuer: &Url) -> Result<Url> {
    let mut base = issuer.clone();
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base.join(WELL_KNOWN_PATH).map_err(|err| {
        OidcError::Configuration(format!("invalid issuer URL {issuer}: {err}"))
    })
}

fn parse_endpoint(name: &str, raw: &str) -> Result<Url> {
    Url::parse(raw).map_err(|err| {
        OidcError::ConfigurationFetchFailed(format!("discovery {name} is not a URL ({raw}): {err}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_doc() -> DiscoveryDocument {
        serde_json::from_value(serde_json::json!({
            "issuer": "http://dex.localtest.me:4190/dex",
            "authorization_endpoint": "http://dex.localtest.me:4190/dex/auth",
            "token_endpoint": "http://dex.localtest.me:4190/dex/token",
            "jwks_uri": "http://dex.localtest.me:4190/dex/keys",
            "claims_supported": ["email", "name"]
        }))
        .unwrap()
    }

    #[test]
    fn discovery_url_keeps_issuer_path() {
        let issuer = Url::parse("http://dex.localtest.me:4190/dex").unwrap();
        assert_eq!(
            discovery_url(&issuer).unwrap().as_str(),
            "http://dex.localtest.me:4190/dex/.well-known/openid-configuration"
        );
    }

    #[test]
    fn discovery_url_handles_trailing_slash() {
        let issuer = Url::parse("https://issuer.example.com/").unwrap();
        assert_eq!(
            discovery_url(&issuer).unwrap().as_str(),
            "https://issuer.example.com/.well-known/openid-configuration"
        );
    }

    #[test]
    fn from_discovery_parses_endpoints_and_keeps_extra_members() {
        let config = ServiceConfiguration::from_discovery(sample_doc()).unwrap();
        assert_eq!(
            config.token_endpoint.as_str(),
            "http://dex.localtest.me:4190/dex/token"
        );
        assert!(config.end_session_endpoint.is_none());
        assert_eq!(config.issuer(), Some("http://dex.localtest.me:4190/dex"));
        let doc = config.discovery_doc.unwrap();
        assert!(doc.additional.contains_key("claims_supported"));
    }

    #[test]
    fn from_discovery_rejects_relative_endpoint() {
        let mut doc = sample_doc();
        doc.token_endpoint = "/token".to_string();
        let err = ServiceConfiguration::from_discovery(doc).unwrap_err();
        assert!(matches!(err, OidcError::ConfigurationFetchFailed(ref msg) if msg.contains("token_endpoint")));
    }
}
