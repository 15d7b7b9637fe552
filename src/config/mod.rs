//! Configuration system (layered: code > env > config file > defaults).

use std::path::{Path, PathBuf};
use std::time::Duration;

use bon::Builder;
use serde::Deserialize;
use url::Url;

use crate::error::{OidcError, Result};

pub const DEFAULT_ISSUER: &str = "http://dex.localtest.me:4190/dex";
pub const DEFAULT_CLIENT_ID: &str = "oauth2-proxy";
pub const DEFAULT_CLIENT_SECRET: &str = "b2F1dGgyLXByb3h5LWNsaWVudC1zZWNyZXQK";
pub const DEFAULT_REDIRECT_URI: &str = "com.example.oauth2sample.auth://oauth2/callback";
/// `offline_access` is what makes the server hand out a refresh token.
pub const DEFAULT_SCOPE: &str = "openid email profile offline_access";
pub const DEFAULT_LOGIN_HINT: &str = "admin@example.com";
pub const DEFAULT_API_URL: &str = "http://api.oauth2-proxy.localtest.me/status";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
const READ_TIMEOUT: Duration = Duration::from_secs(10);
const CONFIG_FILE_NAME: &str = "config.toml";

/// Fixed client parameters sent with authorization and token requests.
///
/// # Example
/// ```
/// use oidc_session::config::ClientSettings;
///
/// let client = ClientSettings::builder()
///     .client_id("my-app")
///     .redirect_uri("my.app://oauth2/callback".parse().unwrap())
///     .scope("openid offline_access")
///     .build();
/// assert!(client.client_secret.is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Builder)]
pub struct ClientSettings {
    #[builder(into)]
    pub client_id: String,
    /// Sent with `client_secret_basic`; public clients leave it unset.
    #[builder(into)]
    pub client_secret: Option<String>,
    pub redirect_uri: Url,
    #[builder(into)]
    pub scope: String,
    #[builder(into)]
    pub login_hint: Option<String>,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            client_id: DEFAULT_CLIENT_ID.to_string(),
            client_secret: Some(DEFAULT_CLIENT_SECRET.to_string()),
            redirect_uri: parse_url("redirect_uri", DEFAULT_REDIRECT_URI)
                .unwrap_or_else(|_| unreachable!("default redirect URI is valid")),
            scope: DEFAULT_SCOPE.to_string(),
            login_hint: Some(DEFAULT_LOGIN_HINT.to_string()),
        }
    }
}

/// Everything a [`UserSessionService`](crate::session::UserSessionService) needs.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub issuer: Url,
    pub client: ClientSettings,
    /// Directory holding the persisted auth state.
    pub state_dir: PathBuf,
    /// Protected endpoint used by the demo API call.
    pub api_url: Url,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            issuer: parse_url("issuer", DEFAULT_ISSUER)
                .unwrap_or_else(|_| unreachable!("default issuer is valid")),
            client: ClientSettings::default(),
            state_dir: default_state_dir(),
            api_url: parse_url("api_url", DEFAULT_API_URL)
                .unwrap_or_else(|_| unreachable!("default API URL is valid")),
            connect_timeout: CONNECT_TIMEOUT,
            read_timeout: READ_TIMEOUT,
        }
    }
}

impl SessionConfig {
    /// Defaults, then the config file (if present), then environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(Self::default_config_path);
        let mut config = Self::default();
        if path.exists() {
            config = config.merge_file(&path)?;
        }
        let _ = dotenvy::dotenv(); // load .env if present, ignore error
        config.apply_env(|key| std::env::var(key).ok())
    }

    /// Load from environment variables on top of the defaults.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        Self::default().apply_env(|key| std::env::var(key).ok())
    }

    /// Default config file path (`~/.oidc-session/config.toml`).
    pub fn default_config_path() -> PathBuf {
        default_state_dir().join(CONFIG_FILE_NAME)
    }

    /// Load from a TOML file on top of the defaults.
    pub fn load_file(path: &Path) -> Result<Self> {
        Self::default().merge_file(path)
    }

    /// Overlay values from a TOML file.
    pub fn merge_file(self, path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let file: ConfigFile = toml::from_str(&raw)?;
        self.merge(file)
    }

    /// Overlay `OIDC_*` variables resolved through `lookup`.
    pub fn apply_env(self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let file = ConfigFile {
            issuer: lookup("OIDC_ISSUER"),
            client_id: lookup("OIDC_CLIENT_ID"),
            client_secret: lookup("OIDC_CLIENT_SECRET"),
            redirect_uri: lookup("OIDC_REDIRECT_URI"),
            scope: lookup("OIDC_SCOPES"),
            login_hint: lookup("OIDC_LOGIN_HINT"),
            state_dir: lookup("OIDC_STATE_DIR").map(PathBuf::from),
            api_url: lookup("OIDC_API_URL"),
            connect_timeout_secs: None,
            read_timeout_secs: None,
        };
        self.merge(file)
    }

    fn merge(mut self, file: ConfigFile) -> Result<Self> {
        if let Some(issuer) = file.issuer {
            self.issuer = parse_url("issuer", &issuer)?;
        }
        if let Some(client_id) = file.client_id {
            self.client.client_id = client_id;
        }
        if let Some(secret) = file.client_secret {
            // An empty secret switches to a public client.
            self.client.client_secret = Some(secret).filter(|s| !s.is_empty());
        }
        if let Some(redirect_uri) = file.redirect_uri {
            self.client.redirect_uri = parse_url("redirect_uri", &redirect_uri)?;
        }
        if let Some(scope) = file.scope {
            self.client.scope = scope;
        }
        if let Some(hint) = file.login_hint {
            self.client.login_hint = Some(hint).filter(|h| !h.is_empty());
        }
        if let Some(dir) = file.state_dir {
            self.state_dir = dir;
        }
        if let Some(api_url) = file.api_url {
            self.api_url = parse_url("api_url", &api_url)?;
        }
        if let Some(secs) = file.connect_timeout_secs {
            self.connect_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = file.read_timeout_secs {
            self.read_timeout = Duration::from_secs(secs);
        }
        Ok(self)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    issuer: Option<String>,
    client_id: Option<String>,
    client_secret: Option<String>,
    redirect_uri: Option<String>,
    scope: Option<String>,
    login_hint: Option<String>,
    state_dir: Option<PathBuf>,
    api_url: Option<String>,
    connect_timeout_secs: Option<u64>,
    read_timeout_secs: Option<u64>,
}

fn parse_url(field: &str, raw: &str) -> Result<Url> {
    Url::parse(raw).map_err(|err| OidcError::Configuration(format!("invalid {field} '{raw}': {err}")))
}

fn default_state_dir() -> PathBuf {
    directories::UserDirs::new()
        .map(|dirs| dirs.home_dir().join(".oidc-session"))
        .unwrap_or_else(|| PathBuf::from(".oidc-session"))
}
