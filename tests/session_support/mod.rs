#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use chrono::Utc;
use oidc_session::auth::{
    AuthState, AuthStateStore, AuthorizationRequest, MemoryPreferenceBackend, OidcClient,
    PreferenceBackend, ServiceConfiguration, TokenResponse,
};
use oidc_session::config::{SessionConfig, DEFAULT_CLIENT_ID, DEFAULT_CLIENT_SECRET};
use oidc_session::error::{OidcError, Result};
use oidc_session::session::{AuthorizationAgent, LoginStatus, UserSessionService};
use serde_json::{json, Value};
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const ISSUER_PATH: &str = "/dex";
pub const TOKEN_PATH: &str = "/dex/token";
pub const DISCOVERY_PATH: &str = "/dex/.well-known/openid-configuration";

pub fn issuer(server: &MockServer) -> Url {
    Url::parse(&format!("{}{ISSUER_PATH}", server.uri())).expect("issuer url")
}

pub fn session_config(server: &MockServer) -> SessionConfig {
    SessionConfig {
        issuer: issuer(server),
        api_url: Url::parse(&format!("{}/status", server.uri())).expect("api url"),
        ..SessionConfig::default()
    }
}

pub fn discovery_document(server: &MockServer) -> Value {
    let issuer = issuer(server);
    json!({
        "issuer": issuer.as_str(),
        "authorization_endpoint": format!("{issuer}/auth"),
        "token_endpoint": format!("{issuer}/token"),
        "jwks_uri": format!("{issuer}/keys"),
        "userinfo_endpoint": format!("{issuer}/userinfo"),
        "response_types_supported": ["code"],
        "code_challenge_methods_supported": ["S256", "plain"],
        "scopes_supported": ["openid", "email", "profile", "offline_access"]
    })
}

pub async fn mount_discovery(server: &MockServer, expected_calls: u64) {
    Mock::given(method("GET"))
        .and(path(DISCOVERY_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(discovery_document(server)))
        .expect(expected_calls)
        .mount(server)
        .await;
}

pub fn service_configuration(server: &MockServer) -> ServiceConfiguration {
    let issuer = issuer(server);
    ServiceConfiguration::new(
        Url::parse(&format!("{issuer}/auth")).expect("auth endpoint"),
        Url::parse(&format!("{issuer}/token")).expect("token endpoint"),
    )
}

/// Unsigned compact JWT carrying `claims`.
pub fn jwt(claims: Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{payload}.signature")
}

pub fn admin_id_token() -> String {
    jwt(json!({
        "iss": "http://dex.localtest.me:4190/dex",
        "sub": "CiQwOGE4Njg0Yi1kYjg4LTRiNzMtOTBhOS0zY2QxNjYxZjU0NjYSBWxvY2Fs",
        "aud": DEFAULT_CLIENT_ID,
        "exp": Utc::now().timestamp() + 3600,
        "iat": Utc::now().timestamp(),
        "email": "admin@example.com",
        "email_verified": true,
        "name": "admin"
    }))
}

/// Token endpoint body as sent by the server.
pub fn token_body(access_token: &str, refresh_token: Option<&str>) -> Value {
    let mut body = json!({
        "access_token": access_token,
        "token_type": "bearer",
        "expires_in": 3600,
        "id_token": admin_id_token()
    });
    if let Some(refresh_token) = refresh_token {
        body["refresh_token"] = json!(refresh_token);
    }
    body
}

pub fn basic_auth_header() -> String {
    format!(
        "Basic {}",
        STANDARD.encode(format!("{DEFAULT_CLIENT_ID}:{DEFAULT_CLIENT_SECRET}"))
    )
}

/// Logged-in state whose access token expires in `expires_in_secs`.
pub fn authorized_state(server: &MockServer, expires_in_secs: i64) -> AuthState {
    AuthState::new(service_configuration(server)).with_token_result(&Ok(TokenResponse {
        token_type: Some("bearer".to_string()),
        access_token: Some("stored-access".to_string()),
        access_token_expiration_time: Some(Utc::now() + chrono::Duration::seconds(expires_in_secs)),
        id_token: Some(admin_id_token()),
        refresh_token: Some("stored-refresh".to_string()),
        scope: Some("openid email profile offline_access".to_string()),
    }))
}

pub fn start_service(
    server: &MockServer,
    store: Arc<AuthStateStore>,
) -> UserSessionService {
    let config = session_config(server);
    let client = OidcClient::new(&config).expect("http client");
    UserSessionService::start(config, store, client)
}

pub async fn store_with(state: Option<AuthState>) -> Arc<AuthStateStore> {
    let store = Arc::new(AuthStateStore::in_memory());
    store.write(state).await.expect("seed store");
    store
}

pub async fn wait_for_status(
    service: &UserSessionService,
    predicate: impl FnMut(&LoginStatus) -> bool,
) -> LoginStatus {
    let mut status = service.watch_status();
    let observed = tokio::time::timeout(Duration::from_secs(5), status.wait_for(predicate))
        .await
        .expect("timed out waiting for status")
        .expect("reconciler stopped");
    observed.clone()
}

pub async fn wait_logged_in(service: &UserSessionService) -> LoginStatus {
    wait_for_status(service, |status| matches!(status, LoginStatus::LoggedIn(_))).await
}

/// Agent that answers like the server would after a successful sign-in.
pub struct CodeAgent {
    pub code: String,
}

#[async_trait]
impl AuthorizationAgent for CodeAgent {
    async fn authorize(&self, request: &AuthorizationRequest) -> Result<Option<Url>> {
        let mut redirect = request.redirect_uri.clone();
        redirect
            .query_pairs_mut()
            .append_pair("code", &self.code)
            .append_pair("state", &request.state);
        Ok(Some(redirect))
    }
}

/// Agent whose redirect carries a foreign `state`.
pub struct ForgedStateAgent;

#[async_trait]
impl AuthorizationAgent for ForgedStateAgent {
    async fn authorize(&self, request: &AuthorizationRequest) -> Result<Option<Url>> {
        let mut redirect = request.redirect_uri.clone();
        redirect
            .query_pairs_mut()
            .append_pair("code", "stolen")
            .append_pair("state", "not-the-request-state");
        Ok(Some(redirect))
    }
}

/// Agent that closes the browser without signing in.
pub struct AbandonAgent;

#[async_trait]
impl AuthorizationAgent for AbandonAgent {
    async fn authorize(&self, _request: &AuthorizationRequest) -> Result<Option<Url>> {
        Ok(None)
    }
}

/// Memory backend whose writes can be made to fail.
#[derive(Default)]
pub struct FlakyBackend {
    inner: MemoryPreferenceBackend,
    fail_writes: AtomicBool,
}

impl FlakyBackend {
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

impl PreferenceBackend for FlakyBackend {
    fn load(&self, key: &str) -> Result<Option<String>> {
        self.inner.load(key)
    }

    fn save(&self, key: &str, value: &str) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(OidcError::Storage("disk full".to_string()));
        }
        self.inner.save(key, value)
    }

    fn clear(&self) -> Result<()> {
        self.inner.clear()
    }
}

/// Memory backend that counts saves.
#[derive(Default)]
pub struct CountingBackend {
    inner: MemoryPreferenceBackend,
    saves: AtomicUsize,
}

impl CountingBackend {
    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

impl PreferenceBackend for CountingBackend {
    fn load(&self, key: &str) -> Result<Option<String>> {
        self.inner.load(key)
    }

    fn save(&self, key: &str, value: &str) -> Result<()> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.inner.save(key, value)
    }

    fn clear(&self) -> Result<()> {
        self.inner.clear()
    }
}
