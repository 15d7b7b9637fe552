use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{watch, OnceCell};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, info, warn};

use super::agent::AuthorizationAgent;
use super::status::LoginStatus;
use super::user_session::FreshTokens;
use crate::auth::{
    AuthState, AuthStateStore, AuthorizationException, AuthorizationRequest,
    AuthorizationResponse, OidcClient, ServiceConfiguration, TokenRequest,
};
use crate::config::SessionConfig;
use crate::error::{OidcError, Result};

/// How an interactive login ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginOutcome {
    /// Tokens were obtained and committed.
    Completed,
    /// The user left the interactive step; nothing was changed.
    Abandoned,
}

/// Store, transport and settings shared by the service and its sessions.
pub(crate) struct SessionCore {
    config: SessionConfig,
    store: Arc<AuthStateStore>,
    client: OidcClient,
    discovered: OnceCell<ServiceConfiguration>,
}

impl SessionCore {
    pub(crate) fn new(config: SessionConfig, store: Arc<AuthStateStore>, client: OidcClient) -> Self {
        Self {
            config,
            store,
            client,
            discovered: OnceCell::new(),
        }
    }

    /// Configuration of the stored state, else the discovered one.
    async fn service_configuration(&self) -> Result<ServiceConfiguration> {
        if let Some(configuration) = self.store.current().and_then(|state| state.config.clone()) {
            return Ok(configuration);
        }
        let configuration = self
            .discovered
            .get_or_try_init(|| async {
                info!(issuer = %self.config.issuer, "discovering service configuration");
                self.client.fetch_configuration(&self.config.issuer).await
            })
            .await?;
        Ok(configuration.clone())
    }

    pub(crate) async fn with_tokens<T, E, F, Fut>(
        &self,
        state: &Arc<AuthState>,
        force_refresh: bool,
        action: F,
    ) -> std::result::Result<T, E>
    where
        F: FnOnce(FreshTokens) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: From<OidcError>,
    {
        let current = match self.store.current() {
            Some(current) if current.is_authorized() => current,
            _ => return Err(OidcError::NotLoggedIn.into()),
        };
        if !Arc::ptr_eq(&current, state) {
            return Err(OidcError::StaleSession.into());
        }

        let mut next = if force_refresh {
            state.with_needs_token_refresh(true)
        } else {
            AuthState::clone(state)
        };

        let outcome = match self.fresh_tokens(&mut next).await {
            Ok(tokens) => action(tokens).await,
            Err(err) => Err(err.into()),
        };

        // The copy may carry refreshed tokens or a recorded refresh failure.
        // It only replaces the state it was taken from.
        let written = self.store.write_if_current(state, next).await;
        match (outcome, written) {
            (Ok(value), Ok(Some(_))) => Ok(value),
            (Ok(_), Ok(None)) => {
                warn!("auth state changed while tokens were in use; dropping write-back");
                Err(OidcError::StaleSession.into())
            }
            (Err(err), Ok(None)) => {
                warn!("auth state changed while tokens were in use; dropping write-back");
                Err(err)
            }
            (Ok(_), Err(err)) => {
                warn!(error = %err, "failed to write back auth state");
                Err(err.into())
            }
            (Err(err), Err(write_err)) => {
                warn!(error = %write_err, "failed to write back auth state");
                Err(err)
            }
            (Err(err), Ok(Some(_))) => Err(err),
        }
    }

    async fn fresh_tokens(&self, state: &mut AuthState) -> Result<FreshTokens> {
        if state.needs_token_refresh(Utc::now()) {
            let refresh_token = state.refresh_token.clone().ok_or_else(|| {
                OidcError::TokenRefreshFailed("no refresh token available".to_string())
            })?;
            let configuration = match state.config.clone() {
                Some(configuration) => configuration,
                None => self.service_configuration().await?,
            };
            debug!("refreshing access token");
            let request = TokenRequest::RefreshToken {
                refresh_token,
                scope: None,
            };
            let result = self
                .client
                .perform_token_request(&configuration, &self.config.client, &request)
                .await;
            *state = state.with_token_result(&result);
            if let Err(exception) = result {
                warn!(error = %exception.error, kind = ?exception.kind, "token refresh failed");
                return Err(exception.into_refresh_error());
            }
        }

        let access_token = state.access_token().ok_or_else(|| {
            OidcError::TokenRefreshFailed("no access token available".to_string())
        })?;
        Ok(FreshTokens {
            access_token: access_token.to_string(),
            id_token: state.id_token().map(str::to_string),
        })
    }

    /// Exchange the authorization code carried by `state`, committing the result.
    async fn exchange_code(&self, state: AuthState) -> Result<()> {
        let Some(response) = state.last_authorization_response.as_ref() else {
            return Ok(());
        };
        let Some(request) = response.token_exchange_request() else {
            return Ok(());
        };
        let configuration = response.request.configuration.clone();

        debug!(token_endpoint = %configuration.token_endpoint, "exchanging authorization code");
        let result = self
            .client
            .perform_token_request(&configuration, &self.config.client, &request)
            .await;
        let next = state.with_token_result(&result);
        self.store.write(Some(next)).await?;

        match result {
            Ok(_) => {
                info!("login completed");
                Ok(())
            }
            Err(exception) => {
                warn!(error = %exception.error, kind = ?exception.kind, "code exchange failed");
                Err(exception.into_exchange_error())
            }
        }
    }
}

/// Owns the login status and keeps it in sync with the auth state store.
///
/// Starting the service spawns a reconciler task on the current Tokio
/// runtime. It discovers the service configuration if none is stored, then
/// derives a [`LoginStatus`] from every commit of the store. The task stops
/// when the service is dropped.
///
/// # Example
/// ```no_run
/// use oidc_session::config::SessionConfig;
/// use oidc_session::session::{LoginStatus, UserSessionService};
///
/// # async fn example() -> oidc_session::error::Result<()> {
/// let service = UserSessionService::from_config(SessionConfig::from_env()?)?;
/// match service.loaded_status().await {
///     LoginStatus::LoggedIn(session) => println!("hello {:?}", session.username()),
///     other => println!("{other}"),
/// }
/// # Ok(())
/// # }
/// ```
pub struct UserSessionService {
    core: Arc<SessionCore>,
    status: watch::Receiver<LoginStatus>,
    reconciler: JoinHandle<()>,
}

impl UserSessionService {
    /// Start the service on an already opened store.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(config: SessionConfig, store: Arc<AuthStateStore>, client: OidcClient) -> Self {
        let core = Arc::new(SessionCore::new(config, store, client));
        let (status_tx, status) = watch::channel(LoginStatus::Loading);
        let reconciler = tokio::spawn(reconcile(Arc::clone(&core), status_tx));
        Self {
            core,
            status,
            reconciler,
        }
    }

    /// Open the file store in `config.state_dir` and start the service.
    pub fn from_config(config: SessionConfig) -> Result<Self> {
        let store = Arc::new(AuthStateStore::open_in_dir(&config.state_dir)?);
        let client = OidcClient::new(&config)?;
        Ok(Self::start(config, store, client))
    }

    pub fn config(&self) -> &SessionConfig {
        &self.core.config
    }

    pub fn store(&self) -> &Arc<AuthStateStore> {
        &self.core.store
    }

    pub fn client(&self) -> &OidcClient {
        &self.core.client
    }

    pub fn watch_status(&self) -> watch::Receiver<LoginStatus> {
        self.status.clone()
    }

    pub fn status(&self) -> LoginStatus {
        self.status.borrow().clone()
    }

    pub fn status_stream(&self) -> WatchStream<LoginStatus> {
        WatchStream::new(self.status.clone())
    }

    /// First status past `Loading`.
    pub async fn loaded_status(&self) -> LoginStatus {
        let mut status = self.status.clone();
        let loaded = match status.wait_for(|status| !status.is_loading()).await {
            Ok(loaded) => loaded.clone(),
            // The reconciler only exits when it panicked.
            Err(_) => LoginStatus::LoggedOut,
        };
        loaded
    }

    /// Stored service configuration, or the result of discovery.
    pub async fn service_configuration(&self) -> Result<ServiceConfiguration> {
        self.core.service_configuration().await
    }

    /// Run `action` with fresh tokens of `state`, which must be the
    /// currently committed state.
    ///
    /// With `force_refresh` the tokens are refreshed even if still valid.
    /// The possibly refreshed state is committed exactly once, whether or not
    /// `action` succeeds, unless the store moved on while `action` ran. That
    /// write-back is dropped and a successful call fails with
    /// [`OidcError::StaleSession`].
    pub async fn with_tokens<T, E, F, Fut>(
        &self,
        state: &Arc<AuthState>,
        force_refresh: bool,
        action: F,
    ) -> std::result::Result<T, E>
    where
        F: FnOnce(FreshTokens) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: From<OidcError>,
    {
        self.core.with_tokens(state, force_refresh, action).await
    }

    /// Fresh authorization request for the configured client.
    pub async fn authorization_request(&self) -> Result<AuthorizationRequest> {
        let configuration = self.core.service_configuration().await?;
        Ok(AuthorizationRequest::new(configuration, &self.core.config.client))
    }

    /// Run the full login flow through `agent`.
    pub async fn login(&self, agent: &dyn AuthorizationAgent) -> Result<LoginOutcome> {
        let request = self.authorization_request().await?;
        info!(endpoint = %request.configuration.authorization_endpoint, "starting login");

        let Some(redirect) = agent.authorize(&request).await? else {
            info!("login abandoned");
            return Ok(LoginOutcome::Abandoned);
        };

        self.on_login(AuthorizationResponse::from_redirect(&request, &redirect))
            .await?;
        Ok(LoginOutcome::Completed)
    }

    /// Merge the result of the interactive step and exchange the code.
    ///
    /// The merged state is committed before the exchange and again after it,
    /// including when the exchange fails. A result that leaves the state
    /// unchanged is not committed.
    pub async fn on_login(
        &self,
        result: std::result::Result<AuthorizationResponse, AuthorizationException>,
    ) -> Result<()> {
        let base = self
            .core
            .store
            .current()
            .map(|state| AuthState::clone(&state))
            .unwrap_or_default();
        let state = base.with_authorization_result(&result);
        if state != base {
            self.core.store.write(Some(state.clone())).await?;
        }

        match result {
            Ok(_) => self.core.exchange_code(state).await,
            Err(exception) => {
                warn!(error = %exception.error, kind = ?exception.kind, "authorization failed");
                Err(exception.into_authorization_error())
            }
        }
    }

    pub async fn logout(&self) -> Result<()> {
        info!("logging out");
        self.core.store.write(None).await?;
        Ok(())
    }
}

impl Drop for UserSessionService {
    fn drop(&mut self) {
        self.reconciler.abort();
    }
}

async fn reconcile(core: Arc<SessionCore>, status_tx: watch::Sender<LoginStatus>) {
    initialize(&core).await;

    let mut updates = core.store.subscribe();
    loop {
        let state = updates.borrow_and_update().clone();
        let next = LoginStatus::derive(state.as_ref(), &core);
        status_tx.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            debug!(status = %next, "login status changed");
            *current = next;
            true
        });
        if updates.changed().await.is_err() {
            break;
        }
    }
}

async fn initialize(core: &SessionCore) {
    let initial = core.store.current();

    if initial.as_ref().and_then(|state| state.config.as_ref()).is_none() {
        match core.service_configuration().await {
            Ok(configuration) if initial.is_none() => {
                if let Err(err) = core.store.write_if_absent(AuthState::new(configuration)).await {
                    warn!(error = %err, "failed to persist service configuration");
                }
            }
            Ok(_) => {}
            Err(err) => warn!(error = %err, "service discovery failed"),
        }
    }

    if let Some(state) = initial.filter(|state| state.has_pending_code_exchange()) {
        info!("resuming interrupted code exchange");
        if let Err(err) = core.exchange_code(AuthState::clone(&state)).await {
            warn!(error = %err, "resumed code exchange failed");
        }
    }
}
