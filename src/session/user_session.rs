use std::fmt;
use std::future::Future;
use std::sync::Arc;

use super::service::SessionCore;
use crate::auth::AuthState;
use crate::error::OidcError;

/// Tokens handed to an action run through `with_tokens`.
#[derive(Clone, PartialEq, Eq)]
pub struct FreshTokens {
    pub access_token: String,
    pub id_token: Option<String>,
}

impl fmt::Debug for FreshTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FreshTokens")
            .field("access_token", &"[redacted]")
            .field("id_token", &self.id_token.as_ref().map(|_| "[redacted]"))
            .finish()
    }
}

/// Logged-in view of one committed auth state.
///
/// A new `UserSession` is created for every authorized state the store
/// commits. Once the store moves on, this session is stale and
/// [`with_tokens`](Self::with_tokens) fails with
/// [`OidcError::StaleSession`]; fetch the current session from the status
/// instead.
#[derive(Clone)]
pub struct UserSession {
    auth_state: Arc<AuthState>,
    username: Option<String>,
    email: Option<String>,
    core: Arc<SessionCore>,
}

impl UserSession {
    pub(crate) fn new(auth_state: Arc<AuthState>, core: Arc<SessionCore>) -> Self {
        let claims = auth_state.parsed_id_token();
        let claim = |name: &str| {
            claims
                .as_ref()
                .and_then(|token| token.claim_str(name))
                .map(str::to_string)
        };
        Self {
            username: claim("name"),
            email: claim("email"),
            auth_state,
            core,
        }
    }

    pub fn auth_state(&self) -> &Arc<AuthState> {
        &self.auth_state
    }

    /// `name` claim of the ID token.
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    /// `email` claim of the ID token.
    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    /// Run `action` with a valid access token, refreshing first if needed.
    ///
    /// # Example
    /// ```no_run
    /// # use oidc_session::session::UserSession;
    /// # async fn example(session: UserSession) -> oidc_session::error::Result<()> {
    /// let _token_len = session
    ///     .with_tokens(|tokens| async move { Ok::<_, oidc_session::error::OidcError>(tokens.access_token.len()) })
    ///     .await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn with_tokens<T, E, F, Fut>(&self, action: F) -> Result<T, E>
    where
        F: FnOnce(FreshTokens) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<OidcError>,
    {
        self.core.with_tokens(&self.auth_state, false, action).await
    }
}

impl PartialEq for UserSession {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.auth_state, &other.auth_state)
    }
}

impl fmt::Debug for UserSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserSession")
            .field("username", &self.username)
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}
