use std::sync::Arc;

use strum::{Display, IntoStaticStr};

use super::service::SessionCore;
use super::user_session::UserSession;
use crate::auth::AuthState;

/// Observable login state of the application.
///
/// Two `LoggedIn` values are equal only when they wrap the same committed
/// auth state.
#[derive(Debug, Clone, PartialEq, Display, IntoStaticStr)]
pub enum LoginStatus {
    /// The persisted state has not been read yet.
    Loading,
    LoggedOut,
    LoggedIn(UserSession),
}

impl LoginStatus {
    /// Status for a committed store value.
    pub(crate) fn derive(state: Option<&Arc<AuthState>>, core: &Arc<SessionCore>) -> Self {
        match state {
            Some(state) if state.is_authorized() => {
                Self::LoggedIn(UserSession::new(Arc::clone(state), Arc::clone(core)))
            }
            _ => Self::LoggedOut,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }

    pub fn session(&self) -> Option<&UserSession> {
        match self {
            Self::LoggedIn(session) => Some(session),
            _ => None,
        }
    }
}
