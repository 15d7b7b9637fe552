//! Login status, user sessions and the service that keeps them in sync with
//! the persisted auth state.

pub mod agent;
pub mod service;
pub mod status;
pub mod user_session;

pub use agent::AuthorizationAgent;
pub use service::{LoginOutcome, UserSessionService};
pub use status::LoginStatus;
pub use user_session::{FreshTokens, UserSession};
