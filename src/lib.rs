//! oidc-session: OAuth2/OIDC client sessions with a persisted, observable
//! authorization state.
//!
//! A [`UserSessionService`](session::UserSessionService) keeps a
//! [`LoginStatus`](session::LoginStatus) in sync with the auth state stored
//! on disk, runs the authorization code flow with PKCE, and hands fresh
//! access tokens to callers through `with_tokens`.
//!
//! # Quick Start
//!
//! ```no_run
//! use oidc_session::config::SessionConfig;
//! use oidc_session::session::{LoginStatus, UserSessionService};
//!
//! # async fn example() -> oidc_session::error::Result<()> {
//! let config = SessionConfig::from_env()?;
//! let service = UserSessionService::from_config(config.clone())?;
//!
//! if let LoginStatus::LoggedIn(session) = service.loaded_status().await {
//!     let body = oidc_session::api::send_authorized_request(
//!         &session,
//!         service.client().http(),
//!         &config.api_url,
//!     )
//!     .await?;
//!     println!("{body}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod session;

#[cfg(feature = "cli")]
pub mod cli;
