//! CLI command handlers.

use std::io::Write;

use async_trait::async_trait;
use chrono::Utc;
use url::Url;

use crate::api::{send_api_request, send_authorized_request};
use crate::auth::AuthorizationRequest;
use crate::error::{OidcError, Result};
use crate::session::{
    AuthorizationAgent, LoginOutcome, LoginStatus, UserSession, UserSessionService,
};

/// Prints the authorization URL and reads the redirect URL from stdin.
///
/// An empty line abandons the login.
pub struct PasteRedirectAgent;

#[async_trait]
impl AuthorizationAgent for PasteRedirectAgent {
    async fn authorize(&self, request: &AuthorizationRequest) -> Result<Option<Url>> {
        println!("🔗 Visit: {}", request.to_url());
        println!(
            "📋 After signing in, paste the URL you were redirected to ({}...):",
            request.redirect_uri
        );
        print!("> ");
        std::io::stdout().flush()?;

        let line = tokio::task::spawn_blocking(|| {
            let mut line = String::new();
            std::io::stdin().read_line(&mut line).map(|_| line)
        })
        .await
        .map_err(|err| OidcError::Storage(format!("stdin reader failed: {err}")))??;

        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        Url::parse(line)
            .map(Some)
            .map_err(|err| OidcError::InvalidResponse(format!("not a URL ({line}): {err}")))
    }
}

/// Handle `oidc-session login`.
pub async fn handle_login(service: &UserSessionService) -> std::result::Result<(), Box<dyn std::error::Error>> {
    if let LoginStatus::LoggedIn(session) = service.loaded_status().await {
        println!(
            "ℹ️  Already logged in as {}",
            session.username().unwrap_or("<unknown>")
        );
        return Ok(());
    }

    match service.login(&PasteRedirectAgent).await? {
        LoginOutcome::Completed => {
            let session = logged_in_session(service).await?;
            println!(
                "✅ Logged in as {}",
                session.username().unwrap_or("<unknown>")
            );
        }
        LoginOutcome::Abandoned => println!("❌ Login abandoned"),
    }
    Ok(())
}

/// Session of the next `LoggedIn` status the service publishes.
async fn logged_in_session(service: &UserSessionService) -> Result<UserSession> {
    let mut status = service.watch_status();
    let session = status
        .wait_for(|status| status.session().is_some())
        .await
        .map_err(|_| OidcError::Storage("login status is no longer published".to_string()))?
        .session()
        .cloned();
    session.ok_or(OidcError::NotLoggedIn)
}

/// Handle `oidc-session status`.
pub async fn handle_status(service: &UserSessionService) -> std::result::Result<(), Box<dyn std::error::Error>> {
    println!("🔐 Login Status\n");
    println!("  Issuer: {}", service.config().issuer);

    match service.loaded_status().await {
        LoginStatus::LoggedIn(session) => {
            println!("  Status: ✅ Logged in");
            println!("  Name:   {}", session.username().unwrap_or("-"));
            println!("  Email:  {}", session.email().unwrap_or("-"));
            match session.auth_state().access_token_expiration_time() {
                Some(expires) if expires > Utc::now() => {
                    println!("  Token:  expires {}", expires.format("%Y-%m-%d %H:%M:%S"))
                }
                Some(_) => println!("  Token:  ⚠️  expired (refreshed on next use)"),
                None => println!("  Token:  no expiry"),
            }
        }
        other => {
            println!("  Status: ❌ {other}");
            if let Some(ex) = service
                .store()
                .current()
                .and_then(|state| state.authorization_exception.clone())
            {
                println!("  Last error: {}", ex.error);
            }
        }
    }
    Ok(())
}

/// Handle `oidc-session tokens [--force-refresh]`.
pub async fn handle_tokens(
    service: &UserSessionService,
    force_refresh: bool,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let LoginStatus::LoggedIn(session) = service.loaded_status().await else {
        return Err(OidcError::NotLoggedIn.into());
    };

    let tokens = service
        .with_tokens(session.auth_state(), force_refresh, |tokens| async move {
            Ok::<_, OidcError>(tokens)
        })
        .await?;

    println!("Access token: {}", tokens.access_token);
    if let Some(id_token) = tokens.id_token {
        println!("ID token:     {id_token}");
    }
    if let Some(expires) = service
        .store()
        .current()
        .and_then(|state| state.access_token_expiration_time())
    {
        println!("Expires:      {}", expires.format("%Y-%m-%d %H:%M:%S"));
    }
    Ok(())
}

/// Handle `oidc-session call [--no-auth]`.
pub async fn handle_call(
    service: &UserSessionService,
    no_auth: bool,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let http = service.client().http();
    let url = &service.config().api_url;

    let body = if no_auth {
        send_api_request(http, url, None).await?
    } else {
        let LoginStatus::LoggedIn(session) = service.loaded_status().await else {
            return Err(OidcError::NotLoggedIn.into());
        };
        send_authorized_request(&session, http, url).await?
    };
    println!("{body}");
    Ok(())
}

/// Handle `oidc-session logout`.
pub async fn handle_logout(service: &UserSessionService) -> std::result::Result<(), Box<dyn std::error::Error>> {
    service.logout().await?;
    println!("✅ Logged out");
    Ok(())
}
