//! Calls to the protected downstream API.

use reqwest::{header, Client};
use tracing::debug;
use url::Url;

use crate::error::{OidcError, Result};
use crate::session::UserSession;

/// `GET url`, optionally with `Authorization: Bearer <token>`.
///
/// Returns the response body; any non-2xx status is an
/// [`OidcError::ApiRequestFailed`].
pub async fn send_api_request(client: &Client, url: &Url, bearer: Option<&str>) -> Result<String> {
    let mut request = client.get(url.clone());
    if let Some(token) = bearer {
        request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    debug!(%url, authorized = bearer.is_some(), "sending API request");

    let resp = request.send().await?;
    let status = resp.status();
    let body = resp.text().await?;
    if !status.is_success() {
        return Err(OidcError::ApiRequestFailed {
            status: status.as_u16(),
            body,
        });
    }
    Ok(body)
}

/// Call the API with the session's access token, refreshing it if needed.
pub async fn send_authorized_request(
    session: &UserSession,
    client: &Client,
    url: &Url,
) -> Result<String> {
    session
        .with_tokens(|tokens| async move {
            send_api_request(client, url, Some(&tokens.access_token)).await
        })
        .await
}
