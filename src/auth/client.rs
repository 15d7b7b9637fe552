use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::Utc;
use reqwest::{header, redirect, Client, StatusCode};
use tracing::debug;
use url::Url;

use super::configuration::{discovery_url, DiscoveryDocument, ServiceConfiguration};
use super::request::AuthorizationException;
use super::token::{TokenRequest, TokenResponse, WireErrorResponse, WireTokenResponse};
use crate::config::{ClientSettings, SessionConfig};
use crate::error::{OidcError, Result};

/// HTTP transport for discovery and the token endpoint.
///
/// Redirects are never followed; a 3xx from either endpoint is a failure.
#[derive(Debug, Clone)]
pub struct OidcClient {
    http: Client,
}

impl OidcClient {
    pub fn new(config: &SessionConfig) -> Result<Self> {
        Self::with_timeouts(config.connect_timeout, config.read_timeout)
    }

    pub fn with_timeouts(connect_timeout: Duration, read_timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(read_timeout)
            .redirect(redirect::Policy::none())
            .build()?;
        Ok(Self { http })
    }

    /// Underlying client, shared with downstream API calls.
    pub fn http(&self) -> &Client {
        &self.http
    }

    /// `GET {issuer}/.well-known/openid-configuration`.
    pub async fn fetch_configuration(&self, issuer: &Url) -> Result<ServiceConfiguration> {
        let url = discovery_url(issuer)?;
        debug!(%url, "fetching discovery document");

        let resp = self
            .http
            .get(url.clone())
            .header(header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|err| OidcError::ConfigurationFetchFailed(format!("{url}: {err}")))?;

        if !resp.status().is_success() {
            return Err(OidcError::ConfigurationFetchFailed(format!(
                "{url} returned status {}",
                resp.status()
            )));
        }

        let doc: DiscoveryDocument = resp
            .json()
            .await
            .map_err(|err| OidcError::ConfigurationFetchFailed(format!("{url}: {err}")))?;
        ServiceConfiguration::from_discovery(doc)
    }

    /// POST a grant to the token endpoint.
    ///
    /// OAuth error bodies come back as token-endpoint exceptions, which the
    /// auth state records; anything else (transport, unexpected payloads) is a
    /// general exception that leaves the state alone.
    pub async fn perform_token_request(
        &self,
        configuration: &ServiceConfiguration,
        client: &ClientSettings,
        request: &TokenRequest,
    ) -> std::result::Result<TokenResponse, AuthorizationException> {
        let mut form = request.form_params();
        let mut builder = self
            .http
            .post(configuration.token_endpoint.clone())
            .header(header::ACCEPT, "application/json");
        match &client.client_secret {
            Some(secret) => {
                builder = builder.header(
                    header::AUTHORIZATION,
                    basic_authorization(&client.client_id, secret),
                );
            }
            None => form.push(("client_id", client.client_id.clone())),
        }

        debug!(
            grant_type = request.grant_type(),
            endpoint = %configuration.token_endpoint,
            "token request"
        );

        let resp = builder
            .form(&form)
            .send()
            .await
            .map_err(|err| AuthorizationException::general(format!("token request: {err}")))?;
        let received_at = Utc::now();
        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|err| AuthorizationException::general(format!("token response: {err}")))?;

        if status.is_success() {
            let payload: WireTokenResponse = serde_json::from_str(&body).map_err(|err| {
                AuthorizationException::general(format!("token response is not valid JSON: {err}"))
            })?;
            return Ok(TokenResponse::from_wire(payload, received_at));
        }

        Err(error_from_body(status, &body))
    }
}

fn error_from_body(status: StatusCode, body: &str) -> AuthorizationException {
    match serde_json::from_str::<WireErrorResponse>(body) {
        Ok(err) => AuthorizationException::token_endpoint(
            err.error,
            err.error_description,
            err.error_uri,
        ),
        Err(_) => AuthorizationException::general(format!(
            "token endpoint returned status {status}"
        )),
    }
}

/// `client_secret_basic`: id and secret are form-urlencoded before joining.
fn basic_authorization(client_id: &str, secret: &str) -> String {
    let credentials = format!("{}:{}", urlencoded(client_id), urlencoded(secret));
    format!("Basic {}", STANDARD.encode(credentials))
}

fn urlencoded(input: &str) -> String {
    url::form_urlencoded::byte_serialize(input.as_bytes()).collect()
}
