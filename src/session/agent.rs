//! The interactive authorization step.

use async_trait::async_trait;
use url::Url;

use crate::auth::AuthorizationRequest;
use crate::error::Result;

/// Presents an authorization request to the user and captures the redirect.
///
/// Implementations open [`AuthorizationRequest::to_url`] in a user agent
/// and hand back the full redirect URL the server sent to
/// `request.redirect_uri`. Returning `Ok(None)` means the user abandoned the
/// flow; no state is changed in that case.
#[async_trait]
pub trait AuthorizationAgent: Send + Sync {
    async fn authorize(&self, request: &AuthorizationRequest) -> Result<Option<Url>>;
}
