//! OAuth2/OIDC primitives: discovery, authorization requests, token
//! endpoint calls and the persisted authorization state.

pub mod client;
pub mod configuration;
pub mod id_token;
pub mod request;
pub mod state;
pub mod store;
pub mod token;

pub use client::OidcClient;
pub use configuration::{DiscoveryDocument, ServiceConfiguration};
pub use id_token::IdToken;
pub use request::{
    AuthorizationException, AuthorizationRequest, AuthorizationResponse, ExceptionKind,
};
pub use state::AuthState;
pub use store::{
    AuthStateStore, FilePreferenceBackend, MemoryPreferenceBackend, PreferenceBackend,
};
pub use token::{TokenRequest, TokenResponse};
