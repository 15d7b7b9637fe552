//! CLI entry point for oidc-session.

pub mod auth;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// OAuth2/OIDC session CLI
#[derive(Parser, Debug)]
#[command(
    name = "oidc-session",
    version,
    about = "Log in to an OIDC provider and call a protected API"
)]
pub struct Cli {
    /// Config file (defaults to ~/.oidc-session/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Log in through the browser and paste the redirect URL back
    Login,
    /// Show the current login status
    Status,
    /// Print the current tokens, refreshing them if needed
    Tokens(TokensArgs),
    /// Call the protected API
    Call(CallArgs),
    /// Forget the stored auth state
    Logout,
}

/// Arguments for `oidc-session tokens`.
#[derive(Parser, Debug)]
pub struct TokensArgs {
    /// Refresh even if the access token is still valid
    #[arg(long)]
    pub force_refresh: bool,
}

/// Arguments for `oidc-session call`.
#[derive(Parser, Debug)]
pub struct CallArgs {
    /// Send the request without an Authorization header
    #[arg(long)]
    pub no_auth: bool,
}
