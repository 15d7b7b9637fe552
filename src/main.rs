//! oidc-session CLI binary entry point.

use clap::Parser;
use oidc_session::cli::{Cli, Commands};
use oidc_session::config::SessionConfig;
use oidc_session::session::UserSessionService;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = SessionConfig::load(cli.config.as_deref())?;
    let service = UserSessionService::from_config(config)?;

    match cli.command {
        Commands::Login => oidc_session::cli::auth::handle_login(&service).await,
        Commands::Status => oidc_session::cli::auth::handle_status(&service).await,
        Commands::Tokens(args) => {
            oidc_session::cli::auth::handle_tokens(&service, args.force_refresh).await
        }
        Commands::Call(args) => oidc_session::cli::auth::handle_call(&service, args.no_auth).await,
        Commands::Logout => oidc_session::cli::auth::handle_logout(&service).await,
    }
}
