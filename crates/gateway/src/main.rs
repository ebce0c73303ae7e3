use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use sr_gateway::api;
use sr_gateway::bootstrap;
use sr_gateway::cli::{self, Cli, Command, ConfigCommand};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        // Default to serve when no subcommand is given.
        None | Some(Command::Serve) => {
            init_tracing();
            let config = cli::load_config(&cli.config)?;
            run_server(config).await
        }
        Some(Command::Config(ConfigCommand::Validate)) => {
            let config = cli::load_config(&cli.config)?;
            if !cli::config_cmd::validate(&config) {
                std::process::exit(1);
            }
            Ok(())
        }
        Some(Command::Config(ConfigCommand::Show)) => {
            let config = cli::load_config(&cli.config)?;
            cli::config_cmd::show(&config);
            Ok(())
        }
        Some(Command::Version) => {
            println!("subrelay {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// Structured JSON tracing for the serve command.
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,sr_gateway=debug")),
        )
        .json()
        .init();
}

async fn run_server(config: sr_domain::config::Config) -> anyhow::Result<()> {
    tracing::info!("SubRelay starting");

    let boot = bootstrap::build(config)?;
    let cancel = CancellationToken::new();
    let supervisor = bootstrap::spawn_runtime(&boot, cancel.clone())?;

    let server = boot.state.config.current().server.clone();
    let addr = format!("{}:{}", server.host, server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding control plane to {addr}"))?;
    tracing::info!(%addr, "control plane listening");

    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown signal received");
            shutdown.cancel();
        }
    });

    axum::serve(listener, api::router(boot.state.clone()))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .context("control plane server failed")?;

    // Wait for the supervisor to flush any live session before exiting.
    let _ = supervisor.await;
    tracing::info!("SubRelay stopped");
    Ok(())
}
