//! Parley CLI and REST API entry point.
//!
//! Binary name: `parley`
//!
//! Parses CLI arguments, initializes tracing, the database and services, then
//! dispatches to the command handler or starts the REST API server.

mod cli;
mod http;
mod state;

use clap::Parser;
use parley_observe::tracing_setup::{init_tracing, shutdown_tracing, TracingOptions};

use cli::{Cli, Commands};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let otel = matches!(cli.command, Commands::Serve { otel: true, .. });
    init_tracing(TracingOptions {
        otel,
        json: cli.json,
        filter: cli::log_filter(cli.verbose, cli.quiet).to_string(),
    })
    .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    let result = run(cli).await;
    shutdown_tracing();
    result
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Config => {
            let data_dir = parley_infra::config::resolve_data_dir();
            let config = parley_infra::config::apply_env_overrides(
                parley_infra::config::load_config(&data_dir).await,
                |k| std::env::var(k).ok(),
            );
            cli::config::show_config(&config, &data_dir, cli.json)?;
        }

        Commands::History { thread, limit } => {
            let state = AppState::init(false).await?;
            cli::history::show_history(&state, &thread, limit, cli.json).await?;
        }

        Commands::Chat {
            user,
            thread,
            language,
            text,
        } => {
            let state = AppState::init(true).await?;
            cli::chat::run_chat(&state, user, thread, language, text, cli.json).await?;
        }

        Commands::Serve { port, host, .. } => {
            let state = AppState::init(true).await?;

            let addr = format!("{host}:{port}");
            let listener = tokio::net::TcpListener::bind(&addr).await?;

            println!(
                "  {} Parley API listening on {}",
                console::style("⚡").bold(),
                console::style(format!("http://{addr}")).cyan()
            );
            println!("  {}", console::style("Press Ctrl+C to stop").dim());

            tracing::info!(
                %addr,
                data_dir = %state.data_dir.display(),
                model = %state.config.model_identifier,
                token_budget = state.config.token_budget,
                "server started"
            );

            let router = http::router::build_router(state);

            axum::serve(listener, router)
                .with_graceful_shutdown(shutdown_signal())
                .await?;

            println!("\n  Server stopped.");
        }
    }

    Ok(())
}

/// Wait for Ctrl+C or SIGTERM for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
