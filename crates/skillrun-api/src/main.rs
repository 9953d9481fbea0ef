//! skillrun CLI and REST API entry point.
//!
//! Binary name: `skrun`
//!
//! Parses CLI arguments, initializes database and services, then dispatches
//! to the appropriate command handler or starts the REST API server together
//! with the worker pool and reconciler.

mod cli;
mod http;
mod state;

use clap::Parser;
use clap_complete::generate;
use tokio_util::sync::CancellationToken;

use cli::{Cli, Commands, PrincipalCommand};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Default filter when RUST_LOG is unset
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info,skillrun=debug",
        _ => "trace",
    };
    if let Err(e) = skillrun_observe::tracing_setup::init_tracing(filter, cli.otel) {
        eprintln!("warning: tracing setup failed: {e}");
    }

    // Shell completions don't need app state
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "skrun", &mut std::io::stdout());
        return Ok(());
    }

    let mut state = AppState::init().await?;

    match cli.command {
        Commands::Principal { action } => match action {
            PrincipalCommand::Create { name } => {
                cli::principal::create_principal(&state, &name, cli.json).await?;
            }
            PrincipalCommand::List => {
                cli::principal::list_principals(&state, cli.json).await?;
            }
        },

        Commands::Status => {
            cli::status::status(&state, cli.json).await?;
        }

        Commands::Reconcile => {
            cli::reconcile::reconcile(&state, cli.json).await?;
        }

        Commands::Serve {
            port,
            host,
            workers,
        } => {
            if let Some(workers) = workers {
                state.config.runner.workers = workers;
            }
            let host = host.unwrap_or_else(|| state.config.server.host.clone());
            let port = port.unwrap_or(state.config.server.port);

            let addr = format!("{host}:{port}");
            let listener = tokio::net::TcpListener::bind(&addr).await?;

            let shutdown = CancellationToken::new();
            let pool = state.worker_pool();
            let mut handles = pool.spawn(shutdown.clone());
            handles.push(state.reconciler().spawn(shutdown.clone()));

            if !cli.quiet {
                println!(
                    "  {} skillrun API listening on {} ({} workers)",
                    console::style("⚡").bold(),
                    console::style(format!("http://{addr}")).cyan(),
                    pool.workers()
                );
                println!("  {}", console::style("Press Ctrl+C to stop").dim());
            }
            tracing::info!(%addr, workers = pool.workers(), "server started");

            let router = http::router::build_router(state);

            axum::serve(listener, router)
                .with_graceful_shutdown(shutdown_signal())
                .await?;

            // Workers finish the run in hand, then exit
            shutdown.cancel();
            for handle in handles {
                if let Err(e) = handle.await {
                    tracing::warn!(error = %e, "background task ended abnormally");
                }
            }

            if !cli.quiet {
                println!("\n  Server stopped.");
            }
        }

        Commands::Completions { .. } => unreachable!("handled above"),
    }

    skillrun_observe::tracing_setup::shutdown_tracing();
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
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
                tracing::error!(error = %e, "failed to install SIGTERM handler");
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
    tracing::info!("shutdown signal received");
}
