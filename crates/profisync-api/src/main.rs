//! Profisync CLI and REST API entry point.
//!
//! Binary name: `psync`
//!
//! Parses CLI arguments, initializes the database and the engine, then
//! dispatches to the appropriate command handler or starts the REST API
//! server.

mod cli;
mod http;
mod state;

use clap::Parser;
use clap_complete::generate;

use cli::{Cli, Commands};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Set up tracing based on verbosity
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info,profisync=debug",
        _ => "trace",
    };
    let enable_otel = std::env::var("PROFISYNC_OTEL").is_ok();
    profisync_observe::tracing_setup::init_tracing(filter, enable_otel)
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    // Shell completions don't need app state
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "psync", &mut std::io::stdout());
        return Ok(());
    }

    // Validation is pure definition handling, no app state either
    if let Commands::Validate { path } = &cli.command {
        let result = cli::workflow::validate_file(path, cli.json);
        profisync_observe::tracing_setup::shutdown_tracing();
        return result;
    }

    // Initialize application state (DB, collaborators, engine)
    let state = AppState::init().await?;

    match cli.command {
        Commands::Run { workflow, input } => {
            cli::run::run_workflow(&state, &workflow, input.as_deref(), cli.json).await?;
        }

        Commands::Workflows => {
            cli::workflow::list_workflows(&state, cli.json)?;
        }

        Commands::Serve { host, port } => {
            let addr = format!("{host}:{port}");
            let listener = tokio::net::TcpListener::bind(&addr).await?;

            println!(
                "  {} Profisync API listening on {}",
                console::style("⚡").bold(),
                console::style(format!("http://{addr}")).cyan()
            );
            println!("  {}", console::style("Press Ctrl+C to stop").dim());

            let router = http::router::build_router(state);

            axum::serve(listener, router)
                .with_graceful_shutdown(shutdown_signal())
                .await?;

            println!("\n  Server stopped.");
        }

        Commands::Completions { .. } | Commands::Validate { .. } => unreachable!("handled above"),
    }

    profisync_observe::tracing_setup::shutdown_tracing();
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
