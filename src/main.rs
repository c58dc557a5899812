//! NL SQL Server - Main entry point.

use clap::Parser;
use nlsql_server::config::{Cli, Command, Config, TransportMode};
use nlsql_server::error::ErrorBody;
use nlsql_server::tools::format::render_answer;
use nlsql_server::tools::{AskToolHandler, DiagnosticsProbe, SchemaToolHandler};
use nlsql_server::transport::{HttpTransport, StdioTransport, Transport};
use nlsql_server::{AppError, AppState, Settings};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber. Logs go to stderr: stdout belongs to
/// the stdio transport and to command output.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

/// Settings that `serve` and `ask` accept: validated, or the process stops.
fn checked_state(settings: Settings) -> Result<Arc<AppState>, AppError> {
    settings.validate()?;
    Ok(Arc::new(AppState::from_settings(settings)?))
}

fn print_error(err: &AppError) {
    match serde_json::to_string_pretty(&ErrorBody::from(err)) {
        Ok(body) => eprintln!("{}", body),
        Err(_) => eprintln!("Error: {}", err),
    }
}

async fn serve(config: &Config, settings: Settings) -> Result<(), AppError> {
    let state = checked_state(settings)?;

    // warm the schema cache; a database that is down now may be up later
    match state.schema.snapshot().await {
        Ok(snapshot) => info!(tables = snapshot.table_count(), "Schema ready"),
        Err(e) => warn!(error = %e, "Schema not available yet"),
    }

    match config.transport {
        TransportMode::Stdio => StdioTransport::new(state).run().await,
        TransportMode::Http => {
            info!(
                host = %config.http_host,
                port = config.http_port,
                endpoint = %config.mcp_endpoint,
                "Using HTTP transport"
            );
            HttpTransport::new(
                state,
                &config.http_host,
                config.http_port,
                &config.mcp_endpoint,
            )
            .run()
            .await
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(&cli.config);

    let settings = match Settings::resolve(&cli.config) {
        Ok(settings) => settings,
        Err(e) => {
            print_error(&e);
            return Err(e.into());
        }
    };
    info!(
        database = %settings.masked_database_url().unwrap_or_else(|| "<none>".to_string()),
        "Starting NL SQL Server v{}",
        env!("CARGO_PKG_VERSION")
    );

    let command = cli.command.clone().unwrap_or(Command::Serve);
    let result = match command {
        Command::Serve => serve(&cli.config, settings).await,
        Command::Ask { question, format } => match checked_state(settings) {
            Ok(state) => {
                let answer = AskToolHandler::new(state.clone()).answer(&question).await;
                state.close().await;
                answer.map(|response| println!("{}", render_answer(&response, format)))
            }
            Err(e) => Err(e),
        },
        Command::Diagnose => {
            let report = DiagnosticsProbe::from_settings(settings).run().await;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.healthy() {
                std::process::exit(1);
            }
            Ok(())
        }
        Command::RefreshSchema => match checked_state(settings) {
            Ok(state) => {
                let refreshed = SchemaToolHandler::new(state.clone()).refresh_schema().await;
                state.close().await;
                refreshed.map(|snapshot| {
                    println!(
                        "Schema cache written to {}: {} tables, {} columns",
                        state.settings.schema_cache_path.display(),
                        snapshot.table_count(),
                        snapshot.column_count()
                    )
                })
            }
            Err(e) => Err(e),
        },
    };

    if let Err(e) = result {
        error!(error = %e, "Command failed");
        print_error(&e);
        return Err(e.into());
    }

    info!("Shutdown complete");
    Ok(())
}
