//! Stdio transport for the MCP server.
//!
//! JSON-RPC on stdin/stdout. Logs go to stderr so stdout stays clean.

use crate::error::{AppError, AppResult};
use crate::mcp::NlSqlService;
use crate::state::AppState;
use crate::transport::{Transport, wait_for_signal};
use rmcp::{ServiceExt, transport::stdio};
use std::sync::Arc;
use tracing::{info, warn};

pub struct StdioTransport {
    state: Arc<AppState>,
}

impl StdioTransport {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }
}

impl Transport for StdioTransport {
    async fn run(&self) -> AppResult<()> {
        info!("Starting MCP server with stdio transport");

        let service = NlSqlService::new(self.state.clone());
        let running_service = service
            .serve(stdio())
            .await
            .map_err(|e| AppError::internal(format!("Failed to start stdio transport: {}", e)))?;

        let shutdown_requested = tokio::select! {
            result = running_service.waiting() => {
                match result {
                    Ok(_quit_reason) => info!("Stdio transport completed normally"),
                    Err(e) => {
                        warn!(error = %e, "Stdio transport error");
                        return Err(AppError::internal(format!("Stdio transport error: {}", e)));
                    }
                }
                false
            }
            _ = wait_for_signal() => {
                info!("Shutdown signal received (send again to force exit)");
                true
            }
        };

        if shutdown_requested {
            tokio::spawn(async {
                wait_for_signal().await;
                warn!("Received second signal, forcing immediate exit");
                std::process::exit(1);
            });
        }

        info!("Closing database connections");
        self.state.close().await;

        if shutdown_requested {
            // a blocking stdin read cannot be interrupted by select!
            info!("Exiting process");
            std::process::exit(0);
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        "stdio"
    }
}
