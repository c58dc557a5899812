//! HTTP transport: JSON endpoints and MCP streamable HTTP on one listener.
//!
//! | Method | Path              | Body / response                         |
//! |--------|-------------------|-----------------------------------------|
//! | POST   | `/question`       | `{"texto": "..."}` → answer             |
//! | GET    | `/schema`         | cached schema snapshot                  |
//! | POST   | `/schema/refresh` | re-introspected snapshot                |
//! | GET    | `/diagnostics`    | report, 200 when healthy, 503 otherwise |
//! | GET    | `/health`         | `ok`                                    |
//!
//! The MCP service is mounted at the configured endpoint (`/mcp` by default).

use crate::error::{AppError, AppResult};
use crate::mcp::NlSqlService;
use crate::models::{DiagnosticsReport, SchemaSnapshot};
use crate::state::AppState;
use crate::tools::{AskInput, AskOutput, AskToolHandler, DiagnosticsProbe, SchemaToolHandler};
use crate::transport::{Transport, wait_for_signal};
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use rmcp::transport::streamable_http_server::{
    StreamableHttpService, session::local::LocalSessionManager,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

/// SSE connections may keep the server alive indefinitely after a shutdown
/// signal; give them this long.
const GRACEFUL_TIMEOUT: Duration = Duration::from_secs(30);

pub struct HttpTransport {
    state: Arc<AppState>,
    host: String,
    port: u16,
    /// MCP endpoint path
    endpoint: String,
}

impl HttpTransport {
    pub fn new(
        state: Arc<AppState>,
        host: impl Into<String>,
        port: u16,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            state,
            host: host.into(),
            port,
            endpoint: endpoint.into(),
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// Build the full router: JSON endpoints plus the MCP service at
/// `mcp_endpoint`.
pub fn router(state: Arc<AppState>, mcp_endpoint: &str) -> Router {
    let mcp_state = state.clone();
    let service = StreamableHttpService::new(
        move || Ok(NlSqlService::new(mcp_state.clone())),
        LocalSessionManager::default().into(),
        Default::default(),
    );

    let app = api_router(state);
    // nest_service doesn't support the root path
    if mcp_endpoint == "/" {
        app.fallback_service(service)
    } else {
        app.nest_service(mcp_endpoint, service)
    }
}

/// The JSON endpoints alone. Browsers on any origin may call them.
pub fn api_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/question", post(question))
        .route("/schema", get(schema))
        .route("/schema/refresh", post(refresh_schema))
        .route("/diagnostics", get(diagnostics))
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn question(
    State(state): State<Arc<AppState>>,
    Json(input): Json<AskInput>,
) -> Result<Json<AskOutput>, AppError> {
    AskToolHandler::new(state).ask(input).await.map(Json)
}

async fn schema(State(state): State<Arc<AppState>>) -> Result<Json<SchemaSnapshot>, AppError> {
    SchemaToolHandler::new(state).get_schema().await.map(Json)
}

async fn refresh_schema(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SchemaSnapshot>, AppError> {
    SchemaToolHandler::new(state).refresh_schema().await.map(Json)
}

async fn diagnostics(State(state): State<Arc<AppState>>) -> (StatusCode, Json<DiagnosticsReport>) {
    let report = DiagnosticsProbe::new(state).run().await;
    let status = if report.healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report))
}

async fn health() -> &'static str {
    "ok"
}

impl Transport for HttpTransport {
    async fn run(&self) -> AppResult<()> {
        let bind_addr = self.bind_addr();
        info!("Starting HTTP transport on {}", bind_addr);

        let app = router(self.state.clone(), &self.endpoint);

        let listener = TcpListener::bind(&bind_addr)
            .await
            .map_err(|e| AppError::config(format!("Failed to bind to {}: {}", bind_addr, e)))?;

        info!(endpoint = %self.endpoint, "MCP endpoint ready");

        let shutdown_notify = Arc::new(tokio::sync::Notify::new());
        let shutdown_notify_clone = shutdown_notify.clone();
        let shutdown_signal = async move {
            wait_for_signal().await;
            shutdown_notify_clone.notify_one();
        };

        let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal);

        tokio::select! {
            result = server => {
                match result {
                    Ok(()) => info!("HTTP server stopped"),
                    Err(e) => {
                        error!(error = %e, "HTTP server error");
                        return Err(AppError::internal(format!("HTTP server error: {}", e)));
                    }
                }
            }
            _ = async {
                shutdown_notify.notified().await;
                info!(
                    timeout_secs = GRACEFUL_TIMEOUT.as_secs(),
                    "Waiting for connections to close (send signal again to force exit)..."
                );
                tokio::select! {
                    _ = tokio::time::sleep(GRACEFUL_TIMEOUT) => {
                        warn!("Graceful shutdown timeout, forcing exit");
                    }
                    _ = wait_for_signal() => {
                        warn!("Received second signal, forcing immediate exit");
                    }
                }
            } => {}
        }

        info!("Closing database connections");
        self.state.close().await;

        Ok(())
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
