//! MCP service implementation using rmcp.
//!
//! This module defines the NlSqlService struct exposing the ask, schema
//! and diagnostics operations as MCP tools via the rmcp framework's macros.

use crate::models::{DiagnosticsReport, SchemaSnapshot};
use crate::state::AppState;
use crate::tools::{AskInput, AskOutput, AskToolHandler, DiagnosticsProbe, SchemaToolHandler};
use rmcp::Json;
use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::tool::ToolRouter,
    handler::server::wrapper::Parameters,
    model::{Implementation, ProtocolVersion, ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router,
};
use std::sync::Arc;

#[derive(Clone)]
pub struct NlSqlService {
    /// Shared state for all tools
    state: Arc<AppState>,
    /// Tool router for MCP tool dispatch (auto-generated)
    tool_router: ToolRouter<Self>,
}

impl NlSqlService {
    pub fn new(state: Arc<AppState>) -> Self {
        Self {
            state,
            tool_router: Self::tool_router(),
        }
    }
}

#[tool_router]
impl NlSqlService {
    #[tool(
        description = "Answer a natural-language question about the database.\nGenerates one read-only SELECT, runs it and summarizes the rows in Spanish.\nReturns the SQL, columns, rows and summary. Output format: json (default), table, or markdown."
    )]
    async fn ask(
        &self,
        Parameters(input): Parameters<AskInput>,
    ) -> Result<Json<AskOutput>, McpError> {
        let handler = AskToolHandler::new(self.state.clone());
        handler.ask(input).await.map(Json).map_err(McpError::from)
    }

    #[tool(
        description = "Get the database schema used to generate SQL.\nReturns tables, columns with types, primary keys and foreign keys. Served from the schema cache."
    )]
    async fn get_schema(&self) -> Result<Json<SchemaSnapshot>, McpError> {
        let handler = SchemaToolHandler::new(self.state.clone());
        handler
            .get_schema()
            .await
            .map(Json)
            .map_err(McpError::from)
    }

    #[tool(
        description = "Re-read the schema from the database and replace the cached copy.\nUse after tables or columns change."
    )]
    async fn refresh_schema(&self) -> Result<Json<SchemaSnapshot>, McpError> {
        let handler = SchemaToolHandler::new(self.state.clone());
        handler
            .refresh_schema()
            .await
            .map(Json)
            .map_err(McpError::from)
    }

    #[tool(
        description = "Check configuration, database connectivity and the schema cache.\nEach check reports ok and, on failure, the error."
    )]
    async fn diagnostics(&self) -> Json<DiagnosticsReport> {
        Json(DiagnosticsProbe::new(self.state.clone()).run().await)
    }
}

#[tool_handler]
impl ServerHandler for NlSqlService {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2025_03_26,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "nlsql-server".to_owned(),
                title: Some("NL SQL Server".to_owned()),
                version: env!("CARGO_PKG_VERSION").to_owned(),
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Natural-language access to one database.\n\
                \n\
                ## Workflow\n\
                1. Call `ask` with a question in plain language (Spanish or English)\n\
                2. Read `summary` for the answer, `sql` and `rows` for the details\n\
                3. Call `get_schema` to see which tables and columns exist\n\
                \n\
                ## Notes\n\
                - Only single read-only SELECT statements are ever executed\n\
                - Results are capped; `truncated` is true when more rows existed\n\
                - After schema changes, call `refresh_schema`\n\
                - If calls fail with database or LLM errors, call `diagnostics`"
                    .to_string(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::db::{DbPool, PoolConfig};
    use crate::llm::OpenAiClient;
    use std::time::Duration;

    fn create_test_service() -> NlSqlService {
        let settings = Settings::for_database("postgres://app@127.0.0.1:1/none");
        let pool = DbPool::connect_lazy(
            "postgres://app@127.0.0.1:1/none",
            PoolConfig {
                max_connections: 1,
                acquire_timeout: Duration::from_secs(1),
            },
        )
        .unwrap();
        let llm = Arc::new(OpenAiClient::new(&settings.llm).unwrap());
        NlSqlService::new(Arc::new(AppState::new(settings, pool, llm)))
    }

    #[tokio::test]
    async fn test_server_info() {
        let service = create_test_service();
        let info = service.get_info();
        assert_eq!(info.server_info.name, "nlsql-server");
        assert!(info.capabilities.tools.is_some());
    }

    #[tokio::test]
    async fn test_tools_registered() {
        let service = create_test_service();
        let names: Vec<String> = service
            .tool_router
            .list_all()
            .into_iter()
            .map(|t| t.name.to_string())
            .collect();
        for expected in ["ask", "get_schema", "refresh_schema", "diagnostics"] {
            assert!(names.iter().any(|n| n == expected), "missing tool {expected}");
        }
    }
}
