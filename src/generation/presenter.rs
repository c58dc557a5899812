//! Natural-language summaries of query results.

use crate::llm::{CompletionRequest, LlmClient};
use crate::models::{AskResponse, QueryResult};
use serde_json::{Map, Value as JsonValue};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Rows shown to the model; the rest of the result is never sent.
pub const PREVIEW_ROWS: usize = 5;

const SUMMARY_TEMPERATURE: f32 = 0.3;
const SUMMARY_SYSTEM: &str = "Resume en español los resultados devueltos por la consulta SQL.";
const SUMMARY_INSTRUCTIONS: &str = "Devuelve un párrafo corto y claro para mostrar al usuario. No inventes datos que no estén en la muestra.";

#[derive(Clone)]
pub struct ResultPresenter {
    llm: Arc<dyn LlmClient>,
    timeout: Duration,
}

impl ResultPresenter {
    pub fn new(llm: Arc<dyn LlmClient>, timeout: Duration) -> Self {
        Self { llm, timeout }
    }

    /// Build the response. A failed summary leaves `summary` empty and sets
    /// `summary_error`; rows and SQL are returned either way.
    pub async fn present(&self, question: &str, sql: &str, result: QueryResult) -> AskResponse {
        let request = summary_request(question, sql, &result);
        let response = AskResponse::new(question, sql, result);

        let outcome = match timeout(self.timeout, self.llm.complete(&request)).await {
            Ok(outcome) => outcome.map_err(|e| e.to_string()),
            Err(_) => Err(format!(
                "summary not received within {}s",
                self.timeout.as_secs()
            )),
        };

        match outcome {
            Ok(summary) => {
                debug!(summary_len = summary.len(), "Summary generated");
                response.with_summary(summary.trim())
            }
            Err(error) => {
                warn!(error = %error, "Summary failed, returning rows only");
                response.with_summary_error(error)
            }
        }
    }
}

fn summary_request(question: &str, sql: &str, result: &QueryResult) -> CompletionRequest {
    let user = format!(
        "{}\nPregunta: {}\nConsulta: {}\nColumnas: {}\nEjemplo de filas: {}",
        SUMMARY_INSTRUCTIONS,
        question.trim(),
        sql,
        JsonValue::from(result.columns.clone()),
        JsonValue::Array(preview_rows(result)),
    );
    CompletionRequest::new(SUMMARY_SYSTEM, user).with_temperature(SUMMARY_TEMPERATURE)
}

/// First rows as `{column: value}` objects.
fn preview_rows(result: &QueryResult) -> Vec<JsonValue> {
    result
        .rows
        .iter()
        .take(PREVIEW_ROWS)
        .map(|row| {
            let object: Map<String, JsonValue> = result
                .columns
                .iter()
                .cloned()
                .zip(row.iter().cloned())
                .collect();
            JsonValue::Object(object)
        })
        .collect()
}
