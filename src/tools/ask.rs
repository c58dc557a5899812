//! The ask operation: question in, rows and summary out.
//!
//! Pipeline: validate question, load schema, build prompt, generate SQL,
//! guard, execute, summarize. A rejected statement never reaches the
//! database.

use crate::error::{AppError, AppResult};
use crate::models::{AskResponse, MAX_QUESTION_CHARS, Verdict};
use crate::state::AppState;
use crate::tools::format::{OutputFormat, render_answer};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{Instrument, info, info_span, warn};
use uuid::Uuid;

/// Input for the ask tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct AskInput {
    /// Question in natural language, e.g. "¿Cuántos pedidos hubo en marzo?"
    #[serde(alias = "texto")]
    pub question: String,
    /// Also render rows as "table" or "markdown" text. Default: json only.
    #[serde(default)]
    pub format: OutputFormat,
}

/// Output from the ask tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct AskOutput {
    #[serde(flatten)]
    pub response: AskResponse,
    /// Pre-formatted answer when format is table or markdown
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formatted: Option<String>,
}

impl AskOutput {
    pub fn new(response: AskResponse, format: OutputFormat) -> Self {
        let formatted = match format {
            OutputFormat::Json => None,
            other => Some(render_answer(&response, other)),
        };
        Self {
            response,
            formatted,
        }
    }
}

/// Trim and bound a question.
pub fn validate_question(question: &str) -> AppResult<&str> {
    let trimmed = question.trim();
    if trimmed.is_empty() {
        return Err(AppError::invalid_question("question is empty"));
    }
    let chars = trimmed.chars().count();
    if chars > MAX_QUESTION_CHARS {
        return Err(AppError::invalid_question(format!(
            "question has {} characters, the limit is {}",
            chars, MAX_QUESTION_CHARS
        )));
    }
    Ok(trimmed)
}

/// Handler for the ask operation.
pub struct AskToolHandler {
    state: Arc<AppState>,
}

impl AskToolHandler {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    pub async fn ask(&self, input: AskInput) -> AppResult<AskOutput> {
        let response = self.answer(&input.question).await?;
        Ok(AskOutput::new(response, input.format))
    }

    /// Answer one question.
    pub async fn answer(&self, question: &str) -> AppResult<AskResponse> {
        let question = validate_question(question)?;
        let span = info_span!(
            "ask",
            request_id = %Uuid::new_v4(),
            question_len = question.chars().count()
        );

        async move {
            let start = Instant::now();
            let result = self.run(question).await;
            match &result {
                Ok(response) => info!(
                    row_count = response.row_count,
                    truncated = response.truncated,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Question answered"
                ),
                Err(e) => warn!(
                    category = e.category().as_str(),
                    error = %e,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Question failed"
                ),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn run(&self, question: &str) -> AppResult<AskResponse> {
        let state = &self.state;

        let snapshot = state.schema.snapshot().await?;
        let prompt = state.prompts.build(&snapshot, question);
        let generated = state.synthesizer.synthesize(&prompt).await?;

        if let Verdict::Rejected { class, reason } = generated.verdict {
            return Err(AppError::rejected(class, reason, generated.sql));
        }

        let result = state.executor.execute(&state.pool, &generated.sql).await?;
        info!(sql = %generated.sql, row_count = result.row_count, "Query executed");

        Ok(state.presenter.present(question, &generated.sql, result).await)
    }
}
