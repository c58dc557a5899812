//! SQL generation from a prompt.

use super::prompt::Prompt;
use crate::error::{AppError, AppResult};
use crate::llm::{CompletionRequest, LlmClient};
use crate::models::GeneratedQuery;
use crate::tools::sql_guard::SqlGuard;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, info};

/// Turns a prompt into one guarded SQL statement.
#[derive(Clone)]
pub struct SqlSynthesizer {
    llm: Arc<dyn LlmClient>,
    guard: SqlGuard,
    timeout: Duration,
}

impl SqlSynthesizer {
    pub fn new(llm: Arc<dyn LlmClient>, guard: SqlGuard, timeout: Duration) -> Self {
        Self {
            llm,
            guard,
            timeout,
        }
    }

    /// Ask the model for SQL and attach the guard's verdict. A rejected
    /// statement is still returned; the caller decides what to do with it.
    pub async fn synthesize(&self, prompt: &Prompt) -> AppResult<GeneratedQuery> {
        let request = CompletionRequest::new(&prompt.system, &prompt.user);
        let start = Instant::now();

        let raw_response = timeout(self.timeout, self.llm.complete(&request))
            .await
            .map_err(|_| {
                AppError::llm(format!(
                    "no response within {}s",
                    self.timeout.as_secs()
                ))
            })??;

        let sql = extract_sql(&raw_response)
            .ok_or_else(|| AppError::llm("response contains no SQL"))?;
        let verdict = self.guard.validate(&sql);

        info!(
            model = %self.llm.model(),
            sql = %sql,
            valid = verdict.is_valid(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "SQL generated"
        );
        debug!(raw_response = %raw_response, "Raw model output");

        Ok(GeneratedQuery {
            raw_response,
            sql,
            verdict,
        })
    }
}

/// Pull the SQL statement out of a model response.
///
/// Prefers a ```` ```sql ```` fence, then any fence, then the whole text.
/// A leading `SQL:` label is dropped. `None` when nothing is left.
pub fn extract_sql(response: &str) -> Option<String> {
    let body = fenced_block(response, true)
        .or_else(|| fenced_block(response, false))
        .unwrap_or(response)
        .trim();

    let body = strip_label(body).trim();
    if body.is_empty() {
        None
    } else {
        Some(body.to_string())
    }
}

/// Content of the first fenced block. With `sql_only`, only blocks tagged
/// `sql` count.
fn fenced_block(text: &str, sql_only: bool) -> Option<&str> {
    let mut rest = text;
    while let Some(open) = rest.find("```") {
        let after = &rest[open + 3..];
        let line_end = after.find('\n').unwrap_or(after.len());

        // ```SELECT 1``` on a single line has no tag
        if let Some(inline_end) = after[..line_end].find("```") {
            if !sql_only {
                return Some(&after[..inline_end]);
            }
            rest = &after[inline_end + 3..];
            continue;
        }

        let tag = after[..line_end].trim();
        let content_start = (line_end + 1).min(after.len());
        let content = &after[content_start..];
        let close = content.find("```");

        let matches = if sql_only {
            tag.eq_ignore_ascii_case("sql")
        } else {
            true
        };
        if matches {
            return Some(match close {
                Some(end) => &content[..end],
                None => content,
            });
        }
        match close {
            Some(end) => rest = &content[end + 3..],
            None => return None,
        }
    }
    None
}

fn strip_label(text: &str) -> &str {
    let prefix_len = "SQL:".len();
    match text.get(..prefix_len) {
        Some(prefix) if prefix.eq_ignore_ascii_case("SQL:") => &text[prefix_len..],
        _ => text,
    }
}
