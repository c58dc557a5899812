//! Output formatting for answers.
//!
//! The CLI and the `ask` tool can render rows as JSON (default), an ASCII
//! table or a Markdown table.

use crate::models::AskResponse;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use unicode_width::UnicodeWidthStr;

/// Output format for answers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// JSON format (default)
    #[default]
    Json,
    /// ASCII table format (like psql)
    Table,
    /// Markdown table format
    Markdown,
}

pub fn format_value(value: &JsonValue) -> String {
    match value {
        JsonValue::Null => "NULL".to_string(),
        JsonValue::Bool(b) => b.to_string(),
        JsonValue::Number(n) => n.to_string(),
        JsonValue::String(s) => s.clone(),
        JsonValue::Array(_) | JsonValue::Object(_) => value.to_string(),
    }
}

/// Render the answer as text: summary, SQL and the rows in `format`.
/// JSON output is the serialized response.
pub fn render_answer(response: &AskResponse, format: OutputFormat) -> String {
    let table = match format {
        OutputFormat::Json => {
            return serde_json::to_string_pretty(response)
                .unwrap_or_else(|e| format!("{{\"error\": \"{}\"}}", e));
        }
        OutputFormat::Table => format_as_table(
            &response.columns,
            &response.rows,
            response.truncated,
            response.execution_time_ms,
        ),
        OutputFormat::Markdown => {
            format_as_markdown(&response.columns, &response.rows, response.truncated)
        }
    };

    let summary = match &response.summary_error {
        Some(error) => format!("(sin resumen: {})", error),
        None => response.summary.clone(),
    };
    format!("{}\n\nSQL: {}\n\n{}", summary, response.sql, table)
}

pub fn format_as_table(
    columns: &[String],
    rows: &[Vec<JsonValue>],
    truncated: bool,
    execution_time_ms: u64,
) -> String {
    if columns.is_empty() {
        return "Empty set".to_string();
    }

    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|row| row.iter().map(format_value).collect())
        .collect();

    let mut widths: Vec<usize> = columns.iter().map(|c| c.width()).collect();
    for row in &cells {
        for (i, cell) in row.iter().enumerate().take(widths.len()) {
            widths[i] = widths[i].max(cell.width());
        }
    }

    let mut output = String::new();
    let separator: String = widths
        .iter()
        .map(|w| format!("+{}", "-".repeat(w + 2)))
        .collect::<String>()
        + "+\n";

    output.push_str(&separator);
    let header: String = columns
        .iter()
        .zip(&widths)
        .map(|(col, w)| format!("| {} ", pad_center(col, *w)))
        .collect::<String>()
        + "|\n";
    output.push_str(&header);
    output.push_str(&separator);

    for (row, cell_row) in rows.iter().zip(&cells) {
        let row_str: String = widths
            .iter()
            .enumerate()
            .map(|(i, w)| {
                let cell = cell_row.get(i).map(String::as_str).unwrap_or("NULL");
                // Right-align numbers, left-align others
                if matches!(row.get(i), Some(JsonValue::Number(_))) {
                    format!("| {} ", pad_left(cell, *w))
                } else {
                    format!("| {} ", pad_right(cell, *w))
                }
            })
            .collect::<String>()
            + "|\n";
        output.push_str(&row_str);
    }

    output.push_str(&separator);

    let row_text = if rows.len() == 1 { "row" } else { "rows" };
    let truncated_text = if truncated { " (truncated)" } else { "" };
    output.push_str(&format!(
        "{} {} in set{} ({:.2} sec)\n",
        rows.len(),
        row_text,
        truncated_text,
        execution_time_ms as f64 / 1000.0
    ));

    output
}

pub fn format_as_markdown(columns: &[String], rows: &[Vec<JsonValue>], truncated: bool) -> String {
    if columns.is_empty() {
        return "*Empty set*".to_string();
    }

    let mut output = String::new();

    let header: String = columns
        .iter()
        .map(|c| format!("| {} ", c))
        .collect::<String>()
        + "|\n";
    output.push_str(&header);

    let sep: String = columns.iter().map(|_| "|---").collect::<String>() + "|\n";
    output.push_str(&sep);

    for row in rows {
        let row_str: String = row
            .iter()
            .map(|value| format!("| {} ", format_value(value).replace('|', "\\|")))
            .collect::<String>()
            + "|\n";
        output.push_str(&row_str);
    }

    let truncated_text = if truncated { " *(truncated)*" } else { "" };
    output.push_str(&format!("\n*{} rows*{}", rows.len(), truncated_text));

    output
}

// std padding counts chars, not display columns
fn pad_right(s: &str, width: usize) -> String {
    format!("{}{}", s, " ".repeat(width.saturating_sub(s.width())))
}

fn pad_left(s: &str, width: usize) -> String {
    format!("{}{}", " ".repeat(width.saturating_sub(s.width())), s)
}

fn pad_center(s: &str, width: usize) -> String {
    let total = width.saturating_sub(s.width());
    let left = total / 2;
    format!("{}{}{}", " ".repeat(left), s, " ".repeat(total - left))
}
