//! Prompt construction for SQL generation.
//!
//! Rendering is pure: the same snapshot, system prompt and question always
//! produce the same text.

use crate::models::{SchemaSnapshot, TableInfo};
use std::fmt::Write;

/// LIMIT the model is asked to add to potentially large queries.
pub const DEFAULT_SUGGESTED_LIMIT: u32 = 50;

const SYSTEM_SUFFIX: &str = "Responde solo con la consulta SQL final, sin formato adicional ni comentarios. Usa únicamente tablas y columnas del esquema.";

/// A two-message prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

impl Prompt {
    /// Both messages as one text, for logs and single-message models.
    pub fn to_text(&self) -> String {
        format!("{}\n\n{}", self.system, self.user)
    }
}

#[derive(Debug, Clone)]
pub struct PromptBuilder {
    system_prompt: String,
    suggested_limit: u32,
}

impl PromptBuilder {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            suggested_limit: DEFAULT_SUGGESTED_LIMIT,
        }
    }

    pub fn with_suggested_limit(mut self, limit: u32) -> Self {
        self.suggested_limit = limit;
        self
    }

    pub fn build(&self, snapshot: &SchemaSnapshot, question: &str) -> Prompt {
        let system = format!("{}\n{}", self.system_prompt.trim_end(), SYSTEM_SUFFIX);
        let user = format!(
            "Esquema detectado:\n{}\n\nPregunta del usuario: {}\nAñade LIMIT {} a las consultas potencialmente grandes.",
            render_schema(snapshot),
            question.trim(),
            self.suggested_limit
        );
        Prompt { system, user }
    }
}

/// `Tabla name:` followed by one `- column (type)` line per column.
pub fn render_schema(snapshot: &SchemaSnapshot) -> String {
    let mut out = String::new();
    for (i, table) in snapshot.tables.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        render_table(&mut out, table);
    }
    out
}

fn render_table(out: &mut String, table: &TableInfo) {
    let _ = write!(out, "Tabla {}:", table.name);
    for column in &table.columns {
        let _ = write!(out, "\n- {} ({})", column.name, column.data_type);
        if column.is_primary_key {
            out.push_str(" PK");
        }
        if !column.nullable {
            out.push_str(" NOT NULL");
        }
        if let Some(fk) = table.foreign_key_for(&column.name) {
            let _ = write!(out, " -> {}.{}", fk.referenced_table, fk.referenced_column);
        }
    }
}
