//! Read-only enforcement for generated SQL.
//!
//! A statement produced by the model is executed only if all of these hold:
//! - it parses to exactly one statement
//! - it starts with `SELECT` or `WITH` and is a query with no `SELECT ... INTO`
//!   and no data-modifying CTE
//! - no denied keyword or function appears in its token stream
//!
//! Uses [sqlparser](https://docs.rs/sqlparser/) for both the AST check and
//! the token scan, so string literals, comments and quoted identifiers are
//! never mistaken for keywords.

use crate::models::{DatabaseType, StatementClass, Verdict};
use sqlparser::ast::{Query, SetExpr, Statement};
use sqlparser::dialect::{Dialect, PostgreSqlDialect, SQLiteDialect};
use sqlparser::parser::Parser;
use sqlparser::tokenizer::{Token, Tokenizer};
use tracing::debug;

/// Keywords that start or embed a statement with side effects.
///
/// Words that are common column names (SET, RESET, COMMENT, LOCK, ANALYZE,
/// REPLACE) are left to the AST check.
const DENIED_KEYWORDS: &[(&str, StatementClass)] = &[
    ("INSERT", StatementClass::DataModifying),
    ("UPDATE", StatementClass::DataModifying),
    ("DELETE", StatementClass::DataModifying),
    ("MERGE", StatementClass::DataModifying),
    ("UPSERT", StatementClass::DataModifying),
    ("COPY", StatementClass::DataModifying),
    ("DROP", StatementClass::SchemaModifying),
    ("ALTER", StatementClass::SchemaModifying),
    ("TRUNCATE", StatementClass::SchemaModifying),
    ("CREATE", StatementClass::SchemaModifying),
    ("GRANT", StatementClass::Administrative),
    ("REVOKE", StatementClass::Administrative),
    ("CALL", StatementClass::Administrative),
    ("EXECUTE", StatementClass::Administrative),
    ("DO", StatementClass::Administrative),
    ("VACUUM", StatementClass::Administrative),
    ("REINDEX", StatementClass::Administrative),
    ("CLUSTER", StatementClass::Administrative),
    ("REFRESH", StatementClass::Administrative),
    ("LISTEN", StatementClass::Administrative),
    ("NOTIFY", StatementClass::Administrative),
    ("PREPARE", StatementClass::Administrative),
    ("DEALLOCATE", StatementClass::Administrative),
    ("ATTACH", StatementClass::Administrative),
    ("DETACH", StatementClass::Administrative),
    ("PRAGMA", StatementClass::Administrative),
];

/// Functions that change server state or reach outside the database.
/// Matched quoted or not: a quoted name still resolves to the function.
const DENIED_FUNCTIONS: &[&str] = &[
    "pg_terminate_backend",
    "pg_cancel_backend",
    "pg_reload_conf",
    "pg_rotate_logfile",
    "set_config",
    "lo_import",
    "lo_export",
    "lo_unlink",
    "pg_read_file",
    "pg_read_binary_file",
    "pg_ls_dir",
    "pg_stat_file",
    "pg_sleep",
    "nextval",
    "setval",
];

/// Function families denied by prefix. `dblink*` opens a second connection
/// outside the read-only transaction, and session advisory locks outlive
/// the rollback.
const DENIED_FUNCTION_PREFIXES: &[&str] = &["dblink", "pg_advisory", "pg_try_advisory"];

/// Validator for model-generated SQL.
#[derive(Debug, Clone, Copy)]
pub struct SqlGuard {
    db_type: DatabaseType,
}

impl SqlGuard {
    pub fn new(db_type: DatabaseType) -> Self {
        Self { db_type }
    }

    /// Decide whether `sql` may be executed. Anything ambiguous is rejected.
    pub fn validate(&self, sql: &str) -> Verdict {
        let verdict = self.check(sql);
        if let Verdict::Rejected { class, reason } = &verdict {
            debug!(class = %class, reason = %reason, "Generated SQL rejected");
        }
        verdict
    }

    fn check(&self, sql: &str) -> Verdict {
        if sql.trim().is_empty() {
            return Verdict::rejected(StatementClass::Unparseable, "empty statement");
        }

        let dialect = dialect_for(self.db_type);

        let mut statements = match Parser::parse_sql(dialect.as_ref(), sql) {
            Ok(statements) => statements,
            Err(e) => {
                return Verdict::rejected(
                    StatementClass::Unparseable,
                    format!("failed to parse SQL: {}", e),
                );
            }
        };
        let statement = match statements.len() {
            0 => return Verdict::rejected(StatementClass::Unparseable, "empty statement"),
            1 => statements.remove(0),
            n => {
                return Verdict::rejected(
                    StatementClass::Unparseable,
                    format!("expected exactly one statement, found {}", n),
                );
            }
        };

        let query = match &statement {
            Statement::Query(query) => query,
            other => {
                let (class, name) = classify_statement(other);
                return Verdict::rejected(class, format!("{} is not allowed", name));
            }
        };

        let tokens = match Tokenizer::new(dialect.as_ref(), sql).tokenize() {
            Ok(tokens) => tokens,
            Err(e) => {
                return Verdict::rejected(
                    StatementClass::Unparseable,
                    format!("failed to tokenize SQL: {}", e),
                );
            }
        };

        match first_word(&tokens) {
            Some(word) if word == "SELECT" || word == "WITH" => {}
            _ => {
                return Verdict::rejected(
                    StatementClass::Unparseable,
                    "statement must start with SELECT or WITH",
                );
            }
        }

        if let Some((class, reason)) = check_query(query) {
            return Verdict::rejected(class, reason);
        }

        if let Some((class, reason)) = scan_tokens(&tokens) {
            return Verdict::rejected(class, reason);
        }

        Verdict::Valid
    }
}

/// Get the appropriate SQL dialect for the given database type.
fn dialect_for(db_type: DatabaseType) -> Box<dyn Dialect> {
    match db_type {
        DatabaseType::PostgreSQL => Box::new(PostgreSqlDialect {}),
        DatabaseType::SQLite => Box::new(SQLiteDialect {}),
    }
}

/// First keyword of the statement, uppercased, skipping whitespace and comments.
fn first_word(tokens: &[Token]) -> Option<String> {
    tokens
        .iter()
        .find(|t| !matches!(t, Token::Whitespace(_)))
        .and_then(|t| match t {
            Token::Word(w) if w.quote_style.is_none() => Some(w.value.to_ascii_uppercase()),
            _ => None,
        })
}

/// Walk a query body looking for `SELECT ... INTO` and data-modifying CTEs.
fn check_query(query: &Query) -> Option<(StatementClass, String)> {
    if let Some(with) = &query.with {
        for cte in &with.cte_tables {
            if let Some(found) = check_query(&cte.query) {
                return Some(found);
            }
        }
    }
    check_set_expr(&query.body)
}

fn check_set_expr(expr: &SetExpr) -> Option<(StatementClass, String)> {
    match expr {
        SetExpr::Select(select) => select.into.as_ref().map(|_| {
            (
                StatementClass::DataModifying,
                "SELECT ... INTO creates a table".to_string(),
            )
        }),
        SetExpr::Query(query) => check_query(query),
        SetExpr::SetOperation { left, right, .. } => {
            check_set_expr(left).or_else(|| check_set_expr(right))
        }
        SetExpr::Values(_) | SetExpr::Table(_) => None,
        // INSERT / UPDATE / DELETE / MERGE bodies, e.g. inside a CTE
        _ => Some((
            StatementClass::DataModifying,
            "data-modifying statement inside query".to_string(),
        )),
    }
}

/// Deny-list scan. Literals are separate token kinds and never match.
fn scan_tokens(tokens: &[Token]) -> Option<(StatementClass, String)> {
    for token in tokens {
        let Token::Word(word) = token else {
            continue;
        };

        let lower = word.value.to_ascii_lowercase();
        if DENIED_FUNCTIONS.contains(&lower.as_str())
            || DENIED_FUNCTION_PREFIXES
                .iter()
                .any(|prefix| lower.starts_with(prefix))
        {
            return Some((
                StatementClass::Administrative,
                format!("function {} is not allowed", lower),
            ));
        }

        // Quoted identifiers are names, not keywords
        if word.quote_style.is_some() {
            continue;
        }
        let upper = word.value.to_ascii_uppercase();
        if let Some((keyword, class)) = DENIED_KEYWORDS.iter().find(|(k, _)| *k == upper) {
            return Some((*class, format!("keyword {} is not allowed", keyword)));
        }
    }
    None
}

/// Classify a parsed statement that is not a plain query.
fn classify_statement(stmt: &Statement) -> (StatementClass, &'static str) {
    match stmt {
        Statement::Query(_) => (StatementClass::Select, "SELECT"),

        // EXPLAIN ANALYZE runs its statement
        Statement::Explain { statement, .. } => match classify_statement(statement) {
            (StatementClass::Select, _) => (StatementClass::Administrative, "EXPLAIN"),
            inner => inner,
        },

        // =====================================================================
        // Data modification
        // =====================================================================
        Statement::Insert(_) => (StatementClass::DataModifying, "INSERT"),
        Statement::Update { .. } => (StatementClass::DataModifying, "UPDATE"),
        Statement::Delete(_) => (StatementClass::DataModifying, "DELETE"),
        Statement::Merge { .. } => (StatementClass::DataModifying, "MERGE"),
        Statement::Copy { .. } => (StatementClass::DataModifying, "COPY"),

        // =====================================================================
        // Schema modification
        // =====================================================================
        Statement::CreateTable { .. } => (StatementClass::SchemaModifying, "CREATE TABLE"),
        Statement::CreateView { .. } => (StatementClass::SchemaModifying, "CREATE VIEW"),
        Statement::CreateIndex(_) => (StatementClass::SchemaModifying, "CREATE INDEX"),
        Statement::CreateSchema { .. } => (StatementClass::SchemaModifying, "CREATE SCHEMA"),
        Statement::CreateDatabase { .. } => (StatementClass::SchemaModifying, "CREATE DATABASE"),
        Statement::CreateSequence { .. } => (StatementClass::SchemaModifying, "CREATE SEQUENCE"),
        Statement::CreateType { .. } => (StatementClass::SchemaModifying, "CREATE TYPE"),
        Statement::CreateFunction { .. } => (StatementClass::SchemaModifying, "CREATE FUNCTION"),
        Statement::CreateProcedure { .. } => {
            (StatementClass::SchemaModifying, "CREATE PROCEDURE")
        }
        Statement::CreateTrigger { .. } => (StatementClass::SchemaModifying, "CREATE TRIGGER"),
        Statement::CreateRole { .. } => (StatementClass::SchemaModifying, "CREATE ROLE"),
        Statement::CreateVirtualTable { .. } => {
            (StatementClass::SchemaModifying, "CREATE VIRTUAL TABLE")
        }
        Statement::CreateExtension { .. } => {
            (StatementClass::SchemaModifying, "CREATE EXTENSION")
        }
        Statement::CreatePolicy { .. } => (StatementClass::SchemaModifying, "CREATE POLICY"),

        Statement::AlterTable { .. } => (StatementClass::SchemaModifying, "ALTER TABLE"),
        Statement::AlterView { .. } => (StatementClass::SchemaModifying, "ALTER VIEW"),
        Statement::AlterIndex { .. } => (StatementClass::SchemaModifying, "ALTER INDEX"),
        Statement::AlterSchema { .. } => (StatementClass::SchemaModifying, "ALTER SCHEMA"),
        Statement::AlterRole { .. } => (StatementClass::SchemaModifying, "ALTER ROLE"),
        Statement::AlterPolicy { .. } => (StatementClass::SchemaModifying, "ALTER POLICY"),
        Statement::AlterType { .. } => (StatementClass::SchemaModifying, "ALTER TYPE"),

        Statement::Drop { .. } => (StatementClass::SchemaModifying, "DROP"),
        Statement::DropFunction { .. } => (StatementClass::SchemaModifying, "DROP FUNCTION"),
        Statement::DropProcedure { .. } => (StatementClass::SchemaModifying, "DROP PROCEDURE"),
        Statement::DropTrigger { .. } => (StatementClass::SchemaModifying, "DROP TRIGGER"),
        Statement::DropPolicy { .. } => (StatementClass::SchemaModifying, "DROP POLICY"),

        Statement::Truncate { .. } => (StatementClass::SchemaModifying, "TRUNCATE"),
        Statement::Comment { .. } => (StatementClass::SchemaModifying, "COMMENT"),

        // =====================================================================
        // Transaction control, procedures and server administration
        // =====================================================================
        Statement::StartTransaction { .. } => (StatementClass::Administrative, "BEGIN"),
        Statement::Commit { .. } => (StatementClass::Administrative, "COMMIT"),
        Statement::Rollback { .. } => (StatementClass::Administrative, "ROLLBACK"),
        Statement::Savepoint { .. } => (StatementClass::Administrative, "SAVEPOINT"),
        Statement::ReleaseSavepoint { .. } => {
            (StatementClass::Administrative, "RELEASE SAVEPOINT")
        }
        Statement::Call { .. } => (StatementClass::Administrative, "CALL"),
        Statement::Execute { .. } => (StatementClass::Administrative, "EXECUTE"),
        Statement::Prepare { .. } => (StatementClass::Administrative, "PREPARE"),
        Statement::Deallocate { .. } => (StatementClass::Administrative, "DEALLOCATE"),
        Statement::Grant { .. } => (StatementClass::Administrative, "GRANT"),
        Statement::Revoke { .. } => (StatementClass::Administrative, "REVOKE"),
        Statement::Set(_) => (StatementClass::Administrative, "SET"),
        Statement::Vacuum { .. } => (StatementClass::Administrative, "VACUUM"),
        Statement::Analyze { .. } => (StatementClass::Administrative, "ANALYZE"),
        Statement::Discard { .. } => (StatementClass::Administrative, "DISCARD"),
        Statement::LockTables { .. } => (StatementClass::Administrative, "LOCK"),
        Statement::Pragma { .. } => (StatementClass::Administrative, "PRAGMA"),
        Statement::AttachDatabase { .. } => (StatementClass::Administrative, "ATTACH"),
        Statement::LISTEN { .. } => (StatementClass::Administrative, "LISTEN"),
        Statement::UNLISTEN { .. } => (StatementClass::Administrative, "UNLISTEN"),
        Statement::NOTIFY { .. } => (StatementClass::Administrative, "NOTIFY"),

        _ => (StatementClass::Unparseable, "unrecognized statement"),
    }
}
