//! Schema introspection.
//!
//! Builds a [`SchemaSnapshot`] of every table and view the connected
//! credentials can see. SQL queries live in the `queries` submodule; each
//! backend has its own submodule reading its system catalogs.
//!
//! Failures are never papered over with an empty snapshot: any driver error
//! becomes [`AppError::Introspection`] carrying the database message.

use crate::db::pool::DbPool;
use crate::error::{AppError, AppResult};
use crate::models::{ColumnInfo, ForeignKey, SchemaSnapshot, TableInfo};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Schema inspector for database introspection.
#[derive(Debug, Clone)]
pub struct SchemaIntrospector {
    timeout: Duration,
}

impl SchemaIntrospector {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Read the full schema. The whole operation is bounded by the
    /// introspector's timeout.
    pub async fn introspect(&self, pool: &DbPool) -> AppResult<SchemaSnapshot> {
        let start = Instant::now();
        let tables = match pool {
            DbPool::Postgres(p) => timeout(self.timeout, postgres::read_tables(p)).await,
            DbPool::SQLite(p) => timeout(self.timeout, sqlite::read_tables(p)).await,
        };

        let tables = match tables {
            Ok(Ok(tables)) => tables,
            Ok(Err(e)) => return Err(AppError::introspection_failed(e)),
            Err(_) => {
                return Err(AppError::introspection(
                    format!("timed out after {}s", self.timeout.as_secs()),
                    None,
                ));
            }
        };

        let snapshot = SchemaSnapshot::new(tables);
        snapshot
            .validate()
            .map_err(|e| AppError::introspection(e, None))?;

        if snapshot.is_empty() {
            warn!(db_type = %pool.db_type(), "Introspection found no tables");
        }
        info!(
            tables = snapshot.table_count(),
            columns = snapshot.column_count(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Schema introspected"
        );
        Ok(snapshot)
    }
}

/// Group flat catalog rows into tables, keyed by qualified name.
#[derive(Default)]
struct TableBuilder {
    tables: BTreeMap<String, TableInfo>,
}

impl TableBuilder {
    fn table(&mut self, name: &str) -> &mut TableInfo {
        self.tables
            .entry(name.to_string())
            .or_insert_with(|| TableInfo::new(name))
    }

    fn finish(self) -> Vec<TableInfo> {
        self.tables.into_values().collect()
    }
}

/// Tables in the default schema keep their bare name.
fn qualified_name(schema: &str, table: &str, default_schema: &str) -> String {
    if schema == default_schema {
        table.to_string()
    } else {
        format!("{}.{}", schema, table)
    }
}

// =============================================================================
// SQL Query Templates
// =============================================================================

mod queries {
    pub mod postgres {
        /// Schemas never shown to the model.
        const SYSTEM_SCHEMAS: &str = "('pg_catalog', 'information_schema')";

        pub fn list_tables() -> String {
            format!(
                r#"
            SELECT
                t.table_schema::text AS table_schema,
                t.table_name::text AS table_name
            FROM information_schema.tables t
            WHERE t.table_type IN ('BASE TABLE', 'VIEW')
            AND t.table_schema NOT IN {SYSTEM_SCHEMAS}
            AND t.table_schema NOT LIKE 'pg\_toast%'
            AND t.table_schema NOT LIKE 'pg\_temp%'
            ORDER BY t.table_schema, t.table_name
            "#
            )
        }

        pub fn columns() -> String {
            format!(
                r#"
            SELECT
                c.table_schema::text AS table_schema,
                c.table_name::text AS table_name,
                c.column_name::text AS column_name,
                format_type(a.atttypid, a.atttypmod) AS column_type,
                (c.is_nullable = 'YES') AS is_nullable,
                EXISTS (
                    SELECT 1 FROM pg_index i
                    WHERE i.indrelid = t.oid
                    AND i.indisprimary
                    AND a.attnum = ANY(i.indkey)
                ) AS is_primary_key
            FROM information_schema.columns c
            JOIN pg_namespace n ON n.nspname = c.table_schema
            JOIN pg_class t ON t.relname = c.table_name AND t.relnamespace = n.oid
            JOIN pg_attribute a ON a.attrelid = t.oid AND a.attname = c.column_name
            WHERE c.table_schema NOT IN {SYSTEM_SCHEMAS}
            AND c.table_schema NOT LIKE 'pg\_toast%'
            AND c.table_schema NOT LIKE 'pg\_temp%'
            ORDER BY c.table_schema, c.table_name, c.column_name
            "#
            )
        }

        /// One row per column pair of every foreign key, read from
        /// `pg_constraint` so composite keys keep their column order and
        /// same-named constraints on different tables stay apart.
        pub fn foreign_keys() -> String {
            format!(
                r#"
            SELECT
                ns.nspname::text AS table_schema,
                cl.relname::text AS table_name,
                att.attname::text AS column_name,
                fns.nspname::text AS foreign_table_schema,
                fcl.relname::text AS foreign_table_name,
                fatt.attname::text AS foreign_column_name
            FROM pg_constraint con
            CROSS JOIN LATERAL unnest(con.conkey, con.confkey)
                WITH ORDINALITY AS k(attnum, fattnum, ord)
            JOIN pg_class cl ON cl.oid = con.conrelid
            JOIN pg_namespace ns ON ns.oid = cl.relnamespace
            JOIN pg_attribute att
                ON att.attrelid = con.conrelid AND att.attnum = k.attnum
            JOIN pg_class fcl ON fcl.oid = con.confrelid
            JOIN pg_namespace fns ON fns.oid = fcl.relnamespace
            JOIN pg_attribute fatt
                ON fatt.attrelid = con.confrelid AND fatt.attnum = k.fattnum
            WHERE con.contype = 'f'
            AND ns.nspname NOT IN {SYSTEM_SCHEMAS}
            AND ns.nspname NOT LIKE 'pg\_toast%'
            AND ns.nspname NOT LIKE 'pg\_temp%'
            ORDER BY ns.nspname, cl.relname, con.conname, k.ord
            "#
            )
        }
    }

    pub mod sqlite {
        pub const LIST_TABLES: &str = r#"
            SELECT name FROM sqlite_master
            WHERE type IN ('table', 'view')
            AND name NOT LIKE 'sqlite_%'
            ORDER BY name
            "#;

        pub const TABLE_COLUMNS: &str =
            r#"SELECT name, type, "notnull" AS not_null, pk FROM pragma_table_info(?1)"#;

        pub const FOREIGN_KEYS: &str =
            r#"SELECT "from" AS column_name, "table" AS ref_table, "to" AS ref_column FROM pragma_foreign_key_list(?1)"#;
    }
}

// =============================================================================
// Database-Specific Implementations
// =============================================================================

mod postgres {
    use super::*;
    use sqlx::{PgPool, Row};

    const DEFAULT_SCHEMA: &str = "public";

    pub async fn read_tables(pool: &PgPool) -> Result<Vec<TableInfo>, sqlx::Error> {
        let mut builder = TableBuilder::default();

        let rows = sqlx::query(&queries::postgres::list_tables())
            .fetch_all(pool)
            .await?;
        for row in &rows {
            let schema: String = row.try_get("table_schema")?;
            let table: String = row.try_get("table_name")?;
            builder.table(&qualified_name(&schema, &table, DEFAULT_SCHEMA));
        }

        let rows = sqlx::query(&queries::postgres::columns())
            .fetch_all(pool)
            .await?;
        for row in &rows {
            let schema: String = row.try_get("table_schema")?;
            let table: String = row.try_get("table_name")?;
            let name = qualified_name(&schema, &table, DEFAULT_SCHEMA);
            // Columns of objects that are not tables or views (sequences, composite types)
            if !builder.tables.contains_key(&name) {
                continue;
            }
            let column: String = row.try_get("column_name")?;
            let column_type: String = row.try_get("column_type")?;
            let nullable: bool = row.try_get("is_nullable")?;
            let is_pk: bool = row.try_get("is_primary_key")?;
            builder
                .table(&name)
                .columns
                .push(ColumnInfo::new(column, column_type, nullable).with_primary_key(is_pk));
        }

        let rows = sqlx::query(&queries::postgres::foreign_keys())
            .fetch_all(pool)
            .await?;
        for row in &rows {
            let schema: String = row.try_get("table_schema")?;
            let table: String = row.try_get("table_name")?;
            let name = qualified_name(&schema, &table, DEFAULT_SCHEMA);
            if !builder.tables.contains_key(&name) {
                continue;
            }
            let ref_schema: String = row.try_get("foreign_table_schema")?;
            let ref_table: String = row.try_get("foreign_table_name")?;
            let fk = ForeignKey::new(
                row.try_get::<String, _>("column_name")?,
                qualified_name(&ref_schema, &ref_table, DEFAULT_SCHEMA),
                row.try_get::<String, _>("foreign_column_name")?,
            );
            builder.table(&name).foreign_keys.push(fk);
        }

        let tables = builder.finish();
        debug!(count = tables.len(), "Read PostgreSQL catalog");
        Ok(tables)
    }
}

mod sqlite {
    use super::*;
    use sqlx::{Row, SqlitePool};

    pub async fn read_tables(pool: &SqlitePool) -> Result<Vec<TableInfo>, sqlx::Error> {
        let names: Vec<String> = sqlx::query(queries::sqlite::LIST_TABLES)
            .fetch_all(pool)
            .await?
            .iter()
            .map(|row| row.try_get("name"))
            .collect::<Result<_, _>>()?;

        let mut builder = TableBuilder::default();
        // Foreign keys that omit the referenced column point at the primary key
        let mut unresolved: Vec<(String, String, String)> = Vec::new();

        for name in &names {
            let rows = sqlx::query(queries::sqlite::TABLE_COLUMNS)
                .bind(name)
                .fetch_all(pool)
                .await?;
            let table = builder.table(name);
            for row in &rows {
                let column: String = row.try_get("name")?;
                let data_type: String = row.try_get("type")?;
                let not_null: i64 = row.try_get("not_null")?;
                let pk: i64 = row.try_get("pk")?;
                table.columns.push(
                    ColumnInfo::new(column, data_type, not_null == 0).with_primary_key(pk > 0),
                );
            }

            let rows = sqlx::query(queries::sqlite::FOREIGN_KEYS)
                .bind(name)
                .fetch_all(pool)
                .await?;
            for row in &rows {
                let column: String = row.try_get("column_name")?;
                let ref_table: String = row.try_get("ref_table")?;
                let ref_column: Option<String> = row.try_get("ref_column")?;
                match ref_column {
                    Some(ref_column) => builder
                        .table(name)
                        .foreign_keys
                        .push(ForeignKey::new(column, ref_table, ref_column)),
                    None => unresolved.push((name.clone(), column, ref_table)),
                }
            }
        }

        for (table, column, ref_table) in unresolved {
            let ref_column = builder
                .tables
                .get(&ref_table)
                .and_then(|t| t.columns.iter().find(|c| c.is_primary_key))
                .map(|c| c.name.clone())
                .unwrap_or_else(|| "rowid".to_string());
            builder
                .table(&table)
                .foreign_keys
                .push(ForeignKey::new(column, ref_table, ref_column));
        }

        let tables = builder.finish();
        debug!(count = tables.len(), "Read SQLite catalog");
        Ok(tables)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qualified_name() {
        assert_eq!(qualified_name("public", "users", "public"), "users");
        assert_eq!(qualified_name("sales", "orders", "public"), "sales.orders");
    }

    #[test]
    fn test_table_builder_groups_rows() {
        let mut builder = TableBuilder::default();
        builder
            .table("users")
            .columns
            .push(ColumnInfo::new("id", "integer", false));
        builder
            .table("orders")
            .columns
            .push(ColumnInfo::new("id", "integer", false));
        builder
            .table("users")
            .columns
            .push(ColumnInfo::new("email", "text", true));

        let tables = builder.finish();
        assert_eq!(tables.len(), 2);
        assert_eq!(tables[1].name, "users");
        assert_eq!(tables[1].columns.len(), 2);
    }

    #[test]
    fn test_postgres_queries_exclude_system_schemas() {
        for sql in [
            queries::postgres::list_tables(),
            queries::postgres::columns(),
            queries::postgres::foreign_keys(),
        ] {
            assert!(sql.contains("'pg_catalog', 'information_schema'"));
        }
    }

    #[test]
    fn test_postgres_foreign_keys_pair_columns_by_position() {
        let sql = queries::postgres::foreign_keys();
        assert!(sql.contains("FROM pg_constraint con"));
        assert!(sql.contains("unnest(con.conkey, con.confkey)"));
        assert!(sql.contains("WITH ORDINALITY"));
        // both sides resolved through the constraint's own relations
        assert!(sql.contains("att.attrelid = con.conrelid"));
        assert!(sql.contains("fatt.attrelid = con.confrelid"));
        assert!(!sql.contains("constraint_name"));
    }
}
