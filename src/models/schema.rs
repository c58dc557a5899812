//! Schema snapshot models.
//!
//! A [`SchemaSnapshot`] is the structured description of every table the
//! configured credentials can see. It is produced by introspection, persisted
//! by the schema store and rendered into prompts. Ordering is canonical
//! (tables, columns and foreign keys sorted) so that two introspections of an
//! unchanged database serialize to identical bytes.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SchemaSnapshot {
    pub tables: Vec<TableInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TableInfo {
    /// Bare name for tables in the default schema, `schema.table` otherwise.
    pub name: String,
    pub columns: Vec<ColumnInfo>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub foreign_keys: Vec<ForeignKey>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ColumnInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    pub nullable: bool,
    #[serde(default)]
    pub is_primary_key: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
pub struct ForeignKey {
    pub column: String,
    pub referenced_table: String,
    pub referenced_column: String,
}

impl SchemaSnapshot {
    /// Build a snapshot from tables in arbitrary order.
    pub fn new(tables: Vec<TableInfo>) -> Self {
        let mut snapshot = Self { tables };
        snapshot.normalize();
        snapshot
    }

    /// Sort tables, columns and foreign keys into canonical order.
    pub fn normalize(&mut self) {
        for table in &mut self.tables {
            table.columns.sort_by(|a, b| a.name.cmp(&b.name));
            table.foreign_keys.sort();
            table.foreign_keys.dedup();
        }
        self.tables.sort_by(|a, b| a.name.cmp(&b.name));
    }

    /// Check name uniqueness. Returns a description of the first violation.
    pub fn validate(&self) -> Result<(), String> {
        let mut table_names = HashSet::with_capacity(self.tables.len());
        for table in &self.tables {
            if !table_names.insert(table.name.as_str()) {
                return Err(format!("duplicate table name '{}'", table.name));
            }
            let mut column_names = HashSet::with_capacity(table.columns.len());
            for column in &table.columns {
                if !column_names.insert(column.name.as_str()) {
                    return Err(format!(
                        "duplicate column '{}' in table '{}'",
                        column.name, table.name
                    ));
                }
            }
        }
        Ok(())
    }

    pub fn table(&self, name: &str) -> Option<&TableInfo> {
        self.tables.iter().find(|t| t.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    pub fn column_count(&self) -> usize {
        self.tables.iter().map(|t| t.columns.len()).sum()
    }
}

impl TableInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            foreign_keys: Vec::new(),
        }
    }

    pub fn with_column(mut self, column: ColumnInfo) -> Self {
        self.columns.push(column);
        self
    }

    pub fn with_foreign_key(mut self, fk: ForeignKey) -> Self {
        self.foreign_keys.push(fk);
        self
    }

    /// Foreign key originating at `column`, if any.
    pub fn foreign_key_for(&self, column: &str) -> Option<&ForeignKey> {
        self.foreign_keys.iter().find(|fk| fk.column == column)
    }

    pub fn primary_key(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.is_primary_key)
            .map(|c| c.name.as_str())
            .collect()
    }
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>, nullable: bool) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable,
            is_primary_key: false,
        }
    }

    pub fn with_primary_key(mut self, is_pk: bool) -> Self {
        self.is_primary_key = is_pk;
        self
    }
}

impl ForeignKey {
    pub fn new(
        column: impl Into<String>,
        referenced_table: impl Into<String>,
        referenced_column: impl Into<String>,
    ) -> Self {
        Self {
            column: column.into(),
            referenced_table: referenced_table.into(),
            referenced_column: referenced_column.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users() -> TableInfo {
        TableInfo::new("users")
            .with_column(ColumnInfo::new("name", "text", true))
            .with_column(ColumnInfo::new("id", "integer", false).with_primary_key(true))
    }

    fn orders() -> TableInfo {
        TableInfo::new("orders")
            .with_column(ColumnInfo::new("user_id", "integer", false))
            .with_column(ColumnInfo::new("id", "integer", false).with_primary_key(true))
            .with_foreign_key(ForeignKey::new("user_id", "users", "id"))
    }

    #[test]
    fn test_new_sorts_tables_and_columns() {
        let snapshot = SchemaSnapshot::new(vec![users(), orders()]);
        let names: Vec<_> = snapshot.tables.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["orders", "users"]);

        let users = snapshot.table("users").unwrap();
        let cols: Vec<_> = users.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(cols, vec!["id", "name"]);
    }

    #[test]
    fn test_normalize_is_order_independent() {
        let a = SchemaSnapshot::new(vec![users(), orders()]);
        let b = SchemaSnapshot::new(vec![orders(), users()]);
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }

    #[test]
    fn test_validate_rejects_duplicate_tables() {
        let snapshot = SchemaSnapshot::new(vec![users(), users()]);
        let err = snapshot.validate().unwrap_err();
        assert!(err.contains("duplicate table"));
    }

    #[test]
    fn test_validate_rejects_duplicate_columns() {
        let table = users().with_column(ColumnInfo::new("name", "varchar", true));
        let snapshot = SchemaSnapshot::new(vec![table]);
        let err = snapshot.validate().unwrap_err();
        assert!(err.contains("duplicate column 'name'"));
    }

    #[test]
    fn test_column_type_serializes_as_type() {
        let json = serde_json::to_value(ColumnInfo::new("id", "integer", false)).unwrap();
        assert_eq!(json["type"], "integer");
        assert!(json.get("data_type").is_none());
    }

    #[test]
    fn test_empty_foreign_keys_skipped() {
        let json = serde_json::to_value(users()).unwrap();
        assert!(json.get("foreign_keys").is_none());

        let json = serde_json::to_value(orders()).unwrap();
        assert_eq!(json["foreign_keys"][0]["referenced_table"], "users");
    }

    #[test]
    fn test_lookup_helpers() {
        let snapshot = SchemaSnapshot::new(vec![users(), orders()]);
        let orders = snapshot.table("orders").unwrap();
        assert_eq!(orders.primary_key(), vec!["id"]);
        assert_eq!(
            orders.foreign_key_for("user_id").map(|fk| fk.referenced_table.as_str()),
            Some("users")
        );
        assert!(orders.foreign_key_for("id").is_none());
        assert_eq!(snapshot.table_count(), 2);
        assert_eq!(snapshot.column_count(), 4);
    }
}
