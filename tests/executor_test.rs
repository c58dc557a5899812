//! Query execution against a real SQLite file.

mod common;

use common::{ORDER_COUNT, TestDb};
use nlsql_server::db::QueryExecutor;
use nlsql_server::error::AppError;
use serde_json::json;
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn test_row_limit_is_exact_and_marks_truncation() {
    let db = TestDb::shop().await;
    let pool = db.pool();
    let executor = QueryExecutor::new();

    let result = executor
        .execute_with(&pool, "SELECT id FROM orders ORDER BY id", 10, TIMEOUT)
        .await
        .unwrap();

    assert_eq!(result.row_count, 10);
    assert_eq!(result.rows.len(), 10);
    assert!(result.truncated);
    assert_eq!(result.rows[0], vec![json!(1)]);
    assert_eq!(result.rows[9], vec![json!(10)]);
}

#[tokio::test]
async fn test_result_at_limit_is_not_truncated() {
    let db = TestDb::shop().await;
    let pool = db.pool();
    let executor = QueryExecutor::new();

    let exact = executor
        .execute_with(&pool, "SELECT id FROM orders", ORDER_COUNT as u32, TIMEOUT)
        .await
        .unwrap();
    assert_eq!(exact.row_count, ORDER_COUNT as usize);
    assert!(!exact.truncated);

    let roomy = executor
        .execute_with(&pool, "SELECT id FROM orders", 1000, TIMEOUT)
        .await
        .unwrap();
    assert_eq!(roomy.row_count, ORDER_COUNT as usize);
    assert!(!roomy.truncated);
}

#[tokio::test]
async fn test_configured_limit_applies() {
    let db = TestDb::shop().await;
    let executor = QueryExecutor::with_defaults(TIMEOUT, 25);

    let result = executor
        .execute(&db.pool(), "SELECT * FROM orders")
        .await
        .unwrap();
    assert_eq!(result.row_count, 25);
    assert!(result.truncated);
    assert_eq!(result.columns, vec!["id", "customer_id", "total", "created_at"]);
}

#[tokio::test]
async fn test_empty_result_keeps_column_names() {
    let db = TestDb::shop().await;
    let result = QueryExecutor::new()
        .execute(&db.pool(), "SELECT id, total FROM orders WHERE id < 0")
        .await
        .unwrap();

    assert_eq!(result.columns, vec!["id", "total"]);
    assert!(result.rows.is_empty());
    assert_eq!(result.row_count, 0);
    assert!(!result.truncated);
}

#[tokio::test]
async fn test_values_are_typed() {
    let db = TestDb::shop().await;
    let result = QueryExecutor::new()
        .execute(
            &db.pool(),
            "SELECT name, city, id FROM customers WHERE id = 1",
        )
        .await
        .unwrap();
    assert_eq!(result.rows, vec![vec![json!("Ana"), json!("Madrid"), json!(1)]]);

    let count = QueryExecutor::new()
        .execute(&db.pool(), "SELECT COUNT(*) AS n FROM orders")
        .await
        .unwrap();
    assert_eq!(count.columns, vec!["n"]);
    assert_eq!(count.rows[0][0], json!(ORDER_COUNT));
}

#[tokio::test]
async fn test_database_error_is_execution_error() {
    let db = TestDb::shop().await;
    let err = QueryExecutor::new()
        .execute(&db.pool(), "SELECT missing_column FROM orders")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Execution { .. }), "got {:?}", err);
}

#[tokio::test]
async fn test_pool_refuses_writes() {
    // Even a statement that slipped past validation cannot change the file
    let db = TestDb::shop().await;
    let result = QueryExecutor::new()
        .execute(&db.pool(), "DELETE FROM orders")
        .await;
    assert!(result.is_err());

    let count = QueryExecutor::new()
        .execute(&db.pool(), "SELECT COUNT(*) AS n FROM orders")
        .await
        .unwrap();
    assert_eq!(count.rows[0][0], json!(ORDER_COUNT));
}
