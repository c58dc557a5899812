//! JSON endpoints served over a real socket.

mod common;

use common::{ScriptedLlm, TestDb};
use nlsql_server::state::AppState;
use nlsql_server::transport::http::router;
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::net::TcpListener;

/// Serve the router on an ephemeral port and return its base URL.
async fn spawn_server(state: Arc<AppState>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = router(state, "/mcp");
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

#[tokio::test]
async fn test_health() {
    let db = TestDb::shop().await;
    let base = spawn_server(db.state(ScriptedLlm::new(Vec::<Result<&str, &str>>::new()))).await;

    let body = reqwest::get(format!("{}/health", base))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(body, "ok");
}

#[tokio::test]
async fn test_question_with_texto_field() {
    let db = TestDb::shop().await;
    let llm = ScriptedLlm::new([
        Ok("SELECT COUNT(*) AS clientes FROM customers"),
        Ok("Hay 3 clientes."),
    ]);
    let base = spawn_server(db.state(llm)).await;

    let response = reqwest::Client::new()
        .post(format!("{}/question", base))
        .json(&json!({ "texto": "¿Cuántos clientes hay?" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["sql"], "SELECT COUNT(*) AS clientes FROM customers");
    assert_eq!(body["summary"], "Hay 3 clientes.");
    assert_eq!(body["rows"], json!([[3]]));
    assert_eq!(body["truncated"], false);
    assert!(body.get("formatted").is_none());
}

#[tokio::test]
async fn test_rejected_sql_maps_to_unprocessable() {
    let db = TestDb::shop().await;
    let llm = ScriptedLlm::new([Ok("DELETE FROM orders")]);
    let base = spawn_server(db.state(llm)).await;

    let response = reqwest::Client::new()
        .post(format!("{}/question", base))
        .json(&json!({ "question": "Borra los pedidos" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 422);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["category"], "bad_generated_sql");
    assert_eq!(body["sql"], "DELETE FROM orders");
    assert!(body["suggestion"].is_string());
    assert!(db.table_exists("orders").await);
}

#[tokio::test]
async fn test_empty_question_is_bad_request() {
    let db = TestDb::shop().await;
    let base = spawn_server(db.state(ScriptedLlm::new(Vec::<Result<&str, &str>>::new()))).await;

    let response = reqwest::Client::new()
        .post(format!("{}/question", base))
        .json(&json!({ "texto": "" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["category"], "bad_question");
}

#[tokio::test]
async fn test_schema_and_refresh() {
    let db = TestDb::shop().await;
    let base = spawn_server(db.state(ScriptedLlm::new(Vec::<Result<&str, &str>>::new()))).await;
    let client = reqwest::Client::new();

    let schema: Value = client
        .get(format!("{}/schema", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(schema["tables"].as_array().unwrap().len(), 2);
    assert_eq!(schema["tables"][0]["name"], "customers");

    db.exec("CREATE TABLE products (id INTEGER PRIMARY KEY)").await;
    let refreshed: Value = client
        .post(format!("{}/schema/refresh", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(refreshed["tables"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_diagnostics_status_codes() {
    let db = TestDb::shop().await;
    let healthy = spawn_server(db.state(ScriptedLlm::new(Vec::<Result<&str, &str>>::new()))).await;
    let response = reqwest::get(format!("{}/diagnostics", healthy)).await.unwrap();
    assert_eq!(response.status(), 200);

    let mut settings = db.settings();
    settings.llm.api_key = None;
    let unhealthy = spawn_server(db.state_with(
        settings,
        ScriptedLlm::new(Vec::<Result<&str, &str>>::new()),
    ))
    .await;
    let response = reqwest::get(format!("{}/diagnostics", unhealthy)).await.unwrap();
    assert_eq!(response.status(), 503);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["config_loaded"]["ok"], false);
    assert_eq!(body["db_reachable"]["ok"], true);
}

#[tokio::test]
async fn test_any_origin_allowed() {
    let db = TestDb::shop().await;
    let base = spawn_server(db.state(ScriptedLlm::new(Vec::<Result<&str, &str>>::new()))).await;
    let client = reqwest::Client::new();
    let origin = "http://dashboard.example";

    let response = client
        .get(format!("{}/health", base))
        .header("Origin", origin)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()["access-control-allow-origin"], origin);

    // browser preflight for the JSON POST
    let preflight = client
        .request(reqwest::Method::OPTIONS, format!("{}/question", base))
        .header("Origin", origin)
        .header("Access-Control-Request-Method", "POST")
        .header("Access-Control-Request-Headers", "content-type")
        .send()
        .await
        .unwrap();
    assert!(preflight.status().is_success());
    assert_eq!(preflight.headers()["access-control-allow-origin"], origin);
    assert!(preflight.headers().contains_key("access-control-allow-methods"));
}
