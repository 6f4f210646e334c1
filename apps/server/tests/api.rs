use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tempfile::{tempdir, TempDir};
use tower::ServiceExt;
use famledger_server::{api::app_router, build_state, config::Config, AppState};

const TEST_JOBS: &str = r#"[
    {"id":"manual","name":"Manual sync","schedule":"0 6 * * *","lookbackDays":3,"active":false},
    {"id":"weekly","schedule":"0 3 * * 0","lookbackDays":30,"active":false}
]"#;

struct TestApp {
    router: Router,
    state: Arc<AppState>,
    _tmp: TempDir,
}

async fn test_app() -> TestApp {
    let tmp = tempdir().unwrap();
    let db_path = tmp.path().join("test.db").to_string_lossy().to_string();
    let vars: HashMap<&str, String> = HashMap::from([
        ("FL_DB_PATH", db_path),
        ("FL_PROVIDER_MODE", "stub".to_string()),
        ("FL_SYNC_JOBS", TEST_JOBS.to_string()),
        ("FL_INITIAL_SYNC_JOB", "manual".to_string()),
        ("FL_FAMILY_MEMBERS", "Jane".to_string()),
    ]);
    let config = Config::from_lookup(|key| vars.get(key).cloned()).unwrap();
    let state = build_state(&config).await.unwrap();
    TestApp {
        router: app_router(state.clone()),
        state,
        _tmp: tmp,
    }
}

async fn send(app: &TestApp, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            request = request.header(header::CONTENT_TYPE, "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };
    let response = app
        .router
        .clone()
        .oneshot(request.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn health_reports_registered_jobs() {
    let app = test_app().await;

    let (status, body) = send(&app, Method::GET, "/api/v1/healthz", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["jobs"], 2);
}

#[tokio::test]
async fn lists_and_controls_jobs() {
    let app = test_app().await;

    let (status, jobs) = send(&app, Method::GET, "/api/v1/sync/jobs", None).await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<&str> = jobs
        .as_array()
        .unwrap()
        .iter()
        .map(|j| j["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["manual", "weekly"]);

    let (status, started) = send(&app, Method::POST, "/api/v1/sync/jobs/weekly/start", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(started["isActive"], true);
    assert!(started["nextRunAt"].is_string());

    let (status, stopped) = send(&app, Method::POST, "/api/v1/sync/jobs/weekly/stop", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stopped["isActive"], false);
    assert!(stopped["nextRunAt"].is_null());

    app.state.scheduler.shutdown().await;
}

#[tokio::test]
async fn registers_and_removes_a_job() {
    let app = test_app().await;

    let definition = json!({"id": "nightly", "schedule": "0 1 * * *", "lookbackDays": 2, "active": false});
    let (status, job) = send(&app, Method::POST, "/api/v1/sync/jobs", Some(definition.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(job["name"], "nightly");

    let (status, body) = send(&app, Method::POST, "/api/v1/sync/jobs", Some(definition)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "scheduler");

    let (status, _) = send(&app, Method::DELETE, "/api/v1/sync/jobs/nightly", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&app, Method::GET, "/api/v1/sync/jobs/nightly", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn rejects_invalid_schedule() {
    let app = test_app().await;

    let definition = json!({"id": "broken", "schedule": "every tuesday", "lookbackDays": 2});
    let (status, body) = send(&app, Method::POST, "/api/v1/sync/jobs", Some(definition)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "validation");
}

#[tokio::test]
async fn unknown_job_is_not_found() {
    let app = test_app().await;

    let (status, body) = send(&app, Method::POST, "/api/v1/sync/jobs/nope/trigger", None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "not_found");
}

#[tokio::test]
async fn triggered_run_fills_the_ledger() {
    let app = test_app().await;

    let (status, run) = send(
        &app,
        Method::POST,
        "/api/v1/sync/jobs/manual/trigger?wait=true",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(run["jobId"], "manual");
    assert_eq!(run["accountsProcessed"], 2);
    assert!(run["created"].as_u64().unwrap() > 0);
    assert_eq!(run["failed"], 0);

    let (_, second) = send(
        &app,
        Method::POST,
        "/api/v1/sync/jobs/manual/trigger?wait=true",
        None,
    )
    .await;
    assert_eq!(second["created"], 0);
    assert_eq!(second["updated"], run["created"]);

    let (status, transactions) =
        send(&app, Method::GET, "/api/v1/ledger/transactions?limit=500", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(transactions.as_array().unwrap().len() as u64, run["created"].as_u64().unwrap());

    let (status, runs) = send(&app, Method::GET, "/api/v1/sync/runs?jobId=manual", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(runs.as_array().unwrap().len(), 2);

    let (_, job) = send(&app, Method::GET, "/api/v1/sync/jobs/manual", None).await;
    assert!(job["lastRunAt"].is_string());
}

#[tokio::test]
async fn background_trigger_is_accepted() {
    let app = test_app().await;

    let (status, body) = send(&app, Method::POST, "/api/v1/sync/jobs/weekly/trigger", None).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "triggered");

    app.state.scheduler.shutdown().await;
    let (_, runs) = send(&app, Method::GET, "/api/v1/sync/runs", None).await;
    assert_eq!(runs.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn consent_flow_links_and_syncs() {
    let app = test_app().await;

    let (status, institutions) =
        send(&app, Method::GET, "/api/v1/bank/institutions?country=GB", None).await;
    assert_eq!(status, StatusCode::OK);
    let institution_id = institutions[0]["id"].as_str().unwrap().to_string();

    let (status, created) = send(
        &app,
        Method::POST,
        "/api/v1/bank/requisitions",
        Some(json!({ "institutionId": institution_id })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["status"], "created");
    assert_eq!(
        created["redirectUrl"],
        "http://localhost:8080/api/v1/bank/callback"
    );
    assert!(created["link"].is_string());
    let reference = created["reference"].as_str().unwrap().to_string();

    let (status, callback) = send(
        &app,
        Method::GET,
        &format!("/api/v1/bank/callback?ref={}", reference),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(callback["syncTriggered"], true);
    assert_eq!(callback["requisition"]["status"], "linked");

    app.state.scheduler.shutdown().await;

    let (_, stored) = send(&app, Method::GET, "/api/v1/bank/requisitions", None).await;
    let linked = stored
        .as_array()
        .unwrap()
        .iter()
        .find(|r| r["reference"] == reference)
        .unwrap();
    assert_eq!(linked["status"], "linked");

    let (_, runs) = send(&app, Method::GET, "/api/v1/sync/runs?jobId=manual", None).await;
    assert_eq!(runs.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn callback_with_unknown_reference_is_not_found() {
    let app = test_app().await;

    let (status, body) = send(&app, Method::GET, "/api/v1/bank/callback?ref=missing", None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "not_found");
}

#[tokio::test]
async fn balances_come_from_the_provider() {
    let app = test_app().await;

    let (status, balances) = send(
        &app,
        Method::GET,
        "/api/v1/bank/accounts/stub-account-1/balances",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(balances.as_array().unwrap().len(), 2);

    let (status, _) = send(&app, Method::GET, "/api/v1/bank/accounts/nope/balances", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn category_rules_apply_to_synced_transactions() {
    let app = test_app().await;

    let (status, rule) = send(
        &app,
        Method::POST,
        "/api/v1/ledger/category-rules",
        Some(json!({ "pattern": "corner bakery", "categoryId": "food" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(rule["confidence"], 0.9);

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/v1/ledger/category-rules",
        Some(json!({ "pattern": " ", "categoryId": "food" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, rules) = send(&app, Method::GET, "/api/v1/ledger/category-rules", None).await;
    assert_eq!(rules.as_array().unwrap().len(), 1);

    send(
        &app,
        Method::POST,
        "/api/v1/sync/jobs/weekly/trigger?wait=true",
        None,
    )
    .await;
    let (_, transactions) =
        send(&app, Method::GET, "/api/v1/ledger/transactions?limit=1000", None).await;
    let food: Vec<&Value> = transactions
        .as_array()
        .unwrap()
        .iter()
        .filter(|t| t["categoryId"] == "food")
        .collect();
    assert!(!food.is_empty());
    assert!(food
        .iter()
        .all(|t| t["rawPayload"]["creditorName"] == "Corner Bakery"));
}

#[tokio::test]
async fn callback_succeeds_when_initial_job_was_removed() {
    let app = test_app().await;
    let (status, _) = send(&app, Method::DELETE, "/api/v1/sync/jobs/manual", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, created) = send(
        &app,
        Method::POST,
        "/api/v1/bank/requisitions",
        Some(json!({ "institutionId": "SANDBOXFINANCE_SFIN0000" })),
    )
    .await;
    let reference = created["reference"].as_str().unwrap().to_string();

    let (status, callback) = send(
        &app,
        Method::GET,
        &format!("/api/v1/bank/callback?ref={}", reference),
        None,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(callback["syncTriggered"], false);
    assert_eq!(callback["requisition"]["status"], "linked");
    app.state.scheduler.shutdown().await;
    let (_, runs) = send(&app, Method::GET, "/api/v1/sync/runs", None).await;
    assert!(runs.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn rejects_oversized_lookback() {
    let app = test_app().await;

    let definition = json!({"id": "forever", "schedule": "0 1 * * *", "lookbackDays": 4294967295u64});
    let (status, body) = send(&app, Method::POST, "/api/v1/sync/jobs", Some(definition)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "validation");
    let (status, _) = send(&app, Method::GET, "/api/v1/sync/jobs/forever", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
