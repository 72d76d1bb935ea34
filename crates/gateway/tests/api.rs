//! End-to-end handler tests against a scripted backend runner.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::extract::connect_info::ConnectInfo;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::util::ServiceExt;

use p4_gateway::{build_router, config::RuntimeMode, rate_limit::ClientRateLimiter, AppState};
use p4_runner::{CommandResult, Runner};

type Reply = Box<dyn Fn(&[String]) -> CommandResult + Send + Sync>;

struct ScriptedRunner {
    calls: Mutex<Vec<Vec<String>>>,
    reply: Reply,
}

impl ScriptedRunner {
    fn last_call(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no backend command was run")
    }

    fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Runner for ScriptedRunner {
    async fn run(&self, args: &[String]) -> CommandResult {
        self.calls.lock().unwrap().push(args.to_vec());
        (self.reply)(args)
    }
}

fn harness_with(reply: Reply, limiter: ClientRateLimiter) -> (Router, Arc<ScriptedRunner>) {
    let runner = Arc::new(ScriptedRunner {
        calls: Mutex::new(Vec::new()),
        reply,
    });
    let state = AppState::new(runner.clone(), RuntimeMode::Production, limiter);
    (build_router(state), runner)
}

fn harness(reply: Reply) -> (Router, Arc<ScriptedRunner>) {
    harness_with(reply, ClientRateLimiter::default())
}

fn succeed_with(text: &str) -> Reply {
    let text = text.to_string();
    Box::new(move |_| CommandResult::success(text.clone()))
}

fn fail_with(text: &str) -> Reply {
    let text = text.to_string();
    Box::new(move |_| CommandResult::failure(text.clone()))
}

fn client_addr(last: u8) -> SocketAddr {
    SocketAddr::from(([127, 0, 0, last], 40000))
}

fn get(uri: &str) -> Request<Body> {
    get_from(uri, client_addr(1))
}

fn get_from(uri: &str, addr: SocketAddr) -> Request<Body> {
    let mut request = Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("request");
    request.extensions_mut().insert(ConnectInfo(addr));
    request
}

fn post_json(uri: &str, body: &Value) -> Request<Body> {
    let mut request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(body).expect("body")))
        .expect("request");
    request.extensions_mut().insert(ConnectInfo(client_addr(1)));
    request
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.expect("response");
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("json body")
    };
    (status, body)
}

#[tokio::test]
async fn files_default_to_depot_wildcard() {
    let (router, runner) = harness(succeed_with(
        "//depot/a.txt#1 - add change 1\n//depot/b.txt#2 - edit change 2",
    ));

    let (status, body) = send(&router, get("/api/files?max=5")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["path"], "//depot/...");
    assert_eq!(body["data"]["count"], 2);
    assert_eq!(
        runner.last_call(),
        vec!["files", "-m", "5", "//depot/..."]
    );
}

#[tokio::test]
async fn listing_count_skips_blank_lines() {
    let (router, _) = harness(succeed_with("alice <a@x> (Alice)\n\nbob <b@x> (Bob)\n\n"));

    let (status, body) = send(&router, get("/api/users")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["count"], 2);
}

#[tokio::test]
async fn validation_reports_every_violation() {
    let (router, runner) = harness(succeed_with(""));

    let (status, body) = send(&router, get("/api/files/history?max=500")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    let errors = body["errors"].as_array().expect("errors array");
    assert_eq!(errors.len(), 2);
    let fields: Vec<&str> = errors
        .iter()
        .map(|e| e["field"].as_str().unwrap())
        .collect();
    assert!(fields.contains(&"path"));
    assert!(fields.contains(&"max"));
    // the executor is never reached on validation failure
    assert_eq!(runner.call_count(), 0);
}

#[tokio::test]
async fn files_max_out_of_range_is_rejected() {
    let (router, _) = harness(succeed_with(""));

    let (status, body) = send(&router, get("/api/files?max=1001")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errors"][0]["field"], "max");
}

#[tokio::test]
async fn change_status_enum_is_enforced() {
    let (router, _) = harness(succeed_with(""));

    let (status, body) = send(&router, get("/api/changes?status=rejected")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errors"][0]["field"], "status");
}

#[tokio::test]
async fn info_parses_key_value_lines() {
    let (router, _) = harness(succeed_with(
        "User name: admin\nServer address: localhost:1666\nServer version: P4D/LINUX26X86_64/2024.1",
    ));

    let (status, body) = send(&router, get("/api/info")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["User name"], "admin");
    assert_eq!(body["data"]["Server address"], "localhost:1666");
}

#[tokio::test]
async fn info_failure_maps_to_server_error() {
    let (router, _) = harness(fail_with("Connect to server failed"));

    let (status, body) = send(&router, get("/api/info")).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().contains("Connect to server failed"));
}

#[tokio::test]
async fn file_content_builds_revision_suffix() {
    let (router, runner) = harness(succeed_with("line one\nline two"));

    let (status, body) = send(
        &router,
        get("/api/files/content?path=//depot/main/readme.md&revision=3"),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["path"], "//depot/main/readme.md");
    assert_eq!(body["data"]["revision"], 3);
    assert_eq!(body["data"]["content"], "line one\nline two");
    assert_eq!(
        runner.last_call(),
        vec!["print", "-q", "//depot/main/readme.md#3"]
    );
}

#[tokio::test]
async fn missing_file_maps_to_not_found() {
    let (router, _) = harness(fail_with("no such file(s)."));

    let (status, body) = send(&router, get("/api/files/content?path=//depot/nope.txt")).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
    assert!(body["message"].as_str().unwrap().contains("//depot/nope.txt"));
}

#[tokio::test]
async fn file_history_uses_documented_default_max() {
    let (router, runner) = harness(succeed_with("... #2 change 8\n... #1 change 4"));

    let (status, body) = send(&router, get("/api/files/history?path=//depot/a.c")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["path"], "//depot/a.c");
    assert_eq!(runner.last_call(), vec!["filelog", "-m", "10", "//depot/a.c"]);
}

#[tokio::test]
async fn change_filters_reach_the_command_line() {
    let (router, runner) = harness(succeed_with("Change 42 on 2024/05/01 by alice@ws 'fix'"));

    let (status, body) = send(&router, get("/api/changes?status=pending&user=alice")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["count"], 1);
    assert_eq!(
        runner.last_call(),
        vec!["changes", "-m", "20", "-s", "pending", "-u", "alice"]
    );
}

#[tokio::test]
async fn nonexistent_change_maps_to_not_found() {
    let (router, _) = harness(fail_with("Change 999999 unknown."));

    let (status, body) = send(&router, get("/api/changes/999999")).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
    assert!(body["message"].as_str().unwrap().contains("999999"));
}

#[tokio::test]
async fn change_id_must_be_an_integer() {
    let (router, runner) = harness(succeed_with(""));

    let (status, body) = send(&router, get("/api/changes/latest")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errors"][0]["field"], "id");
    assert_eq!(runner.call_count(), 0);
}

#[tokio::test]
async fn change_detail_tags_the_numeric_id() {
    let (router, runner) = harness(succeed_with("Change 7 by alice@ws\n\n\tAdd feature"));

    let (status, body) = send(&router, get("/api/changes/7")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["changeId"], 7);
    assert!(body["data"]["rawOutput"].as_str().unwrap().contains("Add feature"));
    assert_eq!(runner.last_call(), vec!["describe", "-s", "7"]);
}

#[tokio::test]
async fn sync_defaults_to_non_forced_wildcard() {
    let (router, runner) = harness(succeed_with("//depot/a.txt#2 - updating"));

    let (status, body) = send(&router, post_json("/api/sync", &json!({}))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["forced"], false);
    assert_eq!(body["data"]["path"], "//depot/...");
    assert_eq!(runner.last_call(), vec!["sync", "//depot/..."]);
}

#[tokio::test]
async fn forced_sync_adds_the_force_flag() {
    let (router, runner) = harness(succeed_with("//depot/x/... - refreshing"));

    let (status, body) = send(
        &router,
        post_json("/api/sync", &json!({ "path": "//depot/x/...", "force": true })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["forced"], true);
    assert_eq!(runner.last_call(), vec!["sync", "-f", "//depot/x/..."]);
}

// Pins the deliberate asymmetry: sync surfaces backend diagnostics as a
// normal result instead of an error envelope.
#[tokio::test]
async fn sync_reports_success_even_when_backend_fails() {
    let (router, _) = harness(fail_with("file(s) up-to-date."));

    let (status, body) = send(&router, post_json("/api/sync", &json!({}))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert!(body["data"]["rawOutput"]
        .as_str()
        .unwrap()
        .contains("up-to-date"));
}

#[tokio::test]
async fn sync_force_must_be_boolean() {
    let (router, _) = harness(succeed_with(""));

    let (status, body) = send(
        &router,
        post_json("/api/sync", &json!({ "force": "definitely" })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errors"][0]["field"], "force");
}

#[tokio::test]
async fn health_reports_degraded_backend() {
    let (router, _) = harness(fail_with("Connect to server failed"));

    let (status, body) = send(&router, get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["backendConnected"], false);
    assert!(body["timestamp"].as_str().is_some());
}

#[tokio::test]
async fn health_reports_healthy_backend() {
    let (router, _) = harness(succeed_with("Server address: localhost:1666"));

    let (_, body) = send(&router, get("/health")).await;

    assert_eq!(body["status"], "healthy");
    assert_eq!(body["backendConnected"], true);
}

#[tokio::test]
async fn repeated_requests_yield_identical_payloads() {
    let (router, _) = harness(succeed_with("//depot/a.txt#1 - add change 1"));

    let (_, first) = send(&router, get("/api/files?max=5")).await;
    let (_, second) = send(&router, get("/api/files?max=5")).await;

    assert_eq!(first["data"], second["data"]);
}

#[tokio::test]
async fn unmatched_route_lists_endpoints() {
    let (router, _) = harness(succeed_with(""));

    let (status, body) = send(&router, get("/api/nonsense")).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
    let endpoints = body["availableEndpoints"].as_array().expect("endpoints");
    assert!(endpoints.iter().any(|e| e == "GET /api/info"));
}

#[tokio::test]
async fn docs_returns_the_capability_catalog() {
    let (router, _) = harness(succeed_with(""));

    let (status, body) = send(&router, get("/api/docs")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "p4-gateway");
    assert!(body["endpoints"].as_array().unwrap().len() >= 9);
}

#[tokio::test]
async fn exhausted_window_receives_rate_limit_rejection() {
    let (router, _) = harness_with(succeed_with("ok"), ClientRateLimiter::new(3, 900));

    for _ in 0..3 {
        let (status, _) = send(&router, get("/api/users")).await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body) = send(&router, get("/api/users")).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["success"], false);

    // another client address still has budget
    let (status, _) = send(&router, get_from("/api/users", client_addr(9))).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn health_is_not_rate_limited() {
    let (router, _) = harness_with(succeed_with("ok"), ClientRateLimiter::new(1, 900));

    let (status, _) = send(&router, get("/api/users")).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&router, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
}
