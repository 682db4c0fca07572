//! Integration tests for the local HTTP API.
//! Demo lifecycle, commands, error mapping and API key auth, with a fake
//! browser and a scripted model.

mod common;

use axum::http::StatusCode;
use common::{candidate, plan_json, test_pipeline, FakeLauncher, FakePage, ScriptedLlm};
use demo_agent::agent::{DemoAgent, PageLauncher};
use demo_agent::api::{app, ApiState};
use demo_agent::config::AppConfig;
use demo_agent::demo::JsonSessionStore;
use demo_agent::state::AppState;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

fn temp_sessions_dir() -> std::path::PathBuf {
    std::env::temp_dir().join(format!("demo_agent_api_{}", uuid::Uuid::new_v4()))
}

fn scripted_llm() -> Arc<ScriptedLlm> {
    Arc::new(
        ScriptedLlm::new()
            .plan(&plan_json(json!([
                {"type": "click", "description": "Open pricing"}
            ])))
            .rank("0")
            .explain("I opened the pricing page for you."),
    )
}

fn make_state_with(launcher: Arc<dyn PageLauncher>, api_key: Option<&str>) -> ApiState {
    let mut config = AppConfig::default();
    config.pipeline = test_pipeline();
    config.server.api_key = api_key.map(str::to_string);
    config.sessions_dir = temp_sessions_dir();

    let llm = scripted_llm();
    let agent = DemoAgent::new(llm.clone(), llm, &config.pipeline);
    let store = Arc::new(JsonSessionStore::new(config.sessions_dir.clone()));
    Arc::new(AppState::new(config, launcher, store, agent))
}

fn make_state() -> (ApiState, Arc<FakePage>) {
    let page = Arc::new(
        FakePage::new("https://example.com/", "Example")
            .with_candidates(vec![candidate(0, "a", "Home"), candidate(1, "a", "Pricing")]),
    );
    let state = make_state_with(Arc::new(FakeLauncher::new(page.clone())), None);
    (state, page)
}

fn json_body(val: &Value) -> axum::body::Body {
    axum::body::Body::from(serde_json::to_vec(val).unwrap())
}

fn get(uri: &str) -> axum::http::Request<axum::body::Body> {
    axum::http::Request::builder()
        .uri(uri)
        .body(axum::body::Body::empty())
        .unwrap()
}

fn post(uri: &str, body: &Value) -> axum::http::Request<axum::body::Body> {
    axum::http::Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(json_body(body))
        .unwrap()
}

async fn read_json(res: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(res.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

async fn start_demo(state: &ApiState, id: &str) -> axum::response::Response {
    app(state.clone())
        .oneshot(post(
            "/api/demos",
            &json!({"website": "example.com", "session_id": id}),
        ))
        .await
        .unwrap()
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_api_health() {
    let (state, _) = make_state();
    let res = app(state).oneshot(get("/api/health")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let json = read_json(res).await;
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["services"]["active_sessions"], 0);
    assert!(json["timestamp"].as_u64().unwrap() > 0);
}

// ---------------------------------------------------------------------------
// Demo lifecycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_api_start_demo() {
    let (state, page) = make_state();

    let res = start_demo(&state, "demo-1").await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let json = read_json(res).await;
    assert_eq!(json["session_id"], "demo-1");
    assert_eq!(json["status"], "running");

    // Bare hosts are opened over https
    assert_eq!(page.calls_of("goto"), vec!["goto:https://example.com"]);

    let res = app(state.clone()).oneshot(get("/api/health")).await.unwrap();
    assert_eq!(read_json(res).await["services"]["active_sessions"], 1);

    let res = app(state).oneshot(get("/api/demos/demo-1")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let json = read_json(res).await;
    assert_eq!(json["website"], "example.com");
    assert_eq!(json["status"], "running");
}

#[tokio::test]
async fn test_api_start_duplicate_conflicts() {
    let (state, _) = make_state();
    assert_eq!(start_demo(&state, "dup").await.status(), StatusCode::CREATED);

    let res = start_demo(&state, "dup").await;
    assert_eq!(res.status(), StatusCode::CONFLICT);
    assert_eq!(read_json(res).await["error"], "session_exists");
}

#[tokio::test]
async fn test_api_start_rejects_bad_input() {
    let (state, _) = make_state();

    let res = app(state.clone())
        .oneshot(post("/api/demos", &json!({"website": "   "})))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = app(state)
        .oneshot(post(
            "/api/demos",
            &json!({"website": "example.com", "session_id": "../escape"}),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(read_json(res).await["error"], "invalid_request");
}

#[tokio::test]
async fn test_api_launch_failure_marks_session_ended() {
    let state = make_state_with(Arc::new(FakeLauncher::failing()), None);

    let res = start_demo(&state, "broken").await;
    assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(read_json(res).await["error"], "browser_error");

    let res = app(state).oneshot(get("/api/demos/broken")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let json = read_json(res).await;
    assert_eq!(json["status"], "ended");
    assert!(json["endTime"].as_u64().is_some());
}

#[tokio::test]
async fn test_api_pause_resume_and_end() {
    let (state, page) = make_state();
    start_demo(&state, "cycle").await;

    let res = app(state.clone())
        .oneshot(post("/api/demos/cycle/pause", &json!({})))
        .await
        .unwrap();
    assert_eq!(read_json(res).await["status"], "paused");

    let res = app(state.clone())
        .oneshot(post("/api/demos/cycle/resume", &json!({})))
        .await
        .unwrap();
    assert_eq!(read_json(res).await["status"], "running");

    let req = axum::http::Request::builder()
        .method("DELETE")
        .uri("/api/demos/cycle")
        .body(axum::body::Body::empty())
        .unwrap();
    let res = app(state.clone()).oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(read_json(res).await["status"], "ended");
    assert!(page.is_closed());

    // The record survives, the live session does not
    let res = app(state)
        .oneshot(post("/api/demos/cycle/command", &json!({"command": "pricing"})))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_api_list_demos() {
    let (state, _) = make_state();
    start_demo(&state, "first").await;

    let res = app(state).oneshot(get("/api/demos")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let json = read_json(res).await;
    let ids: Vec<&str> = json
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|s| s["id"].as_str())
        .collect();
    assert_eq!(ids, vec!["first"]);
}

fn delete(uri: &str) -> axum::http::Request<axum::body::Body> {
    axum::http::Request::builder()
        .method("DELETE")
        .uri(uri)
        .body(axum::body::Body::empty())
        .unwrap()
}

async fn listed_ids(state: &ApiState, uri: &str) -> Vec<String> {
    let res = app(state.clone()).oneshot(get(uri)).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    read_json(res)
        .await
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|s| s["id"].as_str().map(str::to_string))
        .collect()
}

#[tokio::test]
async fn test_api_list_demos_filters() {
    let (state, _) = make_state();
    start_demo(&state, "live").await;
    app(state.clone())
        .oneshot(post(
            "/api/demos",
            &json!({"website": "docs.example.com", "session_id": "docs"}),
        ))
        .await
        .unwrap();
    app(state.clone())
        .oneshot(post("/api/demos/docs/pause", &json!({})))
        .await
        .unwrap();

    assert_eq!(listed_ids(&state, "/api/demos?status=running").await, vec!["live"]);
    assert_eq!(listed_ids(&state, "/api/demos?status=paused").await, vec!["docs"]);
    assert_eq!(
        listed_ids(&state, "/api/demos?website=docs.example.com").await,
        vec!["docs"]
    );
    assert!(listed_ids(&state, "/api/demos?status=ended").await.is_empty());
    assert_eq!(listed_ids(&state, "/api/demos").await.len(), 2);
}

#[tokio::test]
async fn test_api_list_demos_rejects_unknown_status() {
    let (state, _) = make_state();
    let res = app(state)
        .oneshot(get("/api/demos?status=sleeping"))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_api_demo_summary() {
    let (state, _) = make_state();
    start_demo(&state, "sum").await;
    app(state.clone())
        .oneshot(post("/api/demos/sum/command", &json!({"command": "pricing"})))
        .await
        .unwrap();

    let res = app(state.clone())
        .oneshot(get("/api/demos/sum/summary"))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let json = read_json(res).await;
    assert_eq!(json["commandCount"], 1);
    assert_eq!(json["actionCount"], 1);
    assert_eq!(json["successRate"], 100);
    assert!(json["totalDuration"].as_u64().is_some());
    assert!(json["keyMoments"].as_array().is_some());

    let res = app(state)
        .oneshot(get("/api/demos/nope/summary"))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_api_delete_demo_record() {
    let (state, page) = make_state();
    start_demo(&state, "gone").await;

    let res = app(state.clone())
        .oneshot(delete("/api/demos/gone/record"))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
    assert!(page.is_closed());
    assert_eq!(state.demos.active_sessions().await, 0);

    let res = app(state.clone()).oneshot(get("/api/demos/gone")).await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert!(listed_ids(&state, "/api/demos").await.is_empty());

    let res = app(state)
        .oneshot(delete("/api/demos/gone/record"))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_api_command_runs_pipeline() {
    let (state, page) = make_state();
    start_demo(&state, "cmd").await;

    let res = app(state.clone())
        .oneshot(post("/api/demos/cmd/command", &json!({"command": "pricing"})))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let json = read_json(res).await;
    assert_eq!(json["session_id"], "cmd");
    assert_eq!(json["message"], "I opened the pricing page for you.");
    let actions = json["actions"].as_array().unwrap();
    assert_eq!(actions.len(), 1);
    assert_eq!(actions[0]["type"], "click");
    assert_eq!(actions[0]["success"], true);
    assert_eq!(actions[0]["selector"], "a:has-text(\"Pricing\")");
    assert_eq!(page.calls_of("click"), vec!["click:a:has-text(\"Pricing\")"]);

    // Transcript and action history are persisted
    let res = app(state).oneshot(get("/api/demos/cmd")).await.unwrap();
    let json = read_json(res).await;
    let transcript = json["transcript"].as_array().unwrap();
    assert_eq!(transcript.len(), 2);
    assert_eq!(transcript[0]["speaker"], "user");
    assert_eq!(transcript[0]["content"], "pricing");
    assert_eq!(transcript[1]["speaker"], "ai");
    assert_eq!(json["actions"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_api_command_unknown_session() {
    let (state, _) = make_state();
    let res = app(state)
        .oneshot(post("/api/demos/nope/command", &json!({"command": "click"})))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert_eq!(read_json(res).await["error"], "session_not_found");
}

#[tokio::test]
async fn test_api_command_requires_text() {
    let (state, _) = make_state();
    start_demo(&state, "blank").await;

    let res = app(state)
        .oneshot(post("/api/demos/blank/command", &json!({"command": "  "})))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_api_command_broadcasts_events() {
    let (state, _) = make_state();
    start_demo(&state, "events").await;
    let mut rx = state.events.subscribe();

    app(state)
        .oneshot(post("/api/demos/events/command", &json!({"command": "pricing"})))
        .await
        .unwrap();

    let mut kinds = Vec::new();
    while let Ok(event) = rx.try_recv() {
        let json = serde_json::to_value(&event).unwrap();
        kinds.push(json["type"].as_str().unwrap().to_string());
    }
    assert_eq!(kinds, vec!["BrowserAction", "AiResponse"]);
}

// ---------------------------------------------------------------------------
// API key auth
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_api_key_required() {
    let page = Arc::new(FakePage::new("https://example.com/", "Example"));
    let state = make_state_with(Arc::new(FakeLauncher::new(page)), Some("secret"));

    let res = app(state.clone()).oneshot(get("/api/demos")).await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let req = axum::http::Request::builder()
        .uri("/api/demos")
        .header("X-API-Key", "wrong")
        .body(axum::body::Body::empty())
        .unwrap();
    let res = app(state.clone()).oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let req = axum::http::Request::builder()
        .uri("/api/demos")
        .header("X-API-Key", "secret")
        .body(axum::body::Body::empty())
        .unwrap();
    let res = app(state.clone()).oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    // Health stays open for monitors
    let res = app(state).oneshot(get("/api/health")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}
