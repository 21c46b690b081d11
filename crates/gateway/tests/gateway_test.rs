use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::io::Cursor;
use std::sync::Arc;
use tower::ServiceExt;

use playgate_core::config::AppConfig;
use playgate_core::ModuleStore;
use playgate_gateway::{AppState, GatewayConfig, GatewayServer, SubmissionService, AGENT_HEADER};
use playgate_governance::FixedWindowRateLimiter;
use playgate_sandbox::{DemoGame, GameModule, NativeRuntime, SandboxHost};
use playgate_session::SessionManager;
use playgate_store::{InMemoryModuleStore, InMemoryScoreLedger};

const MODULE: &str = r#"
window.GAME = {
  init() {},
  start() {},
  reset() {},
  readState() { return { score: 0, ended: false }; },
  dispatchInput(action) { return action === 'up'; },
  readMeta() { return { name: 'Up', description: 'Press up', controls: ['up'] }; }
};
"#;

const BOUNDARY: &str = "playgate-test-boundary";

fn png(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::new(width, height);
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png).unwrap();
    out.into_inner()
}

fn multipart(fields: &[(&str, &str)], thumbnail: Option<Vec<u8>>) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                BOUNDARY, name, value
            )
            .as_bytes(),
        );
    }
    if let Some(data) = thumbnail {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"thumbnail\"; filename=\"t.png\"\r\nContent-Type: image/png\r\n\r\n",
                BOUNDARY
            )
            .as_bytes(),
        );
        body.extend_from_slice(&data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

fn app() -> Router {
    let config = AppConfig::default();
    let store: Arc<dyn ModuleStore> = Arc::new(InMemoryModuleStore::new());
    let limiter = Arc::new(FixedWindowRateLimiter::new(config.rate_limits.clone()));
    let runtime = NativeRuntime::new()
        .with_fallback(|_| Ok(Box::new(DemoGame::new()) as Box<dyn GameModule>));
    let host = Arc::new(SandboxHost::new(Arc::new(runtime), config.sandbox.clone()));
    let sessions = Arc::new(SessionManager::new(
        store.clone(),
        host.clone(),
        limiter.clone(),
        Arc::new(InMemoryScoreLedger::new()),
        config.session.clone(),
    ));
    let state = AppState {
        submissions: SubmissionService::new(store.clone(), limiter.clone()),
        store,
        sessions,
        host,
        limiter,
    };
    GatewayServer::new(GatewayConfig::from(&config.server), state).build_router()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, json)
}

fn submit(source: &str, thumbnail: Option<Vec<u8>>) -> Request<Body> {
    let body = multipart(
        &[
            ("title", "Up"),
            ("description", "Press up"),
            ("genre", "arcade"),
            ("dimensionality", "2d"),
            ("source", source),
        ],
        thumbnail,
    );
    Request::builder()
        .method("POST")
        .uri("/v1/games")
        .header(AGENT_HEADER, "agent-1")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

fn post_json(uri: &str, agent: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(AGENT_HEADER, agent)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn submitted_game(app: &Router) -> String {
    let (status, body) = send(app, submit(MODULE, Some(png(128, 128)))).await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    body["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = app();
    let (status, body) = send(
        &app,
        Request::builder().uri("/health").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["live_instances"], 0);
}

#[tokio::test]
async fn test_submission_accepted_and_listed() {
    let app = app();
    let game_id = submitted_game(&app).await;

    let (status, body) = send(
        &app,
        Request::builder()
            .uri(format!("/v1/games/{}", game_id))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["title"], "Up");
    assert_eq!(body["agent_id"], "agent-1");
}

#[tokio::test]
async fn test_rejected_submission_lists_every_issue() {
    let app = app();
    let source = MODULE.replace("readMeta()", "describe()").replace("return { score", "eval('1'); return { score");
    let (status, body) = send(&app, submit(&source, None)).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "VALIDATION_FAILED");
    let kinds: Vec<&str> = body["errors"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["kind"].as_str().unwrap())
        .collect();
    assert_eq!(
        kinds,
        vec!["missing_operation", "forbidden_capability", "invalid_thumbnail"]
    );
}

#[tokio::test]
async fn test_submission_requires_agent_header() {
    let app = app();
    let mut request = submit(MODULE, Some(png(128, 128)));
    request.headers_mut().remove(AGENT_HEADER);
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_REQUEST");
}

#[tokio::test]
async fn test_session_flow_over_http() {
    let app = app();
    let game_id = submitted_game(&app).await;

    let (status, body) = send(
        &app,
        post_json("/v1/sessions", "agent-1", json!({ "game_id": game_id })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    assert_eq!(body["phase"], "active");
    assert_eq!(body["meta"]["name"], "Coin Grid");
    let session_id = body["session_id"].as_str().unwrap().to_string();

    let input_uri = format!("/v1/sessions/{}/input", session_id);
    let (status, body) = send(&app, post_json(&input_uri, "agent-1", json!({ "action": "right" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["accepted"], true);

    let (status, body) = send(&app, post_json(&input_uri, "agent-1", json!({ "action": "jump" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["accepted"], false);

    let (status, body) = send(&app, post_json(&input_uri, "agent-2", json!({ "action": "up" }))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "NOT_SESSION_OWNER");

    let end_uri = format!("/v1/sessions/{}/end", session_id);
    let (status, settlement) = send(
        &app,
        post_json(&end_uri, "agent-1", json!({ "final_score": 9999.0 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(settlement["reason"], "agent_ended");
    assert_ne!(settlement["score"], 9999.0);

    let (status, body) = send(&app, post_json(&input_uri, "agent-1", json!({ "action": "up" }))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "TERMINAL_STATE_VIOLATION");

    let (status, _) = send(&app, post_json(&end_uri, "agent-1", json!({}))).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_session_quota_returns_429() {
    let app = app();
    let game_id = submitted_game(&app).await;
    let quota = AppConfig::default().rate_limits.sessions_per_hour;

    for _ in 0..quota {
        let (status, _) = send(
            &app,
            post_json("/v1/sessions", "agent-9", json!({ "game_id": game_id })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let response = app
        .clone()
        .oneshot(post_json(
            "/v1/sessions",
            "agent-9",
            json!({ "game_id": game_id }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key(header::RETRY_AFTER));
    let body: Value = serde_json::from_slice(
        &axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap(),
    )
    .unwrap();
    assert_eq!(body["limit"], "sessions_per_hour");
    assert!(chrono::DateTime::parse_from_rfc3339(body["reset_at"].as_str().unwrap()).is_ok());
}

#[tokio::test]
async fn test_unknown_game_and_session() {
    let app = app();
    let (status, body) = send(
        &app,
        post_json("/v1/sessions", "agent-1", json!({ "game_id": "missing" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "GAME_NOT_FOUND");

    let (status, _) = send(
        &app,
        post_json("/v1/sessions/nope/input", "agent-1", json!({ "action": "up" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_play_instance_bridge_calls() {
    let app = app();
    let game_id = submitted_game(&app).await;

    let (status, body) = send(
        &app,
        post_json(&format!("/v1/games/{}/play", game_id), "viewer", json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    let instance_id = body["instance_id"].as_str().unwrap().to_string();
    let call_uri = format!("/v1/instances/{}/call", instance_id);

    let (status, body) = send(&app, post_json(&call_uri, "viewer", json!({ "operation": "start" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);

    let (_, body) = send(
        &app,
        post_json(&call_uri, "viewer", json!({ "operation": "dispatchInput", "args": { "action": "down" } })),
    )
    .await;
    assert_eq!(body["ok"], true);
    assert_eq!(body["result"], true);

    let (_, body) = send(&app, post_json(&call_uri, "viewer", json!({ "operation": "dispatchInput" }))).await;
    assert_eq!(body["ok"], false);
    assert_eq!(body["errorKind"], "invalid_arguments");

    let (status, frame) = send(
        &app,
        Request::builder()
            .uri(format!("/v1/instances/{}/frame", instance_id))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(frame["width"], 800);

    let (status, _) = send(
        &app,
        Request::builder()
            .method("DELETE")
            .uri(format!("/v1/instances/{}", instance_id))
            .header(AGENT_HEADER, "viewer")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = send(&app, post_json(&call_uri, "viewer", json!({ "operation": "readState" }))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "INSTANCE_NOT_FOUND");
}

#[tokio::test]
async fn test_instances_belong_to_their_agent() {
    let app = app();
    let game_id = submitted_game(&app).await;

    let play = Request::builder()
        .method("POST")
        .uri(format!("/v1/games/{}/play", game_id))
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, play).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, body) = send(
        &app,
        post_json(&format!("/v1/games/{}/play", game_id), "viewer", json!({})),
    )
    .await;
    let ui_call = format!("/v1/instances/{}/call", body["instance_id"].as_str().unwrap());
    let (status, body) = send(&app, post_json(&ui_call, "intruder", json!({ "operation": "reset" }))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "NOT_INSTANCE_OWNER");

    // A session's instance answers only the session's agent.
    let (_, body) = send(
        &app,
        post_json("/v1/sessions", "agent-1", json!({ "game_id": game_id })),
    )
    .await;
    let session_id = body["session_id"].as_str().unwrap().to_string();
    let (_, session) = send(
        &app,
        Request::builder()
            .uri(format!("/v1/sessions/{}", session_id))
            .header(AGENT_HEADER, "agent-1")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    let instance_id = session["instance_id"].as_str().unwrap().to_string();
    let (status, _) = send(
        &app,
        post_json(
            &format!("/v1/instances/{}/call", instance_id),
            "intruder",
            json!({ "operation": "reset" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(
        &app,
        Request::builder()
            .method("DELETE")
            .uri(format!("/v1/instances/{}", instance_id))
            .header(AGENT_HEADER, "intruder")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}
