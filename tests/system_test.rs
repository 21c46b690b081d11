//! End-to-end: HTTP submission → SQLite persistence → the submitted script
//! running in the isolation boundary → settlement in the SQLite ledger, then
//! a restart against the same file.

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use tower::ServiceExt;

use playgate_core::config::AppConfig;
use playgate_core::traits::ModuleStore;
use playgate_gateway::{AppState, GatewayConfig, GatewayServer, SubmissionService, AGENT_HEADER};
use playgate_governance::FixedWindowRateLimiter;
use playgate_sandbox::{SandboxHost, ScriptRuntime};
use playgate_session::SessionManager;
use playgate_store::{SqliteModuleStore, SqliteScoreLedger};

const MODULE: &str = r#"
(function () {
  let state = { score: 0, ended: false };
  window["GAME"] = {
    async init() {},
    start: function () {},
    reset: () => { state = { score: 0, ended: false }; },
    readState() { return state; },
    dispatchInput(action) {
      if (action === 'pause') return false;
      state.score += 1;
      return true;
    },
    readMeta() { return { name: 'Grid', description: 'Collect coins', controls: {} }; }
  };
})();
"#;

const BOUNDARY: &str = "system-boundary";

fn thumbnail() -> Vec<u8> {
    let img = image::RgbImage::new(96, 96);
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png).unwrap();
    out.into_inner()
}

fn submission_body() -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in [
        ("title", "Grid"),
        ("description", "Collect coins"),
        ("genre", "puzzle"),
        ("mode", "inline-script"),
        ("dimensionality", "2d"),
        ("source", MODULE),
    ] {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                BOUNDARY, name, value
            )
            .as_bytes(),
        );
    }
    body.extend_from_slice(
        format!(
            "--{}\r\nContent-Disposition: form-data; name=\"thumbnail\"; filename=\"t.png\"\r\n\r\n",
            BOUNDARY
        )
        .as_bytes(),
    );
    body.extend_from_slice(&thumbnail());
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
    body
}

fn build_app(db: &Path) -> (Router, Arc<SqliteScoreLedger>) {
    let config = AppConfig::default();
    let store: Arc<dyn ModuleStore> = Arc::new(SqliteModuleStore::new(db).unwrap());
    let ledger = Arc::new(SqliteScoreLedger::new(db).unwrap());
    let limiter = Arc::new(FixedWindowRateLimiter::new(config.rate_limits.clone()));
    let runtime = ScriptRuntime::from_config(&config.sandbox);
    let host = Arc::new(SandboxHost::new(Arc::new(runtime), config.sandbox.clone()));
    let sessions = Arc::new(SessionManager::new(
        store.clone(),
        host.clone(),
        limiter.clone(),
        ledger.clone(),
        config.session.clone(),
    ));
    let state = AppState {
        submissions: SubmissionService::new(store.clone(), limiter.clone()),
        store,
        sessions,
        host,
        limiter,
    };
    let router = GatewayServer::new(GatewayConfig::from(&config.server), state).build_router();
    (router, ledger)
}

async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut request = Request::builder()
        .method(method)
        .uri(uri)
        .header(AGENT_HEADER, "agent-sys");
    let body = match body {
        Some(value) => {
            request = request.header(header::CONTENT_TYPE, "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };
    let response = app.clone().oneshot(request.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

#[tokio::test]
async fn test_submit_play_settle_and_restart() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("playgate.db");

    let (app, ledger) = build_app(&db);
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/games")
                .header(AGENT_HEADER, "author")
                .header(
                    header::CONTENT_TYPE,
                    format!("multipart/form-data; boundary={}", BOUNDARY),
                )
                .body(Body::from(submission_body()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let summary: Value = serde_json::from_slice(
        &axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap(),
    )
    .unwrap();
    let game_id = summary["id"].as_str().unwrap().to_string();
    assert_eq!(summary["digest"].as_str().unwrap().len(), 64);

    let (status, start) = call(&app, "POST", "/v1/sessions", Some(json!({ "game_id": game_id }))).await;
    assert_eq!(status, StatusCode::CREATED, "{}", start);
    let session_id = start["session_id"].as_str().unwrap().to_string();
    assert_eq!(start["meta"]["name"], "Grid");
    assert_eq!(start["meta"]["description"], "Collect coins");

    // The module accepts every move and counts it.
    for action in ["up", "right", "down", "down", "left"] {
        let (status, outcome) = call(
            &app,
            "POST",
            &format!("/v1/sessions/{}/input", session_id),
            Some(json!({ "action": action })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(outcome["accepted"], true);
    }
    let (status, outcome) = call(
        &app,
        "POST",
        &format!("/v1/sessions/{}/input", session_id),
        Some(json!({ "action": "pause" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome["accepted"], false);

    let (_, first) = call(&app, "GET", &format!("/v1/sessions/{}/state", session_id), None).await;
    let (_, second) = call(&app, "GET", &format!("/v1/sessions/{}/state", session_id), None).await;
    assert_eq!(first, second);
    assert_eq!(second["score"], 5.0);

    let (status, settlement) = call(&app, "POST", &format!("/v1/sessions/{}/end", session_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(settlement["score"], second["score"]);

    let board = ledger.leaderboard(&game_id, 10).await.unwrap();
    assert_eq!(board.len(), 1);
    assert_eq!(board[0].session_id, session_id);

    // Restart against the same database: the module is still playable.
    drop(app);
    let (app, ledger) = build_app(&db);
    let (status, body) = call(&app, "GET", &format!("/v1/games/{}", game_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["title"], "Grid");

    let (status, _) = call(&app, "POST", "/v1/sessions", Some(json!({ "game_id": game_id }))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(ledger.leaderboard(&game_id, 10).await.unwrap().len(), 1);
}
