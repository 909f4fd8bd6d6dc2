//! HTTP surface
//!
//! `POST /api/run-luma` runs a submission, `/` and `/index.html` serve the
//! front end. Every run answers 200 with a JSON body; success or failure
//! lives in the body, not the status line.

use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, DefaultBodyLimit, State},
    http::{header, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use luma_core::{oversized_request, run_request, ExecutionResult, RunError, RunnerConfig};
use std::any::Any;
use std::path::Path;
use std::sync::Arc;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{self, CorsLayer},
    services::ServeFile,
    trace::TraceLayer,
};

/// Build the application router around a shared, read-only config
pub fn router(config: Arc<RunnerConfig>, web_dir: &Path) -> Router {
    let index = web_dir.join("index.html");
    let body_limit = config.body_limit();

    let cors = CorsLayer::new()
        .allow_origin(cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/api/run-luma", post(run_luma).options(bare_options))
        .layer(DefaultBodyLimit::max(body_limit))
        .route_service("/", ServeFile::new(&index))
        .route_service("/index.html", ServeFile::new(&index))
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(config)
}

// The body is taken raw so a bad payload still gets a JSON answer
async fn run_luma(
    State(config): State<Arc<RunnerConfig>>,
    body: Result<Bytes, BytesRejection>,
) -> Json<ExecutionResult> {
    match body {
        Ok(body) => Json(run_request(&config, &body).await),
        Err(rejection) if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE => {
            Json(oversized_request(&config))
        }
        Err(rejection) => {
            tracing::warn!(error = %rejection.body_text(), "could not read request body");
            Json(RunError::MalformedRequest(rejection.body_text()).into())
        }
    }
}

// CorsLayer only answers requests that carry preflight headers
async fn bare_options() -> impl IntoResponse {
    (
        StatusCode::OK,
        [
            (header::ACCESS_CONTROL_ALLOW_METHODS, "GET, POST, OPTIONS"),
            (header::ACCESS_CONTROL_ALLOW_HEADERS, "Content-Type"),
        ],
    )
}

fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };
    tracing::error!(%detail, "request handler panicked");
    Json(ExecutionResult::server_error(detail)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;
    use serde_json::Value;
    use std::net::SocketAddr;
    use std::time::Duration;

    async fn spawn_server(config: RunnerConfig, web_dir: &Path) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = router(Arc::new(config), web_dir);
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    fn offline_config(artifact_dir: &Path) -> RunnerConfig {
        let mut config = RunnerConfig::lean("/nonexistent/luma");
        config.artifact_dir = artifact_dir.to_path_buf();
        config
    }

    async fn post_code(addr: SocketAddr, body: &str) -> reqwest::Response {
        reqwest::Client::new()
            .post(format!("http://{}/api/run-luma", addr))
            .header("Origin", "http://localhost:3000")
            .header("Content-Type", "application/json")
            .body(body.to_string())
            .send()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_empty_code_is_canned_success() {
        let dir = tempfile::tempdir().unwrap();
        let addr = spawn_server(offline_config(dir.path()), dir.path()).await;

        let resp = post_code(addr, r#"{"code": ""}"#).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers()[reqwest::header::CONTENT_TYPE],
            "application/json"
        );
        assert_eq!(resp.headers()["access-control-allow-origin"], "*");

        let body: Value = resp.json().await.unwrap();
        assert_eq!(
            body,
            serde_json::json!({"success": true, "output": "Code executed successfully!"})
        );
    }

    #[tokio::test]
    async fn test_rejections_are_still_200() {
        let dir = tempfile::tempdir().unwrap();
        let addr = spawn_server(offline_config(dir.path()), dir.path()).await;

        let long = serde_json::json!({ "code": "x".repeat(10_001) }).to_string();
        let resp = post_code(addr, &long).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["success"], false);
        assert!(body["error"].as_str().unwrap().contains("too long"));

        let loops = serde_json::json!({ "code": "while true then\nshow 1\n".repeat(4) }).to_string();
        let body: Value = post_code(addr, &loops).await.json().await.unwrap();
        assert_eq!(body["success"], false);
        assert!(body["error"].as_str().unwrap().contains("while loops"));
    }

    #[tokio::test]
    async fn test_huge_body_is_too_long_not_413() {
        let dir = tempfile::tempdir().unwrap();
        let addr = spawn_server(offline_config(dir.path()), dir.path()).await;

        let huge = serde_json::json!({ "code": "x".repeat(3_000_000) }).to_string();
        let resp = post_code(addr, &huge).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(
            body,
            serde_json::json!({"success": false, "error": "Code too long (maximum 10,000 characters)"})
        );
    }

    #[tokio::test]
    async fn test_body_near_limit_still_reaches_guard() {
        let dir = tempfile::tempdir().unwrap();
        let addr = spawn_server(offline_config(dir.path()), dir.path()).await;

        // 10,000 characters that each escape to six bytes
        let code = "\u{1}".repeat(10_000);
        let body = serde_json::json!({ "code": code }).to_string();
        assert!(body.len() > 60_000);

        let resp: Value = post_code(addr, &body).await.json().await.unwrap();
        // Accepted by the guard, then fails only because the interpreter is missing
        assert!(resp["error"]
            .as_str()
            .unwrap()
            .starts_with("Failed to start interpreter"));
    }

    #[tokio::test]
    async fn test_malformed_json() {
        let dir = tempfile::tempdir().unwrap();
        let addr = spawn_server(offline_config(dir.path()), dir.path()).await;

        let resp = post_code(addr, "{\"code\": ").await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["success"], false);
        assert!(body["error"].as_str().unwrap().starts_with("Invalid JSON in request"));
    }

    #[tokio::test]
    async fn test_missing_interpreter_reports_failure() {
        let dir = tempfile::tempdir().unwrap();
        let addr = spawn_server(offline_config(dir.path()), dir.path()).await;

        let body: Value = post_code(addr, r#"{"code": "show 1"}"#).await.json().await.unwrap();
        assert_eq!(body["success"], false);
        assert!(body["error"]
            .as_str()
            .unwrap()
            .starts_with("Failed to start interpreter"));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_runs_through_interpreter() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = offline_config(dir.path());
        config.interpreter = "/bin/sh".into();
        config.timeout = Duration::from_secs(5);
        let addr = spawn_server(config, dir.path()).await;

        let body: Value = post_code(addr, r#"{"code": "echo hello"}"#).await.json().await.unwrap();
        assert_eq!(body["success"], true);
        let output = body["output"].as_str().unwrap();
        assert!(output.starts_with("hello\n\n⚡ Processing:"));
        assert!(body["execution_time"].as_f64().is_some());
    }

    #[tokio::test]
    async fn test_cors_preflight() {
        let dir = tempfile::tempdir().unwrap();
        let addr = spawn_server(offline_config(dir.path()), dir.path()).await;

        let resp = reqwest::Client::new()
            .request(reqwest::Method::OPTIONS, format!("http://{}/api/run-luma", addr))
            .header("Origin", "http://localhost:3000")
            .header("Access-Control-Request-Method", "POST")
            .header("Access-Control-Request-Headers", "content-type")
            .send()
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()["access-control-allow-origin"], "*");
        let methods = resp.headers()["access-control-allow-methods"].to_str().unwrap();
        assert!(methods.contains("POST"));
        let headers = resp.headers()["access-control-allow-headers"].to_str().unwrap();
        assert!(headers.eq_ignore_ascii_case("content-type"));
    }

    #[tokio::test]
    async fn test_bare_options_is_200() {
        let dir = tempfile::tempdir().unwrap();
        let addr = spawn_server(offline_config(dir.path()), dir.path()).await;

        let resp = reqwest::Client::new()
            .request(reqwest::Method::OPTIONS, format!("http://{}/api/run-luma", addr))
            .header("Origin", "http://localhost:3000")
            .send()
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()["access-control-allow-origin"], "*");
        assert_eq!(resp.headers()["access-control-allow-methods"], "GET, POST, OPTIONS");
        assert_eq!(resp.headers()["access-control-allow-headers"], "Content-Type");
    }

    #[tokio::test]
    async fn test_serves_index() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "<h1>Luma</h1>").unwrap();
        let artifacts = tempfile::tempdir().unwrap();
        let addr = spawn_server(offline_config(artifacts.path()), dir.path()).await;

        for path in ["/", "/index.html"] {
            let resp = reqwest::get(format!("http://{}{}", addr, path)).await.unwrap();
            assert_eq!(resp.status(), StatusCode::OK);
            assert_eq!(resp.text().await.unwrap(), "<h1>Luma</h1>");
        }
    }

    #[tokio::test]
    async fn test_unknown_path_is_404() {
        let dir = tempfile::tempdir().unwrap();
        let addr = spawn_server(offline_config(dir.path()), dir.path()).await;

        let resp = reqwest::get(format!("http://{}/api/unknown", addr)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_panic_becomes_json_error() {
        let resp = panic_response(Box::new("boom"));
        assert_eq!(resp.status(), axum::http::StatusCode::OK);

        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body, serde_json::json!({"success": false, "error": "Server error: boom"}));
    }
}
