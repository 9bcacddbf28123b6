//! HTTP API 集成测试（需 `web` feature）

#![cfg(feature = "web")]

use std::sync::Arc;

use analyst::analyzer::{Analyzer, StatsAnalyzer};
use analyst::core::AnalystError;
use analyst::integrations::http_api::{create_router, ApiState};
use analyst::pipeline::AnalysisRequest;
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

const BOUNDARY: &str = "analyst-test-boundary";

/// (字段名, 文件名, 内容)
fn multipart_body(parts: &[(&str, &str, &str)]) -> String {
    let mut body = String::new();
    for (name, file_name, content) in parts {
        body.push_str(&format!(
            "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n{}\r\n",
            BOUNDARY, name, file_name, content
        ));
    }
    body.push_str(&format!("--{}--\r\n", BOUNDARY));
    body
}

fn upload(parts: &[(&str, &str, &str)]) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(multipart_body(parts)))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn router(analyzer: Arc<dyn Analyzer>, root: &std::path::Path) -> axum::Router {
    create_router(Arc::new(ApiState::new(analyzer, root)))
}

/// 记录收到的请求并回显问题文本
struct EchoAnalyzer;

#[async_trait]
impl Analyzer for EchoAnalyzer {
    fn name(&self) -> &str {
        "echo"
    }

    async fn analyze(&self, request: &AnalysisRequest) -> Result<Value, AnalystError> {
        let names: Vec<String> = request
            .data_files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        let parents_exist = request.data_files.iter().all(|p| p.exists());
        Ok(json!({
            "question": request.question_text,
            "files": names,
            "saved": parents_exist,
        }))
    }
}

struct FailingAnalyzer;

#[async_trait]
impl Analyzer for FailingAnalyzer {
    fn name(&self) -> &str {
        "failing"
    }

    async fn analyze(&self, _request: &AnalysisRequest) -> Result<Value, AnalystError> {
        Err(AnalystError::Config("no API key".to_string()))
    }
}

#[tokio::test]
async fn test_root_and_health() {
    let dir = tempfile::tempdir().unwrap();
    let app = router(Arc::new(EchoAnalyzer), dir.path());

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        json_body(response).await,
        json!({"message": "Welcome to the LLM-Powered Data Analyst API"})
    );

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(json_body(response).await, json!({"status": "ok"}));
}

#[tokio::test]
async fn test_upload_is_saved_and_analyzed() {
    let dir = tempfile::tempdir().unwrap();
    let app = router(Arc::new(EchoAnalyzer), dir.path());

    let response = app
        .oneshot(upload(&[
            ("questions", "questions.txt", "How many rows?"),
            ("files", "../../sales.csv", "a,b\n1,2\n"),
        ]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        json_body(response).await,
        json!({"question": "How many rows?", "files": ["sales.csv"], "saved": true})
    );

    // 请求结束后上传目录被删除
    let leftovers = std::fs::read_dir(dir.path()).unwrap().count();
    assert_eq!(leftovers, 0);
}

#[tokio::test]
async fn test_missing_csv_is_bad_request() {
    let dir = tempfile::tempdir().unwrap();
    let app = router(Arc::new(EchoAnalyzer), dir.path());

    let response = app
        .oneshot(upload(&[("questions", "questions.txt", "How many rows?")]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await, json!({"detail": "No CSV file provided"}));
}

#[tokio::test]
async fn test_missing_questions_is_bad_request() {
    let dir = tempfile::tempdir().unwrap();
    let app = router(Arc::new(EchoAnalyzer), dir.path());

    let response = app
        .oneshot(upload(&[("files", "data.csv", "x\n1\n")]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_analyzer_error_is_internal_error() {
    let dir = tempfile::tempdir().unwrap();
    let app = router(Arc::new(FailingAnalyzer), dir.path());

    let response = app
        .oneshot(upload(&[
            ("questions", "questions.txt", "q"),
            ("files", "data.csv", "x\n1\n"),
        ]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = json_body(response).await;
    assert!(body["detail"].as_str().unwrap().contains("no API key"));
}

#[tokio::test]
async fn test_stats_analyzer_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let app = router(Arc::new(StatsAnalyzer::new()), dir.path());

    let response = app
        .oneshot(upload(&[
            ("questions", "questions.txt", "Summarize"),
            ("files", "prices.csv", "item,price\napple,1.5\npear,2.5\n"),
        ]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["files"][0]["rows"], 2);
    assert_eq!(body["files"][0]["columns"][1]["mean"], 2.0);
}
