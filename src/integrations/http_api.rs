//! HTTP API：上传问题文件与 CSV，返回分析结果 JSON
//!
//! - `GET /` 欢迎信息
//! - `GET /health` 健康检查
//! - `POST /api/` multipart：`questions`（必填，一个文件）+ `files`（至少一个 CSV）

use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};

use crate::analyzer::Analyzer;
use crate::pipeline::AnalysisRequest;

/// 单次请求上传总量上限
pub const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

pub const WELCOME_MESSAGE: &str = "Welcome to the LLM-Powered Data Analyst API";
pub const NO_CSV_DETAIL: &str = "No CSV file provided";

/// HTTP 服务状态
pub struct ApiState {
    pub analyzer: Arc<dyn Analyzer>,
    /// 每个请求的上传目录建在这里
    pub upload_root: PathBuf,
}

impl ApiState {
    pub fn new(analyzer: Arc<dyn Analyzer>, upload_root: impl Into<PathBuf>) -> Self {
        Self {
            analyzer,
            upload_root: upload_root.into(),
        }
    }
}

/// 错误响应，body 统一为 `{"detail": ...}`
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            ApiError::BadRequest(d) => (StatusCode::BAD_REQUEST, d),
            ApiError::Internal(d) => (StatusCode::INTERNAL_SERVER_ERROR, d),
        };
        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

/// 创建 HTTP 路由
pub fn create_router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/api/", post(analyze))
        .route("/api", post(analyze))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state)
}

async fn root() -> Json<Value> {
    Json(json!({ "message": WELCOME_MESSAGE }))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// POST /api/ - 保存上传文件到请求级临时目录并运行分析器
async fn analyze(
    State(state): State<Arc<ApiState>>,
    mut multipart: Multipart,
) -> Result<Json<Value>, ApiError> {
    tokio::fs::create_dir_all(&state.upload_root)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    // 响应返回后随 drop 删除
    let upload_dir = tempfile::Builder::new()
        .prefix("upload-")
        .tempdir_in(&state.upload_root)
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    let mut question_file: Option<PathBuf> = None;
    let mut data_files: Vec<PathBuf> = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.body_text()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if name != "questions" && name != "files" {
            tracing::debug!(field = %name, "ignoring multipart field");
            continue;
        }
        let fallback = if name == "questions" {
            "questions.txt".to_string()
        } else {
            format!("data-{}.csv", data_files.len())
        };
        let file_name = safe_file_name(field.file_name(), &fallback);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()))?;
        if name == "files" && bytes.is_empty() && file_name == fallback {
            // 浏览器表单未选文件时会提交空字段
            continue;
        }

        let path = unique_path(upload_dir.path(), &file_name);
        tokio::fs::write(&path, &bytes)
            .await
            .map_err(|e| ApiError::Internal(e.to_string()))?;
        tracing::debug!(field = %name, path = %path.display(), size = bytes.len(), "upload saved");

        if name == "questions" {
            question_file = Some(path);
        } else {
            data_files.push(path);
        }
    }

    let Some(question_file) = question_file else {
        return Err(ApiError::BadRequest(
            "Missing required file field 'questions'".to_string(),
        ));
    };
    if data_files.is_empty() {
        return Err(ApiError::BadRequest(NO_CSV_DETAIL.to_string()));
    }

    tracing::info!(
        analyzer = state.analyzer.name(),
        files = data_files.len(),
        "analysis request received"
    );

    let request = AnalysisRequest::load(&question_file, &data_files)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    let value = state.analyzer.analyze(&request).await.map_err(|e| {
        tracing::error!("Analysis failed: {}", e);
        ApiError::Internal(e.to_string())
    })?;

    Ok(Json(value))
}

/// 只保留文件名部分，防止 `../` 之类的路径逃出上传目录
fn safe_file_name(raw: Option<&str>, fallback: &str) -> String {
    raw.and_then(|n| Path::new(n).file_name())
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| fallback.to_string())
}

fn unique_path(dir: &Path, file_name: &str) -> PathBuf {
    let candidate = dir.join(file_name);
    if !candidate.exists() {
        return candidate;
    }
    (1..)
        .map(|i| dir.join(format!("{}-{}", i, file_name)))
        .find(|p| !p.exists())
        .unwrap_or(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_file_name_strips_directories() {
        assert_eq!(safe_file_name(Some("../../etc/passwd"), "x"), "passwd");
        assert_eq!(safe_file_name(Some("data/sales.csv"), "x"), "sales.csv");
        assert_eq!(safe_file_name(Some(".."), "fallback.csv"), "fallback.csv");
        assert_eq!(safe_file_name(None, "questions.txt"), "questions.txt");
    }

    #[test]
    fn test_unique_path_avoids_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let first = unique_path(dir.path(), "a.csv");
        std::fs::write(&first, "x").unwrap();
        let second = unique_path(dir.path(), "a.csv");
        assert_ne!(first, second);
        assert!(second.ends_with("1-a.csv"));
    }

    #[tokio::test]
    async fn test_error_body_shape() {
        let response = ApiError::BadRequest(NO_CSV_DETAIL.to_string()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value, json!({"detail": "No CSV file provided"}));
    }
}
