use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use crate::{
    comparison::{Comparison, Side},
    error::CompareError,
    fingerprint::is_valid_key,
    ingest::Ingestor,
};

/// 身份提供方写入的请求头；会话/登录不在本服务内处理
pub const SUBMITTER_HEADER: &str = "x-submitter";

// ==========================================
// 1. 应用状态
// ==========================================
// Ingestor 内部只有 Arc<dyn ComparisonStore> 和只读参数，不需要额外加锁。
pub struct AppState {
    pub ingestor: Ingestor,
    pub max_upload_bytes: usize,
}

// ==========================================
// 2. 错误映射
// ==========================================
#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Compare(#[from] CompareError),

    #[error("Missing submitter identity")]
    Unauthenticated,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Compare(e) => match e {
                CompareError::InvalidImageFormat => StatusCode::UNPROCESSABLE_ENTITY,
                CompareError::MissingInput(_) => StatusCode::BAD_REQUEST,
                CompareError::InvalidKey(_) => StatusCode::BAD_REQUEST,
                CompareError::NotFound(_) => StatusCode::NOT_FOUND,
                CompareError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            },
            ApiError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            warn!("{}", self);
        }
        (status, self.to_string()).into_response()
    }
}

// ==========================================
// 3. 数据传输对象 (DTOs)
// ==========================================
#[derive(Serialize, Debug)]
pub struct UploadReceipt {
    pub key: String,
}

/// 记录摘要，不带图片字节；图片走 `/img/{key}/{side}`
#[derive(Serialize, Debug)]
pub struct ComparisonSummary {
    pub key: String,
    pub title: String,
    pub submitter: String,
    pub created_at: String,
}

impl From<&Comparison> for ComparisonSummary {
    fn from(c: &Comparison) -> Self {
        Self {
            key: c.key(),
            title: c.title.clone(),
            submitter: c.submitter.clone(),
            created_at: c.created_at().to_rfc3339(),
        }
    }
}

// ==========================================
// 4. 路由
// ==========================================
pub fn app(state: Arc<AppState>) -> Router {
    let limit = state.max_upload_bytes;
    Router::new()
        .route("/upload", post(upload))
        .route("/show/{key}", get(show))
        .route("/img/{key}/{side}", get(side_image))
        .route("/list", get(list))
        .layer(DefaultBodyLimit::max(limit))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ==========================================
// 5. 处理函数 (Handlers)
// ==========================================

fn submitter_from(headers: &HeaderMap) -> Result<String, ApiError> {
    headers
        .get(SUBMITTER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or(ApiError::Unauthenticated)
}

/// 查询前的语法校验，格式不对的 key 不会到达存储层
fn checked_key(key: String) -> Result<String, ApiError> {
    if is_valid_key(&key) {
        Ok(key)
    } else {
        Err(CompareError::InvalidKey(key).into())
    }
}

/// 解码/缩放是 CPU 密集型，sled 读写是阻塞 IO，统一放到 blocking 线程池
async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, CompareError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::Internal(format!("Task join error: {e}")))?
        .map_err(ApiError::from)
}

/// 接口：上传一对图片
async fn upload(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadReceipt>), ApiError> {
    let submitter = submitter_from(&headers)?;

    let mut title = String::new();
    let mut left = None;
    let mut right = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.to_string()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "title" => {
                title = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(e.to_string()))?;
            }
            "left_picture" | "right_picture" => {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(e.to_string()))?;
                if name == "left_picture" {
                    left = Some(bytes);
                } else {
                    right = Some(bytes);
                }
            }
            _ => {}
        }
    }

    let left = left.ok_or_else(|| CompareError::MissingInput("left_picture".to_string()))?;
    let right = right.ok_or_else(|| CompareError::MissingInput("right_picture".to_string()))?;
    info!("收到上传: submitter={}, left={}B, right={}B", submitter, left.len(), right.len());

    let ingestor = state.ingestor.clone();
    let key = blocking(move || ingestor.ingest(&left, &right, &submitter, &title)).await?;

    Ok((StatusCode::CREATED, Json(UploadReceipt { key })))
}

/// 接口：查看一条记录的元数据
async fn show(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Result<Json<ComparisonSummary>, ApiError> {
    let key = checked_key(key)?;
    let ingestor = state.ingestor.clone();
    let record = blocking(move || ingestor.get(&key)).await?;
    Ok(Json(ComparisonSummary::from(&record)))
}

/// 接口：取左图或右图 (JPEG)
async fn side_image(
    State(state): State<Arc<AppState>>,
    Path((key, side)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let key = checked_key(key)?;
    let side = Side::parse(&side).ok_or_else(|| ApiError::BadRequest(format!("unknown side: {side}")))?;

    let ingestor = state.ingestor.clone();
    let record = blocking(move || ingestor.get(&key)).await?;
    let bytes = record.image(side).to_vec();

    Ok(([(header::CONTENT_TYPE, "image/jpeg")], bytes).into_response())
}

/// 接口：全部记录，最新的在前
async fn list(State(state): State<Arc<AppState>>) -> Result<Json<Vec<ComparisonSummary>>, ApiError> {
    let ingestor = state.ingestor.clone();
    let records = blocking(move || ingestor.list()).await?;
    Ok(Json(records.iter().map(ComparisonSummary::from).collect()))
}
