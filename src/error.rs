use thiserror::Error;

/// 核心层的错误种类
///
/// 每个核心操作要么成功，要么返回其中一种错误；核心本身不做重试和恢复，
/// 如何把它翻译成用户可见的结果由调用方（表现层）决定。
#[derive(Error, Debug)]
pub enum CompareError {
    /// 任意一侧图片解码（或重新编码）失败
    #[error("Invalid image format")]
    InvalidImageFormat,

    /// 上传请求里缺少必需的字段
    #[error("Missing input: {0}")]
    MissingInput(String),

    #[error("Comparison not found: {0}")]
    NotFound(String),

    /// key 不符合 `^[0-9a-f]{32}$`
    #[error("Invalid lookup key: {0}")]
    InvalidKey(String),

    /// 后端存储未能完成 put/get/list
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),
}

pub type Result<T> = std::result::Result<T, CompareError>;

impl From<image::ImageError> for CompareError {
    fn from(_: image::ImageError) -> Self {
        // 不暴露具体的解码细节，只保留错误种类
        CompareError::InvalidImageFormat
    }
}

impl From<sled::Error> for CompareError {
    fn from(e: sled::Error) -> Self {
        CompareError::StoreUnavailable(e.to_string())
    }
}

impl From<bcs::Error> for CompareError {
    fn from(e: bcs::Error) -> Self {
        CompareError::StoreUnavailable(format!("record codec: {e}"))
    }
}
