//! 对比图入库核心 (duibi-core)
//!
//! 提交一对图片（左/右）和提交者身份：两张图各自归一化到有界尺寸，
//! 由内容和提交者推导出确定性的 key，再以该 key 持久化，之后可按 key 取回，
//! 或按提交时间倒序浏览。
//!
//! 数据流：
//! ```text
//! 原始字节 x2 -> normalize -> 归一化字节 x2 -> fingerprint(+submitter) -> key
//!             -> ComparisonStore::put(key, record) -> key 返回给调用方
//! ```

pub mod api;
pub mod comparison;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod ingest;
pub mod normalize;
pub mod store;

pub use comparison::{Comparison, Side};
pub use error::{CompareError, Result};
pub use fingerprint::{fingerprint, is_valid_key};
pub use ingest::Ingestor;
pub use normalize::{normalize, normalize_with, NormalizeOptions};
pub use store::{list_latest, ComparisonStore, MemoryStore, SledStore};
