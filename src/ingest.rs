use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;

use crate::comparison::Comparison;
use crate::error::{CompareError, Result};
use crate::fingerprint::fingerprint;
use crate::normalize::{normalize_with, NormalizeOptions};
use crate::store::{list_latest, ComparisonStore};

/// 模块：入库协调器 (Ingestion Coordinator)
///
/// **职责**: 一次上传的完整流程：
/// 1. 左右两张图各自归一化（任意一张解码失败立即返回，不写存储）
/// 2. 由归一化后的字节 + 提交者计算 key
/// 3. 带上当前时间构造记录并 put
/// 4. 把 key 交还给调用方
///
/// 自身不持有可变状态；并发调用之间唯一共享的是后端存储。
#[derive(Clone)]
pub struct Ingestor {
    store: Arc<dyn ComparisonStore>,
    options: NormalizeOptions,
}

impl Ingestor {
    pub fn new(store: Arc<dyn ComparisonStore>) -> Self {
        Self::with_options(store, NormalizeOptions::default())
    }

    pub fn with_options(store: Arc<dyn ComparisonStore>, options: NormalizeOptions) -> Self {
        Self { store, options }
    }

    pub fn options(&self) -> &NormalizeOptions {
        &self.options
    }

    pub fn ingest(
        &self,
        left_raw: &[u8],
        right_raw: &[u8],
        submitter: &str,
        title: &str,
    ) -> Result<String> {
        self.ingest_at(left_raw, right_raw, submitter, title, Utc::now())
    }

    /// 同 [`Ingestor::ingest`]，但由调用方指定创建时间
    pub fn ingest_at(
        &self,
        left_raw: &[u8],
        right_raw: &[u8],
        submitter: &str,
        title: &str,
        created_at: DateTime<Utc>,
    ) -> Result<String> {
        if submitter.is_empty() {
            return Err(CompareError::MissingInput("submitter".to_string()));
        }

        let left = normalize_with(left_raw, &self.options)?;
        let right = normalize_with(right_raw, &self.options)?;
        let key = fingerprint(&left, &right, submitter);

        let record = Comparison::new(title, left, right, submitter, created_at);
        self.store.put(&key, &record)?;

        info!(
            "入库成功: key={}, submitter={}, left={}B, right={}B",
            key,
            submitter,
            record.left.len(),
            record.right.len()
        );
        Ok(key)
    }

    /// 按 key 取记录；key 的语法校验由表现层负责
    pub fn get(&self, key: &str) -> Result<Comparison> {
        self.store
            .get(key)?
            .ok_or_else(|| CompareError::NotFound(key.to_string()))
    }

    /// 全部记录，最新的在前
    pub fn list(&self) -> Result<Vec<Comparison>> {
        list_latest(self.store.as_ref())
    }
}
