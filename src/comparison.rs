use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::fingerprint::fingerprint;

/// 对比记录：一对归一化后的图片 + 提交者 + 创建时间
///
/// key 不是字段。它永远由 (left, right, submitter) 推导出来，
/// `title` 和 `created_at` 不参与计算。
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Comparison {
    /// 可选标题，允许为空
    pub title: String,

    /// 归一化后的 JPEG 字节，不是原始上传
    pub left: Vec<u8>,
    pub right: Vec<u8>,

    /// 身份提供方给出的不透明字符串
    pub submitter: String,

    /// 入库时刻，Unix 时间戳 (微秒)
    pub created_at: i64,
}

/// 左图还是右图
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "left" => Some(Side::Left),
            "right" => Some(Side::Right),
            _ => None,
        }
    }
}

impl Comparison {
    pub fn new(
        title: impl Into<String>,
        left: Vec<u8>,
        right: Vec<u8>,
        submitter: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            title: title.into(),
            left,
            right,
            submitter: submitter.into(),
            created_at: created_at.timestamp_micros(),
        }
    }

    /// 显式重新计算 key
    pub fn key(&self) -> String {
        fingerprint(&self.left, &self.right, &self.submitter)
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        Utc.timestamp_micros(self.created_at)
            .single()
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    }

    pub fn image(&self, side: Side) -> &[u8] {
        match side {
            Side::Left => &self.left,
            Side::Right => &self.right,
        }
    }
}
