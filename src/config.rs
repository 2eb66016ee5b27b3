use std::env;
use std::fmt::Display;
use std::str::FromStr;

use anyhow::{bail, Context};
use tracing::info;

use crate::normalize::{NormalizeOptions, DEFAULT_JPEG_QUALITY, MAX_DIMENSION};

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: String,
    pub jpeg_quality: u8,
    pub max_dimension: u32,
    pub max_upload_bytes: usize,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// 从任意键值来源读取配置，缺省项使用默认值
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let config = Self {
            host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or(&lookup, "PORT", 3000)?,
            db_path: lookup("DB_PATH").unwrap_or_else(|| "data/db/duibi_db".to_string()),
            jpeg_quality: parse_or(&lookup, "JPEG_QUALITY", DEFAULT_JPEG_QUALITY)?.clamp(1, 100),
            max_dimension: parse_or(&lookup, "MAX_DIMENSION", MAX_DIMENSION)?,
            max_upload_bytes: parse_or(&lookup, "MAX_UPLOAD_BYTES", 32 * 1024 * 1024)?,
        };

        // 输出边界是 max / 2，至少要能缩到 1 像素
        if config.max_dimension < 2 {
            bail!("MAX_DIMENSION must be at least 2, got {}", config.max_dimension);
        }
        Ok(config)
    }

    pub fn normalize_options(&self) -> NormalizeOptions {
        NormalizeOptions {
            max_dimension: self.max_dimension,
            quality: self.jpeg_quality,
        }
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr + Display,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} must be a number, got {raw:?}")),
        None => {
            info!("{key} not set, using default: {default}");
            Ok(default)
        }
    }
}
