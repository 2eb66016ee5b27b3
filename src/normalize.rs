use image::{codecs::jpeg::JpegEncoder, imageops::FilterType, DynamicImage, ExtendedColorType};
use tracing::debug;

use crate::error::Result;

/// 模块：图片归一化 (Image Normalizer)
///
/// **职责**: 把任意一张 JPEG/PNG 解码，再按"两段式"策略缩小，最后统一重新编码成 JPEG。
///
/// **尺寸策略** (以 `max = 800` 为例，`target = max / 2 = 400`):
/// - 长边 `D <= max`: 不缩放，只做一次解码 + 重新编码（顺便去掉元数据、统一色彩空间）。
/// - `max < D <= 2 * max`: 一次高质量缩放，直接缩到 `target x target` 的边界框内。
/// - `D > 2 * max`: 先用便宜的最近邻采样缩到 `max x max`，再用高质量滤波缩到 `target`。
///
/// 注意触发阈值 (800) 和输出边界 (400) 并不相同，这是现有行为，保持原样。
pub const MAX_DIMENSION: u32 = 800;

/// 默认 JPEG 质量
pub const DEFAULT_JPEG_QUALITY: u8 = 95;

/// 第一阶段：粗采样，只求快
const COARSE_FILTER: FilterType = FilterType::Nearest;
/// 第二阶段：精细缩放，平滑掉第一阶段的锯齿
const FINE_FILTER: FilterType = FilterType::CatmullRom;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizeOptions {
    /// 缩放触发阈值；输出边界为它的一半
    pub max_dimension: u32,
    pub quality: u8,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            max_dimension: MAX_DIMENSION,
            quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

impl NormalizeOptions {
    /// 输出边界 (`max / 2`)
    pub fn target(&self) -> u32 {
        self.max_dimension / 2
    }
}

/// 用默认参数归一化
pub fn normalize(raw: &[u8]) -> Result<Vec<u8>> {
    normalize_with(raw, &NormalizeOptions::default())
}

/// 解码 -> 缩放 -> 重新编码
///
/// 解码失败或编码失败都会返回 `InvalidImageFormat`，不会产生任何输出。
pub fn normalize_with(raw: &[u8], options: &NormalizeOptions) -> Result<Vec<u8>> {
    // 只编译了 jpeg/png 解码器，其他格式在这里直接失败
    let img = image::load_from_memory(raw)?;
    let img = resample(img, options);
    encode_jpeg(&img, options.quality)
}

/// 按尺寸策略缩放，不涉及编码
pub fn resample(img: DynamicImage, options: &NormalizeOptions) -> DynamicImage {
    let max = options.max_dimension;
    let (width, height) = (img.width(), img.height());
    let longest = width.max(height);

    if longest <= max {
        debug!("{}x{} 在边界内，跳过缩放", width, height);
        return img;
    }

    let mut img = img;
    if longest > max.saturating_mul(2) {
        // 超大图先粗采样，减少第二阶段的计算量
        let (w, h) = fit_within(width, height, max);
        debug!("{}x{} 两段式缩放，第一阶段 -> {}x{}", width, height, w, h);
        img = img.resize_exact(w, h, COARSE_FILTER);
    }

    // 在（可能已经粗采样过的）结果上重新计算边界
    let (w, h) = fit_within(img.width(), img.height(), options.target());
    debug!("{}x{} 缩放 -> {}x{}", img.width(), img.height(), w, h);
    img.resize_exact(w, h, FINE_FILTER)
}

/// 保持宽高比，把长边压到 `bound`，短边按同一比例截断取整
///
/// 极端细长的图片短边可能被截断为 0，这里至少保留 1 像素，否则无法编码。
pub fn fit_within(width: u32, height: u32, bound: u32) -> (u32, u32) {
    let bound = bound.max(1);
    let (w, h) = if width > height {
        (bound, scale(height, bound, width))
    } else {
        (scale(width, bound, height), bound)
    };
    (w.max(1), h.max(1))
}

// 用 u64 做中间值，避免 `side * bound` 溢出
fn scale(side: u32, bound: u32, longest: u32) -> u32 {
    (u64::from(side) * u64::from(bound) / u64::from(longest.max(1))) as u32
}

fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Vec<u8>> {
    // JPEG 没有 alpha 通道，统一转成 RGB8
    let rgb = img.to_rgb8();
    let mut buf = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100));
    encoder.encode(rgb.as_raw(), rgb.width(), rgb.height(), ExtendedColorType::Rgb8)?;
    Ok(buf)
}
