//! 图片预处理
//!
//! LLaVA 在 672x672、336x1344 或 1344x336 的输入上效果最好，
//! 这里统一缩放到 672x672 并重新编码为 JPEG。

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageReader, ImageResult};
use std::path::Path;
use tracing::debug;

/// 发送给模型的图片尺寸
pub const VLM_IMAGE_SIZE: (u32, u32) = (672, 672);

/// 重新编码的 JPEG 质量
const JPEG_QUALITY: u8 = 75;

/// 读取并预处理图片，返回 JPEG 字节
pub fn prepare_image(path: &Path) -> ImageResult<Vec<u8>> {
    let img = ImageReader::open(path)?.with_guessed_format()?.decode()?;
    debug!(
        "Loaded {} ({}x{})",
        path.display(),
        img.width(),
        img.height()
    );
    encode_for_vlm(&img)
}

/// 缩放并编码为 JPEG
pub fn encode_for_vlm(img: &DynamicImage) -> ImageResult<Vec<u8>> {
    let (width, height) = VLM_IMAGE_SIZE;
    let resized = img.resize_exact(width, height, FilterType::Lanczos3).to_rgb8();

    let mut buffer = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buffer, JPEG_QUALITY);
    resized.write_with_encoder(encoder)?;
    Ok(buffer)
}
