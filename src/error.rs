//! 错误类型
//!
//! 分两类：致命错误（根目录无效，直接退出）和单文件错误（记录日志后继续下一个文件）。

use std::path::PathBuf;
use thiserror::Error;

use crate::ai::response::ParseError;
use crate::ai::vlm::InferenceError;
use crate::metadata::MetadataError;

/// 顶层错误
#[derive(Debug, Error)]
pub enum AnnotateError {
    /// 根目录不存在或不是目录
    #[error("{} is not a directory", .0.display())]
    InvalidRoot(PathBuf),

    #[error("failed to prepare image: {0}")]
    Image(#[from] image::ImageError),

    #[error("inference failed: {0}")]
    Inference(#[from] InferenceError),

    #[error("could not parse model response: {0}")]
    Parse(#[from] ParseError),

    #[error("metadata error: {0}")]
    Metadata(#[from] MetadataError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl AnnotateError {
    /// 是否需要中止整个运行
    pub fn is_fatal(&self) -> bool {
        matches!(self, AnnotateError::InvalidRoot(_))
    }
}

pub type Result<T> = std::result::Result<T, AnnotateError>;
