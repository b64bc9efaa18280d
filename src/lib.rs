//! iptc-annotate - 使用本地视觉模型为 JPEG 图片生成 IPTC 关键词和说明
//!
//! 核心库，提供目录扫描、元数据检查、Ollama 推理、响应解析和 IPTC 写入功能。

pub mod ai;
pub mod config;
pub mod error;
pub mod metadata;
pub mod pipeline;

pub use ai::{Annotation, Describe, VlmClient};
pub use config::{AppConfig, OllamaConfig, Settings};
pub use error::AnnotateError;
pub use metadata::{read_iptc, write_iptc, IptcMetadata};
pub use pipeline::{Annotator, FileOutcome, RunStats};
