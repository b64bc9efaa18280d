//! AI 推理模块
//!
//! 包含图片预处理、Ollama 视觉模型客户端和响应解析。

pub mod image_prep;
pub mod response;
pub mod vlm;

pub use response::{parse_response, Annotation, ParseError, KEYWORD_COUNT};
pub use vlm::{Describe, InferenceError, VlmClient};
