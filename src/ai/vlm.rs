//! 视觉语言模型 (VLM) 客户端
//!
//! 通过 Ollama 原生 API（`POST /api/generate`）描述图片。
//! 同步阻塞调用：一个请求完成后才处理下一张图片，不做批处理、缓存或重试。

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::OllamaConfig;

/// 推理请求错误
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("request timed out")]
    Timeout,
    #[error("cannot connect to {0}")]
    Connection(String),
    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error(transparent)]
    Http(reqwest::Error),
}

impl InferenceError {
    /// 超时和连接失败属于可重试的 I/O 错误（本工具本身不重试）
    pub fn is_retryable(&self) -> bool {
        matches!(self, InferenceError::Timeout | InferenceError::Connection(_))
    }

    fn from_reqwest(err: reqwest::Error, url: &str) -> Self {
        if err.is_timeout() {
            InferenceError::Timeout
        } else if err.is_connect() {
            InferenceError::Connection(url.to_string())
        } else {
            InferenceError::Http(err)
        }
    }
}

/// 图片描述接口
///
/// 输入为预处理后的 JPEG 字节，输出为模型的原始文本。
pub trait Describe {
    fn describe(&self, image_jpeg: &[u8]) -> Result<String, InferenceError>;
}

impl<F> Describe for F
where
    F: Fn(&[u8]) -> Result<String, InferenceError>,
{
    fn describe(&self, image_jpeg: &[u8]) -> Result<String, InferenceError> {
        self(image_jpeg)
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    images: Vec<String>,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
    #[serde(default)]
    prompt_eval_count: Option<u64>,
    #[serde(default)]
    eval_count: Option<u64>,
}

fn is_loopback(base_url: &str) -> bool {
    reqwest::Url::parse(base_url)
        .ok()
        .and_then(|url| {
            url.host_str()
                .map(|host| matches!(host, "localhost" | "127.0.0.1" | "[::1]"))
        })
        .unwrap_or(false)
}

/// Ollama 客户端
pub struct VlmClient {
    config: OllamaConfig,
    client: Client,
}

impl VlmClient {
    /// 创建客户端，超时取自配置
    pub fn new(config: OllamaConfig) -> Result<Self, InferenceError> {
        let mut builder = Client::builder().timeout(config.timeout());
        // 本地服务不走系统代理
        if is_loopback(&config.base_url) {
            builder = builder.no_proxy();
        }
        let client = builder.build().map_err(InferenceError::Http)?;
        Ok(Self { config, client })
    }

    /// 构建描述 Prompt
    pub fn prompt() -> &'static str {
        "Please describe this picture. Answer in exactly this format and nothing else:\n\
         KEYWORDS: five keywords describing the picture, separated by semicolons\n\
         CAPTION: a short concise abstract describing the picture in one sentence\n\
         Thank you!"
    }

    fn generate_url(&self) -> String {
        format!("{}/api/generate", self.config.base_url)
    }

    /// 获取配置
    pub fn config(&self) -> &OllamaConfig {
        &self.config
    }
}

impl Describe for VlmClient {
    fn describe(&self, image_jpeg: &[u8]) -> Result<String, InferenceError> {
        let url = self.generate_url();
        let request = GenerateRequest {
            model: &self.config.model,
            prompt: Self::prompt(),
            images: vec![BASE64.encode(image_jpeg)],
            stream: false,
            options: GenerateOptions { temperature: 0.0 },
        };

        debug!(
            "VLM API Request: url={}, model={}, image_size={}KB",
            url,
            self.config.model,
            image_jpeg.len() / 1024
        );

        let start_time = Instant::now();
        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .map_err(|e| InferenceError::from_reqwest(e, &url))?;
        let status = response.status();
        let body = response
            .text()
            .map_err(|e| InferenceError::from_reqwest(e, &url))?;

        info!(
            "VLM API Response: status={}, elapsed={:.2}s",
            status,
            start_time.elapsed().as_secs_f64()
        );

        if !status.is_success() {
            warn!("VLM API Error: status={}, body={}", status, body);
            return Err(InferenceError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let result: GenerateResponse = serde_json::from_str(&body)
            .map_err(|e| InferenceError::InvalidResponse(e.to_string()))?;

        debug!(
            "VLM API Usage: prompt_tokens={}, completion_tokens={}, content_length={}",
            result.prompt_eval_count.unwrap_or(0),
            result.eval_count.unwrap_or(0),
            result.response.len()
        );

        Ok(result.response)
    }
}
