//! 配置管理模块
//!
//! 使用 TOML 文件存储 Ollama 连接配置，按以下顺序查找：
//! 1. 命令行 `--config` 指定的文件
//! 2. 当前目录下的 `iptc_annotate.toml`
//! 3. 用户配置目录：
//!    - Linux: ~/.config/iptc-annotate/config.toml
//!    - macOS: ~/Library/Application Support/org.iptc-annotate.iptc-annotate/config.toml
//!    - Windows: %APPDATA%\iptc-annotate\iptc-annotate\config\config.toml
//!
//! 文件、段落或单个键缺失时都回退到默认值，配置问题不会影响退出码。

use anyhow::{anyhow, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// 当前目录下的配置文件名
pub const LOCAL_CONFIG_FILE: &str = "iptc_annotate.toml";

/// Ollama 服务配置（`[ollama]` 段）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OllamaConfig {
    /// 模型名称（如 llava:7b、llava:13b）
    #[serde(default = "default_model")]
    pub model: String,
    /// 服务地址
    #[serde(rename = "base_URL", alias = "base_url", default = "default_base_url")]
    pub base_url: String,
    /// 单次请求超时（秒）
    #[serde(default = "default_timeout")]
    pub timeout: f64,
}

fn default_model() -> String {
    "llava:7b".to_string()
}

fn default_base_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_timeout() -> f64 {
    120.0
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            base_url: default_base_url(),
            timeout: default_timeout(),
        }
    }
}

impl OllamaConfig {
    /// 单次推理请求的超时时间，无法表示为 `Duration` 时使用默认值
    pub fn timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.timeout)
            .unwrap_or_else(|_| Duration::from_secs_f64(default_timeout()))
    }

    /// 修正无效的取值
    fn sanitize(mut self) -> Self {
        if self.timeout <= 0.0 || Duration::try_from_secs_f64(self.timeout).is_err() {
            warn!(
                "Invalid timeout {} in config, falling back to {}s",
                self.timeout,
                default_timeout()
            );
            self.timeout = default_timeout();
        }
        let trimmed = self.base_url.trim_end_matches('/');
        if trimmed.len() != self.base_url.len() {
            self.base_url = trimmed.to_string();
        }
        self
    }
}

/// 应用配置（顶层结构）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Ollama 配置
    #[serde(default)]
    pub ollama: OllamaConfig,
}

impl AppConfig {
    /// 获取用户配置目录路径
    pub fn config_dir() -> Result<PathBuf> {
        if let Some(proj_dirs) = ProjectDirs::from("org", "iptc-annotate", "iptc-annotate") {
            Ok(proj_dirs.config_dir().to_path_buf())
        } else {
            // 回退到 ~/.iptc-annotate
            let home = dirs::home_dir().ok_or_else(|| anyhow!("Cannot find home directory"))?;
            Ok(home.join(".iptc-annotate"))
        }
    }

    /// 查找要使用的配置文件
    ///
    /// 显式指定的路径总是被返回（即使不存在，由调用方报告）。
    pub fn resolve_path(explicit: Option<&Path>) -> Option<PathBuf> {
        if let Some(path) = explicit {
            return Some(path.to_path_buf());
        }

        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.is_file() {
            return Some(local);
        }

        match Self::config_dir() {
            Ok(dir) => {
                let path = dir.join("config.toml");
                path.is_file().then_some(path)
            }
            Err(e) => {
                debug!("No user config directory: {}", e);
                None
            }
        }
    }

    /// 从指定文件读取配置
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| anyhow!("Cannot read {}: {}", path.display(), e))?;
        Self::from_toml(&content)
    }

    /// 解析 TOML 文本
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        Ok(Self {
            ollama: config.ollama.sanitize(),
        })
    }

    /// 加载配置，任何问题都回退到默认值
    pub fn load(explicit: Option<&Path>) -> Self {
        let Some(path) = Self::resolve_path(explicit) else {
            info!("No config file found, proceeding with default settings");
            return Self::default();
        };

        debug!("Loading config from: {}", path.display());
        match Self::load_from(&path) {
            Ok(config) => {
                info!("Config loaded from: {}", path.display());
                config
            }
            Err(e) => {
                warn!(
                    "Failed to load config {}: {}. Proceeding with default settings",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }
}

/// 一次运行的完整设置（命令行 + 配置文件）
#[derive(Debug, Clone)]
pub struct Settings {
    /// 要扫描的根目录
    pub directory: PathBuf,
    /// 覆盖已有的 IPTC 条目
    pub overwrite: bool,
    /// 输出语言（ISO 639-1），目前只做校验和保存
    pub language: String,
    pub ollama: OllamaConfig,
}

/// 校验 ISO 639-1 语言代码，返回小写形式
pub fn parse_language(code: &str) -> std::result::Result<String, String> {
    if code.len() == 2 && code.chars().all(|c| c.is_ascii_alphabetic()) {
        Ok(code.to_ascii_lowercase())
    } else {
        Err(format!("{} is not a proper ISO 639-1 code", code))
    }
}
