//! iptc-annotate 主入口

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use iptc_annotate::config::parse_language;
use iptc_annotate::{AnnotateError, Annotator, AppConfig, Settings, VlmClient};
use tracing::{debug, error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Recursively annotate JPEG images with IPTC keywords and captions/abstracts
/// using ollama and a vision model.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Directory to recursively scan for JPEG images
    directory: PathBuf,

    /// Overwrite existing IPTC entries
    #[arg(short, long, default_value_t = false)]
    overwrite: bool,

    /// Desired output language as ISO 639-1 code
    #[arg(short, long, default_value = "en", value_parser = parse_language)]
    language: String,

    /// Configuration file with an [ollama] section
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn main() -> ExitCode {
    // 初始化日志
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("iptc_annotate=info")),
        )
        .init();

    let args = Args::parse();
    info!("Starting iptc-annotate v{}", env!("CARGO_PKG_VERSION"));

    let result = run(args);
    if let Err(e) = &result {
        error!("{:#}", e);
    }
    ExitCode::from(exit_status(&result))
}

/// 根目录无效时的退出码（与 clap 的用法错误一致）
const EXIT_INVALID_ROOT: u8 = 2;

/// 单个文件失败不影响退出码，只有中止运行的错误返回非零
fn exit_status(result: &anyhow::Result<()>) -> u8 {
    match result {
        Ok(()) => 0,
        Err(_) => EXIT_INVALID_ROOT,
    }
}

fn run(args: Args) -> anyhow::Result<()> {
    let config = AppConfig::load(args.config.as_deref());
    let settings = Settings {
        directory: args.directory,
        overwrite: args.overwrite,
        language: args.language,
        ollama: config.ollama,
    };
    debug!("{:?}", settings);

    if settings.language != "en" {
        info!(
            "Translation to '{}' is not implemented, annotations stay as the model returns them",
            settings.language
        );
    }

    info!(
        "Using model {} at {} (timeout {}s)",
        settings.ollama.model, settings.ollama.base_url, settings.ollama.timeout
    );
    let client = VlmClient::new(settings.ollama.clone())?;
    let annotator = Annotator::new(client, settings.overwrite);

    match annotator.run(&settings.directory) {
        Ok(_) => Ok(()),
        Err(e @ AnnotateError::InvalidRoot(_)) => {
            Err(anyhow::anyhow!("No valid working directory provided: {}", e))
        }
        Err(e) => Err(e.into()),
    }
}
