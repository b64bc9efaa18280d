//! 标注流水线
//!
//! 按顺序处理每个文件：检查元数据 → 预处理图片 → 调用 VLM → 解析响应 → 写入 IPTC。
//! 单个文件失败只记录日志并计数，只有根目录无效才会中止运行。

pub mod gate;
pub mod scanner;

use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

use crate::ai::image_prep::prepare_image;
use crate::ai::response::{parse_response, Annotation};
use crate::ai::vlm::Describe;
use crate::error::Result;
use crate::metadata::write_iptc;

pub use gate::GateDecision;

/// 单个文件的处理结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    Annotated(Annotation),
    Skipped,
}

/// 运行统计
#[derive(Debug, Clone, Default)]
pub struct RunStats {
    /// 成功写入标注的文件数
    pub processed: u64,
    /// 已有标注而跳过的文件数
    pub skipped: u64,
    /// 处理失败的文件数
    pub failed: u64,
    pub elapsed: Duration,
}

impl RunStats {
    pub fn total(&self) -> u64 {
        self.processed + self.skipped + self.failed
    }
}

/// 标注器
pub struct Annotator<D: Describe> {
    describer: D,
    overwrite: bool,
}

impl<D: Describe> Annotator<D> {
    pub fn new(describer: D, overwrite: bool) -> Self {
        Self {
            describer,
            overwrite,
        }
    }

    /// 递归标注根目录下的所有 JPEG
    pub fn run(&self, root: &Path) -> Result<RunStats> {
        let start = Instant::now();
        let files = scanner::scan_jpegs(root)?;
        let mut stats = RunStats::default();

        for path in files {
            info!("Annotating: {}", path.display());
            match self.annotate_file(&path) {
                Ok(FileOutcome::Annotated(_)) => stats.processed += 1,
                Ok(FileOutcome::Skipped) => stats.skipped += 1,
                Err(e) => {
                    stats.failed += 1;
                    error!("Error annotating image {}: {}", path.display(), e);
                }
            }
        }

        stats.elapsed = start.elapsed();
        info!(
            "Completed annotating images in {:.2} seconds: {} processed, {} skipped, {} failed",
            stats.elapsed.as_secs_f64(),
            stats.processed,
            stats.skipped,
            stats.failed
        );
        Ok(stats)
    }

    /// 处理单个文件
    pub fn annotate_file(&self, path: &Path) -> Result<FileOutcome> {
        if gate::check(path, self.overwrite)? == GateDecision::Skip {
            info!(
                "Keywords and caption found in {}. Will not overwrite unless --overwrite is set",
                path.display()
            );
            return Ok(FileOutcome::Skipped);
        }

        let image = prepare_image(path)?;
        let response = self.describer.describe(&image)?;
        debug!("Raw model response for {}: {}", path.display(), response);

        let annotation = parse_response(&response)?;
        write_iptc(path, &annotation.keywords, &annotation.caption)?;

        info!("New keywords: {:?}", annotation.keywords);
        info!("New caption/abstract: {}", annotation.caption);
        Ok(FileOutcome::Annotated(annotation))
    }
}
