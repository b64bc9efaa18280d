//! 标注前的元数据检查：已有关键词和说明的图片默认跳过

use std::path::Path;

use crate::metadata::{read_iptc, IptcMetadata, MetadataError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Skip,
    Process,
}

pub fn decide(existing: &IptcMetadata, overwrite: bool) -> GateDecision {
    if !overwrite && existing.is_annotated() {
        GateDecision::Skip
    } else {
        GateDecision::Process
    }
}

/// 读取文件元数据后判断；`overwrite` 时不读取文件
pub fn check(path: &Path, overwrite: bool) -> Result<GateDecision, MetadataError> {
    if overwrite {
        return Ok(GateDecision::Process);
    }
    let existing = read_iptc(path)?;
    Ok(decide(&existing, overwrite))
}
