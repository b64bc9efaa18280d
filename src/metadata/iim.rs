//! Photoshop 图像资源块与 IPTC-IIM 数据集编解码
//!
//! APP13 段内容 = `Photoshop 3.0\0` + 若干 `8BIM` 资源块，
//! 其中资源 0x0404 保存 IIM 数据集（`0x1C record dataset length data`）。

use tracing::warn;

use super::MetadataError;

pub const PHOTOSHOP_HEADER: &[u8] = b"Photoshop 3.0\0";
pub const IPTC_RESOURCE_ID: u16 = 0x0404;

/// 1:90 CodedCharacterSet = ESC % G (UTF-8)
pub const UTF8_CHARSET: &[u8] = &[0x1B, 0x25, 0x47];

pub const RECORD_ENVELOPE: u8 = 1;
pub const RECORD_APPLICATION: u8 = 2;
pub const DATASET_CHARSET: u8 = 90;
pub const DATASET_RECORD_VERSION: u8 = 0;
pub const DATASET_KEYWORDS: u8 = 25;
pub const DATASET_CAPTION: u8 = 120;

const TAG_MARKER: u8 = 0x1C;
const KNOWN_SIGNATURES: [&[u8; 4]; 4] = [b"8BIM", b"PHUT", b"AgHg", b"DCSR"];

/// Photoshop 图像资源块
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageResource {
    pub signature: [u8; 4],
    pub id: u16,
    pub name: Vec<u8>,
    pub data: Vec<u8>,
}

impl ImageResource {
    pub fn iptc(data: Vec<u8>) -> Self {
        Self {
            signature: *b"8BIM",
            id: IPTC_RESOURCE_ID,
            name: Vec::new(),
            data,
        }
    }

    pub fn is_iptc(&self) -> bool {
        &self.signature == b"8BIM" && self.id == IPTC_RESOURCE_ID
    }
}

fn malformed(reason: &str) -> MetadataError {
    MetadataError::Malformed(reason.to_string())
}

fn read_u16(bytes: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([bytes[offset], bytes[offset + 1]])
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

fn starts_with_signature(bytes: &[u8]) -> bool {
    KNOWN_SIGNATURES
        .iter()
        .any(|signature| bytes.starts_with(&signature[..]))
}

/// 解析资源块序列
///
/// 遇到无法识别的签名或不足一个块头的尾部数据时停止，返回已解析的资源。
/// 奇数长度数据后缺少填充字节也能容忍。
pub fn parse_resources(bytes: &[u8]) -> Result<Vec<ImageResource>, MetadataError> {
    let mut resources = Vec::new();
    let mut offset = 0;

    while offset < bytes.len() {
        let rest = &bytes[offset..];
        // 尾部填充
        if rest.iter().all(|&b| b == 0) {
            break;
        }
        if rest.len() < 12 || !starts_with_signature(rest) {
            warn!(
                "Ignoring {} unrecognised bytes after {} image resources",
                rest.len(),
                resources.len()
            );
            break;
        }

        let mut signature = [0u8; 4];
        signature.copy_from_slice(&rest[..4]);
        let id = read_u16(rest, 4);

        // Pascal 字符串，连同长度字节补齐到偶数
        let name_len = rest[6] as usize;
        let name_end = 7 + name_len;
        let padded_name_end = name_end + (name_end - 6) % 2;
        if padded_name_end + 4 > rest.len() {
            return Err(malformed("truncated image resource name"));
        }
        let name = rest[7..name_end].to_vec();

        let size = read_u32(rest, padded_name_end) as usize;
        let data_start = padded_name_end + 4;
        let data_end = data_start
            .checked_add(size)
            .filter(|&end| end <= rest.len())
            .ok_or_else(|| malformed("image resource exceeds segment"))?;
        let data = rest[data_start..data_end].to_vec();

        resources.push(ImageResource {
            signature,
            id,
            name,
            data,
        });
        let pad = usize::from(size % 2 == 1 && !starts_with_signature(&rest[data_end..]));
        offset += data_end + pad;
    }

    Ok(resources)
}

pub fn encode_resources(resources: &[ImageResource]) -> Vec<u8> {
    let mut out = Vec::new();
    for resource in resources {
        out.extend_from_slice(&resource.signature);
        out.extend_from_slice(&resource.id.to_be_bytes());

        let name_len = resource.name.len().min(255);
        out.push(name_len as u8);
        out.extend_from_slice(&resource.name[..name_len]);
        if (name_len + 1) % 2 == 1 {
            out.push(0);
        }

        out.extend_from_slice(&(resource.data.len() as u32).to_be_bytes());
        out.extend_from_slice(&resource.data);
        if resource.data.len() % 2 == 1 {
            out.push(0);
        }
    }
    out
}

/// IIM 数据集
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataSet {
    pub record: u8,
    pub dataset: u8,
    pub data: Vec<u8>,
}

impl DataSet {
    pub fn new(record: u8, dataset: u8, data: impl Into<Vec<u8>>) -> Self {
        Self {
            record,
            dataset,
            data: data.into(),
        }
    }

    pub fn is(&self, record: u8, dataset: u8) -> bool {
        self.record == record && self.dataset == dataset
    }
}

pub fn parse_datasets(bytes: &[u8]) -> Result<Vec<DataSet>, MetadataError> {
    let mut datasets = Vec::new();
    let mut offset = 0;

    while offset < bytes.len() {
        if bytes[offset] != TAG_MARKER {
            if bytes[offset..].iter().all(|&b| b == 0) {
                break;
            }
            return Err(malformed("expected IIM tag marker"));
        }
        if offset + 5 > bytes.len() {
            return Err(malformed("truncated IIM dataset header"));
        }

        let record = bytes[offset + 1];
        let dataset = bytes[offset + 2];
        let raw_len = read_u16(bytes, offset + 3);
        let mut data_start = offset + 5;

        let length = if raw_len & 0x8000 != 0 {
            // 扩展长度：低 15 位是长度字段本身的字节数
            let count = (raw_len & 0x7FFF) as usize;
            if count == 0 || count > 4 || data_start + count > bytes.len() {
                return Err(malformed("invalid extended IIM length"));
            }
            let length = bytes[data_start..data_start + count]
                .iter()
                .fold(0usize, |acc, &b| (acc << 8) | b as usize);
            data_start += count;
            length
        } else {
            raw_len as usize
        };

        let data_end = data_start + length;
        if data_end > bytes.len() {
            return Err(malformed("IIM dataset exceeds resource"));
        }

        datasets.push(DataSet::new(record, dataset, &bytes[data_start..data_end]));
        offset = data_end;
    }

    Ok(datasets)
}

pub fn encode_datasets(datasets: &[DataSet]) -> Vec<u8> {
    let mut out = Vec::new();
    for ds in datasets {
        out.extend_from_slice(&[TAG_MARKER, ds.record, ds.dataset]);
        if ds.data.len() < 0x8000 {
            out.extend_from_slice(&(ds.data.len() as u16).to_be_bytes());
        } else {
            out.extend_from_slice(&0x8004u16.to_be_bytes());
            out.extend_from_slice(&(ds.data.len() as u32).to_be_bytes());
        }
        out.extend_from_slice(&ds.data);
    }
    out
}

/// 解码 IIM 文本：优先 UTF-8，否则按 Latin-1 处理
pub fn decode_text(bytes: &[u8]) -> String {
    let bytes = match bytes.iter().rposition(|&b| b != 0) {
        Some(last) => &bytes[..=last],
        None => &bytes[..0],
    };
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}
