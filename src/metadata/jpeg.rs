//! JPEG 段结构
//!
//! 只解析 SOS 之前的头部段，扫描数据原样保留。

use super::MetadataError;

pub const SOI: u8 = 0xD8;
pub const EOI: u8 = 0xD9;
pub const SOS: u8 = 0xDA;
pub const APP13: u8 = 0xED;

/// 头部段
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub marker: u8,
    /// 段内容（不含标记和长度字段）
    pub data: Vec<u8>,
}

impl Segment {
    pub fn new(marker: u8, data: Vec<u8>) -> Self {
        Self { marker, data }
    }

    /// APP0..APP15
    pub fn is_app(&self) -> bool {
        (0xE0..=0xEF).contains(&self.marker)
    }
}

/// 没有长度字段的独立标记（TEM、RST0..RST7）
fn is_standalone(marker: u8) -> bool {
    marker == 0x01 || (0xD0..=0xD7).contains(&marker)
}

/// 拆分后的 JPEG 文件
#[derive(Debug, Clone)]
pub struct JpegFile {
    pub segments: Vec<Segment>,
    /// 从 SOS（或 EOI）标记开始的剩余字节
    tail: Vec<u8>,
}

impl JpegFile {
    pub fn parse(bytes: &[u8]) -> Result<Self, MetadataError> {
        if bytes.len() < 4 || bytes[0] != 0xFF || bytes[1] != SOI {
            return Err(MetadataError::NotJpeg);
        }

        let mut segments = Vec::new();
        let mut pos = 2;

        loop {
            if pos >= bytes.len() {
                return Err(MetadataError::Malformed(
                    "unexpected end of file before image data".into(),
                ));
            }
            if bytes[pos] != 0xFF {
                return Err(MetadataError::Malformed(format!(
                    "expected marker at offset {}",
                    pos
                )));
            }
            // 跳过填充字节
            while pos < bytes.len() && bytes[pos] == 0xFF {
                pos += 1;
            }
            let Some(&marker) = bytes.get(pos) else {
                return Err(MetadataError::Malformed("truncated marker".into()));
            };
            pos += 1;

            if marker == SOS || marker == EOI {
                let mut tail = vec![0xFF, marker];
                tail.extend_from_slice(&bytes[pos..]);
                return Ok(Self { segments, tail });
            }

            if is_standalone(marker) {
                segments.push(Segment::new(marker, Vec::new()));
                continue;
            }

            if pos + 2 > bytes.len() {
                return Err(MetadataError::Malformed("truncated segment length".into()));
            }
            let length = u16::from_be_bytes([bytes[pos], bytes[pos + 1]]) as usize;
            if length < 2 || pos + length > bytes.len() {
                return Err(MetadataError::Malformed(format!(
                    "segment 0x{:02X} has invalid length {}",
                    marker, length
                )));
            }
            segments.push(Segment::new(marker, bytes[pos + 2..pos + length].to_vec()));
            pos += length;
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, MetadataError> {
        let header_len: usize = self.segments.iter().map(|s| s.data.len() + 4).sum();
        let mut out = Vec::with_capacity(2 + header_len + self.tail.len());
        out.extend_from_slice(&[0xFF, SOI]);

        for segment in &self.segments {
            out.extend_from_slice(&[0xFF, segment.marker]);
            if is_standalone(segment.marker) {
                continue;
            }
            let length = u16::try_from(segment.data.len() + 2)
                .map_err(|_| MetadataError::TooLarge(segment.data.len()))?;
            out.extend_from_slice(&length.to_be_bytes());
            out.extend_from_slice(&segment.data);
        }

        out.extend_from_slice(&self.tail);
        Ok(out)
    }

    /// 新 APP 段的插入位置：紧跟在开头连续的 APPn 段之后
    pub fn app_insert_index(&self) -> usize {
        self.segments
            .iter()
            .position(|s| !s.is_app())
            .unwrap_or(self.segments.len())
    }
}
