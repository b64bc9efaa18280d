//! IPTC 元数据读写模块
//!
//! 关键词 (2:25) 和说明 (2:120) 存放在 JPEG 的 APP13 段中。
//! 写入时保留其他 IIM 数据集和 Photoshop 资源块，
//! 并通过临时文件 + rename 保证原文件要么不变，要么完整更新。

pub mod iim;
pub mod jpeg;

use std::fs;
use std::io::Write;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

use iim::{
    DataSet, ImageResource, DATASET_CAPTION, DATASET_CHARSET, DATASET_KEYWORDS,
    DATASET_RECORD_VERSION, PHOTOSHOP_HEADER, RECORD_APPLICATION, RECORD_ENVELOPE, UTF8_CHARSET,
};
use jpeg::{JpegFile, Segment, APP13};

/// IIM 记录版本 4
const RECORD_VERSION: [u8; 2] = [0x00, 0x04];

/// 单个 APP13 段能容纳的最大内容
const MAX_SEGMENT_PAYLOAD: usize = 65_533;

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("not a JPEG file")]
    NotJpeg,
    #[error("malformed JPEG metadata: {0}")]
    Malformed(String),
    #[error("IPTC block of {0} bytes does not fit into one APP13 segment")]
    TooLarge(usize),
    #[error("file is read-only")]
    ReadOnly,
}

/// 图片已有的 IPTC 标注
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IptcMetadata {
    pub keywords: Vec<String>,
    pub caption: Option<String>,
}

impl IptcMetadata {
    /// 关键词和说明是否都已存在
    pub fn is_annotated(&self) -> bool {
        !self.keywords.is_empty()
            && self
                .caption
                .as_deref()
                .is_some_and(|c| !c.trim().is_empty())
    }
}

/// 判断是否为 Photoshop APP13 段
fn is_photoshop_segment(segment: &Segment) -> bool {
    segment.marker == APP13 && segment.data.starts_with(PHOTOSHOP_HEADER)
}

/// 取出所有 Photoshop 资源块（可能跨多个 APP13 段）
fn photoshop_resources(jpeg: &JpegFile) -> Result<Vec<ImageResource>, MetadataError> {
    let payload: Vec<u8> = jpeg
        .segments
        .iter()
        .filter(|s| is_photoshop_segment(s))
        .flat_map(|s| s.data[PHOTOSHOP_HEADER.len()..].iter().copied())
        .collect();
    iim::parse_resources(&payload)
}

fn iptc_datasets(resources: &[ImageResource]) -> Result<Vec<DataSet>, MetadataError> {
    match resources.iter().find(|r| r.is_iptc()) {
        Some(resource) => iim::parse_datasets(&resource.data),
        None => Ok(Vec::new()),
    }
}

/// 从 JPEG 字节中读取 IPTC 标注
pub fn decode(bytes: &[u8]) -> Result<IptcMetadata, MetadataError> {
    let jpeg = JpegFile::parse(bytes)?;
    let datasets = iptc_datasets(&photoshop_resources(&jpeg)?)?;

    let keywords = datasets
        .iter()
        .filter(|d| d.is(RECORD_APPLICATION, DATASET_KEYWORDS))
        .map(|d| iim::decode_text(&d.data))
        .filter(|k| !k.trim().is_empty())
        .collect();
    let caption = datasets
        .iter()
        .find(|d| d.is(RECORD_APPLICATION, DATASET_CAPTION))
        .map(|d| iim::decode_text(&d.data));

    Ok(IptcMetadata { keywords, caption })
}

/// 生成写入关键词和说明后的 JPEG 字节
pub fn encode(bytes: &[u8], keywords: &[String], caption: &str) -> Result<Vec<u8>, MetadataError> {
    let mut jpeg = JpegFile::parse(bytes)?;
    let mut resources = photoshop_resources(&jpeg)?;

    // 保留与标注无关的数据集
    let mut datasets: Vec<DataSet> = iptc_datasets(&resources)?
        .into_iter()
        .filter(|d| {
            !d.is(RECORD_ENVELOPE, DATASET_CHARSET)
                && !d.is(RECORD_APPLICATION, DATASET_RECORD_VERSION)
                && !d.is(RECORD_APPLICATION, DATASET_KEYWORDS)
                && !d.is(RECORD_APPLICATION, DATASET_CAPTION)
        })
        .collect();
    datasets.push(DataSet::new(RECORD_ENVELOPE, DATASET_CHARSET, UTF8_CHARSET));
    datasets.push(DataSet::new(
        RECORD_APPLICATION,
        DATASET_RECORD_VERSION,
        RECORD_VERSION.to_vec(),
    ));
    for keyword in keywords {
        datasets.push(DataSet::new(
            RECORD_APPLICATION,
            DATASET_KEYWORDS,
            keyword.as_bytes(),
        ));
    }
    datasets.push(DataSet::new(
        RECORD_APPLICATION,
        DATASET_CAPTION,
        caption.as_bytes(),
    ));
    // 按记录号排序，版本号数据集排在各记录最前面
    datasets.sort_by_key(|d| (d.record, d.dataset != 0));

    let iptc = ImageResource::iptc(iim::encode_datasets(&datasets));
    match resources.iter_mut().find(|r| r.is_iptc()) {
        Some(existing) => *existing = iptc,
        None => resources.push(iptc),
    }

    let mut payload = PHOTOSHOP_HEADER.to_vec();
    payload.extend_from_slice(&iim::encode_resources(&resources));
    if payload.len() > MAX_SEGMENT_PAYLOAD {
        return Err(MetadataError::TooLarge(payload.len()));
    }

    let position = jpeg
        .segments
        .iter()
        .position(is_photoshop_segment)
        .unwrap_or_else(|| jpeg.app_insert_index());
    jpeg.segments.retain(|s| !is_photoshop_segment(s));
    jpeg.segments
        .insert(position.min(jpeg.segments.len()), Segment::new(APP13, payload));

    jpeg.encode()
}

/// 读取图片的 IPTC 标注
pub fn read_iptc(path: &Path) -> Result<IptcMetadata, MetadataError> {
    let bytes = fs::read(path)?;
    decode(&bytes)
}

/// 写入关键词和说明
///
/// 新内容先写入同目录下的临时文件，成功后再替换原文件。
/// 符号链接会先解析，替换的是链接指向的文件，链接本身保持不变。
pub fn write_iptc(path: &Path, keywords: &[String], caption: &str) -> Result<(), MetadataError> {
    let target = fs::canonicalize(path)?;
    let permissions = fs::metadata(&target)?.permissions();
    if permissions.readonly() {
        return Err(MetadataError::ReadOnly);
    }

    let bytes = fs::read(&target)?;
    let updated = encode(&bytes, keywords, caption)?;

    let dir = target
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(&updated)?;
    tmp.as_file().sync_all()?;
    fs::set_permissions(tmp.path(), permissions)?;
    tmp.persist(&target).map_err(|e| MetadataError::Io(e.error))?;

    debug!(
        "Wrote IPTC block to {} ({} -> {} bytes)",
        path.display(),
        bytes.len(),
        updated.len()
    );
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};
    use std::path::PathBuf;

    /// 生成一张小的测试 JPEG
    pub(crate) fn sample_jpeg(width: u32, height: u32) -> Vec<u8> {
        let img = ImageBuffer::from_fn(width, height, |x, y| {
            Rgb([(x * 8) as u8, (y * 8) as u8, 128u8])
        });
        let mut buffer = std::io::Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut buffer, image::ImageFormat::Jpeg)
            .unwrap();
        buffer.into_inner()
    }

    pub(crate) fn write_sample(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, sample_jpeg(16, 16)).unwrap();
        path
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_plain_jpeg_has_no_annotation() {
        let meta = decode(&sample_jpeg(8, 8)).unwrap();
        assert!(meta.keywords.is_empty());
        assert!(meta.caption.is_none());
        assert!(!meta.is_annotated());
    }

    #[test]
    fn test_write_then_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_sample(dir.path(), "a.jpg");
        let keywords = strings(&["beach", "sunset", "ocean", "sand", "sky"]);

        write_iptc(&path, &keywords, "A quiet beach at sunset.").unwrap();
        let meta = read_iptc(&path).unwrap();

        let mut read = meta.keywords.clone();
        read.sort();
        let mut expected = keywords.clone();
        expected.sort();
        assert_eq!(read, expected);
        assert_eq!(meta.caption.as_deref(), Some("A quiet beach at sunset."));
        assert!(meta.is_annotated());

        // 写入后仍然是可解码的图片
        assert!(image::open(&path).is_ok());
    }

    #[test]
    fn test_rewrite_replaces_previous_annotation() {
        let bytes = sample_jpeg(8, 8);
        let first = encode(&bytes, &strings(&["a", "b", "c", "d", "e"]), "first").unwrap();
        let second = encode(&first, &strings(&["f", "g", "h", "i", "j"]), "second").unwrap();

        let meta = decode(&second).unwrap();
        assert_eq!(meta.keywords, strings(&["f", "g", "h", "i", "j"]));
        assert_eq!(meta.caption.as_deref(), Some("second"));

        let jpeg = JpegFile::parse(&second).unwrap();
        assert_eq!(
            jpeg.segments.iter().filter(|s| is_photoshop_segment(s)).count(),
            1
        );
    }

    #[test]
    fn test_unicode_caption() {
        let bytes = sample_jpeg(8, 8);
        let updated = encode(&bytes, &strings(&["café"]), "Ein Hund im Schnee, München").unwrap();
        let meta = decode(&updated).unwrap();
        assert_eq!(meta.keywords, strings(&["café"]));
        assert_eq!(meta.caption.as_deref(), Some("Ein Hund im Schnee, München"));
    }

    #[test]
    fn test_preserves_other_resources_and_datasets() {
        let bytes = sample_jpeg(8, 8);
        let mut jpeg = JpegFile::parse(&bytes).unwrap();

        let datasets = vec![
            DataSet::new(RECORD_APPLICATION, 80, b"Jane Doe".to_vec()),
            DataSet::new(RECORD_APPLICATION, DATASET_KEYWORDS, b"old".to_vec()),
        ];
        let resources = vec![
            ImageResource {
                signature: *b"8BIM",
                id: 0x03ED,
                name: Vec::new(),
                data: vec![0, 72, 0, 1],
            },
            ImageResource::iptc(iim::encode_datasets(&datasets)),
        ];
        let mut payload = PHOTOSHOP_HEADER.to_vec();
        payload.extend_from_slice(&iim::encode_resources(&resources));
        let index = jpeg.app_insert_index();
        jpeg.segments.insert(index, Segment::new(APP13, payload));
        let original = jpeg.encode().unwrap();

        let updated = encode(&original, &strings(&["new"]), "caption").unwrap();
        let jpeg = JpegFile::parse(&updated).unwrap();
        let resources = photoshop_resources(&jpeg).unwrap();
        assert!(resources.iter().any(|r| r.id == 0x03ED && r.data == vec![0, 72, 0, 1]));

        let datasets = iptc_datasets(&resources).unwrap();
        assert!(datasets
            .iter()
            .any(|d| d.is(RECORD_APPLICATION, 80) && d.data == b"Jane Doe"));
        assert!(datasets[0].is(RECORD_ENVELOPE, DATASET_CHARSET));
        assert_eq!(decode(&updated).unwrap().keywords, strings(&["new"]));
    }

    #[test]
    fn test_too_large_block_leaves_file_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_sample(dir.path(), "big.jpg");
        let before = fs::read(&path).unwrap();

        let caption = "x".repeat(70_000);
        let err = write_iptc(&path, &strings(&["a"]), &caption).unwrap_err();
        assert!(matches!(err, MetadataError::TooLarge(_)));
        assert_eq!(fs::read(&path).unwrap(), before);
    }

    #[test]
    fn test_read_only_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_sample(dir.path(), "ro.jpg");
        let mut perms = fs::metadata(&path).unwrap().permissions();
        perms.set_readonly(true);
        fs::set_permissions(&path, perms).unwrap();

        let err = write_iptc(&path, &strings(&["a"]), "b").unwrap_err();
        assert!(matches!(err, MetadataError::ReadOnly));
        assert!(!read_iptc(&path).unwrap().is_annotated());
    }

    #[cfg(unix)]
    #[test]
    fn test_write_through_symlink_keeps_link() {
        let dir = tempfile::tempdir().unwrap();
        let real = write_sample(dir.path(), "store/real.jpg");
        let link = dir.path().join("link.jpg");
        std::os::unix::fs::symlink(&real, &link).unwrap();

        write_iptc(&link, &strings(&["a", "b", "c", "d", "e"]), "linked").unwrap();

        assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
        assert_eq!(read_iptc(&real).unwrap().caption.as_deref(), Some("linked"));
    }

    #[test]
    fn test_non_jpeg_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fake.jpg");
        fs::write(&path, b"not really a jpeg").unwrap();
        assert!(matches!(read_iptc(&path), Err(MetadataError::NotJpeg)));
    }
}
