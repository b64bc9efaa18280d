//! 递归查找 JPEG 文件

use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{AnnotateError, Result};

/// 按扩展名判断是否为 JPEG（不区分大小写）
pub fn is_jpeg(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("jpg") || e.eq_ignore_ascii_case("jpeg"))
        .unwrap_or(false)
}

/// 惰性遍历根目录下的所有 JPEG 文件
///
/// 根目录不存在或不是目录时返回致命错误；遍历中无法读取的条目只记录警告。
/// 指向文件的符号链接会被返回，指向目录的符号链接不会展开。
pub fn scan_jpegs(root: &Path) -> Result<impl Iterator<Item = PathBuf>> {
    if !root.is_dir() {
        return Err(AnnotateError::InvalidRoot(root.to_path_buf()));
    }

    let files = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Cannot read directory entry: {}", e);
                None
            }
        })
        .filter(|entry| {
            // 不进入链接的目录，但指向文件的链接照常处理
            entry.file_type().is_file() || (entry.path_is_symlink() && entry.path().is_file())
        })
        .filter_map(|entry| {
            let path = entry.into_path();
            if is_jpeg(&path) {
                Some(path)
            } else {
                debug!("Skipping non-JPEG: {}", path.display());
                None
            }
        });

    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_is_jpeg() {
        assert!(is_jpeg(Path::new("a.jpg")));
        assert!(is_jpeg(Path::new("dir/B.JPEG")));
        assert!(!is_jpeg(Path::new("c.png")));
        assert!(!is_jpeg(Path::new("jpg")));
    }

    #[test]
    fn test_non_jpeg_directory_yields_nothing() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("notes.txt"), "hello").unwrap();
        fs::write(dir.path().join("photo.png"), [0u8; 4]).unwrap();
        fs::create_dir(dir.path().join("raw")).unwrap();
        fs::write(dir.path().join("raw/img.cr2"), [0u8; 4]).unwrap();

        assert_eq!(scan_jpegs(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_finds_nested_jpegs() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("2024/summer")).unwrap();
        fs::write(dir.path().join("a.jpg"), [0u8; 4]).unwrap();
        fs::write(dir.path().join("2024/summer/b.JPEG"), [0u8; 4]).unwrap();
        fs::write(dir.path().join("2024/readme.md"), "x").unwrap();
        // 以 .jpg 结尾的目录不算
        fs::create_dir(dir.path().join("folder.jpg")).unwrap();

        let found: Vec<PathBuf> = scan_jpegs(dir.path()).unwrap().collect();
        assert_eq!(found.len(), 2);
        assert!(found.contains(&dir.path().join("a.jpg")));
        assert!(found.contains(&dir.path().join("2024/summer/b.JPEG")));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_files_are_found_but_linked_dirs_are_not_walked() {
        use std::os::unix::fs::symlink;

        let dir = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        fs::write(outside.path().join("real.jpg"), [0u8; 4]).unwrap();
        fs::create_dir(outside.path().join("album")).unwrap();
        fs::write(outside.path().join("album/inner.jpg"), [0u8; 4]).unwrap();

        symlink(outside.path().join("real.jpg"), dir.path().join("link.jpg")).unwrap();
        symlink(outside.path().join("album"), dir.path().join("album")).unwrap();
        symlink(outside.path().join("gone.jpg"), dir.path().join("dangling.jpg")).unwrap();

        let found: Vec<PathBuf> = scan_jpegs(dir.path()).unwrap().collect();
        assert_eq!(found, vec![dir.path().join("link.jpg")]);
    }

    #[test]
    fn test_missing_root_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let err = scan_jpegs(&dir.path().join("missing")).err().unwrap();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_file_root_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.jpg");
        fs::write(&file, [0u8; 4]).unwrap();
        assert!(matches!(
            scan_jpegs(&file),
            Err(AnnotateError::InvalidRoot(_))
        ));
    }
}
