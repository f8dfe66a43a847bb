use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "tiff", "tif", "bmp"];
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "avi", "mkv", "webm", "m4v", "3gp"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaKind {
    Image(ImageFormat),
    Video,
}

/// Container format of an image, which decides what the EXIF backend can do with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ImageFormat {
    Jpeg,
    Png,
    Tiff,
    Bmp,
}

impl ImageFormat {
    /// BMP has no place to put an EXIF block.
    pub fn carries_exif(self) -> bool {
        !matches!(self, ImageFormat::Bmp)
    }
}

impl MediaKind {
    /// Classify by extension (case-insensitive). `None` for anything outside the supported set.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        let kind = match ext.as_str() {
            "jpg" | "jpeg" => MediaKind::Image(ImageFormat::Jpeg),
            "png" => MediaKind::Image(ImageFormat::Png),
            "tiff" | "tif" => MediaKind::Image(ImageFormat::Tiff),
            "bmp" => MediaKind::Image(ImageFormat::Bmp),
            e if VIDEO_EXTENSIONS.contains(&e) => MediaKind::Video,
            _ => return None,
        };
        Some(kind)
    }

    pub fn is_image(self) -> bool {
        matches!(self, MediaKind::Image(_))
    }

    pub fn is_video(self) -> bool {
        matches!(self, MediaKind::Video)
    }
}

/// Recursively collect supported media files under `root`.
/// The result is sorted and free of duplicates, so no two workers ever see the same file.
pub fn find_media_files(root: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = Vec::new();
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                log::warn!("Skipping unreadable entry: {}", e);
                continue;
            }
        };
        if entry.file_type().is_file() && MediaKind::from_path(entry.path()).is_some() {
            files.push(entry.into_path());
        }
    }
    files.sort();
    files.dedup();
    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_classify_extensions() {
        assert_eq!(
            MediaKind::from_path(Path::new("a/IMG_0001.JPG")),
            Some(MediaKind::Image(ImageFormat::Jpeg))
        );
        assert_eq!(
            MediaKind::from_path(Path::new("scan.tif")),
            Some(MediaKind::Image(ImageFormat::Tiff))
        );
        assert_eq!(MediaKind::from_path(Path::new("clip.3gp")), Some(MediaKind::Video));
        assert_eq!(MediaKind::from_path(Path::new("clip.MOV")), Some(MediaKind::Video));
        assert_eq!(MediaKind::from_path(Path::new("IMG_0001.jpg.json")), None);
        assert_eq!(MediaKind::from_path(Path::new("photo.heic")), None);
        assert_eq!(MediaKind::from_path(Path::new("README")), None);
    }

    #[test]
    fn test_find_media_files_recurses_and_filters() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("Photos from 2019");
        fs::create_dir_all(&nested).unwrap();
        fs::write(dir.path().join("a.jpg"), b"x").unwrap();
        fs::write(dir.path().join("a.jpg.json"), b"{}").unwrap();
        fs::write(nested.join("b.mp4"), b"x").unwrap();
        fs::write(nested.join("notes.txt"), b"x").unwrap();
        fs::create_dir_all(nested.join("folder.png")).unwrap();

        let files = find_media_files(dir.path());
        // Path ordering is per component: "Photos from 2019" sorts before "a.jpg".
        assert_eq!(files, vec![nested.join("b.mp4"), dir.path().join("a.jpg")]);
    }
}
