use serde::Serialize;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "tif", "tiff", "heic", "heif", "nef", "cr2", "cr3", "arw", "png", "gif", "bmp",
    "webp",
];

const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "m4v", "avi", "mkv", "hevc"];

/// Coarse media kind derived from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileCategory {
    Image,
    Video,
    Other,
}

impl FileCategory {
    pub fn from_path(path: &Path) -> Self {
        let ext = match path.extension().and_then(|e| e.to_str()) {
            Some(ext) => ext.to_ascii_lowercase(),
            None => return FileCategory::Other,
        };
        if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            FileCategory::Image
        } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
            FileCategory::Video
        } else {
            FileCategory::Other
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileCategory::Image => "image",
            FileCategory::Video => "video",
            FileCategory::Other => "other",
        }
    }
}

impl fmt::Display for FileCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileCategory {
    type Err = std::convert::Infallible;

    /// Unknown strings map to `Other` so old rows never fail to load.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "image" => FileCategory::Image,
            "video" => FileCategory::Video,
            _ => FileCategory::Other,
        })
    }
}
