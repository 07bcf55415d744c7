use crate::media::FileCategory;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{ColorType, DynamicImage, GenericImageView, ImageFormat};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

pub const THUMBNAIL_DIR: &str = ".thumbnails";
pub const JPEG_QUALITY: u8 = 85;

#[derive(Error, Debug)]
pub enum ThumbnailError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

/// Writes downscaled previews under `<dest_root>/.thumbnails`, mirroring the
/// destination tree.
#[derive(Debug, Clone)]
pub struct Thumbnailer {
    dest_root: PathBuf,
    max_dim: u32,
}

impl Thumbnailer {
    pub fn new(dest_root: impl Into<PathBuf>, max_dim: u32) -> Self {
        Self {
            dest_root: dest_root.into(),
            max_dim: max_dim.max(1),
        }
    }

    /// Absolute thumbnail location for a destination file. `.png` keeps its
    /// extension, everything else becomes `.jpg`.
    pub fn thumbnail_path(&self, dest_path: &Path) -> PathBuf {
        let relative = match dest_path.strip_prefix(&self.dest_root) {
            Ok(rel) => rel.to_path_buf(),
            Err(_) => dest_path
                .file_name()
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("thumbnail")),
        };
        let mut thumb = self.dest_root.join(THUMBNAIL_DIR).join(relative);
        if !is_png(&thumb) {
            thumb.set_extension("jpg");
        }
        thumb
    }

    /// Returns the thumbnail path relative to `dest_root` (forward slashes), or
    /// an empty string for non-images and failed generations. `image_source`
    /// holds the bytes to decode; it may differ from `dest_path` when the
    /// destination copy has not been written yet.
    pub fn ensure_thumbnail(&self, dest_path: &Path, image_source: &Path) -> String {
        if FileCategory::from_path(dest_path) != FileCategory::Image {
            return String::new();
        }

        let thumb_path = self.thumbnail_path(dest_path);
        if thumb_path.exists() {
            debug!("Thumbnail exists, skipping: {}", thumb_path.display());
            return self.relative(&thumb_path);
        }

        match generate_thumbnail(image_source, &thumb_path, self.max_dim) {
            Ok(()) => {
                debug!("Thumbnail written: {}", thumb_path.display());
                self.relative(&thumb_path)
            }
            Err(e) => {
                warn!(
                    "Thumbnail generation failed for {}: {}",
                    image_source.display(),
                    e
                );
                String::new()
            }
        }
    }

    fn relative(&self, thumb_path: &Path) -> String {
        let rel = thumb_path.strip_prefix(&self.dest_root).unwrap_or(thumb_path);
        rel.components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("/")
    }
}

fn is_png(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("png"))
        .unwrap_or(false)
}

/// Scales `(width, height)` so the longer side equals `max_dim`.
pub fn fit_within(width: u32, height: u32, max_dim: u32) -> (u32, u32) {
    let (w, h, max) = (width.max(1) as u64, height.max(1) as u64, max_dim as u64);
    if w > h {
        (max_dim, ((h * max) / w).max(1) as u32)
    } else {
        (((w * max) / h).max(1) as u32, max_dim)
    }
}

pub fn generate_thumbnail(
    src_path: &Path,
    thumb_path: &Path,
    max_dim: u32,
) -> Result<(), ThumbnailError> {
    let img = image::open(src_path)?;
    let (width, height) = img.dimensions();
    let (thumb_w, thumb_h) = fit_within(width, height, max_dim);
    let resized = DynamicImage::ImageRgba8(imageops::resize(
        &img,
        thumb_w,
        thumb_h,
        FilterType::Lanczos3,
    ));

    if let Some(parent) = thumb_path.parent() {
        fs::create_dir_all(parent)?;
    }

    write_atomically(thumb_path, |part| {
        if is_png(thumb_path) {
            resized.save_with_format(part, ImageFormat::Png)?;
        } else {
            let rgb = resized.to_rgb8();
            let mut writer = BufWriter::new(File::create(part)?);
            JpegEncoder::new_with_quality(&mut writer, JPEG_QUALITY).encode(
                rgb.as_raw(),
                rgb.width(),
                rgb.height(),
                ColorType::Rgb8,
            )?;
            writer.flush()?;
        }
        Ok(())
    })
}

/// Runs `write` against a `.part` sibling and renames it over `path` on
/// success. A failed write leaves nothing at either path.
fn write_atomically<F>(path: &Path, write: F) -> Result<(), ThumbnailError>
where
    F: FnOnce(&Path) -> Result<(), ThumbnailError>,
{
    let mut part = path.as_os_str().to_owned();
    part.push(".part");
    let part = PathBuf::from(part);

    let written = write(&part).and_then(|()| Ok(fs::rename(&part, path)?));
    if written.is_err() {
        let _ = fs::remove_file(&part);
    }
    written
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage, Rgba, RgbaImage};
    use tempfile::tempdir;

    #[test]
    fn test_fit_within_keeps_aspect_ratio() {
        assert_eq!(fit_within(4000, 3000, 200), (200, 150));
        assert_eq!(fit_within(3000, 4000, 200), (150, 200));
        assert_eq!(fit_within(500, 500, 200), (200, 200));
        assert_eq!(fit_within(10000, 10, 200), (200, 1));
    }

    #[test]
    fn test_thumbnail_path_mirrors_dest_tree() {
        let thumbs = Thumbnailer::new("/dest", 200);
        assert_eq!(
            thumbs.thumbnail_path(Path::new("/dest/2023/June/IMG_1.jpeg")),
            PathBuf::from("/dest/.thumbnails/2023/June/IMG_1.jpg")
        );
        assert_eq!(
            thumbs.thumbnail_path(Path::new("/dest/2023/June/logo.png")),
            PathBuf::from("/dest/.thumbnails/2023/June/logo.png")
        );
        assert_eq!(
            thumbs.thumbnail_path(Path::new("/dest/2023/June/scan.TIFF")),
            PathBuf::from("/dest/.thumbnails/2023/June/scan.jpg")
        );
    }

    #[test]
    fn test_generates_jpeg_thumbnail() {
        let tmp = tempdir().unwrap();
        let src = tmp.path().join("src.jpg");
        RgbImage::from_pixel(400, 300, Rgb([200, 10, 10])).save(&src).unwrap();

        let dest_root = tmp.path().join("dest");
        let dest_path = dest_root.join("2024").join("March").join("src.jpg");
        let thumbs = Thumbnailer::new(&dest_root, 200);

        let rel = thumbs.ensure_thumbnail(&dest_path, &src);
        assert_eq!(rel, ".thumbnails/2024/March/src.jpg");

        let thumb = image::open(dest_root.join(&rel)).unwrap();
        assert_eq!(thumb.dimensions(), (200, 150));
    }

    #[test]
    fn test_png_thumbnail_keeps_transparency_format() {
        let tmp = tempdir().unwrap();
        let src = tmp.path().join("icon.png");
        RgbaImage::from_pixel(100, 250, Rgba([0, 0, 0, 0])).save(&src).unwrap();

        let dest_root = tmp.path().join("dest");
        let thumbs = Thumbnailer::new(&dest_root, 200);
        let rel = thumbs.ensure_thumbnail(&dest_root.join("2024/May/icon.png"), &src);
        assert_eq!(rel, ".thumbnails/2024/May/icon.png");

        let thumb = image::open(dest_root.join(&rel)).unwrap();
        assert_eq!(thumb.dimensions(), (80, 200));
        assert_eq!(thumb.to_rgba8().get_pixel(0, 0)[3], 0);
    }

    #[test]
    fn test_existing_thumbnail_is_not_regenerated() {
        let tmp = tempdir().unwrap();
        let src = tmp.path().join("a.jpg");
        RgbImage::from_pixel(64, 64, Rgb([1, 2, 3])).save(&src).unwrap();

        let dest_root = tmp.path().join("dest");
        let dest_path = dest_root.join("2020/January/a.jpg");
        let thumbs = Thumbnailer::new(&dest_root, 200);

        let first = thumbs.ensure_thumbnail(&dest_path, &src);
        let written = fs::read(dest_root.join(&first)).unwrap();

        // With the source gone, only the existence check can succeed.
        fs::remove_file(&src).unwrap();
        let second = thumbs.ensure_thumbnail(&dest_path, &src);
        assert_eq!(first, second);
        assert_eq!(fs::read(dest_root.join(&second)).unwrap(), written);
    }

    #[test]
    fn test_corrupt_image_degrades_to_empty_path() {
        let tmp = tempdir().unwrap();
        let src = tmp.path().join("bad.jpg");
        fs::write(&src, b"garbage").unwrap();

        let dest_root = tmp.path().join("dest");
        let thumbs = Thumbnailer::new(&dest_root, 200);
        assert_eq!(thumbs.ensure_thumbnail(&dest_root.join("2020/May/bad.jpg"), &src), "");
    }

    #[test]
    fn test_failed_write_leaves_nothing_behind() {
        let tmp = tempdir().unwrap();
        let thumb = tmp.path().join("a.jpg");

        let result = write_atomically(&thumb, |part| {
            fs::write(part, b"\xff\xd8 truncated")?;
            Err(std::io::Error::new(std::io::ErrorKind::Other, "disk full").into())
        });
        assert!(result.is_err());
        assert!(!thumb.exists());
        assert_eq!(fs::read_dir(tmp.path()).unwrap().count(), 0);

        write_atomically(&thumb, |part| Ok(fs::write(part, b"done")?)).unwrap();
        assert_eq!(fs::read(&thumb).unwrap(), b"done");
        assert_eq!(fs::read_dir(tmp.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_non_image_is_skipped() {
        let thumbs = Thumbnailer::new("/dest", 200);
        assert_eq!(
            thumbs.ensure_thumbnail(Path::new("/dest/2020/May/clip.mp4"), Path::new("/src/clip.mp4")),
            ""
        );
    }
}
