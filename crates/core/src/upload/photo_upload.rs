use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::shared::constants::IMAGE_EXTENSIONS;

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("unsupported photo format: {0}")]
    Unsupported(PathBuf),
    #[error("failed to decode {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("photo decoding was interrupted")]
    Interrupted,
}

/// A decoded photo, ready to be displayed in place of the camera view.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadPreview {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
}

pub fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Decodes the whole image to make sure it can be displayed.
pub fn decode_photo(path: &Path) -> Result<UploadPreview, UploadError> {
    if !is_supported(path) {
        return Err(UploadError::Unsupported(path.to_path_buf()));
    }
    let image = image::open(path).map_err(|source| UploadError::Decode {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(UploadPreview {
        path: path.to_path_buf(),
        width: image.width(),
        height: image.height(),
    })
}

/// [`decode_photo`] on the blocking pool.
pub async fn decode_photo_async(path: PathBuf) -> Result<UploadPreview, UploadError> {
    tokio::task::spawn_blocking(move || decode_photo(&path))
        .await
        .map_err(|_| UploadError::Interrupted)?
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn write_png(dir: &Path, name: &str, width: u32, height: u32) -> PathBuf {
        let path = dir.join(name);
        image::RgbImage::new(width, height).save(&path).unwrap();
        path
    }

    #[rstest]
    #[case("face.jpg", true)]
    #[case("face.PNG", true)]
    #[case("face.webp", true)]
    #[case("face.gif", false)]
    #[case("face", false)]
    fn test_is_supported(#[case] name: &str, #[case] expected: bool) {
        assert_eq!(is_supported(Path::new(name)), expected);
    }

    #[test]
    fn test_decode_reports_dimensions() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_png(dir.path(), "me.png", 30, 40);

        let preview = decode_photo(&path).unwrap();

        assert_eq!((preview.width, preview.height), (30, 40));
        assert_eq!(preview.path, path);
    }

    #[test]
    fn test_decode_rejects_unsupported_extension() {
        let result = decode_photo(Path::new("notes.txt"));
        assert!(matches!(result, Err(UploadError::Unsupported(_))));
    }

    #[test]
    fn test_decode_rejects_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.png");
        std::fs::write(&path, b"not a png").unwrap();

        let result = decode_photo(&path);

        assert!(matches!(result, Err(UploadError::Decode { .. })));
    }

    #[tokio::test]
    async fn test_decode_async() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_png(dir.path(), "me.png", 8, 8);

        let preview = decode_photo_async(path).await.unwrap();

        assert_eq!(preview.width, 8);
    }
}
