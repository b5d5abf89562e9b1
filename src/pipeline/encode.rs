//! Image encoding: rendered page file → base64 PNG wrapped in `ImageData`.
//!
//! Vision APIs accept images as base64 data-URIs embedded in the JSON
//! request body. Pages are re-encoded as PNG whatever format the source
//! wrote, so text edges stay lossless.

use crate::error::PageError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::DynamicImage;
use std::io::Cursor;
use std::path::Path;
use tracing::debug;

/// Encode an in-memory page image as a base64 PNG for a vision request.
///
/// `detail: "high"` lets GPT-4-class models tile the full image, which
/// small part numbers in dense tables need.
pub fn encode_page(img: &DynamicImage) -> Result<ImageData, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;

    let b64 = STANDARD.encode(&buf);
    debug!("Encoded image → {} bytes base64", b64.len());

    Ok(ImageData::new(b64, "image/png").with_detail("high"))
}

/// Load a rendered page from disk and encode it.
pub fn encode_image_file(path: &Path) -> Result<ImageData, PageError> {
    let img = image::open(path).map_err(|e| PageError::ImageUnreadable {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })?;
    encode_page(&img).map_err(|e| PageError::ImageUnreadable {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn encode_small_image() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 255])));
        let data = encode_page(&img).expect("encode should succeed");
        assert_eq!(data.mime_type, "image/png");
        assert!(!data.data.is_empty());
    }

    #[test]
    fn encode_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page_1.png");
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 255])));
        img.save_with_format(&path, image::ImageFormat::Png).unwrap();

        let data = encode_image_file(&path).expect("file should encode");
        assert_eq!(data.mime_type, "image/png");
    }

    #[test]
    fn missing_file_is_page_error() {
        let err = encode_image_file(Path::new("/nonexistent/page_9.png")).unwrap_err();
        assert!(matches!(err, PageError::ImageUnreadable { .. }));
    }
}
