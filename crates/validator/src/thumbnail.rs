//! Thumbnail checks.

use image::{GenericImageView, ImageFormat};

use playgate_core::types::{ValidationIssue, MIB};

/// Largest accepted thumbnail payload.
pub const MAX_THUMBNAIL_BYTES: u64 = MIB;
/// Smallest accepted side length in pixels.
pub const MIN_THUMBNAIL_SIDE: u32 = 64;
/// Largest accepted side length in pixels.
pub const MAX_THUMBNAIL_SIDE: u32 = 2048;

const ACCEPTED_FORMATS: [ImageFormat; 4] = [
    ImageFormat::Png,
    ImageFormat::Jpeg,
    ImageFormat::Gif,
    ImageFormat::WebP,
];

/// Information about a decoded thumbnail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThumbnailInfo {
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
}

/// Validate thumbnail bytes.
///
/// The payload must be a PNG, JPEG, GIF or WebP image of at most 1 MiB with
/// both sides in `64..=2048` pixels.
pub fn check_thumbnail(data: &[u8]) -> Result<ThumbnailInfo, ValidationIssue> {
    if data.is_empty() {
        return Err(ValidationIssue::InvalidThumbnail(
            "thumbnail is empty".to_string(),
        ));
    }
    if data.len() as u64 > MAX_THUMBNAIL_BYTES {
        return Err(ValidationIssue::InvalidThumbnail(format!(
            "thumbnail is {} bytes, limit is {} bytes",
            data.len(),
            MAX_THUMBNAIL_BYTES
        )));
    }

    let format = image::guess_format(data).map_err(|_| {
        ValidationIssue::InvalidThumbnail("thumbnail format is not recognized".to_string())
    })?;
    if !ACCEPTED_FORMATS.contains(&format) {
        return Err(ValidationIssue::InvalidThumbnail(format!(
            "thumbnail format {:?} is not accepted (png, jpeg, gif, webp)",
            format
        )));
    }

    let img = image::load_from_memory_with_format(data, format)
        .map_err(|e| ValidationIssue::InvalidThumbnail(format!("thumbnail does not decode: {}", e)))?;
    let (width, height) = img.dimensions();

    let side_ok = |side: u32| (MIN_THUMBNAIL_SIDE..=MAX_THUMBNAIL_SIDE).contains(&side);
    if !side_ok(width) || !side_ok(height) {
        return Err(ValidationIssue::InvalidThumbnail(format!(
            "thumbnail is {}x{}, each side must be between {} and {} pixels",
            width, height, MIN_THUMBNAIL_SIDE, MAX_THUMBNAIL_SIDE
        )));
    }

    Ok(ThumbnailInfo {
        width,
        height,
        format,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbImage::new(width, height);
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn test_accepts_square_png() {
        let info = check_thumbnail(&png(128, 128)).unwrap();
        assert_eq!((info.width, info.height), (128, 128));
        assert_eq!(info.format, ImageFormat::Png);
    }

    #[test]
    fn test_side_bounds_are_inclusive() {
        assert!(check_thumbnail(&png(64, 2048)).is_ok());
        assert!(check_thumbnail(&png(63, 100)).is_err());
        assert!(check_thumbnail(&png(100, 2049)).is_err());
    }

    #[test]
    fn test_rejects_garbage_and_empty() {
        assert!(matches!(
            check_thumbnail(b"not an image at all"),
            Err(ValidationIssue::InvalidThumbnail(_))
        ));
        assert!(check_thumbnail(&[]).is_err());
    }

    #[test]
    fn test_rejects_oversized_payload() {
        let data = vec![0u8; MAX_THUMBNAIL_BYTES as usize + 1];
        let err = check_thumbnail(&data).unwrap_err();
        assert!(err.detail().contains("limit"));
    }
}
