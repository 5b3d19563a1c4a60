use std::io::Cursor;

use image::codecs::webp::WebPEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageDecoder, ImageError, ImageReader};

pub const THUMBNAIL_CONTENT_TYPE: &str = "image/webp";

/// Sizing parameters for thumbnail generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThumbnailSpec {
    /// Cap on the longer side, in pixels.
    pub max_dimension: u32,
}

impl Default for ThumbnailSpec {
    fn default() -> Self {
        Self { max_dimension: 600 }
    }
}

/// A generated thumbnail plus the dimensions of the upright original.
#[derive(Debug, Clone)]
pub struct Thumbnail {
    /// WebP-encoded thumbnail.
    pub bytes: Vec<u8>,
    /// Width of the original after applying EXIF orientation.
    pub width: u32,
    /// Height of the original after applying EXIF orientation.
    pub height: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum ThumbnailError {
    #[error("could not decode image: {0}")]
    Decode(#[source] ImageError),
    #[error("could not encode thumbnail: {0}")]
    Encode(#[source] ImageError),
}

/// Decode `bytes`, orient them upright and produce a WebP thumbnail whose
/// longer side is at most `spec.max_dimension`. Never upscales.
pub fn generate_thumbnail(
    bytes: &[u8],
    spec: &ThumbnailSpec,
) -> Result<Thumbnail, ThumbnailError> {
    let image = decode_upright(bytes)?;
    let (width, height) = (image.width(), image.height());

    let (thumb_width, thumb_height) = fit_within(width, height, spec.max_dimension);
    let thumb = if (thumb_width, thumb_height) == (width, height) {
        image
    } else {
        image.resize_exact(thumb_width, thumb_height, FilterType::Lanczos3)
    };

    // The WebP encoder only takes 8-bit (L, LA, RGB, RGBA) buffers.
    let thumb = if thumb.color().has_alpha() {
        DynamicImage::ImageRgba8(thumb.to_rgba8())
    } else {
        DynamicImage::ImageRgb8(thumb.to_rgb8())
    };

    let mut out = Vec::new();
    thumb
        .write_with_encoder(WebPEncoder::new_lossless(&mut out))
        .map_err(ThumbnailError::Encode)?;

    Ok(Thumbnail {
        bytes: out,
        width,
        height,
    })
}

fn decode_upright(bytes: &[u8]) -> Result<DynamicImage, ThumbnailError> {
    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| ThumbnailError::Decode(ImageError::IoError(e)))?;
    let mut decoder = reader.into_decoder().map_err(ThumbnailError::Decode)?;
    let orientation = decoder.orientation().map_err(ThumbnailError::Decode)?;

    let mut image = DynamicImage::from_decoder(decoder).map_err(ThumbnailError::Decode)?;
    image.apply_orientation(orientation);
    Ok(image)
}

/// Scale `(width, height)` so the longer side is at most `max`, keeping the
/// aspect ratio. Sides are rounded and never drop below one pixel.
fn fit_within(width: u32, height: u32, max: u32) -> (u32, u32) {
    let longer = width.max(height);
    if longer <= max || max == 0 {
        return (width, height);
    }
    let scale = |side: u32| {
        let (side, cap, longer) = (u64::from(side), u64::from(max), u64::from(longer));
        let scaled = (side * cap + longer / 2) / longer;
        u32::try_from(scaled).unwrap_or(max).max(1)
    };
    (scale(width), scale(height))
}
