//! `image` crate backed decoder, resizer and encoder.

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::webp::WebPEncoder;
use image::imageops::FilterType;
use tracing::trace;

use crate::domain::entities::TargetSize;
use crate::domain::errors::{CacheError, CacheResult};
use crate::domain::ports::{CompressionFormat, ImageCodec};

/// Codec using the formats compiled into the `image` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageCrateCodec {
    filter: Option<FilterType>,
}

impl ImageCrateCodec {
    /// Creates a codec resizing with Lanczos3.
    #[must_use]
    pub const fn new() -> Self {
        Self { filter: None }
    }

    /// Creates a codec resizing with the given filter.
    #[must_use]
    pub const fn with_filter(filter: FilterType) -> Self {
        Self {
            filter: Some(filter),
        }
    }
}

impl ImageCodec for ImageCrateCodec {
    fn decode(&self, bytes: &[u8], target: Option<TargetSize>) -> CacheResult<image::DynamicImage> {
        let img = image::load_from_memory(bytes)
            .map_err(|e| CacheError::decode(format!("Failed to decode image: {e}")))?;

        match target {
            Some(bounds) if img.width() > bounds.width || img.height() > bounds.height => {
                trace!(
                    from_width = img.width(),
                    from_height = img.height(),
                    to_width = bounds.width,
                    to_height = bounds.height,
                    "Resizing decoded image"
                );
                let filter = self.filter.unwrap_or(FilterType::Lanczos3);
                Ok(img.resize(bounds.width.max(1), bounds.height.max(1), filter))
            }
            _ => Ok(img),
        }
    }

    fn encode(
        &self,
        image: &image::DynamicImage,
        format: CompressionFormat,
        quality: u8,
    ) -> CacheResult<Vec<u8>> {
        let mut buf = Vec::new();
        let result = match format {
            CompressionFormat::Jpeg => {
                let rgb = image::DynamicImage::ImageRgb8(image.to_rgb8());
                rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100)))
            }
            CompressionFormat::Png => image.write_with_encoder(PngEncoder::new(&mut buf)),
            CompressionFormat::Webp => {
                let rgba = image::DynamicImage::ImageRgba8(image.to_rgba8());
                rgba.write_with_encoder(WebPEncoder::new_lossless(&mut buf))
            }
        };
        result.map_err(|e| CacheError::decode(format!("Failed to encode {format}: {e}")))?;
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn sample(width: u32, height: u32) -> image::DynamicImage {
        image::DynamicImage::ImageRgb8(image::RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
        }))
    }

    #[test_case(CompressionFormat::Jpeg ; "jpeg")]
    #[test_case(CompressionFormat::Png ; "png")]
    #[test_case(CompressionFormat::Webp ; "webp")]
    fn test_encoded_output_decodes(format: CompressionFormat) {
        let codec = ImageCrateCodec::new();
        let bytes = codec.encode(&sample(32, 16), format, 70).unwrap();

        let decoded = codec.decode(&bytes, None).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (32, 16));
    }

    #[test_case(400, 200, TargetSize::new(100, 100), (100, 50) ; "wide_fits_width")]
    #[test_case(200, 400, TargetSize::new(100, 100), (50, 100) ; "tall_fits_height")]
    #[test_case(50, 40, TargetSize::new(100, 100), (50, 40) ; "small_is_untouched")]
    fn test_decode_fits_target(width: u32, height: u32, target: TargetSize, expected: (u32, u32)) {
        let codec = ImageCrateCodec::with_filter(FilterType::Triangle);
        let bytes = codec
            .encode(&sample(width, height), CompressionFormat::Png, 100)
            .unwrap();

        let decoded = codec.decode(&bytes, Some(target)).unwrap();
        assert_eq!((decoded.width(), decoded.height()), expected);
    }

    #[test]
    fn test_malformed_bytes_are_decode_errors() {
        let err = ImageCrateCodec::new()
            .decode(b"definitely not an image", None)
            .unwrap_err();
        assert!(err.is_decode_error());
    }
}
