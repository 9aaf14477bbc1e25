use image::{DynamicImage, GenericImageView, ImageReader};
use std::io::Cursor;
use thiserror::Error;
use webp::Encoder;

/// WebP maximum dimensions are 16383x16383
const MAX_WEBP_DIMENSION: u32 = 16383;

/// Failure inside the image codec
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CodecError {
    /// The input bytes are not a readable image
    #[error("{0}")]
    Decode(String),
    /// The image was read but could not be turned into WebP
    #[error("{0}")]
    Encode(String),
}

/// Black-box image codec: bytes in, WebP bytes out.
///
/// Implementations must be usable from several worker threads at once.
pub trait Codec: Send + Sync {
    /// Cheap integrity check of the input before any output is planned
    fn verify(&self, input: &[u8]) -> Result<(), CodecError>;

    /// Full decode of `input` and encode to WebP
    fn encode(&self, input: &[u8], quality: u8, lossless: bool) -> Result<Vec<u8>, CodecError>;
}

/// Codec built on the `image` decoders and libwebp through the `webp` crate
#[derive(Debug, Default, Clone, Copy)]
pub struct WebpCodec;

impl WebpCodec {
    pub fn new() -> Self {
        Self
    }

    fn decode(&self, input: &[u8]) -> Result<DynamicImage, CodecError> {
        let img = ImageReader::new(Cursor::new(input))
            .with_guessed_format()
            .map_err(|e| CodecError::Decode(e.to_string()))?
            .decode()
            .map_err(|e| CodecError::Decode(e.to_string()))?;
        fit_webp_limits(img)
    }
}

impl Codec for WebpCodec {
    fn verify(&self, input: &[u8]) -> Result<(), CodecError> {
        let reader = ImageReader::new(Cursor::new(input))
            .with_guessed_format()
            .map_err(|e| CodecError::Decode(e.to_string()))?;

        if reader.format().is_none() {
            return Err(CodecError::Decode("unrecognized image format".to_string()));
        }

        let (width, height) = reader
            .into_dimensions()
            .map_err(|e| CodecError::Decode(e.to_string()))?;
        if width == 0 || height == 0 {
            return Err(CodecError::Decode(format!(
                "invalid image dimensions: {width}x{height}"
            )));
        }
        Ok(())
    }

    fn encode(&self, input: &[u8], quality: u8, lossless: bool) -> Result<Vec<u8>, CodecError> {
        let img = webp_compatible(self.decode(input)?);
        let encoder = Encoder::from_image(&img)
            .map_err(|e| CodecError::Encode(format!("failed to create encoder: {e}")))?;

        let webp_data = if lossless {
            encoder.encode_lossless()
        } else {
            encoder.encode(f32::from(quality.min(100)))
        };
        Ok(webp_data.to_vec())
    }
}

/// libwebp only takes 8-bit RGB or RGBA buffers
fn webp_compatible(img: DynamicImage) -> DynamicImage {
    match img {
        DynamicImage::ImageRgb8(_) | DynamicImage::ImageRgba8(_) => img,
        other if other.color().has_alpha() => DynamicImage::ImageRgba8(other.to_rgba8()),
        other => DynamicImage::ImageRgb8(other.to_rgb8()),
    }
}

/// Validate and potentially resize image to fit WebP constraints
fn fit_webp_limits(img: DynamicImage) -> Result<DynamicImage, CodecError> {
    let (width, height) = img.dimensions();

    if width == 0 || height == 0 {
        return Err(CodecError::Decode(format!(
            "invalid image dimensions: {width}x{height}"
        )));
    }

    if width <= MAX_WEBP_DIMENSION && height <= MAX_WEBP_DIMENSION {
        return Ok(img);
    }

    let scale_factor = MAX_WEBP_DIMENSION as f64 / width.max(height) as f64;
    let new_width = ((width as f64 * scale_factor) as u32).max(1);
    let new_height = ((height as f64 * scale_factor) as u32).max(1);

    log::warn!(
        "Resizing image from {}x{} to {}x{} to fit WebP limits",
        width,
        height,
        new_width,
        new_height
    );

    Ok(img.resize(new_width, new_height, image::imageops::FilterType::Lanczos3))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};

    fn png_bytes() -> Vec<u8> {
        let img = RgbaImage::from_fn(32, 24, |x, y| Rgba([x as u8 * 8, y as u8 * 10, 90, 200]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    fn jpeg_bytes() -> Vec<u8> {
        let img = RgbImage::from_fn(40, 40, |x, y| Rgb([x as u8 * 6, 128, y as u8 * 6]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Jpeg).unwrap();
        out.into_inner()
    }

    fn is_webp(bytes: &[u8]) -> bool {
        bytes.len() > 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP"
    }

    #[test]
    fn test_verify_accepts_real_images() {
        let codec = WebpCodec::new();
        assert!(codec.verify(&png_bytes()).is_ok());
        assert!(codec.verify(&jpeg_bytes()).is_ok());
    }

    #[test]
    fn test_verify_rejects_garbage() {
        let codec = WebpCodec::new();
        assert!(matches!(codec.verify(b"definitely not an image"), Err(CodecError::Decode(_))));
        assert!(matches!(codec.verify(&[]), Err(CodecError::Decode(_))));
    }

    #[test]
    fn test_encode_lossy_and_lossless_produce_webp() {
        let codec = WebpCodec::new();
        let lossy = codec.encode(&jpeg_bytes(), 80, false).unwrap();
        let lossless = codec.encode(&png_bytes(), 100, true).unwrap();
        assert!(is_webp(&lossy));
        assert!(is_webp(&lossless));

        let decoded = image::load_from_memory(&lossless).unwrap();
        assert_eq!(decoded.dimensions(), (32, 24));
    }

    #[test]
    fn test_encode_truncated_png_is_decode_error() {
        let codec = WebpCodec::new();
        let bytes = png_bytes();
        let truncated = &bytes[..bytes.len() / 2];
        assert!(matches!(codec.encode(truncated, 80, false), Err(CodecError::Decode(_))));
    }

    #[test]
    fn test_grayscale_is_converted_for_libwebp() {
        let gray = DynamicImage::ImageLuma8(image::GrayImage::new(4, 4));
        assert!(matches!(webp_compatible(gray), DynamicImage::ImageRgb8(_)));

        let gray_alpha = DynamicImage::ImageLumaA8(image::GrayAlphaImage::new(4, 4));
        assert!(matches!(webp_compatible(gray_alpha), DynamicImage::ImageRgba8(_)));
    }
}
