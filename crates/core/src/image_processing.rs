//! Uploaded images and encoded image payloads.
//!
//! A [`SourceImage`] is created once per upload and never mutated; a new
//! upload replaces it wholesale. Image data travels to and from the Gemini
//! API as base64 text, wrapped in [`ImagePayload`].

use crate::error::{AppError, Result};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use image::{DynamicImage, ImageFormat, ImageReader, Limits};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

pub const MIME_JPEG: &str = "image/jpeg";
pub const MIME_PNG: &str = "image/png";

/// Largest accepted width or height of an upload.
pub const MAX_UPLOAD_SIDE: u32 = 16_384;
/// Decoder allocation budget for an upload.
const MAX_UPLOAD_ALLOC: u64 = 512 * 1024 * 1024;

fn upload_limits() -> Limits {
    let mut limits = Limits::default();
    limits.max_image_width = Some(MAX_UPLOAD_SIDE);
    limits.max_image_height = Some(MAX_UPLOAD_SIDE);
    limits.max_alloc = Some(MAX_UPLOAD_ALLOC);
    limits
}

/// Base64-encoded image bytes plus their MIME type.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImagePayload {
    pub mime_type: String,
    /// Base64 (standard alphabet, padded) encoding of the file bytes.
    pub data: String,
}

impl ImagePayload {
    /// Encodes raw file bytes.
    pub fn from_bytes(mime_type: impl Into<String>, bytes: &[u8]) -> Self {
        Self {
            mime_type: mime_type.into(),
            data: BASE64.encode(bytes),
        }
    }

    /// Wraps data that is already base64 encoded, as returned by the API.
    pub fn from_base64(mime_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data: data.into(),
        }
    }

    /// Decodes the payload back into file bytes.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::ImageProcessing`] if the data is not valid base64.
    pub fn decode(&self) -> Result<Vec<u8>> {
        BASE64
            .decode(self.data.as_bytes())
            .map_err(|e| AppError::image(format!("Invalid base64 image data: {}", e)))
    }

    /// Renders the payload as a `data:` URL for display surfaces.
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }
}

/// The portrait being edited.
///
/// Holds the encoded file as uploaded together with its natural pixel size.
/// The whole file is decoded under fixed size and allocation limits before
/// any mask is sized, so a truncated file or an oversized header is rejected here.
#[derive(Clone, Debug)]
pub struct SourceImage {
    bytes: Arc<[u8]>,
    mime_type: &'static str,
    width: u32,
    height: u32,
}

impl SourceImage {
    /// Accepts an uploaded JPEG or PNG file.
    ///
    /// # Errors
    ///
    /// - [`AppError::UnsupportedFormat`] for anything other than JPEG or PNG
    /// - [`AppError::ImageProcessing`] if the file cannot be decoded or
    ///   exceeds the upload limits
    /// - [`AppError::EmptyImage`] if either dimension is zero
    pub fn from_bytes(bytes: impl Into<Arc<[u8]>>) -> Result<Self> {
        let bytes: Arc<[u8]> = bytes.into();

        let mut reader = ImageReader::new(Cursor::new(&bytes[..]))
            .with_guessed_format()
            .map_err(|e| AppError::image(format!("Failed to read image: {}", e)))?;

        let mime_type = match reader.format() {
            Some(ImageFormat::Jpeg) => MIME_JPEG,
            Some(ImageFormat::Png) => MIME_PNG,
            Some(other) => return Err(AppError::UnsupportedFormat(format!("{:?}", other))),
            None => return Err(AppError::UnsupportedFormat("unrecognized data".to_string())),
        };

        reader.limits(upload_limits());
        let decoded = reader
            .decode()
            .map_err(|e| AppError::image(format!("Failed to decode image: {}", e)))?;
        let (width, height) = (decoded.width(), decoded.height());

        if width == 0 || height == 0 {
            return Err(AppError::EmptyImage { width, height });
        }

        Ok(Self {
            bytes,
            mime_type,
            width,
            height,
        })
    }

    /// Reads an image file from disk.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(bytes)
    }

    /// Encodes an in-memory image as PNG and wraps it as an upload.
    pub fn from_image(image: &DynamicImage) -> Result<Self> {
        let bytes = ImageProcessor::encode_png(image)?;
        Self::from_bytes(bytes)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn mime_type(&self) -> &'static str {
        self.mime_type
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Base64 payload ready for API transmission.
    pub fn to_payload(&self) -> ImagePayload {
        ImagePayload::from_bytes(self.mime_type, &self.bytes)
    }
}

/// Encoding helpers shared by masks and exports.
pub struct ImageProcessor;

impl ImageProcessor {
    /// Encodes an image as PNG bytes.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::ImageProcessing`] if encoding fails.
    pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>> {
        let mut buffer: Vec<u8> = Vec::new();
        let mut cursor = Cursor::new(&mut buffer);

        image
            .write_to(&mut cursor, ImageFormat::Png)
            .map_err(|e| AppError::image(format!("Failed to encode image: {}", e)))?;

        Ok(buffer)
    }

    /// Decodes a PNG or JPEG file held in memory.
    pub fn decode(bytes: &[u8]) -> Result<DynamicImage> {
        image::load_from_memory(bytes)
            .map_err(|e| AppError::image(format!("Failed to decode image: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn encoded(format: ImageFormat, width: u32, height: u32) -> Vec<u8> {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([200, 120, 40])));
        let mut buffer = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut buffer), format)
            .expect("encode");
        buffer
    }

    #[test]
    fn reads_natural_size_of_png_and_jpeg() {
        let png = SourceImage::from_bytes(encoded(ImageFormat::Png, 40, 60)).expect("png");
        assert_eq!(png.dimensions(), (40, 60));
        assert_eq!(png.mime_type(), MIME_PNG);

        let jpeg = SourceImage::from_bytes(encoded(ImageFormat::Jpeg, 33, 17)).expect("jpeg");
        assert_eq!(jpeg.dimensions(), (33, 17));
        assert_eq!(jpeg.mime_type(), MIME_JPEG);
    }

    #[test]
    fn rejects_non_image_data() {
        let result = SourceImage::from_bytes(b"definitely not an image".to_vec());
        assert!(matches!(result, Err(AppError::UnsupportedFormat(_))));
    }

    fn crc32(bytes: &[u8]) -> u32 {
        let mut crc = !0u32;
        for &byte in bytes {
            crc ^= byte as u32;
            for _ in 0..8 {
                crc = if crc & 1 == 1 { (crc >> 1) ^ 0xEDB8_8320 } else { crc >> 1 };
            }
        }
        !crc
    }

    fn chunk(out: &mut Vec<u8>, kind: &[u8; 4], data: &[u8]) {
        out.extend_from_slice(&(data.len() as u32).to_be_bytes());
        let start = out.len();
        out.extend_from_slice(kind);
        out.extend_from_slice(data);
        let crc = crc32(&out[start..]);
        out.extend_from_slice(&crc.to_be_bytes());
    }

    /// A PNG whose header claims `width`x`height` RGB pixels but carries no data.
    fn header_only_png(width: u32, height: u32) -> Vec<u8> {
        let mut png = vec![0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1A, b'\n'];
        let mut ihdr = Vec::new();
        ihdr.extend_from_slice(&width.to_be_bytes());
        ihdr.extend_from_slice(&height.to_be_bytes());
        ihdr.extend_from_slice(&[8, 2, 0, 0, 0]);
        chunk(&mut png, b"IHDR", &ihdr);
        chunk(&mut png, b"IDAT", &[]);
        chunk(&mut png, b"IEND", &[]);
        png
    }

    #[test]
    fn oversized_header_is_rejected_without_allocating() {
        let result = SourceImage::from_bytes(header_only_png(100_000, 100_000));
        assert!(matches!(result, Err(AppError::ImageProcessing(_))));
    }

    #[test]
    fn truncated_upload_is_rejected() {
        let result = SourceImage::from_bytes(header_only_png(40, 30));
        assert!(matches!(result, Err(AppError::ImageProcessing(_))));

        let mut cut = encoded(ImageFormat::Png, 40, 30);
        cut.truncate(cut.len() / 2);
        assert!(SourceImage::from_bytes(cut).is_err());
    }

    #[test]
    fn payload_round_trips_through_base64() {
        let payload = ImagePayload::from_bytes(MIME_PNG, &[0x89, b'P', b'N', b'G']);
        assert_eq!(payload.decode().expect("decode"), vec![0x89, b'P', b'N', b'G']);
        assert!(payload.to_data_url().starts_with("data:image/png;base64,"));
    }

    #[test]
    fn invalid_base64_is_an_image_error() {
        let payload = ImagePayload::from_base64(MIME_PNG, "***");
        assert!(matches!(payload.decode(), Err(AppError::ImageProcessing(_))));
    }
}
