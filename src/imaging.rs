//! Square-crop normalization for uploaded photos.
//!
//! Uploads arrive as base64 strings, optionally wrapped in a `data:` URL. Each one is decoded,
//! center-cropped to a square whose side is the shorter source dimension, flattened to RGB and
//! re-encoded as JPEG. No upscaling, no letterboxing.

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use image::{DynamicImage, GenericImageView, ImageReader, codecs::jpeg::JpegEncoder};
use std::io::Cursor;
use thiserror::Error;
use tracing::debug;

const JPEG_QUALITY: u8 = 75;
const DATA_URL_MARKER: &str = "base64,";
pub const JPEG_DATA_URL_PREFIX: &str = "data:image/jpeg;base64,";

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("image payload is not valid base64: {0}")]
    Base64(String),
    #[error("unsupported or corrupt image: {0}")]
    Image(String),
    #[error("image has zero width or height")]
    Empty,
    #[error("failed to encode jpeg: {0}")]
    Encode(String),
}

/// A normalized photo: square JPEG bytes plus the geometry it came from.
#[derive(Debug, Clone)]
pub struct NormalizedImage {
    pub bytes: Vec<u8>,
    pub side: u32,
    pub source_width: u32,
    pub source_height: u32,
}

impl NormalizedImage {
    pub fn to_base64(&self) -> String {
        BASE64.encode(&self.bytes)
    }

    pub fn to_data_url(&self) -> String {
        format!("{JPEG_DATA_URL_PREFIX}{}", self.to_base64())
    }
}

/// Strips an optional data-URL prefix and decodes the base64 body.
pub fn decode_payload(encoded: &str) -> Result<Vec<u8>, DecodeError> {
    let body = match encoded.split_once(DATA_URL_MARKER) {
        Some((_, rest)) => rest,
        None => encoded,
    };
    let body: String = body.chars().filter(|ch| !ch.is_ascii_whitespace()).collect();
    BASE64
        .decode(body.as_bytes())
        .map_err(|err| DecodeError::Base64(err.to_string()))
}

/// Crop window `(left, top, size)` for a centered square. Floor division biases odd
/// remainders toward the top/left edge.
pub fn crop_window(width: u32, height: u32) -> (u32, u32, u32) {
    let size = width.min(height);
    let left = (width - size) / 2;
    let top = (height - size) / 2;
    (left, top, size)
}

pub fn normalize(bytes: &[u8]) -> Result<NormalizedImage, DecodeError> {
    let img = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|err| DecodeError::Image(err.to_string()))?
        .decode()
        .map_err(|err| DecodeError::Image(err.to_string()))?;

    let (width, height) = img.dimensions();
    if width == 0 || height == 0 {
        return Err(DecodeError::Empty);
    }

    let (left, top, size) = crop_window(width, height);
    let cropped = if left == 0 && top == 0 && size == width && size == height {
        img
    } else {
        img.crop_imm(left, top, size, size)
    };

    let bytes = encode_jpeg(&cropped)?;
    debug!(
        target = "snaplist.imaging",
        width,
        height,
        side = size,
        encoded_bytes = bytes.len(),
        "image_normalized"
    );

    Ok(NormalizedImage {
        bytes,
        side: size,
        source_width: width,
        source_height: height,
    })
}

/// Decodes a (possibly data-URL wrapped) base64 upload and normalizes it.
pub fn normalize_encoded(encoded: &str) -> Result<NormalizedImage, DecodeError> {
    let bytes = decode_payload(encoded)?;
    normalize(&bytes)
}

fn encode_jpeg(img: &DynamicImage) -> Result<Vec<u8>, DecodeError> {
    // JPEG has no alpha or palette; flatten to 3-channel RGB first.
    let rgb = img.to_rgb8();
    let mut buffer = Vec::with_capacity((rgb.width() * rgb.height()) as usize);
    {
        let mut encoder = JpegEncoder::new_with_quality(&mut buffer, JPEG_QUALITY);
        encoder
            .encode_image(&rgb)
            .map_err(|err| DecodeError::Encode(err.to_string()))?;
    }
    Ok(buffer)
}
