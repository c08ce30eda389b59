//! Base64 transport encoding for images

use base64::{engine::general_purpose::STANDARD, Engine};
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;

use crate::error::{Result, ValidationError};

/// Strip an optional `data:image/...;base64,` prefix
fn payload(encoded: &str) -> &str {
    match encoded.split_once(',') {
        Some((_, data)) => data,
        None => encoded,
    }
}

/// Decode a transport image into RGB pixels.
///
/// `field` names the request field for the validation error.
pub fn decode_image(encoded: &str, field: &'static str) -> std::result::Result<DynamicImage, ValidationError> {
    let malformed = |reason: String| ValidationError::MalformedImage { field, reason };

    if encoded.trim().is_empty() {
        return Err(malformed("image data is empty".to_string()));
    }

    let bytes = STANDARD
        .decode(payload(encoded).trim())
        .map_err(|e| malformed(format!("invalid base64: {}", e)))?;

    let image = image::load_from_memory(&bytes).map_err(|e| malformed(e.to_string()))?;
    Ok(DynamicImage::ImageRgb8(image.to_rgb8()))
}

/// Encode an image as base64 PNG
pub fn encode_png(image: &DynamicImage) -> Result<String> {
    let mut bytes = Vec::new();
    image.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
    Ok(STANDARD.encode(&bytes))
}
