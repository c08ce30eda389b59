//! Image transport encoding and pixel transforms

pub mod base64;
pub mod transform;
