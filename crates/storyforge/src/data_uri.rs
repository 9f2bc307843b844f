//! `data:image/<fmt>;base64,<data>` image values

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use pdf_core::PNG_SIGNATURE;
use regex::Regex;
use std::sync::LazyLock;

static DATA_URI_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^data:image/(png|jpg|jpeg|gif|webp);base64,(.*)$")
        .unwrap_or_else(|e| panic!("invalid data URI regex: {e}"))
});

/// Why a data URI was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DataUriError {
    #[error("invalid data URI format (expected data:image/<png|jpg|jpeg|gif|webp>;base64,...)")]
    InvalidFormat,

    #[error("corrupted base64 data: {0}")]
    InvalidBase64(String),

    #[error("data URI contains no image data")]
    EmptyData,

    #[error("invalid PNG signature")]
    InvalidPngSignature,
}

/// A validated, decoded data URI image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUriImage {
    /// Declared format (`png`, `jpg`, `jpeg`, `gif` or `webp`).
    pub format: String,
    pub data: Vec<u8>,
}

/// Cheap prefix check used to route a value to data URI handling.
pub fn is_data_uri(value: &str) -> bool {
    value.starts_with("data:image/")
}

/// Validate and decode a data URI image.
///
/// The payload must decode with the standard alphabet, be non-empty and
/// re-encode to exactly the same text. PNG payloads must start with the PNG
/// signature.
pub fn decode_data_uri(value: &str) -> Result<DataUriImage, DataUriError> {
    let caps = DATA_URI_RE
        .captures(value.trim())
        .ok_or(DataUriError::InvalidFormat)?;
    let format = caps[1].to_string();
    let payload: String = caps[2].chars().filter(|c| !c.is_ascii_whitespace()).collect();

    if payload.is_empty() {
        return Err(DataUriError::EmptyData);
    }

    let data = STANDARD
        .decode(&payload)
        .map_err(|e| DataUriError::InvalidBase64(e.to_string()))?;

    if data.is_empty() {
        return Err(DataUriError::EmptyData);
    }

    if STANDARD.encode(&data) != payload {
        return Err(DataUriError::InvalidBase64(
            "payload does not re-encode to the same text".into(),
        ));
    }

    if format == "png" && !data.starts_with(&PNG_SIGNATURE) {
        return Err(DataUriError::InvalidPngSignature);
    }

    Ok(DataUriImage { format, data })
}
