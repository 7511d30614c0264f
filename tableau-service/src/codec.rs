//! Base64 transport encoding for binary payloads embedded in JSON.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::error::{ServiceError, ServiceResult};

/// Decode a base64 payload field.
///
/// Accepts `data:<mime>;base64,` URLs and ignores embedded whitespace
/// (line-wrapped encoders).
pub fn decode_payload(field: &str, data: &str) -> ServiceResult<Vec<u8>> {
    let payload = if data.starts_with("data:") {
        data.split_once(',').map(|(_, b64)| b64).unwrap_or(data)
    } else {
        data
    };

    let normalized: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD
        .decode(normalized.as_bytes())
        .map_err(|e| ServiceError::InvalidRequest {
            message: format!("`{}` is not valid base64: {}", field, e),
        })
}

pub fn encode_payload(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}
