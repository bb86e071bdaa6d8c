//! Hex codec for payloads crossing the bridge boundary.
//!
//! Bytes are rendered as two lowercase hex digits each. Decoding accepts
//! either case, since hosts commonly emit uppercase.

use data_encoding::{DecodeKind, HEXLOWER, HEXLOWER_PERMISSIVE};

use crate::error::{BridgeError, BridgeResult};

/// Encode bytes as a lowercase, zero-padded hex string.
pub fn encode(bytes: &[u8]) -> String {
    HEXLOWER.encode(bytes)
}

/// Decode a hex string back into bytes.
///
/// # Errors
///
/// Returns [`BridgeError::MalformedInput`] if the string has odd length or
/// contains a character outside `[0-9a-fA-F]`.
pub fn decode(hex: &str) -> BridgeResult<Vec<u8>> {
    HEXLOWER_PERMISSIVE.decode(hex.as_bytes()).map_err(|e| {
        let reason = match e.kind {
            DecodeKind::Length => format!("odd length {}", hex.len()),
            DecodeKind::Symbol => format!("invalid hex digit at position {}", e.position),
            _ => e.to_string(),
        };
        BridgeError::MalformedInput(reason)
    })
}
