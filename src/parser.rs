//! JSON decoder for arrival messages.

use anyhow::Result;

use crate::model::ArrivalMessage;

/// Decodes a UTF-8 JSON [`ArrivalMessage`] from a raw topic payload.
///
/// # Errors
///
/// Returns an error if the bytes are not valid JSON or miss a required field.
pub fn parse_message(bytes: &[u8]) -> Result<ArrivalMessage> {
    Ok(serde_json::from_slice(bytes)?)
}
