//! JSON wire form of [`BridgeMessage`].
//!
//! Encoding is plain serde. Decoding first normalizes the `type`
//! discriminator, which hosts have always matched case-insensitively, then
//! hands the object to serde for the payload.

use serde_json::Value;

use percy_core::error::{BridgeError, Result};

use crate::protocol::{BridgeMessage, MessageType};

pub fn to_value(message: &BridgeMessage) -> Result<Value> {
    serde_json::to_value(message).map_err(encode_error)
}

pub fn encode(message: &BridgeMessage) -> Result<String> {
    serde_json::to_string(message).map_err(encode_error)
}

fn encode_error(e: serde_json::Error) -> BridgeError {
    BridgeError::Encode(e.to_string())
}

pub fn decode(raw: &str) -> Result<BridgeMessage> {
    let value: Value =
        serde_json::from_str(raw).map_err(|e| BridgeError::Decode(format!("invalid JSON: {}", e)))?;
    decode_value(value)
}

pub fn decode_value(mut value: Value) -> Result<BridgeMessage> {
    let object = value
        .as_object_mut()
        .ok_or_else(|| BridgeError::Decode("message is not a JSON object".to_string()))?;

    let raw_type = match object.get("type") {
        Some(Value::String(s)) => s.clone(),
        Some(other) => {
            return Err(BridgeError::Decode(format!(
                "`type` must be a string, found {}",
                other
            )))
        }
        None => return Err(BridgeError::Decode("missing `type` field".to_string())),
    };
    let message_type =
        MessageType::parse(&raw_type).ok_or(BridgeError::UnknownMessageType(raw_type))?;
    object.insert(
        "type".to_string(),
        Value::String(message_type.as_str().to_string()),
    );

    serde_json::from_value(value)
        .map_err(|e| BridgeError::Decode(format!("{}: {}", message_type, e)))
}
