//! Error taxonomy shared by every Percy crate.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the resolver, the document stores and the editor bridge.
///
/// None of these are fatal to the process; each one is scoped to the editor
/// session that triggered it.
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed .percyrc at {path:?}: {message}")]
    ConfigParse { path: PathBuf, message: String },

    #[error("Unknown message type: {0}")]
    UnknownMessageType(String),

    #[error("Failed to decode message: {0}")]
    Decode(String),

    #[error("Failed to encode message: {0}")]
    Encode(String),

    #[error("Write rejected: {0}")]
    WriteConflict(String),

    #[error("Cannot handle {operation} while session is {state}")]
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("File watch error: {0}")]
    Watch(String),

    #[error("Content channel error: {0}")]
    Channel(String),

    #[error("Percy engine is not initialized")]
    NotInitialized,
}

impl From<notify::Error> for BridgeError {
    fn from(e: notify::Error) -> Self {
        BridgeError::Watch(e.to_string())
    }
}

/// Result type alias for this workspace
pub type Result<T> = std::result::Result<T, BridgeError>;

impl serde::Serialize for BridgeError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
