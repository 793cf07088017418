use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};

use percy_core::percyrc::{ConfigOverlay, PercyConfig};

// ---------------------------------------------------------------------------
// Message types
// ---------------------------------------------------------------------------

/// Discriminator values carried in the `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    Init,
    Render,
    Save,
    SaveCancelled,
    Saved,
    Close,
    FileDirty,
    FileChanged,
}

impl MessageType {
    pub const ALL: [MessageType; 8] = [
        MessageType::Init,
        MessageType::Render,
        MessageType::Save,
        MessageType::SaveCancelled,
        MessageType::Saved,
        MessageType::Close,
        MessageType::FileDirty,
        MessageType::FileChanged,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MessageType::Init => "PercyEditorInit",
            MessageType::Render => "PercyEditorRender",
            MessageType::Save => "PercyEditorSave",
            MessageType::SaveCancelled => "PercyEditorSaveCancelled",
            MessageType::Saved => "PercyEditorSaved",
            MessageType::Close => "PercyEditorClose",
            MessageType::FileDirty => "PercyEditorFileDirty",
            MessageType::FileChanged => "PercyEditorFileChanged",
        }
    }

    /// Case-insensitive lookup of a wire discriminator.
    pub fn parse(value: &str) -> Option<MessageType> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(value))
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type")]
pub enum BridgeMessage {
    #[serde(rename = "PercyEditorInit")]
    Init,
    #[serde(rename = "PercyEditorRender")]
    Render(RenderPayload),
    #[serde(rename = "PercyEditorSave", rename_all = "camelCase")]
    Save { file_content: String },
    #[serde(rename = "PercyEditorSaveCancelled")]
    SaveCancelled,
    #[serde(rename = "PercyEditorSaved", rename_all = "camelCase")]
    Saved {
        file_content: String,
        new_file_name: String,
    },
    #[serde(rename = "PercyEditorClose")]
    Close,
    #[serde(rename = "PercyEditorFileDirty")]
    FileDirty {
        #[serde(deserialize_with = "lenient_bool")]
        #[schemars(with = "bool")]
        dirty: bool,
    },
    #[serde(rename = "PercyEditorFileChanged", rename_all = "camelCase")]
    FileChanged { file_content: String },
}

impl BridgeMessage {
    pub fn message_type(&self) -> MessageType {
        match self {
            BridgeMessage::Init => MessageType::Init,
            BridgeMessage::Render(_) => MessageType::Render,
            BridgeMessage::Save { .. } => MessageType::Save,
            BridgeMessage::SaveCancelled => MessageType::SaveCancelled,
            BridgeMessage::Saved { .. } => MessageType::Saved,
            BridgeMessage::Close => MessageType::Close,
            BridgeMessage::FileDirty { .. } => MessageType::FileDirty,
            BridgeMessage::FileChanged { .. } => MessageType::FileChanged,
        }
    }}

/// Everything the content needs to render the editor for one file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RenderPayload {
    pub edit_mode: bool,
    pub env_file_mode: bool,
    pub app_name: String,
    pub file_name: String,
    pub path_sep: String,
    pub file_content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env_file_content: Option<String>,
    pub percy_config: PercyConfig,
    pub app_percy_config: ConfigOverlay,
}

/// Accept `true`/`false` or their string forms. Any string other than a
/// case-insensitive `"true"` reads as `false`.
fn lenient_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Text(String),
    }

    Ok(match Flag::deserialize(deserializer)? {
        Flag::Bool(b) => b,
        Flag::Text(s) => s.trim().eq_ignore_ascii_case("true"),
    })
}

/// JSON Schema describing every message on the wire.
pub fn schema() -> serde_json::Value {
    let schema = schemars::schema_for!(BridgeMessage);
    serde_json::to_value(schema).unwrap_or_else(|e| {
        log::error!("Failed to serialize protocol schema: {}", e);
        serde_json::Value::Null
    })
}
