//! `.percyrc` resolution.
//!
//! Walks from the edited file's directory up to the project root and merges
//! every `.percyrc` it finds into one overlay. A key set by a directory closer
//! to the file is never replaced by an ancestor; ancestors only fill gaps.

use std::path::{Path, PathBuf};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::document::DocumentStore;
use crate::editor_file::EditorFile;
use crate::error::{BridgeError, Result};

pub const PERCYRC_FILE_NAME: &str = ".percyrc";

pub const FILENAME_REGEX: &str = "^[a-zA-Z0-9_.-]*$";
pub const PROPERTY_NAME_REGEX: &str = r"^[\s]*[a-zA-Z0-9$_.-]*[\s]*$";

/// Merged `.percyrc` contents.
pub type ConfigOverlay = Map<String, Value>;

/// Built-in editor constants sent with every render. Not user-overridable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PercyConfig {
    pub variable_prefix: String,
    pub variable_suffix: String,
    pub variable_name_prefix: String,
    pub env_variable_name: String,
    pub filename_regex: String,
    pub property_name_regex: String,
}

impl Default for PercyConfig {
    fn default() -> Self {
        Self {
            variable_prefix: "_{".to_string(),
            variable_suffix: "}_".to_string(),
            variable_name_prefix: "$".to_string(),
            env_variable_name: "env".to_string(),
            filename_regex: FILENAME_REGEX.to_string(),
            property_name_regex: PROPERTY_NAME_REGEX.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConfig {
    pub percy_config: PercyConfig,
    pub app_percy_config: ConfigOverlay,
    /// `.percyrc` files that were merged, nearest first.
    pub sources: Vec<PathBuf>,
}

/// Resolve the configuration for `file`, stopping at `project_root`
/// (inclusive) or at the filesystem root.
pub fn resolve(
    store: &dyn DocumentStore,
    file: &EditorFile,
    project_root: &Path,
) -> Result<ResolvedConfig> {
    let mut overlay = ConfigOverlay::new();
    let mut sources = Vec::new();

    let mut dir = Some(file.parent());
    while let Some(current) = dir {
        let rc_path = current.join(PERCYRC_FILE_NAME);
        if store.exists(&rc_path) {
            let parsed = read_percyrc(store, &rc_path)?;
            merge_missing(&mut overlay, parsed);
            sources.push(rc_path);
        }
        if current == project_root {
            break;
        }
        dir = current.parent();
    }

    if !file.parent().starts_with(project_root) {
        log::warn!(
            "{} is outside project root {}; resolved up to filesystem root",
            file.path().display(),
            project_root.display()
        );
    }

    Ok(ResolvedConfig {
        percy_config: PercyConfig::default(),
        app_percy_config: overlay,
        sources,
    })
}

fn read_percyrc(store: &dyn DocumentStore, path: &Path) -> Result<ConfigOverlay> {
    let bytes = store.read_all(path)?;
    let value: Value = serde_json::from_slice(&bytes).map_err(|e| BridgeError::ConfigParse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    match value {
        Value::Object(map) => Ok(map),
        other => Err(BridgeError::ConfigParse {
            path: path.to_path_buf(),
            message: format!("expected a JSON object, found {}", json_kind(&other)),
        }),
    }
}

/// Copy keys of `ancestor` that `overlay` does not define yet.
fn merge_missing(overlay: &mut ConfigOverlay, ancestor: ConfigOverlay) {
    for (key, value) in ancestor {
        overlay.entry(key).or_insert(value);
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
