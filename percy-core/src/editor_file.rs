use std::path::{Path, PathBuf};

use crate::error::{BridgeError, Result};

/// Name of the per-application environments file.
pub const ENV_FILE_NAME: &str = "environments.yaml";

/// Extensions the editor accepts, compared case-insensitively.
pub const YAML_EXTENSIONS: [&str; 2] = ["yaml", "yml"];

/// The document under edit. Immutable for the lifetime of an editor session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditorFile {
    path: PathBuf,
    parent: PathBuf,
    name: String,
    is_env_file: bool,
}

impl EditorFile {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if !path.is_absolute() {
            return Err(BridgeError::InvalidPath(format!(
                "{} is not absolute",
                path.display()
            )));
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| BridgeError::InvalidPath(format!("{} has no file name", path.display())))?;
        let parent = path
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| BridgeError::InvalidPath(format!("{} has no parent", path.display())))?;
        let is_env_file = name == ENV_FILE_NAME;

        Ok(Self {
            path,
            parent,
            name,
            is_env_file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn parent(&self) -> &Path {
        &self.parent
    }

    /// Base name of the file, e.g. `config.yaml`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// True iff the base name is exactly `environments.yaml`.
    pub fn is_env_file(&self) -> bool {
        self.is_env_file
    }

    /// Path of the sibling environments file.
    pub fn env_file_path(&self) -> PathBuf {
        self.parent.join(ENV_FILE_NAME)
    }
}

/// Whether the editor should be offered for `path`: an existing regular file
/// with a YAML extension that is small enough to load.
pub fn accepts_file(path: &Path, max_file_size: u64) -> bool {
    let has_yaml_ext = path
        .extension()
        .map(|ext| {
            let ext = ext.to_string_lossy();
            YAML_EXTENSIONS.iter().any(|y| ext.eq_ignore_ascii_case(y))
        })
        .unwrap_or(false);
    if !has_yaml_ext {
        return false;
    }
    match std::fs::metadata(path) {
        Ok(meta) => meta.is_file() && meta.len() <= max_file_size,
        Err(_) => false,
    }
}
