use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Host settings, read from `<config dir>/percy/settings.json`.
///
/// The `#[serde(default)]` on the struct fills any field missing from an
/// existing settings file with its `Default` value, so new fields never break
/// old config files.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct HostSettings {
    // ── Static assets ────────────────────────────────────────────────────
    /// Port of the host's local HTTP endpoint serving editor assets.
    pub server_port: u16,
    /// URL prefix under which editor assets are served.
    pub static_prefix: String,
    /// Directory holding the web application bundle, if not embedded.
    pub web_root: Option<PathBuf>,

    // ── Editor ───────────────────────────────────────────────────────────
    /// Report `appName` relative to the project root instead of absolute.
    pub relative_app_name: bool,
    /// Files larger than this are not opened in the editor.
    pub max_file_size: u64,

    // ── Diagnostics ──────────────────────────────────────────────────────
    /// `env_logger` filter used when the host does not set `RUST_LOG`.
    pub log_filter: String,
}

impl Default for HostSettings {
    fn default() -> Self {
        HostSettings {
            server_port: 63342,
            static_prefix: String::from("/percy/"),
            web_root: None,

            relative_app_name: false,
            max_file_size: 2_560_000,

            log_filter: String::from("info"),
        }
    }
}

pub fn settings_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("percy").join("settings.json"))
}

/// Load settings from the default location, falling back to defaults.
pub fn load() -> HostSettings {
    match settings_path() {
        Some(path) => load_from(&path),
        None => HostSettings::default(),
    }
}

pub fn load_from(path: &Path) -> HostSettings {
    match std::fs::read_to_string(path) {
        Ok(contents) => parse(&contents).unwrap_or_else(|e| {
            log::warn!("Ignoring malformed settings file {:?}: {}", path, e);
            HostSettings::default()
        }),
        Err(_) => HostSettings::default(),
    }
}

pub fn parse(json: &str) -> Result<HostSettings, serde_json::Error> {
    serde_json::from_str(json)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_use_defaults() {
        let settings = parse(r#"{"server_port": 8080}"#).unwrap();
        assert_eq!(settings.server_port, 8080);
        assert_eq!(settings.static_prefix, "/percy/");
        assert!(!settings.relative_app_name);
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{not json").unwrap();
        assert_eq!(load_from(&path), HostSettings::default());
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            load_from(&dir.path().join("absent.json")),
            HostSettings::default()
        );
    }

    #[test]
    fn load_reads_written_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"relative_app_name": true, "web_root": "/opt/percy/web"}"#,
        )
        .unwrap();
        let expected = HostSettings {
            relative_app_name: true,
            web_root: Some(PathBuf::from("/opt/percy/web")),
            ..HostSettings::default()
        };
        assert_eq!(load_from(&path), expected);
    }
}
