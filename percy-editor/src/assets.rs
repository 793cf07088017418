//! Static assets for the editor page.
//!
//! The host page and both stylesheets are compiled in. The Percy web-app
//! bundle itself is served from an optional on-disk `web_root`, which also
//! takes precedence over the embedded files so a deployment can replace them.

use std::io::ErrorKind;
use std::path::PathBuf;

use include_dir::{include_dir, Dir};
use url::Url;

use percy_core::error::{BridgeError, Result};
use percy_core::settings::HostSettings;

static WEB_DIR: Dir<'_> = include_dir!("$CARGO_MANIFEST_DIR/web");

pub const INDEX_FILE: &str = "index.html";
pub const LIGHT_STYLESHEET: &str = "default.css";
pub const DARK_STYLESHEET: &str = "darcula.css";

/// Stylesheet matching the host theme.
pub fn stylesheet(dark: bool) -> &'static str {
    if dark {
        DARK_STYLESHEET
    } else {
        LIGHT_STYLESHEET
    }
}

/// `http://localhost:<port><prefix><name>`
pub fn static_url(port: u16, prefix: &str, name: &str) -> Result<String> {
    let base = Url::parse(&format!("http://localhost:{}", port))
        .and_then(|u| u.join(&normalize_prefix(prefix)))
        .and_then(|u| u.join(name.trim_start_matches('/')))
        .map_err(|e| BridgeError::InvalidPath(format!("{}: {}", name, e)))?;
    Ok(base.to_string())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetResponse {
    pub status: u16,
    pub content_type: &'static str,
    pub body: Vec<u8>,
}

impl AssetResponse {
    fn ok(name: &str, body: Vec<u8>) -> Self {
        Self {
            status: 200,
            content_type: content_type(name),
            body,
        }
    }

    fn not_found() -> Self {
        Self {
            status: 404,
            content_type: "text/plain; charset=utf-8",
            body: b"Not Found".to_vec(),
        }
    }

    fn server_error() -> Self {
        Self {
            status: 500,
            content_type: "text/plain; charset=utf-8",
            body: b"Internal Server Error".to_vec(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AssetServer {
    prefix: String,
    web_root: Option<PathBuf>,
}

impl AssetServer {
    pub fn new(prefix: &str, web_root: Option<PathBuf>) -> Self {
        Self {
            prefix: normalize_prefix(prefix),
            web_root,
        }
    }

    pub fn from_settings(settings: &HostSettings) -> Self {
        Self::new(&settings.static_prefix, settings.web_root.clone())
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn url(&self, port: u16, name: &str) -> Result<String> {
        static_url(port, &self.prefix, name)
    }

    /// Resolve a request path such as `/percy/index.html`.
    pub fn serve(&self, request_path: &str) -> AssetResponse {
        let path = request_path
            .split(['?', '#'])
            .next()
            .unwrap_or_default();

        let name = if path == self.prefix.trim_end_matches('/') {
            INDEX_FILE
        } else {
            match path.strip_prefix(self.prefix.as_str()) {
                Some("") => INDEX_FILE,
                Some(rest) => rest,
                None => {
                    log::debug!("Asset request outside {}: {}", self.prefix, path);
                    return AssetResponse::not_found();
                }
            }
        };

        if !is_safe_name(name) {
            log::warn!("Rejected asset path: {}", path);
            return AssetResponse::not_found();
        }

        if let Some(root) = &self.web_root {
            match std::fs::read(root.join(name)) {
                Ok(body) => return AssetResponse::ok(name, body),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    log::error!("Failed to read asset {}: {}", name, e);
                    return AssetResponse::server_error();
                }
            }
        }

        match WEB_DIR.get_file(name) {
            Some(file) => AssetResponse::ok(name, file.contents().to_vec()),
            None => AssetResponse::not_found(),
        }
    }
}

impl Default for AssetServer {
    fn default() -> Self {
        Self::from_settings(&HostSettings::default())
    }
}

fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{}/", trimmed)
    }
}

fn is_safe_name(name: &str) -> bool {
    !name.starts_with('/')
        && !name.contains('\\')
        && name
            .split('/')
            .all(|segment| !segment.is_empty() && segment != "." && segment != "..")
}

fn content_type(name: &str) -> &'static str {
    match name.rsplit('.').next().unwrap_or_default() {
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "js" | "mjs" => "application/javascript; charset=utf-8",
        "json" | "map" => "application/json",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "ico" => "image/x-icon",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        _ => "application/octet-stream",
    }
}
