//! Content channel: the embedded web content seen from the host.
//!
//! Adapters (WebKitGTK, the C ABI) implement [`ContentChannel`]; everything
//! above it only deals in URLs, scripts and raw inbound JSON strings.

use percy_core::error::Result;

use crate::codec;
use crate::protocol::BridgeMessage;

/// Receives the raw JSON text of every message the content posts.
pub type InboundHandler = Box<dyn Fn(&str) + Send + Sync>;

pub trait ContentChannel {
    fn load_url(&self, url: &str) -> Result<()>;

    /// Evaluate `script` in the content's page. Fire and forget.
    fn execute_script(&self, script: &str) -> Result<()>;

    fn register_inbound_handler(&self, handler: InboundHandler) -> Result<()>;

    /// Release the browser and every handler registered on it.
    fn dispose(&self) -> Result<()>;
}

/// Script delivering `message` to the content's `window.sendMessage`.
pub fn send_message_script(message: &BridgeMessage) -> Result<String> {
    let json = codec::encode(message)?;
    Ok(format!(
        "window.sendMessage(JSON.stringify({}));",
        escape_line_separators(&json)
    ))
}

/// Script switching the page between the light and dark stylesheets.
pub fn theme_script(dark: bool) -> String {
    let stylesheet = crate::assets::stylesheet(dark);
    format!(
        "(function() {{\
         document.body.classList.toggle('vscode-dark', {dark});\
         var link = document.getElementById('percy-theme');\
         if (link) {{ link.setAttribute('href', '{stylesheet}'); }}\
         }})();"
    )
}

// JSON allows raw U+2028/U+2029 inside strings, older JS parsers do not.
fn escape_line_separators(json: &str) -> String {
    json.replace('\u{2028}', "\\u2028")
        .replace('\u{2029}', "\\u2029")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_script_wraps_json_literal() {
        let script = send_message_script(&BridgeMessage::SaveCancelled).unwrap();
        assert_eq!(
            script,
            r#"window.sendMessage(JSON.stringify({"type":"PercyEditorSaveCancelled"}));"#
        );
    }

    #[test]
    fn message_script_escapes_line_separators() {
        let script = send_message_script(&BridgeMessage::FileChanged {
            file_content: "a\u{2028}b\u{2029}c".to_string(),
        })
        .unwrap();
        assert!(script.contains(r"a\u2028b\u2029c"));
        assert!(!script.contains('\u{2028}'));
    }

    #[test]
    fn message_script_keeps_quotes_escaped() {
        let script = send_message_script(&BridgeMessage::FileChanged {
            file_content: "say \"hi\"\n</script>".to_string(),
        })
        .unwrap();
        assert!(script.contains(r#"say \"hi\"\n</script>"#));
    }

    #[test]
    fn theme_script_selects_stylesheet() {
        let dark = theme_script(true);
        assert!(dark.contains("toggle('vscode-dark', true)"));
        assert!(dark.contains("darcula.css"));

        let light = theme_script(false);
        assert!(light.contains("toggle('vscode-dark', false)"));
        assert!(light.contains("default.css"));
    }
}
