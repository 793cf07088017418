use std::cell::RefCell;

use gtk4::glib;
use gtk4::prelude::*;
use webkit6::prelude::*;

use percy_core::error::{BridgeError, Result};
use percy_editor::assets::AssetServer;
use percy_editor::channel::{ContentChannel, InboundHandler};

/// Script message handler name; the page posts through
/// `window.webkit.messageHandlers.percy`.
const MESSAGE_HANDLER: &str = "percy";

/// URI scheme the embedded assets are served under.
pub const ASSET_SCHEME: &str = "percy";

/// Content channel over a WebKitGTK web view. Lives on the GTK main thread.
pub struct WebKitChannel {
    webview: webkit6::WebView,
    user_content_manager: webkit6::UserContentManager,
    handler_id: RefCell<Option<glib::SignalHandlerId>>,
}

impl WebKitChannel {
    pub fn new() -> Self {
        let user_content_manager = webkit6::UserContentManager::new();
        let webview = webkit6::WebView::builder()
            .user_content_manager(&user_content_manager)
            .hexpand(true)
            .vexpand(true)
            .build();

        if let Some(wk_settings) = webkit6::prelude::WebViewExt::settings(&webview) {
            wk_settings.set_enable_javascript(true);
            wk_settings.set_enable_developer_extras(cfg!(debug_assertions));
        }

        Self {
            webview,
            user_content_manager,
            handler_id: RefCell::new(None),
        }
    }

    pub fn webview(&self) -> &webkit6::WebView {
        &self.webview
    }
}

impl ContentChannel for WebKitChannel {
    fn load_url(&self, url: &str) -> Result<()> {
        self.webview.load_uri(url);
        Ok(())
    }

    fn execute_script(&self, script: &str) -> Result<()> {
        self.webview.evaluate_javascript(
            script,
            None,
            None,
            None::<&gtk4::gio::Cancellable>,
            |result| {
                if let Err(e) = result {
                    log::warn!("Script evaluation failed: {}", e);
                }
            },
        );
        Ok(())
    }

    fn register_inbound_handler(&self, handler: InboundHandler) -> Result<()> {
        if !self
            .user_content_manager
            .register_script_message_handler(MESSAGE_HANDLER, None)
        {
            return Err(BridgeError::Channel(format!(
                "script message handler '{}' is already registered",
                MESSAGE_HANDLER
            )));
        }
        let id = self.user_content_manager.connect_script_message_received(
            Some(MESSAGE_HANDLER),
            move |_ucm, value| {
                handler(&value.to_str());
            },
        );
        if let Some(previous) = self.handler_id.replace(Some(id)) {
            self.user_content_manager.disconnect(previous);
        }
        Ok(())
    }

    fn dispose(&self) -> Result<()> {
        if let Some(id) = self.handler_id.take() {
            self.user_content_manager.disconnect(id);
            self.user_content_manager
                .unregister_script_message_handler(MESSAGE_HANDLER, None);
        }
        self.webview.try_close();
        Ok(())
    }
}

/// Serve embedded assets for `percy://localhost/percy/...` requests.
/// WebKit allows one handler per scheme and context, so call this once.
pub fn register_asset_scheme(assets: AssetServer) {
    let Some(context) = webkit6::WebContext::default() else {
        log::error!("No default WebKit context; editor assets are unavailable");
        return;
    };

    context.register_uri_scheme(ASSET_SCHEME, move |request| {
        let path = request.path().map(|p| p.to_string()).unwrap_or_default();
        let asset = assets.serve(&path);
        if asset.status != 200 {
            log::warn!("{} {}", asset.status, path);
        }

        let length = asset.body.len() as i64;
        let stream =
            gtk4::gio::MemoryInputStream::from_bytes(&glib::Bytes::from_owned(asset.body));
        let response = webkit6::URISchemeResponse::new(&stream, length);
        response.set_status(u32::from(asset.status), None);
        response.set_content_type(asset.content_type);
        request.finish_with_response(&response);
    });
}

/// Address of a bundled asset under the custom scheme.
pub fn asset_url(assets: &AssetServer, name: &str) -> String {
    format!("{}://localhost{}{}", ASSET_SCHEME, assets.prefix(), name)
}
