//! Binds one [`EditorSession`] to one [`ContentChannel`].
//!
//! Inbound messages go straight from the channel's handler into the session.
//! Outbound messages sit in the session's queue until the adapter calls
//! [`EditorBridge::pump`] on the thread that owns the browser.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use percy_core::error::Result;
use percy_core::subscription::Subscription;

use crate::channel::{self, ContentChannel};
use crate::outbound::{Outbound, OutboundReceiver};
use crate::session::{EditorSession, Handled};
use crate::theme::ThemeSource;

pub struct EditorBridge<C: ContentChannel> {
    session: Arc<EditorSession>,
    outbound: OutboundReceiver,
    channel: C,
    theme_subscription: Mutex<Option<Subscription>>,
    close_requested: Arc<AtomicBool>,
    disposed: AtomicBool,
}

impl<C: ContentChannel> EditorBridge<C> {
    /// Wire `session` to `channel`, load the editor page and queue the
    /// current theme.
    pub fn attach(
        session: Arc<EditorSession>,
        outbound: OutboundReceiver,
        channel: C,
        theme: &dyn ThemeSource,
        url: &str,
    ) -> Result<Self> {
        let close_requested = Arc::new(AtomicBool::new(false));

        {
            let session = Arc::clone(&session);
            let close_requested = Arc::clone(&close_requested);
            channel.register_inbound_handler(Box::new(move |raw: &str| {
                // Failures are already logged by the session.
                if let Ok(Handled::CloseRequested) = session.handle_inbound(raw) {
                    close_requested.store(true, Ordering::SeqCst);
                }
            }))?;
        }

        log::info!("[{}] Loading {}", session.id(), url);
        channel.load_url(url)?;

        let tx = session.outbound();
        tx.send_theme(theme.is_dark());
        let theme_subscription = theme.on_theme_change(Box::new(move |dark| tx.send_theme(dark)));

        Ok(Self {
            session,
            outbound,
            channel,
            theme_subscription: Mutex::new(Some(theme_subscription)),
            close_requested,
            disposed: AtomicBool::new(false),
        })
    }

    pub fn session(&self) -> &Arc<EditorSession> {
        &self.session
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    /// Deliver everything queued for the content. Returns how many items were
    /// delivered.
    pub fn pump(&self) -> usize {
        if self.disposed.load(Ordering::SeqCst) {
            return 0;
        }
        let mut delivered = 0;
        for item in self.outbound.drain() {
            let script = match item {
                Outbound::Message(message) => match channel::send_message_script(&message) {
                    Ok(script) => script,
                    Err(e) => {
                        log::error!(
                            "[{}] Failed to encode {}: {}",
                            self.session.id(),
                            message.message_type(),
                            e
                        );
                        continue;
                    }
                },
                Outbound::Theme { dark } => channel::theme_script(dark),
            };
            match self.channel.execute_script(&script) {
                Ok(()) => delivered += 1,
                Err(e) => log::warn!("[{}] Script delivery failed: {}", self.session.id(), e),
            }
        }
        delivered
    }

    /// True once after the content posted a close request.
    pub fn take_close_request(&self) -> bool {
        self.close_requested.swap(false, Ordering::SeqCst)
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Release the document subscription, the theme subscription and the
    /// channel. Every release runs; the first failure is returned and the
    /// rest are logged.
    pub fn dispose(&self) -> Result<()> {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let id = self.session.id();

        let mut results = vec![self.session.dispose()];
        if let Some(subscription) = self.theme_subscription.lock().take() {
            results.push(subscription.unsubscribe());
        }
        results.push(self.channel.dispose());

        let mut first = None;
        for error in results.into_iter().filter_map(|r| r.err()) {
            if first.is_none() {
                first = Some(error);
            } else {
                log::error!("[{}] Release failed during dispose: {}", id, error);
            }
        }
        match first {
            Some(error) => {
                log::error!("[{}] Dispose failed: {}", id, error);
                Err(error)
            }
            None => Ok(()),
        }
    }
}

impl<C: ContentChannel> Drop for EditorBridge<C> {
    fn drop(&mut self) {
        if let Err(e) = self.dispose() {
            log::warn!("Editor bridge dropped with failed release: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::InboundHandler;
    use crate::outbound;
    use crate::session::{SessionOptions, SessionState};
    use crate::theme::ThemeState;
    use percy_core::document::MemoryDocumentStore;
    use percy_core::editor_file::EditorFile;
    use percy_core::error::BridgeError;
    use std::path::Path;

    const FILE: &str = "/app/config.yaml";
    const URL: &str = "http://localhost:63342/percy/index.html";

    #[derive(Default)]
    struct FakeState {
        urls: Vec<String>,
        scripts: Vec<String>,
        handler: Option<InboundHandler>,
        disposed: bool,
        fail_dispose: bool,
    }

    #[derive(Clone, Default)]
    struct FakeChannel(Arc<Mutex<FakeState>>);

    impl FakeChannel {
        fn post(&self, raw: &str) {
            let state = self.0.lock();
            let handler = state.handler.as_ref().expect("handler registered");
            handler(raw);
        }

        fn scripts(&self) -> Vec<String> {
            std::mem::take(&mut self.0.lock().scripts)
        }
    }

    impl ContentChannel for FakeChannel {
        fn load_url(&self, url: &str) -> Result<()> {
            self.0.lock().urls.push(url.to_string());
            Ok(())
        }

        fn execute_script(&self, script: &str) -> Result<()> {
            self.0.lock().scripts.push(script.to_string());
            Ok(())
        }

        fn register_inbound_handler(&self, handler: InboundHandler) -> Result<()> {
            self.0.lock().handler = Some(handler);
            Ok(())
        }

        fn dispose(&self) -> Result<()> {
            let mut state = self.0.lock();
            state.disposed = true;
            state.handler = None;
            if state.fail_dispose {
                return Err(BridgeError::Channel("browser already gone".to_string()));
            }
            Ok(())
        }
    }

    fn attach() -> (
        MemoryDocumentStore,
        ThemeState,
        FakeChannel,
        EditorBridge<FakeChannel>,
    ) {
        let store = MemoryDocumentStore::new();
        store.insert(FILE, "a: 1\n");
        let theme = ThemeState::new(true);
        let channel = FakeChannel::default();
        let (tx, rx) = outbound::channel();
        let session = EditorSession::open(
            EditorFile::new(FILE).unwrap(),
            "/app",
            Arc::new(store.clone()),
            tx,
            SessionOptions::default(),
        )
        .unwrap();
        let bridge = EditorBridge::attach(session, rx, channel.clone(), &theme, URL).unwrap();
        (store, theme, channel, bridge)
    }

    #[test]
    fn attach_loads_page_and_queues_theme() {
        let (_store, _theme, channel, bridge) = attach();

        assert_eq!(channel.0.lock().urls, vec![URL.to_string()]);
        assert_eq!(bridge.pump(), 1);
        let scripts = channel.scripts();
        assert!(scripts[0].contains("darcula.css"));
    }

    #[test]
    fn init_round_trip_delivers_render() {
        let (_store, _theme, channel, bridge) = attach();
        bridge.pump();
        channel.scripts();

        channel.post(r#"{"type":"PercyEditorInit"}"#);
        assert_eq!(bridge.pump(), 1);

        let scripts = channel.scripts();
        assert!(scripts[0].starts_with("window.sendMessage(JSON.stringify("));
        assert!(scripts[0].contains(r#""type":"PercyEditorRender""#));
        assert!(scripts[0].contains(r#""fileContent":"a: 1\n""#));
        assert_eq!(bridge.session().state(), SessionState::Rendered);
    }

    #[test]
    fn bad_inbound_message_is_dropped() {
        let (_store, _theme, channel, bridge) = attach();
        bridge.pump();

        channel.post("{not json");
        channel.post(r#"{"type":"Nope"}"#);

        assert_eq!(bridge.pump(), 0);
        assert_eq!(bridge.session().state(), SessionState::Uninitialized);
    }

    #[test]
    fn theme_changes_are_forwarded() {
        let (_store, theme, channel, bridge) = attach();
        bridge.pump();
        channel.scripts();

        theme.set_dark(false);
        bridge.pump();

        let scripts = channel.scripts();
        assert_eq!(scripts.len(), 1);
        assert!(scripts[0].contains("default.css"));
    }

    #[test]
    fn close_request_is_reported_once() {
        let (_store, _theme, channel, bridge) = attach();
        assert!(!bridge.take_close_request());

        channel.post(r#"{"type":"PercyEditorClose"}"#);

        assert!(bridge.take_close_request());
        assert!(!bridge.take_close_request());
    }

    #[test]
    fn dispose_releases_everything() {
        let (store, theme, channel, bridge) = attach();

        bridge.dispose().unwrap();

        assert_eq!(store.listener_count(Path::new(FILE)), 0);
        assert_eq!(theme.listener_count(), 0);
        assert!(channel.0.lock().disposed);
        assert_eq!(bridge.session().state(), SessionState::Disposed);
        assert_eq!(bridge.pump(), 0);
        assert!(bridge.dispose().is_ok());
    }

    #[test]
    fn dispose_continues_past_channel_failure() {
        let (store, theme, channel, bridge) = attach();
        channel.0.lock().fail_dispose = true;

        let err = bridge.dispose().unwrap_err();

        assert!(matches!(err, BridgeError::Channel(_)));
        assert_eq!(store.listener_count(Path::new(FILE)), 0);
        assert_eq!(theme.listener_count(), 0);
    }

    #[test]
    fn drop_disposes() {
        let (store, theme, channel, bridge) = attach();
        drop(bridge);

        assert_eq!(store.listener_count(Path::new(FILE)), 0);
        assert_eq!(theme.listener_count(), 0);
        assert!(channel.0.lock().disposed);
    }
}
