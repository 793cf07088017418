//! Per-tab editor session.
//!
//! One [`EditorSession`] exists for every open editor tab. It consumes
//! inbound bridge messages, reads and writes the document through the host
//! [`DocumentStore`], resolves `.percyrc` configuration and queues outbound
//! messages for the adapter to deliver.
//!
//! Inbound processing is serialized by a per-session turn lock. Session state
//! lives behind a second lock that is only held for short, non-blocking
//! sections, so a document-change notification fired by the store while a
//! save is in progress never waits on the turn lock.

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use uuid::Uuid;

use percy_core::document::{ChangeListener, DocumentStore};
use percy_core::editor_file::EditorFile;
use percy_core::error::{BridgeError, Result};
use percy_core::settings::HostSettings;
use percy_core::subscription::Subscription;
use percy_core::{percyrc, util};

use crate::codec;
use crate::outbound::OutboundSender;
use crate::protocol::{BridgeMessage, RenderPayload};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Rendered,
    Editing,
    Saving,
    Disposed,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Uninitialized => "uninitialized",
            SessionState::Rendered => "rendered",
            SessionState::Editing => "editing",
            SessionState::Saving => "saving",
            SessionState::Disposed => "disposed",
        }
    }
}

/// What the session did with an inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handled {
    Rendered,
    Saved,
    DirtyChanged(bool),
    /// The content asked the host to close this editor.
    CloseRequested,
    /// The session is disposed; the message was discarded.
    Ignored,
}

#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    pub relative_app_name: bool,
}

impl From<&HostSettings> for SessionOptions {
    fn from(settings: &HostSettings) -> Self {
        Self {
            relative_app_name: settings.relative_app_name,
        }
    }
}

struct Core {
    state: SessionState,
    modified: bool,
    content: Option<String>,
    pending_save: Option<String>,
    /// Bumped on every change notification from the store.
    external_revision: u64,
    latest_external: Option<String>,
}

pub struct EditorSession {
    id: Uuid,
    file: EditorFile,
    project_root: PathBuf,
    options: SessionOptions,
    store: Arc<dyn DocumentStore>,
    outbound: OutboundSender,
    turn: Mutex<()>,
    core: Arc<Mutex<Core>>,
    document_subscription: Mutex<Option<Subscription>>,
}

impl EditorSession {
    /// Create a session for `file` and subscribe to changes of its document.
    pub fn open(
        file: EditorFile,
        project_root: impl Into<PathBuf>,
        store: Arc<dyn DocumentStore>,
        outbound: OutboundSender,
        options: SessionOptions,
    ) -> Result<Arc<Self>> {
        let id = Uuid::new_v4();
        let core = Arc::new(Mutex::new(Core {
            state: SessionState::Uninitialized,
            modified: false,
            content: None,
            pending_save: None,
            external_revision: 0,
            latest_external: None,
        }));

        let listener: ChangeListener = {
            let core = Arc::clone(&core);
            let outbound = outbound.clone();
            Arc::new(move |text: &str| forward_external_change(id, &core, &outbound, text))
        };
        let subscription = store.on_change(file.path(), listener)?;

        log::info!("[{}] Opened editor session for {}", id, file.path().display());

        Ok(Arc::new(Self {
            id,
            file,
            project_root: project_root.into(),
            options,
            store,
            outbound,
            turn: Mutex::new(()),
            core,
            document_subscription: Mutex::new(Some(subscription)),
        }))
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn file(&self) -> &EditorFile {
        &self.file
    }

    pub fn state(&self) -> SessionState {
        self.core.lock().state
    }

    pub fn is_modified(&self) -> bool {
        self.core.lock().modified
    }

    /// Last content rendered, saved or received from the document store.
    pub fn content(&self) -> Option<String> {
        self.core.lock().content.clone()
    }

    /// A handle onto this session's outbound queue.
    pub fn outbound(&self) -> OutboundSender {
        self.outbound.clone()
    }

    /// Decode and handle one raw message posted by the content. Decode
    /// failures are logged and returned; they never change session state.
    /// Anything arriving after dispose is ignored without being decoded.
    pub fn handle_inbound(&self, raw: &str) -> Result<Handled> {
        if self.state() == SessionState::Disposed {
            log::debug!("[{}] Ignoring inbound message after dispose", self.id);
            return Ok(Handled::Ignored);
        }
        let message = match codec::decode(raw) {
            Ok(message) => message,
            Err(e) => {
                log::warn!("[{}] Dropping inbound message: {}", self.id, e);
                return Err(e);
            }
        };
        self.handle_message(message)
    }

    pub fn handle_message(&self, message: BridgeMessage) -> Result<Handled> {
        let _turn = self.turn.lock();
        if self.state() == SessionState::Disposed {
            log::debug!(
                "[{}] Ignoring {} after dispose",
                self.id,
                message.message_type()
            );
            return Ok(Handled::Ignored);
        }
        log::info!("[{}] {}", self.id, message.message_type());

        match message {
            BridgeMessage::Init => self.render().inspect_err(|e| {
                log::error!("[{}] Failed to render {}: {}", self.id, self.file.name(), e);
            }),
            BridgeMessage::Save { file_content } => self.save(file_content),
            BridgeMessage::FileDirty { dirty } => self.set_dirty(dirty),
            BridgeMessage::Close => Ok(Handled::CloseRequested),
            other => {
                let e = BridgeError::Decode(format!(
                    "{} is not an inbound message",
                    other.message_type()
                ));
                log::warn!("[{}] Dropping inbound message: {}", self.id, e);
                Err(e)
            }
        }
    }

    fn render(&self) -> Result<Handled> {
        let state = self.state();
        if !matches!(state, SessionState::Uninitialized | SessionState::Rendered) {
            return Err(invalid("init", state));
        }

        let revision = self.core.lock().external_revision;
        let mut payload = self.build_render()?;

        let mut core = self.core.lock();
        // The document changed while it was being read; the payload is stale.
        if core.external_revision != revision {
            if let Some(latest) = &core.latest_external {
                payload.file_content = latest.clone();
            }
        }
        core.content = Some(payload.file_content.clone());
        core.state = SessionState::Rendered;
        self.outbound.send_message(BridgeMessage::Render(payload));
        Ok(Handled::Rendered)
    }

    fn build_render(&self) -> Result<RenderPayload> {
        let file_content = self.store.read_to_string(self.file.path())?;

        let env_path = self.file.env_file_path();
        let env_file_content = if self.store.exists(&env_path) {
            Some(self.store.read_to_string(&env_path)?)
        } else {
            None
        };

        let resolved = percyrc::resolve(self.store.as_ref(), &self.file, &self.project_root)?;
        log::debug!(
            "[{}] Merged {} .percyrc file(s)",
            self.id,
            resolved.sources.len()
        );

        Ok(RenderPayload {
            edit_mode: true,
            env_file_mode: self.file.is_env_file(),
            app_name: util::app_name(
                self.file.parent(),
                &self.project_root,
                self.options.relative_app_name,
            ),
            file_name: self.file.name().to_string(),
            path_sep: util::path_separator(),
            file_content,
            env_file_content,
            percy_config: resolved.percy_config,
            app_percy_config: resolved.app_percy_config,
        })
    }

    fn save(&self, file_content: String) -> Result<Handled> {
        let previous = {
            let mut core = self.core.lock();
            if !matches!(core.state, SessionState::Rendered | SessionState::Editing) {
                return Err(invalid("save", core.state));
            }
            let previous = core.state;
            core.state = SessionState::Saving;
            core.pending_save = Some(file_content.clone());
            previous
        };

        log::info!("[{}] Saving {}", self.id, self.file.path().display());
        let path = self.file.path();
        let result = self
            .store
            .with_write_scope(&mut |scope| scope.write_all(path, file_content.as_bytes()));

        let mut core = self.core.lock();
        core.pending_save = None;
        match result {
            Ok(()) => {
                core.state = SessionState::Rendered;
                core.modified = false;
                core.content = Some(file_content.clone());
                self.outbound.send_message(BridgeMessage::Saved {
                    file_content,
                    new_file_name: self.file.name().to_string(),
                });
                Ok(Handled::Saved)
            }
            Err(e) => {
                core.state = previous;
                self.outbound.send_message(BridgeMessage::SaveCancelled);
                log::error!("[{}] Save failed: {}", self.id, e);
                Err(e)
            }
        }
    }

    fn set_dirty(&self, dirty: bool) -> Result<Handled> {
        let mut core = self.core.lock();
        match core.state {
            SessionState::Uninitialized => Err(invalid("file-dirty", core.state)),
            SessionState::Rendered | SessionState::Editing => {
                core.modified = dirty;
                core.state = if dirty {
                    SessionState::Editing
                } else {
                    SessionState::Rendered
                };
                log::info!("[{}] modified: {}", self.id, dirty);
                Ok(Handled::DirtyChanged(dirty))
            }
            SessionState::Saving | SessionState::Disposed => {
                core.modified = dirty;
                Ok(Handled::DirtyChanged(dirty))
            }
        }
    }

    /// Release the document subscription and stop accepting messages.
    /// Calling it again is a no-op.
    pub fn dispose(&self) -> Result<()> {
        let _turn = self.turn.lock();
        {
            let mut core = self.core.lock();
            if core.state == SessionState::Disposed {
                return Ok(());
            }
            core.state = SessionState::Disposed;
        }
        log::info!("[{}] Disposing editor session", self.id);
        match self.document_subscription.lock().take() {
            Some(subscription) => subscription.unsubscribe(),
            None => Ok(()),
        }
    }
}

fn invalid(operation: &'static str, state: SessionState) -> BridgeError {
    BridgeError::InvalidState {
        operation,
        state: state.as_str(),
    }
}

fn forward_external_change(id: Uuid, core: &Mutex<Core>, outbound: &OutboundSender, text: &str) {
    let mut core = core.lock();
    if core.state == SessionState::Disposed {
        return;
    }
    core.external_revision += 1;
    core.latest_external = Some(text.to_string());
    if core.state == SessionState::Uninitialized {
        return;
    }
    // Echo of our own write, or nothing actually changed.
    if core.pending_save.as_deref() == Some(text) || core.content.as_deref() == Some(text) {
        return;
    }
    log::info!("[{}] Document changed outside the editor", id);
    core.content = Some(text.to_string());
    outbound.send_message(BridgeMessage::FileChanged {
        file_content: text.to_string(),
    });
}
