//! C-compatible FFI wrappers around percy-core and percy-editor.
//!
//! Hosts that embed their own browser (JCEF, JavaFX, CEF proxies) drive the
//! editor bridge through this API. Strings cross the boundary as C strings;
//! structured values are JSON. Callers must free returned strings with
//! `percy_free_string`.
//!
//! All extern "C" functions are wrapped in `ffi_catch` to prevent Rust
//! panics from crossing the FFI boundary (which is undefined behavior).
//! Panic payloads are logged before returning the fallback value.
//!
//! Note: `extern "C"` functions cannot be marked `unsafe` since they are
//! called from C. Raw pointer dereferences inside `ffi_catch` are guarded by
//! null checks.
#![allow(clippy::not_unsafe_ptr_arg_deref)]

use std::collections::HashMap;
use std::ffi::{c_void, CStr, CString};
use std::os::raw::{c_char, c_int};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;

use percy_core::document::DocumentStore;
use percy_core::editor_file::{self, EditorFile};
use percy_core::error::{BridgeError, Result};
use percy_core::fs_store::FsDocumentStore;
use percy_core::settings::{self, HostSettings};
use percy_editor::assets::{self, AssetServer};
use percy_editor::channel::{ContentChannel, InboundHandler};
use percy_editor::theme::ThemeState;
use percy_editor::{outbound, protocol, EditorBridge, EditorSession, SessionOptions};

/// Run `f` inside `catch_unwind`, logging the panic payload before returning the
/// fallback value.
fn ffi_catch<T>(fallback: T, f: impl FnOnce() -> T + std::panic::UnwindSafe) -> T {
    match catch_unwind(f) {
        Ok(v) => v,
        Err(payload) => {
            let msg = if let Some(s) = payload.downcast_ref::<&str>() {
                s.to_string()
            } else if let Some(s) = payload.downcast_ref::<String>() {
                s.clone()
            } else {
                "unknown panic payload".to_string()
            };
            log::error!("FFI panic caught: {}", msg);
            fallback
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn to_rust_str(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    // SAFETY: Caller guarantees `ptr` is a valid, null-terminated C string
    // whose memory remains valid for the duration of this call.
    unsafe { CStr::from_ptr(ptr) }
        .to_str()
        .ok()
        .map(String::from)
}

fn to_c_string(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cs) => cs.into_raw(),
        Err(_) => {
            log::warn!(
                "String contains interior NUL bytes, sanitizing ({} chars)",
                s.len()
            );
            let sanitized: String = s.chars().filter(|&c| c != '\0').collect();
            CString::new(sanitized).unwrap_or_default().into_raw()
        }
    }
}

fn error_json(error: &BridgeError) -> *mut c_char {
    to_c_string(&serde_json::json!({ "error": error.to_string() }).to_string())
}

// ---------------------------------------------------------------------------
// Memory management
// ---------------------------------------------------------------------------

/// Free a string previously returned by a `percy_*` function.
#[no_mangle]
pub extern "C" fn percy_free_string(s: *mut c_char) {
    ffi_catch(
        (),
        AssertUnwindSafe(|| {
            if !s.is_null() {
                // SAFETY: `s` was previously returned by `CString::into_raw` from
                // one of the `percy_*` functions, so it is valid to reclaim it.
                unsafe {
                    drop(CString::from_raw(s));
                }
            }
        }),
    );
}

// ---------------------------------------------------------------------------
// Engine lifecycle
// ---------------------------------------------------------------------------

/// Process-wide state shared by every session.
#[derive(Clone)]
struct Engine {
    settings: HostSettings,
    theme: ThemeState,
    assets: AssetServer,
    store: Arc<dyn DocumentStore>,
}

fn engine_slot() -> &'static Mutex<Option<Engine>> {
    static ENGINE: OnceLock<Mutex<Option<Engine>>> = OnceLock::new();
    ENGINE.get_or_init(|| Mutex::new(None))
}

/// Copy of the engine state. Never hold the engine lock while calling back
/// into the host.
fn engine() -> Result<Engine> {
    engine_slot().lock().clone().ok_or(BridgeError::NotInitialized)
}

/// Initialize the engine.
///
/// `settings_json` overrides the settings file; pass null to load
/// them from the platform config directory. Calling it again replaces the
/// settings for sessions created afterwards.
///
/// Returns 0 on success, -1 if `settings_json` is not valid settings JSON.
#[no_mangle]
pub extern "C" fn percy_init(settings_json: *const c_char) -> c_int {
    ffi_catch(
        -1,
        AssertUnwindSafe(|| {
            let settings = match to_rust_str(settings_json) {
                Some(json) => match settings::parse(&json) {
                    Ok(s) => s,
                    Err(e) => {
                        log::error!("Invalid settings JSON: {}", e);
                        return -1;
                    }
                },
                None => settings::load(),
            };

            let _ = env_logger::Builder::new()
                .parse_filters(&settings.log_filter)
                .try_init();

            let mut slot = engine_slot().lock();
            let theme = match slot.as_ref() {
                Some(existing) => existing.theme.clone(),
                None => ThemeState::new(false),
            };
            *slot = Some(Engine {
                assets: AssetServer::from_settings(&settings),
                settings,
                theme,
                store: Arc::new(FsDocumentStore::new()),
            });
            log::info!("Percy engine initialized");
            0
        }),
    )
}

/// Dispose every open session and drop the engine. Session handles stay valid
/// until freed but no longer do anything.
#[no_mangle]
pub extern "C" fn percy_shutdown() {
    ffi_catch(
        (),
        AssertUnwindSafe(|| {
            engine_slot().lock().take();
            let entries: Vec<_> = session_registry().lock().values().cloned().collect();
            for entry in entries {
                if let Err(e) = entry.bridge.dispose() {
                    log::warn!("Dispose during shutdown failed: {}", e);
                }
            }
            log::info!("Percy engine shut down");
        }),
    );
}

/// Push the host theme to every open editor.
#[no_mangle]
pub extern "C" fn percy_set_dark_theme(dark: bool) {
    ffi_catch(
        (),
        AssertUnwindSafe(|| match engine() {
            Ok(engine) => engine.theme.set_dark(dark),
            Err(e) => log::warn!("percy_set_dark_theme: {}", e),
        }),
    );
}

// ---------------------------------------------------------------------------
// Content channel backed by a host callback
// ---------------------------------------------------------------------------

/// Load the URL passed as `text` into the browser.
pub const PERCY_CHANNEL_LOAD_URL: c_int = 0;
/// Evaluate the script passed as `text`.
pub const PERCY_CHANNEL_EXECUTE_SCRIPT: c_int = 1;
/// Release the browser; `text` is null.
pub const PERCY_CHANNEL_DISPOSE: c_int = 2;

/// Host callback: `(user_data, command, text)`. Must not block on the
/// session it belongs to.
pub type PercyChannelCallback =
    extern "C" fn(user_data: *mut c_void, command: c_int, text: *const c_char);

struct UserData(*mut c_void);

// SAFETY: the pointer is opaque to Rust and only handed back to the host
// callback; the host owns its thread affinity.
unsafe impl Send for UserData {}
unsafe impl Sync for UserData {}

struct FfiChannel {
    callback: PercyChannelCallback,
    user_data: UserData,
    handler: Mutex<Option<InboundHandler>>,
    disposed: AtomicBool,
}

impl FfiChannel {
    fn call(&self, command: c_int, text: Option<&str>) -> Result<()> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(BridgeError::Channel("channel is disposed".to_string()));
        }
        let text = text
            .map(|t| CString::new(t).map_err(|e| BridgeError::Channel(e.to_string())))
            .transpose()?;
        let ptr = text.as_ref().map_or(std::ptr::null(), |t| t.as_ptr());
        (self.callback)(self.user_data.0, command, ptr);
        Ok(())
    }

    fn deliver(&self, raw: &str) -> Result<()> {
        let handler = self.handler.lock();
        match handler.as_ref() {
            Some(handler) => {
                handler(raw);
                Ok(())
            }
            None => Err(BridgeError::Channel(
                "no inbound handler registered".to_string(),
            )),
        }
    }
}

impl ContentChannel for FfiChannel {
    fn load_url(&self, url: &str) -> Result<()> {
        self.call(PERCY_CHANNEL_LOAD_URL, Some(url))
    }

    fn execute_script(&self, script: &str) -> Result<()> {
        self.call(PERCY_CHANNEL_EXECUTE_SCRIPT, Some(script))
    }

    fn register_inbound_handler(&self, handler: InboundHandler) -> Result<()> {
        *self.handler.lock() = Some(handler);
        Ok(())
    }

    fn dispose(&self) -> Result<()> {
        self.handler.lock().take();
        let result = self.call(PERCY_CHANNEL_DISPOSE, None);
        self.disposed.store(true, Ordering::SeqCst);
        result
    }
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

struct SessionEntry {
    bridge: EditorBridge<FfiChannel>,
}

/// Global registry mapping handle addresses to their sessions.
/// The handle pointer is only used as an opaque key.
fn session_registry() -> &'static Mutex<HashMap<usize, Arc<SessionEntry>>> {
    static REGISTRY: OnceLock<Mutex<HashMap<usize, Arc<SessionEntry>>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Look up a handle and run `f` with its session. Returns `default` if the
/// handle is null or freed.
fn with_session<T>(
    handle: *mut PercySessionHandle,
    default: T,
    f: impl FnOnce(&SessionEntry) -> T,
) -> T {
    if handle.is_null() {
        return default;
    }
    let entry = session_registry().lock().get(&(handle as usize)).cloned();
    match entry {
        Some(entry) => f(&entry),
        None => {
            log::warn!("Attempted to use invalid or freed session handle");
            default
        }
    }
}

/// Opaque handle token for the C API. Never dereferenced.
pub struct PercySessionHandle {
    _private: (),
}

fn open_session(
    file: &str,
    root: &str,
    callback: PercyChannelCallback,
    user_data: *mut c_void,
) -> Result<EditorBridge<FfiChannel>> {
    let engine = engine()?;
    if !editor_file::accepts_file(Path::new(file), engine.settings.max_file_size) {
        return Err(BridgeError::InvalidPath(format!(
            "{} is not an editable YAML file",
            file
        )));
    }

    // `.percyrc` lookup compares ancestors of the file with the root verbatim.
    let file = std::fs::canonicalize(file)?;
    let root = std::fs::canonicalize(root)?;

    let (tx, rx) = outbound::channel();
    let session = EditorSession::open(
        EditorFile::new(file)?,
        root,
        Arc::clone(&engine.store),
        tx,
        SessionOptions::from(&engine.settings),
    )?;
    let channel = FfiChannel {
        callback,
        user_data: UserData(user_data),
        handler: Mutex::new(None),
        disposed: AtomicBool::new(false),
    };
    let url = engine
        .assets
        .url(engine.settings.server_port, assets::INDEX_FILE)?;
    EditorBridge::attach(session, rx, channel, &engine.theme, &url)
}

/// Open an editor session for `file` inside the project rooted at `root`.
///
/// The callback receives the URL to load straight away and scripts whenever
/// `percy_session_pump` runs. Both paths are canonicalized first, so relative
/// and `..` components are accepted. Returns null on failure. Free the handle
/// with `percy_session_free`.
#[no_mangle]
pub extern "C" fn percy_session_new(
    file: *const c_char,
    root: *const c_char,
    callback: Option<PercyChannelCallback>,
    user_data: *mut c_void,
) -> *mut PercySessionHandle {
    ffi_catch(
        std::ptr::null_mut(),
        AssertUnwindSafe(|| {
            let (file, root, callback) = match (to_rust_str(file), to_rust_str(root), callback) {
                (Some(f), Some(r), Some(c)) => (f, r, c),
                _ => return std::ptr::null_mut(),
            };

            let bridge = match open_session(&file, &root, callback, user_data) {
                Ok(bridge) => bridge,
                Err(e) => {
                    log::error!("Failed to open editor for {}: {}", file, e);
                    return std::ptr::null_mut();
                }
            };

            let handle = Box::into_raw(Box::new(PercySessionHandle { _private: () }));
            session_registry()
                .lock()
                .insert(handle as usize, Arc::new(SessionEntry { bridge }));
            handle
        }),
    )
}

/// Hand a message posted by the content to the session.
///
/// Returns 0 when handled, 1 when the content asked to close the editor and
/// -1 if the handle is invalid or the session is disposed. Malformed messages
/// are logged and dropped (0).
#[no_mangle]
pub extern "C" fn percy_session_post_message(
    handle: *mut PercySessionHandle,
    json: *const c_char,
) -> c_int {
    ffi_catch(
        -1,
        AssertUnwindSafe(|| {
            let json = match to_rust_str(json) {
                Some(s) => s,
                None => return -1,
            };
            with_session(handle, -1, |entry| {
                if let Err(e) = entry.bridge.channel().deliver(&json) {
                    log::warn!("percy_session_post_message: {}", e);
                    return -1;
                }
                if entry.bridge.take_close_request() {
                    1
                } else {
                    0
                }
            })
        }),
    )
}

/// Deliver queued outbound scripts through the callback. Call it on the
/// browser's thread, after every `percy_session_post_message` and
/// periodically to pick up external file changes.
///
/// Returns the number of scripts delivered, or -1 for an invalid handle.
#[no_mangle]
pub extern "C" fn percy_session_pump(handle: *mut PercySessionHandle) -> c_int {
    ffi_catch(
        -1,
        AssertUnwindSafe(|| {
            with_session(handle, -1, |entry| {
                c_int::try_from(entry.bridge.pump()).unwrap_or(c_int::MAX)
            })
        }),
    )
}

#[no_mangle]
pub extern "C" fn percy_session_is_modified(handle: *mut PercySessionHandle) -> bool {
    ffi_catch(
        false,
        AssertUnwindSafe(|| {
            with_session(handle, false, |entry| entry.bridge.session().is_modified())
        }),
    )
}

/// Current document text as last rendered, saved or changed on disk. Null
/// before the first render.
#[no_mangle]
pub extern "C" fn percy_session_content(handle: *mut PercySessionHandle) -> *mut c_char {
    ffi_catch(
        std::ptr::null_mut(),
        AssertUnwindSafe(|| {
            with_session(handle, std::ptr::null_mut(), |entry| {
                match entry.bridge.session().content() {
                    Some(content) => to_c_string(&content),
                    None => std::ptr::null_mut(),
                }
            })
        }),
    )
}

#[no_mangle]
pub extern "C" fn percy_session_id(handle: *mut PercySessionHandle) -> *mut c_char {
    ffi_catch(
        std::ptr::null_mut(),
        AssertUnwindSafe(|| {
            with_session(handle, std::ptr::null_mut(), |entry| {
                to_c_string(&entry.bridge.session().id().to_string())
            })
        }),
    )
}

/// Dispose the session and free its handle.
#[no_mangle]
pub extern "C" fn percy_session_free(handle: *mut PercySessionHandle) {
    ffi_catch(
        (),
        AssertUnwindSafe(|| {
            if handle.is_null() {
                return;
            }
            let entry = session_registry().lock().remove(&(handle as usize));
            match entry {
                Some(entry) => {
                    if let Err(e) = entry.bridge.dispose() {
                        log::warn!("Dispose failed while freeing session: {}", e);
                    }
                }
                None => {
                    log::warn!("percy_session_free called on already-freed handle");
                    return; // Don't double-free
                }
            }
            // SAFETY: `handle` was allocated by `Box::into_raw` in `percy_session_new`.
            // The registry removal above ensures this only happens once per handle.
            unsafe {
                drop(Box::from_raw(handle));
            }
        }),
    );
}

// ---------------------------------------------------------------------------
// Static assets and protocol
// ---------------------------------------------------------------------------

/// Response for `percy_serve_asset`. Free with `percy_free_asset`.
#[repr(C)]
pub struct PercyAsset {
    pub status: u16,
    pub content_type: *mut c_char,
    pub body: *mut u8,
    pub body_len: usize,
}

/// Resolve a request path such as `/percy/index.html` for the host's local
/// HTTP endpoint. Returns null if the engine is not initialized.
#[no_mangle]
pub extern "C" fn percy_serve_asset(path: *const c_char) -> *mut PercyAsset {
    ffi_catch(
        std::ptr::null_mut(),
        AssertUnwindSafe(|| {
            let path = match to_rust_str(path) {
                Some(p) => p,
                None => return std::ptr::null_mut(),
            };
            let engine = match engine() {
                Ok(engine) => engine,
                Err(e) => {
                    log::warn!("percy_serve_asset: {}", e);
                    return std::ptr::null_mut();
                }
            };
            let response = engine.assets.serve(&path);
            let body = response.body.into_boxed_slice();
            let body_len = body.len();
            Box::into_raw(Box::new(PercyAsset {
                status: response.status,
                content_type: to_c_string(response.content_type),
                body: Box::into_raw(body) as *mut u8,
                body_len,
            }))
        }),
    )
}

#[no_mangle]
pub extern "C" fn percy_free_asset(asset: *mut PercyAsset) {
    ffi_catch(
        (),
        AssertUnwindSafe(|| {
            if asset.is_null() {
                return;
            }
            // SAFETY: `asset` and its fields were allocated in `percy_serve_asset`
            // and are reclaimed exactly once here.
            unsafe {
                let asset = Box::from_raw(asset);
                percy_free_string(asset.content_type);
                if !asset.body.is_null() {
                    let slice = std::ptr::slice_from_raw_parts_mut(asset.body, asset.body_len);
                    drop(Box::from_raw(slice));
                }
            }
        }),
    );
}

/// URL of a static asset on the host's endpoint, e.g. `index.html`.
/// Returns `{"error": ...}` JSON on failure.
#[no_mangle]
pub extern "C" fn percy_static_url(name: *const c_char) -> *mut c_char {
    ffi_catch(
        std::ptr::null_mut(),
        AssertUnwindSafe(|| {
            let name = match to_rust_str(name) {
                Some(n) => n,
                None => return std::ptr::null_mut(),
            };
            match engine().and_then(|e| e.assets.url(e.settings.server_port, &name)) {
                Ok(url) => to_c_string(&url),
                Err(e) => error_json(&e),
            }
        }),
    )
}

/// JSON Schema of every bridge message.
#[no_mangle]
pub extern "C" fn percy_protocol_schema() -> *mut c_char {
    ffi_catch(
        std::ptr::null_mut(),
        AssertUnwindSafe(|| to_c_string(&protocol::schema().to_string())),
    )
}
