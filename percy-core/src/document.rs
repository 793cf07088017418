//! Host Document Store: the host's view of open file buffers.
//!
//! The editor bridge never touches files directly. Every read, every
//! transactional write and every change notification goes through a
//! [`DocumentStore`], so an IDE can plug in its own document model while the
//! standalone host uses [`crate::fs_store::FsDocumentStore`].

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{BridgeError, Result};
use crate::subscription::Subscription;

/// Callback invoked with the full new text of a changed document.
pub type ChangeListener = Arc<dyn Fn(&str) + Send + Sync>;

/// Writes staged inside [`DocumentStore::with_write_scope`].
pub trait WriteScope {
    fn write_all(&mut self, path: &Path, bytes: &[u8]) -> Result<()>;
}

pub trait DocumentStore: Send + Sync {
    fn read_all(&self, path: &Path) -> Result<Vec<u8>>;

    fn exists(&self, path: &Path) -> bool;

    /// Run `f` inside a transactional write scope. Writes staged by `f` are
    /// applied only if `f` returns `Ok`; nothing is applied otherwise. A store
    /// that cannot apply a staged write reports it without applying any of
    /// the others, except where its own docs say otherwise.
    fn with_write_scope(
        &self,
        f: &mut dyn FnMut(&mut dyn WriteScope) -> Result<()>,
    ) -> Result<()>;

    /// Register `listener` for changes to `path`. The listener is removed when
    /// the returned subscription is released.
    fn on_change(&self, path: &Path, listener: ChangeListener) -> Result<Subscription>;

    fn write_all(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        self.with_write_scope(&mut |scope| scope.write_all(path, bytes))
    }

    fn read_to_string(&self, path: &Path) -> Result<String> {
        let bytes = self.read_all(path)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MemoryInner {
    files: HashMap<PathBuf, Vec<u8>>,
    read_only: HashSet<PathBuf>,
    listeners: HashMap<PathBuf, Vec<(u64, ChangeListener)>>,
    next_listener_id: u64,
}

/// Document store backed by a map of path to bytes.
///
/// Used by hosts that keep buffers in memory and by tests. Paths marked with
/// [`MemoryDocumentStore::set_read_only`] reject writes with
/// [`BridgeError::WriteConflict`].
#[derive(Clone, Default)]
pub struct MemoryDocumentStore {
    inner: Arc<Mutex<MemoryInner>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a document without notifying listeners.
    pub fn insert(&self, path: impl Into<PathBuf>, text: impl Into<String>) {
        self.inner
            .lock()
            .files
            .insert(path.into(), text.into().into_bytes());
    }

    pub fn set_read_only(&self, path: impl Into<PathBuf>, read_only: bool) {
        let path = path.into();
        let mut inner = self.inner.lock();
        if read_only {
            inner.read_only.insert(path);
        } else {
            inner.read_only.remove(&path);
        }
    }

    /// Replace a document as an outside editor would, notifying listeners.
    pub fn edit(&self, path: impl Into<PathBuf>, text: impl Into<String>) {
        let path = path.into();
        let text = text.into();
        self.inner
            .lock()
            .files
            .insert(path.clone(), text.clone().into_bytes());
        self.notify(&path, &text);
    }

    pub fn text(&self, path: &Path) -> Option<String> {
        self.inner
            .lock()
            .files
            .get(path)
            .map(|b| String::from_utf8_lossy(b).into_owned())
    }

    pub fn listener_count(&self, path: &Path) -> usize {
        self.inner
            .lock()
            .listeners
            .get(path)
            .map(Vec::len)
            .unwrap_or(0)
    }

    fn notify(&self, path: &Path, text: &str) {
        // Clone listeners out so callbacks run without the store lock held.
        let listeners: Vec<ChangeListener> = self
            .inner
            .lock()
            .listeners
            .get(path)
            .map(|l| l.iter().map(|(_, cb)| cb.clone()).collect())
            .unwrap_or_default();
        for listener in listeners {
            listener(text);
        }
    }
}

struct MemoryScope<'a> {
    store: &'a MemoryDocumentStore,
    staged: Vec<(PathBuf, Vec<u8>)>,
}

impl WriteScope for MemoryScope<'_> {
    fn write_all(&mut self, path: &Path, bytes: &[u8]) -> Result<()> {
        if self.store.inner.lock().read_only.contains(path) {
            return Err(BridgeError::WriteConflict(format!(
                "{} is read-only",
                path.display()
            )));
        }
        self.staged.push((path.to_path_buf(), bytes.to_vec()));
        Ok(())
    }
}

impl DocumentStore for MemoryDocumentStore {
    fn read_all(&self, path: &Path) -> Result<Vec<u8>> {
        self.inner.lock().files.get(path).cloned().ok_or_else(|| {
            BridgeError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} not found", path.display()),
            ))
        })
    }

    fn exists(&self, path: &Path) -> bool {
        self.inner.lock().files.contains_key(path)
    }

    fn with_write_scope(
        &self,
        f: &mut dyn FnMut(&mut dyn WriteScope) -> Result<()>,
    ) -> Result<()> {
        let mut scope = MemoryScope {
            store: self,
            staged: Vec::new(),
        };
        f(&mut scope)?;
        let staged = scope.staged;

        {
            let mut inner = self.inner.lock();
            for (path, bytes) in &staged {
                inner.files.insert(path.clone(), bytes.clone());
            }
        }
        for (path, bytes) in &staged {
            self.notify(path, &String::from_utf8_lossy(bytes));
        }
        Ok(())
    }

    fn on_change(&self, path: &Path, listener: ChangeListener) -> Result<Subscription> {
        let id = {
            let mut inner = self.inner.lock();
            let id = inner.next_listener_id;
            inner.next_listener_id += 1;
            inner
                .listeners
                .entry(path.to_path_buf())
                .or_default()
                .push((id, listener));
            id
        };

        let inner = Arc::clone(&self.inner);
        let path = path.to_path_buf();
        Ok(Subscription::new("document", move || {
            let mut inner = inner.lock();
            if let Some(listeners) = inner.listeners.get_mut(&path) {
                listeners.retain(|(lid, _)| *lid != id);
                if listeners.is_empty() {
                    inner.listeners.remove(&path);
                }
            }
            Ok(())
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder() -> (ChangeListener, Arc<Mutex<Vec<String>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        let listener: ChangeListener = Arc::new(move |text: &str| s.lock().push(text.to_string()));
        (listener, seen)
    }

    #[test]
    fn write_scope_commits_on_success() {
        let store = MemoryDocumentStore::new();
        let path = Path::new("/app/config.yaml");
        store.insert(path, "old");

        store.write_all(path, b"new").unwrap();
        assert_eq!(store.text(path).as_deref(), Some("new"));
    }

    #[test]
    fn failed_scope_applies_nothing() {
        let store = MemoryDocumentStore::new();
        let a = Path::new("/app/a.yaml");
        let b = Path::new("/app/b.yaml");
        store.insert(a, "a");
        store.insert(b, "b");
        store.set_read_only(b, true);

        let result = store.with_write_scope(&mut |scope| {
            scope.write_all(a, b"a2")?;
            scope.write_all(b, b"b2")
        });

        assert!(matches!(result, Err(BridgeError::WriteConflict(_))));
        assert_eq!(store.text(a).as_deref(), Some("a"));
        assert_eq!(store.text(b).as_deref(), Some("b"));
    }

    #[test]
    fn missing_document_is_io_error() {
        let store = MemoryDocumentStore::new();
        assert!(matches!(
            store.read_all(Path::new("/nope.yaml")),
            Err(BridgeError::Io(_))
        ));
        assert!(!store.exists(Path::new("/nope.yaml")));
    }

    #[test]
    fn listeners_see_edits_and_commits() {
        let store = MemoryDocumentStore::new();
        let path = Path::new("/app/config.yaml");
        store.insert(path, "v1");
        let (listener, seen) = recorder();
        let _sub = store.on_change(path, listener).unwrap();

        store.edit(path, "v2");
        store.write_all(path, b"v3").unwrap();

        assert_eq!(*seen.lock(), vec!["v2".to_string(), "v3".to_string()]);
    }

    #[test]
    fn unsubscribe_removes_listener() {
        let store = MemoryDocumentStore::new();
        let path = Path::new("/app/config.yaml");
        let (listener, seen) = recorder();
        let sub = store.on_change(path, listener).unwrap();
        assert_eq!(store.listener_count(path), 1);

        sub.unsubscribe().unwrap();
        store.edit(path, "ignored");

        assert_eq!(store.listener_count(path), 0);
        assert!(seen.lock().is_empty());
    }
}
