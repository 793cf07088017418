use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use notify::{RecursiveMode, Watcher};
use parking_lot::Mutex;
use tempfile::NamedTempFile;

use crate::document::{ChangeListener, DocumentStore, WriteScope};
use crate::error::{BridgeError, Result};
use crate::subscription::Subscription;

/// Document store reading and writing files on local disk.
///
/// Each committed file is written to a temporary sibling and renamed over the
/// target, so readers never observe a partially written document. All
/// temporaries of a scope are written before the first rename; a rename that
/// fails part-way leaves the files renamed before it applied. Change
/// notifications come from a `notify` watcher on the file's directory, which
/// keeps working when other editors replace the file instead of rewriting it.
#[derive(Debug, Default, Clone)]
pub struct FsDocumentStore;

impl FsDocumentStore {
    pub fn new() -> Self {
        Self
    }
}

struct FsScope {
    staged: Vec<(PathBuf, Vec<u8>)>,
}

impl WriteScope for FsScope {
    fn write_all(&mut self, path: &Path, bytes: &[u8]) -> Result<()> {
        if let Ok(meta) = std::fs::metadata(path) {
            if meta.is_dir() {
                return Err(BridgeError::InvalidPath(format!(
                    "{} is a directory",
                    path.display()
                )));
            }
            if meta.permissions().readonly() {
                return Err(BridgeError::WriteConflict(format!(
                    "{} is read-only",
                    path.display()
                )));
            }
        }
        self.staged.push((path.to_path_buf(), bytes.to_vec()));
        Ok(())
    }
}

/// Write `bytes` to a synced temporary sibling of `path`, ready to be renamed
/// over it.
fn stage_file(path: &Path, bytes: &[u8]) -> Result<NamedTempFile> {
    let dir = path
        .parent()
        .ok_or_else(|| BridgeError::InvalidPath(format!("{} has no parent", path.display())))?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    if let Ok(meta) = std::fs::metadata(path) {
        tmp.as_file().set_permissions(meta.permissions())?;
    }
    Ok(tmp)
}

impl DocumentStore for FsDocumentStore {
    fn read_all(&self, path: &Path) -> Result<Vec<u8>> {
        Ok(std::fs::read(path)?)
    }

    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn with_write_scope(
        &self,
        f: &mut dyn FnMut(&mut dyn WriteScope) -> Result<()>,
    ) -> Result<()> {
        let mut scope = FsScope { staged: Vec::new() };
        f(&mut scope)?;

        // Unpersisted temporaries are removed on drop.
        let mut prepared = Vec::with_capacity(scope.staged.len());
        for (path, bytes) in &scope.staged {
            prepared.push((path, bytes.len(), stage_file(path, bytes)?));
        }
        for (path, len, tmp) in prepared {
            tmp.persist(path).map_err(|e| BridgeError::Io(e.error))?;
            log::debug!("Wrote {} bytes to {}", len, path.display());
        }
        Ok(())
    }

    fn on_change(&self, path: &Path, listener: ChangeListener) -> Result<Subscription> {
        let dir = path
            .parent()
            .ok_or_else(|| BridgeError::InvalidPath(format!("{} has no parent", path.display())))?
            .to_path_buf();
        let file_name = path
            .file_name()
            .ok_or_else(|| BridgeError::InvalidPath(format!("{} has no file name", path.display())))?
            .to_os_string();

        let target = path.to_path_buf();
        let last_seen: Arc<Mutex<Option<String>>> =
            Arc::new(Mutex::new(std::fs::read_to_string(path).ok()));

        let mut watcher =
            notify::recommended_watcher(move |res: std::result::Result<notify::Event, notify::Error>| {
                let event = match res {
                    Ok(event) => event,
                    Err(e) => {
                        log::warn!("File watcher error for {}: {}", target.display(), e);
                        return;
                    }
                };
                if !matches!(
                    event.kind,
                    notify::EventKind::Create(_) | notify::EventKind::Modify(_)
                ) {
                    return;
                }
                if !event
                    .paths
                    .iter()
                    .any(|p| p.file_name() == Some(file_name.as_os_str()))
                {
                    return;
                }
                let text = match std::fs::read_to_string(&target) {
                    Ok(text) => text,
                    Err(e) => {
                        log::debug!("Skipping change of {}: {}", target.display(), e);
                        return;
                    }
                };
                {
                    let mut last = last_seen.lock();
                    if last.as_deref() == Some(text.as_str()) {
                        return;
                    }
                    *last = Some(text.clone());
                }
                listener(&text);
            })?;

        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        Ok(Subscription::new("document", move || {
            watcher.unwatch(&dir)?;
            Ok(())
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "a: 1\n").unwrap();
        let store = FsDocumentStore::new();

        store.write_all(&path, b"a: 2\n").unwrap();

        assert_eq!(store.read_to_string(&path).unwrap(), "a: 2\n");
    }

    #[test]
    fn write_creates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("new.yaml");
        let store = FsDocumentStore::new();

        assert!(!store.exists(&path));
        store.write_all(&path, b"x: y\n").unwrap();
        assert!(store.exists(&path));
    }

    #[test]
    fn failed_scope_leaves_file_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "original").unwrap();
        let store = FsDocumentStore::new();

        let result = store.with_write_scope(&mut |scope| {
            scope.write_all(&path, b"changed")?;
            Err(BridgeError::WriteConflict("host refused".into()))
        });

        assert!(result.is_err());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "original");
    }

    #[test]
    fn unwritable_second_file_leaves_first_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("a.yaml");
        std::fs::write(&first, "original").unwrap();
        let second = dir.path().join("missing").join("b.yaml");
        let store = FsDocumentStore::new();

        let result = store.with_write_scope(&mut |scope| {
            scope.write_all(&first, b"changed")?;
            scope.write_all(&second, b"new")
        });

        assert!(matches!(result, Err(BridgeError::Io(_))));
        assert_eq!(std::fs::read_to_string(&first).unwrap(), "original");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn read_only_file_is_write_conflict() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("locked.yaml");
        std::fs::write(&path, "locked").unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_readonly(true);
        std::fs::set_permissions(&path, perms).unwrap();
        let store = FsDocumentStore::new();

        let result = store.write_all(&path, b"nope");

        assert!(matches!(result, Err(BridgeError::WriteConflict(_))));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "locked");
    }

    #[test]
    fn missing_file_read_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsDocumentStore::new();
        assert!(matches!(
            store.read_all(&dir.path().join("missing.yaml")),
            Err(BridgeError::Io(_))
        ));
    }

    #[test]
    fn on_change_subscription_can_be_released() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "a: 1").unwrap();
        let store = FsDocumentStore::new();

        let sub = store.on_change(&path, Arc::new(|_text: &str| {})).unwrap();
        assert!(sub.is_active());
        assert!(sub.unsubscribe().is_ok());
    }
}
