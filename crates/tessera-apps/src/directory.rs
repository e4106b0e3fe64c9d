//! Service directory.
//!
//! Resolves service names to base URLs for remote dispatch. While started,
//! the directory keeps a JSON snapshot of its entries in a private
//! coordination directory that is removed on stop.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use parking_lot::{Mutex, RwLock};
use tempfile::TempDir;

const SNAPSHOT_FILE: &str = "services.json";

/// Name -> base URL.
#[derive(Debug, Default)]
pub struct ServiceDirectory {
    entries: RwLock<BTreeMap<String, String>>,
    coordination: Mutex<Option<TempDir>>,
}

impl ServiceDirectory {
    /// An empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A directory preloaded with `entries`.
    pub fn with_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let directory = Self::new();
        for (name, url) in entries {
            directory.register(name, url);
        }
        directory
    }

    /// Registers or replaces `name`.
    pub fn register(&self, name: impl Into<String>, url: impl Into<String>) {
        let name = name.into();
        let url = url.into().trim_end_matches('/').to_string();
        tracing::debug!(service = %name, %url, "Service registered");
        self.entries.write().insert(name, url);

        if let Err(e) = self.write_snapshot() {
            tracing::warn!(error = %e, "Unable to write service directory snapshot");
        }
    }

    /// Base URL of `name`.
    pub fn resolve(&self, name: &str) -> Option<String> {
        self.entries.read().get(name).cloned()
    }

    /// Registered names.
    pub fn services(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }

    /// Creates the coordination directory and writes the first snapshot.
    /// Starting twice is a no-op.
    pub fn start(&self) -> io::Result<()> {
        {
            let mut coordination = self.coordination.lock();
            if coordination.is_some() {
                return Ok(());
            }
            let dir = tempfile::Builder::new().prefix("tessera-directory").tempdir()?;
            tracing::info!(path = %dir.path().display(), "Using coordination directory");
            *coordination = Some(dir);
        }
        self.write_snapshot()
    }

    /// Removes the coordination directory.
    pub fn stop(&self) {
        let Some(dir) = self.coordination.lock().take() else {
            return;
        };
        let path = dir.path().to_path_buf();
        if let Err(e) = dir.close() {
            tracing::warn!(path = %path.display(), error = %e, "Unable to delete coordination directory");
        }
    }

    /// Path of the snapshot file while started.
    pub fn snapshot_path(&self) -> Option<PathBuf> {
        self.coordination
            .lock()
            .as_ref()
            .map(|dir| dir.path().join(SNAPSHOT_FILE))
    }

    fn write_snapshot(&self) -> io::Result<()> {
        let Some(path) = self.snapshot_path() else {
            return Ok(());
        };
        let body = serde_json::to_vec_pretty(&*self.entries.read())?;
        write_atomic(&path, &body)
    }
}

fn write_atomic(path: &Path, body: &[u8]) -> io::Result<()> {
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, body)?;
    std::fs::rename(tmp, path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_resolve() {
        let directory = ServiceDirectory::with_entries([("echo", "http://127.0.0.1:9090/")]);
        assert_eq!(
            directory.resolve("echo").as_deref(),
            Some("http://127.0.0.1:9090")
        );
        assert!(directory.resolve("employees").is_none());
        assert_eq!(directory.services(), vec!["echo"]);
    }

    #[test]
    fn test_snapshot_lifecycle() {
        let directory = ServiceDirectory::new();
        assert!(directory.snapshot_path().is_none());

        directory.start().unwrap();
        directory.start().unwrap();
        directory.register("employees", "http://10.0.0.1:8080");

        let path = directory.snapshot_path().unwrap();
        let snapshot: BTreeMap<String, String> =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(snapshot["employees"], "http://10.0.0.1:8080");

        directory.stop();
        assert!(!path.exists());
        assert!(directory.snapshot_path().is_none());
    }
}
