//! Blob store: byte-level filesystem access under a base directory.
//!
//! Everything above this layer works with store-relative path strings
//! (e.g. `filesystem/alice/personal/note`); no encryption happens here.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::error::VaultError;

/// Name of the advisory session lock file, next to `filesystem/`.
const LOCK_FILE: &str = ".vaultfs.lock";

// ---------------------------------------------------------------------------
// Blob store
// ---------------------------------------------------------------------------

pub struct BlobStore {
    root: PathBuf,
}

impl BlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute location of a store-relative path.
    pub fn abs(&self, rel: &str) -> PathBuf {
        self.root.join(rel)
    }

    pub fn exists(&self, rel: &str) -> bool {
        self.abs(rel).is_file()
    }

    pub fn is_directory(&self, rel: &str) -> bool {
        self.abs(rel).is_dir()
    }

    /// Entry names of a directory, sorted for stable listings.
    pub fn list(&self, rel: &str) -> Result<Vec<String>, VaultError> {
        let mut names = Vec::new();
        for entry in fs::read_dir(self.abs(rel))? {
            let entry = entry?;
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }

    /// Read a whole file. A missing file is `NotFound`.
    pub fn read_all(&self, rel: &str) -> Result<Vec<u8>, VaultError> {
        match fs::read(self.abs(rel)) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(VaultError::NotFound(rel.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Replace a file's contents atomically: write to a sibling temp file,
    /// then rename into place. A crash leaves either the old content or
    /// the new content, never a torn write.
    pub fn write_all_atomic(&self, rel: &str, bytes: &[u8]) -> Result<(), VaultError> {
        let path = self.abs(rel);
        let tmp = tmp_path(&path);
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    pub fn remove(&self, rel: &str) -> Result<(), VaultError> {
        fs::remove_file(self.abs(rel))?;
        Ok(())
    }

    /// Create a directory and any missing parents.
    pub fn create_directory(&self, rel: &str) -> Result<(), VaultError> {
        fs::create_dir_all(self.abs(rel))?;
        Ok(())
    }

    /// Hard-link `existing` at `link`, so both names share one body.
    pub fn create_hard_link(&self, existing: &str, link: &str) -> Result<(), VaultError> {
        fs::hard_link(self.abs(existing), self.abs(link))?;
        Ok(())
    }

    /// Take the advisory session lock for this store. The lock is held
    /// until the returned guard is dropped; a conflicting holder means
    /// another session is live.
    pub fn lock_session(&self) -> Result<StoreLock, VaultError> {
        let path = self.root.join(LOCK_FILE);
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .open(&path)?;
        file.try_lock_exclusive()
            .map_err(|_| VaultError::StoreBusy(path.display().to_string()))?;
        Ok(StoreLock { _file: file })
    }
}

/// Sibling temp path used by [`BlobStore::write_all_atomic`]; staying in
/// the same directory keeps the final rename atomic.
fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    name.push_str(".tmp");
    path.with_file_name(name)
}

// ---------------------------------------------------------------------------
// Session lock guard
// ---------------------------------------------------------------------------

/// Holds the exclusive store lock; released on drop.
pub struct StoreLock {
    _file: File,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, BlobStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = BlobStore::new(dir.path());
        (dir, store)
    }

    #[test]
    fn write_read_roundtrip() {
        let (_dir, store) = store();
        store.create_directory("a/b").unwrap();
        store.write_all_atomic("a/b/file", b"bytes").unwrap();
        assert!(store.exists("a/b/file"));
        assert!(store.is_directory("a/b"));
        assert_eq!(store.read_all("a/b/file").unwrap(), b"bytes");
    }

    #[test]
    fn read_missing_is_not_found() {
        let (_dir, store) = store();
        assert!(matches!(
            store.read_all("nope"),
            Err(VaultError::NotFound(_))
        ));
    }

    #[test]
    fn atomic_write_replaces_content() {
        let (_dir, store) = store();
        store.write_all_atomic("f", b"one").unwrap();
        store.write_all_atomic("f", b"two").unwrap();
        assert_eq!(store.read_all("f").unwrap(), b"two");
        // No temp residue left behind.
        assert!(!store.exists("f.tmp"));
    }

    #[test]
    fn hard_link_shares_body() {
        let (_dir, store) = store();
        store.write_all_atomic("src", b"shared").unwrap();
        store.create_hard_link("src", "dst").unwrap();
        assert_eq!(store.read_all("dst").unwrap(), b"shared");
    }

    #[test]
    fn list_is_sorted() {
        let (_dir, store) = store();
        store.create_directory("d").unwrap();
        store.write_all_atomic("d/b", b"").unwrap();
        store.write_all_atomic("d/a", b"").unwrap();
        assert_eq!(store.list("d").unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn second_lock_is_store_busy() {
        let (_dir, store) = store();
        let _held = store.lock_session().unwrap();
        assert!(matches!(
            store.lock_session(),
            Err(VaultError::StoreBusy(_))
        ));
    }
}
