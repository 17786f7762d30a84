//! Per-user envelope stores.
//!
//! Every user has two: a personal store keyed by their passphrase-derived
//! key (envelopes for files they own) and a shared store keyed by the
//! global sharing key (envelopes for files they received, including
//! admin's mandatory copy of every non-admin file).

use crate::codec::{self, EnvelopeEntry};
use crate::crypto::{self, AeadKey};
use crate::error::VaultError;
use crate::globalkey::SharingKey;
use crate::layout;
use crate::store::BlobStore;

// ---------------------------------------------------------------------------
// Shared load/save core
// ---------------------------------------------------------------------------

/// Load a sealed envelope store. A file that is absent or shorter than
/// one nonce is an uninitialized store and reads as empty; a decrypt
/// failure surfaces as `AuthFailed`, never as an empty list.
fn load_sealed(
    store: &BlobStore,
    path: &str,
    key: &AeadKey,
) -> Result<Vec<EnvelopeEntry>, VaultError> {
    match store.read_all(path) {
        Ok(blob) if blob.len() >= crypto::NONCE_LEN => codec::open_store(key, &blob),
        Ok(_) => Ok(Vec::new()),
        Err(VaultError::NotFound(_)) => Ok(Vec::new()),
        Err(e) => Err(e),
    }
}

fn save_sealed(
    store: &BlobStore,
    user: &str,
    path: &str,
    key: &AeadKey,
    entries: &[EnvelopeEntry],
) -> Result<(), VaultError> {
    store.create_directory(&layout::metadata_dir(user))?;
    store.write_all_atomic(path, &codec::seal_store(key, entries)?)
}

fn upsert(entries: &mut Vec<EnvelopeEntry>, path: &str, envelope: &[u8]) {
    match entries.iter_mut().find(|e| e.path == path) {
        Some(entry) => entry.envelope = envelope.to_vec(),
        None => entries.push(EnvelopeEntry {
            path: path.to_string(),
            envelope: envelope.to_vec(),
        }),
    }
}

fn find(entries: &[EnvelopeEntry], path: &str) -> Option<Vec<u8>> {
    entries
        .iter()
        .find(|e| e.path == path)
        .map(|e| e.envelope.clone())
}

// ---------------------------------------------------------------------------
// Personal metadata
// ---------------------------------------------------------------------------

/// Envelope store for files a user owns, sealed under the key derived
/// from their passphrase.
pub struct PersonalMetadata<'a> {
    store: &'a BlobStore,
}

impl<'a> PersonalMetadata<'a> {
    pub fn new(store: &'a BlobStore) -> Self {
        Self { store }
    }

    pub fn load(&self, user: &str, key: &AeadKey) -> Result<Vec<EnvelopeEntry>, VaultError> {
        load_sealed(self.store, &layout::personal_store(user), key)
    }

    pub fn save(
        &self,
        user: &str,
        key: &AeadKey,
        entries: &[EnvelopeEntry],
    ) -> Result<(), VaultError> {
        save_sealed(self.store, user, &layout::personal_store(user), key, entries)
    }

    /// Add or replace the envelope for `path`.
    pub fn put(
        &self,
        user: &str,
        key: &AeadKey,
        path: &str,
        envelope: &[u8],
    ) -> Result<(), VaultError> {
        let mut entries = self.load(user, key)?;
        upsert(&mut entries, path, envelope);
        self.save(user, key, &entries)
    }

    pub fn get(
        &self,
        user: &str,
        key: &AeadKey,
        path: &str,
    ) -> Result<Option<Vec<u8>>, VaultError> {
        Ok(find(&self.load(user, key)?, path))
    }
}

// ---------------------------------------------------------------------------
// Shared metadata
// ---------------------------------------------------------------------------

/// Envelope store for files a user received, sealed under the global
/// sharing key.
pub struct SharedMetadata<'a> {
    store: &'a BlobStore,
}

impl<'a> SharedMetadata<'a> {
    pub fn new(store: &'a BlobStore) -> Self {
        Self { store }
    }

    pub fn load(&self, user: &str, g: &SharingKey) -> Result<Vec<EnvelopeEntry>, VaultError> {
        load_sealed(self.store, &layout::shared_store(user), g.key())
    }

    pub fn save(
        &self,
        user: &str,
        g: &SharingKey,
        entries: &[EnvelopeEntry],
    ) -> Result<(), VaultError> {
        save_sealed(self.store, user, &layout::shared_store(user), g.key(), entries)
    }

    /// Add or replace the envelope for `path`.
    pub fn put(
        &self,
        user: &str,
        g: &SharingKey,
        path: &str,
        envelope: &[u8],
    ) -> Result<(), VaultError> {
        let mut entries = self.load(user, g)?;
        upsert(&mut entries, path, envelope);
        self.save(user, g, &entries)
    }

    pub fn get(
        &self,
        user: &str,
        g: &SharingKey,
        path: &str,
    ) -> Result<Option<Vec<u8>>, VaultError> {
        Ok(find(&self.load(user, g)?, path))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (tempfile::TempDir, BlobStore, AeadKey) {
        let dir = tempfile::tempdir().unwrap();
        let store = BlobStore::new(dir.path());
        (dir, store, AeadKey::generate().unwrap())
    }

    #[test]
    fn absent_store_reads_empty() {
        let (_dir, store, key) = setup();
        let meta = PersonalMetadata::new(&store);
        assert!(meta.load("alice", &key).unwrap().is_empty());
        assert_eq!(meta.get("alice", &key, "anything").unwrap(), None);
    }

    #[test]
    fn truncated_store_reads_empty() {
        let (_dir, store, key) = setup();
        store.create_directory(&layout::metadata_dir("alice")).unwrap();
        store
            .write_all_atomic(&layout::personal_store("alice"), &[0u8; 7])
            .unwrap();
        let meta = PersonalMetadata::new(&store);
        assert!(meta.load("alice", &key).unwrap().is_empty());
    }

    #[test]
    fn put_then_get() {
        let (_dir, store, key) = setup();
        let meta = PersonalMetadata::new(&store);
        meta.put("alice", &key, "filesystem/alice/personal/doc", &[1, 2, 3])
            .unwrap();
        assert_eq!(
            meta.get("alice", &key, "filesystem/alice/personal/doc")
                .unwrap(),
            Some(vec![1, 2, 3])
        );
    }

    #[test]
    fn put_is_upsert() {
        let (_dir, store, key) = setup();
        let meta = PersonalMetadata::new(&store);
        meta.put("alice", &key, "p", &[1]).unwrap();
        meta.put("alice", &key, "q", &[2]).unwrap();
        meta.put("alice", &key, "p", &[9]).unwrap();
        let entries = meta.load("alice", &key).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(meta.get("alice", &key, "p").unwrap(), Some(vec![9]));
        assert_eq!(meta.get("alice", &key, "q").unwrap(), Some(vec![2]));
    }

    #[test]
    fn wrong_key_is_auth_failed_not_empty() {
        let (_dir, store, key) = setup();
        let meta = PersonalMetadata::new(&store);
        meta.put("alice", &key, "p", &[1]).unwrap();
        let wrong = AeadKey::generate().unwrap();
        assert!(matches!(
            meta.load("alice", &wrong),
            Err(VaultError::AuthFailed)
        ));
    }

    #[test]
    fn shared_store_is_separate_file() {
        let (_dir, store, key) = setup();
        let g = SharingKey::new(key.clone());
        let shared = SharedMetadata::new(&store);
        shared.put("alice", &g, "p", &[7]).unwrap();
        assert!(store.exists(&layout::shared_store("alice")));
        assert!(!store.exists(&layout::personal_store("alice")));
        assert_eq!(shared.get("alice", &g, "p").unwrap(), Some(vec![7]));
    }
}
