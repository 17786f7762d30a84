//! Global sharing key management.
//!
//! The 256-bit sharing key `G` seals every shared envelope and the share
//! mapping. On disk it exists only wrapped to individual users' public
//! keys; in memory it lives inside a live session and is zeroed on drop.

use rsa::{RsaPrivateKey, RsaPublicKey};

use crate::crypto::{self, AeadKey};
use crate::error::VaultError;
use crate::layout;
use crate::store::BlobStore;

// ---------------------------------------------------------------------------
// The key itself
// ---------------------------------------------------------------------------

/// Session-scoped copy of the global sharing key. Zeroed on drop.
#[derive(Clone)]
pub struct SharingKey(AeadKey);

impl SharingKey {
    pub fn new(key: AeadKey) -> Self {
        Self(key)
    }

    pub fn key(&self) -> &AeadKey {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// Manager
// ---------------------------------------------------------------------------

pub struct GlobalKeyManager<'a> {
    store: &'a BlobStore,
}

impl<'a> GlobalKeyManager<'a> {
    pub fn new(store: &'a BlobStore) -> Self {
        Self { store }
    }

    /// First admin login creates `G` and persists it wrapped to admin's
    /// public key; later logins unwrap the stored copy.
    pub fn initialize_for_admin(
        &self,
        admin_public: &RsaPublicKey,
        admin_private: &RsaPrivateKey,
    ) -> Result<SharingKey, VaultError> {
        let path = layout::wrapped_global_key(layout::ADMIN);
        if !self.store.exists(&path) {
            let g = AeadKey::generate()?;
            let wrapped = crypto::pk_wrap(admin_public, g.as_bytes())?;
            self.store
                .create_directory(&layout::metadata_dir(layout::ADMIN))?;
            self.store.write_all_atomic(&path, &wrapped)?;
            return Ok(SharingKey(g));
        }
        let wrapped = self.store.read_all(&path)?;
        let clear = crypto::pk_unwrap(admin_private, &wrapped)?;
        Ok(SharingKey(AeadKey::from_slice(&clear)?))
    }

    /// Wrap the session's `G` to a user's public key so that user can
    /// retrieve it at their own logins.
    pub fn grant(
        &self,
        user: &str,
        user_public: &RsaPublicKey,
        g: &SharingKey,
    ) -> Result<(), VaultError> {
        let wrapped = crypto::pk_wrap(user_public, g.key().as_bytes())?;
        self.store.create_directory(&layout::metadata_dir(user))?;
        self.store
            .write_all_atomic(&layout::wrapped_global_key(user), &wrapped)
    }

    /// Unwrap this user's stored copy of `G`.
    pub fn retrieve(
        &self,
        user: &str,
        private: &RsaPrivateKey,
    ) -> Result<SharingKey, VaultError> {
        let wrapped = self.store.read_all(&layout::wrapped_global_key(user))?;
        let clear = crypto::pk_unwrap(private, &wrapped)?;
        Ok(SharingKey(AeadKey::from_slice(&clear)?))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn keypair(pass: &str) -> (RsaPublicKey, RsaPrivateKey) {
        let (pub_pem, priv_pem) = crypto::generate_keypair(pass).unwrap();
        (
            crypto::load_public_key(pub_pem.as_bytes()).unwrap(),
            crypto::load_private_key(priv_pem.as_bytes(), pass).unwrap(),
        )
    }

    #[test]
    fn initialize_is_generate_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlobStore::new(dir.path());
        let manager = GlobalKeyManager::new(&store);
        let (admin_pub, admin_priv) = keypair("admin-pass");

        let first = manager.initialize_for_admin(&admin_pub, &admin_priv).unwrap();
        assert!(store.exists(&layout::wrapped_global_key(layout::ADMIN)));

        let second = manager.initialize_for_admin(&admin_pub, &admin_priv).unwrap();
        assert_eq!(first.key().as_bytes(), second.key().as_bytes());
    }

    #[test]
    fn grant_then_retrieve_yields_same_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlobStore::new(dir.path());
        let manager = GlobalKeyManager::new(&store);
        let (admin_pub, admin_priv) = keypair("admin-pass");
        let (user_pub, user_priv) = keypair("alice-pass");

        let g = manager.initialize_for_admin(&admin_pub, &admin_priv).unwrap();
        manager.grant("alice", &user_pub, &g).unwrap();

        let retrieved = manager.retrieve("alice", &user_priv).unwrap();
        assert_eq!(g.key().as_bytes(), retrieved.key().as_bytes());
    }

    #[test]
    fn retrieve_without_grant_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlobStore::new(dir.path());
        let manager = GlobalKeyManager::new(&store);
        let (_, user_priv) = keypair("carol-pass");
        assert!(matches!(
            manager.retrieve("carol", &user_priv),
            Err(VaultError::NotFound(_))
        ));
    }
}
