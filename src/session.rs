//! Login: challenge-response authentication and session assembly.
//!
//! A session holds the secrets that live for the process lifetime: the
//! passphrase-derived metadata key and the unwrapped global sharing key.
//! Private keys are *not* retained; each operation that needs one loads
//! and drops it again.

use zeroize::Zeroizing;

use crate::crypto::{self, AeadKey};
use crate::error::VaultError;
use crate::globalkey::{GlobalKeyManager, SharingKey};
use crate::layout;
use crate::registry::UserRegistry;
use crate::store::BlobStore;

pub struct Session {
    user: String,
    passphrase: Zeroizing<String>,
    derived_key: AeadKey,
    sharing_key: SharingKey,
}

impl Session {
    /// Authenticate `user` and unwrap the session secrets.
    ///
    /// Admin's first login creates the global sharing key; every other
    /// login unwraps a stored copy.
    pub fn open(store: &BlobStore, user: &str, passphrase: &str) -> Result<Self, VaultError> {
        let registry = UserRegistry::new(store);
        if !registry.user_exists(user) {
            return Err(VaultError::NotFound(user.to_string()));
        }

        let public = registry.load_public_key(user)?;
        let private = registry.load_private_key(user, passphrase)?;
        if !crypto::verify_keypair(&public, &private) {
            return Err(VaultError::BadKeyPair(user.to_string()));
        }

        let derived_key = registry.derived_key(user, passphrase)?;

        let manager = GlobalKeyManager::new(store);
        let sharing_key = if user == layout::ADMIN {
            manager.initialize_for_admin(&public, &private)?
        } else {
            manager.retrieve(user, &private)?
        };

        Ok(Self {
            user: user.to_string(),
            passphrase: Zeroizing::new(passphrase.to_string()),
            derived_key,
            sharing_key,
        })
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn is_admin(&self) -> bool {
        self.user == layout::ADMIN
    }

    pub fn passphrase(&self) -> &str {
        &self.passphrase
    }

    pub fn derived_key(&self) -> &AeadKey {
        &self.derived_key
    }

    pub fn sharing_key(&self) -> &SharingKey {
        &self.sharing_key
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_and_user_sessions_share_one_g() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlobStore::new(dir.path());
        let registry = UserRegistry::new(&store);

        let admin_pass = registry.bootstrap_admin().unwrap().unwrap();
        let admin = Session::open(&store, "admin", &admin_pass).unwrap();
        assert!(admin.is_admin());

        let alice_pass = registry.add_user("alice", admin.sharing_key()).unwrap();
        let alice = Session::open(&store, "alice", &alice_pass).unwrap();
        assert!(!alice.is_admin());

        assert_eq!(
            admin.sharing_key().key().as_bytes(),
            alice.sharing_key().key().as_bytes()
        );

        // A second admin session unwraps the same key it created.
        let again = Session::open(&store, "admin", &admin_pass).unwrap();
        assert_eq!(
            admin.sharing_key().key().as_bytes(),
            again.sharing_key().key().as_bytes()
        );
    }

    #[test]
    fn wrong_passphrase_is_auth_failed() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlobStore::new(dir.path());
        let registry = UserRegistry::new(&store);
        registry.bootstrap_admin().unwrap().unwrap();

        assert!(matches!(
            Session::open(&store, "admin", "nope"),
            Err(VaultError::AuthFailed)
        ));
    }

    #[test]
    fn unknown_user_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlobStore::new(dir.path());
        assert!(matches!(
            Session::open(&store, "ghost", "pass"),
            Err(VaultError::NotFound(_))
        ));
    }
}
