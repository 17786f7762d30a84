//! User registry: principal creation, credentials, password changes.

use rsa::{RsaPrivateKey, RsaPublicKey};
use tracing::info;

use crate::crypto::{self, AeadKey};
use crate::error::VaultError;
use crate::globalkey::{GlobalKeyManager, SharingKey};
use crate::layout;
use crate::metadata::PersonalMetadata;
use crate::store::BlobStore;

/// Substrings that may not appear anywhere in a user name.
const RESERVED: [&str; 3] = ["admin", "keyfiles", "metadata"];

// ---------------------------------------------------------------------------
// Name policy
// ---------------------------------------------------------------------------

/// Allowed-name policy for `adduser`: non-empty, no path or token
/// separators, no whitespace, no reserved substrings.
pub fn check_name(name: &str) -> Result<(), VaultError> {
    let rejected = name.is_empty()
        || name.chars().any(|c| matches!(c, '/' | ':' | '&') || c.is_whitespace())
        || RESERVED.iter().any(|r| name.contains(r));
    if rejected {
        Err(VaultError::NamePolicy(name.to_string()))
    } else {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

pub struct UserRegistry<'a> {
    store: &'a BlobStore,
}

impl<'a> UserRegistry<'a> {
    pub fn new(store: &'a BlobStore) -> Self {
        Self { store }
    }

    pub fn user_exists(&self, name: &str) -> bool {
        self.store.is_directory(&layout::user_root(name))
            || self.store.exists(&layout::private_key_file(name))
    }

    /// Create a principal: key pair, directory tree, KDF salt, and a
    /// grant of the global sharing key. Returns the generated passphrase,
    /// which is emitted to the caller exactly once and never stored.
    ///
    /// Failure part-way leaves earlier side effects in place; later steps
    /// are simply not reached.
    pub fn add_user(&self, name: &str, g: &SharingKey) -> Result<String, VaultError> {
        check_name(name)?;
        if self.user_exists(name) {
            return Err(VaultError::NamePolicy(format!("{} already exists", name)));
        }

        let passphrase = crypto::generate_passphrase()?;
        let (public_pem, private_pem) = crypto::generate_keypair(&passphrase)?;

        self.store.create_directory(layout::KEYFILES_DIR)?;
        self.store.create_directory(layout::PUBLIC_KEYS)?;
        self.store
            .write_all_atomic(&layout::private_key_file(name), private_pem.as_bytes())?;
        self.store
            .write_all_atomic(&layout::public_key_file(name), public_pem.as_bytes())?;

        self.store.create_directory(&layout::personal_dir(name))?;
        self.store.create_directory(&layout::shared_dir(name))?;
        self.store.create_directory(&layout::metadata_dir(name))?;
        self.store
            .write_all_atomic(&layout::kdf_salt(name), &crypto::generate_salt()?)?;

        let public = crypto::load_public_key(public_pem.as_bytes())?;
        GlobalKeyManager::new(self.store).grant(name, &public, g)?;

        info!(user = name, "user registered");
        Ok(passphrase)
    }

    /// First-run creation of the admin principal. Returns the generated
    /// passphrase when admin was just created, `None` when it already
    /// existed.
    pub fn bootstrap_admin(&self) -> Result<Option<String>, VaultError> {
        if self.user_exists(layout::ADMIN) {
            return Ok(None);
        }

        let passphrase = crypto::generate_passphrase()?;
        let (public_pem, private_pem) = crypto::generate_keypair(&passphrase)?;

        self.store.create_directory(layout::KEYFILES_DIR)?;
        self.store.create_directory(layout::PUBLIC_KEYS)?;
        self.store.write_all_atomic(
            &layout::private_key_file(layout::ADMIN),
            private_pem.as_bytes(),
        )?;
        self.store.write_all_atomic(
            &layout::public_key_file(layout::ADMIN),
            public_pem.as_bytes(),
        )?;

        self.store.create_directory(&layout::personal_dir(layout::ADMIN))?;
        self.store.create_directory(&layout::shared_dir(layout::ADMIN))?;
        self.store.create_directory(&layout::metadata_dir(layout::ADMIN))?;
        self.store.write_all_atomic(
            &layout::kdf_salt(layout::ADMIN),
            &crypto::generate_salt()?,
        )?;

        info!("admin principal created");
        Ok(Some(passphrase))
    }

    // -----------------------------------------------------------------------
    // Credentials
    // -----------------------------------------------------------------------

    pub fn load_public_key(&self, user: &str) -> Result<RsaPublicKey, VaultError> {
        let pem = self.store.read_all(&layout::public_key_file(user))?;
        crypto::load_public_key(&pem)
    }

    /// Load and decrypt a user's private key. Wrong passphrase is
    /// `AuthFailed`; the decrypted key is zeroed when dropped.
    pub fn load_private_key(
        &self,
        user: &str,
        passphrase: &str,
    ) -> Result<RsaPrivateKey, VaultError> {
        let pem = self.store.read_all(&layout::private_key_file(user))?;
        crypto::load_private_key(&pem, passphrase)
    }

    /// Derive the user's metadata key from their passphrase and salt.
    pub fn derived_key(&self, user: &str, passphrase: &str) -> Result<AeadKey, VaultError> {
        let salt = self.store.read_all(&layout::kdf_salt(user))?;
        crypto::derive_key_from_password(passphrase, &salt)
    }

    // -----------------------------------------------------------------------
    // Password change
    // -----------------------------------------------------------------------

    /// Re-key a user's credentials: first the private key at rest, then
    /// the personal envelope store. If the second step fails after the
    /// first succeeded the account is flagged `MetadataRekeyFailed`;
    /// owned envelopes are still sealed under the old passphrase.
    pub fn change_password(
        &self,
        user: &str,
        old_pass: &str,
        new_pass: &str,
    ) -> Result<(), VaultError> {
        let private = self.load_private_key(user, old_pass)?;
        let reencrypted = crypto::reencrypt_private_key(&private, new_pass)?;
        self.store
            .write_all_atomic(&layout::private_key_file(user), reencrypted.as_bytes())?;

        self.rekey_personal_metadata(user, old_pass, new_pass)
            .map_err(|e| {
                tracing::error!(user, error = %e, "personal metadata re-key failed");
                VaultError::MetadataRekeyFailed(user.to_string())
            })?;

        info!(user, "password changed");
        Ok(())
    }

    fn rekey_personal_metadata(
        &self,
        user: &str,
        old_pass: &str,
        new_pass: &str,
    ) -> Result<(), VaultError> {
        let old_key = self.derived_key(user, old_pass)?;
        let new_key = self.derived_key(user, new_pass)?;
        let personal = PersonalMetadata::new(self.store);
        let entries = personal.load(user, &old_key)?;
        personal.save(user, &new_key, &entries)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::AeadKey;

    fn setup() -> (tempfile::TempDir, BlobStore, SharingKey) {
        let dir = tempfile::tempdir().unwrap();
        let store = BlobStore::new(dir.path());
        let g = SharingKey::new(AeadKey::generate().unwrap());
        (dir, store, g)
    }

    #[test]
    fn name_policy() {
        assert!(check_name("alice").is_ok());
        assert!(check_name("bob-2").is_ok());
        for bad in ["", "a/b", "x:y", "a&b", "a b", "admin2", "my-keyfiles", "metadata-x"] {
            assert!(
                matches!(check_name(bad), Err(VaultError::NamePolicy(_))),
                "expected rejection for {:?}",
                bad
            );
        }
    }

    #[test]
    fn add_user_creates_principal() {
        let (_dir, store, g) = setup();
        let registry = UserRegistry::new(&store);
        let passphrase = registry.add_user("alice", &g).unwrap();
        assert_eq!(passphrase.len(), 32);

        assert!(store.exists(&layout::private_key_file("alice")));
        assert!(store.exists(&layout::public_key_file("alice")));
        assert!(store.is_directory(&layout::personal_dir("alice")));
        assert!(store.is_directory(&layout::shared_dir("alice")));
        assert!(store.exists(&layout::kdf_salt("alice")));

        // The new user can unwrap the same G admin holds.
        let private = registry.load_private_key("alice", &passphrase).unwrap();
        let retrieved = GlobalKeyManager::new(&store)
            .retrieve("alice", &private)
            .unwrap();
        assert_eq!(retrieved.key().as_bytes(), g.key().as_bytes());
    }

    #[test]
    fn duplicate_user_rejected() {
        let (_dir, store, g) = setup();
        let registry = UserRegistry::new(&store);
        registry.add_user("alice", &g).unwrap();
        assert!(matches!(
            registry.add_user("alice", &g),
            Err(VaultError::NamePolicy(_))
        ));
    }

    #[test]
    fn bootstrap_admin_once() {
        let (_dir, store, _g) = setup();
        let registry = UserRegistry::new(&store);
        let pass = registry.bootstrap_admin().unwrap();
        assert!(pass.is_some());
        assert!(registry.bootstrap_admin().unwrap().is_none());
        registry
            .load_private_key(layout::ADMIN, &pass.unwrap())
            .unwrap();
    }

    #[test]
    fn change_password_rekeys_key_and_metadata() {
        let (_dir, store, g) = setup();
        let registry = UserRegistry::new(&store);
        let old_pass = registry.add_user("alice", &g).unwrap();

        // Seed a personal envelope under the old derived key.
        let old_key = registry.derived_key("alice", &old_pass).unwrap();
        PersonalMetadata::new(&store)
            .put("alice", &old_key, "filesystem/alice/personal/doc", &[1, 2])
            .unwrap();

        registry.change_password("alice", &old_pass, "new-pass").unwrap();

        assert!(matches!(
            registry.load_private_key("alice", &old_pass),
            Err(VaultError::AuthFailed)
        ));
        registry.load_private_key("alice", "new-pass").unwrap();

        let new_key = registry.derived_key("alice", "new-pass").unwrap();
        assert_eq!(
            PersonalMetadata::new(&store)
                .get("alice", &new_key, "filesystem/alice/personal/doc")
                .unwrap(),
            Some(vec![1, 2])
        );
        assert!(matches!(
            PersonalMetadata::new(&store).load("alice", &old_key),
            Err(VaultError::AuthFailed)
        ));
    }

    #[test]
    fn change_password_wrong_old_pass() {
        let (_dir, store, g) = setup();
        let registry = UserRegistry::new(&store);
        registry.add_user("alice", &g).unwrap();
        assert!(matches!(
            registry.change_password("alice", "wrong", "new"),
            Err(VaultError::AuthFailed)
        ));
    }
}
