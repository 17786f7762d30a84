//! File engine: the operations that tie the key hierarchy together.
//!
//! `write` seals a body under a fresh data key and fans the key out as
//! envelopes (owner, admin, existing recipients). `read` resolves an
//! envelope (owner store first, shared store second) and opens the
//! body. `share` re-wraps a file's data key for another user under the
//! global sharing key and hard-links the ciphertext into their view.

use tracing::warn;
use zeroize::Zeroizing;

use crate::crypto::{self, AeadKey, DATA_KEY_LEN, KEY_LEN, NONCE_LEN};
use crate::error::VaultError;
use crate::globalkey::SharingKey;
use crate::layout;
use crate::mapping::ShareMappingStore;
use crate::metadata::{PersonalMetadata, SharedMetadata};
use crate::registry::UserRegistry;
use crate::store::BlobStore;

pub struct FileEngine<'a> {
    store: &'a BlobStore,
}

impl<'a> FileEngine<'a> {
    pub fn new(store: &'a BlobStore) -> Self {
        Self { store }
    }

    // -----------------------------------------------------------------------
    // write
    // -----------------------------------------------------------------------

    /// Encrypt `plaintext` to `path` under a fresh data key and record
    /// envelopes for the owner, for admin (mandatory, unless admin owns
    /// the file), and for every existing recipient.
    ///
    /// The body lands before any envelope so no envelope ever points at
    /// missing ciphertext; the owner envelope precedes admin's so
    /// ownership is recoverable if the admin update fails. Recipient
    /// refreshes are best-effort: failures are logged and do not fail
    /// the write.
    pub fn write(
        &self,
        path: &str,
        plaintext: &[u8],
        owner: &str,
        owner_key: &AeadKey,
        g: &SharingKey,
    ) -> Result<(), VaultError> {
        let (data_key, iv) = crypto::generate_data_key()?;
        let key_iv = concat_key_iv(&data_key, &iv);

        let body = crypto::seal_body(&data_key, &iv, plaintext)?;
        self.store.write_all_atomic(path, &body)?;

        let registry = UserRegistry::new(self.store);
        let owner_public = registry.load_public_key(owner)?;
        let owner_envelope = crypto::pk_wrap(&owner_public, &key_iv)?;
        PersonalMetadata::new(self.store).put(owner, owner_key, path, &owner_envelope)?;

        let shared = SharedMetadata::new(self.store);
        let mapping = ShareMappingStore::new(self.store);

        if owner != layout::ADMIN {
            let admin_envelope = crypto::seal(g.key(), &key_iv)?;
            shared.put(layout::ADMIN, g, path, &admin_envelope)?;
            mapping.upsert(g, path, layout::ADMIN, path)?;
        }

        // Best-effort refresh of everyone this path was already shared
        // with; admin was handled above with its own fresh envelope.
        for (recipient, target) in mapping.recipients_of(g, path)? {
            if recipient == layout::ADMIN {
                continue;
            }
            if let Err(e) = self.refresh_recipient(g, path, &key_iv, &recipient, &target) {
                warn!(path, recipient = %recipient, error = %e, "recipient refresh failed");
            }
        }

        Ok(())
    }

    /// Re-wrap the data key for one recipient and re-link their target
    /// at the new body (the atomic rewrite allocated a fresh inode, so
    /// the old hard link still names the previous ciphertext).
    fn refresh_recipient(
        &self,
        g: &SharingKey,
        path: &str,
        key_iv: &[u8],
        recipient: &str,
        target: &str,
    ) -> Result<(), VaultError> {
        let envelope = crypto::seal(g.key(), key_iv)?;
        SharedMetadata::new(self.store).put(recipient, g, target, &envelope)?;
        if target != path {
            if self.store.exists(target) {
                self.store.remove(target)?;
            }
            self.store.create_hard_link(path, target)?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // read
    // -----------------------------------------------------------------------

    /// Decrypt the body at `path` for `user`.
    ///
    /// The user's own envelope is preferred: their key is authoritative
    /// for files they own; the shared store is only consulted for files
    /// they received.
    pub fn read(
        &self,
        path: &str,
        user: &str,
        passphrase: &str,
        user_key: &AeadKey,
        g: &SharingKey,
    ) -> Result<Vec<u8>, VaultError> {
        let body = self.store.read_all(path)?;

        let key_iv: Zeroizing<Vec<u8>> =
            match PersonalMetadata::new(self.store).get(user, user_key, path)? {
                Some(envelope) => {
                    let private = UserRegistry::new(self.store).load_private_key(user, passphrase)?;
                    crypto::pk_unwrap(&private, &envelope)?
                }
                None => match SharedMetadata::new(self.store).get(user, g, path)? {
                    Some(envelope) => Zeroizing::new(crypto::open(g.key(), &envelope)?),
                    None => {
                        return Err(VaultError::NoEnvelope {
                            user: user.to_string(),
                            path: path.to_string(),
                        })
                    }
                },
            };

        let (data_key, iv) = split_key_iv(&key_iv)?;
        crypto::open_body(&data_key, &iv, &body)
    }

    // -----------------------------------------------------------------------
    // share
    // -----------------------------------------------------------------------

    /// Share `source` (which the sender must own) with `target_user`.
    /// Returns the path where the file appears in the recipient's view.
    ///
    /// Re-sharing the same file to the same user is idempotent apart
    /// from the fresh envelope nonce.
    pub fn share(
        &self,
        source: &str,
        target_user: &str,
        sender: &str,
        sender_passphrase: &str,
        sender_key: &AeadKey,
        g: &SharingKey,
    ) -> Result<String, VaultError> {
        let personal = PersonalMetadata::new(self.store);
        let envelope = personal
            .get(sender, sender_key, source)?
            .ok_or_else(|| VaultError::NotOwner {
                user: sender.to_string(),
                path: source.to_string(),
            })?;

        let private = UserRegistry::new(self.store).load_private_key(sender, sender_passphrase)?;
        let key_iv = crypto::pk_unwrap(&private, &envelope)?;
        if key_iv.len() != DATA_KEY_LEN {
            return Err(VaultError::EnvelopeMalformed);
        }

        let target = layout::shared_target(source, sender, target_user).ok_or_else(|| {
            VaultError::Decode(format!("source outside a shareable subtree: {}", source))
        })?;

        let shared = SharedMetadata::new(self.store);
        let mapping = ShareMappingStore::new(self.store);

        let target_envelope = crypto::seal(g.key(), &key_iv)?;
        shared.put(target_user, g, &target, &target_envelope)?;

        if target_user != layout::ADMIN {
            let admin_envelope = crypto::seal(g.key(), &key_iv)?;
            shared.put(layout::ADMIN, g, &target, &admin_envelope)?;
            mapping.upsert(g, source, layout::ADMIN, source)?;
        }

        mapping.upsert(g, source, target_user, &target)?;

        if let Some((parent, _)) = target.rsplit_once('/') {
            self.store.create_directory(parent)?;
        }
        if self.store.exists(&target) {
            self.store.remove(&target)?;
        }
        self.store.create_hard_link(source, &target)?;

        Ok(target)
    }
}

// ---------------------------------------------------------------------------
// Data key helpers
// ---------------------------------------------------------------------------

fn concat_key_iv(key: &AeadKey, iv: &[u8; NONCE_LEN]) -> Zeroizing<Vec<u8>> {
    let mut buf = Zeroizing::new(Vec::with_capacity(DATA_KEY_LEN));
    buf.extend_from_slice(key.as_bytes());
    buf.extend_from_slice(iv);
    buf
}

/// Split a 48-byte `key || iv` blob; anything else is malformed.
fn split_key_iv(key_iv: &[u8]) -> Result<(AeadKey, [u8; NONCE_LEN]), VaultError> {
    if key_iv.len() != DATA_KEY_LEN {
        return Err(VaultError::EnvelopeMalformed);
    }
    let key = AeadKey::from_slice(&key_iv[..KEY_LEN])?;
    let mut iv = [0u8; NONCE_LEN];
    iv.copy_from_slice(&key_iv[KEY_LEN..]);
    Ok((key, iv))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_rejects_bad_lengths() {
        assert!(matches!(
            split_key_iv(&[0u8; DATA_KEY_LEN - 1]),
            Err(VaultError::EnvelopeMalformed)
        ));
        assert!(matches!(
            split_key_iv(&[0u8; DATA_KEY_LEN + 1]),
            Err(VaultError::EnvelopeMalformed)
        ));
        let (key, iv) = split_key_iv(&[7u8; DATA_KEY_LEN]).unwrap();
        assert_eq!(key.as_bytes(), &[7u8; KEY_LEN]);
        assert_eq!(iv, [7u8; NONCE_LEN]);
    }
}
