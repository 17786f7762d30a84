//! Cryptographic primitives: AES-256-GCM, RSA-OAEP key wrapping, Argon2id.
//!
//! Nothing in this module touches the filesystem; callers hand in raw
//! bytes and get raw bytes (or a typed error) back.

use aes_gcm::aead::consts::U16;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::aes::Aes256;
use aes_gcm::{AesGcm, Nonce};
use argon2::{Algorithm, Argon2, Params, Version};
use getrandom::getrandom;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, Zeroizing};

use crate::error::{CryptoError, VaultError};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

pub const KEY_LEN: usize = 32;
pub const NONCE_LEN: usize = 16;
pub const TAG_LEN: usize = 16;
/// Data key material: a 32-byte AES key followed by its 16-byte IV.
pub const DATA_KEY_LEN: usize = KEY_LEN + NONCE_LEN;
pub const SALT_LEN: usize = 16;
pub const RSA_BITS: usize = 2048;

/// Mode tag prefixed to every file body so bodies stay self-describing.
const BODY_MODE_TAG: &[u8; 3] = b"GCM";

/// Fixed plaintext for the login challenge-response.
const CHALLENGE: &[u8] = b"vaultfs-login-challenge";

/// AES-256-GCM with the 16-byte nonces used throughout the store formats.
type Aes256Gcm16 = AesGcm<Aes256, U16>;

// ---------------------------------------------------------------------------
// Symmetric keys
// ---------------------------------------------------------------------------

/// A 256-bit AEAD key. Zeroed on drop.
#[derive(Clone)]
pub struct AeadKey(Zeroizing<[u8; KEY_LEN]>);

impl AeadKey {
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(Zeroizing::new(bytes))
    }

    /// Build a key from a slice, rejecting anything that is not 32 bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, VaultError> {
        let arr: [u8; KEY_LEN] = bytes
            .try_into()
            .map_err(|_| VaultError::Crypto(CryptoError::BadKey))?;
        Ok(Self(Zeroizing::new(arr)))
    }

    pub fn generate() -> Result<Self, VaultError> {
        let mut bytes = [0u8; KEY_LEN];
        getrandom(&mut bytes).map_err(|_| VaultError::Crypto(CryptoError::BadKey))?;
        Ok(Self(Zeroizing::new(bytes)))
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// Random material
// ---------------------------------------------------------------------------

/// Random 16-byte nonce. Used during encryption only.
pub fn generate_nonce() -> Result<[u8; NONCE_LEN], VaultError> {
    let mut n = [0u8; NONCE_LEN];
    getrandom(&mut n).map_err(|_| VaultError::Crypto(CryptoError::BadKey))?;
    Ok(n)
}

/// Random per-user KDF salt.
pub fn generate_salt() -> Result<[u8; SALT_LEN], VaultError> {
    let mut s = [0u8; SALT_LEN];
    getrandom(&mut s).map_err(|_| VaultError::Crypto(CryptoError::BadKey))?;
    Ok(s)
}

/// Fresh data key + IV for exactly one file body.
pub fn generate_data_key() -> Result<(AeadKey, [u8; NONCE_LEN]), VaultError> {
    Ok((AeadKey::generate()?, generate_nonce()?))
}

/// Random passphrase with 128 bits of entropy, rendered as hex.
pub fn generate_passphrase() -> Result<String, VaultError> {
    let mut buf = [0u8; 16];
    getrandom(&mut buf).map_err(|_| VaultError::Crypto(CryptoError::BadKey))?;
    Ok(hex::encode(buf))
}

// ---------------------------------------------------------------------------
// AEAD
// ---------------------------------------------------------------------------

/// AEAD seal. Returns `ciphertext || tag`.
pub fn aead_encrypt(
    key: &AeadKey,
    nonce: &[u8; NONCE_LEN],
    plaintext: &[u8],
) -> Result<Vec<u8>, VaultError> {
    let cipher = Aes256Gcm16::new_from_slice(key.as_bytes())
        .map_err(|_| VaultError::Crypto(CryptoError::BadKey))?;
    cipher
        .encrypt(Nonce::<U16>::from_slice(nonce), plaintext)
        .map_err(|_| VaultError::Crypto(CryptoError::BadKey))
}

/// AEAD open. Fails with `AuthFailed` when the tag does not verify.
pub fn aead_decrypt(
    key: &AeadKey,
    nonce: &[u8; NONCE_LEN],
    ciphertext: &[u8],
) -> Result<Vec<u8>, VaultError> {
    let cipher = Aes256Gcm16::new_from_slice(key.as_bytes())
        .map_err(|_| VaultError::Crypto(CryptoError::BadKey))?;
    cipher
        .decrypt(Nonce::<U16>::from_slice(nonce), ciphertext)
        .map_err(|_| VaultError::AuthFailed)
}

/// Seal a blob under a fresh nonce, returning `nonce || ciphertext || tag`.
///
/// This is the on-disk shape of envelope stores, shared envelopes and the
/// share mapping.
pub fn seal(key: &AeadKey, plaintext: &[u8]) -> Result<Vec<u8>, VaultError> {
    let nonce = generate_nonce()?;
    let ct = aead_encrypt(key, &nonce, plaintext)?;
    let mut out = Vec::with_capacity(NONCE_LEN + ct.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ct);
    Ok(out)
}

/// Open a `nonce || ciphertext || tag` blob produced by [`seal`].
pub fn open(key: &AeadKey, blob: &[u8]) -> Result<Vec<u8>, VaultError> {
    if blob.len() < NONCE_LEN {
        return Err(VaultError::EnvelopeMalformed);
    }
    let (prefix, ct) = blob.split_at(NONCE_LEN);
    let mut nonce = [0u8; NONCE_LEN];
    nonce.copy_from_slice(prefix);
    aead_decrypt(key, &nonce, ct)
}

// ---------------------------------------------------------------------------
// File bodies
// ---------------------------------------------------------------------------

/// Encrypt a file body: `"GCM" || ciphertext || tag`.
pub fn seal_body(
    key: &AeadKey,
    iv: &[u8; NONCE_LEN],
    plaintext: &[u8],
) -> Result<Vec<u8>, VaultError> {
    let ct = aead_encrypt(key, iv, plaintext)?;
    let mut out = Vec::with_capacity(BODY_MODE_TAG.len() + ct.len());
    out.extend_from_slice(BODY_MODE_TAG);
    out.extend_from_slice(&ct);
    Ok(out)
}

/// Decrypt a file body. Unknown mode tags are `EnvelopeMalformed`.
pub fn open_body(
    key: &AeadKey,
    iv: &[u8; NONCE_LEN],
    body: &[u8],
) -> Result<Vec<u8>, VaultError> {
    if body.len() < BODY_MODE_TAG.len() + TAG_LEN {
        return Err(VaultError::EnvelopeMalformed);
    }
    let (mode, ct) = body.split_at(BODY_MODE_TAG.len());
    if mode != BODY_MODE_TAG {
        return Err(VaultError::EnvelopeMalformed);
    }
    aead_decrypt(key, iv, ct)
}

// ---------------------------------------------------------------------------
// Asymmetric wrap / unwrap
// ---------------------------------------------------------------------------

/// Wrap at most one data key (48 bytes) to a public key. OAEP-SHA256.
pub fn pk_wrap(public: &RsaPublicKey, plaintext: &[u8]) -> Result<Vec<u8>, VaultError> {
    let mut rng = rand_core::OsRng;
    public
        .encrypt(&mut rng, Oaep::new::<Sha256>(), plaintext)
        .map_err(|_| VaultError::Crypto(CryptoError::BadKey))
}

/// Unwrap a [`pk_wrap`] ciphertext. The plaintext buffer is zeroed on drop.
pub fn pk_unwrap(
    private: &RsaPrivateKey,
    ciphertext: &[u8],
) -> Result<Zeroizing<Vec<u8>>, VaultError> {
    private
        .decrypt(Oaep::new::<Sha256>(), ciphertext)
        .map(Zeroizing::new)
        .map_err(|_| VaultError::Crypto(CryptoError::Auth))
}

// ---------------------------------------------------------------------------
// Key pairs
// ---------------------------------------------------------------------------

/// Generate an RSA-2048 key pair. The private key is returned as an
/// encrypted PKCS#8 PEM keyed by `passphrase`; the public key as SPKI PEM.
pub fn generate_keypair(passphrase: &str) -> Result<(String, Zeroizing<String>), VaultError> {
    let mut rng = rand_core::OsRng;
    let private = RsaPrivateKey::new(&mut rng, RSA_BITS)
        .map_err(|_| VaultError::Crypto(CryptoError::BadKey))?;
    let public = RsaPublicKey::from(&private);

    let public_pem = public
        .to_public_key_pem(LineEnding::LF)
        .map_err(|_| VaultError::Crypto(CryptoError::Decode))?;
    let private_pem = private
        .to_pkcs8_encrypted_pem(&mut rng, passphrase.as_bytes(), LineEnding::LF)
        .map_err(|_| VaultError::Crypto(CryptoError::Decode))?;

    Ok((public_pem, private_pem))
}

/// Re-encrypt an already-loaded private key under a new passphrase.
pub fn reencrypt_private_key(
    private: &RsaPrivateKey,
    passphrase: &str,
) -> Result<Zeroizing<String>, VaultError> {
    let mut rng = rand_core::OsRng;
    private
        .to_pkcs8_encrypted_pem(&mut rng, passphrase.as_bytes(), LineEnding::LF)
        .map_err(|_| VaultError::Crypto(CryptoError::Decode))
}

/// Parse a public key from SPKI PEM bytes.
pub fn load_public_key(pem: &[u8]) -> Result<RsaPublicKey, VaultError> {
    let text = std::str::from_utf8(pem).map_err(|_| VaultError::Crypto(CryptoError::Decode))?;
    RsaPublicKey::from_public_key_pem(text).map_err(|_| VaultError::Crypto(CryptoError::Decode))
}

/// Parse an encrypted PKCS#8 PEM private key. A wrong passphrase (or a
/// tampered keyfile) surfaces as `AuthFailed`.
pub fn load_private_key(pem: &[u8], passphrase: &str) -> Result<RsaPrivateKey, VaultError> {
    let text = std::str::from_utf8(pem).map_err(|_| VaultError::Crypto(CryptoError::Decode))?;
    RsaPrivateKey::from_pkcs8_encrypted_pem(text, passphrase.as_bytes())
        .map_err(|_| VaultError::AuthFailed)
}

/// Challenge-response check that a public and private key belong together.
pub fn verify_keypair(public: &RsaPublicKey, private: &RsaPrivateKey) -> bool {
    let wrapped = match pk_wrap(public, CHALLENGE) {
        Ok(w) => w,
        Err(_) => return false,
    };
    match pk_unwrap(private, &wrapped) {
        Ok(echo) => bool::from(echo.ct_eq(CHALLENGE)),
        Err(_) => false,
    }
}

// ---------------------------------------------------------------------------
// Password-derived keys
// ---------------------------------------------------------------------------

/// Derive a metadata key from a passphrase with Argon2id
/// (19 MiB, t=2, p=1) and a per-user salt.
pub fn derive_key_from_password(password: &str, salt: &[u8]) -> Result<AeadKey, VaultError> {
    let params = Params::new(19_456, 2, 1, Some(KEY_LEN))
        .map_err(|_| VaultError::Crypto(CryptoError::BadKey))?;
    let argon = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
    let mut out = [0u8; KEY_LEN];
    argon
        .hash_password_into(password.as_bytes(), salt, &mut out)
        .map_err(|_| VaultError::Crypto(CryptoError::BadKey))?;
    let key = AeadKey::from_bytes(out);
    out.zeroize();
    Ok(key)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aead_roundtrip() {
        let key = AeadKey::generate().unwrap();
        let nonce = generate_nonce().unwrap();
        let ct = aead_encrypt(&key, &nonce, b"hello").unwrap();
        assert_eq!(ct.len(), 5 + TAG_LEN);
        let pt = aead_decrypt(&key, &nonce, &ct).unwrap();
        assert_eq!(pt, b"hello");
    }

    #[test]
    fn aead_tamper_fails_auth() {
        let key = AeadKey::generate().unwrap();
        let nonce = generate_nonce().unwrap();
        let mut ct = aead_encrypt(&key, &nonce, b"hello").unwrap();
        ct[2] ^= 0x01;
        assert!(matches!(
            aead_decrypt(&key, &nonce, &ct),
            Err(VaultError::AuthFailed)
        ));
    }

    #[test]
    fn sealed_blob_roundtrip_and_tamper() {
        let key = AeadKey::generate().unwrap();
        let blob = seal(&key, b"payload").unwrap();
        assert_eq!(open(&key, &blob).unwrap(), b"payload");

        let mut bad = blob.clone();
        *bad.last_mut().unwrap() ^= 0xff;
        assert!(matches!(open(&key, &bad), Err(VaultError::AuthFailed)));

        // Shorter than a nonce is structurally invalid, not an auth failure.
        assert!(matches!(
            open(&key, &blob[..NONCE_LEN - 1]),
            Err(VaultError::EnvelopeMalformed)
        ));
    }

    #[test]
    fn body_mode_tag_enforced() {
        let (key, iv) = generate_data_key().unwrap();
        let body = seal_body(&key, &iv, b"contents").unwrap();
        assert_eq!(&body[..3], b"GCM");
        assert_eq!(open_body(&key, &iv, &body).unwrap(), b"contents");

        let mut relabeled = body.clone();
        relabeled[..3].copy_from_slice(b"CBC");
        assert!(matches!(
            open_body(&key, &iv, &relabeled),
            Err(VaultError::EnvelopeMalformed)
        ));
    }

    #[test]
    fn pk_wrap_roundtrip() {
        let pass = "kp-test";
        let (pub_pem, priv_pem) = generate_keypair(pass).unwrap();
        let public = load_public_key(pub_pem.as_bytes()).unwrap();
        let private = load_private_key(priv_pem.as_bytes(), pass).unwrap();

        let mut data_key = [0u8; DATA_KEY_LEN];
        getrandom(&mut data_key).unwrap();
        let wrapped = pk_wrap(&public, &data_key).unwrap();
        assert_eq!(wrapped.len(), RSA_BITS / 8);
        let unwrapped = pk_unwrap(&private, &wrapped).unwrap();
        assert_eq!(&unwrapped[..], &data_key[..]);

        assert!(verify_keypair(&public, &private));
    }

    #[test]
    fn private_key_rejects_wrong_passphrase() {
        let (_, priv_pem) = generate_keypair("right").unwrap();
        assert!(matches!(
            load_private_key(priv_pem.as_bytes(), "wrong"),
            Err(VaultError::AuthFailed)
        ));
    }

    #[test]
    fn derive_is_deterministic_per_salt() {
        let salt_a = generate_salt().unwrap();
        let salt_b = generate_salt().unwrap();
        let k1 = derive_key_from_password("hunter2", &salt_a).unwrap();
        let k2 = derive_key_from_password("hunter2", &salt_a).unwrap();
        let k3 = derive_key_from_password("hunter2", &salt_b).unwrap();
        assert_eq!(k1.as_bytes(), k2.as_bytes());
        assert_ne!(k1.as_bytes(), k3.as_bytes());
    }

    #[test]
    fn passphrase_is_hex_128_bits() {
        let p = generate_passphrase().unwrap();
        assert_eq!(p.len(), 32);
        assert!(p.bytes().all(|b| b.is_ascii_hexdigit()));
    }
}
