//! Error types for the vault.

use std::fmt;
use std::io;

// ---------------------------------------------------------------------------
// Crypto-layer errors
// ---------------------------------------------------------------------------

/// Failure inside a cryptographic primitive. Primitives never return
/// dubious output; they fail with one of these instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CryptoError {
    /// An asymmetric operation rejected its input.
    Auth,
    /// Key or ciphertext material could not be parsed.
    Decode,
    /// A key was unusable for the requested operation.
    BadKey,
}

impl fmt::Display for CryptoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auth => write!(f, "asymmetric operation failed"),
            Self::Decode => write!(f, "malformed key material"),
            Self::BadKey => write!(f, "unusable key"),
        }
    }
}

impl std::error::Error for CryptoError {}

// ---------------------------------------------------------------------------
// Top-level vault error
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum VaultError {
    /// A file body (or other required file) does not exist.
    NotFound(String),
    /// Neither a personal nor a shared envelope exists for this reader.
    NoEnvelope { user: String, path: String },
    /// AEAD tag mismatch or wrong passphrase.
    AuthFailed,
    /// Challenge-response mismatch between a user's key pair at login.
    BadKeyPair(String),
    /// An envelope decrypted to something other than a 48-byte data key,
    /// or a sealed blob is structurally invalid.
    EnvelopeMalformed,
    /// Failure inside a cryptographic primitive.
    Crypto(CryptoError),
    /// A serialized store contained a line that does not parse.
    Decode(String),
    /// Underlying filesystem failure.
    Io(io::Error),
    /// Another session holds the store lock.
    StoreBusy(String),
    /// The caller tried to share a file it does not own.
    NotOwner { user: String, path: String },
    /// A user name violates the registration policy.
    NamePolicy(String),
    /// The private key was re-encrypted but the personal metadata was
    /// not; the account needs operator intervention.
    MetadataRekeyFailed(String),
}

impl fmt::Display for VaultError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound(path) => write!(f, "not found: {}", path),
            Self::NoEnvelope { user, path } => {
                write!(f, "no envelope for {} on {}", user, path)
            }
            Self::AuthFailed => write!(f, "authentication failed"),
            Self::BadKeyPair(user) => write!(f, "key pair mismatch for {}", user),
            Self::EnvelopeMalformed => write!(f, "malformed envelope"),
            Self::Crypto(e) => write!(f, "crypto error: {}", e),
            Self::Decode(msg) => write!(f, "decode error: {}", msg),
            Self::Io(e) => write!(f, "i/o error: {}", e),
            Self::StoreBusy(path) => write!(f, "store busy: {}", path),
            Self::NotOwner { user, path } => {
                write!(f, "{} does not own {}", user, path)
            }
            Self::NamePolicy(name) => write!(f, "name rejected by policy: {}", name),
            Self::MetadataRekeyFailed(user) => write!(
                f,
                "metadata re-key failed for {}; envelopes still sealed under the old passphrase",
                user
            ),
        }
    }
}

impl std::error::Error for VaultError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Crypto(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for VaultError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<CryptoError> for VaultError {
    fn from(e: CryptoError) -> Self {
        Self::Crypto(e)
    }
}
