//! Envelope store codec: line-oriented `(path, envelope)` records,
//! sealed as one AEAD blob.
//!
//! Each record serializes to `<path> <hex(envelope)>\n`. Paths never
//! contain whitespace (the registry's name policy and the shell's
//! tokenizer enforce that upstream).

use crate::crypto::{self, AeadKey};
use crate::error::VaultError;

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// One envelope record: which file, and the wrapped data key for it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnvelopeEntry {
    pub path: String,
    pub envelope: Vec<u8>,
}

// ---------------------------------------------------------------------------
// Line serialization
// ---------------------------------------------------------------------------

pub fn serialize(entries: &[EnvelopeEntry]) -> String {
    let mut out = String::new();
    for entry in entries {
        out.push_str(&entry.path);
        out.push(' ');
        out.push_str(&hex::encode(&entry.envelope));
        out.push('\n');
    }
    out
}

/// Parse the line form. Blank lines are skipped; anything else that is
/// not `<path> <hex>` is a decode error.
pub fn deserialize(text: &str) -> Result<Vec<EnvelopeEntry>, VaultError> {
    let mut entries = Vec::new();
    for line in text.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let mut tokens = line.split_whitespace();
        let (path, envelope_hex) = match (tokens.next(), tokens.next(), tokens.next()) {
            (Some(path), Some(envelope), None) => (path, envelope),
            _ => return Err(VaultError::Decode(format!("bad envelope line: {:?}", line))),
        };
        let envelope = hex::decode(envelope_hex)
            .map_err(|_| VaultError::Decode(format!("bad envelope hex for {}", path)))?;
        entries.push(EnvelopeEntry {
            path: path.to_string(),
            envelope,
        });
    }
    Ok(entries)
}

// ---------------------------------------------------------------------------
// Sealed form
// ---------------------------------------------------------------------------

/// Serialize and seal a store as `nonce || ciphertext || tag`. An empty
/// store still seals to a valid (tag-only) blob.
pub fn seal_store(key: &AeadKey, entries: &[EnvelopeEntry]) -> Result<Vec<u8>, VaultError> {
    crypto::seal(key, serialize(entries).as_bytes())
}

/// Open a sealed store. Tag failure is `AuthFailed`, never an empty list.
pub fn open_store(key: &AeadKey, blob: &[u8]) -> Result<Vec<EnvelopeEntry>, VaultError> {
    let plaintext = crypto::open(key, blob)?;
    let text = String::from_utf8(plaintext)
        .map_err(|_| VaultError::Decode("envelope store is not utf-8".to_string()))?;
    deserialize(&text)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
