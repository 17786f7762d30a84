//! Global share mapping: `source -> {(recipient, targetPath), ...}`.
//!
//! One line per source file, `<source> <recipient>:<target> ...`, sealed
//! under the global sharing key. This is what drives recipient-envelope
//! refreshes when an owner rewrites a shared file.

use crate::crypto;
use crate::error::VaultError;
use crate::globalkey::SharingKey;
use crate::layout;
use crate::store::BlobStore;

// ---------------------------------------------------------------------------
// In-memory form
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq)]
struct MappingLine {
    source: String,
    recipients: Vec<(String, String)>,
}

fn serialize(lines: &[MappingLine]) -> String {
    let mut out = String::new();
    for line in lines {
        out.push_str(&line.source);
        for (recipient, target) in &line.recipients {
            out.push(' ');
            out.push_str(recipient);
            out.push(':');
            out.push_str(target);
        }
        out.push('\n');
    }
    out
}

fn deserialize(text: &str) -> Result<Vec<MappingLine>, VaultError> {
    let mut lines = Vec::new();
    for raw in text.lines() {
        if raw.trim().is_empty() {
            continue;
        }
        let mut tokens = raw.split_whitespace();
        let source = match tokens.next() {
            Some(source) => source.to_string(),
            None => continue,
        };
        let mut recipients = Vec::new();
        for token in tokens {
            let (recipient, target) = token
                .split_once(':')
                .ok_or_else(|| VaultError::Decode(format!("bad mapping token: {:?}", token)))?;
            recipients.push((recipient.to_string(), target.to_string()));
        }
        lines.push(MappingLine { source, recipients });
    }
    Ok(lines)
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

pub struct ShareMappingStore<'a> {
    store: &'a BlobStore,
}

impl<'a> ShareMappingStore<'a> {
    pub fn new(store: &'a BlobStore) -> Self {
        Self { store }
    }

    fn load(&self, g: &SharingKey) -> Result<Vec<MappingLine>, VaultError> {
        match self.store.read_all(layout::SHARE_MAPPINGS) {
            Ok(blob) if blob.len() >= crypto::NONCE_LEN => {
                let plaintext = crypto::open(g.key(), &blob)?;
                let text = String::from_utf8(plaintext)
                    .map_err(|_| VaultError::Decode("share mapping is not utf-8".to_string()))?;
                deserialize(&text)
            }
            Ok(_) => Ok(Vec::new()),
            Err(VaultError::NotFound(_)) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    fn save(&self, g: &SharingKey, lines: &[MappingLine]) -> Result<(), VaultError> {
        let sealed = crypto::seal(g.key(), serialize(lines).as_bytes())?;
        self.store.write_all_atomic(layout::SHARE_MAPPINGS, &sealed)
    }

    /// Everyone `source` has been shared with. Empty when no mapping
    /// exists yet.
    pub fn recipients_of(
        &self,
        g: &SharingKey,
        source: &str,
    ) -> Result<Vec<(String, String)>, VaultError> {
        Ok(self
            .load(g)?
            .into_iter()
            .find(|line| line.source == source)
            .map(|line| line.recipients)
            .unwrap_or_default())
    }

    /// Add or replace the `(source, recipient)` entry, preserving every
    /// other recipient of `source`.
    pub fn upsert(
        &self,
        g: &SharingKey,
        source: &str,
        recipient: &str,
        target: &str,
    ) -> Result<(), VaultError> {
        let mut lines = self.load(g)?;
        match lines.iter_mut().find(|line| line.source == source) {
            Some(line) => match line.recipients.iter_mut().find(|(r, _)| r == recipient) {
                Some(entry) => entry.1 = target.to_string(),
                None => line
                    .recipients
                    .push((recipient.to_string(), target.to_string())),
            },
            None => lines.push(MappingLine {
                source: source.to_string(),
                recipients: vec![(recipient.to_string(), target.to_string())],
            }),
        }
        self.save(g, &lines)
    }

    /// Decrypted line rendering, for admin inspection only.
    pub fn render(&self, g: &SharingKey) -> Result<String, VaultError> {
        Ok(serialize(&self.load(g)?))
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
        store.create_directory(layout::METADATA_DIR).unwrap();
        let g = SharingKey::new(AeadKey::generate().unwrap());
        (dir, store, g)
    }

    #[test]
    fn absent_mapping_means_no_recipients() {
        let (_dir, store, g) = setup();
        let mapping = ShareMappingStore::new(&store);
        assert!(mapping.recipients_of(&g, "filesystem/a/personal/f").unwrap().is_empty());
    }

    #[test]
    fn upsert_adds_and_replaces() {
        let (_dir, store, g) = setup();
        let mapping = ShareMappingStore::new(&store);
        let src = "filesystem/alice/personal/doc";

        mapping.upsert(&g, src, "bob", "filesystem/bob/shared/alice/doc").unwrap();
        mapping.upsert(&g, src, "carol", "filesystem/carol/shared/alice/doc").unwrap();
        assert_eq!(
            mapping.recipients_of(&g, src).unwrap(),
            vec![
                ("bob".to_string(), "filesystem/bob/shared/alice/doc".to_string()),
                ("carol".to_string(), "filesystem/carol/shared/alice/doc".to_string()),
            ]
        );

        // Replacing bob's target keeps carol intact and stays unique.
        mapping.upsert(&g, src, "bob", "filesystem/bob/shared/alice/doc2").unwrap();
        let recipients = mapping.recipients_of(&g, src).unwrap();
        assert_eq!(recipients.len(), 2);
        assert_eq!(recipients[0].1, "filesystem/bob/shared/alice/doc2");
    }

    #[test]
    fn sources_are_independent() {
        let (_dir, store, g) = setup();
        let mapping = ShareMappingStore::new(&store);
        mapping.upsert(&g, "filesystem/a/personal/x", "bob", "t1").unwrap();
        mapping.upsert(&g, "filesystem/a/personal/y", "carol", "t2").unwrap();
        assert_eq!(mapping.recipients_of(&g, "filesystem/a/personal/x").unwrap().len(), 1);
        assert_eq!(mapping.recipients_of(&g, "filesystem/a/personal/y").unwrap().len(), 1);
    }

    #[test]
    fn wrong_key_is_auth_failed() {
        let (_dir, store, g) = setup();
        let mapping = ShareMappingStore::new(&store);
        mapping.upsert(&g, "s", "bob", "t").unwrap();
        let wrong = SharingKey::new(AeadKey::generate().unwrap());
        assert!(matches!(
            mapping.recipients_of(&wrong, "s"),
            Err(VaultError::AuthFailed)
        ));
    }
}
