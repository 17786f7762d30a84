//! # vaultfs
//!
//! Multi-user encrypted virtual file store.
//!
//! Every file body is sealed under its own fresh data key. The data key
//! is wrapped twice: once to the owner's RSA public key (the *owner
//! envelope*, held in that user's personal metadata) and once under the
//! 256-bit global sharing key for every authorized reader (the *shared
//! envelopes*). Admin holds a shared envelope for every non-admin file,
//! so admin can always read; the share mapping records who else can,
//! and rewrites re-wrap the new data key for all of them.
//!
//! ## Quick start
//!
//! ```no_run
//! use vaultfs::{BlobStore, FileEngine, Session, UserRegistry};
//!
//! let store = BlobStore::new(".");
//! let registry = UserRegistry::new(&store);
//! let admin_pass = registry.bootstrap_admin().unwrap().unwrap();
//!
//! let session = Session::open(&store, "admin", &admin_pass).unwrap();
//! let engine = FileEngine::new(&store);
//! engine
//!     .write(
//!         "filesystem/admin/personal/note",
//!         b"hello",
//!         session.user(),
//!         session.derived_key(),
//!         session.sharing_key(),
//!     )
//!     .unwrap();
//! ```
//!
//! ## Security properties
//!
//! - **Fresh data keys**: a key and IV encrypt exactly one body; every
//!   rewrite re-keys and re-wraps.
//! - **Authenticated everything**: bodies, envelope stores and the share
//!   mapping are AES-256-GCM sealed; tampering surfaces as a tag failure,
//!   never as garbage plaintext.
//! - **Wrapped-only sharing key**: the global key exists on disk only
//!   encrypted to individual users' public keys.
//!
//! ## What's NOT provided
//!
//! - Cross-process concurrency (a session takes an advisory lock)
//! - Secure deletion of superseded ciphertext
//! - Forward secrecy
//! - Protection against a malicious administrator

#![deny(unsafe_code)]

pub mod codec;
pub mod crypto;
pub mod engine;
pub mod error;
pub mod globalkey;
pub mod layout;
pub mod mapping;
pub mod metadata;
pub mod registry;
pub mod session;
pub mod shell;
pub mod store;

pub use codec::EnvelopeEntry;
pub use crypto::AeadKey;
pub use engine::FileEngine;
pub use error::{CryptoError, VaultError};
pub use globalkey::{GlobalKeyManager, SharingKey};
pub use mapping::ShareMappingStore;
pub use metadata::{PersonalMetadata, SharedMetadata};
pub use registry::UserRegistry;
pub use session::Session;
pub use shell::Shell;
pub use store::{BlobStore, StoreLock};
