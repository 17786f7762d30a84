//! On-disk layout and virtual path rules.
//!
//! ```text
//! <root>/filesystem/keyfiles/<user>_keyfile.pem    private keys (encrypted PEM)
//! <root>/public_keys/<user>_keyfile.pem            public keys (PEM)
//! <root>/filesystem/metadata/<user>/envelopes.enc         personal envelope store
//! <root>/filesystem/metadata/<user>/shared_envelopes.enc  shared envelope store
//! <root>/filesystem/metadata/<user>/globalKey.enc         wrapped sharing key
//! <root>/filesystem/metadata/<user>/kdf.salt              per-user KDF salt
//! <root>/filesystem/metadata/share_mappings.mapping       global share mapping
//! <root>/filesystem/<user>/personal/...                   owned ciphertext bodies
//! <root>/filesystem/<user>/shared/<from>/...              hard links to shared bodies
//! ```
//!
//! All functions return store-relative path strings. Shell commands see a
//! per-user virtual root instead: `filesystem` for admin, the user's own
//! directory for everyone else.

pub const ADMIN: &str = "admin";
pub const FILESYSTEM: &str = "filesystem";
pub const PUBLIC_KEYS: &str = "public_keys";
pub const KEYFILES_DIR: &str = "filesystem/keyfiles";
pub const METADATA_DIR: &str = "filesystem/metadata";
pub const SHARE_MAPPINGS: &str = "filesystem/metadata/share_mappings.mapping";

// ---------------------------------------------------------------------------
// Store paths
// ---------------------------------------------------------------------------

pub fn private_key_file(user: &str) -> String {
    format!("{}/{}_keyfile.pem", KEYFILES_DIR, user)
}

pub fn public_key_file(user: &str) -> String {
    format!("{}/{}_keyfile.pem", PUBLIC_KEYS, user)
}

pub fn metadata_dir(user: &str) -> String {
    format!("{}/{}", METADATA_DIR, user)
}

pub fn personal_store(user: &str) -> String {
    format!("{}/{}/envelopes.enc", METADATA_DIR, user)
}

pub fn shared_store(user: &str) -> String {
    format!("{}/{}/shared_envelopes.enc", METADATA_DIR, user)
}

pub fn wrapped_global_key(user: &str) -> String {
    format!("{}/{}/globalKey.enc", METADATA_DIR, user)
}

pub fn kdf_salt(user: &str) -> String {
    format!("{}/{}/kdf.salt", METADATA_DIR, user)
}

pub fn user_root(user: &str) -> String {
    format!("{}/{}", FILESYSTEM, user)
}

pub fn personal_dir(user: &str) -> String {
    format!("{}/{}/personal", FILESYSTEM, user)
}

pub fn shared_dir(user: &str) -> String {
    format!("{}/{}/shared", FILESYSTEM, user)
}

// ---------------------------------------------------------------------------
// Virtual navigation
// ---------------------------------------------------------------------------

/// Root of a user's virtual view, as a store-relative path.
pub fn virtual_base(user: &str) -> String {
    if user == ADMIN {
        FILESYSTEM.to_string()
    } else {
        user_root(user)
    }
}

/// Resolve `input` against the virtual directory `current`, handling `.`
/// and `..` and clamping at the virtual root. A leading `/` means the
/// virtual root. Returns the new virtual-relative path ("" is the root).
pub fn normalize(current: &str, input: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    if !input.starts_with('/') {
        parts.extend(current.split('/').filter(|s| !s.is_empty()));
    }
    for token in input.split('/').filter(|s| !s.is_empty()) {
        match token {
            "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    parts.join("/")
}

/// Store-relative path for a virtual-relative one.
pub fn resolve(user: &str, virtual_path: &str) -> String {
    let base = virtual_base(user);
    if virtual_path.is_empty() {
        base
    } else {
        format!("{}/{}", base, virtual_path)
    }
}

/// Creation (`mkfile`, `mkdir`) is confined to the personal subtree.
pub fn creation_allowed(virtual_path: &str, is_admin: bool) -> bool {
    let prefix = if is_admin { "admin/personal/" } else { "personal/" };
    virtual_path.starts_with(prefix)
}

/// `share` may name files in the personal or shared subtrees.
pub fn share_allowed(virtual_path: &str, is_admin: bool) -> bool {
    let (personal, shared) = if is_admin {
        ("admin/personal/", "admin/shared/")
    } else {
        ("personal/", "shared/")
    };
    virtual_path.starts_with(personal) || virtual_path.starts_with(shared)
}

/// Where a shared file appears in the recipient's view.
///
/// A source under the sender's personal tree lands at
/// `filesystem/<recipient>/shared/<sender>/<relative>`; re-sharing from
/// the sender's own shared tree preserves the path below `shared/`.
pub fn shared_target(source: &str, sender: &str, recipient: &str) -> Option<String> {
    let personal_prefix = format!("{}/", personal_dir(sender));
    let shared_prefix = format!("{}/", shared_dir(sender));
    let relative = source
        .strip_prefix(&personal_prefix)
        .or_else(|| source.strip_prefix(&shared_prefix))?;
    if relative.is_empty() {
        return None;
    }
    Some(format!("{}/{}/{}", shared_dir(recipient), sender, relative))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
