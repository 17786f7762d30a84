//! Interactive shell: one command per line against a live session.
//!
//! Users navigate a virtual root (admin sees the whole store, everyone
//! else their own directory). Commands: `cd`, `pwd`, `ls`, `cat`,
//! `mkfile`, `mkdir`, `share`, `adduser` (admin), `changepass`, `exit`.

use std::io::{self, BufRead, Write};

use crate::engine::FileEngine;
use crate::error::VaultError;
use crate::layout;
use crate::mapping::ShareMappingStore;
use crate::metadata::{PersonalMetadata, SharedMetadata};
use crate::registry::{self, UserRegistry};
use crate::session::Session;
use crate::store::BlobStore;
use crate::codec;

enum LoopAction {
    Continue,
    Exit,
}

pub struct Shell<'a> {
    store: &'a BlobStore,
    session: Session,
    /// Virtual path relative to the user's root ("" is the root).
    cwd: String,
}

impl<'a> Shell<'a> {
    pub fn new(store: &'a BlobStore, session: Session) -> Self {
        Self {
            store,
            session,
            cwd: String::new(),
        }
    }

    /// Read-eval loop until `exit`, end of input, or a completed
    /// password change (which requires a fresh login).
    pub fn run(&mut self) -> io::Result<()> {
        let stdin = io::stdin();
        let mut line = String::new();
        loop {
            print!("{}> ", self.cwd);
            io::stdout().flush()?;
            line.clear();
            if stdin.lock().read_line(&mut line)? == 0 {
                return Ok(());
            }
            if let LoopAction::Exit = self.dispatch(line.trim()) {
                return Ok(());
            }
        }
    }

    fn dispatch(&mut self, line: &str) -> LoopAction {
        if line.is_empty() {
            return LoopAction::Continue;
        }
        let (command, rest) = split_token(line);

        match command {
            "exit" => return LoopAction::Exit,
            "pwd" => self.cmd_pwd(),
            "cd" => {
                let (dir, _) = split_token(rest);
                if dir.is_empty() {
                    println!("Invalid command");
                } else {
                    self.cmd_cd(dir);
                }
            }
            "ls" => {
                let (dir, _) = split_token(rest);
                self.cmd_ls(dir);
            }
            "cat" => {
                let (name, _) = split_token(rest);
                if name.is_empty() {
                    println!("Invalid command");
                } else {
                    self.cmd_cat(name);
                }
            }
            "mkfile" => {
                let (name, contents) = split_token(rest);
                if name.is_empty() {
                    println!("Invalid command");
                } else {
                    self.cmd_mkfile(name, contents);
                }
            }
            "mkdir" => {
                let (name, _) = split_token(rest);
                if name.is_empty() || registry::check_name(name).is_err() {
                    println!("Invalid command");
                } else {
                    self.cmd_mkdir(name);
                }
            }
            "share" => {
                let mut tokens = rest.split_whitespace();
                match (tokens.next(), tokens.next()) {
                    (Some(name), Some(target)) => self.cmd_share(name, target),
                    _ => println!("Invalid command"),
                }
            }
            "adduser" => {
                let (name, _) = split_token(rest);
                if !self.session.is_admin() || name.is_empty() {
                    println!("Invalid command");
                } else {
                    self.cmd_adduser(name);
                }
            }
            "changepass" => {
                if self.cmd_changepass() {
                    return LoopAction::Exit;
                }
            }
            _ => println!("Invalid command"),
        }
        LoopAction::Continue
    }

    // -----------------------------------------------------------------------
    // Navigation
    // -----------------------------------------------------------------------

    fn cmd_pwd(&self) {
        println!("/{}", self.cwd);
    }

    fn cmd_cd(&mut self, dir: &str) {
        let normalized = layout::normalize(&self.cwd, dir);
        let actual = layout::resolve(self.session.user(), &normalized);
        if self.store.is_directory(&actual) {
            self.cwd = normalized;
        } else {
            println!("Path does not exist, or is inaccessible");
        }
    }

    fn cmd_ls(&self, dir: &str) {
        let normalized = layout::normalize(&self.cwd, dir);
        let actual = layout::resolve(self.session.user(), &normalized);
        let entries = match self.store.list(&actual) {
            Ok(entries) => entries,
            Err(_) => {
                println!("Directory doesn't exist");
                return;
            }
        };
        println!("d -> .");
        println!("d -> ..");
        for name in entries {
            let child = format!("{}/{}", actual, name);
            if self.store.is_directory(&child) {
                println!("d -> {}", name);
            } else {
                println!("f -> {}", name);
            }
        }
    }

    // -----------------------------------------------------------------------
    // Reading
    // -----------------------------------------------------------------------

    fn cmd_cat(&self, name: &str) {
        let normalized = layout::normalize(&self.cwd, name);
        let actual = layout::resolve(self.session.user(), &normalized);

        if self.session.is_admin() && self.cat_admin_special(&actual) {
            return;
        }

        let engine = FileEngine::new(self.store);
        match engine.read(
            &actual,
            self.session.user(),
            self.session.passphrase(),
            self.session.derived_key(),
            self.session.sharing_key(),
        ) {
            Ok(plaintext) => println!("{}", String::from_utf8_lossy(&plaintext)),
            Err(e) => {
                tracing::debug!(path = %actual, error = %e, "cat failed");
                println!("{} doesn't exist or decryption failed", name);
            }
        }
    }

    /// Admin-only views of the store's own metadata. Only admin's `cat`
    /// may render the sharing state; everything else under `metadata/`
    /// or `keyfiles/` stays opaque.
    fn cat_admin_special(&self, actual: &str) -> bool {
        let g = self.session.sharing_key();

        if actual == layout::wrapped_global_key(layout::ADMIN) {
            println!("{}", hex::encode(g.key().as_bytes()));
            return true;
        }
        if actual == layout::personal_store(layout::ADMIN) {
            match PersonalMetadata::new(self.store).load(layout::ADMIN, self.session.derived_key())
            {
                Ok(entries) => print!("{}", codec::serialize(&entries)),
                Err(_) => println!("Failed to decrypt {}", actual),
            }
            return true;
        }
        if actual == layout::SHARE_MAPPINGS {
            match ShareMappingStore::new(self.store).render(g) {
                Ok(text) => print!("{}", text),
                Err(_) => println!("Failed to decrypt {}", actual),
            }
            return true;
        }
        if let Some(user) = actual
            .strip_prefix("filesystem/metadata/")
            .and_then(|rest| rest.strip_suffix("/shared_envelopes.enc"))
        {
            match SharedMetadata::new(self.store).load(user, g) {
                Ok(entries) => print!("{}", codec::serialize(&entries)),
                Err(_) => println!("Failed to decrypt {}", actual),
            }
            return true;
        }
        if actual.starts_with(layout::METADATA_DIR) || actual.starts_with(layout::KEYFILES_DIR) {
            println!("Keys and key data are private; raw encrypted contents:");
            match self.store.read_all(actual) {
                Ok(raw) => println!("{}", hex::encode(raw)),
                Err(_) => println!("Unable to read file"),
            }
            return true;
        }
        false
    }

    // -----------------------------------------------------------------------
    // Creation
    // -----------------------------------------------------------------------

    fn cmd_mkfile(&self, name: &str, contents: &str) {
        let normalized = layout::normalize(&self.cwd, name);
        if !layout::creation_allowed(&normalized, self.session.is_admin()) {
            println!("Forbidden");
            return;
        }
        let actual = layout::resolve(self.session.user(), &normalized);
        let engine = FileEngine::new(self.store);
        if let Err(e) = engine.write(
            &actual,
            contents.as_bytes(),
            self.session.user(),
            self.session.derived_key(),
            self.session.sharing_key(),
        ) {
            tracing::debug!(path = %actual, error = %e, "mkfile failed");
            println!("Error creating file");
        }
    }

    fn cmd_mkdir(&self, name: &str) {
        let normalized = layout::normalize(&self.cwd, name);
        if !layout::creation_allowed(&normalized, self.session.is_admin()) {
            println!("Forbidden");
            return;
        }
        let actual = layout::resolve(self.session.user(), &normalized);
        if self.store.is_directory(&actual) {
            println!("Directory already exists");
        } else if self.store.create_directory(&actual).is_err() {
            println!("Error creating directory");
        }
    }

    // -----------------------------------------------------------------------
    // Sharing
    // -----------------------------------------------------------------------

    fn cmd_share(&self, name: &str, target_user: &str) {
        let normalized = layout::normalize(&self.cwd, name);
        if !layout::share_allowed(&normalized, self.session.is_admin()) {
            println!("Forbidden");
            return;
        }
        let source = layout::resolve(self.session.user(), &normalized);
        if !self.store.exists(&source) {
            println!("File {} doesn't exist", name);
            return;
        }
        if !UserRegistry::new(self.store).user_exists(target_user) {
            println!("User {} doesn't exist", target_user);
            return;
        }

        let engine = FileEngine::new(self.store);
        match engine.share(
            &source,
            target_user,
            self.session.user(),
            self.session.passphrase(),
            self.session.derived_key(),
            self.session.sharing_key(),
        ) {
            Ok(_) => println!("File shared with {}", target_user),
            Err(VaultError::NotOwner { .. }) => {
                println!("You can only share files you own");
            }
            Err(e) => {
                tracing::debug!(path = %source, error = %e, "share failed");
                println!("Error sharing file");
            }
        }
    }

    // -----------------------------------------------------------------------
    // Accounts
    // -----------------------------------------------------------------------

    fn cmd_adduser(&self, name: &str) {
        let registry = UserRegistry::new(self.store);
        match registry.add_user(name, self.session.sharing_key()) {
            Ok(passphrase) => {
                println!("Added user: {}", name);
                println!("Temporary passphrase for {} is: {}", name, passphrase);
                println!("The user must change this passphrase at first login");
            }
            Err(VaultError::NamePolicy(reason)) => {
                println!("Invalid username: {}", reason);
            }
            Err(e) => {
                tracing::debug!(user = name, error = %e, "adduser failed");
                println!("Error creating user");
            }
        }
    }

    /// Returns true when the password change went through and the
    /// session must be re-opened.
    fn cmd_changepass(&mut self) -> bool {
        let old_pass = match rpassword::prompt_password("Enter current passphrase: ") {
            Ok(p) => p,
            Err(_) => return false,
        };
        let new_pass = match rpassword::prompt_password("Enter new passphrase: ") {
            Ok(p) => p,
            Err(_) => return false,
        };
        let confirm = match rpassword::prompt_password("Confirm new passphrase: ") {
            Ok(p) => p,
            Err(_) => return false,
        };
        if new_pass.is_empty() || new_pass != confirm {
            println!("Passphrases do not match or are empty");
            return false;
        }

        let registry = UserRegistry::new(self.store);
        match registry.change_password(self.session.user(), &old_pass, &new_pass) {
            Ok(()) => {
                println!("Password changed successfully");
                println!("Please log in again");
                true
            }
            Err(VaultError::AuthFailed) => {
                println!("Incorrect current passphrase");
                false
            }
            Err(VaultError::MetadataRekeyFailed(_)) => {
                println!("Private key re-encrypted, but envelope metadata could not be re-keyed.");
                println!("Your owned files are still sealed under the old passphrase; contact the operator.");
                true
            }
            Err(e) => {
                tracing::debug!(error = %e, "changepass failed");
                println!("Password change failed");
                false
            }
        }
    }
}

/// Split off the first whitespace-delimited token; the remainder keeps
/// its internal spacing (used for `mkfile` contents) but is trimmed.
fn split_token(input: &str) -> (&str, &str) {
    let input = input.trim();
    match input.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (input, ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_splitting() {
        assert_eq!(split_token("mkfile note hello  world"), ("mkfile", "note hello  world"));
        assert_eq!(split_token("pwd"), ("pwd", ""));
        assert_eq!(split_token("  ls   dir  "), ("ls", "dir"));
        assert_eq!(split_token(""), ("", ""));
    }
}
