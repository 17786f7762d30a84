//! vaultfs: encrypted multi-user file store shell
//!
//! Usage:
//!   vaultfs <username>
//!
//! The store lives under the current working directory (`filesystem/`
//! plus `public_keys/`). The first run creates the admin principal and
//! prints its passphrase once; `adduser` (as admin) creates everyone
//! else. Exit code 0 on a clean exit, 1 on startup failure.

use std::process::ExitCode;

use vaultfs::{BlobStore, Session, Shell, UserRegistry, VaultError};

fn main() -> ExitCode {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let user = match (args.next(), args.next()) {
        (Some(user), None) => user,
        _ => return Err("usage: vaultfs <username>".into()),
    };

    let cwd = std::env::current_dir()?;
    let store = BlobStore::new(cwd);

    // One live session per store.
    let _lock = store.lock_session().map_err(|e| match e {
        VaultError::StoreBusy(path) => format!("another session holds the store lock ({})", path),
        other => other.to_string(),
    })?;

    let registry = UserRegistry::new(&store);
    if let Some(passphrase) = registry.bootstrap_admin()? {
        eprintln!("First run: created the admin principal.");
        eprintln!("Admin passphrase (shown once): {}", passphrase);
        eprintln!();
    }

    let passphrase = rpassword::prompt_password(format!("Passphrase for {}: ", user))?;
    let session = match Session::open(&store, &user, &passphrase) {
        Ok(session) => session,
        Err(VaultError::AuthFailed) => return Err("authentication failed".into()),
        Err(VaultError::BadKeyPair(user)) => {
            return Err(format!("key pair mismatch for {}", user).into())
        }
        Err(VaultError::NotFound(_)) => return Err(format!("unknown user: {}", user).into()),
        Err(e) => return Err(e.to_string().into()),
    };

    println!("Logged in as {}", session.user());
    print!("Available commands: cd, pwd, ls, cat, share, mkdir, mkfile, changepass, exit");
    if session.is_admin() {
        print!(", adduser");
    }
    println!();

    let mut shell = Shell::new(&store, session);
    shell.run()?;
    Ok(())
}
