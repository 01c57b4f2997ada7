//! Account registry backed by a single JSON file
//!
//! All writes use atomic temp-file + rename to prevent corruption on crash.
//! A tokio Mutex serializes every access, which makes `load` a guarded
//! single-loader (concurrent callers wait, then observe the already-loaded
//! set) and `save` a single-writer whole-file rewrite.
//!
//! A missing registry file is a cold start with zero accounts, not an error.

use std::path::{Path, PathBuf};

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::account::{Account, Cookie};
use crate::error::{Error, Result};

/// Thread-safe account registry.
pub struct AccountStore {
    path: PathBuf,
    state: Mutex<State>,
}

struct State {
    loaded: bool,
    accounts: Vec<Account>,
}

impl AccountStore {
    /// Create a registry handle for the given file path. No I/O happens
    /// until `load` or the first accessor.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            state: Mutex::new(State {
                loaded: false,
                accounts: Vec::new(),
            }),
        }
    }

    /// Load the registry file. Idempotent: the first caller reads the file,
    /// later callers observe the loaded set. Returns the account count.
    pub async fn load(&self) -> Result<usize> {
        let mut state = self.state.lock().await;
        self.ensure_loaded(&mut state)?;
        Ok(state.accounts.len())
    }

    /// Persist the current account set to disk (whole-file atomic rewrite).
    pub async fn save(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        self.ensure_loaded(&mut state)?;
        write_atomic(&self.path, &state.accounts).await
    }

    /// Snapshot of all accounts.
    pub async fn list(&self) -> Result<Vec<Account>> {
        let mut state = self.state.lock().await;
        self.ensure_loaded(&mut state)?;
        Ok(state.accounts.clone())
    }

    /// Look up one account by username.
    pub async fn find(&self, username: &str) -> Result<Option<Account>> {
        let mut state = self.state.lock().await;
        self.ensure_loaded(&mut state)?;
        Ok(state
            .accounts
            .iter()
            .find(|a| a.username == username)
            .cloned())
    }

    /// Number of stored accounts.
    pub async fn len(&self) -> Result<usize> {
        let mut state = self.state.lock().await;
        self.ensure_loaded(&mut state)?;
        Ok(state.accounts.len())
    }

    /// Whether the registry is empty.
    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    /// Add a new account. Fails with `Conflict` when the username exists.
    pub async fn add(&self, account: Account) -> Result<()> {
        let mut state = self.state.lock().await;
        self.ensure_loaded(&mut state)?;
        if state.accounts.iter().any(|a| a.username == account.username) {
            return Err(Error::Conflict(account.username));
        }
        info!(username = %account.username, "adding account");
        state.accounts.push(account);
        write_atomic(&self.path, &state.accounts).await
    }

    /// Replace an existing account wholesale.
    pub async fn update(&self, account: Account) -> Result<()> {
        let mut state = self.state.lock().await;
        self.ensure_loaded(&mut state)?;
        let slot = state
            .accounts
            .iter_mut()
            .find(|a| a.username == account.username)
            .ok_or_else(|| Error::NotFound(account.username.clone()))?;
        *slot = account;
        write_atomic(&self.path, &state.accounts).await
    }

    /// Remove an account by username.
    pub async fn delete(&self, username: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        self.ensure_loaded(&mut state)?;
        let before = state.accounts.len();
        state.accounts.retain(|a| a.username != username);
        if state.accounts.len() == before {
            return Err(Error::NotFound(username.to_string()));
        }
        info!(username, "deleted account");
        write_atomic(&self.path, &state.accounts).await
    }

    /// Mark an account hard-locked: `is_locked = true`, `usable = false`.
    pub async fn mark_locked(&self, username: &str) -> Result<()> {
        self.mutate(username, |a| {
            a.is_locked = true;
            a.usable = false;
        })
        .await
    }

    /// Mark an account unusable without the hard lock flag.
    pub async fn mark_suspended(&self, username: &str) -> Result<()> {
        self.mutate(username, |a| a.usable = false).await
    }

    /// Replace an account's stored session cookies.
    pub async fn set_cookies(&self, username: &str, cookies: Vec<Cookie>) -> Result<()> {
        self.mutate(username, |a| a.cookies = cookies).await
    }

    /// Drop one account's stored session.
    pub async fn clear_cookies(&self, username: &str) -> Result<()> {
        self.mutate(username, |a| a.cookies.clear()).await
    }

    /// Drop every stored session. Returns how many accounts were touched.
    pub async fn clear_all_cookies(&self) -> Result<usize> {
        let mut state = self.state.lock().await;
        self.ensure_loaded(&mut state)?;
        let mut cleared = 0;
        for account in &mut state.accounts {
            if !account.cookies.is_empty() {
                account.cookies.clear();
                cleared += 1;
            }
        }
        if cleared > 0 {
            write_atomic(&self.path, &state.accounts).await?;
        }
        info!(cleared, "cleared all stored sessions");
        Ok(cleared)
    }

    /// Remove every hard-locked account. Returns how many were removed.
    pub async fn delete_locked(&self) -> Result<usize> {
        let mut state = self.state.lock().await;
        self.ensure_loaded(&mut state)?;
        let before = state.accounts.len();
        state.accounts.retain(|a| !a.is_locked);
        let removed = before - state.accounts.len();
        if removed > 0 {
            write_atomic(&self.path, &state.accounts).await?;
            info!(removed, "purged locked accounts");
        }
        Ok(removed)
    }

    fn ensure_loaded(&self, state: &mut State) -> Result<()> {
        if state.loaded {
            return Ok(());
        }
        state.accounts = if self.path.exists() {
            let contents = std::fs::read_to_string(&self.path)
                .map_err(|e| Error::Io(format!("reading account file: {e}")))?;
            let accounts: Vec<Account> = serde_json::from_str(&contents)
                .map_err(|e| Error::Parse(format!("parsing account file: {e}")))?;
            info!(path = %self.path.display(), accounts = accounts.len(), "loaded account registry");
            accounts
        } else {
            warn!(path = %self.path.display(), "account file not found, starting with empty registry");
            Vec::new()
        };
        state.loaded = true;
        Ok(())
    }

    async fn mutate(&self, username: &str, f: impl FnOnce(&mut Account)) -> Result<()> {
        let mut state = self.state.lock().await;
        self.ensure_loaded(&mut state)?;
        let account = state
            .accounts
            .iter_mut()
            .find(|a| a.username == username)
            .ok_or_else(|| Error::NotFound(username.to_string()))?;
        f(account);
        write_atomic(&self.path, &state.accounts).await
    }
}

/// Write the account set to a file atomically.
///
/// Writes to a temporary file in the same directory, then renames it over
/// the target. Permissions are 0600 since the file holds passwords and
/// live session cookies.
async fn write_atomic(path: &Path, accounts: &[Account]) -> Result<()> {
    let json = serde_json::to_string_pretty(accounts)
        .map_err(|e| Error::Parse(format!("serializing accounts: {e}")))?;

    let dir = path
        .parent()
        .ok_or_else(|| Error::Io("account path has no parent directory".into()))?;
    let tmp_path = dir.join(format!(".accounts.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Io(format!("writing temp account file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Io(format!("setting account file permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Io(format!("renaming temp account file: {e}")))?;

    debug!(path = %path.display(), "persisted account registry");
    Ok(())
}
