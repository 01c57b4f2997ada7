//! Driver sessions and the login policy
//!
//! One driver session exists per account, created with the account's pinned
//! proxy. Because the binding is per-session (not a process-global HTTP
//! dispatcher), concurrent calls on different accounts never race on
//! transport state.
//!
//! Login policy, in order:
//! 1. A hard-locked account is refused outright
//! 2. Stored cookies are installed without validation — session rot only
//!    surfaces on a real call, where it classifies as auth/suspension
//! 3. Otherwise: anti-burst pause, credential login under the login
//!    timeout, then capture and persist the session cookies
//! 4. A login error carrying the upstream's numeric lock code hard-locks
//!    the account in the registry

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use account_store::{Account, AccountStore, Cookie};
use scraper_driver::{DriverError, ProxySpec, Scraper, ScraperConnector};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::classify::has_locked_code;

/// Session cookies worth persisting after a credential login.
const SESSION_COOKIE_KEYS: [&str; 3] = ["auth_token", "ct0", "guest_id"];

/// Per-account driver sessions plus the login policy.
pub struct SessionManager {
    connector: Arc<dyn ScraperConnector>,
    store: Arc<AccountStore>,
    sessions: RwLock<HashMap<String, Arc<dyn Scraper>>>,
    login_wait: Duration,
    login_timeout: Duration,
}

impl SessionManager {
    pub fn new(
        connector: Arc<dyn ScraperConnector>,
        store: Arc<AccountStore>,
        login_wait: Duration,
        login_timeout: Duration,
    ) -> Self {
        Self {
            connector,
            store,
            sessions: RwLock::new(HashMap::new()),
            login_wait,
            login_timeout,
        }
    }

    /// The driver session for an account, connecting one if absent.
    pub async fn session(
        &self,
        account: &Account,
        proxy: Option<&ProxySpec>,
    ) -> Result<Arc<dyn Scraper>, DriverError> {
        {
            let sessions = self.sessions.read().await;
            if let Some(scraper) = sessions.get(&account.username) {
                return Ok(scraper.clone());
            }
        }

        let mut sessions = self.sessions.write().await;
        // Another task may have connected while we waited for the lock
        if let Some(scraper) = sessions.get(&account.username) {
            return Ok(scraper.clone());
        }
        let scraper = self.connector.connect(proxy).await?;
        debug!(username = %account.username, "connected driver session");
        sessions.insert(account.username.clone(), scraper.clone());
        Ok(scraper)
    }

    /// Make sure the session is authenticated, logging in when necessary.
    pub async fn ensure_login(
        &self,
        account: &Account,
        scraper: &Arc<dyn Scraper>,
    ) -> Result<(), DriverError> {
        if account.is_locked {
            return Err(DriverError::new(format!(
                "account locked: login refused for {}",
                account.username
            )));
        }

        if account.has_cookies() {
            scraper.set_cookies(&account.cookie_pairs()).await?;
            debug!(username = %account.username, "installed stored session cookies");
            return Ok(());
        }

        // Anti-burst: spread credential logins out
        tokio::time::sleep(self.login_wait).await;

        let totp = account
            .two_factor_secret
            .as_ref()
            .map(|s| s.expose().as_str());
        let attempt = tokio::time::timeout(
            self.login_timeout,
            scraper.login(
                &account.username,
                account.password.expose(),
                &account.email,
                totp,
            ),
        )
        .await;

        match attempt {
            Err(_elapsed) => Err(DriverError::new("login timed out")),
            Ok(Err(e)) => {
                if has_locked_code(&e.message) {
                    warn!(username = %account.username, "login reported account lock, persisting");
                    if let Err(store_err) = self.store.mark_locked(&account.username).await {
                        warn!(username = %account.username, error = %store_err,
                              "failed to persist lock flag");
                    }
                }
                Err(e)
            }
            Ok(Ok(())) => {
                self.capture_session(account, scraper).await;
                info!(username = %account.username, "credential login succeeded");
                Ok(())
            }
        }
    }

    /// Drop an account's cached session so the next dispatch reconnects.
    pub async fn evict(&self, username: &str) {
        let mut sessions = self.sessions.write().await;
        if sessions.remove(username).is_some() {
            debug!(username, "evicted driver session");
        }
    }

    /// Login-only probe used by the background sweep to reactivate idle
    /// accounts. Returns whether the account authenticated.
    pub async fn dry_run_login(&self, account: &Account, proxy: Option<&ProxySpec>) -> bool {
        let scraper = match self.session(account, proxy).await {
            Ok(s) => s,
            Err(e) => {
                debug!(username = %account.username, error = %e, "dry-run connect failed");
                return false;
            }
        };
        match self.ensure_login(account, &scraper).await {
            Ok(()) => true,
            Err(e) => {
                debug!(username = %account.username, error = %e, "dry-run login failed");
                false
            }
        }
    }

    /// Cached session count, for the stats report.
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    async fn capture_session(&self, account: &Account, scraper: &Arc<dyn Scraper>) {
        let raw = match scraper.get_cookies().await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(username = %account.username, error = %e, "failed to read session cookies");
                return;
            }
        };
        let cookies: Vec<Cookie> = raw
            .iter()
            .filter_map(|s| Cookie::parse(s))
            .filter(|c| SESSION_COOKIE_KEYS.contains(&c.key.as_str()))
            .collect();
        if cookies.is_empty() {
            warn!(username = %account.username, "login produced no session cookies");
            return;
        }
        if let Err(e) = self.store.set_cookies(&account.username, cookies).await {
            warn!(username = %account.username, error = %e, "failed to persist session cookies");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedConnector, ScriptedScraper};

    async fn manager_for(
        account: &Account,
    ) -> (SessionManager, Arc<ScriptedScraper>, Arc<AccountStore>) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.keep().join("data.json");
        let store = Arc::new(AccountStore::new(path));
        store.add(account.clone()).await.unwrap();

        let scraper = Arc::new(ScriptedScraper::default());
        let connector = Arc::new(ScriptedConnector::new(scraper.clone()));
        let manager = SessionManager::new(
            connector,
            store.clone(),
            Duration::from_millis(0),
            Duration::from_millis(200),
        );
        (manager, scraper, store)
    }

    #[tokio::test]
    async fn locked_account_is_refused_before_any_driver_call() {
        let mut account = Account::new("alice", "pw", "a@example.com");
        account.is_locked = true;
        let (manager, scraper, _store) = manager_for(&account).await;

        let session = manager.session(&account, None).await.unwrap();
        let err = manager.ensure_login(&account, &session).await.unwrap_err();
        assert!(err.message.contains("login refused"));
        assert_eq!(scraper.login_count(), 0);
        assert!(scraper.installed_cookies().is_empty());
    }

    #[tokio::test]
    async fn stored_cookies_short_circuit_login() {
        let mut account = Account::new("alice", "pw", "a@example.com");
        account.cookies.push(Cookie {
            key: "auth_token".into(),
            value: "tok".into(),
            ..Cookie::default()
        });
        let (manager, scraper, _store) = manager_for(&account).await;

        let session = manager.session(&account, None).await.unwrap();
        manager.ensure_login(&account, &session).await.unwrap();

        assert_eq!(scraper.login_count(), 0, "cookies must skip the login call");
        assert_eq!(scraper.installed_cookies(), vec![vec!["auth_token=tok".to_string()]]);
    }

    #[tokio::test]
    async fn credential_login_captures_and_persists_session_cookies() {
        let account = Account::new("alice", "pw", "a@example.com");
        let (manager, scraper, store) = manager_for(&account).await;
        scraper.set_exported_cookies(vec![
            "auth_token=tok123; Secure; HttpOnly".into(),
            "ct0=csrf456".into(),
            "guest_id=v1%3A1".into(),
            "personalization_id=drop-me".into(),
        ]);

        let session = manager.session(&account, None).await.unwrap();
        manager.ensure_login(&account, &session).await.unwrap();

        assert_eq!(scraper.login_count(), 1);
        let stored = store.find("alice").await.unwrap().unwrap();
        let keys: Vec<&str> = stored.cookies.iter().map(|c| c.key.as_str()).collect();
        assert_eq!(keys, vec!["auth_token", "ct0", "guest_id"]);
    }

    #[tokio::test]
    async fn login_error_with_lock_code_persists_the_lock() {
        let account = Account::new("alice", "pw", "a@example.com");
        let (manager, scraper, store) = manager_for(&account).await;
        scraper.push_login_result(Err(DriverError::new(
            r#"{"errors":[{"code":326,"message":"account locked"}]}"#,
        )));

        let session = manager.session(&account, None).await.unwrap();
        let err = manager.ensure_login(&account, &session).await.unwrap_err();
        assert!(err.message.contains("326"));

        let stored = store.find("alice").await.unwrap().unwrap();
        assert!(stored.is_locked);
        assert!(!stored.usable);
    }

    #[tokio::test]
    async fn plain_login_failure_does_not_lock() {
        let account = Account::new("alice", "pw", "a@example.com");
        let (manager, scraper, store) = manager_for(&account).await;
        scraper.push_login_result(Err(DriverError::new("bad credentials")));

        let session = manager.session(&account, None).await.unwrap();
        assert!(manager.ensure_login(&account, &session).await.is_err());

        let stored = store.find("alice").await.unwrap().unwrap();
        assert!(!stored.is_locked);
        assert!(stored.usable);
    }

    #[tokio::test]
    async fn slow_login_times_out() {
        let account = Account::new("alice", "pw", "a@example.com");
        let (manager, scraper, _store) = manager_for(&account).await;
        scraper.set_login_delay(Duration::from_millis(500));

        let session = manager.session(&account, None).await.unwrap();
        let err = manager.ensure_login(&account, &session).await.unwrap_err();
        assert!(err.message.contains("timed out"), "got: {}", err.message);
    }

    #[tokio::test]
    async fn sessions_are_cached_per_account_and_evictable() {
        let account = Account::new("alice", "pw", "a@example.com");
        let (manager, _scraper, _store) = manager_for(&account).await;

        manager.session(&account, None).await.unwrap();
        manager.session(&account, None).await.unwrap();
        assert_eq!(manager.session_count().await, 1);

        manager.evict("alice").await;
        assert_eq!(manager.session_count().await, 0);
    }

    #[tokio::test]
    async fn dry_run_login_reports_outcome() {
        let account = Account::new("alice", "pw", "a@example.com");
        let (manager, scraper, _store) = manager_for(&account).await;

        assert!(manager.dry_run_login(&account, None).await);

        scraper.push_login_result(Err(DriverError::new("bad credentials")));
        manager.evict("alice").await;
        assert!(!manager.dry_run_login(&account, None).await);
    }
}
