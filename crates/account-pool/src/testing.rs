//! Scripted driver doubles for orchestrator tests
//!
//! `ScriptedScraper` answers each verb from a per-verb FIFO of queued
//! results, falling back to `Ok(Default::default())` when the queue is
//! empty, and records every call it sees. `ScriptedConnector` hands out a
//! shared scripted session and remembers the proxy it was asked to bind.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use account_store::{Account, AccountStore, Cookie};
use async_trait::async_trait;
use scraper_driver::{
    DriverError, Profile, ProfilePage, ProxySpec, Result as DriverResult, Scraper,
    ScraperConnector, SearchMode, Tweet, TweetPage,
};

use crate::breaker::CircuitBreaker;
use crate::config::PoolConfig;
use crate::dispatch::Dispatcher;
use crate::gate::ConcurrencyGate;
use crate::health::HealthTracker;
use crate::proxy::ProxyPool;
use crate::session::SessionManager;

#[derive(Default)]
pub struct ScriptedScraper {
    login_results: Mutex<VecDeque<DriverResult<()>>>,
    login_delay: Mutex<Option<Duration>>,
    login_count: AtomicUsize,
    exported_cookies: Mutex<Vec<String>>,
    installed_cookies: Mutex<Vec<Vec<String>>>,
    profiles: Mutex<VecDeque<DriverResult<Profile>>>,
    tweet_lists: Mutex<VecDeque<DriverResult<Vec<Tweet>>>>,
    tweet_pages: Mutex<VecDeque<DriverResult<TweetPage>>>,
    search_pages: Mutex<VecDeque<DriverResult<TweetPage>>>,
    single_tweets: Mutex<VecDeque<DriverResult<Tweet>>>,
    profile_pages: Mutex<VecDeque<DriverResult<ProfilePage>>>,
    profile_lists: Mutex<VecDeque<DriverResult<Vec<Profile>>>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedScraper {
    pub fn push_login_result(&self, result: DriverResult<()>) {
        self.login_results.lock().unwrap().push_back(result);
    }

    pub fn set_login_delay(&self, delay: Duration) {
        *self.login_delay.lock().unwrap() = Some(delay);
    }

    pub fn set_exported_cookies(&self, cookies: Vec<String>) {
        *self.exported_cookies.lock().unwrap() = cookies;
    }

    pub fn push_profile(&self, result: DriverResult<Profile>) {
        self.profiles.lock().unwrap().push_back(result);
    }

    pub fn push_tweet_list(&self, result: DriverResult<Vec<Tweet>>) {
        self.tweet_lists.lock().unwrap().push_back(result);
    }

    pub fn push_tweet_page(&self, result: DriverResult<TweetPage>) {
        self.tweet_pages.lock().unwrap().push_back(result);
    }

    pub fn push_search_page(&self, result: DriverResult<TweetPage>) {
        self.search_pages.lock().unwrap().push_back(result);
    }

    pub fn push_single_tweet(&self, result: DriverResult<Tweet>) {
        self.single_tweets.lock().unwrap().push_back(result);
    }

    pub fn push_profile_page(&self, result: DriverResult<ProfilePage>) {
        self.profile_pages.lock().unwrap().push_back(result);
    }

    pub fn push_profile_list(&self, result: DriverResult<Vec<Profile>>) {
        self.profile_lists.lock().unwrap().push_back(result);
    }

    pub fn login_count(&self) -> usize {
        self.login_count.load(Ordering::SeqCst)
    }

    pub fn installed_cookies(&self) -> Vec<Vec<String>> {
        self.installed_cookies.lock().unwrap().clone()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }

    fn pop<T: Default>(queue: &Mutex<VecDeque<DriverResult<T>>>) -> DriverResult<T> {
        queue
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(T::default()))
    }
}

#[async_trait]
impl Scraper for ScriptedScraper {
    async fn search_tweets(
        &self,
        query: &str,
        _mode: SearchMode,
        _cursor: Option<&str>,
    ) -> DriverResult<TweetPage> {
        self.record(format!("search_tweets:{query}"));
        Self::pop(&self.search_pages)
    }

    async fn get_profile(&self, username: &str) -> DriverResult<Profile> {
        self.record(format!("get_profile:{username}"));
        Self::pop(&self.profiles)
    }

    async fn get_profile_by_user_id(&self, user_id: &str) -> DriverResult<Profile> {
        self.record(format!("get_profile_by_user_id:{user_id}"));
        Self::pop(&self.profiles)
    }

    async fn get_tweets(&self, username: &str, _max: usize) -> DriverResult<Vec<Tweet>> {
        self.record(format!("get_tweets:{username}"));
        Self::pop(&self.tweet_lists)
    }

    async fn get_tweets_and_replies(&self, username: &str, _max: usize) -> DriverResult<Vec<Tweet>> {
        self.record(format!("get_tweets_and_replies:{username}"));
        Self::pop(&self.tweet_lists)
    }

    async fn get_user_tweets(
        &self,
        id_or_name: &str,
        _page_size: usize,
        cursor: Option<&str>,
    ) -> DriverResult<TweetPage> {
        self.record(format!(
            "get_user_tweets:{id_or_name}:{}",
            cursor.unwrap_or("-")
        ));
        Self::pop(&self.tweet_pages)
    }

    async fn get_tweet(&self, id: &str) -> DriverResult<Tweet> {
        self.record(format!("get_tweet:{id}"));
        Self::pop(&self.single_tweets)
    }

    async fn fetch_profile_followers(
        &self,
        user_id: &str,
        _max: usize,
        _cursor: Option<&str>,
    ) -> DriverResult<ProfilePage> {
        self.record(format!("fetch_profile_followers:{user_id}"));
        Self::pop(&self.profile_pages)
    }

    async fn fetch_profile_following(
        &self,
        user_id: &str,
        _max: usize,
        _cursor: Option<&str>,
    ) -> DriverResult<ProfilePage> {
        self.record(format!("fetch_profile_following:{user_id}"));
        Self::pop(&self.profile_pages)
    }

    async fn search_profiles(&self, query: &str, _max: usize) -> DriverResult<Vec<Profile>> {
        self.record(format!("search_profiles:{query}"));
        Self::pop(&self.profile_lists)
    }

    async fn set_cookies(&self, cookies: &[String]) -> DriverResult<()> {
        self.record("set_cookies");
        self.installed_cookies.lock().unwrap().push(cookies.to_vec());
        Ok(())
    }

    async fn get_cookies(&self) -> DriverResult<Vec<String>> {
        self.record("get_cookies");
        Ok(self.exported_cookies.lock().unwrap().clone())
    }

    async fn login(
        &self,
        username: &str,
        _password: &str,
        _email: &str,
        _totp_secret: Option<&str>,
    ) -> DriverResult<()> {
        self.record(format!("login:{username}"));
        self.login_count.fetch_add(1, Ordering::SeqCst);
        let delay = *self.login_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.login_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(()))
    }
}

pub struct ScriptedConnector {
    scraper: Arc<ScriptedScraper>,
    connects: AtomicUsize,
    last_proxy: Mutex<Option<ProxySpec>>,
    fail_connect: Mutex<Option<DriverError>>,
}

impl ScriptedConnector {
    pub fn new(scraper: Arc<ScriptedScraper>) -> Self {
        Self {
            scraper,
            connects: AtomicUsize::new(0),
            last_proxy: Mutex::new(None),
            fail_connect: Mutex::new(None),
        }
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn last_proxy(&self) -> Option<ProxySpec> {
        self.last_proxy.lock().unwrap().clone()
    }

    pub fn fail_next_connect(&self, error: DriverError) {
        *self.fail_connect.lock().unwrap() = Some(error);
    }
}

#[async_trait]
impl ScraperConnector for ScriptedConnector {
    async fn connect(&self, proxy: Option<&ProxySpec>) -> DriverResult<Arc<dyn Scraper>> {
        if let Some(error) = self.fail_connect.lock().unwrap().take() {
            return Err(error);
        }
        self.connects.fetch_add(1, Ordering::SeqCst);
        *self.last_proxy.lock().unwrap() = proxy.cloned();
        Ok(self.scraper.clone())
    }
}

/// A fully wired dispatcher over a temp registry and a scripted driver.
pub struct PoolHarness {
    pub dispatcher: Dispatcher,
    pub store: Arc<AccountStore>,
    pub scraper: Arc<ScriptedScraper>,
    pub connector: Arc<ScriptedConnector>,
    _dir: tempfile::TempDir,
}

/// Build a harness with the given usable accounts (each seeded with a
/// stored cookie, so login is a cheap cookie install) and test-friendly
/// tunables.
pub async fn pool_harness(
    accounts: &[&str],
    tune: impl FnOnce(&mut PoolConfig),
) -> PoolHarness {
    let mut config = PoolConfig::default();
    config.login_wait_ms = 0;
    config.gate_budget_ms = 200;
    tune(&mut config);

    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(AccountStore::new(dir.path().join("data.json")));
    for name in accounts {
        let mut account = Account::new(*name, "pw", format!("{name}@example.com"));
        account.cookies.push(Cookie {
            key: "auth_token".into(),
            value: format!("tok_{name}"),
            ..Cookie::default()
        });
        store.add(account).await.unwrap();
    }

    let scraper = Arc::new(ScriptedScraper::default());
    let connector = Arc::new(ScriptedConnector::new(scraper.clone()));
    let sessions = Arc::new(SessionManager::new(
        connector.clone(),
        store.clone(),
        config.login_wait(),
        Duration::from_millis(config.timeouts.login_ms),
    ));
    let proxies = Arc::new(ProxyPool::from_lines([], config.proxy_spacing()));
    let health = Arc::new(HealthTracker::new(&config));
    let breaker = Arc::new(CircuitBreaker::new(
        config.breaker_failure_threshold,
        config.breaker_open(),
    ));
    let gate = Arc::new(ConcurrencyGate::new(
        config.gate_capacity,
        config.gate_budget(),
    ));
    let dispatcher = Dispatcher::new(
        store.clone(),
        proxies,
        health,
        breaker,
        gate,
        sessions,
        &config,
    );

    PoolHarness {
        dispatcher,
        store,
        scraper,
        connector,
        _dir: dir,
    }
}
