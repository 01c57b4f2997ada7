//! The orchestration loop
//!
//! `execute` runs one upstream operation through the pool: breaker check,
//! concurrency gate, then up to `max_attempts` tries of select account →
//! bind proxy → login → run under a scaled timeout → classify → update
//! health. Terminal per-account failures (lock, suspension, timeout) skip
//! the account for the rest of the dispatch without consuming an attempt;
//! recoverable failures burn one attempt and move on. The breaker learns
//! one overall verdict per dispatch.
//!
//! Dispatch never surfaces errors: callers get `Some(payload)` or `None`,
//! and the registry/health side effects happen internally.

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use account_store::{Account, AccountStore};
use rand::Rng;
use scraper_driver::{Profile, ProfilePage, Scraper, Tweet, TweetPage};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::breaker::{BreakerState, CircuitBreaker};
use crate::classify::{classify, ErrorKind};
use crate::config::{PoolConfig, TimeoutClasses};
use crate::gate::ConcurrencyGate;
use crate::health::{Admission, HealthTracker};
use crate::proxy::{ProxyPool, Reservation};
use crate::session::SessionManager;

/// Batches at or below this size fan out as independent dispatches.
const SMALL_BATCH_LIMIT: usize = 5;
/// Concurrent slot width inside a single-account batch.
const BATCH_CHUNK: usize = 10;

/// Timeout class assigned to each catalog operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutClass {
    Login,
    Search,
    Profile,
    Tweet,
    Default,
}

impl TimeoutClass {
    pub fn duration(&self, timeouts: &TimeoutClasses) -> Duration {
        let ms = match self {
            TimeoutClass::Login => timeouts.login_ms,
            TimeoutClass::Search => timeouts.search_ms,
            TimeoutClass::Profile => timeouts.profile_ms,
            TimeoutClass::Tweet => timeouts.tweet_ms,
            TimeoutClass::Default => timeouts.default_ms,
        };
        Duration::from_millis(ms)
    }
}

/// Payloads the dispatcher can inspect for the "no data" case.
///
/// An empty payload is recorded as a failure and retried on another
/// account; the last empty one is still returned if every attempt drains.
pub trait Payload: Send {
    fn is_empty_payload(&self) -> bool {
        false
    }
}

impl<T: Send> Payload for Vec<T> {
    fn is_empty_payload(&self) -> bool {
        self.is_empty()
    }
}

impl<T: Payload> Payload for Option<T> {
    fn is_empty_payload(&self) -> bool {
        match self {
            None => true,
            Some(inner) => inner.is_empty_payload(),
        }
    }
}

impl Payload for serde_json::Value {
    fn is_empty_payload(&self) -> bool {
        match self {
            serde_json::Value::Null => true,
            serde_json::Value::Array(items) => items.is_empty(),
            _ => false,
        }
    }
}

impl Payload for Profile {}
impl Payload for Tweet {}
impl Payload for () {}

impl Payload for TweetPage {
    fn is_empty_payload(&self) -> bool {
        self.tweets.is_empty()
    }
}

impl Payload for ProfilePage {
    fn is_empty_payload(&self) -> bool {
        self.profiles.is_empty()
    }
}

/// What an operation closure receives: the logged-in driver session and the
/// account it runs as.
pub struct OpContext {
    pub scraper: Arc<dyn Scraper>,
    pub account: Account,
}

pub type OpFuture<T> = Pin<Box<dyn Future<Output = scraper_driver::Result<T>> + Send>>;

/// A retryable operation closure. Dispatch may invoke it several times,
/// each on a different account.
pub type Operation<T> = Arc<dyn Fn(OpContext) -> OpFuture<T> + Send + Sync>;

/// Wrap an async closure as an `Operation`.
pub fn operation<T, F, Fut>(f: F) -> Operation<T>
where
    F: Fn(OpContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = scraper_driver::Result<T>> + Send + 'static,
{
    Arc::new(move |cx| Box::pin(f(cx)))
}

enum Selection {
    Chosen(Account),
    /// Everything usable is rate-limited; soonest ready after this wait.
    Wait(Duration),
    None,
}

/// The orchestrator's dispatch engine. All collaborators are injected;
/// the dispatcher owns nothing long-lived itself.
#[derive(Clone)]
pub struct Dispatcher {
    pub(crate) store: Arc<AccountStore>,
    pub(crate) proxies: Arc<ProxyPool>,
    pub(crate) health: Arc<HealthTracker>,
    pub(crate) breaker: Arc<CircuitBreaker>,
    pub(crate) gate: Arc<ConcurrencyGate>,
    pub(crate) sessions: Arc<SessionManager>,
    timeouts: TimeoutClasses,
    max_attempts: u32,
}

impl Dispatcher {
    pub fn new(
        store: Arc<AccountStore>,
        proxies: Arc<ProxyPool>,
        health: Arc<HealthTracker>,
        breaker: Arc<CircuitBreaker>,
        gate: Arc<ConcurrencyGate>,
        sessions: Arc<SessionManager>,
        config: &PoolConfig,
    ) -> Self {
        Self {
            store,
            proxies,
            health,
            breaker,
            gate,
            sessions,
            timeouts: config.timeouts.clone(),
            max_attempts: config.max_attempts,
        }
    }

    /// The configured timeout table (the catalog derives its doubled
    /// pagination timeout from it).
    pub fn timeout_classes(&self) -> &TimeoutClasses {
        &self.timeouts
    }

    /// Run one operation under its timeout class.
    pub async fn execute<T>(&self, op_name: &str, class: TimeoutClass, op: Operation<T>) -> Option<T>
    where
        T: Payload + 'static,
    {
        self.execute_timed(op_name, class.duration(&self.timeouts), op)
            .await
    }

    /// Run one operation with an explicit base timeout (the catalog uses
    /// this for its doubled-timeout pagination loop).
    pub async fn execute_timed<T>(
        &self,
        op_name: &str,
        base_timeout: Duration,
        op: Operation<T>,
    ) -> Option<T>
    where
        T: Payload + 'static,
    {
        if !self.breaker.allow() {
            warn!(op = op_name, "circuit breaker refusing dispatch");
            return None;
        }
        let Some(_permit) = self.gate.acquire().await else {
            warn!(op = op_name, "dispatch rejected, concurrency gate saturated");
            // allow() may have granted the half-open trial; report it back
            // so the breaker is not wedged on a trial that never ran.
            if self.breaker.state() == BreakerState::HalfOpen {
                self.breaker.record(false);
            }
            return None;
        };

        let mut skip: HashSet<String> = HashSet::new();
        let mut attempts = 0u32;
        let mut result: Option<T> = None;
        let mut last_empty: Option<T> = None;
        let mut overall = false;

        while attempts < self.max_attempts {
            let account = match self.select_account(&skip).await {
                Selection::Chosen(account) => account,
                Selection::Wait(wait) => {
                    debug!(
                        op = op_name,
                        wait_ms = wait.as_millis() as u64,
                        "all accounts rate-limited, waiting"
                    );
                    sleep(wait).await;
                    continue;
                }
                Selection::None => {
                    warn!(op = op_name, attempts, "no selectable account");
                    break;
                }
            };
            let username = account.username.clone();

            let endpoint = self.proxies.assign(&username);
            if let Some(endpoint) = &endpoint {
                loop {
                    match self.proxies.reserve(endpoint) {
                        Reservation::Ready => break,
                        Reservation::Wait(wait) => sleep(wait).await,
                    }
                }
            }
            let proxy_spec = endpoint.as_ref().map(|e| &e.spec);

            let scraper = match self.sessions.session(&account, proxy_spec).await {
                Ok(scraper) => scraper,
                Err(e) => {
                    warn!(username = %username, error = %e, "driver connect failed");
                    let kind = classify(&e.message);
                    if !self.health.on_failure(&username, kind, &e.message).await {
                        self.persist_unusable(&username, kind).await;
                        skip.insert(username);
                    }
                    attempts += 1;
                    continue;
                }
            };

            if let Err(e) = self.sessions.ensure_login(&account, &scraper).await {
                let kind = classify(&e.message);
                debug!(username = %username, kind = kind.label(), error = %e, "login failed");
                if !self.health.on_failure(&username, kind, &e.message).await {
                    self.persist_unusable(&username, kind).await;
                    skip.insert(username.clone());
                }
                attempts += 1;
                continue;
            }

            self.health.record_dispatch(&username).await;
            let timeout = self.scaled_timeout(base_timeout, &username).await;
            let started = Instant::now();
            let context = OpContext {
                scraper,
                account: account.clone(),
            };

            match tokio::time::timeout(timeout, op(context)).await {
                Err(_elapsed) => {
                    warn!(
                        op = op_name,
                        username = %username,
                        timeout_ms = timeout.as_millis() as u64,
                        "operation timed out"
                    );
                    let keep = self
                        .health
                        .on_failure(&username, ErrorKind::Timeout, "operation timed out")
                        .await;
                    if !keep {
                        self.persist_unusable(&username, ErrorKind::Timeout).await;
                    }
                    // Timed-out account is done for this dispatch; the
                    // attempt is not consumed.
                    skip.insert(username);
                }
                Ok(Err(e)) => {
                    let kind = classify(&e.message);
                    debug!(
                        op = op_name,
                        username = %username,
                        kind = kind.label(),
                        error = %e,
                        "operation failed"
                    );
                    let keep = self.health.on_failure(&username, kind, &e.message).await;
                    if !keep {
                        self.persist_unusable(&username, kind).await;
                    }
                    if kind.is_terminal_for_account() {
                        skip.insert(username);
                    } else {
                        attempts += 1;
                    }
                }
                Ok(Ok(payload)) => {
                    if payload.is_empty_payload() {
                        debug!(op = op_name, username = %username, "empty payload, retrying");
                        self.health
                            .on_failure(
                                &username,
                                ErrorKind::Unknown,
                                "empty response from upstream",
                            )
                            .await;
                        last_empty = Some(payload);
                        attempts += 1;
                    } else {
                        self.health.on_success(&username, started.elapsed()).await;
                        overall = true;
                        result = Some(payload);
                        break;
                    }
                }
            }
        }

        self.breaker.record(overall);
        result.or(last_empty)
    }

    /// Run a group of operations. Small batches fan out as independent
    /// dispatches; larger ones amortize a single account and login across
    /// all slots, running them in chunks.
    pub async fn execute_batch<T>(
        &self,
        op_name: &str,
        class: TimeoutClass,
        ops: Vec<Operation<T>>,
    ) -> Vec<Option<T>>
    where
        T: Payload + 'static,
    {
        let n = ops.len();
        if n == 0 {
            return Vec::new();
        }
        let base_timeout = class.duration(&self.timeouts);

        if n <= SMALL_BATCH_LIMIT {
            let mut handles = Vec::with_capacity(n);
            for op in ops {
                let dispatcher = self.clone();
                let name = op_name.to_string();
                handles.push(tokio::spawn(async move {
                    dispatcher.execute_timed(&name, base_timeout, op).await
                }));
            }
            let mut results = Vec::with_capacity(n);
            for handle in handles {
                results.push(handle.await.unwrap_or(None));
            }
            return results;
        }

        self.batch_on_single_account(op_name, base_timeout, ops).await
    }

    async fn batch_on_single_account<T>(
        &self,
        op_name: &str,
        base_timeout: Duration,
        ops: Vec<Operation<T>>,
    ) -> Vec<Option<T>>
    where
        T: Payload + 'static,
    {
        let n = ops.len();
        let drained = |n: usize| (0..n).map(|_| None).collect::<Vec<Option<T>>>();

        if !self.breaker.allow() {
            warn!(op = op_name, "circuit breaker refusing batch");
            return drained(n);
        }

        let account = loop {
            match self.select_account(&HashSet::new()).await {
                Selection::Chosen(account) => break account,
                Selection::Wait(wait) => sleep(wait).await,
                Selection::None => {
                    warn!(op = op_name, "no selectable account for batch");
                    self.breaker.record(false);
                    return drained(n);
                }
            }
        };
        let username = account.username.clone();

        let endpoint = self.proxies.assign(&username);
        if let Some(endpoint) = &endpoint {
            loop {
                match self.proxies.reserve(endpoint) {
                    Reservation::Ready => break,
                    Reservation::Wait(wait) => sleep(wait).await,
                }
            }
        }
        let proxy_spec = endpoint.as_ref().map(|e| &e.spec);

        let scraper = match self.sessions.session(&account, proxy_spec).await {
            Ok(scraper) => scraper,
            Err(e) => {
                warn!(username = %username, error = %e, "driver connect failed for batch");
                let kind = classify(&e.message);
                if !self.health.on_failure(&username, kind, &e.message).await {
                    self.persist_unusable(&username, kind).await;
                }
                self.breaker.record(false);
                return drained(n);
            }
        };
        if let Err(e) = self.sessions.ensure_login(&account, &scraper).await {
            let kind = classify(&e.message);
            warn!(username = %username, kind = kind.label(), error = %e, "batch login failed");
            if !self.health.on_failure(&username, kind, &e.message).await {
                self.persist_unusable(&username, kind).await;
            }
            self.breaker.record(false);
            return drained(n);
        }
        info!(op = op_name, username = %username, slots = n, "batch running on one login");

        let timeout = self.scaled_timeout(base_timeout, &username).await;
        let mut results: Vec<Option<T>> = Vec::with_capacity(n);
        let mut successes = 0usize;

        let mut ops = ops.into_iter();
        loop {
            let chunk: Vec<Operation<T>> = ops.by_ref().take(BATCH_CHUNK).collect();
            if chunk.is_empty() {
                break;
            }
            let mut handles = Vec::with_capacity(chunk.len());
            for op in chunk {
                let dispatcher = self.clone();
                let account = account.clone();
                let scraper = scraper.clone();
                let username = username.clone();
                handles.push(tokio::spawn(async move {
                    dispatcher
                        .run_batch_slot(username, account, scraper, timeout, op)
                        .await
                }));
            }
            for handle in handles {
                let slot = handle.await.unwrap_or(None);
                if slot.is_some() {
                    successes += 1;
                }
                results.push(slot);
            }
        }

        // One breaker verdict for the whole batch: majority success
        self.breaker.record(successes >= n.div_ceil(2));
        results
    }

    async fn run_batch_slot<T>(
        &self,
        username: String,
        account: Account,
        scraper: Arc<dyn Scraper>,
        timeout: Duration,
        op: Operation<T>,
    ) -> Option<T>
    where
        T: Payload + 'static,
    {
        let _permit = self.gate.acquire().await?;
        self.health.record_dispatch(&username).await;
        let started = Instant::now();
        let context = OpContext { scraper, account };

        match tokio::time::timeout(timeout, op(context)).await {
            Err(_elapsed) => {
                let keep = self
                    .health
                    .on_failure(&username, ErrorKind::Timeout, "operation timed out")
                    .await;
                if !keep {
                    self.persist_unusable(&username, ErrorKind::Timeout).await;
                }
                None
            }
            Ok(Err(e)) => {
                let kind = classify(&e.message);
                let keep = self.health.on_failure(&username, kind, &e.message).await;
                if !keep {
                    self.persist_unusable(&username, kind).await;
                }
                None
            }
            Ok(Ok(payload)) => {
                self.health.on_success(&username, started.elapsed()).await;
                Some(payload)
            }
        }
    }

    /// Pick a usable account uniformly at random from the currently
    /// admissible set. Accounts in the skip set, sinks, active cooldowns,
    /// and full rate windows are excluded; when everything usable is
    /// rate-limited the soonest wait is reported instead.
    async fn select_account(&self, skip: &HashSet<String>) -> Selection {
        let accounts = match self.store.list().await {
            Ok(accounts) => accounts,
            Err(e) => {
                warn!(error = %e, "failed to list accounts");
                return Selection::None;
            }
        };

        let mut candidates = Vec::new();
        let mut min_wait: Option<Duration> = None;
        for account in accounts {
            if !account.usable || account.is_locked || skip.contains(&account.username) {
                continue;
            }
            match self.health.admit(&account.username).await {
                Admission::Ready => candidates.push(account),
                Admission::RateLimited(wait) => {
                    min_wait = Some(min_wait.map_or(wait, |m| m.min(wait)));
                }
                Admission::CoolingDown(_) | Admission::Sink(_) => {}
            }
        }

        if !candidates.is_empty() {
            let idx = rand::rng().random_range(0..candidates.len());
            return Selection::Chosen(candidates.swap_remove(idx));
        }
        match min_wait {
            Some(wait) => Selection::Wait(wait),
            None => Selection::None,
        }
    }

    /// A degraded account gets more timeout headroom:
    /// `base * max(1, 2 - success_rate * 1.5)`.
    async fn scaled_timeout(&self, base: Duration, username: &str) -> Duration {
        let rate = self.health.success_rate(username).await;
        base.mul_f64((2.0 - rate * 1.5).max(1.0))
    }

    /// Persist a terminal health verdict to the registry and drop the
    /// account's cached session.
    async fn persist_unusable(&self, username: &str, kind: ErrorKind) {
        let result = match kind {
            ErrorKind::AccountLocked => self.store.mark_locked(username).await,
            _ => self.store.mark_suspended(username).await,
        };
        if let Err(e) = result {
            warn!(username, error = %e, "failed to persist account state");
        }
        self.sessions.evict(username).await;
    }
}
