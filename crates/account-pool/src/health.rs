//! Per-account health tracking
//!
//! Each account carries an in-memory health record: a status machine, a
//! sliding request window for the per-account rate limit, bounded error and
//! response-time history, and per-kind error tallies. Nothing here is
//! persisted — the registry only learns about terminal transitions through
//! the dispatcher flipping the usable/locked flags.
//!
//! Status transitions:
//! - Healthy → Cooldown (rate limit, or 5 consecutive auth failures)
//! - Healthy → Probation (10 consecutive network failures, 50 unknown)
//! - Cooldown → Probation (cooldown expired, checked at admit and by sweep)
//! - Probation → Healthy (3 consecutive successes)
//! - any → Locked / Suspended / Disabled (terminal signals; in-process sinks
//!   cleared only by administrative action)

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::classify::ErrorKind;
use crate::config::PoolConfig;

/// Bounded error history per account.
const ERROR_HISTORY_CAP: usize = 25;
/// Bounded response-time ring per account.
const RESPONSE_TIME_CAP: usize = 50;
/// Consecutive successes that promote Probation back to Healthy.
const PROMOTION_THRESHOLD: u32 = 3;
/// Consecutive auth failures that trigger a cooldown.
const AUTH_COOLDOWN_THRESHOLD: u32 = 5;
/// Consecutive network failures that demote to Probation.
const NETWORK_PROBATION_THRESHOLD: u32 = 10;
/// Consecutive unknown failures that demote to Probation.
const UNKNOWN_PROBATION_THRESHOLD: u32 = 50;

/// Runtime status of an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    Probation,
    Cooldown,
    Disabled,
    Locked,
    Suspended,
}

impl HealthStatus {
    /// Status label for logging and stats.
    pub fn label(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Probation => "probation",
            HealthStatus::Cooldown => "cooldown",
            HealthStatus::Disabled => "disabled",
            HealthStatus::Locked => "locked",
            HealthStatus::Suspended => "suspended",
        }
    }

    /// Sink statuses never recover inside this process.
    pub fn is_sink(&self) -> bool {
        matches!(
            self,
            HealthStatus::Locked | HealthStatus::Suspended | HealthStatus::Disabled
        )
    }
}

/// One recorded failure.
#[derive(Debug, Clone)]
pub struct ErrorEvent {
    pub kind: ErrorKind,
    pub at: Instant,
    pub message: String,
}

/// In-memory health record for one account.
#[derive(Debug, Clone)]
pub struct AccountHealth {
    pub status: HealthStatus,
    pub request_count: u64,
    pub consecutive_successes: u32,
    pub consecutive_failures: u32,
    pub error_history: VecDeque<ErrorEvent>,
    pub response_times: VecDeque<u64>,
    pub kind_counts: HashMap<ErrorKind, u32>,
    pub cooldown_until: Option<Instant>,
    pub last_used: Option<Instant>,
    pub last_success: Option<Instant>,
    request_timestamps: VecDeque<Instant>,
    auth_errors: VecDeque<Instant>,
    last_error: Option<Instant>,
}

impl Default for AccountHealth {
    fn default() -> Self {
        Self {
            status: HealthStatus::Healthy,
            request_count: 0,
            consecutive_successes: 0,
            consecutive_failures: 0,
            error_history: VecDeque::new(),
            response_times: VecDeque::new(),
            kind_counts: HashMap::new(),
            cooldown_until: None,
            last_used: None,
            last_success: None,
            request_timestamps: VecDeque::new(),
            auth_errors: VecDeque::new(),
            last_error: None,
        }
    }
}

impl AccountHealth {
    /// Success ratio in `[0, 1]`.
    ///
    /// Computed as `(request_count − recent_errors) / request_count` where
    /// `recent_errors` is the bounded error-history length. Not a sliding
    /// ratio; a long-lived account with a full history drifts back toward 1
    /// as its request count grows.
    pub fn success_rate(&self) -> f64 {
        if self.request_count == 0 {
            return 1.0;
        }
        let errors = self.error_history.len() as f64;
        ((self.request_count as f64 - errors) / self.request_count as f64).clamp(0.0, 1.0)
    }
}

/// Outcome of the per-account rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateCheck {
    Ok,
    /// Refused; the oldest window entry expires after this wait.
    Limited {
        wait: Duration,
    },
}

/// Combined admission decision used by account selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Ready,
    /// Locked, Suspended, or Disabled — never selectable.
    Sink(HealthStatus),
    CoolingDown(Duration),
    RateLimited(Duration),
}

/// Summary of one background sweep.
#[derive(Debug, Default)]
pub struct SweepSummary {
    pub expired_cooldowns: Vec<String>,
    pub tallies_reset: usize,
}

struct HealthSettings {
    window: Duration,
    requests_per_window: usize,
    cooldown: Duration,
    auth_error_limit: usize,
    auth_error_window: Duration,
    error_idle_reset: Duration,
}

/// Tracker holding every account's health record.
///
/// Records are created lazily as Healthy on first touch. All writes go
/// through the `RwLock`, so counter updates are serialized per tracker;
/// readers clone snapshots out.
pub struct HealthTracker {
    records: RwLock<HashMap<String, AccountHealth>>,
    settings: HealthSettings,
}

impl HealthTracker {
    pub fn new(config: &PoolConfig) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            settings: HealthSettings {
                window: config.window(),
                requests_per_window: config.requests_per_window,
                cooldown: config.cooldown(),
                auth_error_limit: config.auth_error_limit,
                auth_error_window: config.auth_error_window(),
                error_idle_reset: config.error_idle_reset(),
            },
        }
    }

    /// Snapshot of an account's record, creating a Healthy one if absent.
    pub async fn get(&self, username: &str) -> AccountHealth {
        let mut records = self.records.write().await;
        records.entry(username.to_string()).or_default().clone()
    }

    /// Current status, creating a Healthy record if absent.
    pub async fn status(&self, username: &str) -> HealthStatus {
        let mut records = self.records.write().await;
        records.entry(username.to_string()).or_default().status
    }

    /// Per-account rate-limit check against the sliding window.
    pub async fn can_request(&self, username: &str) -> RateCheck {
        let now = Instant::now();
        let mut records = self.records.write().await;
        let record = records.entry(username.to_string()).or_default();
        Self::rate_check(record, &self.settings, now)
    }

    /// Full admission decision for account selection: sink statuses are
    /// rejected outright, expired cooldowns transition to Probation inline,
    /// active cooldowns and a full rate window report their remaining wait.
    pub async fn admit(&self, username: &str) -> Admission {
        let now = Instant::now();
        let mut records = self.records.write().await;
        let record = records.entry(username.to_string()).or_default();

        if record.status.is_sink() {
            return Admission::Sink(record.status);
        }
        if record.status == HealthStatus::Cooldown {
            match record.cooldown_until {
                Some(until) if now < until => return Admission::CoolingDown(until - now),
                _ => {
                    info!(username, "cooldown expired, account on probation");
                    record.status = HealthStatus::Probation;
                    record.cooldown_until = None;
                }
            }
        }
        match Self::rate_check(record, &self.settings, now) {
            RateCheck::Ok => Admission::Ready,
            RateCheck::Limited { wait } => Admission::RateLimited(wait),
        }
    }

    /// Record that a dispatch attempt is about to run on this account.
    pub async fn record_dispatch(&self, username: &str) {
        let now = Instant::now();
        let mut records = self.records.write().await;
        let record = records.entry(username.to_string()).or_default();
        record.request_count += 1;
        record.last_used = Some(now);
        record.request_timestamps.push_back(now);
    }

    /// Record a successful call with its round-trip time.
    pub async fn on_success(&self, username: &str, rtt: Duration) {
        let mut records = self.records.write().await;
        let record = records.entry(username.to_string()).or_default();

        record.consecutive_successes += 1;
        record.consecutive_failures = 0;
        record.last_success = Some(Instant::now());
        record.response_times.push_back(rtt.as_millis() as u64);
        if record.response_times.len() > RESPONSE_TIME_CAP {
            record.response_times.pop_front();
        }

        if record.status == HealthStatus::Probation
            && record.consecutive_successes >= PROMOTION_THRESHOLD
        {
            info!(username, "probation cleared, account healthy");
            record.status = HealthStatus::Healthy;
        }
    }

    /// Record a failed call and apply the status transition for its kind.
    ///
    /// Returns `keep_usable`: `false` means the account reached a terminal
    /// state and the caller must persist it unusable in the registry.
    pub async fn on_failure(&self, username: &str, kind: ErrorKind, message: &str) -> bool {
        let now = Instant::now();
        let mut records = self.records.write().await;
        let record = records.entry(username.to_string()).or_default();

        record.error_history.push_back(ErrorEvent {
            kind,
            at: now,
            message: message.to_string(),
        });
        if record.error_history.len() > ERROR_HISTORY_CAP {
            record.error_history.pop_front();
        }
        *record.kind_counts.entry(kind).or_insert(0) += 1;
        record.last_error = Some(now);

        // Sinks stay sinks: keep recording history, never transition out.
        if record.status.is_sink() {
            return false;
        }

        record.consecutive_successes = 0;
        record.consecutive_failures += 1;

        if kind == ErrorKind::Auth {
            record.auth_errors.push_back(now);
            let horizon = now.checked_sub(self.settings.auth_error_window);
            while let (Some(&front), Some(h)) = (record.auth_errors.front(), horizon) {
                if front < h {
                    record.auth_errors.pop_front();
                } else {
                    break;
                }
            }
        }

        match kind {
            ErrorKind::AccountLocked => {
                warn!(username, "account locked by upstream");
                record.status = HealthStatus::Locked;
                false
            }
            ErrorKind::AccountSuspended => {
                warn!(username, "account suspended by upstream");
                record.status = HealthStatus::Suspended;
                false
            }
            // A timed-out session is indistinguishable from a silently
            // rate-limited one; it must not be retried on this account.
            ErrorKind::Timeout => {
                warn!(username, "timed out, suspending account");
                record.status = HealthStatus::Suspended;
                false
            }
            ErrorKind::Auth => {
                if record.auth_errors.len() >= self.settings.auth_error_limit {
                    warn!(
                        username,
                        auth_errors = record.auth_errors.len(),
                        "auth error flood, disabling account"
                    );
                    record.status = HealthStatus::Disabled;
                    return false;
                }
                if record.consecutive_failures >= AUTH_COOLDOWN_THRESHOLD {
                    Self::start_cooldown(record, username, &self.settings, now);
                }
                true
            }
            ErrorKind::RateLimit => {
                Self::start_cooldown(record, username, &self.settings, now);
                true
            }
            ErrorKind::Network => {
                if record.consecutive_failures >= NETWORK_PROBATION_THRESHOLD {
                    record.status = HealthStatus::Probation;
                }
                true
            }
            ErrorKind::NotFound => {
                // Benign: the queried entity is missing, not the account.
                record.consecutive_failures = record.consecutive_failures.saturating_sub(1);
                true
            }
            ErrorKind::Unknown => {
                if record.consecutive_failures >= UNKNOWN_PROBATION_THRESHOLD {
                    record.status = HealthStatus::Probation;
                }
                true
            }
        }
    }

    /// Current success rate for timeout scaling.
    pub async fn success_rate(&self, username: &str) -> f64 {
        let mut records = self.records.write().await;
        records
            .entry(username.to_string())
            .or_default()
            .success_rate()
    }

    /// Mean success rate across non-sink accounts that have seen traffic.
    pub async fn mean_success_rate(&self) -> Option<f64> {
        let records = self.records.read().await;
        let rates: Vec<f64> = records
            .values()
            .filter(|r| !r.status.is_sink() && r.request_count > 0)
            .map(AccountHealth::success_rate)
            .collect();
        if rates.is_empty() {
            return None;
        }
        Some(rates.iter().sum::<f64>() / rates.len() as f64)
    }

    /// Background sweep: trim windows, expire cooldowns, reset idle tallies.
    pub async fn sweep(&self) -> SweepSummary {
        let now = Instant::now();
        let mut summary = SweepSummary::default();
        let mut records = self.records.write().await;

        for (username, record) in records.iter_mut() {
            Self::trim_window(record, &self.settings, now);

            if record.status == HealthStatus::Cooldown {
                let expired = record.cooldown_until.is_none_or(|until| now >= until);
                if expired {
                    record.status = HealthStatus::Probation;
                    record.cooldown_until = None;
                    summary.expired_cooldowns.push(username.clone());
                }
            }

            let idle = record
                .last_error
                .is_some_and(|at| now.duration_since(at) >= self.settings.error_idle_reset);
            if idle && !record.kind_counts.is_empty() {
                record.kind_counts.clear();
                record.auth_errors.clear();
                record.last_error = None;
                summary.tallies_reset += 1;
            }
        }
        summary
    }

    /// Non-sink accounts whose last use is older than `idle_for`, candidates
    /// for the sweep's dry-run login reactivation.
    pub async fn idle_candidates(&self, idle_for: Duration) -> Vec<String> {
        let now = Instant::now();
        let records = self.records.read().await;
        records
            .iter()
            .filter(|(_, r)| !r.status.is_sink())
            .filter(|(_, r)| {
                r.last_used
                    .is_some_and(|at| now.duration_since(at) > idle_for)
            })
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Account count per status label, for the stats report.
    pub async fn status_counts(&self) -> HashMap<&'static str, usize> {
        let records = self.records.read().await;
        let mut counts = HashMap::new();
        for record in records.values() {
            *counts.entry(record.status.label()).or_insert(0) += 1;
        }
        counts
    }

    /// Total timestamps currently held in rate windows, for the stats report.
    pub async fn window_occupancy(&self) -> usize {
        let records = self.records.read().await;
        records.values().map(|r| r.request_timestamps.len()).sum()
    }

    fn rate_check(record: &mut AccountHealth, settings: &HealthSettings, now: Instant) -> RateCheck {
        Self::trim_window(record, settings, now);
        if record.request_timestamps.len() >= settings.requests_per_window {
            let oldest = *record
                .request_timestamps
                .front()
                .unwrap_or(&now);
            let wait = settings
                .window
                .saturating_sub(now.duration_since(oldest));
            return RateCheck::Limited { wait };
        }
        RateCheck::Ok
    }

    fn trim_window(record: &mut AccountHealth, settings: &HealthSettings, now: Instant) {
        let Some(horizon) = now.checked_sub(settings.window) else {
            return;
        };
        while record
            .request_timestamps
            .front()
            .is_some_and(|&at| at < horizon)
        {
            record.request_timestamps.pop_front();
        }
    }

    fn start_cooldown(
        record: &mut AccountHealth,
        username: &str,
        settings: &HealthSettings,
        now: Instant,
    ) {
        info!(
            username,
            cooldown_secs = settings.cooldown.as_secs(),
            "account entering cooldown"
        );
        record.status = HealthStatus::Cooldown;
        record.cooldown_until = Some(now + settings.cooldown);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> HealthTracker {
        HealthTracker::new(&PoolConfig::default())
    }

    fn tracker_with(f: impl FnOnce(&mut PoolConfig)) -> HealthTracker {
        let mut config = PoolConfig::default();
        f(&mut config);
        HealthTracker::new(&config)
    }

    #[tokio::test]
    async fn records_start_healthy() {
        let tracker = tracker();
        assert_eq!(tracker.status("alice").await, HealthStatus::Healthy);
        let record = tracker.get("alice").await;
        assert_eq!(record.request_count, 0);
        assert_eq!(record.success_rate(), 1.0);
    }

    #[tokio::test]
    async fn locked_result_is_terminal() {
        let tracker = tracker();
        let keep = tracker
            .on_failure("alice", ErrorKind::AccountLocked, "account locked")
            .await;
        assert!(!keep);
        assert_eq!(tracker.status("alice").await, HealthStatus::Locked);

        // A later success cannot resurrect a sink
        tracker.on_success("alice", Duration::from_millis(100)).await;
        assert_eq!(tracker.status("alice").await, HealthStatus::Locked);
    }

    #[tokio::test]
    async fn suspension_and_timeout_are_terminal() {
        let tracker = tracker();
        assert!(
            !tracker
                .on_failure("a", ErrorKind::AccountSuspended, "Response status: 401")
                .await
        );
        assert_eq!(tracker.status("a").await, HealthStatus::Suspended);

        assert!(!tracker.on_failure("b", ErrorKind::Timeout, "timed out").await);
        assert_eq!(tracker.status("b").await, HealthStatus::Suspended);
    }

    #[tokio::test]
    async fn rate_limit_starts_cooldown() {
        let tracker = tracker();
        let keep = tracker
            .on_failure("alice", ErrorKind::RateLimit, "rate limit exceeded")
            .await;
        assert!(keep);
        assert_eq!(tracker.status("alice").await, HealthStatus::Cooldown);
        assert!(matches!(
            tracker.admit("alice").await,
            Admission::CoolingDown(_)
        ));
    }

    #[tokio::test]
    async fn auth_failures_cool_down_at_threshold() {
        let tracker = tracker();
        for _ in 0..4 {
            tracker.on_failure("alice", ErrorKind::Auth, "bad credentials").await;
        }
        assert_eq!(tracker.status("alice").await, HealthStatus::Healthy);

        tracker.on_failure("alice", ErrorKind::Auth, "bad credentials").await;
        assert_eq!(tracker.status("alice").await, HealthStatus::Cooldown);
    }

    #[tokio::test]
    async fn auth_flood_disables_account() {
        let tracker = tracker_with(|c| c.auth_error_limit = 6);
        let mut keep = true;
        for _ in 0..6 {
            keep = tracker.on_failure("alice", ErrorKind::Auth, "login failed").await;
        }
        assert!(!keep);
        assert_eq!(tracker.status("alice").await, HealthStatus::Disabled);
    }

    #[tokio::test]
    async fn network_failures_demote_to_probation() {
        let tracker = tracker();
        for _ in 0..9 {
            tracker
                .on_failure("alice", ErrorKind::Network, "socket hang up")
                .await;
        }
        assert_eq!(tracker.status("alice").await, HealthStatus::Healthy);

        tracker
            .on_failure("alice", ErrorKind::Network, "socket hang up")
            .await;
        assert_eq!(tracker.status("alice").await, HealthStatus::Probation);
    }

    #[tokio::test]
    async fn not_found_is_benign() {
        let tracker = tracker();
        tracker.on_failure("alice", ErrorKind::Unknown, "boom").await;
        let before = tracker.get("alice").await.consecutive_failures;

        tracker.on_failure("alice", ErrorKind::NotFound, "404").await;
        let after = tracker.get("alice").await.consecutive_failures;
        // Increment then decrement: net zero
        assert_eq!(before, after);
        assert_eq!(tracker.status("alice").await, HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn probation_promotes_after_three_successes() {
        let tracker = tracker();
        for _ in 0..10 {
            tracker
                .on_failure("alice", ErrorKind::Network, "connection reset")
                .await;
        }
        assert_eq!(tracker.status("alice").await, HealthStatus::Probation);

        tracker.on_success("alice", Duration::from_millis(80)).await;
        tracker.on_success("alice", Duration::from_millis(90)).await;
        assert_eq!(tracker.status("alice").await, HealthStatus::Probation);

        tracker.on_success("alice", Duration::from_millis(70)).await;
        assert_eq!(tracker.status("alice").await, HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn intervening_failure_resets_promotion_progress() {
        let tracker = tracker();
        for _ in 0..10 {
            tracker
                .on_failure("alice", ErrorKind::Network, "connection reset")
                .await;
        }
        tracker.on_success("alice", Duration::from_millis(80)).await;
        tracker.on_success("alice", Duration::from_millis(80)).await;
        tracker.on_failure("alice", ErrorKind::Unknown, "blip").await;
        tracker.on_success("alice", Duration::from_millis(80)).await;
        tracker.on_success("alice", Duration::from_millis(80)).await;
        // Two successes since the failure — still on probation
        assert_eq!(tracker.status("alice").await, HealthStatus::Probation);

        tracker.on_success("alice", Duration::from_millis(80)).await;
        assert_eq!(tracker.status("alice").await, HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn window_refuses_at_capacity_with_wait() {
        let tracker = tracker_with(|c| {
            c.requests_per_window = 2;
            c.window_secs = 60;
        });
        tracker.record_dispatch("alice").await;
        assert_eq!(tracker.can_request("alice").await, RateCheck::Ok);

        tracker.record_dispatch("alice").await;
        match tracker.can_request("alice").await {
            RateCheck::Limited { wait } => {
                assert!(wait <= Duration::from_secs(60));
                assert!(wait > Duration::from_secs(55), "wait was {wait:?}");
            }
            RateCheck::Ok => panic!("window at capacity must refuse"),
        }
    }

    #[tokio::test]
    async fn window_slides_old_entries_out() {
        let tracker = tracker_with(|c| {
            c.requests_per_window = 1;
            c.window_secs = 1;
        });
        tracker.record_dispatch("alice").await;
        assert!(matches!(
            tracker.can_request("alice").await,
            RateCheck::Limited { .. }
        ));

        tokio::time::sleep(Duration::from_millis(1_100)).await;
        assert_eq!(tracker.can_request("alice").await, RateCheck::Ok);
    }

    #[tokio::test]
    async fn admit_rejects_sinks_and_expires_cooldowns() {
        let tracker = tracker_with(|c| c.cooldown_secs = 0);
        tracker
            .on_failure("locked", ErrorKind::AccountLocked, "locked")
            .await;
        assert!(matches!(
            tracker.admit("locked").await,
            Admission::Sink(HealthStatus::Locked)
        ));

        tracker
            .on_failure("cooled", ErrorKind::RateLimit, "rate limit")
            .await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        // Zero cooldown: admit transitions Cooldown → Probation inline
        assert_eq!(tracker.admit("cooled").await, Admission::Ready);
        assert_eq!(tracker.status("cooled").await, HealthStatus::Probation);
    }

    #[tokio::test]
    async fn sweep_expires_cooldowns_and_resets_idle_tallies() {
        let tracker = tracker_with(|c| {
            c.cooldown_secs = 0;
            c.error_idle_reset_secs = 0;
        });
        tracker
            .on_failure("alice", ErrorKind::RateLimit, "rate limit")
            .await;
        tokio::time::sleep(Duration::from_millis(5)).await;

        let summary = tracker.sweep().await;
        assert_eq!(summary.expired_cooldowns, vec!["alice".to_string()]);
        assert_eq!(summary.tallies_reset, 1);
        assert_eq!(tracker.status("alice").await, HealthStatus::Probation);
        assert!(tracker.get("alice").await.kind_counts.is_empty());
    }

    #[tokio::test]
    async fn success_rate_uses_bounded_error_history() {
        let tracker = tracker();
        for _ in 0..10 {
            tracker.record_dispatch("alice").await;
        }
        for _ in 0..4 {
            tracker.on_failure("alice", ErrorKind::Unknown, "boom").await;
        }
        let rate = tracker.success_rate("alice").await;
        assert!((rate - 0.6).abs() < 1e-9, "got {rate}");
    }

    #[tokio::test]
    async fn error_history_is_capped() {
        let tracker = tracker();
        for i in 0..40 {
            tracker
                .on_failure("alice", ErrorKind::Unknown, &format!("err {i}"))
                .await;
        }
        let record = tracker.get("alice").await;
        assert_eq!(record.error_history.len(), 25);
        // Oldest entries were evicted
        assert_eq!(record.error_history.front().unwrap().message, "err 15");
    }

    #[tokio::test]
    async fn mean_success_rate_skips_sinks_and_idle() {
        let tracker = tracker();
        assert!(tracker.mean_success_rate().await.is_none());

        tracker.record_dispatch("alice").await;
        tracker.on_success("alice", Duration::from_millis(50)).await;

        tracker.record_dispatch("locked").await;
        tracker
            .on_failure("locked", ErrorKind::AccountLocked, "locked")
            .await;

        // Only alice counts: the locked account is a sink
        let mean = tracker.mean_success_rate().await.unwrap();
        assert!((mean - 1.0).abs() < 1e-9, "got {mean}");
    }

    #[tokio::test]
    async fn status_counts_buckets_by_label() {
        let tracker = tracker();
        tracker.status("a").await;
        tracker.status("b").await;
        tracker.on_failure("c", ErrorKind::AccountLocked, "locked").await;

        let counts = tracker.status_counts().await;
        assert_eq!(counts.get("healthy"), Some(&2));
        assert_eq!(counts.get("locked"), Some(&1));
    }
}
