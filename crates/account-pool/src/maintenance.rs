//! Background maintenance tasks
//!
//! Three periodic loops run for the life of the orchestrator:
//! - health sweep: trims windows, expires cooldowns, resets idle error
//!   tallies, and probes idle accounts with a dry-run login
//! - stats report: one structured log line summarizing pool state
//! - rate adjustment: nudges the adaptive global rate from the mean
//!   success rate across active accounts
//!
//! All loops are cancellable: `Maintenance::shutdown` cancels the token,
//! joins every task, and flushes the registry. In-flight dispatches finish
//! within their own timeouts.

use std::sync::{Arc, Mutex};

use account_store::AccountStore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::PoolConfig;
use crate::dispatch::Dispatcher;

/// Adaptive rate floor (requests per second).
const RATE_MIN: f64 = 1.0;
/// Adaptive rate ceiling (requests per second).
const RATE_MAX: f64 = 100.0;
/// Multiplier applied when the pool is performing well.
const RATE_RAISE: f64 = 1.1;
/// Multiplier applied when the pool is degrading.
const RATE_CUT: f64 = 0.5;
/// Mean success rate above which the rate is raised.
const RAISE_ABOVE: f64 = 0.9;
/// Mean success rate below which the rate is cut.
const CUT_BELOW: f64 = 0.7;

/// The adaptive global request rate, adjusted by the background loop and
/// reported in stats.
pub struct RateControl {
    rate: Mutex<f64>,
}

impl RateControl {
    pub fn new(initial: f64) -> Self {
        Self {
            rate: Mutex::new(initial.clamp(RATE_MIN, RATE_MAX)),
        }
    }

    pub fn current(&self) -> f64 {
        *self.rate.lock().expect("rate lock poisoned")
    }

    /// Apply one adjustment step from the pool's mean success rate and
    /// return the new value.
    pub fn adjust(&self, mean_success: f64) -> f64 {
        let mut rate = self.rate.lock().expect("rate lock poisoned");
        if mean_success > RAISE_ABOVE {
            *rate = (*rate * RATE_RAISE).min(RATE_MAX);
        } else if mean_success < CUT_BELOW {
            *rate = (*rate * RATE_CUT).max(RATE_MIN);
        }
        *rate
    }
}

impl Default for RateControl {
    fn default() -> Self {
        Self::new(50.0)
    }
}

/// Handle over the spawned maintenance tasks.
pub struct Maintenance {
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
    store: Arc<AccountStore>,
}

impl Maintenance {
    /// Cancel all loops, join them, and flush the registry to disk.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for handle in self.handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "maintenance task join failed");
            }
        }
        if let Err(e) = self.store.save().await {
            warn!(error = %e, "failed to flush registry on shutdown");
        }
        info!("maintenance stopped, registry flushed");
    }
}

/// Spawn the three maintenance loops. Each skips its immediate first tick —
/// the pool was just initialized.
pub fn spawn_maintenance(
    dispatcher: Dispatcher,
    rate: Arc<RateControl>,
    config: &PoolConfig,
) -> Maintenance {
    let cancel = CancellationToken::new();
    let store = dispatcher.store.clone();
    let mut handles = Vec::new();

    {
        let dispatcher = dispatcher.clone();
        let cancel = cancel.child_token();
        let interval = config.sweep_interval();
        let reactivate_after = config.cooldown();
        handles.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => sweep_once(&dispatcher, reactivate_after).await,
                }
            }
        }));
    }

    {
        let dispatcher = dispatcher.clone();
        let rate = rate.clone();
        let cancel = cancel.child_token();
        let interval = config.stats_interval();
        handles.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => report_stats(&dispatcher, &rate).await,
                }
            }
        }));
    }

    {
        let cancel = cancel.child_token();
        let interval = config.rate_interval();
        handles.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => adjust_rate_once(&dispatcher, &rate).await,
                }
            }
        }));
    }

    Maintenance {
        cancel,
        handles,
        store,
    }
}

/// One health sweep pass: expire cooldowns, reset idle tallies, and probe
/// idle accounts with a dry-run login so a recovered session is ready
/// before real traffic needs it.
pub(crate) async fn sweep_once(dispatcher: &Dispatcher, reactivate_after: std::time::Duration) {
    let summary = dispatcher.health.sweep().await;
    if !summary.expired_cooldowns.is_empty() || summary.tallies_reset > 0 {
        info!(
            expired = summary.expired_cooldowns.len(),
            tallies_reset = summary.tallies_reset,
            "health sweep"
        );
    }

    for username in dispatcher.health.idle_candidates(reactivate_after).await {
        let account = match dispatcher.store.find(&username).await {
            Ok(Some(account)) if account.usable && !account.is_locked => account,
            _ => continue,
        };
        let endpoint = dispatcher.proxies.assign(&username);
        let proxy_spec = endpoint.as_ref().map(|e| &e.spec);
        let reactivated = dispatcher.sessions.dry_run_login(&account, proxy_spec).await;
        debug!(username = %username, reactivated, "idle account probe");
    }
}

/// One stats line: per-status buckets plus the shared resource gauges.
pub(crate) async fn report_stats(dispatcher: &Dispatcher, rate: &RateControl) {
    let counts = dispatcher.health.status_counts().await;
    let accounts = dispatcher.store.len().await.unwrap_or(0);
    let window_occupancy = dispatcher.health.window_occupancy().await;
    let sessions = dispatcher.sessions.session_count().await;
    info!(
        accounts,
        healthy = counts.get("healthy").copied().unwrap_or(0),
        probation = counts.get("probation").copied().unwrap_or(0),
        cooldown = counts.get("cooldown").copied().unwrap_or(0),
        disabled = counts.get("disabled").copied().unwrap_or(0),
        locked = counts.get("locked").copied().unwrap_or(0),
        suspended = counts.get("suspended").copied().unwrap_or(0),
        in_flight = dispatcher.gate.in_flight(),
        gate_capacity = dispatcher.gate.capacity(),
        breaker = dispatcher.breaker.state().label(),
        proxies_assigned = dispatcher.proxies.assignment_count(),
        window_occupancy = window_occupancy,
        sessions = sessions,
        rate_per_sec = rate.current(),
        memory_kb = process_memory_kb(),
        "pool stats"
    );
}

/// Resident set size in kilobytes, best effort. Reads `VmRSS` from
/// `/proc/self/status`; platforms without procfs report nothing.
pub(crate) fn process_memory_kb() -> Option<u64> {
    #[cfg(target_os = "linux")]
    {
        let status = std::fs::read_to_string("/proc/self/status").ok()?;
        let line = status.lines().find(|l| l.starts_with("VmRSS:"))?;
        line.split_whitespace().nth(1)?.parse().ok()
    }
    #[cfg(not(target_os = "linux"))]
    {
        None
    }
}

/// One rate-adjustment step from the pool's mean success rate.
pub(crate) async fn adjust_rate_once(dispatcher: &Dispatcher, rate: &RateControl) {
    let Some(mean) = dispatcher.health.mean_success_rate().await else {
        return;
    };
    let adjusted = rate.adjust(mean);
    debug!(mean_success = mean, rate_per_sec = adjusted, "rate adjusted");
}
