//! Orchestrator configuration
//!
//! Every tunable has a production default; an optional TOML file overrides
//! them. Validation runs at load time so a zero window or empty timeout
//! fails at startup instead of on the first dispatch.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};

/// Per-class operation timeouts in milliseconds.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimeoutClasses {
    pub login_ms: u64,
    pub search_ms: u64,
    pub profile_ms: u64,
    pub tweet_ms: u64,
    pub default_ms: u64,
}

impl Default for TimeoutClasses {
    fn default() -> Self {
        Self {
            login_ms: 45_000,
            search_ms: 60_000,
            profile_ms: 30_000,
            tweet_ms: 35_000,
            default_ms: 30_000,
        }
    }
}

/// Orchestrator tunables.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Account registry file.
    pub data_file: PathBuf,
    /// Proxy list, one `host:port:username:password` per line.
    pub proxies_file: PathBuf,

    /// Per-account request cap inside the sliding window.
    pub requests_per_window: usize,
    /// Sliding rate-limit window.
    pub window_secs: u64,
    /// Quarantine length for cooled-down accounts.
    pub cooldown_secs: u64,

    /// Auth errors within `auth_error_window_secs` that disable an account.
    pub auth_error_limit: usize,
    pub auth_error_window_secs: u64,
    /// Error tallies reset after this much inactivity.
    pub error_idle_reset_secs: u64,

    /// Minimum spacing between requests through one proxy.
    pub proxy_spacing_ms: u64,
    /// Account attempts per dispatch.
    pub max_attempts: u32,

    /// Consecutive failures that open the circuit breaker.
    pub breaker_failure_threshold: u32,
    /// How long the breaker stays open before the half-open trial.
    pub breaker_open_secs: u64,

    /// Concurrency gate capacity; 0 picks `max(50, cpu_count * 4)`.
    pub gate_capacity: usize,
    /// Total time budget for acquiring the gate before rejecting.
    pub gate_budget_ms: u64,

    /// Anti-burst pause before a credential login.
    pub login_wait_ms: u64,

    pub sweep_interval_secs: u64,
    pub stats_interval_secs: u64,
    pub rate_interval_secs: u64,

    pub timeouts: TimeoutClasses,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            data_file: PathBuf::from("data.json"),
            proxies_file: PathBuf::from("proxies.txt"),
            requests_per_window: 200,
            window_secs: 900,
            cooldown_secs: 120,
            auth_error_limit: 50,
            auth_error_window_secs: 86_400,
            error_idle_reset_secs: 900,
            proxy_spacing_ms: 1_000,
            max_attempts: 10,
            breaker_failure_threshold: 15,
            breaker_open_secs: 60,
            gate_capacity: 0,
            gate_budget_ms: 10_000,
            login_wait_ms: 1_000,
            sweep_interval_secs: 120,
            stats_interval_secs: 300,
            rate_interval_secs: 60,
            timeouts: TimeoutClasses::default(),
        }
    }
}

impl PoolConfig {
    /// Load configuration from a TOML file, then validate.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::Io(format!("reading config file: {e}")))?;
        let config: PoolConfig =
            toml::from_str(&contents).map_err(|e| Error::Toml(format!("parsing config file: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would wedge the orchestrator at runtime.
    pub fn validate(&self) -> Result<()> {
        if self.requests_per_window == 0 {
            return Err(Error::Config(
                "requests_per_window must be greater than 0".into(),
            ));
        }
        if self.window_secs == 0 {
            return Err(Error::Config("window_secs must be greater than 0".into()));
        }
        if self.max_attempts == 0 {
            return Err(Error::Config("max_attempts must be greater than 0".into()));
        }
        if self.breaker_failure_threshold == 0 {
            return Err(Error::Config(
                "breaker_failure_threshold must be greater than 0".into(),
            ));
        }
        if self.gate_budget_ms == 0 {
            return Err(Error::Config(
                "gate_budget_ms must be greater than 0".into(),
            ));
        }
        let timeouts = [
            ("login_ms", self.timeouts.login_ms),
            ("search_ms", self.timeouts.search_ms),
            ("profile_ms", self.timeouts.profile_ms),
            ("tweet_ms", self.timeouts.tweet_ms),
            ("default_ms", self.timeouts.default_ms),
        ];
        for (name, value) in timeouts {
            if value == 0 {
                return Err(Error::Config(format!(
                    "timeouts.{name} must be greater than 0"
                )));
            }
        }
        Ok(())
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn auth_error_window(&self) -> Duration {
        Duration::from_secs(self.auth_error_window_secs)
    }

    pub fn error_idle_reset(&self) -> Duration {
        Duration::from_secs(self.error_idle_reset_secs)
    }

    pub fn proxy_spacing(&self) -> Duration {
        Duration::from_millis(self.proxy_spacing_ms)
    }

    pub fn breaker_open(&self) -> Duration {
        Duration::from_secs(self.breaker_open_secs)
    }

    pub fn gate_budget(&self) -> Duration {
        Duration::from_millis(self.gate_budget_ms)
    }

    pub fn login_wait(&self) -> Duration {
        Duration::from_millis(self.login_wait_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn stats_interval(&self) -> Duration {
        Duration::from_secs(self.stats_interval_secs)
    }

    pub fn rate_interval(&self) -> Duration {
        Duration::from_secs(self.rate_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_operational_values() {
        let config = PoolConfig::default();
        assert_eq!(config.requests_per_window, 200);
        assert_eq!(config.window_secs, 900);
        assert_eq!(config.cooldown_secs, 120);
        assert_eq!(config.max_attempts, 10);
        assert_eq!(config.breaker_failure_threshold, 15);
        assert_eq!(config.proxy_spacing_ms, 1_000);
        assert_eq!(config.timeouts.login_ms, 45_000);
        assert_eq!(config.timeouts.search_ms, 60_000);
        assert_eq!(config.timeouts.tweet_ms, 35_000);
        assert_eq!(config.timeouts.default_ms, 30_000);
    }

    #[test]
    fn load_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pool.toml");
        std::fs::write(
            &path,
            r#"
requests_per_window = 50
cooldown_secs = 30

[timeouts]
search_ms = 20000
"#,
        )
        .unwrap();

        let config = PoolConfig::load(&path).unwrap();
        assert_eq!(config.requests_per_window, 50);
        assert_eq!(config.cooldown_secs, 30);
        assert_eq!(config.timeouts.search_ms, 20_000);
        // Untouched fields keep their defaults
        assert_eq!(config.window_secs, 900);
        assert_eq!(config.timeouts.login_ms, 45_000);
    }

    #[test]
    fn zero_window_capacity_rejected() {
        let mut config = PoolConfig::default();
        config.requests_per_window = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("requests_per_window"), "got: {err}");
    }

    #[test]
    fn zero_timeout_rejected() {
        let mut config = PoolConfig::default();
        config.timeouts.profile_ms = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("profile_ms"), "got: {err}");
    }

    #[test]
    fn zero_max_attempts_rejected() {
        let mut config = PoolConfig::default();
        config.max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_missing_file_errors() {
        let result = PoolConfig::load(Path::new("/nonexistent/pool.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn load_invalid_toml_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "max_attempts = [[").unwrap();
        assert!(PoolConfig::load(&path).is_err());
    }
}
