//! Account orchestrator for the scraping gateway
//!
//! Runs every upstream read through a pool of scraping accounts, each bound
//! to an egress proxy, under per-account and per-proxy rate limits, with
//! health tracking, a process-global circuit breaker, and automatic
//! failover between accounts.
//!
//! Dispatch lifecycle:
//! 1. The catalog wraps an upstream operation in a closure and hands it to
//!    the dispatcher under a timeout class
//! 2. The dispatcher checks the circuit breaker, takes a concurrency gate
//!    slot, and selects a usable account at random
//! 3. The account's sticky proxy is reserved (per-proxy spacing), its
//!    driver session is logged in (stored cookies first, credentials
//!    second), and the closure runs under a health-scaled timeout
//! 4. The outcome is classified from the error text; health transitions
//!    decide whether to retry on another account, skip this one for the
//!    rest of the dispatch, or persist it unusable
//! 5. The breaker learns one overall verdict per dispatch; callers get the
//!    payload or `None`, never an error
//!
//! Background maintenance (health sweep, stats report, rate adjustment)
//! runs as cancellable tasks spawned at startup and joined at teardown.

pub mod breaker;
pub mod catalog;
pub mod classify;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod gate;
pub mod health;
pub mod maintenance;
pub mod proxy;
pub mod session;
#[cfg(test)]
mod testing;

pub use breaker::{BreakerState, CircuitBreaker};
pub use catalog::Catalog;
pub use classify::{classify, ErrorKind};
pub use config::{PoolConfig, TimeoutClasses};
pub use dispatch::{operation, Dispatcher, OpContext, Operation, Payload, TimeoutClass};
pub use error::{Error, Result};
pub use gate::ConcurrencyGate;
pub use health::{AccountHealth, Admission, HealthStatus, HealthTracker, RateCheck};
pub use maintenance::{spawn_maintenance, Maintenance, RateControl};
pub use proxy::{ProxyEndpoint, ProxyPool, Reservation};
pub use session::SessionManager;
