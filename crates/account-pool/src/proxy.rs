//! Proxy pool with sticky assignment and per-proxy spacing
//!
//! Proxies load from a flat file, one `host:port:username:password` per
//! line. Assignment is deterministic round-robin on first use per username
//! and pinned for the process lifetime; an account always egresses through
//! the same endpoint. `reserve` enforces the minimum spacing between
//! requests through one proxy with an atomic check-and-set on its
//! ready-time.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use scraper_driver::ProxySpec;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// One pool endpoint: connection facts plus its scheduling state.
pub struct ProxyEndpoint {
    pub id: usize,
    pub spec: ProxySpec,
    next_ready_at: Mutex<Instant>,
}

impl ProxyEndpoint {
    fn new(id: usize, spec: ProxySpec) -> Self {
        Self {
            id,
            spec,
            next_ready_at: Mutex::new(Instant::now()),
        }
    }
}

/// Outcome of a spacing reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reservation {
    Ready,
    /// Too soon; the proxy frees up after this wait.
    Wait(Duration),
}

struct PoolInner {
    proxies: Vec<Arc<ProxyEndpoint>>,
    assignments: HashMap<String, Arc<ProxyEndpoint>>,
    assigned_count: usize,
}

/// The process-wide proxy pool.
pub struct ProxyPool {
    inner: Mutex<PoolInner>,
    spacing: Duration,
}

impl ProxyPool {
    /// Load the proxy list file. A missing file yields an empty pool (all
    /// traffic goes direct); malformed lines are skipped with a warning.
    pub fn load(path: &Path, spacing: Duration) -> Result<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "proxy file not found, running without proxies");
                return Ok(Self::from_lines(std::iter::empty(), spacing));
            }
            Err(e) => return Err(Error::Io(format!("reading proxy file: {e}"))),
        };
        let pool = Self::from_lines(contents.lines(), spacing);
        info!(path = %path.display(), proxies = pool.len(), "loaded proxy pool");
        Ok(pool)
    }

    /// Build a pool from pre-split lines.
    pub fn from_lines<'a>(lines: impl IntoIterator<Item = &'a str>, spacing: Duration) -> Self {
        let mut proxies = Vec::new();
        for line in lines {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match parse_line(line) {
                Some(spec) => proxies.push(Arc::new(ProxyEndpoint::new(proxies.len(), spec))),
                None => warn!(line, "skipping malformed proxy line"),
            }
        }
        Self {
            inner: Mutex::new(PoolInner {
                proxies,
                assignments: HashMap::new(),
                assigned_count: 0,
            }),
            spacing,
        }
    }

    /// The endpoint pinned to this username, assigning one round-robin on
    /// first use. `None` when the pool is empty.
    pub fn assign(&self, username: &str) -> Option<Arc<ProxyEndpoint>> {
        let mut inner = self.inner.lock().expect("proxy pool lock poisoned");
        if inner.proxies.is_empty() {
            return None;
        }
        if let Some(endpoint) = inner.assignments.get(username) {
            return Some(endpoint.clone());
        }
        let idx = inner.assigned_count % inner.proxies.len();
        let endpoint = inner.proxies[idx].clone();
        inner.assigned_count += 1;
        inner
            .assignments
            .insert(username.to_string(), endpoint.clone());
        debug!(username, proxy = %endpoint.spec, "pinned proxy to account");
        Some(endpoint)
    }

    /// Atomically claim the next request slot on a proxy. On success the
    /// ready-time advances by the spacing; on refusal the remaining wait is
    /// returned and the ready-time is untouched.
    pub fn reserve(&self, endpoint: &ProxyEndpoint) -> Reservation {
        let mut ready_at = endpoint
            .next_ready_at
            .lock()
            .expect("proxy ready-time lock poisoned");
        let now = Instant::now();
        if now >= *ready_at {
            *ready_at = now + self.spacing;
            Reservation::Ready
        } else {
            Reservation::Wait(*ready_at - now)
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("proxy pool lock poisoned").proxies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// How many accounts hold a pinned endpoint, for the stats report.
    pub fn assignment_count(&self) -> usize {
        self.inner
            .lock()
            .expect("proxy pool lock poisoned")
            .assignments
            .len()
    }
}

fn parse_line(line: &str) -> Option<ProxySpec> {
    let mut parts = line.splitn(4, ':');
    let host = parts.next()?.to_string();
    let port = parts.next()?.parse().ok()?;
    let username = parts.next()?.to_string();
    let password = parts.next()?.to_string();
    if host.is_empty() {
        return None;
    }
    Some(ProxySpec {
        host,
        port,
        username,
        password,
    })
}
