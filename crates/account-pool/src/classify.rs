//! Upstream error classification
//!
//! The driver is opaque, so failures arrive as plain text. Classification is
//! a pure function over that text: ordered, case-insensitive substring rules
//! plus a JSON probe for the upstream's numeric lock code. The same message
//! always yields the same kind — the health tracker and dispatcher both rely
//! on that determinism.

use serde_json::Value;

/// Failure taxonomy for one dispatch outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Timeout,
    Network,
    RateLimit,
    Auth,
    NotFound,
    AccountLocked,
    AccountSuspended,
    Unknown,
}

impl ErrorKind {
    /// All kinds, for tallying and stats iteration.
    pub const ALL: [Self; 8] = [
        Self::Timeout,
        Self::Network,
        Self::RateLimit,
        Self::Auth,
        Self::NotFound,
        Self::AccountLocked,
        Self::AccountSuspended,
        Self::Unknown,
    ];

    /// Kind label for logs and stats.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Network => "network",
            Self::RateLimit => "rate_limit",
            Self::Auth => "auth",
            Self::NotFound => "not_found",
            Self::AccountLocked => "account_locked",
            Self::AccountSuspended => "account_suspended",
            Self::Unknown => "unknown",
        }
    }

    /// Kinds that end the account's participation in the current dispatch
    /// (the dispatcher skips it without consuming an attempt).
    pub fn is_terminal_for_account(&self) -> bool {
        matches!(
            self,
            Self::AccountLocked | Self::AccountSuspended | Self::Timeout
        )
    }
}

/// The upstream's JSON error code for a locked account.
const LOCKED_CODE: i64 = 326;

/// Classify a driver error message. Rules apply in order; the first match
/// wins, so the more specific suspension/lock signals are checked before the
/// generic auth keywords they would otherwise fall into.
pub fn classify(message: &str) -> ErrorKind {
    if has_locked_code(message) {
        return ErrorKind::AccountLocked;
    }

    let lower = message.to_lowercase();

    if lower.contains("status 401")
        || lower.contains("status: 401")
        || lower.contains("status code: 401")
    {
        return ErrorKind::AccountSuspended;
    }
    if lower.contains("timeout") || lower.contains("timed out") {
        return ErrorKind::Timeout;
    }
    if lower.contains("network")
        || lower.contains("fetch failed")
        || lower.contains("connection")
        || lower.contains("socket")
    {
        return ErrorKind::Network;
    }
    if lower.contains("rate limit") || lower.contains("too many requests") || lower.contains("429")
    {
        return ErrorKind::RateLimit;
    }
    if lower.contains("auth")
        || lower.contains("login")
        || lower.contains("credentials")
        || lower.contains("unauthorized")
        || lower.contains("401")
    {
        return ErrorKind::Auth;
    }
    if lower.contains("not found") || lower.contains("404") {
        return ErrorKind::NotFound;
    }
    if lower.contains("account is temporarily locked")
        || lower.contains("account locked")
        || lower.contains("to unlock your account")
    {
        return ErrorKind::AccountLocked;
    }
    ErrorKind::Unknown
}

/// Check whether a message is a JSON body carrying `errors[].code == 326`,
/// the upstream's lock marker. Also used by the login path to decide when a
/// failed login must hard-lock the account.
pub fn has_locked_code(message: &str) -> bool {
    let Ok(value) = serde_json::from_str::<Value>(message) else {
        return false;
    };
    let Some(errors) = value.get("errors").and_then(Value::as_array) else {
        return false;
    };
    errors
        .iter()
        .any(|e| e.get("code").and_then(Value::as_i64) == Some(LOCKED_CODE))
}
