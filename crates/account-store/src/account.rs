//! Account and cookie records
//!
//! The serialized shape matches the registry file exactly: a JSON array of
//! accounts with `{username, password, email, "2fa", usable, isLocked,
//! cookie: [...]}`. Passwords and 2FA seeds are wrapped in `Secret` so a
//! stray `{:?}` never leaks them into logs, while serialization stays
//! transparent for the file format.

use common::Secret;
use serde::{Deserialize, Serialize};

/// A stored session cookie.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Cookie {
    pub key: String,
    pub value: String,
    pub domain: Option<String>,
    pub path: Option<String>,
    pub expires: Option<String>,
    pub secure: bool,
    pub http_only: bool,
    pub same_site: Option<String>,
}

impl Default for Cookie {
    fn default() -> Self {
        Self {
            key: String::new(),
            value: String::new(),
            domain: None,
            path: None,
            expires: None,
            secure: false,
            http_only: false,
            same_site: None,
        }
    }
}

impl Cookie {
    /// The `key=value` pair handed to the driver's cookie installer.
    pub fn pair(&self) -> String {
        format!("{}={}", self.key, self.value)
    }

    /// Parse a `Set-Cookie`-style string exported by the driver after login.
    ///
    /// Returns `None` when the first segment is not a `key=value` pair.
    pub fn parse(raw: &str) -> Option<Self> {
        let mut segments = raw.split(';').map(str::trim);
        let (key, value) = segments.next()?.split_once('=')?;
        if key.is_empty() {
            return None;
        }

        let mut cookie = Cookie {
            key: key.to_string(),
            value: value.to_string(),
            ..Cookie::default()
        };
        for segment in segments {
            match segment.split_once('=') {
                Some((name, val)) if name.eq_ignore_ascii_case("domain") => {
                    cookie.domain = Some(val.to_string());
                }
                Some((name, val)) if name.eq_ignore_ascii_case("path") => {
                    cookie.path = Some(val.to_string());
                }
                Some((name, val)) if name.eq_ignore_ascii_case("expires") => {
                    cookie.expires = Some(val.to_string());
                }
                Some((name, val)) if name.eq_ignore_ascii_case("samesite") => {
                    cookie.same_site = Some(val.to_string());
                }
                None if segment.eq_ignore_ascii_case("secure") => cookie.secure = true,
                None if segment.eq_ignore_ascii_case("httponly") => cookie.http_only = true,
                _ => {}
            }
        }
        Some(cookie)
    }
}

/// A single scraping account with its stored session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub username: String,
    pub password: Secret<String>,
    pub email: String,
    /// TOTP seed for the 2FA login challenge, when enrolled.
    #[serde(rename = "2fa", default, skip_serializing_if = "Option::is_none")]
    pub two_factor_secret: Option<Secret<String>>,
    /// Soft gate: an unusable account is never selected but stays on file.
    #[serde(default = "default_usable")]
    pub usable: bool,
    /// Hard gate set on terminal lock signals; cleared only by an admin.
    #[serde(rename = "isLocked", default)]
    pub is_locked: bool,
    #[serde(rename = "cookie", default)]
    pub cookies: Vec<Cookie>,
}

fn default_usable() -> bool {
    true
}

impl Account {
    /// Create a fresh usable account with no stored session.
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        email: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            password: Secret::new(password.into()),
            email: email.into(),
            two_factor_secret: None,
            usable: true,
            is_locked: false,
            cookies: Vec::new(),
        }
    }

    /// Cookie pairs for the driver's `set_cookies`.
    pub fn cookie_pairs(&self) -> Vec<String> {
        self.cookies.iter().map(Cookie::pair).collect()
    }

    pub fn has_cookies(&self) -> bool {
        !self.cookies.is_empty()
    }
}
