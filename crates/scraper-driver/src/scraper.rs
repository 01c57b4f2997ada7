//! The upstream client contract
//!
//! `Scraper` is the fixed verb set the orchestrator may call; one instance
//! represents one authenticated upstream session. `ScraperConnector` builds
//! sessions, binding each to an egress proxy at construction time so that
//! concurrent calls on different accounts never share mutable transport
//! state (a per-call dispatcher object instead of a process-global one).

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{Profile, ProfilePage, ProxySpec, SearchMode, Tweet, TweetPage};

/// One authenticated session against the upstream service.
///
/// Errors carry only a message; the orchestrator classifies them textually.
/// Implementations must be safe to share across tasks (`Arc<dyn Scraper>`):
/// the dispatcher may run several calls on the same session concurrently
/// during batch execution.
#[async_trait]
pub trait Scraper: Send + Sync {
    /// Search tweets for a query under the given tab, resuming from `cursor`.
    async fn search_tweets(
        &self,
        query: &str,
        mode: SearchMode,
        cursor: Option<&str>,
    ) -> Result<TweetPage>;

    /// Fetch a profile by username.
    async fn get_profile(&self, username: &str) -> Result<Profile>;

    /// Fetch a profile by its numeric user id.
    async fn get_profile_by_user_id(&self, user_id: &str) -> Result<Profile>;

    /// Fetch up to `max` tweets from a user's timeline (no replies).
    async fn get_tweets(&self, username: &str, max: usize) -> Result<Vec<Tweet>>;

    /// Fetch up to `max` tweets and replies from a user's timeline.
    async fn get_tweets_and_replies(&self, username: &str, max: usize) -> Result<Vec<Tweet>>;

    /// Fetch one timeline page for a user id or screen name.
    async fn get_user_tweets(
        &self,
        id_or_name: &str,
        page_size: usize,
        cursor: Option<&str>,
    ) -> Result<TweetPage>;

    /// Fetch a single tweet by id.
    async fn get_tweet(&self, id: &str) -> Result<Tweet>;

    /// Fetch one page of a profile's followers.
    async fn fetch_profile_followers(
        &self,
        user_id: &str,
        max: usize,
        cursor: Option<&str>,
    ) -> Result<ProfilePage>;

    /// Fetch one page of the profiles a user follows.
    async fn fetch_profile_following(
        &self,
        user_id: &str,
        max: usize,
        cursor: Option<&str>,
    ) -> Result<ProfilePage>;

    /// Search profiles matching a query, up to `max`.
    async fn search_profiles(&self, query: &str, max: usize) -> Result<Vec<Profile>>;

    /// Install session cookies (`key=value` pair strings) without validation.
    async fn set_cookies(&self, cookies: &[String]) -> Result<()>;

    /// Export the current session cookies as `key=value` pair strings.
    async fn get_cookies(&self) -> Result<Vec<String>>;

    /// Authenticate with account credentials. `totp_secret` enables the 2FA
    /// challenge step when the account has one enrolled.
    async fn login(
        &self,
        username: &str,
        password: &str,
        email: &str,
        totp_secret: Option<&str>,
    ) -> Result<()>;
}

/// Factory for driver sessions.
///
/// `connect` is called once per (account, proxy) binding; the proxy binding
/// is fixed for the session's lifetime, matching the pool's sticky
/// assignment invariant.
#[async_trait]
pub trait ScraperConnector: Send + Sync {
    async fn connect(&self, proxy: Option<&ProxySpec>) -> Result<Arc<dyn Scraper>>;
}
