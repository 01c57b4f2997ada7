//! Data types exchanged with the upstream client
//!
//! Field names mirror the upstream payloads (camelCase on the wire) so the
//! orchestrator can pass results through with only light fixes. Everything
//! except identifiers is optional: the upstream omits fields freely.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Search tab selector for tweet searches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchMode {
    Top,
    Latest,
    Photos,
    Videos,
    Users,
}

impl SearchMode {
    /// Mode label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            SearchMode::Top => "top",
            SearchMode::Latest => "latest",
            SearchMode::Photos => "photos",
            SearchMode::Videos => "videos",
            SearchMode::Users => "users",
        }
    }
}

/// An upstream user profile.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Profile {
    pub user_id: String,
    pub username: String,
    pub name: Option<String>,
    pub biography: Option<String>,
    pub location: Option<String>,
    pub followers_count: Option<u64>,
    pub following_count: Option<u64>,
    pub tweets_count: Option<u64>,
    pub is_private: bool,
    pub is_verified: bool,
    pub joined: Option<i64>,
}

/// A single tweet as returned by the upstream.
///
/// `in_reply_to_status` can nest arbitrarily deep (and in pathological
/// payloads, cyclically through ids); the catalog drops it before results
/// leave the orchestrator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Tweet {
    pub id: String,
    pub user_id: Option<String>,
    pub username: Option<String>,
    pub text: Option<String>,
    pub html: Option<String>,
    pub permanent_url: Option<String>,
    pub timestamp: Option<i64>,
    pub likes: Option<u64>,
    pub retweets: Option<u64>,
    pub replies: Option<u64>,
    pub is_retweet: bool,
    pub in_reply_to_status_id: Option<String>,
    pub in_reply_to_status: Option<Box<Tweet>>,
}

/// One page of a cursored tweet listing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TweetPage {
    pub tweets: Vec<Tweet>,
    pub next_cursor: Option<String>,
}

/// One page of a cursored profile listing (followers/following).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProfilePage {
    pub profiles: Vec<Profile>,
    pub next_cursor: Option<String>,
}

/// Egress proxy connection facts handed to the driver at connect time.
///
/// Scheduling state (spacing, stickiness) lives in the orchestrator's proxy
/// pool; the driver only needs enough to build its HTTP agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxySpec {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

impl fmt::Display for ProxySpec {
    // Credentials stay out of logs
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}
