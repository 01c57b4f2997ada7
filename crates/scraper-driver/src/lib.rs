//! Driver abstraction for the upstream scraping client
//!
//! Defines the `Scraper` trait that decouples the orchestrator from the
//! concrete upstream client library. The client is opaque to this workspace:
//! its verbs are fixed, its errors surface as plain text messages, and the
//! orchestrator classifies those messages without knowing how the driver
//! produced them.
//!
//! Session flow:
//! 1. The orchestrator asks `ScraperConnector::connect` for a driver session
//!    bound to an account's proxy (or none)
//! 2. Stored cookies are installed via `Scraper::set_cookies`, or a fresh
//!    `Scraper::login` runs with the account credentials
//! 3. Read verbs (`get_profile`, `search_tweets`, ...) execute under the
//!    orchestrator's timeouts
//! 4. After a successful login, `Scraper::get_cookies` captures the session
//!    for persistence

mod error;
mod scraper;
mod types;

pub use error::{DriverError, Result};
pub use scraper::{Scraper, ScraperConnector};
pub use types::{Profile, ProfilePage, ProxySpec, SearchMode, Tweet, TweetPage};
