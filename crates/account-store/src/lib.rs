//! Account registry for the scraping gateway
//!
//! Owns the durable set of scraping accounts: credentials, stored session
//! cookies, and the usable/locked flags the orchestrator flips when an
//! account goes bad. The registry file (`data.json`) is the single source
//! of truth; every mutation rewrites it atomically.
//!
//! Account lifecycle:
//! 1. Admin adds an account → persisted with `usable = true`
//! 2. The orchestrator refreshes cookies after each successful login
//! 3. Terminal upstream failures mark the account locked or unusable
//! 4. Admin clears cookies, deletes locked accounts, or removes the account
//!
//! This crate is a standalone library with no dependency on the
//! orchestrator — it can be tested and used independently.

mod account;
mod error;
mod store;

pub use account::{Account, Cookie};
pub use error::{Error, Result};
pub use store::AccountStore;
