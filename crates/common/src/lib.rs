//! Shared types for the scraping gateway workspace
//!
//! Currently just the `Secret` wrapper that keeps account credentials out
//! of logs; each crate that can fail carries its own error type.

mod secret;

pub use secret::Secret;
