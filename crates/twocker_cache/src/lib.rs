//! Expiring lookup cache with TTL support.
//!
//! This crate provides caching infrastructure for platform status lookups,
//! reducing API calls and keeping the bot inside upstream quotas.
//!
//! Concurrent lookups for the same key are coalesced: one caller fetches
//! while the others wait and then read the stored value. Failed fetches are
//! never stored.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod cache;
mod stats;

pub use cache::{CacheEntry, TtlCache, TtlCacheConfig, TtlCacheConfigBuilder};
pub use stats::CacheStats;
