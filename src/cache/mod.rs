//! In-memory object cache subsystem.
//!
//! # Data Flow
//! ```text
//! Session (cache hit path):
//!     lookup(uri) → promote to most-recently-used → copy of payload
//!
//! Session (cache miss path):
//!     relay origin bytes → stage up to max_object_bytes
//!     → origin closes → insert(uri, staged)
//!     → evict least-recently-used until the new object fits
//! ```
//!
//! # Design Decisions
//! - One coarse mutex per public operation; no reader/writer split
//! - Recency order lives in an `LruCache` keyed by the raw request URI,
//!   so entries are addressed by key rather than by linked pointers
//! - Capacity is accounted in payload bytes, not entry count
//! - First writer wins: inserting an existing key is a no-op

pub mod stats;
pub mod store;

pub use stats::CacheStats;
pub use store::{InsertOutcome, ObjectCache};
