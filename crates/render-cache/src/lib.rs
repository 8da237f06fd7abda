//! Filesystem-backed cache for rendered artifacts
//!
//! Stores derived binary files (images, PDFs, any rendered output) in a
//! managed directory under salted content addresses, keyed by a logical
//! name within a named group. Items carry a TTL and an optional keep flag
//! that preserves the file past expiry while the item is still reported as
//! expired, so callers can regenerate content in the background while
//! serving the stale copy.

pub mod address;
pub mod cache;
pub mod error;
pub mod hooks;
pub mod matcher;
pub mod persist;
pub mod store;
pub mod types;

pub use cache::RenderCache;
pub use error::{RenderCacheError, Result};
pub use hooks::{CacheEvent, CacheHook, HookDecision};
pub use matcher::MatchMode;
pub use types::{CacheItem, CacheKey, RenderCacheConfig, DEFAULT_GROUP};
