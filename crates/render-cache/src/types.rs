//! Core types for the render cache

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Group used when a key is given as a bare name
pub const DEFAULT_GROUP: &str = "default";

/// Metadata for one cached artifact
///
/// The stored filename is derived from the group and name (plus the source
/// file's extension), so a repeated put with the same key overwrites the
/// same path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheItem {
    pub name: String,
    pub stored_filename: String,
    pub expires_at: DateTime<Utc>,
    pub keep: bool,
}

/// Identifies a cached item by group and logical name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub group: String,
    pub name: String,
}

impl CacheKey {
    pub fn new(group: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            name: name.into(),
        }
    }
}

impl From<&str> for CacheKey {
    fn from(name: &str) -> Self {
        Self::new(DEFAULT_GROUP, name)
    }
}

impl From<String> for CacheKey {
    fn from(name: String) -> Self {
        Self::new(DEFAULT_GROUP, name)
    }
}

impl From<(&str, &str)> for CacheKey {
    fn from((group, name): (&str, &str)) -> Self {
        Self::new(group, name)
    }
}

impl From<(String, String)> for CacheKey {
    fn from((group, name): (String, String)) -> Self {
        Self::new(group, name)
    }
}

/// Configuration for a render cache instance
#[derive(Debug, Clone)]
pub struct RenderCacheConfig {
    /// Directory owning all data files and cached artifacts
    pub cache_root: PathBuf,
    /// Public URL corresponding to `cache_root`, used by `get_url`
    pub base_url: String,
    /// Site-wide secret mixed into every hash so filenames cannot be
    /// guessed from item names
    pub salt: String,
}

impl Default for RenderCacheConfig {
    fn default() -> Self {
        Self {
            cache_root: PathBuf::from("./cache/render"),
            base_url: "/cache/render".to_string(),
            salt: String::new(),
        }
    }
}
