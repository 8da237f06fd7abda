//! In-memory cache state and expiry evaluation
//!
//! One slot per referenced group tracks whether the group's metadata is
//! resident. A group moves Unloaded (no slot) -> Loaded (map resident;
//! the expired-item sweep runs once, on this transition) -> Absent (pruned
//! after losing its last live item). All methods here work on resident
//! state only; loading and saving live in `persist`.

use crate::address::Addressing;
use crate::error::Result;
use crate::types::CacheItem;
use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Map from name hash to item record; one per group
pub type CacheGroup = HashMap<String, CacheItem>;

/// Residency state for one group
#[derive(Debug)]
pub enum GroupSlot {
    /// Metadata resident in memory
    Loaded(CacheGroup),
    /// Group was pruned after losing its last live item; reads need not
    /// touch the disk again this run
    Absent,
}

/// In-memory state for every group referenced during this process run
#[derive(Debug)]
pub struct CacheStore {
    address: Addressing,
    cache_root: PathBuf,
    groups: HashMap<String, GroupSlot>,
    registry: HashMap<String, String>,
}

impl CacheStore {
    pub fn new(address: Addressing, cache_root: PathBuf) -> Self {
        Self {
            address,
            cache_root,
            groups: HashMap::new(),
            registry: HashMap::new(),
        }
    }

    pub fn address(&self) -> &Addressing {
        &self.address
    }

    pub fn cache_root(&self) -> &Path {
        &self.cache_root
    }

    /// Absolute path of a stored artifact
    pub fn artifact_path(&self, stored_filename: &str) -> PathBuf {
        self.cache_root.join(stored_filename)
    }

    /// True if the group has a slot, Loaded or Absent
    pub fn is_resident(&self, ghash: &str) -> bool {
        self.groups.contains_key(ghash)
    }

    /// Make a group resident with the given item map
    pub fn insert_loaded(&mut self, ghash: &str, group: CacheGroup) {
        self.groups.insert(ghash.to_string(), GroupSlot::Loaded(group));
    }

    /// The group's item map, if the group is in the Loaded state
    pub fn group(&self, ghash: &str) -> Option<&CacheGroup> {
        match self.groups.get(ghash) {
            Some(GroupSlot::Loaded(group)) => Some(group),
            _ => None,
        }
    }

    /// All records of a group, cloned out of the resident map
    pub fn group_items(&self, ghash: &str) -> Vec<CacheItem> {
        self.group(ghash)
            .map(|group| group.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn registry(&self) -> &HashMap<String, String> {
        &self.registry
    }

    pub fn set_registry(&mut self, registry: HashMap<String, String>) {
        self.registry = registry;
    }

    /// Snapshot of (group hash, group name) pairs for iteration that
    /// mutates the registry as it goes
    pub fn registry_snapshot(&self) -> Vec<(String, String)> {
        self.registry
            .iter()
            .map(|(ghash, name)| (ghash.clone(), name.clone()))
            .collect()
    }

    /// Record the group name in the registry if newly seen
    pub fn register_group(&mut self, ghash: &str, group: &str) {
        self.registry
            .entry(ghash.to_string())
            .or_insert_with(|| group.to_string());
    }

    /// Insert or overwrite an item record; an Absent group re-enters the
    /// Loaded state with a fresh map
    pub fn insert_item(&mut self, ghash: &str, nhash: &str, item: CacheItem) {
        let slot = self
            .groups
            .entry(ghash.to_string())
            .or_insert_with(|| GroupSlot::Loaded(CacheGroup::new()));
        if matches!(slot, GroupSlot::Absent) {
            *slot = GroupSlot::Loaded(CacheGroup::new());
        }
        if let GroupSlot::Loaded(group) = slot {
            group.insert(nhash.to_string(), item);
        }
    }

    pub fn item(&self, ghash: &str, nhash: &str) -> Option<&CacheItem> {
        self.group(ghash).and_then(|group| group.get(nhash))
    }

    /// True iff a record exists, is within its TTL or marked keep, and its
    /// backing file is still on disk
    pub fn has_item(&self, ghash: &str, nhash: &str) -> bool {
        let item = match self.item(ghash, nhash) {
            Some(item) => item,
            None => return false,
        };
        if item.expires_at <= Utc::now() && !item.keep {
            return false;
        }
        self.artifact_path(&item.stored_filename).exists()
    }

    /// The time check alone: a kept item past its TTL is still expired,
    /// even though `has_item` reports it present
    pub fn item_expired(&self, ghash: &str, nhash: &str) -> bool {
        let item = match self.item(ghash, nhash) {
            Some(item) => item,
            None => return true,
        };
        if item.expires_at <= Utc::now() {
            return true;
        }
        !self.artifact_path(&item.stored_filename).exists()
    }

    /// Push an item's expiry further out; no-op if the record is absent
    pub fn extend_item(&mut self, ghash: &str, nhash: &str, extra_secs: u64) {
        if let Some(GroupSlot::Loaded(group)) = self.groups.get_mut(ghash) {
            if let Some(item) = group.get_mut(nhash) {
                item.expires_at = item.expires_at + Duration::seconds(extra_secs as i64);
            }
        }
    }

    /// Delete an item's backing file and drop its record, pruning the group
    /// if it is left with no live items. Returns whether a record existed.
    pub fn remove_item(&mut self, ghash: &str, nhash: &str) -> Result<bool> {
        let path = match self.item(ghash, nhash) {
            Some(item) => self.artifact_path(&item.stored_filename),
            None => return Ok(false),
        };
        if path.exists() {
            fs::remove_file(&path)?;
        }
        if let Some(GroupSlot::Loaded(group)) = self.groups.get_mut(ghash) {
            group.remove(nhash);
        }
        self.prune_group_if_dead(ghash)?;
        Ok(true)
    }

    /// True iff at least one item in the group passes `has_item`
    pub fn has_alive_group(&self, ghash: &str) -> bool {
        match self.group(ghash) {
            Some(group) => group.keys().any(|nhash| self.has_item(ghash, nhash)),
            None => false,
        }
    }

    /// Remove every item in the group that fails `has_item`
    ///
    /// This is the only sweep of stale entries; it runs once per group per
    /// load from file, never on every access.
    pub fn clear_expired_in_group(&mut self, ghash: &str) -> Result<()> {
        let stale: Vec<String> = match self.group(ghash) {
            Some(group) => group
                .keys()
                .filter(|nhash| !self.has_item(ghash, nhash))
                .cloned()
                .collect(),
            None => return Ok(()),
        };
        if !stale.is_empty() {
            debug!(ghash, count = stale.len(), "Sweeping expired cache items");
        }
        for nhash in stale {
            self.remove_item(ghash, &nhash)?;
        }
        Ok(())
    }

    /// If the group has no live items left, delete any remaining backing
    /// files, mark the slot Absent, and drop the registry entry
    pub fn prune_group_if_dead(&mut self, ghash: &str) -> Result<()> {
        if !self.is_resident(ghash) || self.has_alive_group(ghash) {
            return Ok(());
        }
        let leftovers: Vec<PathBuf> = self
            .group(ghash)
            .map(|group| {
                group
                    .values()
                    .map(|item| self.artifact_path(&item.stored_filename))
                    .collect()
            })
            .unwrap_or_default();
        for path in leftovers {
            if path.exists() {
                fs::remove_file(&path)?;
            }
        }
        debug!(ghash, "Pruning dead cache group");
        self.groups.insert(ghash.to_string(), GroupSlot::Absent);
        self.registry.remove(ghash);
        Ok(())
    }
}
