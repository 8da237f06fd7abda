//! Render cache facade
//!
//! `RenderCache` owns a cache directory and the in-memory state for every
//! group referenced during the process run. Each public operation makes the
//! target group resident (loading its data file on first touch, which also
//! sweeps expired items), acts on memory, then writes the group back if it
//! mutated anything.
//!
//! If the cache directory cannot be created or written the cache comes up
//! disabled and every operation degrades to a no-op or empty result rather
//! than raising. Availability wins over strictness here: a broken cache
//! directory must not take page rendering down with it.

use crate::address::Addressing;
use crate::error::{RenderCacheError, Result};
use crate::hooks::{CacheEvent, CacheHook, HookRegistry};
use crate::matcher::{self, MatchMode};
use crate::persist;
use crate::store::CacheStore;
use crate::types::{CacheItem, CacheKey, RenderCacheConfig};
use chrono::{Duration, Utc};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

/// Filesystem-backed cache for rendered artifacts
///
/// Values are always files on disk: `put` copies a source file into the
/// cache directory under a salted content address, and `get_url`/`get_path`
/// resolve the same (group, name) key back to a location. State is guarded
/// by a single lock so one instance can be shared across threads; metadata
/// writes are staged-and-renamed so concurrent processes never read a torn
/// file.
pub struct RenderCache {
    config: RenderCacheConfig,
    enabled: bool,
    store: Mutex<CacheStore>,
    hooks: HookRegistry,
}

impl RenderCache {
    /// Create a cache over `config.cache_root`, bootstrapping the directory
    ///
    /// A root that cannot be created or written disables the cache: every
    /// later operation becomes a silent no-op or empty result.
    pub fn new(config: RenderCacheConfig) -> Self {
        let enabled = match bootstrap_cache_root(&config.cache_root) {
            Ok(()) => true,
            Err(err) => {
                warn!(
                    cache_root = %config.cache_root.display(),
                    error = %err,
                    "Cache directory is not writable; cache disabled"
                );
                false
            }
        };

        let mut store = CacheStore::new(
            Addressing::new(config.salt.clone()),
            config.cache_root.clone(),
        );
        if enabled {
            persist::load_registry(&mut store);
        }

        Self {
            config,
            enabled,
            store: Mutex::new(store),
            hooks: HookRegistry::default(),
        }
    }

    /// Whether the directory bootstrap succeeded
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Register an observer of mutating operations; hooks run in
    /// registration order and any of them may veto a mutation
    pub fn register_hook(&mut self, hook: Box<dyn CacheHook>) {
        self.hooks.register(hook);
    }

    /// Cache a file under `key`, copying its bytes into the cache directory
    ///
    /// The stored filename is derived from the key alone, so putting the
    /// same key again overwrites the same path; last put wins. Returns
    /// `Ok(false)` when the cache is disabled or a hook vetoed the put.
    pub fn put(
        &self,
        key: impl Into<CacheKey>,
        source: impl AsRef<Path>,
        ttl_secs: u64,
        keep: bool,
    ) -> Result<bool> {
        if !self.enabled {
            return Ok(false);
        }
        let key = key.into();
        let source = source.as_ref();
        if !source.exists() {
            return Err(RenderCacheError::SourceNotFound(source.to_path_buf()));
        }
        let event = CacheEvent::Put {
            group: &key.group,
            name: &key.name,
            ttl_secs,
            keep,
        };
        if !self.hooks.allow(&event) {
            debug!(group = %key.group, name = %key.name, "Put vetoed by hook");
            return Ok(false);
        }

        let mut store = self.lock_store();
        let ghash = store.address().group_hash(&key.group);
        persist::ensure_loaded(&mut store, &ghash)?;

        let storage_key = store.address().storage_key(&key.group, &key.name);
        let stored_filename = match source.extension().and_then(|ext| ext.to_str()) {
            Some(ext) => format!("{}.{}", storage_key, ext),
            None => storage_key,
        };
        persist::copy_file_atomic(source, &store.artifact_path(&stored_filename))?;

        let nhash = store.address().name_hash(&key.name);
        store.insert_item(
            &ghash,
            &nhash,
            CacheItem {
                name: key.name.clone(),
                stored_filename,
                expires_at: Utc::now() + Duration::seconds(ttl_secs as i64),
                keep,
            },
        );
        store.register_group(&ghash, &key.group);
        persist::save_group(&store, &ghash)?;
        drop(store);

        debug!(group = %key.group, name = %key.name, ttl_secs, keep, "Cached file");
        self.hooks.notify_after(&event);
        Ok(true)
    }

    /// URL of a cached item, for links and img src attributes
    ///
    /// Resolves whatever record is present, expired or not; serving stale
    /// content for a kept item depends on that.
    pub fn get_url(&self, key: impl Into<CacheKey>) -> Option<String> {
        let filename = self.stored_filename(key.into())?;
        let base = self.config.base_url.trim_end_matches('/');
        Some(format!("{}/{}", base, filename))
    }

    /// Filesystem path of a cached item
    pub fn get_path(&self, key: impl Into<CacheKey>) -> Option<PathBuf> {
        let filename = self.stored_filename(key.into())?;
        Some(self.config.cache_root.join(filename))
    }

    /// Is `key` cached and usable?
    ///
    /// True iff a record exists, it is within its TTL or marked keep, and
    /// the backing file is still on disk. A record whose file vanished
    /// out-of-band counts as not present, whatever its metadata says.
    pub fn has(&self, key: impl Into<CacheKey>) -> bool {
        if !self.enabled {
            return false;
        }
        let key = key.into();
        let mut store = self.lock_store();
        let ghash = store.address().group_hash(&key.group);
        if !self.load_for_read(&mut store, &ghash) {
            return false;
        }
        let nhash = store.address().name_hash(&key.name);
        store.has_item(&ghash, &nhash)
    }

    /// Has `key` passed its TTL?
    ///
    /// Deliberately asymmetric with `has`: a kept item past its TTL is
    /// still reported expired here, so callers can refresh content while
    /// `has`/`get_path` keep serving the stale file. A disabled cache
    /// reports everything expired, since nothing is cached at all.
    pub fn expired(&self, key: impl Into<CacheKey>) -> bool {
        if !self.enabled {
            return true;
        }
        let key = key.into();
        let mut store = self.lock_store();
        let ghash = store.address().group_hash(&key.group);
        if !self.load_for_read(&mut store, &ghash) {
            return true;
        }
        let nhash = store.address().name_hash(&key.name);
        store.item_expired(&ghash, &nhash)
    }

    /// Does `group` hold at least one item that passes `has`?
    pub fn has_group(&self, group: &str) -> bool {
        if !self.enabled {
            return false;
        }
        let mut store = self.lock_store();
        let ghash = store.address().group_hash(group);
        if !self.load_for_read(&mut store, &ghash) {
            return false;
        }
        store.has_alive_group(&ghash)
    }

    /// All records currently resident for `group`
    pub fn get_group(&self, group: &str) -> Vec<CacheItem> {
        if !self.enabled {
            return Vec::new();
        }
        let mut store = self.lock_store();
        let ghash = store.address().group_hash(group);
        if !self.load_for_read(&mut store, &ghash) {
            return Vec::new();
        }
        store.group_items(&ghash)
    }

    /// Push a cached item's expiry `extra_secs` further out
    ///
    /// No-op if the record does not exist.
    pub fn extend(&self, key: impl Into<CacheKey>, extra_secs: u64) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        let key = key.into();
        let event = CacheEvent::Extend {
            group: &key.group,
            name: &key.name,
            extra_secs,
        };
        if !self.hooks.allow(&event) {
            return Ok(());
        }

        let mut store = self.lock_store();
        let ghash = store.address().group_hash(&key.group);
        persist::ensure_loaded(&mut store, &ghash)?;
        let nhash = store.address().name_hash(&key.name);
        store.extend_item(&ghash, &nhash, extra_secs);
        persist::save_group(&store, &ghash)?;
        drop(store);

        self.hooks.notify_after(&event);
        Ok(())
    }

    /// Expire every item whose name matches `key.name` under `mode`
    ///
    /// The full match set is computed before any removal. Each removal
    /// deletes the backing file and drops the record; a group left without
    /// live items is pruned from memory, disk, and the registry. Expiring
    /// names that are not cached is a no-op, so repeating an expire is
    /// harmless. Returns how many records were removed.
    pub fn expire(&self, key: impl Into<CacheKey>, mode: MatchMode) -> Result<usize> {
        if !self.enabled {
            return Ok(0);
        }
        let key = key.into();
        let event = CacheEvent::Expire {
            group: &key.group,
            pattern: &key.name,
            mode,
        };
        if !self.hooks.allow(&event) {
            return Ok(0);
        }

        let mut store = self.lock_store();
        let ghash = store.address().group_hash(&key.group);
        persist::ensure_loaded(&mut store, &ghash)?;

        let names = matcher::match_names(store.group(&ghash), &key.name, mode)?;
        let mut removed = 0;
        for name in &names {
            let nhash = store.address().name_hash(name);
            if store.remove_item(&ghash, &nhash)? {
                removed += 1;
            }
        }
        persist::save_group(&store, &ghash)?;
        drop(store);

        debug!(group = %key.group, pattern = %key.name, removed, "Expired cache items");
        self.hooks.notify_after(&event);
        Ok(removed)
    }

    /// Empty the cache completely: every registered group is loaded, all of
    /// its items expired, and its files removed
    pub fn purge(&self) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        if !self.hooks.allow(&CacheEvent::Purge) {
            return Ok(());
        }

        let mut store = self.lock_store();
        for (ghash, group) in store.registry_snapshot() {
            debug!(group = %group, "Purging cache group");
            persist::ensure_loaded(&mut store, &ghash)?;
            let nhashes: Vec<String> = store
                .group(&ghash)
                .map(|group| group.keys().cloned().collect())
                .unwrap_or_default();
            for nhash in nhashes {
                store.remove_item(&ghash, &nhash)?;
            }
            // An already-empty group has no items to remove but still needs
            // its slot and registry entry dropped
            store.prune_group_if_dead(&ghash)?;
            persist::save_group(&store, &ghash)?;
        }
        drop(store);

        self.hooks.notify_after(&CacheEvent::Purge);
        Ok(())
    }

    /// Remove every item in `group` that fails `has`
    ///
    /// The same sweep also runs automatically, once, when a group is first
    /// loaded from its data file.
    pub fn clear_expired(&self, group: &str) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        let event = CacheEvent::ClearExpired { group };
        if !self.hooks.allow(&event) {
            return Ok(());
        }

        let mut store = self.lock_store();
        let ghash = store.address().group_hash(group);
        persist::ensure_loaded(&mut store, &ghash)?;
        store.clear_expired_in_group(&ghash)?;
        persist::save_group(&store, &ghash)?;
        drop(store);

        self.hooks.notify_after(&event);
        Ok(())
    }

    fn stored_filename(&self, key: CacheKey) -> Option<String> {
        if !self.enabled {
            return None;
        }
        let mut store = self.lock_store();
        let ghash = store.address().group_hash(&key.group);
        if !self.load_for_read(&mut store, &ghash) {
            return None;
        }
        let nhash = store.address().name_hash(&key.name);
        store
            .item(&ghash, &nhash)
            .map(|item| item.stored_filename.clone())
    }

    // Read paths report absence instead of raising when the lazy load
    // fails; mutating operations propagate the same failure as an error.
    fn load_for_read(&self, store: &mut CacheStore, ghash: &str) -> bool {
        match persist::ensure_loaded(store, ghash) {
            Ok(()) => true,
            Err(err) => {
                warn!(ghash, error = %err, "Failed to load group data");
                false
            }
        }
    }

    fn lock_store(&self) -> MutexGuard<'_, CacheStore> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn bootstrap_cache_root(root: &Path) -> std::io::Result<()> {
    fs::create_dir_all(root)?;
    // Probe writability with a throwaway file; directory metadata alone
    // can lie under exotic mounts and ACLs
    let probe = root.join(format!(".probe{}", std::process::id()));
    fs::write(&probe, b"")?;
    match fs::remove_file(&probe) {
        Err(err) if err.kind() != ErrorKind::NotFound => Err(err),
        _ => Ok(()),
    }
}
