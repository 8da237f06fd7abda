//! Group and registry persistence
//!
//! Metadata lives in JSON data files under the cache root: one
//! `<groupHash>.data` per group plus a single `groups.data` registry mapping
//! group hashes back to names. Writes stage into a per-process temp file
//! and rename it into place, so a concurrent reader never observes a torn
//! file; the last writer wins.

use crate::error::Result;
use crate::store::{CacheGroup, CacheStore};
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Registry of all known groups, relative to the cache root
pub const GROUP_REGISTRY_FILE: &str = "groups.data";

fn group_data_file(cache_root: &Path, ghash: &str) -> PathBuf {
    cache_root.join(format!("{}.data", ghash))
}

fn registry_file(cache_root: &Path) -> PathBuf {
    cache_root.join(GROUP_REGISTRY_FILE)
}

/// Make a group resident, deserializing its data file on the first touch
///
/// A fresh load immediately sweeps expired items; that sweep runs only
/// here, once per load, never on every access. A missing data file means
/// the group simply has no items yet. An unreadable or corrupt data file
/// is treated the same way, with a warning.
pub fn ensure_loaded(store: &mut CacheStore, ghash: &str) -> Result<()> {
    if store.is_resident(ghash) {
        return Ok(());
    }

    let path = group_data_file(store.cache_root(), ghash);
    let group = match fs::read_to_string(&path) {
        Ok(contents) => match serde_json::from_str::<CacheGroup>(&contents) {
            Ok(group) => {
                debug!(ghash, items = group.len(), "Loaded group data file");
                group
            }
            Err(err) => {
                warn!(ghash, error = %err, "Corrupt group data file; treating group as empty");
                CacheGroup::new()
            }
        },
        Err(err) if err.kind() == ErrorKind::NotFound => CacheGroup::new(),
        Err(err) => {
            warn!(ghash, error = %err, "Unreadable group data file; treating group as empty");
            CacheGroup::new()
        }
    };

    store.insert_loaded(ghash, group);
    store.clear_expired_in_group(ghash)?;
    Ok(())
}

/// Write a group's metadata back to disk
///
/// An alive group is serialized to its data file; a dead group's data file
/// is deleted so no empty-group files linger. The registry file is
/// rewritten unconditionally afterward to keep it in step with memory.
pub fn save_group(store: &CacheStore, ghash: &str) -> Result<()> {
    let path = group_data_file(store.cache_root(), ghash);

    if store.has_alive_group(ghash) {
        if let Some(group) = store.group(ghash) {
            let contents = serde_json::to_string(group)?;
            write_atomic(&path, contents.as_bytes())?;
        }
    } else {
        match fs::remove_file(&path) {
            Ok(()) => debug!(ghash, "Removed data file of dead group"),
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }
    }

    save_registry(store)
}

/// Rewrite the group registry file from in-memory state
pub fn save_registry(store: &CacheStore) -> Result<()> {
    let contents = serde_json::to_string(store.registry())?;
    write_atomic(&registry_file(store.cache_root()), contents.as_bytes())?;
    Ok(())
}

/// Read the group registry into memory; a missing or corrupt file means no
/// groups are known yet
pub fn load_registry(store: &mut CacheStore) {
    let path = registry_file(store.cache_root());
    let registry = match fs::read_to_string(&path) {
        Ok(contents) => match serde_json::from_str::<HashMap<String, String>>(&contents) {
            Ok(registry) => registry,
            Err(err) => {
                warn!(error = %err, "Corrupt group registry; starting empty");
                HashMap::new()
            }
        },
        Err(err) if err.kind() == ErrorKind::NotFound => HashMap::new(),
        Err(err) => {
            warn!(error = %err, "Unreadable group registry; starting empty");
            HashMap::new()
        }
    };
    store.set_registry(registry);
}

/// Copy a source file into place via a staged temp file and rename
pub(crate) fn copy_file_atomic(source: &Path, dest: &Path) -> std::io::Result<()> {
    let tmp = tmp_path(dest);
    fs::copy(source, &tmp)?;
    fs::rename(&tmp, dest)
}

fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let tmp = tmp_path(path);
    fs::write(&tmp, contents)?;
    fs::rename(&tmp, path)
}

// Staging name is per-process so concurrent writers cannot clobber each
// other's half-written temp file; the rename itself is last-writer-wins.
fn tmp_path(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_os_string();
    tmp.push(format!(".tmp{}", std::process::id()));
    PathBuf::from(tmp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::Addressing;
    use crate::types::CacheItem;
    use chrono::{Duration, Utc};
    use tempfile::tempdir;

    fn test_store(root: &Path) -> CacheStore {
        CacheStore::new(Addressing::new("test-salt"), root.to_path_buf())
    }

    fn insert(store: &mut CacheStore, group: &str, name: &str, ttl_secs: i64, keep: bool) {
        let stored_filename = format!("{}.png", store.address().storage_key(group, name));
        fs::write(store.artifact_path(&stored_filename), b"pixels").unwrap();
        let ghash = store.address().group_hash(group);
        let nhash = store.address().name_hash(name);
        store.insert_item(
            &ghash,
            &nhash,
            CacheItem {
                name: name.to_string(),
                stored_filename,
                expires_at: Utc::now() + Duration::seconds(ttl_secs),
                keep,
            },
        );
        store.register_group(&ghash, group);
    }

    #[test]
    fn test_group_round_trip() {
        let dir = tempdir().unwrap();
        let mut store = test_store(dir.path());
        insert(&mut store, "g", "report", 3600, false);
        let ghash = store.address().group_hash("g");
        save_group(&store, &ghash).unwrap();

        let mut reloaded = test_store(dir.path());
        load_registry(&mut reloaded);
        ensure_loaded(&mut reloaded, &ghash).unwrap();

        let nhash = reloaded.address().name_hash("report");
        let item = reloaded.item(&ghash, &nhash).unwrap();
        assert_eq!(item.name, "report");
        assert!(reloaded.registry().contains_key(&ghash));
    }

    #[test]
    fn test_missing_data_file_loads_empty_group() {
        let dir = tempdir().unwrap();
        let mut store = test_store(dir.path());
        let ghash = store.address().group_hash("never-saved");

        ensure_loaded(&mut store, &ghash).unwrap();
        assert!(store.group(&ghash).unwrap().is_empty());
    }

    #[test]
    fn test_corrupt_data_file_loads_empty_group() {
        let dir = tempdir().unwrap();
        let mut store = test_store(dir.path());
        let ghash = store.address().group_hash("g");
        fs::write(group_data_file(dir.path(), &ghash), b"not json {").unwrap();

        ensure_loaded(&mut store, &ghash).unwrap();
        assert!(store.group(&ghash).unwrap().is_empty());
    }

    #[test]
    fn test_load_sweeps_expired_items_and_their_files() {
        let dir = tempdir().unwrap();
        let mut writer = test_store(dir.path());
        insert(&mut writer, "g", "live", 3600, false);
        insert(&mut writer, "g", "stale", -10, false);
        let ghash = writer.address().group_hash("g");
        // Serialize by hand so the stale record reaches disk un-swept
        let contents = serde_json::to_string(writer.group(&ghash).unwrap()).unwrap();
        fs::write(group_data_file(dir.path(), &ghash), contents).unwrap();
        let stale_nhash = writer.address().name_hash("stale");
        let stale_path = writer.artifact_path(
            &writer.item(&ghash, &stale_nhash).unwrap().stored_filename,
        );

        let mut store = test_store(dir.path());
        ensure_loaded(&mut store, &ghash).unwrap();

        assert!(store.item(&ghash, &stale_nhash).is_none());
        assert!(!stale_path.exists());
        let live_nhash = store.address().name_hash("live");
        assert!(store.has_item(&ghash, &live_nhash));
    }

    #[test]
    fn test_save_dead_group_removes_data_file() {
        let dir = tempdir().unwrap();
        let mut store = test_store(dir.path());
        insert(&mut store, "g", "report", 3600, false);
        let ghash = store.address().group_hash("g");
        save_group(&store, &ghash).unwrap();
        assert!(group_data_file(dir.path(), &ghash).exists());

        let nhash = store.address().name_hash("report");
        store.remove_item(&ghash, &nhash).unwrap();
        save_group(&store, &ghash).unwrap();

        assert!(!group_data_file(dir.path(), &ghash).exists());
        let registry = fs::read_to_string(registry_file(dir.path())).unwrap();
        assert_eq!(registry, "{}");
    }

    #[test]
    fn test_save_rewrites_registry() {
        let dir = tempdir().unwrap();
        let mut store = test_store(dir.path());
        insert(&mut store, "g", "report", 3600, false);
        let ghash = store.address().group_hash("g");
        save_group(&store, &ghash).unwrap();

        let contents = fs::read_to_string(registry_file(dir.path())).unwrap();
        let registry: HashMap<String, String> = serde_json::from_str(&contents).unwrap();
        assert_eq!(registry.get(&ghash).map(String::as_str), Some("g"));
    }

    #[test]
    fn test_atomic_write_leaves_no_temp_files() {
        let dir = tempdir().unwrap();
        let mut store = test_store(dir.path());
        insert(&mut store, "g", "report", 3600, false);
        let ghash = store.address().group_hash("g");
        save_group(&store, &ghash).unwrap();

        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_name().to_string_lossy().contains(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_ensure_loaded_is_idempotent() {
        let dir = tempdir().unwrap();
        let mut store = test_store(dir.path());
        insert(&mut store, "g", "report", 3600, false);
        let ghash = store.address().group_hash("g");
        save_group(&store, &ghash).unwrap();

        let mut reader = test_store(dir.path());
        ensure_loaded(&mut reader, &ghash).unwrap();
        // Deleting the data file out-of-band must not affect a resident group
        fs::remove_file(group_data_file(dir.path(), &ghash)).unwrap();
        ensure_loaded(&mut reader, &ghash).unwrap();

        let nhash = reader.address().name_hash("report");
        assert!(reader.item(&ghash, &nhash).is_some());
    }
}
