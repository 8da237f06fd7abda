//! Deterministic, salted addressing of cache entries
//!
//! Storage identifiers are salted SHA-256 digests of group and item names.
//! Filenames stay stable across runs (no separate index is needed to map a
//! request back to its file) but cannot be enumerated without the salt.

use sha2::{Digest, Sha256};

/// Derives storage identifiers for groups and items
#[derive(Debug, Clone)]
pub struct Addressing {
    salt: String,
}

impl Addressing {
    pub fn new(salt: impl Into<String>) -> Self {
        Self { salt: salt.into() }
    }

    /// Hash identifying a group's data file on disk
    pub fn group_hash(&self, group: &str) -> String {
        self.salted_digest(group)
    }

    /// Hash identifying an item within its group's map
    ///
    /// The salt is the single site-wide secret, not group-scoped: identical
    /// names in different groups share a name hash and are distinguished by
    /// the group map that holds them.
    pub fn name_hash(&self, name: &str) -> String {
        self.salted_digest(name)
    }

    /// Base of the stored filename for a (group, name) pair
    pub fn storage_key(&self, group: &str, name: &str) -> String {
        format!("{}.{}", self.group_hash(group), self.name_hash(name))
    }

    fn salted_digest(&self, value: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(value.as_bytes());
        hasher.update(self.salt.as_bytes());
        hex::encode(hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hashes_are_deterministic() {
        let address = Addressing::new("secret");
        assert_eq!(address.group_hash("default"), address.group_hash("default"));
        assert_eq!(address.name_hash("report"), address.name_hash("report"));
    }

    #[test]
    fn test_salt_changes_hashes() {
        let a = Addressing::new("salt-a");
        let b = Addressing::new("salt-b");
        assert_ne!(a.group_hash("default"), b.group_hash("default"));
        assert_ne!(a.name_hash("report"), b.name_hash("report"));
    }

    #[test]
    fn test_name_hash_shared_across_groups() {
        // The salt is site-wide, so the name hash does not depend on a group
        let address = Addressing::new("secret");
        let key_a = address.storage_key("images", "report");
        let key_b = address.storage_key("pdfs", "report");
        assert_ne!(key_a, key_b);
        assert_eq!(
            key_a.split('.').nth(1).unwrap(),
            key_b.split('.').nth(1).unwrap()
        );
    }

    #[test]
    fn test_storage_key_format() {
        let address = Addressing::new("secret");
        let key = address.storage_key("images", "report");
        let parts: Vec<&str> = key.split('.').collect();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0], address.group_hash("images"));
        assert_eq!(parts[1], address.name_hash("report"));
    }

    #[test]
    fn test_hashes_are_filesystem_safe() {
        let address = Addressing::new("secret");
        let hash = address.name_hash("../../etc/passwd?*");
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
