//! Named, versioned request/response stores.
//!
//! A [`Cache`] maps request identity (method + URL) to a stored response
//! snapshot and remembers insertion order, which the platform exposes
//! through key enumeration and which the dynamic-cache evictor relies on.
//! [`CacheStorage`] holds the generations by name, in creation order.

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use taskwave_common::epoch_ms;

/// Response type as seen by the caching layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseKind {
    /// Same-origin response; eligible for storage.
    Basic,
    /// Cross-origin response with an unreadable body; never stored.
    Opaque,
}

/// A cached request/response pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Request URL.
    pub url: String,

    /// Request method.
    pub method: String,

    /// Response status.
    pub status: u16,

    /// Response headers.
    pub headers: HashMap<String, String>,

    /// Response body.
    pub body: Vec<u8>,

    /// Response type.
    pub kind: ResponseKind,

    /// Stored-at timestamp (ms since epoch).
    pub stored_at: u64,
}

impl CacheEntry {
    /// Create an entry for a GET response body.
    pub fn new(url: &str, status: u16, headers: HashMap<String, String>, body: Vec<u8>) -> Self {
        Self {
            url: url.to_string(),
            method: "GET".to_string(),
            status,
            headers,
            body,
            kind: ResponseKind::Basic,
            stored_at: epoch_ms(),
        }
    }
}

// ==================== Cache ====================

/// A single cache generation.
#[derive(Debug, Default)]
pub struct Cache {
    /// Cache name.
    pub name: String,

    /// Entries keyed by URL.
    entries: HashMap<String, CacheEntry>,

    /// URLs in insertion order; re-putting a key keeps its slot.
    order: Vec<String>,
}

impl Cache {
    /// Create a new cache.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Match a request by URL.
    pub fn match_request(&self, url: &str) -> Option<&CacheEntry> {
        self.entries.get(url)
    }

    /// Store an entry. Replacing an existing key does not refresh its
    /// position in enumeration order.
    pub fn put(&mut self, url: &str, entry: CacheEntry) {
        if self.entries.insert(url.to_string(), entry).is_none() {
            self.order.push(url.to_string());
        }
    }

    /// Delete an entry. Returns false if the key was already gone.
    pub fn delete(&mut self, url: &str) -> bool {
        if self.entries.remove(url).is_some() {
            self.order.retain(|u| u != url);
            true
        } else {
            false
        }
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> Vec<&str> {
        self.order.iter().map(|s| s.as_str()).collect()
    }

    /// Oldest-inserted key, if any.
    pub fn oldest_key(&self) -> Option<&str> {
        self.order.first().map(|s| s.as_str())
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ==================== Cache Storage ====================

/// All cache generations, by name.
#[derive(Debug, Default)]
pub struct CacheStorage {
    caches: HashMap<String, Cache>,
    order: Vec<String>,
}

impl CacheStorage {
    /// Create new cache storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a cache, creating it if absent.
    pub fn open(&mut self, name: &str) -> &mut Cache {
        if !self.caches.contains_key(name) {
            self.order.push(name.to_string());
            self.caches.insert(name.to_string(), Cache::new(name));
        }
        // Just inserted above if it was missing.
        self.caches.get_mut(name).unwrap_or_else(|| unreachable!())
    }

    /// Get a cache without creating it.
    pub fn get(&self, name: &str) -> Option<&Cache> {
        self.caches.get(name)
    }

    /// Check if a cache exists.
    pub fn has(&self, name: &str) -> bool {
        self.caches.contains_key(name)
    }

    /// Delete a whole generation.
    pub fn delete(&mut self, name: &str) -> bool {
        if self.caches.remove(name).is_some() {
            self.order.retain(|n| n != name);
            true
        } else {
            false
        }
    }

    /// Generation names in creation order.
    pub fn keys(&self) -> Vec<&str> {
        self.order.iter().map(|s| s.as_str()).collect()
    }

    /// Match a URL across all generations, in creation order.
    pub fn match_request(&self, url: &str) -> Option<&CacheEntry> {
        for name in &self.order {
            if let Some(entry) = self.caches.get(name).and_then(|c| c.match_request(url)) {
                return Some(entry);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(url: &str) -> CacheEntry {
        CacheEntry::new(url, 200, HashMap::new(), b"body".to_vec())
    }

    #[test]
    fn test_put_and_match() {
        let mut cache = Cache::new("taskwave-dynamic-v1");

        cache.put("https://taskwave.local/a.css", entry("https://taskwave.local/a.css"));

        assert!(cache.match_request("https://taskwave.local/a.css").is_some());
        assert!(cache.match_request("https://taskwave.local/b.css").is_none());
    }

    #[test]
    fn test_keys_in_insertion_order() {
        let mut cache = Cache::new("test");
        cache.put("/a", entry("/a"));
        cache.put("/b", entry("/b"));
        cache.put("/c", entry("/c"));

        assert_eq!(cache.keys(), vec!["/a", "/b", "/c"]);
        assert_eq!(cache.oldest_key(), Some("/a"));
    }

    #[test]
    fn test_replace_keeps_slot() {
        let mut cache = Cache::new("test");
        cache.put("/a", entry("/a"));
        cache.put("/b", entry("/b"));
        cache.put("/a", entry("/a"));

        assert_eq!(cache.keys(), vec!["/a", "/b"]);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_delete() {
        let mut cache = Cache::new("test");
        cache.put("/a", entry("/a"));

        assert!(cache.delete("/a"));
        assert!(!cache.delete("/a"));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_storage_open_and_delete() {
        let mut storage = CacheStorage::new();

        assert!(!storage.has("v1"));
        storage.open("v1");
        assert!(storage.has("v1"));

        assert!(storage.delete("v1"));
        assert!(!storage.has("v1"));
        assert!(storage.keys().is_empty());
    }

    #[test]
    fn test_storage_match_in_creation_order() {
        let mut storage = CacheStorage::new();
        let mut shell_entry = entry("/page");
        shell_entry.body = b"shell".to_vec();
        storage.open("shell").put("/page", shell_entry);

        let mut dynamic_entry = entry("/page");
        dynamic_entry.body = b"dynamic".to_vec();
        storage.open("dynamic").put("/page", dynamic_entry);

        // First generation opened wins the cross-cache match.
        let hit = storage.match_request("/page").unwrap();
        assert_eq!(hit.body, b"shell");
    }

    #[test]
    fn test_storage_keys_in_creation_order() {
        let mut storage = CacheStorage::new();
        storage.open("b");
        storage.open("a");
        assert_eq!(storage.keys(), vec!["b", "a"]);
    }
}
