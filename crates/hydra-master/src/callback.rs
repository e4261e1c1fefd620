//! Ephemeral inline-keyboard callback registry.
//!
//! Callback-query payloads are capped at 64 bytes, so the real callback is
//! pinned to the service instance under a short hash. The map does not
//! survive restarts; stale buttons answer with an error.

use dashmap::DashMap;

use hydra_core::mutex::fnv1a_64;

/// Inline-keyboard action: drives list paging and bind/unbind/talk flows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Callback {
    pub category: String,
    pub action: String,
    pub query: String,
    pub page: usize,
    pub data: String,
}

impl Callback {
    pub fn list(category: &str, query: &str) -> Self {
        Self {
            category: category.to_string(),
            action: "list".to_string(),
            query: query.to_string(),
            ..Default::default()
        }
    }
}

#[derive(Default)]
pub struct CallbackMap {
    entries: DashMap<String, Callback>,
}

impl CallbackMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback and return its hash key.
    pub fn put(&self, callback: Callback) -> String {
        let hash = fnv1a_64(format!("{callback:?}").as_bytes()).to_string();
        self.entries.insert(hash.clone(), callback);
        hash
    }

    pub fn get(&self, hash: &str) -> Option<Callback> {
        self.entries.get(hash).map(|entry| entry.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get_round_trips() {
        let map = CallbackMap::new();
        let callback = Callback {
            category: "link".into(),
            action: "bind".into(),
            query: "g".into(),
            page: 2,
            data: "qq;9;g7".into(),
        };
        let hash = map.put(callback.clone());
        assert_eq!(map.get(&hash), Some(callback));
    }

    #[test]
    fn equal_callbacks_share_a_hash() {
        let map = CallbackMap::new();
        let a = map.put(Callback::list("chat", ""));
        let b = map.put(Callback::list("chat", ""));
        assert_eq!(a, b);
    }

    #[test]
    fn unknown_hash_misses() {
        let map = CallbackMap::new();
        assert!(map.get("0").is_none());
    }
}
