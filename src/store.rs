//! The generated-data store: step outputs keyed by contract output key.
//!
//! Last write wins. Nothing is ever deleted except by a full workflow
//! reset, so downstream steps can always re-read upstream outputs.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DataStore {
    values: HashMap<String, Value>,
}

impl DataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn get_cloned(&self, key: &str) -> Option<Value> {
        self.values.get(key).cloned()
    }

    /// Read a nested field of a stored value.
    pub fn get_path(&self, key: &str, path: &str) -> Option<&Value> {
        self.values.get(key).and_then(|v| v.get(path))
    }

    pub fn insert(&mut self, key: &str, value: Value) {
        self.values.insert(key.to_string(), value);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Full reset. The only way data leaves the store.
    pub fn clear(&mut self) {
        self.values.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn read_after_write_is_immediate() {
        let mut store = DataStore::new();
        store.insert("scrapeResult", json!({"pages": [1, 2, 3]}));
        assert_eq!(store.get("scrapeResult").unwrap()["pages"][0], 1);
    }

    #[test]
    fn last_write_wins() {
        let mut store = DataStore::new();
        store.insert("themeResult", json!({"v": 1}));
        store.insert("themeResult", json!({"v": 2}));
        assert_eq!(store.get("themeResult").unwrap()["v"], 2);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn get_path_reads_nested_fields() {
        let mut store = DataStore::new();
        store.insert("scrapeResult", json!({"designSystem": {"primary": "#000"}}));
        assert_eq!(
            store.get_path("scrapeResult", "designSystem").unwrap()["primary"],
            "#000"
        );
        assert!(store.get_path("scrapeResult", "missing").is_none());
    }

    #[test]
    fn clear_is_the_only_deletion() {
        let mut store = DataStore::new();
        store.insert("a", json!(1));
        store.insert("b", json!(2));
        store.clear();
        assert!(store.is_empty());
    }
}
