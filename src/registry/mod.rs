//! Ordered sensor list: the fixed catalog followed by operator-added streams.
//!
//! Custom entries live in the key-value store under [`CUSTOM_STREAMS_KEY`] as
//! a JSON array. Every mutation re-reads that array first, writes the merged
//! result, and only then updates the in-memory list, so two processes sharing
//! one storage file do not drop each other's additions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::RegistryError;

pub mod catalog;
pub mod storage;

pub use catalog::fixed_catalog;
pub use storage::{FileStore, KeyValueStore, MemoryStore};

/// Id prefix of deletable, operator-added entries
pub const CUSTOM_PREFIX: &str = "custom_";

/// Storage key holding the custom entries
pub const CUSTOM_STREAMS_KEY: &str = "custom_streams";

const CUSTOM_LOCATION: &str = "Custom Stream";
const CUSTOM_MODEL: &str = "Custom";

/// Identity and endpoints of one camera
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorConfig {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub model: String,
    #[serde(alias = "streamUrl")]
    pub stream_uri: String,
    #[serde(alias = "statsUrl")]
    pub stats_uri: String,
}

impl SensorConfig {
    pub fn is_custom(&self) -> bool {
        is_custom_id(&self.id)
    }
}

pub fn is_custom_id(id: &str) -> bool {
    id.starts_with(CUSTOM_PREFIX)
}

/// Derive the telemetry endpoint from a stream endpoint.
///
/// The last path segment equal to `stream` becomes `stats`; without one the
/// final path segment is replaced. Query and fragment are kept.
pub fn derive_stats_uri(stream_uri: &str) -> String {
    let split = stream_uri.find(['?', '#']).unwrap_or(stream_uri.len());
    let (base, suffix) = stream_uri.split_at(split);

    let path_start = match base.find("://") {
        Some(scheme_end) => base[scheme_end + 3..]
            .find('/')
            .map(|i| scheme_end + 3 + i),
        None => Some(0),
    };

    let Some(path_start) = path_start else {
        return format!("{base}/stats{suffix}");
    };

    let (origin, path) = base.split_at(path_start);
    let mut segments: Vec<&str> = path.split('/').collect();
    match segments.iter().rposition(|segment| *segment == "stream") {
        Some(index) => segments[index] = "stats",
        None => {
            if let Some(last) = segments.last_mut() {
                *last = "stats";
            }
        }
    }

    format!("{origin}{}{suffix}", segments.join("/"))
}

pub struct StreamRegistry {
    store: Arc<dyn KeyValueStore>,
    entries: Vec<SensorConfig>,
    catalog_len: usize,
    last_issued_millis: i64,
}

impl StreamRegistry {
    /// Build the registry from the catalog and whatever custom entries decode.
    ///
    /// Never fails: unreadable or malformed storage yields no custom entries.
    pub fn load(store: Arc<dyn KeyValueStore>, catalog: Vec<SensorConfig>) -> Self {
        let catalog_len = catalog.len();
        let mut registry = Self {
            store,
            entries: catalog,
            catalog_len,
            last_issued_millis: 0,
        };
        let custom = registry.read_custom();
        registry.replace_custom(custom);
        registry
    }

    /// Re-read custom entries from storage
    pub fn reload(&mut self) {
        let custom = self.read_custom();
        self.replace_custom(custom);
    }

    pub fn entries(&self) -> &[SensorConfig] {
        &self.entries
    }

    pub fn custom_entries(&self) -> &[SensorConfig] {
        &self.entries[self.catalog_len..]
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&SensorConfig> {
        self.entries.iter().find(|sensor| sensor.id == id)
    }

    pub fn page_count(&self, page_size: usize) -> usize {
        let page_size = page_size.max(1);
        self.entries.len().div_ceil(page_size).max(1)
    }

    /// One page of entries; an out-of-range index yields the last page
    pub fn page(&self, index: usize, page_size: usize) -> &[SensorConfig] {
        let page_size = page_size.max(1);
        let index = index.min(self.page_count(page_size) - 1);
        let start = (index * page_size).min(self.entries.len());
        let end = (start + page_size).min(self.entries.len());
        &self.entries[start..end]
    }

    /// Add a custom stream, stamped with the current time
    pub fn add(&mut self, name: &str, stream_uri: &str) -> Result<SensorConfig, RegistryError> {
        self.add_at(name, stream_uri, Utc::now())
    }

    pub fn add_at(
        &mut self,
        name: &str,
        stream_uri: &str,
        now: DateTime<Utc>,
    ) -> Result<SensorConfig, RegistryError> {
        let name = name.trim();
        let stream_uri = stream_uri.trim();
        if name.is_empty() {
            return Err(RegistryError::Validation("name cannot be empty".to_string()));
        }
        if stream_uri.is_empty() {
            return Err(RegistryError::Validation(
                "stream URL cannot be empty".to_string(),
            ));
        }

        let mut custom = self.read_custom();
        let millis = self.next_id_millis(&custom, now.timestamp_millis());
        let sensor = SensorConfig {
            id: format!("{CUSTOM_PREFIX}{millis}"),
            name: name.to_string(),
            location: CUSTOM_LOCATION.to_string(),
            model: CUSTOM_MODEL.to_string(),
            stream_uri: stream_uri.to_string(),
            stats_uri: derive_stats_uri(stream_uri),
        };
        custom.push(sensor.clone());

        self.write_custom(&custom)?;
        self.last_issued_millis = millis;
        self.replace_custom(custom);

        info!(id = %sensor.id, name = %sensor.name, "Custom stream added");
        Ok(sensor)
    }

    /// Delete a custom stream; fixed-catalog entries cannot be removed
    pub fn remove(&mut self, id: &str) -> Result<SensorConfig, RegistryError> {
        if !is_custom_id(id) {
            return Err(RegistryError::CannotDelete(id.to_string()));
        }

        let mut custom = self.read_custom();
        let Some(position) = custom.iter().position(|sensor| sensor.id == id) else {
            self.replace_custom(custom);
            return Err(RegistryError::NotFound(id.to_string()));
        };
        let removed = custom.remove(position);

        self.write_custom(&custom)?;
        self.replace_custom(custom);

        info!(id = %removed.id, "Custom stream removed");
        Ok(removed)
    }

    fn next_id_millis(&self, custom: &[SensorConfig], now_millis: i64) -> i64 {
        let newest_stored = custom
            .iter()
            .filter_map(|sensor| sensor.id.strip_prefix(CUSTOM_PREFIX))
            .filter_map(|suffix| suffix.parse::<i64>().ok())
            .max()
            .unwrap_or(i64::MIN);

        let mut millis = now_millis
            .max(newest_stored.saturating_add(1))
            .max(self.last_issued_millis.saturating_add(1));
        while custom.iter().any(|s| s.id == format!("{CUSTOM_PREFIX}{millis}")) {
            millis += 1;
        }
        millis
    }

    fn read_custom(&self) -> Vec<SensorConfig> {
        let raw = match self.store.get(CUSTOM_STREAMS_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                warn!(error = %e, "Failed to read custom streams");
                return Vec::new();
            }
        };

        let decoded: Vec<SensorConfig> = match serde_json::from_str(&raw) {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!(error = %e, "Stored custom streams are malformed, ignoring them");
                return Vec::new();
            }
        };

        let mut custom: Vec<SensorConfig> = Vec::with_capacity(decoded.len());
        for sensor in decoded {
            if !sensor.is_custom() {
                warn!(id = %sensor.id, "Dropping stored stream without custom prefix");
            } else if custom.iter().any(|kept| kept.id == sensor.id) {
                warn!(id = %sensor.id, "Dropping duplicate stored stream");
            } else {
                custom.push(sensor);
            }
        }
        custom
    }

    fn write_custom(&self, custom: &[SensorConfig]) -> Result<(), RegistryError> {
        let encoded = serde_json::to_string(custom).map_err(crate::error::StorageError::from)?;
        self.store.set(CUSTOM_STREAMS_KEY, &encoded)?;
        Ok(())
    }

    fn replace_custom(&mut self, custom: Vec<SensorConfig>) {
        self.entries.truncate(self.catalog_len);
        self.entries.extend(custom);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn registry() -> (StreamRegistry, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let registry = StreamRegistry::load(store.clone(), fixed_catalog("http://10.1.40.46"));
        (registry, store)
    }

    fn at(millis: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(millis).unwrap()
    }

    #[test]
    fn test_derive_stats_uri() {
        assert_eq!(derive_stats_uri("http://h/stream"), "http://h/stats");
        assert_eq!(derive_stats_uri("http://h:5000/stream?q=1"), "http://h:5000/stats?q=1");
        assert_eq!(derive_stats_uri("http://h/stream/cam1"), "http://h/stats/cam1");
        assert_eq!(derive_stats_uri("http://h/stream/a/stream"), "http://h/stream/a/stats");
        assert_eq!(derive_stats_uri("http://stream/live"), "http://stream/stats");
        assert_eq!(derive_stats_uri("http://h/video"), "http://h/stats");
        assert_eq!(derive_stats_uri("http://h"), "http://h/stats");
        assert_eq!(derive_stats_uri("/api/stream"), "/api/stats");
    }

    #[test]
    fn test_load_without_storage_is_catalog() {
        let (registry, _) = registry();
        assert_eq!(registry.len(), 4);
        assert!(registry.custom_entries().is_empty());
    }

    #[test]
    fn test_load_ignores_malformed_storage() {
        let store = Arc::new(MemoryStore::new());
        store.set(CUSTOM_STREAMS_KEY, "{broken").unwrap();
        let registry = StreamRegistry::load(store, fixed_catalog("http://h"));
        assert_eq!(registry.len(), 4);
    }

    #[test]
    fn test_load_accepts_legacy_keys_and_drops_bad_entries() {
        let store = Arc::new(MemoryStore::new());
        store
            .set(
                CUSTOM_STREAMS_KEY,
                r#"[
                    {"id":"custom_1","name":"A","location":"x","model":"y","streamUrl":"http://a/stream","statsUrl":"http://a/stats"},
                    {"id":"gate2_exit","name":"Fake","streamUri":"u","statsUri":"v"},
                    {"id":"custom_1","name":"Dup","streamUri":"u","statsUri":"v"}
                ]"#,
            )
            .unwrap();

        let registry = StreamRegistry::load(store, fixed_catalog("http://h"));
        let custom = registry.custom_entries();
        assert_eq!(custom.len(), 1);
        assert_eq!(custom[0].name, "A");
        assert_eq!(custom[0].stream_uri, "http://a/stream");
    }

    #[test]
    fn test_add_derives_stats_and_persists() {
        let (mut registry, store) = registry();
        let sensor = registry.add_at("Cam X", "http://h/stream", at(1_700_000_000_000)).unwrap();

        assert_eq!(sensor.id, "custom_1700000000000");
        assert_eq!(sensor.stats_uri, "http://h/stats");
        assert_eq!(registry.len(), 5);
        assert_eq!(registry.entries().last(), Some(&sensor));

        let stored = store.get(CUSTOM_STREAMS_KEY).unwrap().unwrap();
        assert!(stored.contains("\"statsUri\":\"http://h/stats\""));
    }

    #[test]
    fn test_add_rejects_blank_fields() {
        let (mut registry, store) = registry();

        assert!(matches!(registry.add("", "u"), Err(RegistryError::Validation(_))));
        assert!(matches!(registry.add("Cam", "   "), Err(RegistryError::Validation(_))));
        assert_eq!(registry.len(), 4);
        assert_eq!(store.get(CUSTOM_STREAMS_KEY).unwrap(), None);
    }

    #[test]
    fn test_add_ids_are_monotonic() {
        let (mut registry, _) = registry();
        let first = registry.add_at("A", "http://a/stream", at(1000)).unwrap();
        let second = registry.add_at("B", "http://b/stream", at(1000)).unwrap();
        let third = registry.add_at("C", "http://c/stream", at(500)).unwrap();

        assert_eq!(first.id, "custom_1000");
        assert_eq!(second.id, "custom_1001");
        assert_eq!(third.id, "custom_1002");
    }

    #[test]
    fn test_remove_fixed_entry_fails() {
        let (mut registry, _) = registry();
        let result = registry.remove("gate_02_entry");
        assert!(matches!(result, Err(RegistryError::CannotDelete(_))));
        assert_eq!(registry.len(), 4);
    }

    #[test]
    fn test_remove_unknown_custom_fails() {
        let (mut registry, _) = registry();
        registry.add_at("A", "http://a/stream", at(1)).unwrap();
        let result = registry.remove("custom_999");
        assert!(matches!(result, Err(RegistryError::NotFound(_))));
        assert_eq!(registry.len(), 5);
    }

    #[test]
    fn test_remove_custom_entry() {
        let (mut registry, store) = registry();
        let a = registry.add_at("A", "http://a/stream", at(1)).unwrap();
        let b = registry.add_at("B", "http://b/stream", at(2)).unwrap();

        let removed = registry.remove(&a.id).unwrap();
        assert_eq!(removed, a);
        assert_eq!(registry.custom_entries(), &[b.clone()]);

        let reloaded = StreamRegistry::load(store, fixed_catalog("http://10.1.40.46"));
        assert_eq!(reloaded.custom_entries(), &[b]);
    }

    #[test]
    fn test_page_clamps_to_last_page() {
        let (mut registry, _) = registry();
        registry.add_at("A", "http://a/stream", at(1)).unwrap();
        registry.add_at("B", "http://b/stream", at(2)).unwrap();

        assert_eq!(registry.page_count(4), 2);
        let first: Vec<&str> = registry.page(0, 4).iter().map(|s| s.id.as_str()).collect();
        assert_eq!(first, ["gate_02_entry", "gate1_main_entry", "gate1_outside_left", "gate2_exit"]);

        let last = registry.page(10, 4);
        assert_eq!(last.len(), 2);
        assert_eq!(last[0].name, "A");
    }

    #[test]
    fn test_page_size_zero_is_one() {
        let (registry, _) = registry();
        assert_eq!(registry.page_count(0), 4);
        assert_eq!(registry.page(1, 0)[0].id, "gate1_main_entry");
    }

    #[test]
    fn test_empty_registry_pages() {
        let registry = StreamRegistry::load(Arc::new(MemoryStore::new()), Vec::new());
        assert!(registry.is_empty());
        assert_eq!(registry.page_count(4), 1);
        assert!(registry.page(3, 4).is_empty());
    }

    #[test]
    fn test_mutations_merge_concurrent_writers() {
        let store: Arc<MemoryStore> = Arc::new(MemoryStore::new());
        let mut first = StreamRegistry::load(store.clone(), Vec::new());
        let mut second = StreamRegistry::load(store.clone(), Vec::new());

        let a = first.add_at("A", "http://a/stream", at(10)).unwrap();
        let b = second.add_at("B", "http://b/stream", at(10)).unwrap();

        assert_ne!(a.id, b.id);
        assert_eq!(second.len(), 2);

        first.reload();
        assert_eq!(first.custom_entries(), &[a, b]);
    }
}
