use crate::error::{DaladalaError, Result};
use crate::models::GeocodeResult;
use crate::store::KeyValueStore;

/// Typed view over a [`KeyValueStore`] holding JSON `{lat, lon}` values.
///
/// Entries never expire. A value that no longer parses is reported as a miss
/// so the next resolution simply overwrites it.
#[derive(Debug, Clone)]
pub struct GeocodeCache<S> {
    store: S,
}

impl<S: KeyValueStore> GeocodeCache<S> {
    pub fn new(store: S) -> Self {
        GeocodeCache { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn get(&self, key: &str) -> Option<GeocodeResult> {
        let raw = self.store.get(key)?;
        match serde_json::from_str::<GeocodeResult>(&raw) {
            Ok(result) if result.lat.is_finite() && result.lon.is_finite() => Some(result),
            Ok(_) => {
                log::debug!("ignoring non-finite cached coordinate for '{}'", key);
                None
            }
            Err(e) => {
                log::debug!("ignoring malformed cache entry for '{}': {}", key, e);
                None
            }
        }
    }

    pub fn put(&self, key: &str, value: &GeocodeResult) -> Result<()> {
        let json = serde_json::to_string(value)
            .map_err(|e| {
                DaladalaError::ParseError(format!("Failed to serialize coordinate: {}", e))
            })?;
        self.store.set(key, &json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{JsonFileStore, MemoryStore};

    #[test]
    fn test_put_then_get_round_trip() {
        let cache = GeocodeCache::new(MemoryStore::new());
        let value = GeocodeResult { lat: -6.8161, lon: 39.2803 };
        cache.put("geocode:Posta, Dar es Salaam, Tanzania", &value).unwrap();
        assert_eq!(cache.get("geocode:Posta, Dar es Salaam, Tanzania"), Some(value));
    }

    #[test]
    fn test_missing_key_is_absent() {
        let cache = GeocodeCache::new(MemoryStore::new());
        assert_eq!(cache.get("geocode:nowhere"), None);
    }

    #[test]
    fn test_malformed_value_is_a_miss() {
        let store = MemoryStore::new();
        store.set("geocode:Mwenge", "{not json").unwrap();
        store.set("geocode:Ubungo", "{\"lat\":\"x\"}").unwrap();
        let cache = GeocodeCache::new(store);
        assert_eq!(cache.get("geocode:Mwenge"), None);
        assert_eq!(cache.get("geocode:Ubungo"), None);

        // self-heals on the next write
        let value = GeocodeResult { lat: -6.77, lon: 39.22 };
        cache.put("geocode:Mwenge", &value).unwrap();
        assert_eq!(cache.get("geocode:Mwenge"), Some(value));
    }

    #[test]
    fn test_entries_outlive_the_store_handle() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        let value = GeocodeResult { lat: -6.7735, lon: 39.2695 };

        GeocodeCache::new(JsonFileStore::open(&path))
            .put("geocode:Mwenge, Dar es Salaam, Tanzania", &value)
            .unwrap();

        let cache = GeocodeCache::new(JsonFileStore::open(&path));
        assert_eq!(cache.get("geocode:Mwenge, Dar es Salaam, Tanzania"), Some(value));
    }
}
