//! Time-to-live cache for weather lookups.
//!
//! Weather changes slowly relative to how often predictions are refreshed,
//! so lookups are served from memory until the entry is older than the TTL.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Cache key for one provider query, with coordinates snapped to ~100 m.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WeatherKey {
    pub provider: String,
    lat_milli: i64,
    lon_milli: i64,
    /// `0` for current conditions, otherwise forecast length in hours.
    pub hours: u32,
}

impl WeatherKey {
    pub fn new(provider: &str, latitude: f64, longitude: f64, hours: u32) -> Self {
        Self {
            provider: provider.to_string(),
            lat_milli: (latitude * 1000.0).round() as i64,
            lon_milli: (longitude * 1000.0).round() as i64,
            hours,
        }
    }
}

/// Concurrent map whose entries expire `ttl` after insertion.
pub struct TtlCache<K, V> {
    ttl: Duration,
    entries: RwLock<HashMap<K, (Instant, V)>>,
}

impl<K: Eq + Hash, V: Clone> TtlCache<K, V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns a clone of the value if present and still fresh.
    pub async fn get(&self, key: &K) -> Option<V> {
        let entries = self.entries.read().await;
        entries
            .get(key)
            .filter(|(inserted, _)| inserted.elapsed() < self.ttl)
            .map(|(_, v)| v.clone())
    }

    pub async fn insert(&self, key: K, value: V) {
        self.entries
            .write()
            .await
            .insert(key, (Instant::now(), value));
    }

    /// Drops stale entries; returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        let ttl = self.ttl;
        entries.retain(|_, (inserted, _)| inserted.elapsed() < ttl);
        before - entries.len()
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_snaps_nearby_coordinates() {
        let a = WeatherKey::new("static", 47.60621, -122.33207, 24);
        let b = WeatherKey::new("static", 47.60640, -122.33190, 24);
        assert_eq!(a, b);
        assert_ne!(a, WeatherKey::new("static", 47.60621, -122.33207, 0));
        assert_ne!(a, WeatherKey::new("open-meteo", 47.60621, -122.33207, 24));
    }

    #[tokio::test]
    async fn fresh_entries_hit() {
        let cache = TtlCache::new(Duration::from_secs(60));
        cache.insert("k", 7).await;
        assert_eq!(cache.get(&"k").await, Some(7));
        assert_eq!(cache.get(&"missing").await, None);
    }

    #[tokio::test]
    async fn zero_ttl_always_misses_and_purges() {
        let cache = TtlCache::new(Duration::ZERO);
        cache.insert("k", 7).await;
        assert_eq!(cache.get(&"k").await, None);
        assert_eq!(cache.len().await, 1);
        assert_eq!(cache.purge_expired().await, 1);
        assert!(cache.is_empty().await);
    }
}
