//! Latest-state projection: one record per vehicle id.

use std::collections::HashMap;

use crate::record::VehicleUpdate;

/// Maps vehicle id to the most recently *arrived* record for that id.
///
/// Arrival order wins over embedded timestamps. Keys are only removed by
/// [`VehicleCache::reset`].
#[derive(Debug, Default, Clone)]
pub struct VehicleCache {
    entries: HashMap<String, VehicleUpdate>,
}

impl VehicleCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `update` under its id, returning the record it replaced.
    pub fn fold(&mut self, update: VehicleUpdate) -> Option<VehicleUpdate> {
        self.entries.insert(update.id.clone(), update)
    }

    pub fn reset(&mut self) {
        self.entries.clear();
    }

    pub fn get(&self, id: &str) -> Option<&VehicleUpdate> {
        self.entries.get(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Owned copy of the current world state.
    pub fn snapshot(&self) -> Vec<VehicleUpdate> {
        self.entries.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(id: &str, source_timestamp: f64, lat: f64) -> VehicleUpdate {
        VehicleUpdate {
            id: id.to_string(),
            trip_id: String::new(),
            route_id: String::new(),
            latitude: lat,
            longitude: -111.9,
            vehicle_timestamp: source_timestamp as i64,
            source_timestamp,
            speed_mph: None,
        }
    }

    #[test]
    fn test_fold_keeps_one_entry_per_id() {
        let mut cache = VehicleCache::new();
        for update in [
            update("a", 1.0, 40.0),
            update("b", 1.0, 40.1),
            update("a", 2.0, 40.2),
        ] {
            cache.fold(update);
        }

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("a").unwrap().latitude, 40.2);
    }

    #[test]
    fn test_last_arrival_wins_over_newer_timestamp() {
        let mut cache = VehicleCache::new();
        cache.fold(update("a", 200.0, 41.0));
        let replaced = cache.fold(update("a", 100.0, 40.0));

        assert_eq!(replaced.unwrap().source_timestamp, 200.0);
        assert_eq!(cache.get("a").unwrap().source_timestamp, 100.0);
    }

    #[test]
    fn test_reset_empties_cache() {
        let mut cache = VehicleCache::new();
        cache.fold(update("a", 1.0, 40.0));
        assert!(!cache.is_empty());

        cache.reset();
        assert!(cache.is_empty());
        assert!(cache.snapshot().is_empty());
    }
}
