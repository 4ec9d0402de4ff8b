//! In-memory storage implementations for tests and dry runs.
//!
//! `MemoryRasterStore` uses `RwLock::unwrap()` intentionally. Lock poisoning
//! only occurs when another thread panicked while holding the lock, which is
//! an unrecoverable state. For durable runs, use the file-backed stores.

use damshed_core::error::{DamshedError, Result};
use damshed_core::models::{DamId, Raster, StatisticsRecord, TrackedVariables};
use damshed_core::ports::{RasterStore, ResultsStore};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, RwLock};

/// In-memory implementation of RasterStore
#[derive(Debug, Clone, Default)]
pub struct MemoryRasterStore {
    rasters: Arc<RwLock<HashMap<String, Raster>>>,
}

impl MemoryRasterStore {
    /// Create a new in-memory raster store
    pub fn new() -> Self {
        Self::default()
    }
}

impl RasterStore for MemoryRasterStore {
    fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.rasters.read().unwrap().contains_key(key))
    }

    fn load(&self, key: &str) -> Result<Option<Raster>> {
        Ok(self.rasters.read().unwrap().get(key).cloned())
    }

    fn create(&self, key: &str, raster: &Raster) -> Result<()> {
        let mut rasters = self.rasters.write().unwrap();
        if rasters.contains_key(key) {
            return Err(DamshedError::AlreadyExists { key: key.to_string() });
        }
        rasters.insert(key.to_string(), raster.clone());
        Ok(())
    }

    fn replace(&self, key: &str, raster: &Raster) -> Result<()> {
        self.rasters.write().unwrap().insert(key.to_string(), raster.clone());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool> {
        Ok(self.rasters.write().unwrap().remove(key).is_some())
    }

    fn keys(&self) -> Result<Vec<String>> {
        let mut keys: Vec<String> = self.rasters.read().unwrap().keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }
}

/// In-memory implementation of ResultsStore
#[derive(Debug, Clone)]
pub struct MemoryResultsStore {
    variables: TrackedVariables,
    records: BTreeMap<DamId, StatisticsRecord>,
    written: HashSet<DamId>,
}

impl MemoryResultsStore {
    pub fn new(variables: TrackedVariables) -> Self {
        Self { variables, records: BTreeMap::new(), written: HashSet::new() }
    }

    /// Store pre-populated with records from an earlier session
    pub fn with_records<I>(variables: TrackedVariables, records: I) -> Result<Self>
    where
        I: IntoIterator<Item = (DamId, Vec<f64>)>,
    {
        let mut store = Self::new(variables);
        for (dam_id, values) in records {
            let record = StatisticsRecord::from_values(dam_id.as_str(), values, &store.variables)?;
            store.records.insert(dam_id, record);
        }
        Ok(store)
    }
}

impl ResultsStore for MemoryResultsStore {
    fn variables(&self) -> &TrackedVariables {
        &self.variables
    }

    fn insert(&mut self, dam_id: &DamId, record: StatisticsRecord) -> Result<()> {
        if record.len() != self.variables.record_len() {
            return Err(DamshedError::ShapeMismatch {
                dam_id: dam_id.to_string(),
                expected: self.variables.record_len(),
                actual: record.len(),
            });
        }
        if !self.written.insert(dam_id.clone()) {
            return Err(DamshedError::DuplicateKey { dam_id: dam_id.to_string() });
        }
        self.records.insert(dam_id.clone(), record);
        Ok(())
    }

    fn invalidate(&mut self, dam_id: &DamId) -> Result<bool> {
        self.written.remove(dam_id);
        Ok(self.records.remove(dam_id).is_some())
    }

    fn get(&self, dam_id: &DamId) -> Option<&StatisticsRecord> {
        self.records.get(dam_id)
    }

    fn ids(&self) -> Vec<DamId> {
        self.records.keys().cloned().collect()
    }

    fn len(&self) -> usize {
        self.records.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use damshed_core::models::{GridAlignment, GridWindow};

    fn raster(value: f64) -> Raster {
        let grid = GridAlignment::new(0.0, 10.0, 1.0).unwrap();
        Raster::filled(grid, GridWindow::new(0, 0, 1, 1), value)
    }

    fn variables() -> TrackedVariables {
        TrackedVariables::new(["RC1_O3", "RC1_O5"]).unwrap()
    }

    #[test]
    fn test_create_never_overwrites() {
        let store = MemoryRasterStore::new();
        store.create("12", &raster(1.0)).unwrap();

        assert!(matches!(
            store.create("12", &raster(2.0)),
            Err(DamshedError::AlreadyExists { .. })
        ));
        assert_eq!(store.load("12").unwrap(), Some(raster(1.0)));
    }

    #[test]
    fn test_replace_and_remove() {
        let store = MemoryRasterStore::new();
        store.create("12", &raster(1.0)).unwrap();
        store.replace("12", &raster(2.0)).unwrap();
        store.replace("3", &raster(3.0)).unwrap();

        assert_eq!(store.load("12").unwrap(), Some(raster(2.0)));
        assert_eq!(store.keys().unwrap(), vec!["12".to_string(), "3".to_string()]);
        assert!(store.remove("12").unwrap());
        assert!(!store.remove("12").unwrap());
        assert!(!store.exists("12").unwrap());
    }

    #[test]
    fn test_results_insert_once_per_session() {
        let mut store = MemoryResultsStore::new(variables());
        let id = DamId::new("7");

        store.insert(&id, StatisticsRecord::new(vec![1.0, 2.0], 30.0)).unwrap();
        assert!(matches!(
            store.insert(&id, StatisticsRecord::new(vec![1.0, 2.0], 31.0)),
            Err(DamshedError::DuplicateKey { .. })
        ));
        assert_eq!(store.get(&id).and_then(|r| r.area()), Some(30.0));
    }

    #[test]
    fn test_results_reject_wrong_shape() {
        let mut store = MemoryResultsStore::new(variables());
        assert!(matches!(
            store.insert(&DamId::new("7"), StatisticsRecord::new(vec![1.0], 30.0)),
            Err(DamshedError::ShapeMismatch { expected: 3, actual: 2, .. })
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn test_invalidated_record_can_be_rewritten() {
        let mut store = MemoryResultsStore::new(variables());
        let id = DamId::new("7");
        store.insert(&id, StatisticsRecord::new(vec![1.0, 2.0], 30.0)).unwrap();

        assert!(store.invalidate(&id).unwrap());
        assert!(!store.contains(&id));
        assert!(!store.invalidate(&id).unwrap());

        store.insert(&id, StatisticsRecord::new(vec![1.0, 2.0], 12.0)).unwrap();
        assert_eq!(store.get(&id).and_then(|r| r.area()), Some(12.0));
    }

    #[test]
    fn test_earlier_records_can_be_superseded() {
        let mut store =
            MemoryResultsStore::with_records(variables(), [(DamId::new("7"), vec![1.0, 2.0, 3.0])])
                .unwrap();
        assert!(store.contains(&DamId::new("7")));

        store.insert(&DamId::new("7"), StatisticsRecord::new(vec![4.0, 5.0], 6.0)).unwrap();
        assert_eq!(store.get(&DamId::new("7")).unwrap().values(), &[4.0, 5.0, 6.0]);
        assert_eq!(store.ids(), vec![DamId::new("7")]);
    }
}
