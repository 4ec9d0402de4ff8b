use crate::error::Result;
use crate::models::{DamId, Raster, StatisticsRecord, TrackedVariables};

/// Port for keyed raster storage (pour points, catchments, variable grids).
///
/// A key holds at most one raster. `create` never overwrites; callers that
/// mean to recompute must go through `replace`.
pub trait RasterStore {
    /// Check whether a raster exists for the key
    fn exists(&self, key: &str) -> Result<bool>;

    /// Load the raster stored under the key
    fn load(&self, key: &str) -> Result<Option<Raster>>;

    /// Store a raster under a new key; fails with `AlreadyExists` otherwise
    fn create(&self, key: &str, raster: &Raster) -> Result<()>;

    /// Remove any existing raster for the key, then store the new one
    fn replace(&self, key: &str, raster: &Raster) -> Result<()>;

    /// Remove the raster for the key, returning whether one existed
    fn remove(&self, key: &str) -> Result<bool>;

    /// List all keys, sorted
    fn keys(&self) -> Result<Vec<String>>;
}

/// Port for the per-dam statistics store
pub trait ResultsStore {
    /// Variables the stored records are laid out for
    fn variables(&self) -> &TrackedVariables;

    /// Append a record; each dam can be written once per store session
    fn insert(&mut self, dam_id: &DamId, record: StatisticsRecord) -> Result<()>;

    /// Mark a dam's record stale so a resumed aggregation recomputes it.
    ///
    /// Returns whether a record existed.
    fn invalidate(&mut self, dam_id: &DamId) -> Result<bool>;

    /// Latest record for a dam
    fn get(&self, dam_id: &DamId) -> Option<&StatisticsRecord>;

    fn contains(&self, dam_id: &DamId) -> bool {
        self.get(dam_id).is_some()
    }

    /// All dam identifiers with a record, sorted
    fn ids(&self) -> Vec<DamId>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
