use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use relgate_core::{MappingRecord, RelationTuple};
use serde::Deserialize;
use tokio::time::Instant;

use crate::traits::{
    InvalidationMarker, RevocationStore, SnapshotSource, StorageError, StoreContents,
};

/// Seed data loaded once at startup, in TOML:
///
/// ```toml
/// [[mappings]]
/// id = "orders-read"
/// method = "GET"
/// path = "/orders/*"
/// tags = ["orders:read"]
///
/// [[tuples]]
/// tenant = "acme"
/// subject = "alice"
/// tag = "orders:read"
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SeedFile {
    #[serde(default)]
    pub mappings: Vec<MappingRecord>,
    #[serde(default)]
    pub tuples: Vec<RelationTuple>,
}

#[derive(Debug, Clone, Copy)]
struct StoredMarker {
    value: i64,
    expires_at: Instant,
}

#[derive(Debug, Default)]
struct InnerState {
    mappings: BTreeMap<String, MappingRecord>,
    tuples: BTreeSet<RelationTuple>,
    invalidation: Option<u64>,
    markers: HashMap<String, StoredMarker>,
    unavailable: bool,
}

impl InnerState {
    fn check_available(&self) -> Result<(), StorageError> {
        if self.unavailable {
            return Err(StorageError::Unavailable(
                "in-memory store marked unavailable".to_string(),
            ));
        }
        Ok(())
    }
}

/// Process-local store used for development, tests, and single-instance
/// deployments. Marker expiry follows the tokio clock.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<InnerState>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_seed(seed: SeedFile) -> Self {
        let store = Self::new();
        {
            let mut state = store.lock();
            for record in seed.mappings {
                state.mappings.insert(record.id.clone(), record);
            }
            state.tuples.extend(seed.tuples);
        }
        store
    }

    pub fn from_seed_file(path: &Path) -> Result<Self, StorageError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            StorageError::Internal(format!("failed to read seed file {}: {e}", path.display()))
        })?;
        let seed: SeedFile = toml::from_str(&content).map_err(|e| StorageError::Malformed {
            key: path.display().to_string(),
            reason: e.to_string(),
        })?;
        tracing::info!(
            path = %path.display(),
            mappings = seed.mappings.len(),
            tuples = seed.tuples.len(),
            "loaded seed data"
        );
        Ok(Self::from_seed(seed))
    }

    /// Inserts or replaces a mapping by id.
    pub fn put_mapping(&self, record: MappingRecord) {
        self.lock().mappings.insert(record.id.clone(), record);
    }

    pub fn delete_mapping(&self, id: &str) -> bool {
        self.lock().mappings.remove(id).is_some()
    }

    pub fn add_tuple(&self, tuple: RelationTuple) -> bool {
        self.lock().tuples.insert(tuple)
    }

    pub fn remove_tuple(&self, tuple: &RelationTuple) -> bool {
        self.lock().tuples.remove(tuple)
    }

    /// Simulates a store outage: every trait call fails until cleared.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock().unavailable = unavailable;
    }

    fn lock(&self) -> MutexGuard<'_, InnerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SnapshotSource for InMemoryStore {
    async fn load(&self) -> Result<StoreContents, StorageError> {
        let state = self.lock();
        state.check_available()?;
        Ok(StoreContents {
            mappings: state.mappings.values().cloned().collect(),
            tuples: state.tuples.iter().cloned().collect(),
        })
    }
}

impl InvalidationMarker for InMemoryStore {
    async fn read_marker(&self) -> Result<Option<u64>, StorageError> {
        let state = self.lock();
        state.check_available()?;
        Ok(state.invalidation)
    }

    async fn bump_marker(&self) -> Result<u64, StorageError> {
        let mut state = self.lock();
        state.check_available()?;
        let next = state.invalidation.unwrap_or(0) + 1;
        state.invalidation = Some(next);
        Ok(next)
    }
}

impl RevocationStore for InMemoryStore {
    async fn put_marker(&self, key: &str, value: i64, ttl: Duration) -> Result<(), StorageError> {
        let mut state = self.lock();
        state.check_available()?;
        let now = Instant::now();
        state.markers.retain(|_, marker| marker.expires_at > now);
        state.markers.insert(
            key.to_string(),
            StoredMarker {
                value,
                expires_at: now + ttl,
            },
        );
        Ok(())
    }

    async fn get_marker(&self, key: &str) -> Result<Option<i64>, StorageError> {
        let mut state = self.lock();
        state.check_available()?;
        let now = Instant::now();
        match state.markers.get(key) {
            Some(marker) if marker.expires_at > now => Ok(Some(marker.value)),
            Some(_) => {
                state.markers.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn delete_marker(&self, key: &str) -> Result<bool, StorageError> {
        let mut state = self.lock();
        state.check_available()?;
        let now = Instant::now();
        Ok(state
            .markers
            .remove(key)
            .is_some_and(|marker| marker.expires_at > now))
    }
}
