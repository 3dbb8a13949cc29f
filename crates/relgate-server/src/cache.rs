use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use relgate_core::{CacheSnapshot, SnapshotError, SnapshotVersion};
use relgate_storage::{InvalidationMarker, SnapshotSource, StorageError};
use serde::Serialize;
use tokio::sync::Notify;

use crate::audit;
use crate::metrics::Metrics;

#[derive(Debug, thiserror::Error)]
pub enum ReloadError {
    #[error("store error: {0}")]
    Storage(#[from] StorageError),

    #[error("invalid snapshot data: {0}")]
    Snapshot(#[from] SnapshotError),
}

/// Holds the published snapshot. Readers clone the `Arc` and never wait on a
/// reload; publishing is a pointer swap.
#[derive(Debug)]
pub struct SnapshotStore {
    current: RwLock<Arc<CacheSnapshot>>,
}

impl SnapshotStore {
    pub fn new(initial: CacheSnapshot) -> Self {
        Self {
            current: RwLock::new(Arc::new(initial)),
        }
    }

    pub fn current(&self) -> Arc<CacheSnapshot> {
        let guard = self.current.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&*guard)
    }

    pub fn publish(&self, snapshot: CacheSnapshot) -> Arc<CacheSnapshot> {
        let snapshot = Arc::new(snapshot);
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        *guard = Arc::clone(&snapshot);
        snapshot
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStatus {
    pub version: u64,
    pub mapping_count: usize,
    pub tuple_count: usize,
    pub observed_marker: Option<u64>,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Unchanged,
    Reloaded(SnapshotVersion),
}

#[derive(Debug, Default)]
struct CoordinatorState {
    observed_marker: Option<u64>,
    last_error: Option<String>,
}

/// Watches the shared invalidation marker and republishes the snapshot
/// whenever it moves.
///
/// A marker value is acknowledged only after its reload succeeds, so a
/// failed reload is retried on the next tick while the prior snapshot keeps
/// serving. Polls are serialized; signals that arrive during a reload are
/// satisfied by it.
pub struct CacheCoordinator<S> {
    source: Arc<S>,
    snapshots: Arc<SnapshotStore>,
    metrics: Arc<Metrics>,
    poll_interval: Duration,
    timeout: Duration,
    state: Mutex<CoordinatorState>,
    poll_lock: tokio::sync::Mutex<()>,
    nudge: Notify,
}

impl<S: SnapshotSource + InvalidationMarker> CacheCoordinator<S> {
    /// Builds the first snapshot. Any failure here is fatal to startup.
    pub async fn initialize(
        source: Arc<S>,
        metrics: Arc<Metrics>,
        poll_interval: Duration,
        timeout: Duration,
    ) -> Result<Self, ReloadError> {
        let marker = bounded(timeout, source.read_marker()).await?;
        let snapshot = load_snapshot(source.as_ref(), SnapshotVersion::new(1), timeout).await?;
        tracing::info!(
            version = %snapshot.version(),
            mappings = snapshot.mapping_count(),
            tuples = snapshot.tuple_count(),
            "initial snapshot loaded"
        );
        metrics.record_snapshot_reload(snapshot.version().value());

        Ok(Self {
            source,
            snapshots: Arc::new(SnapshotStore::new(snapshot)),
            metrics,
            poll_interval,
            timeout,
            state: Mutex::new(CoordinatorState {
                observed_marker: marker,
                last_error: None,
            }),
            poll_lock: tokio::sync::Mutex::new(()),
            nudge: Notify::new(),
        })
    }

    pub fn snapshots(&self) -> Arc<SnapshotStore> {
        Arc::clone(&self.snapshots)
    }

    pub fn status(&self) -> CacheStatus {
        let snapshot = self.snapshots.current();
        let state = self.lock_state();
        CacheStatus {
            version: snapshot.version().value(),
            mapping_count: snapshot.mapping_count(),
            tuple_count: snapshot.tuple_count(),
            observed_marker: state.observed_marker,
            last_error: state.last_error.clone(),
        }
    }

    /// Reads the marker once and reloads if it differs from the last value
    /// this instance acted on.
    pub async fn poll_once(&self) -> Result<PollOutcome, ReloadError> {
        let _serialized = self.poll_lock.lock().await;

        let marker = match bounded(self.timeout, self.source.read_marker()).await {
            Ok(marker) => marker,
            Err(e) => return Err(self.record_failure(e.into())),
        };
        let observed = self.lock_state().observed_marker;
        if marker == observed {
            return Ok(PollOutcome::Unchanged);
        }

        let next = self.snapshots.current().version().next();
        match load_snapshot(self.source.as_ref(), next, self.timeout).await {
            Ok(snapshot) => {
                let published = self.snapshots.publish(snapshot);
                {
                    let mut state = self.lock_state();
                    state.observed_marker = marker;
                    state.last_error = None;
                }
                self.metrics.record_snapshot_reload(published.version().value());
                tracing::info!(
                    version = %published.version(),
                    marker = ?marker,
                    mappings = published.mapping_count(),
                    tuples = published.tuple_count(),
                    "snapshot reloaded"
                );
                Ok(PollOutcome::Reloaded(published.version()))
            }
            Err(e) => Err(self.record_failure(e)),
        }
    }

    /// Administrative trigger: bumps the fleet-wide marker and wakes this
    /// instance's loop so it reloads without waiting for the next tick.
    pub async fn trigger_refresh(&self) -> Result<u64, ReloadError> {
        let marker = bounded(self.timeout, self.source.bump_marker()).await?;
        audit::audit_cache_refresh(marker);
        self.nudge.notify_one();
        Ok(marker)
    }

    /// Runs until `shutdown` resolves. Failures are logged and retried on the
    /// next tick; callers keep reading the last good snapshot.
    pub async fn run(&self, shutdown: impl std::future::Future<Output = ()>) {
        tokio::pin!(shutdown);
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::debug!("cache coordinator stopping");
                    return;
                }
                _ = ticker.tick() => {}
                _ = self.nudge.notified() => {}
            }

            // Errors were already logged and recorded by poll_once.
            let _ = self.poll_once().await;
        }
    }

    fn record_failure(&self, err: ReloadError) -> ReloadError {
        self.metrics.record_snapshot_reload_failure();
        tracing::warn!(
            error = %err,
            version = %self.snapshots.current().version(),
            "snapshot reload failed; serving previous snapshot"
        );
        self.lock_state().last_error = Some(err.to_string());
        err
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, CoordinatorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

async fn load_snapshot<S: SnapshotSource>(
    source: &S,
    version: SnapshotVersion,
    timeout: Duration,
) -> Result<CacheSnapshot, ReloadError> {
    let contents = bounded(timeout, source.load()).await?;
    Ok(CacheSnapshot::build(
        version,
        contents.mappings,
        contents.tuples,
    )?)
}

async fn bounded<T>(
    timeout: Duration,
    call: impl std::future::Future<Output = Result<T, StorageError>>,
) -> Result<T, StorageError> {
    tokio::time::timeout(timeout, call)
        .await
        .map_err(|_| StorageError::Timeout(timeout))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use relgate_core::{MappingRecord, RelationTuple};
    use relgate_storage::InMemoryStore;

    fn record(id: &str, path: &str) -> MappingRecord {
        MappingRecord {
            id: id.to_string(),
            method: "GET".to_string(),
            path: path.to_string(),
            tags: vec!["read".to_string()],
            tenant: None,
            specificity: 0,
        }
    }

    async fn coordinator(store: &InMemoryStore) -> CacheCoordinator<InMemoryStore> {
        CacheCoordinator::initialize(
            Arc::new(store.clone()),
            Arc::new(Metrics::new()),
            Duration::from_millis(100),
            Duration::from_millis(200),
        )
        .await
        .unwrap()
    }

    // --- SnapshotStore ---

    #[test]
    fn publish_replaces_current_without_touching_held_readers() {
        let store = SnapshotStore::new(CacheSnapshot::empty(SnapshotVersion::new(1)));
        let held = store.current();

        store.publish(CacheSnapshot::empty(SnapshotVersion::new(2)));

        assert_eq!(held.version(), SnapshotVersion::new(1));
        assert_eq!(store.current().version(), SnapshotVersion::new(2));
    }

    // --- initialize ---

    #[tokio::test]
    async fn initialize_loads_store_contents() {
        let store = InMemoryStore::new();
        store.put_mapping(record("m1", "/a"));
        store.add_tuple(RelationTuple::new("acme", "alice", "read"));

        let coord = coordinator(&store).await;
        let status = coord.status();

        assert_eq!(status.version, 1);
        assert_eq!(status.mapping_count, 1);
        assert_eq!(status.tuple_count, 1);
        assert_eq!(status.observed_marker, None);
    }

    #[tokio::test]
    async fn initialize_fails_when_store_unavailable() {
        let store = InMemoryStore::new();
        store.set_unavailable(true);

        let result = CacheCoordinator::initialize(
            Arc::new(store),
            Arc::new(Metrics::new()),
            Duration::from_millis(100),
            Duration::from_millis(200),
        )
        .await;

        assert!(matches!(result, Err(ReloadError::Storage(_))));
    }

    #[tokio::test]
    async fn initialize_fails_on_invalid_pattern() {
        let store = InMemoryStore::new();
        store.put_mapping(record("bad", "~(unclosed"));

        let result = CacheCoordinator::initialize(
            Arc::new(store),
            Arc::new(Metrics::new()),
            Duration::from_millis(100),
            Duration::from_millis(200),
        )
        .await;

        assert!(matches!(result, Err(ReloadError::Snapshot(_))));
    }

    // --- poll_once ---

    #[tokio::test]
    async fn unchanged_marker_does_not_reload() {
        let store = InMemoryStore::new();
        let coord = coordinator(&store).await;
        store.put_mapping(record("m1", "/a"));

        assert_eq!(coord.poll_once().await.unwrap(), PollOutcome::Unchanged);
        assert_eq!(coord.status().mapping_count, 0);
    }

    #[tokio::test]
    async fn marker_change_reloads_with_next_version() {
        let store = InMemoryStore::new();
        let coord = coordinator(&store).await;
        store.put_mapping(record("m1", "/a"));
        store.bump_marker().await.unwrap();

        let outcome = coord.poll_once().await.unwrap();

        assert_eq!(outcome, PollOutcome::Reloaded(SnapshotVersion::new(2)));
        let status = coord.status();
        assert_eq!(status.mapping_count, 1);
        assert_eq!(status.observed_marker, Some(1));
    }

    #[tokio::test]
    async fn several_bumps_collapse_into_one_reload() {
        let store = InMemoryStore::new();
        let coord = coordinator(&store).await;
        store.bump_marker().await.unwrap();
        store.bump_marker().await.unwrap();
        store.bump_marker().await.unwrap();

        assert!(matches!(coord.poll_once().await.unwrap(), PollOutcome::Reloaded(_)));
        assert_eq!(coord.poll_once().await.unwrap(), PollOutcome::Unchanged);
        assert_eq!(coord.status().version, 2);
    }

    #[tokio::test]
    async fn failed_reload_keeps_previous_snapshot_and_retries() {
        let store = InMemoryStore::new();
        store.put_mapping(record("m1", "/a"));
        let coord = coordinator(&store).await;

        store.put_mapping(record("m2", "~(broken"));
        store.bump_marker().await.unwrap();
        assert!(coord.poll_once().await.is_err());

        let status = coord.status();
        assert_eq!(status.version, 1);
        assert_eq!(status.mapping_count, 1);
        assert_eq!(status.observed_marker, None);
        assert!(status.last_error.is_some());

        store.delete_mapping("m2");
        assert!(matches!(coord.poll_once().await.unwrap(), PollOutcome::Reloaded(_)));
        assert!(coord.status().last_error.is_none());
    }

    #[tokio::test]
    async fn store_outage_during_poll_serves_stale() {
        let store = InMemoryStore::new();
        store.put_mapping(record("m1", "/a"));
        let coord = coordinator(&store).await;

        store.set_unavailable(true);
        assert!(coord.poll_once().await.is_err());
        assert_eq!(coord.snapshots().current().mapping_count(), 1);
    }

    // --- run / trigger_refresh ---

    #[tokio::test(start_paused = true)]
    async fn loop_picks_up_marker_within_poll_interval() {
        let store = InMemoryStore::new();
        let coord = Arc::new(coordinator(&store).await);
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let runner = {
            let coord = Arc::clone(&coord);
            tokio::spawn(async move {
                coord
                    .run(async {
                        let _ = stop_rx.await;
                    })
                    .await
            })
        };

        store.put_mapping(record("m1", "/a"));
        store.bump_marker().await.unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert_eq!(coord.status().version, 2);
        assert_eq!(coord.status().mapping_count, 1);

        stop_tx.send(()).unwrap();
        runner.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn trigger_refresh_bumps_marker_and_nudges_loop() {
        let store = InMemoryStore::new();
        let coord = Arc::new(coordinator(&store).await);
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let runner = {
            let coord = Arc::clone(&coord);
            tokio::spawn(async move {
                coord
                    .run(async {
                        let _ = stop_rx.await;
                    })
                    .await
            })
        };
        tokio::task::yield_now().await;

        store.add_tuple(RelationTuple::new("acme", "alice", "read"));
        let marker = coord.trigger_refresh().await.unwrap();
        assert_eq!(marker, 1);

        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(coord.status().tuple_count, 1);
        assert_eq!(coord.status().observed_marker, Some(1));

        stop_tx.send(()).unwrap();
        runner.await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn readers_never_observe_a_torn_snapshot() {
        let store = InMemoryStore::new();
        let coord = Arc::new(coordinator(&store).await);
        let snapshots = coord.snapshots();

        let mut readers = tokio::task::JoinSet::new();
        for _ in 0..4 {
            let snapshots = Arc::clone(&snapshots);
            readers.spawn(async move {
                for _ in 0..2_000 {
                    let snap = snapshots.current();
                    // Every generation writes one mapping and one tuple
                    // named after the same round.
                    let mapping_rounds: Vec<&str> = snap
                        .mappings()
                        .iter()
                        .map(|m| m.id.trim_start_matches("m-"))
                        .collect();
                    for round in mapping_rounds {
                        let tenant = relgate_core::TenantId::new("acme");
                        let tags = snap.granted_tags(&tenant, &format!("s-{round}"));
                        assert!(tags.is_some(), "mapping m-{round} without its tuple");
                    }
                    tokio::task::yield_now().await;
                }
            });
        }

        for round in 0..50 {
            store.put_mapping(record(&format!("m-{round}"), &format!("/r/{round}")));
            store.add_tuple(RelationTuple::new("acme", format!("s-{round}"), "read"));
            store.bump_marker().await.unwrap();
            coord.poll_once().await.unwrap();
        }

        while let Some(result) = readers.join_next().await {
            result.unwrap();
        }
        assert_eq!(coord.status().version, 51);
    }
}
