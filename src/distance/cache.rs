use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use sqlx::SqlitePool;
use tokio::sync::{Notify, Semaphore};
use tracing::{debug, info, instrument, warn};

use crate::cancellation::CancellationToken;
use crate::distance::backend::RawDistanceBackend;
use crate::distance::persistence;
use crate::domain::{CoordKey, Coordinate};
use crate::errors::RoutingError;

type PairKey = (CoordKey, CoordKey);

enum Slot {
    Ready((f64, f64)),
    InFlight(Arc<Notify>),
}

/// Process-wide distance-and-duration provider (spec.md §4.1). Two cache
/// layers — an in-memory map guarded by a `RwLock`, and a SQLite-backed
/// persistent store — plus a single-flight mechanism so concurrent callers
/// requesting the same unresolved pair only trigger one external fetch.
/// Modeled on the teacher's `database/sqlx.rs` pool + the batched,
/// worker-pool-bounded fan-out in `distance/providers/google.rs`.
pub struct DistanceProvider {
    memory: std::sync::RwLock<HashMap<PairKey, Slot>>,
    pool: SqlitePool,
    backend: Arc<dyn RawDistanceBackend>,
    prewarm_worker_pool: usize,
}

impl DistanceProvider {
    pub fn new(pool: SqlitePool, backend: Arc<dyn RawDistanceBackend>, prewarm_worker_pool: usize) -> Self {
        Self {
            memory: std::sync::RwLock::new(HashMap::new()),
            pool,
            backend,
            prewarm_worker_pool,
        }
    }

    /// Returns `(meters, seconds)` for `origin -> destination`. Self-pairs
    /// return `(0.0, 0.0)` without consulting any layer. Pure and O(1)
    /// amortized after pre-warm (spec.md §4.1).
    #[instrument(skip(self, cancel), fields(origin = %origin.key().as_str(), dest = %destination.key().as_str()))]
    pub async fn get_distance(
        &self,
        origin: Coordinate,
        destination: Coordinate,
        cancel: &CancellationToken,
    ) -> Result<(f64, f64), RoutingError> {
        cancel.check()?;

        let okey = origin.key();
        let dkey = destination.key();
        if okey == dkey {
            return Ok((0.0, 0.0));
        }
        let pair = (okey, dkey);

        self.resolve_pair(pair, origin, destination, cancel).await
    }

    async fn resolve_pair(
        &self,
        pair: PairKey,
        origin: Coordinate,
        destination: Coordinate,
        cancel: &CancellationToken,
    ) -> Result<(f64, f64), RoutingError> {
        // Fast path: in-memory hit, avoiding the write lock entirely.
        {
            let guard = self.memory.read().expect("distance cache lock poisoned");
            if let Some(Slot::Ready(v)) = guard.get(&pair) {
                return Ok(*v);
            }
        }

        // Either claim the single-flight slot ourselves, or wait on it.
        let notify_to_await = {
            let mut guard = self.memory.write().expect("distance cache lock poisoned");
            match guard.get(&pair) {
                Some(Slot::Ready(v)) => return Ok(*v),
                Some(Slot::InFlight(notify)) => Some(Arc::clone(notify)),
                None => {
                    guard.insert(pair.clone(), Slot::InFlight(Arc::new(Notify::new())));
                    None
                }
            }
        };

        if let Some(notify) = notify_to_await {
            notify.notified().await;
            let guard = self.memory.read().expect("distance cache lock poisoned");
            return match guard.get(&pair) {
                Some(Slot::Ready(v)) => Ok(*v),
                _ => Err(RoutingError::DistanceUnavailable {
                    origin_key: pair.0.as_str().to_string(),
                    dest_key: pair.1.as_str().to_string(),
                    reason: "in-flight resolution did not complete".to_string(),
                }),
            };
        }

        // We own the single-flight slot. Resolve: persistent store, then backend.
        let result = self.resolve_uncached(&pair, origin, destination, cancel).await;

        let mut guard = self.memory.write().expect("distance cache lock poisoned");
        let notify = match guard.remove(&pair) {
            Some(Slot::InFlight(notify)) => notify,
            _ => Arc::new(Notify::new()),
        };
        if let Ok(value) = result {
            guard.insert(pair.clone(), Slot::Ready(value));
        }
        drop(guard);
        notify.notify_waiters();

        result
    }

    async fn resolve_uncached(
        &self,
        pair: &PairKey,
        origin: Coordinate,
        destination: Coordinate,
        cancel: &CancellationToken,
    ) -> Result<(f64, f64), RoutingError> {
        if let Some(value) = persistence::read(&self.pool, &pair.0, &pair.1).await? {
            debug!("distance cache persistent hit for {:?}", pair);
            return Ok(value);
        }

        cancel.check()?;
        let value = self.backend.resolve(origin, destination, cancel).await?;
        persistence::write(&self.pool, &pair.0, &pair.1, value.0, value.1).await?;
        Ok(value)
    }

    /// Guarantees that every ordered pair `(a, b)` with `a, b` drawn from
    /// `points`, `a != b`, is resolved and cached before returning.
    /// Individual pair failures are isolated: other pairs still populate,
    /// and the failed pair becomes resolvable on later demand (spec.md §4.1).
    #[instrument(skip(self, points, cancel), fields(n = points.len()))]
    pub async fn prewarm_cache(
        &self,
        points: &[Coordinate],
        cancel: &CancellationToken,
    ) -> Result<(), RoutingError> {
        cancel.check()?;

        let mut pairs = Vec::with_capacity(points.len() * points.len());
        for (i, &a) in points.iter().enumerate() {
            for (j, &b) in points.iter().enumerate() {
                if i != j {
                    pairs.push((a, b));
                }
            }
        }

        let semaphore = Arc::new(Semaphore::new(self.prewarm_worker_pool.max(1)));
        let mut tasks = Vec::with_capacity(pairs.len());

        for (a, b) in pairs {
            let semaphore = Arc::clone(&semaphore);
            let cancel = cancel.clone();
            tasks.push(async move {
                let _permit = semaphore.acquire().await.expect("semaphore closed");
                self.get_distance(a, b, &cancel).await
            });
        }

        let results = join_all(tasks).await;
        let failures = results.iter().filter(|r| r.is_err()).count();
        if failures > 0 {
            warn!(
                "prewarm_cache: {} of {} pairs failed and remain resolvable on demand",
                failures,
                results.len()
            );
        } else {
            info!("prewarm_cache: resolved all {} pairs", results.len());
        }

        Ok(())
    }

    /// Returns the full n×n matrix (zero on the diagonal).
    pub async fn get_distance_matrix(
        &self,
        points: &[Coordinate],
        cancel: &CancellationToken,
    ) -> Result<Vec<Vec<(f64, f64)>>, RoutingError> {
        self.prewarm_cache(points, cancel).await?;

        let mut matrix = Vec::with_capacity(points.len());
        for &a in points {
            let mut row = Vec::with_capacity(points.len());
            for &b in points {
                row.push(self.get_distance(a, b, cancel).await?);
            }
            matrix.push(row);
        }
        Ok(matrix)
    }

    /// Returns distances/durations from a single origin to each destination.
    pub async fn get_distances_from_point(
        &self,
        origin: Coordinate,
        destinations: &[Coordinate],
        cancel: &CancellationToken,
    ) -> Result<Vec<(f64, f64)>, RoutingError> {
        let mut out = Vec::with_capacity(destinations.len());
        for &dest in destinations {
            out.push(self.get_distance(origin, dest, cancel).await?);
        }
        Ok(out)
    }

    /// Pre-warms every ordered pair among `points` and snapshots the result
    /// into a plain, synchronous `DistanceTable`. The routing engine's
    /// insertion-cost and 2-opt primitives are CPU-bound and run against
    /// this snapshot rather than against the async provider directly, so a
    /// single calculation always observes a consistent distance table
    /// (spec.md §4.1, "pre-warm completes before Phase A").
    pub async fn build_table(
        &self,
        points: &[Coordinate],
        cancel: &CancellationToken,
    ) -> Result<DistanceTable, RoutingError> {
        self.prewarm_cache(points, cancel).await?;

        let mut entries = HashMap::new();
        for &a in points {
            for &b in points {
                if a.key() != b.key() {
                    let value = self.get_distance(a, b, cancel).await?;
                    entries.insert((a.key(), b.key()), value);
                }
            }
        }
        Ok(DistanceTable { entries })
    }
}

/// A synchronous snapshot of resolved `(meters, seconds)` pairs, built via
/// `DistanceProvider::build_table`. Consumed by `crate::routing::primitives`
/// so the heuristic search itself never awaits I/O.
#[derive(Debug, Clone, Default)]
pub struct DistanceTable {
    entries: HashMap<PairKey, (f64, f64)>,
}

impl DistanceTable {
    pub fn get(&self, a: Coordinate, b: Coordinate) -> Result<(f64, f64), RoutingError> {
        let ak = a.key();
        let bk = b.key();
        if ak == bk {
            return Ok((0.0, 0.0));
        }
        self.entries
            .get(&(ak.clone(), bk.clone()))
            .copied()
            .ok_or_else(|| RoutingError::DistanceUnavailable {
                origin_key: ak.as_str().to_string(),
                dest_key: bk.as_str().to_string(),
                reason: "coordinate pair missing from the pre-warmed distance table".to_string(),
            })
    }

    pub fn meters(&self, a: Coordinate, b: Coordinate) -> Result<f64, RoutingError> {
        self.get(a, b).map(|(m, _)| m)
    }

    pub fn seconds(&self, a: Coordinate, b: Coordinate) -> Result<f64, RoutingError> {
        self.get(a, b).map(|(_, s)| s)
    }
}

/// Test-only helpers shared with `crate::routing` unit tests: a Euclidean
/// (haversine) `DistanceTable` built without touching any network backend.
#[cfg(test)]
pub mod tests_support {
    use super::*;

    pub async fn euclidean_table(points: &[Coordinate]) -> DistanceTable {
        let dp = euclidean_provider().await;
        let cancel = CancellationToken::new();
        dp.build_table(points, &cancel).await.unwrap()
    }

    /// A `DistanceProvider` backed by an in-memory SQLite pool and a
    /// haversine-distance mock backend, for tests that exercise the
    /// provider's async surface directly (rather than a pre-warmed
    /// `DistanceTable` snapshot).
    pub async fn euclidean_provider() -> DistanceProvider {
        let pool = persistence::connect("sqlite::memory:").await.unwrap();
        DistanceProvider::new(pool, std::sync::Arc::new(tests::EuclideanBackend), 4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distance::backend::DistanceFuture;

    pub(crate) struct EuclideanBackend;

    impl RawDistanceBackend for EuclideanBackend {
        fn resolve<'a>(
            &'a self,
            origin: Coordinate,
            destination: Coordinate,
            _cancel: &'a CancellationToken,
        ) -> DistanceFuture<'a> {
            Box::pin(async move {
                let meters = origin.haversine_meters(&destination);
                Ok((meters, meters / 10.0))
            })
        }
    }

    async fn provider() -> DistanceProvider {
        let pool = persistence::connect("sqlite::memory:").await.unwrap();
        DistanceProvider::new(pool, Arc::new(EuclideanBackend), 4)
    }

    #[tokio::test]
    async fn self_pair_is_zero_without_backend() {
        let dp = provider().await;
        let cancel = CancellationToken::new();
        let p = Coordinate::new(1.0, 1.0);
        let (m, s) = dp.get_distance(p, p, &cancel).await.unwrap();
        assert_eq!((m, s), (0.0, 0.0));
    }

    #[tokio::test]
    async fn repeated_lookup_is_stable() {
        let dp = provider().await;
        let cancel = CancellationToken::new();
        let a = Coordinate::new(1.0, 1.0);
        let b = Coordinate::new(2.0, 2.0);
        let first = dp.get_distance(a, b, &cancel).await.unwrap();
        let second = dp.get_distance(a, b, &cancel).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn prewarm_resolves_all_ordered_pairs() {
        let dp = provider().await;
        let cancel = CancellationToken::new();
        let points = vec![
            Coordinate::new(0.0, 0.0),
            Coordinate::new(1.0, 0.0),
            Coordinate::new(0.0, 1.0),
        ];
        dp.prewarm_cache(&points, &cancel).await.unwrap();

        let guard = dp.memory.read().unwrap();
        assert_eq!(guard.len(), 6); // 3 * 2 ordered pairs
    }
}
