use std::future::Future;
use std::pin::Pin;

use crate::cancellation::CancellationToken;
use crate::domain::Coordinate;
use crate::errors::RoutingError;

pub type DistanceFuture<'a> =
    Pin<Box<dyn Future<Output = Result<(f64, f64), RoutingError>> + Send + 'a>>;

/// The "external driving-distance service" (spec.md §1) — out of scope as a
/// concrete production implementation, but the distance provider (in scope)
/// only ever talks to this trait after a cache miss. Implementations
/// resolve one ordered pair at a time; batching, pooling and caching all
/// live in `DistanceProvider`.
pub trait RawDistanceBackend: Send + Sync {
    /// Resolve a single ordered pair to (meters, seconds). Must honor
    /// `cancel` by returning `RoutingError::Cancelled` promptly once it
    /// fires.
    fn resolve<'a>(
        &'a self,
        origin: Coordinate,
        destination: Coordinate,
        cancel: &'a CancellationToken,
    ) -> DistanceFuture<'a>;
}
