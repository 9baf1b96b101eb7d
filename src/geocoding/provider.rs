use std::future::Future;
use std::pin::Pin;

use crate::cancellation::CancellationToken;
use crate::domain::Coordinate;
use crate::errors::RoutingError;

pub type GeocodeFuture<'a> =
    Pin<Box<dyn Future<Output = Result<(Coordinate, String), RoutingError>> + Send + 'a>>;
pub type SearchFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Vec<(Coordinate, String)>, RoutingError>> + Send + 'a>>;

/// Forward-geocoding client interface the core consumes (spec.md §6). The
/// concrete production client is an out-of-scope external collaborator;
/// this trait plus `HttpGeocodingProvider` (a thin reference adapter) are
/// all the core defines.
pub trait GeocodingProvider: Send + Sync {
    fn geocode<'a>(&'a self, address: &'a str, cancel: &'a CancellationToken) -> GeocodeFuture<'a>;

    fn search<'a>(
        &'a self,
        query: &'a str,
        limit: usize,
        cancel: &'a CancellationToken,
    ) -> SearchFuture<'a>;

    /// Bounded retry with exponential backoff (spec.md §5: default 3
    /// attempts, `1s * 2^i`). Default implementation retries `geocode`;
    /// adapters may override for provider-specific retry semantics.
    fn geocode_with_retry<'a>(
        &'a self,
        address: &'a str,
        max_attempts: u32,
        base_backoff_secs: u64,
        cancel: &'a CancellationToken,
    ) -> GeocodeFuture<'a> {
        Box::pin(async move {
            let mut last_err = None;
            for attempt in 0..max_attempts.max(1) {
                cancel.check()?;
                match self.geocode(address, cancel).await {
                    Ok(v) => return Ok(v),
                    Err(e) => {
                        last_err = Some(e);
                        if attempt + 1 < max_attempts {
                            let backoff = base_backoff_secs * (1u64 << attempt);
                            tokio::time::sleep(std::time::Duration::from_secs(backoff)).await;
                        }
                    }
                }
            }
            Err(last_err.unwrap_or_else(|| RoutingError::GeocodingFailed {
                address: address.to_string(),
                reason: "no attempts made".to_string(),
            }))
        })
    }
}
