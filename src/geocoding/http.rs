use std::sync::Mutex;
use std::time::{Duration, Instant};

use reqwest::Client;
use serde_json::Value;
use tracing::{debug, trace};

use crate::cancellation::CancellationToken;
use crate::domain::Coordinate;
use crate::errors::RoutingError;

use super::provider::{GeocodeFuture, GeocodingProvider, SearchFuture};

/// Simple token-bucket limiting the geocoding service to at most one
/// request per `interval` (spec.md §5: "≤ 1 request/second").
struct RateLimiter {
    interval: Duration,
    last: Mutex<Instant>,
}

impl RateLimiter {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Mutex::new(Instant::now() - interval),
        }
    }

    async fn acquire(&self) {
        let wait = {
            let mut last = self.last.lock().expect("rate limiter lock poisoned");
            let now = Instant::now();
            let elapsed = now.duration_since(*last);
            let wait = self.interval.saturating_sub(elapsed);
            *last = now + wait;
            wait
        };
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
    }
}

/// Reference HTTP-backed geocoding adapter. Forward-geocodes an address
/// string to a coordinate via a generic search endpoint; modeled on the
/// teacher's `distance/providers/osrm.rs` OneMap postal-code lookup flow
/// (bearer-token auth, JSON search response, rate limited, retried by the
/// trait's default `geocode_with_retry`).
pub struct HttpGeocodingProvider {
    base_url: String,
    client: Client,
    limiter: RateLimiter,
}

impl HttpGeocodingProvider {
    pub fn new(base_url: impl Into<String>, requests_per_sec: u32) -> Self {
        let interval = Duration::from_secs_f64(1.0 / requests_per_sec.max(1) as f64);
        Self {
            base_url: base_url.into(),
            client: Client::new(),
            limiter: RateLimiter::new(interval),
        }
    }

    async fn search_raw(&self, query: &str, limit: usize) -> Result<Vec<(Coordinate, String)>, RoutingError> {
        self.limiter.acquire().await;

        let url = format!(
            "{}/search?q={}&limit={}",
            self.base_url,
            urlencode(query),
            limit
        );
        trace!("geocoding search: {url}");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| RoutingError::GeocodingFailed {
                address: query.to_string(),
                reason: format!("request failed: {e}"),
            })?;

        if !response.status().is_success() {
            return Err(RoutingError::GeocodingFailed {
                address: query.to_string(),
                reason: format!("http status {}", response.status()),
            });
        }

        let text = response.text().await.map_err(|e| RoutingError::GeocodingFailed {
            address: query.to_string(),
            reason: format!("failed reading response body: {e}"),
        })?;

        let json: Value = serde_json::from_str(&text).map_err(|e| RoutingError::GeocodingFailed {
            address: query.to_string(),
            reason: format!("failed parsing response json: {e}"),
        })?;

        let results = json["results"].as_array().cloned().unwrap_or_default();
        let mut out = Vec::with_capacity(results.len());
        for item in results.into_iter().take(limit) {
            let lat = item["lat"].as_f64();
            let lng = item["lng"].as_f64();
            let display = item["display_name"].as_str().unwrap_or(query).to_string();
            if let (Some(lat), Some(lng)) = (lat, lng) {
                out.push((Coordinate::new(lat, lng), display));
            }
        }
        debug!("geocoding search '{}' -> {} results", query, out.len());
        Ok(out)
    }
}

fn urlencode(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c.to_string()
            } else {
                format!("%{:02X}", c as u32)
            }
        })
        .collect()
}

impl GeocodingProvider for HttpGeocodingProvider {
    fn geocode<'a>(&'a self, address: &'a str, cancel: &'a CancellationToken) -> GeocodeFuture<'a> {
        Box::pin(async move {
            cancel.check()?;
            let results = self.search_raw(address, 1).await?;
            results
                .into_iter()
                .next()
                .ok_or_else(|| RoutingError::GeocodingFailed {
                    address: address.to_string(),
                    reason: "no results".to_string(),
                })
        })
    }

    fn search<'a>(
        &'a self,
        query: &'a str,
        limit: usize,
        cancel: &'a CancellationToken,
    ) -> SearchFuture<'a> {
        Box::pin(async move {
            cancel.check()?;
            self.search_raw(query, limit).await
        })
    }
}
