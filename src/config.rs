use std::env;
use std::time::Duration;

/// Which external driving-distance backend the distance provider dispatches
/// cache misses to. Mirrors the teacher's `DISTANCE_PROVIDER` constant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistanceBackendKind {
    Osrm,
    Google,
}

impl DistanceBackendKind {
    fn from_env_str(s: &str) -> Self {
        match s {
            "google" => DistanceBackendKind::Google,
            _ => DistanceBackendKind::Osrm,
        }
    }
}

/// Typed, env-overridable settings for a routing calculation. Constructed
/// with `Default`, then optionally overridden via `RoutingConfig::from_env`.
#[derive(Debug, Clone)]
pub struct RoutingConfig {
    /// Bounded worker-pool size for distance-matrix pre-warm (spec.md §4.1).
    pub prewarm_worker_pool: usize,
    /// Fairness weight `w` for the balanced strategy (spec.md §4.5, §9).
    pub fairness_weight: f64,
    /// Per-request deadline for external distance/geocoding calls (spec.md §5).
    pub external_request_timeout: Duration,
    /// Bounded retry count for geocoding (spec.md §5).
    pub geocoding_retry_attempts: u32,
    /// Base backoff seconds for geocoding retry, doubled per attempt.
    pub geocoding_retry_base_seconds: u64,
    /// Token-bucket rate limit for the geocoding service (spec.md §5).
    pub geocoding_rate_limit_per_sec: u32,
    pub distance_backend: DistanceBackendKind,
    pub cache_database_url: String,
    /// Optional fixed seed for driver shuffling, for reproducible tests
    /// (spec.md §9, Design Notes — "Randomness").
    pub random_seed: Option<u64>,
    /// Outer-loop iteration cap shared by both strategies' inter-route
    /// refinement phases (spec.md §4.4 Phase D, §4.5 Phase C).
    pub max_inter_route_iterations: usize,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            prewarm_worker_pool: 8,
            fairness_weight: 0.5,
            external_request_timeout: Duration::from_secs(10),
            geocoding_retry_attempts: 3,
            geocoding_retry_base_seconds: 1,
            geocoding_rate_limit_per_sec: 1,
            distance_backend: DistanceBackendKind::Osrm,
            cache_database_url: "sqlite:vrp_distance_cache.sqlite".to_string(),
            random_seed: None,
            max_inter_route_iterations: 50,
        }
    }
}

impl RoutingConfig {
    /// Reads `.env` (via `dotenv`, as the teacher does in `database/sqlx.rs`)
    /// then overlays recognised environment variables on top of `Default`.
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();
        let mut cfg = Self::default();

        if let Ok(v) = env::var("VRP_PREWARM_WORKERS") {
            if let Ok(n) = v.parse() {
                cfg.prewarm_worker_pool = n;
            }
        }
        if let Ok(v) = env::var("VRP_FAIRNESS_WEIGHT") {
            if let Ok(n) = v.parse() {
                cfg.fairness_weight = n;
            }
        }
        if let Ok(v) = env::var("VRP_DISTANCE_PROVIDER") {
            cfg.distance_backend = DistanceBackendKind::from_env_str(&v);
        }
        if let Ok(v) = env::var("DATABASE_URL") {
            cfg.cache_database_url = v;
        }
        if let Ok(v) = env::var("VRP_RANDOM_SEED") {
            if let Ok(n) = v.parse() {
                cfg.random_seed = Some(n);
            }
        }

        cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_spec_defaults() {
        let cfg = RoutingConfig::default();
        assert_eq!(cfg.prewarm_worker_pool, 8);
        assert_eq!(cfg.fairness_weight, 0.5);
        assert_eq!(cfg.geocoding_retry_attempts, 3);
        assert_eq!(cfg.geocoding_rate_limit_per_sec, 1);
        assert_eq!(cfg.max_inter_route_iterations, 50);
    }
}
