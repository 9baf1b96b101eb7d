use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::cancellation::CancellationToken;
use crate::config::RoutingConfig;
use crate::distance::DistanceProvider;
use crate::domain::{ActivityLocation, CalculatedRoute, Driver, Participant, RouteMode, RoutingSummary};
use crate::errors::RoutingError;

use super::balanced;
use super::minimize;
use super::primitives::{household_units, recompute_route, split_oversized_units, Endpoints};

/// Which heuristic drives the assignment (spec.md §4.4, §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Strategy {
    Minimize,
    Balanced,
}

/// Solver input record (spec.md §6). `drivers` should already carry any
/// organization-vehicle capacity substitution — the core only ever sees the
/// resulting effective capacity.
#[derive(Debug, Clone)]
pub struct SolverInput {
    pub activity_location: ActivityLocation,
    pub participants: Vec<Participant>,
    pub drivers: Vec<Driver>,
    pub mode: RouteMode,
    pub strategy: Strategy,
}

/// Solver output record (spec.md §6). A fresh session id is attached by the
/// edit-enabled entry point, not by `calculate` itself.
#[derive(Debug, Clone)]
pub struct SolverOutput {
    pub routes: Vec<CalculatedRoute>,
    pub summary: RoutingSummary,
    pub warnings: Vec<String>,
    pub mode: RouteMode,
}

/// Top-level entry point: dispatches to the selected strategy, then builds
/// the result (spec.md §4.6). Pre-warms the distance table once so every
/// phase of the chosen strategy observes a consistent set of distances
/// (spec.md §5, "pre-warm completes before Phase A").
#[instrument(skip_all, fields(
    participants = input.participants.len(),
    drivers = input.drivers.len(),
    mode = input.mode.as_str(),
))]
pub async fn calculate(
    input: SolverInput,
    distances: &DistanceProvider,
    config: &RoutingConfig,
    cancel: &CancellationToken,
) -> Result<SolverOutput, RoutingError> {
    if input.drivers.is_empty() && !input.participants.is_empty() {
        return Err(RoutingError::NoDrivers {
            participant_count: input.participants.len(),
        });
    }

    let mut points = vec![input.activity_location.coord];
    points.extend(input.participants.iter().map(|p| p.home_coord));
    points.extend(input.drivers.iter().map(|d| d.home_coord));
    let table = distances.build_table(&points, cancel).await?;

    let max_capacity = input.drivers.iter().map(|d| d.capacity as usize).max().unwrap_or(0);
    let units = split_oversized_units(household_units(&input.participants), max_capacity);

    let endpoints = Endpoints {
        mode: input.mode,
        activity_coord: input.activity_location.coord,
    };

    let working_routes = match input.strategy {
        Strategy::Minimize => minimize::solve(
            units,
            input.drivers.clone(),
            endpoints,
            config.random_seed,
            config.max_inter_route_iterations,
            &table,
            cancel,
        )?,
        Strategy::Balanced => balanced::solve(
            units,
            input.drivers.clone(),
            endpoints,
            config.fairness_weight,
            config.max_inter_route_iterations,
            &table,
            cancel,
        )?,
    };

    let mut routes = Vec::with_capacity(working_routes.len());
    for route in working_routes {
        cancel.check()?;
        let (origin, terminus) = endpoints.for_driver(&route.driver);
        let driver = route.driver.clone();
        let built = recompute_route(driver, &route.units, input.mode, origin, terminus, &table)?;
        routes.push(built);
    }

    let summary = RoutingSummary::from_routes(&routes, Vec::new());
    let non_empty: Vec<CalculatedRoute> = routes.into_iter().filter(|r| !r.stops.is_empty()).collect();

    Ok(SolverOutput {
        routes: non_empty,
        summary,
        warnings: Vec::new(),
        mode: input.mode,
    })
}
