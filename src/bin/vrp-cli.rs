use std::env;
use std::sync::Arc;

use colored::*;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vrp_core::cancellation::CancellationToken;
use vrp_core::config::{DistanceBackendKind, RoutingConfig};
use vrp_core::distance::backends::{GoogleDistanceBackend, OsrmDistanceBackend};
use vrp_core::distance::persistence;
use vrp_core::distance::{DistanceProvider, RawDistanceBackend};
use vrp_core::domain::RouteMode;
use vrp_core::fixtures::{generate_drivers, generate_participants, sample_activity_location};
use vrp_core::routing::{calculate, SolverInput, Strategy};

/// Demo entry point: wires the SQLite-backed distance cache to a real
/// backend, runs one calculation against synthetic fixtures, and prints the
/// resulting routes. Grounded on the teacher's `bin/vrp-solver.rs` +
/// `solver/tabu_search/search.rs::run` (`tracing_subscriber` init, `dotenv`,
/// `db_connection`, colored summary printing).
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer().with_span_events(fmt::format::FmtSpan::NEW | fmt::format::FmtSpan::CLOSE))
        .init();

    let config = RoutingConfig::from_env();
    info!("Starting vrp-cli with distance backend {:?}", config.distance_backend);

    let backend: Arc<dyn RawDistanceBackend> = match config.distance_backend {
        DistanceBackendKind::Google => {
            let api_key = env::var("GOOGLE_API_KEY").map_err(|_| {
                "DISTANCE_PROVIDER is 'google' but GOOGLE_API_KEY is not set in the environment"
            })?;
            Arc::new(GoogleDistanceBackend::new(api_key))
        }
        DistanceBackendKind::Osrm => Arc::new(OsrmDistanceBackend::new()),
    };

    let pool = persistence::connect(&config.cache_database_url).await?;
    let distances = DistanceProvider::new(pool, backend, config.prewarm_worker_pool);
    let cancel = CancellationToken::new();

    let activity_location = sample_activity_location();
    let drivers = generate_drivers(4, activity_location.coord, 4, config.random_seed);
    let participants = generate_participants(12, activity_location.coord, 2, config.random_seed);

    info!(
        "Calculating dropoff routes for {} participants across {} drivers",
        participants.len(),
        drivers.len()
    );

    let input = SolverInput {
        activity_location,
        participants,
        drivers,
        mode: RouteMode::Dropoff,
        strategy: Strategy::Balanced,
    };

    let output = calculate(input, &distances, &config, &cancel).await?;

    for route in &output.routes {
        println!(
            "{}",
            format!(
                "{} ({} stops, {:.0}m dropoff, {:.0}m total)",
                route.driver.display_name,
                route.stops.len(),
                route.total_dropoff_meters,
                route.total_route_meters
            )
            .green()
        );
        for stop in &route.stops {
            println!(
                "  #{} participant {} (+{:.0}m, cumulative {:.0}m)",
                stop.order, stop.participant_id, stop.distance_from_prev_meters, stop.cumulative_distance_meters
            );
        }
    }

    println!(
        "{}",
        format!(
            "Summary: {} participants assigned, {} drivers used, {:.0}m total, avg detour {:.0}s",
            output.summary.participants_assigned,
            output.summary.drivers_used,
            output.summary.total_route_meters,
            output.summary.average_detour_seconds
        )
        .yellow()
    );

    if !output.summary.unassigned_participant_ids.is_empty() {
        eprintln!(
            "{}",
            format!("{} participants unassigned", output.summary.unassigned_participant_ids.len()).red()
        );
    }

    Ok(())
}
