//! End-to-end scenarios seeded from the system's testable-properties scenarios
//! (S1-S6): a minimal dropoff success, a capacity shortage, balanced-strategy
//! equalization, household cohesion, pickup-mode endpoints, and a rejected
//! session move that leaves state untouched.

use std::sync::Arc;

use vrp_core::cancellation::CancellationToken;
use vrp_core::config::RoutingConfig;
use vrp_core::distance::{DistanceFuture, DistanceProvider, RawDistanceBackend};
use vrp_core::domain::{ActivityLocation, CalculatedRoute, Coordinate, Driver, DriverId, LocationId, Participant, ParticipantId, RouteMode, RouteStop};
use vrp_core::errors::RoutingError;
use vrp_core::routing::{calculate, SolverInput, Strategy};
use vrp_core::session::SessionStore;

/// Returns planar-Euclidean-degrees times 111_000, exactly as the spec's
/// scenarios are worded ("a mock distance provider returning Euclidean x
/// 111_000"), not the haversine great-circle distance used elsewhere.
struct PlanarMockBackend;

impl RawDistanceBackend for PlanarMockBackend {
    fn resolve<'a>(
        &'a self,
        origin: Coordinate,
        destination: Coordinate,
        _cancel: &'a CancellationToken,
    ) -> DistanceFuture<'a> {
        Box::pin(async move {
            let dlat = destination.lat - origin.lat;
            let dlng = destination.lng - origin.lng;
            let meters = (dlat * dlat + dlng * dlng).sqrt() * 111_000.0;
            Ok((meters, meters / 10.0))
        })
    }
}

async fn mock_provider() -> DistanceProvider {
    let pool = vrp_core::distance::persistence::connect("sqlite::memory:").await.unwrap();
    DistanceProvider::new(pool, Arc::new(PlanarMockBackend), 4)
}

fn activity_at(lat: f64, lng: f64) -> ActivityLocation {
    ActivityLocation {
        id: LocationId(1),
        name: "Activity".into(),
        coord: Coordinate::new(lat, lng),
    }
}

#[tokio::test]
async fn s1_minimal_success_dropoff() {
    let distances = mock_provider().await;
    let config = RoutingConfig::default();
    let cancel = CancellationToken::new();

    let activity_location = activity_at(40.000, -75.000);
    let driver = Driver::new(DriverId(1), "D1", Coordinate::new(40.500, -75.500), 4);
    let p1 = Participant::new(ParticipantId(1), "P1", "addr1", Coordinate::new(40.100, -75.100));
    let p2 = Participant::new(ParticipantId(2), "P2", "addr2", Coordinate::new(40.200, -75.200));

    let input = SolverInput {
        activity_location,
        participants: vec![p1.clone(), p2.clone()],
        drivers: vec![driver],
        mode: RouteMode::Dropoff,
        strategy: Strategy::Minimize,
    };

    let output = calculate(input, &distances, &config, &cancel).await.unwrap();

    assert_eq!(output.routes.len(), 1);
    assert_eq!(output.summary.drivers_used, 1);
    let route = &output.routes[0];
    assert_eq!(route.stops.len(), 2);
    assert_eq!(route.stops[0].participant_id, p1.id);
    assert_eq!(route.stops[1].participant_id, p2.id);
    assert_eq!(route.stops[0].order, 0);
    assert_eq!(route.stops[1].order, 1);
    assert!((route.total_dropoff_meters - 31_400.0).abs() < 200.0);
}

#[tokio::test]
async fn s2_capacity_shortage() {
    let distances = mock_provider().await;
    let config = RoutingConfig::default();
    let cancel = CancellationToken::new();

    let activity_location = activity_at(40.000, -75.000);
    let driver = Driver::new(DriverId(1), "D1", Coordinate::new(40.500, -75.500), 2);
    let participants: Vec<Participant> = (0..5)
        .map(|i| {
            Participant::new(
                ParticipantId(i + 1),
                format!("P{}", i + 1),
                format!("addr{}", i + 1),
                Coordinate::new(40.010 * (i + 1) as f64, -75.010 * (i + 1) as f64),
            )
        })
        .collect();

    let input = SolverInput {
        activity_location,
        participants,
        drivers: vec![driver],
        mode: RouteMode::Dropoff,
        strategy: Strategy::Minimize,
    };

    let err = calculate(input, &distances, &config, &cancel).await.unwrap_err();
    match err {
        RoutingError::CapacityShortage {
            unassigned,
            total_capacity,
            total_participants,
        } => {
            assert_eq!(unassigned, 3);
            assert_eq!(total_capacity, 2);
            assert_eq!(total_participants, 5);
        }
        other => panic!("expected CapacityShortage, got {other:?}"),
    }
}

#[tokio::test]
async fn s3_balanced_equalizes_stops() {
    let distances = mock_provider().await;
    let mut config = RoutingConfig::default();
    config.random_seed = Some(1);
    let cancel = CancellationToken::new();

    let activity_location = activity_at(40.000, -75.000);
    let drivers = vec![
        Driver::new(DriverId(1), "D1", Coordinate::new(40.900, -75.900), 3),
        Driver::new(DriverId(2), "D2", Coordinate::new(40.901, -75.901), 3),
    ];
    let participants: Vec<Participant> = (0..4)
        .map(|i| {
            let offset = (i + 1) as f64 * 0.100;
            Participant::new(
                ParticipantId(i + 1),
                format!("P{}", i + 1),
                format!("addr{}", i + 1),
                Coordinate::new(40.000 + offset, -75.000 - offset),
            )
        })
        .collect();

    let input = SolverInput {
        activity_location,
        participants,
        drivers,
        mode: RouteMode::Dropoff,
        strategy: Strategy::Balanced,
    };

    let output = calculate(input, &distances, &config, &cancel).await.unwrap();
    assert_eq!(output.routes.len(), 2);
    for route in &output.routes {
        assert_eq!(route.stops.len(), 2);
    }
}

#[tokio::test]
async fn s4_household_cohesion() {
    let distances = mock_provider().await;
    let config = RoutingConfig::default();
    let cancel = CancellationToken::new();

    let activity_location = activity_at(40.000, -74.000);
    let drivers = vec![
        Driver::new(DriverId(1), "D1", Coordinate::new(40.900, -74.900), 3),
        Driver::new(DriverId(2), "D2", Coordinate::new(40.901, -74.901), 3),
    ];

    let alice = Participant::new(ParticipantId(1), "Alice", "a", Coordinate::new(40.010, -74.010));
    let bob = Participant::new(ParticipantId(2), "Bob", "b", Coordinate::new(40.010, -74.010));
    let charlie = Participant::new(ParticipantId(3), "Charlie", "c", Coordinate::new(40.020, -74.020));
    let david = Participant::new(ParticipantId(4), "David", "d", Coordinate::new(40.020, -74.020));
    let eve = Participant::new(ParticipantId(5), "Eve", "e", Coordinate::new(40.030, -74.030));

    let input = SolverInput {
        activity_location,
        participants: vec![alice.clone(), bob.clone(), charlie.clone(), david.clone(), eve.clone()],
        drivers,
        mode: RouteMode::Dropoff,
        strategy: Strategy::Minimize,
    };

    let output = calculate(input, &distances, &config, &cancel).await.unwrap();

    let find_route = |id: ParticipantId| -> usize {
        output
            .routes
            .iter()
            .position(|r| r.stops.iter().any(|s| s.participant_id == id))
            .expect("participant assigned to a route")
    };

    assert_eq!(find_route(alice.id), find_route(bob.id));
    assert_eq!(find_route(charlie.id), find_route(david.id));

    let assert_contiguous = |a: ParticipantId, b: ParticipantId| {
        let route = &output.routes[find_route(a)];
        let pos_a = route.stops.iter().position(|s| s.participant_id == a).unwrap();
        let pos_b = route.stops.iter().position(|s| s.participant_id == b).unwrap();
        assert_eq!((pos_a as i64 - pos_b as i64).abs(), 1, "household members must be contiguous");
    };
    assert_contiguous(alice.id, bob.id);
    assert_contiguous(charlie.id, david.id);
}

#[tokio::test]
async fn s5_pickup_mode_swaps_endpoints() {
    let distances = mock_provider().await;
    let config = RoutingConfig::default();
    let cancel = CancellationToken::new();

    let activity_location = activity_at(40.000, -75.000);
    let driver = Driver::new(DriverId(1), "D1", Coordinate::new(40.500, -75.500), 4);
    let p1 = Participant::new(ParticipantId(1), "P1", "addr1", Coordinate::new(40.100, -75.100));
    let p2 = Participant::new(ParticipantId(2), "P2", "addr2", Coordinate::new(40.200, -75.200));
    let driver_home = driver.home_coord;
    let activity_coord = activity_location.coord;

    let input = SolverInput {
        activity_location,
        participants: vec![p1, p2],
        drivers: vec![driver],
        mode: RouteMode::Pickup,
        strategy: Strategy::Minimize,
    };

    let output = calculate(input, &distances, &config, &cancel).await.unwrap();
    let route = &output.routes[0];

    let expected_baseline = {
        let dlat = activity_coord.lat - driver_home.lat;
        let dlng = activity_coord.lng - driver_home.lng;
        (dlat * dlat + dlng * dlng).sqrt() * 111_000.0 / 10.0
    };
    assert!((route.baseline_duration_seconds - expected_baseline).abs() < 1.0);
    assert_eq!(route.mode, RouteMode::Pickup);
}

#[tokio::test]
async fn s6_move_to_full_driver_is_rejected_and_state_is_unchanged() {
    let activity_location = activity_at(40.000, -75.000);
    let d1 = Driver::new(DriverId(1), "D1", Coordinate::new(40.500, -75.500), 4);
    let d2 = Driver::new(DriverId(2), "D2", Coordinate::new(40.600, -75.600), 1);

    let p1 = Participant::new(ParticipantId(1), "P1", "addr1", Coordinate::new(40.100, -75.100));
    let p2 = Participant::new(ParticipantId(2), "P2", "addr2", Coordinate::new(40.200, -75.200));
    let p3 = Participant::new(ParticipantId(3), "P3", "addr3", Coordinate::new(40.300, -75.300));

    let route_d1 = CalculatedRoute {
        driver: d1.clone(),
        stops: vec![
            RouteStop {
                participant_id: p1.id,
                order: 0,
                distance_from_prev_meters: 1000.0,
                duration_from_prev_seconds: 100.0,
                cumulative_distance_meters: 1000.0,
                cumulative_duration_seconds: 100.0,
            },
            RouteStop {
                participant_id: p2.id,
                order: 1,
                distance_from_prev_meters: 1000.0,
                duration_from_prev_seconds: 100.0,
                cumulative_distance_meters: 2000.0,
                cumulative_duration_seconds: 200.0,
            },
        ],
        mode: RouteMode::Dropoff,
        total_dropoff_meters: 2000.0,
        leg_to_terminus_meters: 500.0,
        total_route_meters: 2500.0,
        baseline_duration_seconds: 50.0,
        route_duration_seconds: 250.0,
    };

    let route_d2_full = CalculatedRoute {
        driver: d2.clone(),
        stops: vec![RouteStop {
            participant_id: p3.id,
            order: 0,
            distance_from_prev_meters: 800.0,
            duration_from_prev_seconds: 80.0,
            cumulative_distance_meters: 800.0,
            cumulative_duration_seconds: 80.0,
        }],
        mode: RouteMode::Dropoff,
        total_dropoff_meters: 800.0,
        leg_to_terminus_meters: 300.0,
        total_route_meters: 1100.0,
        baseline_duration_seconds: 40.0,
        route_duration_seconds: 110.0,
    };

    let store = SessionStore::new();
    let id = store.create(
        vec![route_d1, route_d2_full],
        vec![d1, d2],
        vec![p1.clone(), p2, p3],
        activity_location,
        false,
        RouteMode::Dropoff,
    );

    let before = store.get(&id).unwrap();
    let before_json = serde_json::to_string(&before.current).unwrap();

    let distances = mock_provider().await;
    let cancel = CancellationToken::new();
    let result = vrp_core::session::move_participant(&store, &id, p1.id, 0, 1, -1, &distances, &cancel).await;

    assert!(matches!(result, Err(RoutingError::ValidationFailed { .. })));

    let after = store.get(&id).unwrap();
    let after_json = serde_json::to_string(&after.current).unwrap();
    assert_eq!(before_json, after_json, "current must be untouched after a rejected move");
}
