use crate::cancellation::CancellationToken;
use crate::distance::DistanceProvider;
use crate::domain::{find_participant, CalculatedRoute, Coordinate, DriverId, Participant, ParticipantId, RouteMode};
use crate::errors::{RoutingError, SessionStoreError};
use crate::routing::primitives::recompute_route_for_order;

use super::store::{SessionId, SessionState, SessionStore};

/// Builds a distance table covering every point a session edit could need:
/// the activity location, every selected driver's home, and every
/// participant's home (spec.md §4.7 edits never introduce a new point, so
/// this table is sufficient for any move/swap/add/reset on this session).
async fn table_for_session(
    state: &SessionState,
    distances: &DistanceProvider,
    cancel: &CancellationToken,
) -> Result<crate::distance::cache::DistanceTable, RoutingError> {
    let mut points = vec![state.activity_location.coord];
    points.extend(state.selected_drivers.iter().map(|d| d.home_coord));
    points.extend(state.participants.iter().map(|p| p.home_coord));
    distances.build_table(&points, cancel).await
}

fn route_participant_order(route: &CalculatedRoute) -> Vec<ParticipantId> {
    route.stops.iter().map(|s| s.participant_id).collect()
}

/// Re-costs `route` in place. Takes `mode`/`activity_coord`/`participants`
/// as separate borrows (rather than a whole `&SessionState`) so callers can
/// hold a disjoint `&mut` into `state.current` at the same time.
fn recost(
    mode: RouteMode,
    activity_coord: Coordinate,
    participants: &[Participant],
    route: &mut CalculatedRoute,
    table: &crate::distance::cache::DistanceTable,
) -> Result<(), SessionStoreError> {
    let order = route_participant_order(route);
    let driver = route.driver.clone();
    let rebuilt = recompute_route_for_order(
        driver,
        &order,
        |id| find_participant(participants, id).map(|p| p.home_coord),
        mode,
        activity_coord,
        table,
    )
    .map_err(|e| SessionStoreError::Validation(e.to_string()))?;
    *route = rebuilt;
    Ok(())
}

/// Moves a participant between two routes by index, re-costing both
/// (spec.md §4.7, "Move participant"). `insert_at_position` of `< 0` or
/// `>= len` appends.
pub async fn move_participant(
    store: &SessionStore,
    id: &SessionId,
    participant_id: ParticipantId,
    from_route_idx: usize,
    to_route_idx: usize,
    insert_at_position: i64,
    distances: &DistanceProvider,
    cancel: &CancellationToken,
) -> Result<(), RoutingError> {
    let snapshot = store.get(id).ok_or_else(|| SessionStoreError::NotFound(id.0.clone()))?;
    let table = table_for_session(&snapshot, distances, cancel).await?;

    store
        .update(id, |state| {
            if from_route_idx >= state.current.len() || to_route_idx >= state.current.len() {
                return Err(SessionStoreError::Validation("route index out of range".into()));
            }
            if from_route_idx == to_route_idx {
                return Err(SessionStoreError::Validation("source and target route are the same".into()));
            }

            let source_pos = state.current[from_route_idx]
                .stops
                .iter()
                .position(|s| s.participant_id == participant_id)
                .ok_or_else(|| SessionStoreError::Validation("participant not found in source route".into()))?;

            let target_capacity = state.current[to_route_idx].driver.capacity as usize;
            if state.current[to_route_idx].stops.len() >= target_capacity {
                return Err(SessionStoreError::Validation("target route is at capacity".into()));
            }

            let stop = state.current[from_route_idx].stops.remove(source_pos);
            let target_len = state.current[to_route_idx].stops.len();
            let insert_at = if insert_at_position < 0 || insert_at_position as usize >= target_len {
                target_len
            } else {
                insert_at_position as usize
            };
            state.current[to_route_idx].stops.insert(insert_at, stop);

            let mode = state.mode;
            let activity_coord = state.activity_location.coord;
            let (from, to) = index_pair_mut(&mut state.current, from_route_idx, to_route_idx);
            recost(mode, activity_coord, &state.participants, from, &table)?;
            recost(mode, activity_coord, &state.participants, to, &table)?;

            state.recompute_summary();
            Ok(())
        })
        .map_err(RoutingError::from)
}

/// Swaps the drivers assigned to two routes, re-costing both (spec.md
/// §4.7, "Swap drivers"). Rejects if either route's stop count would
/// exceed the other driver's capacity.
pub async fn swap_drivers(
    store: &SessionStore,
    id: &SessionId,
    route_idx_1: usize,
    route_idx_2: usize,
    distances: &DistanceProvider,
    cancel: &CancellationToken,
) -> Result<(), RoutingError> {
    let snapshot = store.get(id).ok_or_else(|| SessionStoreError::NotFound(id.0.clone()))?;
    let table = table_for_session(&snapshot, distances, cancel).await?;

    store
        .update(id, |state| {
            if route_idx_1 >= state.current.len() || route_idx_2 >= state.current.len() {
                return Err(SessionStoreError::Validation("route index out of range".into()));
            }
            if route_idx_1 == route_idx_2 {
                return Err(SessionStoreError::Validation("cannot swap a route with itself".into()));
            }

            let stops_1 = state.current[route_idx_1].stops.len();
            let stops_2 = state.current[route_idx_2].stops.len();
            let cap_1 = state.current[route_idx_1].driver.capacity as usize;
            let cap_2 = state.current[route_idx_2].driver.capacity as usize;
            if stops_1 > cap_2 || stops_2 > cap_1 {
                return Err(SessionStoreError::Validation(
                    "swapped driver would not have enough capacity for the route's stops".into(),
                ));
            }

            let mode = state.mode;
            let activity_coord = state.activity_location.coord;
            let (route_1, route_2) = index_pair_mut(&mut state.current, route_idx_1, route_idx_2);
            std::mem::swap(&mut route_1.driver, &mut route_2.driver);

            recost(mode, activity_coord, &state.participants, route_1, &table)?;
            recost(mode, activity_coord, &state.participants, route_2, &table)?;

            state.recompute_summary();
            Ok(())
        })
        .map_err(RoutingError::from)
}

/// Appends an empty route for a driver already in `selected_drivers` but
/// not currently assigned to any route (spec.md §4.7, "Add unused driver").
pub async fn add_driver(
    store: &SessionStore,
    id: &SessionId,
    driver_id: DriverId,
    distances: &DistanceProvider,
    cancel: &CancellationToken,
) -> Result<(), RoutingError> {
    let snapshot = store.get(id).ok_or_else(|| SessionStoreError::NotFound(id.0.clone()))?;
    let table = table_for_session(&snapshot, distances, cancel).await?;

    store
        .update(id, |state| {
            let driver = state
                .selected_drivers
                .iter()
                .find(|d| d.id == driver_id)
                .cloned()
                .ok_or_else(|| SessionStoreError::Validation("driver is not in the selected set".into()))?;

            if state.current.iter().any(|r| r.driver.id == driver_id) {
                return Err(SessionStoreError::Validation("driver is already assigned to a route".into()));
            }

            let (origin, terminus) =
                crate::routing::primitives::route_endpoints(state.mode, state.activity_location.coord, driver.home_coord);
            let empty = crate::routing::primitives::recompute_route(
                driver,
                &[],
                state.mode,
                origin,
                terminus,
                &table,
            )
            .map_err(|e| SessionStoreError::Validation(e.to_string()))?;

            state.current.push(empty);
            state.recompute_summary();
            Ok(())
        })
        .map_err(RoutingError::from)
}

/// Replaces `current` with a fresh deep copy of `original` (spec.md §4.7,
/// "Reset"). No distance lookups needed.
pub fn reset(store: &SessionStore, id: &SessionId) -> Result<(), RoutingError> {
    store
        .update(id, |state| {
            state.current = state.original.clone();
            state.recompute_summary();
            Ok(())
        })
        .map_err(RoutingError::from)
}

fn index_pair_mut<T>(slice: &mut [T], a: usize, b: usize) -> (&mut T, &mut T) {
    assert_ne!(a, b, "index_pair_mut requires distinct indices");
    if a < b {
        let (left, right) = slice.split_at_mut(b);
        (&mut left[a], &mut right[0])
    } else {
        let (left, right) = slice.split_at_mut(a);
        (&mut right[0], &mut left[b])
    }
}
