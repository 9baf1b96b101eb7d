use rayon::prelude::*;
use tracing::instrument;

use crate::cancellation::CancellationToken;
use crate::domain::Driver;
use crate::errors::{capacity_shortage, RoutingError};

use super::primitives::{
    dropoff_distance, insertion_cost, nearest_neighbor_order, rebuild_route, two_opt, Endpoints, RouteUnit,
    WorkingRoute,
};
use crate::distance::cache::DistanceTable;

const MIN_IMPROVEMENT_METERS: f64 = 10.0;

/// Balanced strategy (spec.md §4.5): round-robin insertion with a fairness
/// penalty, per-route 2-opt, fairness-aware inter-route rebalance (min-max
/// variant). Returns one `WorkingRoute` per input driver, in input order.
#[instrument(skip_all, fields(drivers = drivers.len(), units = units.len(), fairness_weight))]
pub fn solve(
    units: Vec<RouteUnit>,
    drivers: Vec<Driver>,
    endpoints: Endpoints,
    fairness_weight: f64,
    max_iterations: usize,
    table: &DistanceTable,
    cancel: &CancellationToken,
) -> Result<Vec<WorkingRoute>, RoutingError> {
    let total_participants: usize = units.iter().map(RouteUnit::len).sum();
    let total_capacity: usize = drivers.iter().map(|d| d.capacity as usize).sum();

    let mut routes: Vec<WorkingRoute> = drivers.iter().cloned().map(WorkingRoute::empty).collect();

    let mut cycle: Vec<usize> = (0..drivers.len()).collect();
    cycle.sort_by_key(|&i| drivers[i].id.0);

    let mut placed = vec![false; units.len()];
    let placed_count_target = units.len();
    let safety_bound = total_participants + drivers.len().max(1);

    let mut attempts = 0usize;
    let mut cursor = 0usize;
    while attempts < safety_bound {
        cancel.check()?;
        if placed.iter().filter(|&&p| p).count() == placed_count_target {
            break;
        }
        if drivers.iter().enumerate().all(|(i, _)| routes[i].remaining_capacity() == 0) {
            break;
        }

        let di = cycle[cursor % cycle.len()];
        cursor += 1;
        attempts += 1;

        if routes[di].remaining_capacity() == 0 {
            continue;
        }

        let route_total = dropoff_distance(&routes[di].units, endpoints.for_driver(&drivers[di]).0, table)?;
        let mean_total = mean_route_distance(&routes, &drivers, endpoints, table)?;
        let fairness_penalty = fairness_weight * (route_total - mean_total).max(0.0) * 0.5;

        // Flatten every eligible (unit, position) candidate and score them
        // in parallel, then sort by total cost — the teacher's `par_iter` +
        // `par_sort_by(total_cmp)` idiom (`phases/core_logic.rs::find_neighbours`).
        let (origin, _) = endpoints.for_driver(&drivers[di]);
        let remaining_capacity = routes[di].remaining_capacity();
        let route_len = routes[di].units.len();
        let candidates: Vec<(usize, usize)> = units
            .iter()
            .enumerate()
            .filter(|(ui, unit)| !placed[*ui] && unit.len() <= remaining_capacity)
            .flat_map(|(ui, _)| (0..=route_len).map(move |pos| (ui, pos)))
            .collect();

        let mut scored: Vec<(f64, usize, usize)> = candidates
            .par_iter()
            .map(|&(ui, pos)| {
                insertion_cost(&routes[di], pos, units[ui].coord, origin, table)
                    .map(|cost| (cost + fairness_penalty, ui, pos))
            })
            .collect::<Result<Vec<_>, RoutingError>>()?;
        scored.par_sort_by(|a, b| a.0.total_cmp(&b.0));

        if let Some(&(_, ui, pos)) = scored.first() {
            routes[di].units.insert(pos, units[ui].clone());
            placed[ui] = true;
        }
    }

    if placed.iter().any(|&p| !p) {
        let unassigned_ids: Vec<_> = placed
            .iter()
            .enumerate()
            .filter(|(_, &p)| !p)
            .flat_map(|(i, _)| units[i].participant_ids.clone())
            .collect();
        return Err(capacity_shortage(&unassigned_ids, total_capacity as u64, total_participants));
    }

    // Phase B — per-route nearest-neighbor ordering + 2-opt.
    for (di, route) in routes.iter_mut().enumerate() {
        cancel.check()?;
        let (origin, _) = endpoints.for_driver(&drivers[di]);
        let ordered = nearest_neighbor_order(std::mem::take(&mut route.units), origin, table)?;
        route.units = ordered;
        two_opt(&mut route.units, origin, table)?;
    }

    // Phase C — min-max fairness rebalance.
    let min_floor = if total_participants < drivers.len() { 0 } else { 1 };
    min_max_rebalance(&mut routes, &drivers, endpoints, max_iterations, table, cancel, min_floor)?;

    Ok(routes)
}

fn mean_route_distance(
    routes: &[WorkingRoute],
    drivers: &[Driver],
    endpoints: Endpoints,
    table: &DistanceTable,
) -> Result<f64, RoutingError> {
    if routes.is_empty() {
        return Ok(0.0);
    }
    let mut total = 0.0;
    for (i, r) in routes.iter().enumerate() {
        let (origin, _) = endpoints.for_driver(&drivers[i]);
        total += dropoff_distance(&r.units, origin, table)?;
    }
    Ok(total / routes.len() as f64)
}

/// Repeatedly relocates a stop off the currently-heaviest route onto a
/// lighter one, committing the move that most reduces the maximum route
/// distance (by at least `MIN_IMPROVEMENT_METERS`), until no such move
/// exists or `MAX_REBALANCE_ITERATIONS` is reached (spec.md §4.5 Phase C,
/// min-max variant).
fn min_max_rebalance(
    routes: &mut [WorkingRoute],
    drivers: &[Driver],
    endpoints: Endpoints,
    max_iterations: usize,
    table: &DistanceTable,
    cancel: &CancellationToken,
    min_floor: usize,
) -> Result<(), RoutingError> {
    if routes.len() < 2 {
        return Ok(());
    }

    for _ in 0..max_iterations {
        cancel.check()?;

        let mut totals = Vec::with_capacity(routes.len());
        for (i, r) in routes.iter().enumerate() {
            let (origin, _) = endpoints.for_driver(&drivers[i]);
            totals.push(dropoff_distance(&r.units, origin, table)?);
        }
        let (max_idx, &max_total) = totals
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .unwrap();

        if routes[max_idx].units.len() <= min_floor {
            break;
        }
        if routes[max_idx].units.len() - 1 < min_floor {
            break;
        }

        // Flatten every (unit_pos, target route) candidate and score them in
        // parallel — the teacher's `par_iter` + `par_sort_by(total_cmp)`
        // idiom (`phases/core_logic.rs::find_neighbours`) — rather than the
        // nested sequential scan.
        let source_snapshot = routes[max_idx].units.clone();
        let routes_view: &[WorkingRoute] = routes;
        let candidates: Vec<(usize, usize)> = (0..source_snapshot.len())
            .flat_map(|unit_pos| (0..routes_view.len()).filter(move |&ti| ti != max_idx).map(move |ti| (unit_pos, ti)))
            .collect();

        let mut scored: Vec<(f64, usize, usize, usize)> = candidates
            .par_iter()
            .map(|&(unit_pos, ti)| {
                let unit = &source_snapshot[unit_pos];
                let target = &routes_view[ti];
                if unit.len() > target.remaining_capacity() {
                    return Ok(None);
                }
                let (target_origin, _) = endpoints.for_driver(&drivers[ti]);
                let mut best_pos = 0usize;
                let mut best_cost = f64::INFINITY;
                for pos in 0..=target.units.len() {
                    let cost = insertion_cost(target, pos, unit.coord, target_origin, table)?;
                    if cost < best_cost {
                        best_cost = cost;
                        best_pos = pos;
                    }
                }

                let mut source_units = source_snapshot.clone();
                source_units.remove(unit_pos);
                let mut target_units = target.units.clone();
                target_units.insert(best_pos, unit.clone());

                let (source_origin, _) = endpoints.for_driver(&drivers[max_idx]);
                let new_source = dropoff_distance(&source_units, source_origin, table)?;
                let new_target = dropoff_distance(&target_units, target_origin, table)?;

                let mut new_totals = totals.clone();
                new_totals[max_idx] = new_source;
                new_totals[ti] = new_target;
                let new_max = new_totals.iter().cloned().fold(f64::MIN, f64::max);

                if max_total - new_max >= MIN_IMPROVEMENT_METERS {
                    Ok(Some((new_max, unit_pos, ti, best_pos)))
                } else {
                    Ok(None)
                }
            })
            .collect::<Result<Vec<Option<(f64, usize, usize, usize)>>, RoutingError>>()?
            .into_iter()
            .flatten()
            .collect();
        scored.par_sort_by(|a, b| a.0.total_cmp(&b.0));

        let best_move: Option<(usize, usize, usize, f64)> = scored
            .first()
            .map(|&(new_max, unit_pos, ti, best_pos)| (unit_pos, ti, best_pos, new_max));

        match best_move {
            None => break,
            Some((unit_pos, ti, _insert_pos, _new_max)) => {
                let moved = routes[max_idx].units.remove(unit_pos);
                routes[ti].units.push(moved);

                let (source_origin, _) = endpoints.for_driver(&drivers[max_idx]);
                let (target_origin, _) = endpoints.for_driver(&drivers[ti]);
                routes[max_idx].units = rebuild_route(std::mem::take(&mut routes[max_idx].units), source_origin, table)?;
                routes[ti].units = rebuild_route(std::mem::take(&mut routes[ti].units), target_origin, table)?;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ActivityLocation, Coordinate, DriverId, LocationId, Participant, ParticipantId, RouteMode};

    fn coord(lat: f64, lng: f64) -> Coordinate {
        Coordinate::new(lat, lng)
    }

    #[tokio::test]
    async fn spreads_stops_across_drivers() {
        let activity = ActivityLocation {
            id: LocationId(1),
            name: "HQ".into(),
            coord: coord(0.0, 0.0),
        };
        let participants: Vec<_> = (1..=6)
            .map(|i| Participant::new(ParticipantId(i), format!("P{i}"), "addr", coord(0.01 * i as f64, 0.0)))
            .collect();
        let drivers = vec![
            Driver::new(DriverId(1), "D1", coord(0.1, 0.0), 6),
            Driver::new(DriverId(2), "D2", coord(-0.1, 0.0), 6),
        ];
        let points: Vec<Coordinate> = std::iter::once(activity.coord)
            .chain(participants.iter().map(|p| p.home_coord))
            .chain(drivers.iter().map(|d| d.home_coord))
            .collect();
        let table = crate::distance::cache::tests_support::euclidean_table(&points).await;
        let units = super::super::primitives::household_units(&participants);
        let endpoints = Endpoints {
            mode: RouteMode::Dropoff,
            activity_coord: activity.coord,
        };
        let cancel = CancellationToken::new();

        let routes = solve(units, drivers, endpoints, 0.5, 50, &table, &cancel).unwrap();
        assert!(routes.iter().all(|r| !r.units.is_empty()));
        let total_placed: usize = routes.iter().map(|r| r.units.iter().map(RouteUnit::len).sum::<usize>()).sum();
        assert_eq!(total_placed, 6);
    }
}
