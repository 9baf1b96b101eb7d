use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use rand::SeedableRng;
use rayon::prelude::*;
use tracing::{info, instrument};

use crate::cancellation::CancellationToken;
use crate::domain::{Coordinate, Driver};
use crate::errors::{capacity_shortage, RoutingError};

use super::primitives::{
    dropoff_distance, insertion_cost, nearest_neighbor_order, rebuild_route, two_opt, Endpoints, RouteUnit,
    WorkingRoute,
};
use crate::distance::cache::DistanceTable;

/// Distance-minimizing strategy (spec.md §4.4): spread-seed, greedy cluster
/// expansion, per-route 2-opt, inter-route refinement. Returns one
/// `WorkingRoute` per input driver, in the same order as `drivers`.
#[instrument(skip_all, fields(drivers = drivers.len(), units = units.len()))]
pub fn solve(
    units: Vec<RouteUnit>,
    drivers: Vec<Driver>,
    endpoints: Endpoints,
    random_seed: Option<u64>,
    max_iterations: usize,
    table: &DistanceTable,
    cancel: &CancellationToken,
) -> Result<Vec<WorkingRoute>, RoutingError> {
    let total_participants: usize = units.iter().map(RouteUnit::len).sum();
    let total_capacity: usize = drivers.iter().map(|d| d.capacity as usize).sum();

    let mut routes: Vec<WorkingRoute> = drivers.iter().cloned().map(WorkingRoute::empty).collect();

    // Phase A — spread seeds, paired to the nearest not-yet-assigned driver.
    let seed_count = drivers.len().min(units.len());
    let seed_indices = spread_seeds(&units, endpoints.activity_coord, seed_count, table)?;
    let pairing = pair_seeds_to_drivers(&seed_indices, &units, &drivers, table)?;

    let mut placed: Vec<bool> = vec![false; units.len()];
    for (&unit_idx, &driver_pos) in &pairing {
        routes[driver_pos].units.push(units[unit_idx].clone());
        placed[unit_idx] = true;
    }

    // Phase B — greedy cluster expansion, shuffled driver order.
    let seed = random_seed.unwrap_or_else(|| rand::random());
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut driver_order: Vec<usize> = (0..drivers.len()).collect();
    driver_order.shuffle(&mut rng);
    info!("driver shuffle order (seed {seed}): {:?}", driver_order);

    loop {
        cancel.check()?;
        let mut absorbed_any = false;

        for &di in &driver_order {
            if routes[di].remaining_capacity() == 0 {
                continue;
            }
            let anchors: Vec<Coordinate> = if routes[di].units.is_empty() {
                vec![drivers[di].home_coord]
            } else {
                routes[di].stop_coords()
            };

            // Score every eligible unit's distance to the route's nearest
            // current anchor in parallel, then sort by (distance, id
            // tie-break) — the teacher's `par_iter` + `par_sort_by(total_cmp)`
            // idiom (`phases/core_logic.rs::find_neighbours`).
            let remaining_capacity = routes[di].remaining_capacity();
            let mut scored: Vec<(f64, u64, usize)> = units
                .par_iter()
                .enumerate()
                .filter(|(ui, unit)| !placed[*ui] && unit.len() <= remaining_capacity)
                .map(|(ui, unit)| {
                    let mut min_dist = f64::INFINITY;
                    for &anchor in &anchors {
                        let d = table.meters(anchor, unit.coord)?;
                        if d < min_dist {
                            min_dist = d;
                        }
                    }
                    Ok::<_, RoutingError>((min_dist, unit.participant_ids[0].0, ui))
                })
                .collect::<Result<Vec<_>, RoutingError>>()?;
            scored.par_sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

            if let Some(&(_, _, ui)) = scored.first() {
                routes[di].units.push(units[ui].clone());
                placed[ui] = true;
                absorbed_any = true;
            }
        }

        if !absorbed_any {
            break;
        }
        if placed.iter().all(|&p| p) {
            break;
        }
    }

    let unassigned_count: usize = placed
        .iter()
        .enumerate()
        .filter(|(_, &p)| !p)
        .map(|(i, _)| units[i].len())
        .sum();
    if unassigned_count > 0 {
        let unassigned_ids: Vec<_> = placed
            .iter()
            .enumerate()
            .filter(|(_, &p)| !p)
            .flat_map(|(i, _)| units[i].participant_ids.clone())
            .collect();
        return Err(capacity_shortage(&unassigned_ids, total_capacity as u64, total_participants));
    }

    // Phase C — per-route nearest-neighbor ordering + 2-opt.
    for (di, route) in routes.iter_mut().enumerate() {
        cancel.check()?;
        let (origin, _) = endpoints.for_driver(&drivers[di]);
        let ordered = nearest_neighbor_order(std::mem::take(&mut route.units), origin, table)?;
        route.units = ordered;
        two_opt(&mut route.units, origin, table)?;
    }

    // Phase D — inter-route refinement on last-stop boundaries.
    inter_route_refine(&mut routes, &drivers, endpoints, max_iterations, table, cancel)?;

    Ok(routes)
}

fn spread_seeds(
    units: &[RouteUnit],
    activity_coord: Coordinate,
    num_seeds: usize,
    table: &DistanceTable,
) -> Result<Vec<usize>, RoutingError> {
    if units.is_empty() || num_seeds == 0 {
        return Ok(Vec::new());
    }

    let mut chosen = Vec::with_capacity(num_seeds);
    let mut chosen_coords = Vec::with_capacity(num_seeds);

    // Seed 0: the unit closest to the activity location, scored in
    // parallel and sorted the same way as `two_opt`'s candidate scan.
    let mut scored: Vec<(f64, usize)> = units
        .par_iter()
        .enumerate()
        .map(|(i, u)| table.meters(u.coord, activity_coord).map(|d| (d, i)))
        .collect::<Result<Vec<_>, RoutingError>>()?;
    scored.par_sort_by(|a, b| a.0.total_cmp(&b.0));
    let best = scored[0].1;
    chosen.push(best);
    chosen_coords.push(units[best].coord);

    while chosen.len() < num_seeds {
        let mut scored: Vec<(f64, usize)> = units
            .par_iter()
            .enumerate()
            .filter(|(i, _)| !chosen.contains(i))
            .map(|(i, u)| {
                let mut min_to_chosen = f64::INFINITY;
                for &c in &chosen_coords {
                    let d = table.meters(u.coord, c)?;
                    if d < min_to_chosen {
                        min_to_chosen = d;
                    }
                }
                Ok::<_, RoutingError>((min_to_chosen, i))
            })
            .collect::<Result<Vec<_>, RoutingError>>()?;
        // Farthest-from-closest-assigned: sort descending by min-to-chosen.
        scored.par_sort_by(|a, b| b.0.total_cmp(&a.0));

        match scored.first() {
            Some(&(_, i)) => {
                chosen.push(i);
                chosen_coords.push(units[i].coord);
            }
            None => break,
        }
    }

    Ok(chosen)
}

fn pair_seeds_to_drivers(
    seed_indices: &[usize],
    units: &[RouteUnit],
    drivers: &[Driver],
    table: &DistanceTable,
) -> Result<std::collections::HashMap<usize, usize>, RoutingError> {
    let mut taken = vec![false; drivers.len()];
    let mut pairing = std::collections::HashMap::new();

    for &unit_idx in seed_indices {
        let unit = &units[unit_idx];
        let mut best_driver = None;
        let mut best_dist = f64::INFINITY;
        for (di, d) in drivers.iter().enumerate() {
            if taken[di] || (d.capacity as usize) < unit.len() {
                continue;
            }
            let dist = table.meters(d.home_coord, unit.coord)?;
            if dist < best_dist {
                best_dist = dist;
                best_driver = Some(di);
            }
        }
        if let Some(di) = best_driver {
            taken[di] = true;
            pairing.insert(unit_idx, di);
        }
    }

    Ok(pairing)
}

/// Phase D (spec.md §4.4): relocate-i-to-j, relocate-j-to-i, swap-last-stops,
/// evaluated on last-stop boundaries between every route pair, capped at 50
/// outer passes over all pairs.
fn inter_route_refine(
    routes: &mut [WorkingRoute],
    drivers: &[Driver],
    endpoints: Endpoints,
    max_iterations: usize,
    table: &DistanceTable,
    cancel: &CancellationToken,
) -> Result<(), RoutingError> {
    let n = routes.len();
    if n < 2 {
        return Ok(());
    }

    for _ in 0..max_iterations {
        cancel.check()?;
        let mut improved_this_pass = false;

        for i in 0..n {
            for j in (i + 1)..n {
                if try_relocate(routes, drivers, endpoints, table, i, j)? {
                    improved_this_pass = true;
                    continue;
                }
                if try_relocate(routes, drivers, endpoints, table, j, i)? {
                    improved_this_pass = true;
                    continue;
                }
                if try_swap_last(routes, drivers, endpoints, table, i, j)? {
                    improved_this_pass = true;
                }
            }
        }

        if !improved_this_pass {
            break;
        }
    }

    Ok(())
}

fn pair_sum_dropoff(
    routes: &[WorkingRoute],
    drivers: &[Driver],
    endpoints: Endpoints,
    table: &DistanceTable,
    i: usize,
    j: usize,
) -> Result<f64, RoutingError> {
    let (oi, _) = endpoints.for_driver(&drivers[i]);
    let (oj, _) = endpoints.for_driver(&drivers[j]);
    Ok(dropoff_distance(&routes[i].units, oi, table)? + dropoff_distance(&routes[j].units, oj, table)?)
}

/// Moves route `from`'s last unit to its best-scoring position in route
/// `to`, accepting iff combined dropoff distance strictly improves.
fn try_relocate(
    routes: &mut [WorkingRoute],
    drivers: &[Driver],
    endpoints: Endpoints,
    table: &DistanceTable,
    from: usize,
    to: usize,
) -> Result<bool, RoutingError> {
    if routes[from].units.is_empty() {
        return Ok(false);
    }
    let moving = routes[from].units.last().unwrap().clone();
    if moving.len() > routes[to].remaining_capacity() {
        return Ok(false);
    }

    let before = pair_sum_dropoff(routes, drivers, endpoints, table, from, to)?;

    let mut from_units = routes[from].units.clone();
    from_units.pop();

    let (to_origin, _) = endpoints.for_driver(&drivers[to]);
    let mut scored: Vec<(f64, usize)> = (0..=routes[to].units.len())
        .into_par_iter()
        .map(|pos| insertion_cost(&routes[to], pos, moving.coord, to_origin, table).map(|cost| (cost, pos)))
        .collect::<Result<Vec<_>, RoutingError>>()?;
    scored.par_sort_by(|a, b| a.0.total_cmp(&b.0));
    let best_pos = scored[0].1;
    let mut to_units = routes[to].units.clone();
    to_units.insert(best_pos, moving);

    let (from_origin, _) = endpoints.for_driver(&drivers[from]);
    let from_rebuilt = rebuild_route(from_units, from_origin, table)?;
    let to_rebuilt = rebuild_route(to_units, to_origin, table)?;

    let after = dropoff_distance(&from_rebuilt, from_origin, table)? + dropoff_distance(&to_rebuilt, to_origin, table)?;

    if after < before - 1e-9 {
        routes[from].units = from_rebuilt;
        routes[to].units = to_rebuilt;
        Ok(true)
    } else {
        Ok(false)
    }
}

fn try_swap_last(
    routes: &mut [WorkingRoute],
    drivers: &[Driver],
    endpoints: Endpoints,
    table: &DistanceTable,
    i: usize,
    j: usize,
) -> Result<bool, RoutingError> {
    if routes[i].units.is_empty() || routes[j].units.is_empty() {
        return Ok(false);
    }
    let last_i = routes[i].units.last().unwrap().clone();
    let last_j = routes[j].units.last().unwrap().clone();

    let cap_i_ok = routes[i].occupied() - last_i.len() + last_j.len() <= drivers[i].capacity as usize;
    let cap_j_ok = routes[j].occupied() - last_j.len() + last_i.len() <= drivers[j].capacity as usize;
    if !cap_i_ok || !cap_j_ok {
        return Ok(false);
    }

    let before = pair_sum_dropoff(routes, drivers, endpoints, table, i, j)?;

    let mut units_i = routes[i].units.clone();
    *units_i.last_mut().unwrap() = last_j.clone();
    let mut units_j = routes[j].units.clone();
    *units_j.last_mut().unwrap() = last_i.clone();

    let (oi, _) = endpoints.for_driver(&drivers[i]);
    let (oj, _) = endpoints.for_driver(&drivers[j]);
    let rebuilt_i = rebuild_route(units_i, oi, table)?;
    let rebuilt_j = rebuild_route(units_j, oj, table)?;
    let after = dropoff_distance(&rebuilt_i, oi, table)? + dropoff_distance(&rebuilt_j, oj, table)?;

    if after < before - 1e-9 {
        routes[i].units = rebuilt_i;
        routes[j].units = rebuilt_j;
        Ok(true)
    } else {
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ActivityLocation, DriverId, LocationId, Participant, ParticipantId, RouteMode};

    fn coord(lat: f64, lng: f64) -> Coordinate {
        Coordinate::new(lat, lng)
    }

    #[tokio::test]
    async fn assigns_every_participant_within_capacity() {
        let activity = ActivityLocation {
            id: LocationId(1),
            name: "HQ".into(),
            coord: coord(0.0, 0.0),
        };
        let participants = vec![
            Participant::new(ParticipantId(1), "A", "addr", coord(0.01, 0.0)),
            Participant::new(ParticipantId(2), "B", "addr", coord(0.02, 0.0)),
            Participant::new(ParticipantId(3), "C", "addr", coord(-0.01, 0.0)),
        ];
        let drivers = vec![
            Driver::new(DriverId(1), "D1", coord(0.05, 0.0), 2),
            Driver::new(DriverId(2), "D2", coord(-0.05, 0.0), 2),
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

        let routes = solve(units, drivers, endpoints, Some(42), 50, &table, &cancel).unwrap();
        let placed_count: usize = routes.iter().map(|r| r.units.iter().map(RouteUnit::len).sum::<usize>()).sum();
        assert_eq!(placed_count, 3);
    }

    #[tokio::test]
    async fn reports_capacity_shortage() {
        let activity = ActivityLocation {
            id: LocationId(1),
            name: "HQ".into(),
            coord: coord(0.0, 0.0),
        };
        let participants = vec![
            Participant::new(ParticipantId(1), "A", "addr", coord(0.01, 0.0)),
            Participant::new(ParticipantId(2), "B", "addr", coord(0.02, 0.0)),
            Participant::new(ParticipantId(3), "C", "addr", coord(0.03, 0.0)),
        ];
        let drivers = vec![Driver::new(DriverId(1), "D1", coord(0.05, 0.0), 1)];
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

        let err = solve(units, drivers, endpoints, Some(7), 50, &table, &cancel).unwrap_err();
        match err {
            RoutingError::CapacityShortage { total_participants, .. } => assert_eq!(total_participants, 3),
            other => panic!("expected capacity shortage, got {other:?}"),
        }
    }
}
