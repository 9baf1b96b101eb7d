use std::collections::HashMap;

use rayon::prelude::*;

use crate::distance::cache::DistanceTable;
use crate::domain::{CalculatedRoute, Coordinate, Driver, Participant, ParticipantId, RouteMode, RouteStop};
use crate::errors::RoutingError;

/// One or more participants sharing a coordinate key (spec.md §4.2,
/// "household grouping") that must move together: inserted contiguously at
/// a single position, and never split except per the oversized-household
/// policy in `split_oversized_units` (spec.md §9, Open Questions).
#[derive(Debug, Clone)]
pub struct RouteUnit {
    pub participant_ids: Vec<ParticipantId>,
    pub coord: Coordinate,
}

impl RouteUnit {
    pub fn len(&self) -> usize {
        self.participant_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participant_ids.is_empty()
    }
}

/// Partitions participants by coordinate key. Group order follows first
/// occurrence in `participants`; member order within a group follows input
/// order.
pub fn household_units(participants: &[Participant]) -> Vec<RouteUnit> {
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, RouteUnit> = HashMap::new();

    for p in participants {
        let key = p.home_coord.key().as_str().to_string();
        groups
            .entry(key.clone())
            .or_insert_with(|| {
                order.push(key.clone());
                RouteUnit {
                    participant_ids: Vec::new(),
                    coord: p.home_coord,
                }
            })
            .participant_ids
            .push(p.id);
    }

    order.into_iter().map(|k| groups.remove(&k).unwrap()).collect()
}

/// Split any unit whose size exceeds every driver's effective capacity.
/// Policy (spec.md §9, Open Question — "oversized household"): split only
/// when no single driver can take the whole group, at the boundary that
/// keeps the largest contiguous remainder together — i.e. peel participants
/// off one at a time from the back until the head fits the largest
/// capacity, repeating for the remainder.
pub fn split_oversized_units(units: Vec<RouteUnit>, max_capacity: usize) -> Vec<RouteUnit> {
    if max_capacity == 0 {
        return units;
    }
    let mut result = Vec::with_capacity(units.len());
    for unit in units {
        if unit.len() <= max_capacity {
            result.push(unit);
            continue;
        }
        let coord = unit.coord;
        let mut remaining = unit.participant_ids;
        while remaining.len() > max_capacity {
            let head: Vec<ParticipantId> = remaining.drain(..max_capacity).collect();
            result.push(RouteUnit {
                participant_ids: head,
                coord,
            });
        }
        if !remaining.is_empty() {
            result.push(RouteUnit {
                participant_ids: remaining,
                coord,
            });
        }
    }
    result
}

/// A driver's in-progress route during strategy execution: an ordered
/// sequence of household units, not yet costed into a `CalculatedRoute`.
#[derive(Debug, Clone)]
pub struct WorkingRoute {
    pub driver: Driver,
    pub units: Vec<RouteUnit>,
}

impl WorkingRoute {
    pub fn empty(driver: Driver) -> Self {
        Self {
            driver,
            units: Vec::new(),
        }
    }

    pub fn occupied(&self) -> usize {
        self.units.iter().map(RouteUnit::len).sum()
    }

    pub fn remaining_capacity(&self) -> usize {
        (self.driver.capacity as usize).saturating_sub(self.occupied())
    }

    pub fn stop_coords(&self) -> Vec<Coordinate> {
        self.units.iter().map(|u| u.coord).collect()
    }
}

/// Mode-aware origin/terminus (spec.md §4.3). The entire routing engine is
/// mode-parametric; no other code path should branch on mode.
pub fn route_endpoints(mode: RouteMode, activity: Coordinate, driver_home: Coordinate) -> (Coordinate, Coordinate) {
    match mode {
        RouteMode::Dropoff => (activity, driver_home),
        RouteMode::Pickup => (driver_home, activity),
    }
}

/// Bundles the mode and activity-location coordinate shared by every route
/// in a calculation, so strategies never branch on mode themselves (spec.md
/// §4.3).
#[derive(Debug, Clone, Copy)]
pub struct Endpoints {
    pub mode: RouteMode,
    pub activity_coord: Coordinate,
}

impl Endpoints {
    pub fn for_driver(&self, driver: &Driver) -> (Coordinate, Coordinate) {
        route_endpoints(self.mode, self.activity_coord, driver.home_coord)
    }
}

/// Cost of inserting a unit (participant or household group) at `pos`
/// among `route`'s existing units (spec.md §4.2). Cost uses meters;
/// negative costs are permitted and meaningful.
pub fn insertion_cost(
    route: &WorkingRoute,
    pos: usize,
    candidate_coord: Coordinate,
    origin: Coordinate,
    table: &DistanceTable,
) -> Result<f64, RoutingError> {
    let n = route.units.len();
    let prev = if pos == 0 { origin } else { route.units[pos - 1].coord };

    if pos == n {
        table.meters(prev, candidate_coord)
    } else {
        let next = route.units[pos].coord;
        let to_candidate = table.meters(prev, candidate_coord)?;
        let from_candidate = table.meters(candidate_coord, next)?;
        let bypass = table.meters(prev, next)?;
        Ok(to_candidate + from_candidate - bypass)
    }
}

/// Sum of leg distances from `origin` through the last unit — the
/// "dropoff" portion of the route, excluding the leg to the terminus. This
/// is the quantity 2-opt and inter-route refinement optimize (spec.md §4.2,
/// §4.4).
pub fn dropoff_distance(units: &[RouteUnit], origin: Coordinate, table: &DistanceTable) -> Result<f64, RoutingError> {
    if units.is_empty() {
        return Ok(0.0);
    }
    let mut total = table.meters(origin, units[0].coord)?;
    for w in units.windows(2) {
        total += table.meters(w[0].coord, w[1].coord)?;
    }
    Ok(total)
}

/// 2-opt local search (spec.md §4.2). Each pass scores every index pair
/// `(i, j)` with `0 <= i < j <= n` in parallel — the same `par_iter` +
/// `par_sort_by` with `total_cmp` idiom as the teacher's `find_neighbours`
/// (`phases/core_logic.rs`, `solver/tabu_search/neighborhood.rs`) — and
/// commits the best-scoring reversal if it strictly improves on the
/// current cost, re-scanning from the top each time. Terminates when a
/// full pass yields no improvement — guaranteed to halt since dropoff
/// distance is bounded below and strictly decreases on each commit.
pub fn two_opt(units: &mut Vec<RouteUnit>, origin: Coordinate, table: &DistanceTable) -> Result<(), RoutingError> {
    loop {
        let n = units.len();
        let current = dropoff_distance(units, origin, table)?;

        let pairs: Vec<(usize, usize)> = (0..n).flat_map(|i| ((i + 2)..=n).map(move |j| (i, j))).collect();
        if pairs.is_empty() {
            break;
        }

        let base: &[RouteUnit] = units.as_slice();
        let mut scored: Vec<(f64, (usize, usize))> = pairs
            .par_iter()
            .map(|&(i, j)| {
                let mut candidate = base.to_vec();
                candidate[i..j].reverse();
                dropoff_distance(&candidate, origin, table).map(|cost| (cost, (i, j)))
            })
            .collect::<Result<Vec<_>, RoutingError>>()?;
        scored.par_sort_by(|a, b| a.0.total_cmp(&b.0));

        let &(best_cost, (i, j)) = scored.first().expect("pairs non-empty implies scored non-empty");
        if best_cost < current - 1e-9 {
            units[i..j].reverse();
        } else {
            break;
        }
    }
    Ok(())
}

/// Orders `units` by repeated nearest-neighbor selection starting from
/// `origin` (spec.md §4.4 Phase C). Each step scores every remaining unit
/// in parallel and takes the closest, using the same `par_iter` +
/// `par_sort_by(total_cmp)` idiom as `two_opt`.
pub fn nearest_neighbor_order(
    mut remaining: Vec<RouteUnit>,
    origin: Coordinate,
    table: &DistanceTable,
) -> Result<Vec<RouteUnit>, RoutingError> {
    let mut ordered = Vec::with_capacity(remaining.len());
    let mut current = origin;

    while !remaining.is_empty() {
        let mut scored: Vec<(f64, usize)> = remaining
            .par_iter()
            .enumerate()
            .map(|(i, u)| table.meters(current, u.coord).map(|d| (d, i)))
            .collect::<Result<Vec<_>, RoutingError>>()?;
        scored.par_sort_by(|a, b| a.0.total_cmp(&b.0));

        let (_, best_idx) = scored[0];
        let chosen = remaining.remove(best_idx);
        current = chosen.coord;
        ordered.push(chosen);
    }

    Ok(ordered)
}

/// Re-orders `units` by nearest-neighbor from `origin` and applies 2-opt —
/// the standard "re-cost a route after a structural change" step shared by
/// both strategies' inter-route phases (spec.md §4.4 Phase D, §4.5 Phase C).
pub fn rebuild_route(
    units: Vec<RouteUnit>,
    origin: Coordinate,
    table: &DistanceTable,
) -> Result<Vec<RouteUnit>, RoutingError> {
    let mut ordered = nearest_neighbor_order(units, origin, table)?;
    two_opt(&mut ordered, origin, table)?;
    Ok(ordered)
}

/// Walks a driver's units from `origin`, accumulating leg/cumulative
/// distance and duration, then appends the leg to `terminus` (spec.md
/// §4.2, "Route recompute"). Empty routes produce all-zero totals.
pub fn recompute_route(
    driver: Driver,
    units: &[RouteUnit],
    mode: RouteMode,
    origin: Coordinate,
    terminus: Coordinate,
    table: &DistanceTable,
) -> Result<CalculatedRoute, RoutingError> {
    let baseline = table.seconds(origin, terminus)?;

    if units.is_empty() {
        let mut route = CalculatedRoute::empty(driver, mode);
        route.baseline_duration_seconds = baseline;
        route.route_duration_seconds = baseline;
        route.leg_to_terminus_meters = table.meters(origin, terminus)?;
        route.total_route_meters = route.leg_to_terminus_meters;
        return Ok(route);
    }

    let mut stops = Vec::with_capacity(units.iter().map(RouteUnit::len).sum());
    let mut cumulative_distance = 0.0;
    let mut cumulative_duration = 0.0;
    let mut prev_coord = origin;
    let mut order = 0usize;

    for unit in units {
        let (leg_m, leg_s) = table.get(prev_coord, unit.coord)?;
        // Household members share a coordinate: only the unit's first
        // member incurs the travel leg, the rest are zero-cost continuations
        // at the same point, preserving contiguity without double-counting
        // distance.
        for (member_idx, &participant_id) in unit.participant_ids.iter().enumerate() {
            let (dm, ds) = if member_idx == 0 { (leg_m, leg_s) } else { (0.0, 0.0) };
            cumulative_distance += dm;
            cumulative_duration += ds;
            stops.push(RouteStop {
                participant_id,
                order,
                distance_from_prev_meters: dm,
                duration_from_prev_seconds: ds,
                cumulative_distance_meters: cumulative_distance,
                cumulative_duration_seconds: cumulative_duration,
            });
            order += 1;
        }
        prev_coord = unit.coord;
    }

    let (leg_term_m, leg_term_s) = table.get(prev_coord, terminus)?;
    let total_dropoff = cumulative_distance;
    let total_route = total_dropoff + leg_term_m;
    let route_duration = cumulative_duration + leg_term_s;

    Ok(CalculatedRoute {
        driver,
        stops,
        mode,
        total_dropoff_meters: total_dropoff,
        leg_to_terminus_meters: leg_term_m,
        total_route_meters: total_route,
        baseline_duration_seconds: baseline,
        route_duration_seconds: route_duration,
    })
}

/// Re-costs a route from a plain ordered list of participant ids after a
/// session edit (spec.md §4.7: "re-costs both routes"). Looks up each
/// participant's coordinate via `coord_of`; each stop becomes its own unit
/// since household contiguity was already enforced when the route was
/// first built and edit operations only move whole stops.
pub fn recompute_route_for_order(
    driver: Driver,
    participant_order: &[ParticipantId],
    coord_of: impl Fn(ParticipantId) -> Option<Coordinate>,
    mode: RouteMode,
    activity_coord: Coordinate,
    table: &DistanceTable,
) -> Result<CalculatedRoute, RoutingError> {
    let mut units = Vec::with_capacity(participant_order.len());
    for &pid in participant_order {
        let coord = coord_of(pid).ok_or_else(|| {
            RoutingError::validation(format!("no coordinate on file for participant {pid}"))
        })?;
        units.push(RouteUnit {
            participant_ids: vec![pid],
            coord,
        });
    }
    let (origin, terminus) = route_endpoints(mode, activity_coord, driver.home_coord);
    recompute_route(driver, &units, mode, origin, terminus, table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DriverId, ParticipantId};

    fn coord(lat: f64, lng: f64) -> Coordinate {
        Coordinate::new(lat, lng)
    }

    #[test]
    fn household_units_group_by_coordinate_key() {
        let shared = coord(40.01, -74.01);
        let participants = vec![
            Participant::new(ParticipantId(1), "Alice", "addr", shared),
            Participant::new(ParticipantId(2), "Bob", "addr", shared),
            Participant::new(ParticipantId(3), "Eve", "addr", coord(40.03, -74.03)),
        ];
        let units = household_units(&participants);
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].participant_ids, vec![ParticipantId(1), ParticipantId(2)]);
        assert_eq!(units[1].participant_ids, vec![ParticipantId(3)]);
    }

    #[test]
    fn split_oversized_unit_keeps_remainder_together() {
        let unit = RouteUnit {
            participant_ids: (1..=4).map(ParticipantId).collect(),
            coord: coord(0.0, 0.0),
        };
        let split = split_oversized_units(vec![unit], 3);
        assert_eq!(split.len(), 2);
        assert_eq!(split[0].len(), 3);
        assert_eq!(split[1].len(), 1);
    }

    #[test]
    fn route_endpoints_follow_mode() {
        let activity = coord(1.0, 1.0);
        let home = coord(2.0, 2.0);
        assert_eq!(
            route_endpoints(RouteMode::Dropoff, activity, home),
            (activity, home)
        );
        assert_eq!(
            route_endpoints(RouteMode::Pickup, activity, home),
            (home, activity)
        );
    }

    fn driver() -> Driver {
        Driver::new(DriverId(1), "D1", coord(0.0, 0.0), 4)
    }

    #[tokio::test]
    async fn recompute_empty_route_is_all_zero() {
        let table = crate::distance::cache::tests_support::euclidean_table(&[]).await;
        let route = recompute_route(
            driver(),
            &[],
            RouteMode::Dropoff,
            coord(0.0, 0.0),
            coord(1.0, 1.0),
            &table,
        )
        .unwrap();
        assert_eq!(route.total_dropoff_meters, 0.0);
        assert!(route.total_route_meters > 0.0); // leg to terminus still counted
    }

    fn unit(id: u64, lat: f64) -> RouteUnit {
        RouteUnit {
            participant_ids: vec![ParticipantId(id)],
            coord: coord(lat, 0.0),
        }
    }

    /// spec.md §8 law: any 2-opt pass on a finite route halts. A route that
    /// admits no improving reversal must return with zero reversals applied.
    #[tokio::test]
    async fn two_opt_terminates_on_already_optimal_route() {
        let origin = coord(0.0, 0.0);
        let table = crate::distance::cache::tests_support::euclidean_table(&[
            origin,
            coord(0.01, 0.0),
            coord(0.02, 0.0),
            coord(0.03, 0.0),
        ])
        .await;
        let mut units = vec![unit(1, 0.01), unit(2, 0.02), unit(3, 0.03)];
        let before = units.iter().map(|u| u.coord.lat).collect::<Vec<_>>();

        two_opt(&mut units, origin, &table).unwrap();

        let after = units.iter().map(|u| u.coord.lat).collect::<Vec<_>>();
        assert_eq!(before, after); // already ascending-by-distance, no reversal improves it
    }

    /// spec.md §8 law: 2-opt halts after improving a crossing route, and the
    /// committed order strictly reduces dropoff distance.
    #[tokio::test]
    async fn two_opt_uncrosses_and_improves() {
        let origin = coord(0.0, 0.0);
        let table = crate::distance::cache::tests_support::euclidean_table(&[
            origin,
            coord(0.01, 0.0),
            coord(0.02, 0.0),
            coord(0.03, 0.0),
        ])
        .await;
        let mut units = vec![unit(1, 0.03), unit(2, 0.01), unit(3, 0.02)];
        let before_cost = dropoff_distance(&units, origin, &table).unwrap();

        two_opt(&mut units, origin, &table).unwrap();

        let after_cost = dropoff_distance(&units, origin, &table).unwrap();
        assert!(after_cost < before_cost);
        // Iterating to a fixed point reaches the global optimum here:
        // ascending order by distance from `origin`.
        let after_lats: Vec<f64> = units.iter().map(|u| u.coord.lat).collect();
        assert_eq!(after_lats, vec![0.01, 0.02, 0.03]);
    }
}
