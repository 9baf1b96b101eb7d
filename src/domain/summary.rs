use serde::{Deserialize, Serialize};

use super::ids::ParticipantId;
use super::route::CalculatedRoute;

/// Totals over all routes in a solution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoutingSummary {
    pub participants_assigned: usize,
    pub drivers_used: usize,
    pub total_dropoff_meters: f64,
    pub total_route_meters: f64,
    pub max_detour_seconds: f64,
    pub sum_detour_seconds: f64,
    pub average_detour_seconds: f64,
    pub unassigned_participant_ids: Vec<ParticipantId>,
}

impl RoutingSummary {
    /// Rolls up totals from a list of routes. Routes with zero stops are
    /// excluded from `drivers_used` but still contribute (zero) to totals.
    pub fn from_routes(routes: &[CalculatedRoute], unassigned: Vec<ParticipantId>) -> Self {
        let used: Vec<&CalculatedRoute> = routes.iter().filter(|r| !r.stops.is_empty()).collect();

        let participants_assigned: usize = used.iter().map(|r| r.stops.len()).sum();
        let total_dropoff_meters: f64 = used.iter().map(|r| r.total_dropoff_meters).sum();
        let total_route_meters: f64 = used.iter().map(|r| r.total_route_meters).sum();
        let detours: Vec<f64> = used.iter().map(|r| r.detour_seconds()).collect();
        let max_detour_seconds = if detours.is_empty() {
            0.0
        } else {
            detours.iter().cloned().fold(f64::NEG_INFINITY, f64::max)
        };
        let sum_detour_seconds: f64 = detours.iter().sum();
        let average_detour_seconds = if detours.is_empty() {
            0.0
        } else {
            sum_detour_seconds / detours.len() as f64
        };

        Self {
            participants_assigned,
            drivers_used: used.len(),
            total_dropoff_meters,
            total_route_meters,
            max_detour_seconds,
            sum_detour_seconds,
            average_detour_seconds,
            unassigned_participant_ids: unassigned,
        }
    }
}
