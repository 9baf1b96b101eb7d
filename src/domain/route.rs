use serde::{Deserialize, Serialize};

use super::driver::Driver;
use super::ids::ParticipantId;
use super::participant::Participant;

/// Determines route origin and terminus (spec.md §4.3). The entire routing
/// engine is mode-parametric: no other code path branches on mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RouteMode {
    Pickup,
    Dropoff,
}

impl RouteMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteMode::Pickup => "pickup",
            RouteMode::Dropoff => "dropoff",
        }
    }
}

/// A participant placed within a route, plus per-leg and cumulative
/// distance/duration bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteStop {
    pub participant_id: ParticipantId,
    pub order: usize,
    pub distance_from_prev_meters: f64,
    pub duration_from_prev_seconds: f64,
    pub cumulative_distance_meters: f64,
    pub cumulative_duration_seconds: f64,
}

/// A driver, an ordered sequence of stops, and the route's cost summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalculatedRoute {
    pub driver: Driver,
    pub stops: Vec<RouteStop>,
    pub mode: RouteMode,
    pub total_dropoff_meters: f64,
    pub leg_to_terminus_meters: f64,
    pub total_route_meters: f64,
    pub baseline_duration_seconds: f64,
    pub route_duration_seconds: f64,
}

impl CalculatedRoute {
    pub fn empty(driver: Driver, mode: RouteMode) -> Self {
        Self {
            driver,
            stops: Vec::new(),
            mode,
            total_dropoff_meters: 0.0,
            leg_to_terminus_meters: 0.0,
            total_route_meters: 0.0,
            baseline_duration_seconds: 0.0,
            route_duration_seconds: 0.0,
        }
    }

    pub fn detour_seconds(&self) -> f64 {
        self.route_duration_seconds - self.baseline_duration_seconds
    }

    pub fn participant_ids(&self) -> Vec<ParticipantId> {
        self.stops.iter().map(|s| s.participant_id).collect()
    }

    /// `distance_to_driver_home` in dropoff mode: the same field as
    /// `leg_to_terminus_meters`, named per spec.md §4.6 for pickup-mode
    /// symmetry where the terminus is the activity location.
    pub fn distance_to_driver_home_meters(&self) -> f64 {
        match self.mode {
            RouteMode::Dropoff => self.leg_to_terminus_meters,
            RouteMode::Pickup => self.leg_to_terminus_meters,
        }
    }
}

/// Given a `Participant` lookup, resolve which participant a given
/// `Driver`'s household members are (used by callers building result
/// views); kept free of any global state.
pub fn find_participant<'a>(
    participants: &'a [Participant],
    id: ParticipantId,
) -> Option<&'a Participant> {
    participants.iter().find(|p| p.id == id)
}
