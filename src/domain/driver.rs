use serde::{Deserialize, Serialize};

use super::coordinate::Coordinate;
use super::ids::DriverId;

/// A driver with a home address and vehicle capacity. `capacity` may be
/// raised by an organization-vehicle substitution before a calculation;
/// the core only ever sees the resulting `effective_capacity`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Driver {
    pub id: DriverId,
    pub display_name: String,
    pub home_coord: Coordinate,
    pub capacity: u32,
}

impl Driver {
    pub fn new(
        id: DriverId,
        display_name: impl Into<String>,
        home_coord: Coordinate,
        capacity: u32,
    ) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            home_coord,
            capacity,
        }
    }
}

/// The single shared endpoint of a calculation: origin in dropoff mode,
/// terminus in pickup mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityLocation {
    pub id: super::ids::LocationId,
    pub name: String,
    pub coord: Coordinate,
}
