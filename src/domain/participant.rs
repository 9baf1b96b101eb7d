use serde::{Deserialize, Serialize};

use super::coordinate::Coordinate;
use super::ids::ParticipantId;

/// A participant to be delivered to, or picked up from, a home address.
/// Address text is opaque to the routing core — it is display-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    pub id: ParticipantId,
    pub display_name: String,
    pub home_address: String,
    pub home_coord: Coordinate,
}

impl Participant {
    pub fn new(
        id: ParticipantId,
        display_name: impl Into<String>,
        home_address: impl Into<String>,
        home_coord: Coordinate,
    ) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            home_address: home_address.into(),
            home_coord,
        }
    }
}
