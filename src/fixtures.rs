use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::info;

use crate::domain::{ActivityLocation, Coordinate, Driver, DriverId, LocationId, Participant, ParticipantId};

/// Generates synthetic participants, drivers, and an activity location for
/// tests and the demo binary. Mirrors the teacher's `fixtures::data_generator`
/// pattern (`ChaCha8Rng` seeded from a fixed constant, locations scattered
/// around a central point) generalized from postal codes to lat/lng pairs.
const DEFAULT_SEED: u64 = 42;

/// Roughly a 0.1-degree box around `center`, about 10km on a side at
/// mid-latitudes — close enough for household grouping and capacity tests
/// without needing real road geometry.
fn random_coord_near(rng: &mut ChaCha8Rng, center: Coordinate) -> Coordinate {
    let dlat = rng.gen_range(-0.05..=0.05);
    let dlng = rng.gen_range(-0.05..=0.05);
    Coordinate::new(center.lat + dlat, center.lng + dlng)
}

/// A single fixed activity location, the office used by the teacher's own
/// examples (`1.3521, 103.8198` is central Singapore).
pub fn sample_activity_location() -> ActivityLocation {
    ActivityLocation {
        id: LocationId(1),
        name: "HQ".into(),
        coord: Coordinate::new(1.3521, 103.8198),
    }
}

/// Generates `count` participants scattered around `center`, using `seed`
/// for reproducibility (falls back to `DEFAULT_SEED`). A `household_size`
/// greater than 1 makes every `household_size`-th participant share the
/// previous one's coordinate, exercising household grouping.
pub fn generate_participants(
    count: usize,
    center: Coordinate,
    household_size: usize,
    seed: Option<u64>,
) -> Vec<Participant> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed.unwrap_or(DEFAULT_SEED));
    let household_size = household_size.max(1);
    let mut participants = Vec::with_capacity(count);
    let mut last_coord = center;

    for i in 0..count {
        let coord = if household_size > 1 && i % household_size != 0 {
            last_coord
        } else {
            let c = random_coord_near(&mut rng, center);
            last_coord = c;
            c
        };
        participants.push(Participant::new(
            ParticipantId(i as u64 + 1),
            format!("Participant {}", i + 1),
            format!("{:.5},{:.5}", coord.lat, coord.lng),
            coord,
        ));
    }

    info!("Generated {} synthetic participants", participants.len());
    participants
}

/// Generates `count` drivers scattered around `center`, each with
/// `capacity` seats, using `seed` for reproducibility.
pub fn generate_drivers(count: usize, center: Coordinate, capacity: u32, seed: Option<u64>) -> Vec<Driver> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed.unwrap_or(DEFAULT_SEED).wrapping_add(1));
    let drivers: Vec<Driver> = (0..count)
        .map(|i| {
            let coord = random_coord_near(&mut rng, center);
            Driver::new(DriverId(i as u64 + 1), format!("Driver {}", i + 1), coord, capacity)
        })
        .collect();

    info!("Generated {} synthetic drivers", drivers.len());
    drivers
}
