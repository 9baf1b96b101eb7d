use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::cancellation::CancellationToken;
use crate::domain::{ActivityLocation, Driver, DriverId, Participant};
use crate::errors::RepositoryError;

pub type RepoFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, RepositoryError>> + Send + 'a>>;

/// Generic persistence interface the core only defines — it never ships a
/// concrete implementation (spec.md §6: "repositories for participants,
/// drivers, organization-vehicles, activity-locations, settings, events,
/// distance-cache entries... a not-found sentinel distinct from other
/// errors"). One generic trait covers all seven entity kinds below.
pub trait Repository<T: Send + Sync + 'static>: Send + Sync {
    fn list<'a>(&'a self, cancel: &'a CancellationToken) -> RepoFuture<'a, Vec<T>>;
    fn get<'a>(&'a self, id: u64, cancel: &'a CancellationToken) -> RepoFuture<'a, T>;
    fn create<'a>(&'a self, item: T, cancel: &'a CancellationToken) -> RepoFuture<'a, T>;
    fn update<'a>(&'a self, id: u64, item: T, cancel: &'a CancellationToken) -> RepoFuture<'a, T>;
    fn delete<'a>(&'a self, id: u64, cancel: &'a CancellationToken) -> RepoFuture<'a, ()>;
}

/// An organization-owned vehicle that may raise a driver's effective
/// capacity for a single calculation (spec.md §6, "organization vehicle
/// substitution"). The core never applies this itself — the caller resolves
/// the substitution and passes the adjusted `Driver::capacity` in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrganizationVehicle {
    pub id: u64,
    pub driver_id: DriverId,
    pub capacity_override: u32,
}

/// An opaque per-organization setting (e.g. default strategy, unit
/// preference). The core treats values as opaque strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Setting {
    pub id: u64,
    pub key: String,
    pub value: String,
}

/// An audit-log entry for a session edit or calculation (e.g.
/// `"move_participant"`, `"calculate"`). `payload` is opaque, transport
/// and caller defined.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: u64,
    pub kind: String,
    pub payload: String,
}

/// A single resolved `(origin, destination) -> (meters, seconds)` row, as
/// persisted by `crate::distance::persistence` — exposed here as a
/// `Repository` entity for callers that want generic CRUD access to cache
/// contents rather than the specialized `DistanceProvider` API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistanceCacheEntry {
    pub id: u64,
    pub origin_lat: f64,
    pub origin_lng: f64,
    pub dest_lat: f64,
    pub dest_lng: f64,
    pub meters: f64,
    pub seconds: f64,
}

pub type ParticipantRepository = dyn Repository<Participant>;
pub type DriverRepository = dyn Repository<Driver>;
pub type OrganizationVehicleRepository = dyn Repository<OrganizationVehicle>;
pub type ActivityLocationRepository = dyn Repository<ActivityLocation>;
pub type SettingsRepository = dyn Repository<Setting>;
pub type EventRepository = dyn Repository<Event>;
pub type DistanceCacheEntryRepository = dyn Repository<DistanceCacheEntry>;
