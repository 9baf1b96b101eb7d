pub mod backend;
pub mod backends;
pub mod cache;
pub mod persistence;

pub use backend::{DistanceFuture, RawDistanceBackend};
pub use cache::DistanceProvider;
