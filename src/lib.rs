pub mod cancellation;
pub mod config;
pub mod distance;
pub mod domain;
pub mod errors;
pub mod fixtures;
pub mod geocoding;
pub mod repository;
pub mod routing;
pub mod session;

pub use cancellation::CancellationToken;
pub use config::RoutingConfig;
pub use distance::DistanceProvider;
pub use errors::{RepositoryError, RoutingError, SessionStoreError};
pub use routing::{calculate, SolverInput, SolverOutput, Strategy};
pub use session::{SessionId, SessionState, SessionStore};
