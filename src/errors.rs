use thiserror::Error;

use crate::domain::ParticipantId;

/// Stable error taxonomy surfaced to callers (spec.md §7). Every variant
/// carries a human-readable reason and, where available, the structured
/// context fields spec.md names.
#[derive(Debug, Error)]
pub enum RoutingError {
    #[error("capacity shortage: {unassigned} of {total_participants} participants unassigned ({total_capacity} total seats)")]
    CapacityShortage {
        unassigned: usize,
        total_capacity: u64,
        total_participants: usize,
    },

    #[error("no drivers available for {participant_count} participants")]
    NoDrivers { participant_count: usize },

    #[error("distance unavailable for ({origin_key}, {dest_key}): {reason}")]
    DistanceUnavailable {
        origin_key: String,
        dest_key: String,
        reason: String,
    },

    #[error("geocoding failed for '{address}': {reason}")]
    GeocodingFailed { address: String, reason: String },

    #[error("session not found: {session_id}")]
    SessionNotFound { session_id: String },

    #[error("validation failed: {message}")]
    ValidationFailed { message: String },

    #[error("operation cancelled")]
    Cancelled,
}

impl RoutingError {
    pub fn validation(message: impl Into<String>) -> Self {
        RoutingError::ValidationFailed {
            message: message.into(),
        }
    }
}

/// Errors from the edit-session store that are not already covered by
/// `RoutingError` variants; `session` operations convert these via `From`.
#[derive(Debug, Error)]
pub enum SessionStoreError {
    #[error("session not found: {0}")]
    NotFound(String),
    #[error("{0}")]
    Validation(String),
}

impl From<SessionStoreError> for RoutingError {
    fn from(e: SessionStoreError) -> Self {
        match e {
            SessionStoreError::NotFound(id) => RoutingError::SessionNotFound { session_id: id },
            SessionStoreError::Validation(message) => RoutingError::ValidationFailed { message },
        }
    }
}

/// Errors surfaced by the (out-of-scope) persistent repositories the core
/// only defines the interface for; kept distinct from `RoutingError` so a
/// caller can tell "not found" apart from every other failure mode.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("not found")]
    NotFound,
    #[error("repository error: {0}")]
    Other(String),
}

/// Helper for building a `CapacityShortage` error from an unassigned set.
pub fn capacity_shortage(
    unassigned: &[ParticipantId],
    total_capacity: u64,
    total_participants: usize,
) -> RoutingError {
    RoutingError::CapacityShortage {
        unassigned: unassigned.len(),
        total_capacity,
        total_participants,
    }
}
