use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, RwLock};

use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::domain::{ActivityLocation, CalculatedRoute, Driver, Participant, RouteMode, RoutingSummary};
use crate::errors::SessionStoreError;

/// A fresh 128-bit session id, hex-encoded (spec.md §4.7). No `uuid`
/// dependency: 16 random bytes from the same `rand` crate already in use
/// elsewhere in the core are sufficient and keep the dependency stack
/// unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    fn new_random() -> Self {
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes.iter().map(|b| format!("{b:02x}")).collect())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An interactive edit session: the routes produced by one `calculate()`
/// call, kept alive so a caller can move participants between routes,
/// swap drivers, or add a driver, without re-running the solver (spec.md
/// §4.7). `participants` carries the coordinate each route's stops
/// reference by id, needed to re-cost a route after an edit.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub id: SessionId,
    pub activity_location: ActivityLocation,
    pub selected_drivers: Vec<Driver>,
    pub participants: Vec<Participant>,
    pub mode: RouteMode,
    pub use_miles: bool,
    pub original: Vec<CalculatedRoute>,
    pub current: Vec<CalculatedRoute>,
    pub summary: RoutingSummary,
}

impl SessionState {
    pub fn recompute_summary(&mut self) {
        self.summary = RoutingSummary::from_routes(&self.current, Vec::new());
    }

    pub fn coord_of(&self, id: crate::domain::ParticipantId) -> Option<crate::domain::Coordinate> {
        crate::domain::find_participant(&self.participants, id).map(|p| p.home_coord)
    }
}

/// Process-wide session map: an outer read-write lock plus a per-session
/// mutex, so edits to distinct sessions never contend with each other
/// (spec.md §5).
#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<SessionId, Arc<Mutex<SessionState>>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deep-copies `routes` twice (`original`, `current`) and stores a
    /// fresh session (spec.md §4.7, "Create").
    pub fn create(
        &self,
        routes: Vec<CalculatedRoute>,
        selected_drivers: Vec<Driver>,
        participants: Vec<Participant>,
        activity_location: ActivityLocation,
        use_miles: bool,
        mode: RouteMode,
    ) -> SessionId {
        let id = SessionId::new_random();
        let summary = RoutingSummary::from_routes(&routes, Vec::new());
        let state = SessionState {
            id: id.clone(),
            activity_location,
            selected_drivers,
            participants,
            mode,
            use_miles,
            original: routes.clone(),
            current: routes,
            summary,
        };
        self.sessions
            .write()
            .expect("session store lock poisoned")
            .insert(id.clone(), Arc::new(Mutex::new(state)));
        id
    }

    /// Returns a snapshot of the session's current state, or `None`
    /// (spec.md §4.7, "Get").
    pub fn get(&self, id: &SessionId) -> Option<SessionState> {
        let guard = self.sessions.read().expect("session store lock poisoned");
        guard.get(id).map(|s| s.lock().expect("session lock poisoned").clone())
    }

    /// Runs `mutator` against the session under its own lock (spec.md §4.7,
    /// "Update"). Returns `SessionStoreError::NotFound` for an unknown id;
    /// any error the mutator returns leaves the session unchanged from the
    /// caller's perspective since the mutator is expected to validate before
    /// mutating in place.
    pub fn update<F>(&self, id: &SessionId, mutator: F) -> Result<(), SessionStoreError>
    where
        F: FnOnce(&mut SessionState) -> Result<(), SessionStoreError>,
    {
        let handle = {
            let guard = self.sessions.read().expect("session store lock poisoned");
            guard.get(id).cloned()
        };
        match handle {
            None => Err(SessionStoreError::NotFound(id.0.clone())),
            Some(session) => {
                let mut state = session.lock().expect("session lock poisoned");
                mutator(&mut state)
            }
        }
    }

    /// Removes the session (spec.md §4.7, "Delete").
    pub fn delete(&self, id: &SessionId) -> bool {
        self.sessions
            .write()
            .expect("session store lock poisoned")
            .remove(id)
            .is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DriverId, LocationId};

    fn activity() -> ActivityLocation {
        ActivityLocation {
            id: LocationId(1),
            name: "HQ".into(),
            coord: crate::domain::Coordinate::new(0.0, 0.0),
        }
    }

    #[test]
    fn create_then_get_round_trips() {
        let store = SessionStore::new();
        let driver = Driver::new(DriverId(1), "D1", crate::domain::Coordinate::new(1.0, 1.0), 4);
        let route = CalculatedRoute::empty(driver.clone(), RouteMode::Dropoff);
        let id = store.create(vec![route], vec![driver], vec![], activity(), false, RouteMode::Dropoff);

        let snapshot = store.get(&id).expect("session exists");
        assert_eq!(snapshot.id, id);
        assert_eq!(snapshot.current.len(), 1);
    }

    #[test]
    fn update_unknown_id_fails() {
        let store = SessionStore::new();
        let unknown = SessionId("deadbeef".into());
        let result = store.update(&unknown, |_| Ok(()));
        assert!(matches!(result, Err(SessionStoreError::NotFound(_))));
    }

    #[test]
    fn delete_removes_session() {
        let store = SessionStore::new();
        let driver = Driver::new(DriverId(1), "D1", crate::domain::Coordinate::new(1.0, 1.0), 4);
        let route = CalculatedRoute::empty(driver.clone(), RouteMode::Dropoff);
        let id = store.create(vec![route], vec![driver], vec![], activity(), false, RouteMode::Dropoff);
        assert!(store.delete(&id));
        assert!(store.get(&id).is_none());
    }
}
