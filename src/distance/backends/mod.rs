pub mod google;
pub mod osrm;

pub use google::GoogleDistanceBackend;
pub use osrm::OsrmDistanceBackend;
