pub mod http;
pub mod provider;

pub use http::HttpGeocodingProvider;
pub use provider::GeocodingProvider;
