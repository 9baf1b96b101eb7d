use reqwest::Client;
use serde::Deserialize;
use tracing::error;

use crate::cancellation::CancellationToken;
use crate::distance::backend::{DistanceFuture, RawDistanceBackend};
use crate::domain::Coordinate;
use crate::errors::RoutingError;

/// Google Distance Matrix adapter for a single ordered pair, grounded on
/// the teacher's `distance/providers/google.rs::get_google_single_dm`.
pub struct GoogleDistanceBackend {
    api_key: String,
    client: Client,
}

impl GoogleDistanceBackend {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            client: Client::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct DistanceMatrixResponse {
    rows: Vec<Row>,
}

#[derive(Debug, Deserialize)]
struct Row {
    elements: Vec<Element>,
}

#[derive(Debug, Deserialize)]
struct Element {
    distance: Option<ValueField>,
    duration: Option<ValueField>,
}

#[derive(Debug, Deserialize)]
struct ValueField {
    value: f64,
}

impl RawDistanceBackend for GoogleDistanceBackend {
    fn resolve<'a>(
        &'a self,
        origin: Coordinate,
        destination: Coordinate,
        cancel: &'a CancellationToken,
    ) -> DistanceFuture<'a> {
        Box::pin(async move {
            cancel.check()?;

            let base_url = "https://maps.googleapis.com/maps/api/distancematrix/json";
            let url = format!(
                "{}?origins={},{}&destinations={},{}&key={}",
                base_url, origin.lat, origin.lng, destination.lat, destination.lng, self.api_key
            );

            let response = self
                .client
                .get(&url)
                .send()
                .await
                .map_err(|e| RoutingError::DistanceUnavailable {
                    origin_key: origin.key().as_str().to_string(),
                    dest_key: destination.key().as_str().to_string(),
                    reason: format!("google distance matrix request failed: {e}"),
                })?
                .json::<DistanceMatrixResponse>()
                .await
                .map_err(|e| RoutingError::DistanceUnavailable {
                    origin_key: origin.key().as_str().to_string(),
                    dest_key: destination.key().as_str().to_string(),
                    reason: format!("google distance matrix response malformed: {e}"),
                })?;

            let element = response
                .rows
                .first()
                .and_then(|r| r.elements.first());

            match element {
                Some(Element {
                    distance: Some(d),
                    duration: Some(t),
                }) => Ok((d.value, t.value)),
                _ => {
                    error!("google distance matrix returned no usable element");
                    Err(RoutingError::DistanceUnavailable {
                        origin_key: origin.key().as_str().to_string(),
                        dest_key: destination.key().as_str().to_string(),
                        reason: "no distance/duration element in response".to_string(),
                    })
                }
            }
        })
    }
}
