//! Driving-route distances for map tasks via a distance matrix API.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::config::ClientConfig;
use crate::geo::Coordinates;
use crate::types::{WowfyError, WowfyResult};

const DISTANCE_MATRIX: &str = "distancematrix";

/// Route distance between two points, in meters
#[async_trait]
pub trait RouteDistance: Send + Sync {
    async fn route_distance_m(
        &self,
        origin: Coordinates,
        destination: Coordinates,
    ) -> WowfyResult<f64>;
}

/// Distance matrix client in driving mode
pub struct DistanceMatrixClient {
    client: reqwest::Client,
    url: String,
    api_key: String,
}

impl DistanceMatrixClient {
    pub fn new(url: impl Into<String>, api_key: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            url: url.into(),
            api_key: api_key.into(),
        }
    }

    /// None when no API key is configured
    pub fn from_config(config: &ClientConfig) -> Option<Self> {
        config.distance_matrix_api_key.as_ref().map(|key| {
            Self::new(
                config.distance_matrix_url.clone(),
                key.clone(),
                Duration::from_secs(config.http_timeout_secs),
            )
        })
    }
}

#[async_trait]
impl RouteDistance for DistanceMatrixClient {
    async fn route_distance_m(
        &self,
        origin: Coordinates,
        destination: Coordinates,
    ) -> WowfyResult<f64> {
        let response = self
            .client
            .get(&self.url)
            .query(&[
                ("origins", origin.as_query()),
                ("destinations", destination.as_query()),
                ("mode", "driving".to_string()),
                ("key", self.api_key.clone()),
            ])
            .send()
            .await
            .map_err(|e| WowfyError::Network(format!("{}: {}", DISTANCE_MATRIX, e)))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(WowfyError::Server {
                endpoint: DISTANCE_MATRIX.to_string(),
                message: format!("HTTP {}", status),
            });
        }

        let matrix: MatrixResponse =
            response
                .json()
                .await
                .map_err(|e| WowfyError::MalformedResponse {
                    endpoint: DISTANCE_MATRIX.to_string(),
                    detail: e.to_string(),
                })?;

        let meters = matrix.first_distance_m()?;
        debug!("Route distance {} -> {}: {} m", origin.as_query(), destination.as_query(), meters);
        Ok(meters)
    }
}

// ============================================================================
// Distance Matrix API Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct MatrixResponse {
    status: String,
    #[serde(default)]
    rows: Vec<MatrixRow>,
}

#[derive(Debug, Deserialize)]
struct MatrixRow {
    #[serde(default)]
    elements: Vec<MatrixElement>,
}

#[derive(Debug, Deserialize)]
struct MatrixElement {
    status: String,
    distance: Option<MatrixValue>,
}

#[derive(Debug, Deserialize)]
struct MatrixValue {
    value: f64,
}

impl MatrixResponse {
    fn first_distance_m(&self) -> WowfyResult<f64> {
        if self.status != "OK" {
            return Err(WowfyError::Server {
                endpoint: DISTANCE_MATRIX.to_string(),
                message: self.status.clone(),
            });
        }

        let element = self
            .rows
            .first()
            .and_then(|row| row.elements.first())
            .ok_or_else(|| WowfyError::MalformedResponse {
                endpoint: DISTANCE_MATRIX.to_string(),
                detail: "empty matrix".to_string(),
            })?;

        if element.status != "OK" {
            return Err(WowfyError::NotFound(format!("route: {}", element.status)));
        }

        element
            .distance
            .as_ref()
            .map(|d| d.value)
            .ok_or_else(|| WowfyError::MalformedResponse {
                endpoint: DISTANCE_MATRIX.to_string(),
                detail: "element without distance".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn point(lat: f64, lng: f64) -> Coordinates {
        Coordinates::new(lat, lng).unwrap()
    }

    #[tokio::test]
    async fn test_route_distance() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("mode", "driving"))
            .and(query_param("key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "OK",
                "rows": [{ "elements": [{
                    "status": "OK",
                    "distance": { "value": 1234, "text": "1.2 km" }
                }]}]
            })))
            .mount(&server)
            .await;

        let client = DistanceMatrixClient::new(server.uri(), "test-key", Duration::from_secs(5));
        let meters = client
            .route_distance_m(point(18.52, 73.85), point(18.53, 73.86))
            .await
            .unwrap();
        assert_eq!(meters, 1234.0);
    }

    #[tokio::test]
    async fn test_no_route() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "OK",
                "rows": [{ "elements": [{ "status": "ZERO_RESULTS" }]}]
            })))
            .mount(&server)
            .await;

        let client = DistanceMatrixClient::new(server.uri(), "k", Duration::from_secs(5));
        let err = client
            .route_distance_m(point(0.0, 0.0), point(0.0, 1.0))
            .await
            .unwrap_err();
        assert!(matches!(err, WowfyError::NotFound(_)));
    }

    #[test]
    fn test_request_denied_status() {
        let matrix: MatrixResponse =
            serde_json::from_value(json!({ "status": "REQUEST_DENIED", "rows": [] })).unwrap();
        assert!(matches!(matrix.first_distance_m(), Err(WowfyError::Server { .. })));
    }

    #[test]
    fn test_from_config_requires_key() {
        assert!(DistanceMatrixClient::from_config(&ClientConfig::default()).is_none());
        let config = ClientConfig {
            distance_matrix_api_key: Some("k".into()),
            ..Default::default()
        };
        assert!(DistanceMatrixClient::from_config(&config).is_some());
    }
}
