//! Forward geocoding through the OpenCage API.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, error};

use crate::Coordinate;

// ---

#[derive(Debug, Error)]
pub enum GeocodeError {
    // ---
    #[error("geocoding request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("geocoder returned {status}: {message}")]
    Status { status: StatusCode, message: String },
}

/// One candidate returned by the geocoder.
#[derive(Debug, Clone, PartialEq)]
pub struct GeocodeMatch {
    // ---
    /// Canonical address as formatted by the provider.
    pub formatted: String,
    pub coordinate: Coordinate,
}

/// Resolves free text to candidate coordinates, best match first.
#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn geocode(&self, query: &str) -> Result<Vec<GeocodeMatch>, GeocodeError>;
}

#[derive(Debug, Deserialize)]
struct OpenCageResponse {
    #[serde(default)]
    results: Vec<OpenCageResult>,
}

#[derive(Debug, Deserialize)]
struct OpenCageResult {
    formatted: String,
    geometry: OpenCageGeometry,
}

#[derive(Debug, Deserialize)]
struct OpenCageGeometry {
    lat: f64,
    lng: f64,
}

#[derive(Debug, Default, Deserialize)]
struct OpenCageStatusBody {
    #[serde(default)]
    status: OpenCageStatus,
}

#[derive(Debug, Default, Deserialize)]
struct OpenCageStatus {
    #[serde(default)]
    message: String,
}

/// OpenCage geocoder; opens a new HTTP client for every lookup.
#[derive(Debug, Clone)]
pub struct OpenCageGeocoder {
    // ---
    url: String,
    api_key: String,
}

impl OpenCageGeocoder {
    pub fn new(url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl Geocoder for OpenCageGeocoder {
    async fn geocode(&self, query: &str) -> Result<Vec<GeocodeMatch>, GeocodeError> {
        // ---
        debug!(%query, "geocoding");

        let client = Client::new();
        let response = client
            .get(&self.url)
            .query(&[
                ("q", query),
                ("key", self.api_key.as_str()),
                ("limit", "1"),
                ("no_annotations", "1"),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            // OpenCage explains quota and key problems in `status.message`.
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<OpenCageStatusBody>(&text)
                .map(|b| b.status.message)
                .ok()
                .filter(|m| !m.is_empty())
                .unwrap_or(text);
            error!(%status, %message, "geocoding failed");
            return Err(GeocodeError::Status { status, message });
        }

        let body: OpenCageResponse = response.json().await?;
        let matches = body
            .results
            .into_iter()
            .map(|r| GeocodeMatch {
                formatted: r.formatted,
                coordinate: Coordinate::new(r.geometry.lat, r.geometry.lng),
            })
            .collect::<Vec<_>>();

        debug!(candidates = matches.len(), best = ?matches.first(), "geocoded");
        Ok(matches)
    }
}
