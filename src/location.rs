//! Where the user is: the browser-reported position and the reverse
//! geocoding that turns it into a region label.

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::Client;
use serde::Deserialize;
use tracing::{info, warn};

use crate::error::LocationError;
use crate::models::{Coordinates, GeolocationReport};

/// Used when the geocoder could not be reached or answered garbage.
pub const UNRESOLVED_REGION: &str = "your amazing region";
/// Used when the geocoder answered but named no country, state or city.
pub const UNNAMED_REGION: &str = "your region";

#[async_trait]
pub trait CoordinateProvider: Send + Sync {
    async fn current_position(&self) -> Result<Coordinates, LocationError>;
}

#[async_trait]
pub trait RegionResolver: Send + Sync {
    /// Always returns a non-empty label.
    async fn resolve(&self, coords: Coordinates) -> String;
}

/// The geolocation outcome the browser posted for the next attempt. Each
/// attempt consumes it, so a retry needs a fresh report.
#[derive(Default)]
pub struct ReportedPosition {
    last: RwLock<Option<GeolocationReport>>,
}

impl ReportedPosition {
    pub fn new() -> Self { Self::default() }

    pub fn report(&self, report: GeolocationReport) {
        *self.last.write() = Some(report);
    }
}

#[async_trait]
impl CoordinateProvider for ReportedPosition {
    async fn current_position(&self) -> Result<Coordinates, LocationError> {
        let last = self.last.write().take();
        match last {
            Some(GeolocationReport::Position { latitude, longitude }) => {
                Coordinates::new(latitude, longitude).ok_or(LocationError::InvalidPosition)
            }
            Some(GeolocationReport::Error { code, message }) => Err(LocationError::Platform { code, message }),
            Some(GeolocationReport::Unsupported) => Err(LocationError::Unsupported),
            None => Err(LocationError::NotReported),
        }
    }
}

// --- Reverse geocoding ---

#[derive(Debug, Deserialize, Default)]
pub struct ReverseGeocodeResponse {
    #[serde(default)]
    pub address: Option<Address>,
}

#[derive(Debug, Deserialize, Default)]
pub struct Address {
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
}

/// Country, then state, then city; blank fields count as missing.
pub fn region_label(resp: &ReverseGeocodeResponse) -> String {
    let Some(address) = &resp.address else { return UNNAMED_REGION.to_string() };
    [&address.country, &address.state, &address.city]
        .into_iter()
        .flatten()
        .map(|s| s.trim())
        .find(|s| !s.is_empty())
        .unwrap_or(UNNAMED_REGION)
        .to_string()
}

pub struct NominatimResolver {
    client: Client,
    base_url: String,
}

impl NominatimResolver {
    pub fn new(base_url: impl Into<String>) -> Self {
        // Nominatim rejects requests without an identifying agent.
        let client = Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();
        Self { client, base_url: base_url.into().trim_end_matches('/').to_string() }
    }

    async fn lookup(&self, coords: Coordinates) -> Result<ReverseGeocodeResponse, String> {
        let url = format!("{}/reverse", self.base_url);
        let response = self.client
            .get(&url)
            .query(&[
                ("format", "jsonv2".to_string()),
                ("lat", coords.latitude.to_string()),
                ("lon", coords.longitude.to_string()),
            ])
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("status={status}"));
        }
        let body = response.text().await.map_err(|e| e.to_string())?;
        serde_json::from_str(&body).map_err(|e| format!("parse error: {e}"))
    }
}

#[async_trait]
impl RegionResolver for NominatimResolver {
    async fn resolve(&self, coords: Coordinates) -> String {
        match self.lookup(coords).await {
            Ok(resp) => {
                let label = region_label(&resp);
                info!("🗺️ Resolved ({:.4}, {:.4}) to '{}'", coords.latitude, coords.longitude, label);
                label
            }
            Err(e) => {
                warn!("⚠️ Reverse geocoding failed, using fallback region: {}", e);
                UNRESOLVED_REGION.to_string()
            }
        }
    }
}
