//! Places-search provider boundary. The production implementation talks to
//! the Google Places API (New) nearby-search endpoint; tests substitute
//! their own provider.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::AppError;
use crate::models::BarCandidate;

#[async_trait]
pub trait PlacesProvider: Send + Sync {
    /// Venues of type "bar" within `radius_meters` of the center. May return
    /// partial or stale business status; the ranker deals with that.
    async fn search_nearby(
        &self,
        latitude: f64,
        longitude: f64,
        radius_meters: f64,
    ) -> Result<Vec<BarCandidate>, AppError>;
}

const SEARCH_NEARBY_URL: &str = "https://places.googleapis.com/v1/places:searchNearby";
const FIELD_MASK: &str = "places.id,places.displayName,places.formattedAddress,\
places.location,places.rating,places.businessStatus,places.primaryType,places.types";
const MAX_RESULTS: u32 = 20;

pub struct GooglePlacesClient {
    http: reqwest::Client,
    api_key: String,
}

impl GooglePlacesClient {
    pub fn new(api_key: String) -> Self {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self { http, api_key }
    }
}

#[derive(Debug, Deserialize)]
struct SearchNearbyResponse {
    #[serde(default)]
    places: Vec<Place>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Place {
    id: String,
    display_name: Option<LocalizedText>,
    formatted_address: Option<String>,
    location: Option<LatLng>,
    rating: Option<f64>,
    business_status: Option<String>,
    primary_type: Option<String>,
    #[serde(default)]
    types: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct LocalizedText {
    text: String,
}

#[derive(Debug, Deserialize)]
struct LatLng {
    latitude: f64,
    longitude: f64,
}

impl From<Place> for BarCandidate {
    fn from(place: Place) -> Self {
        let (latitude, longitude) = place
            .location
            .map(|l| (l.latitude, l.longitude))
            .unwrap_or((0.0, 0.0));
        BarCandidate {
            name: place
                .display_name
                .map(|n| n.text)
                .unwrap_or_else(|| place.id.clone()),
            formatted_address: place.formatted_address.unwrap_or_default(),
            latitude,
            longitude,
            rating: place.rating,
            business_status: place.business_status,
            primary_type: place.primary_type,
            types: place.types,
            place_id: place.id,
        }
    }
}

#[async_trait]
impl PlacesProvider for GooglePlacesClient {
    async fn search_nearby(
        &self,
        latitude: f64,
        longitude: f64,
        radius_meters: f64,
    ) -> Result<Vec<BarCandidate>, AppError> {
        let body = json!({
            "includedTypes": ["bar"],
            "maxResultCount": MAX_RESULTS,
            "locationRestriction": {
                "circle": {
                    "center": { "latitude": latitude, "longitude": longitude },
                    "radius": radius_meters,
                }
            }
        });

        let response = self
            .http
            .post(SEARCH_NEARBY_URL)
            .header("X-Goog-Api-Key", &self.api_key)
            .header("X-Goog-FieldMask", FIELD_MASK)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json::<SearchNearbyResponse>()
            .await?;

        tracing::debug!(
            count = response.places.len(),
            latitude,
            longitude,
            radius_meters,
            "nearby search returned candidates"
        );

        Ok(response.places.into_iter().map(BarCandidate::from).collect())
    }
}
