use crate::{checked_body, http_client, GatewayError};
use async_trait::async_trait;
use clinic_core::integrations::{GeoLocation, Geocoder};
use clinic_core::ClinicResult;
use serde::Deserialize;

const SERVICE: &str = "geocoding";
pub const DEFAULT_BASE_URL: &str = "https://maps.googleapis.com/maps/api/geocode/json";

/// Google Geocoding API client.
#[derive(Clone)]
pub struct GoogleGeocoder {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Deserialize)]
struct GeocodeResponse {
    status: String,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    results: Vec<GeocodeResult>,
}

#[derive(Deserialize)]
struct GeocodeResult {
    #[serde(default)]
    formatted_address: Option<String>,
    geometry: Geometry,
}

#[derive(Deserialize)]
struct Geometry {
    location: LatLng,
}

#[derive(Deserialize)]
struct LatLng {
    lat: f64,
    lng: f64,
}

impl GoogleGeocoder {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self, GatewayError> {
        Ok(Self {
            client: http_client()?,
            base_url: base_url.into(),
            api_key: api_key.into(),
        })
    }
}

/// Picks the first result; `ZERO_RESULTS` means the postal code is unknown.
fn decode_location(postal_code: &str, body: &str) -> Result<GeoLocation, GatewayError> {
    let response: GeocodeResponse =
        serde_json::from_str(body).map_err(|source| GatewayError::Decode {
            service: SERVICE,
            source,
        })?;

    match response.status.as_str() {
        "OK" => {}
        "ZERO_RESULTS" => return Err(GatewayError::UnknownPostalCode(postal_code.to_string())),
        other => {
            return Err(GatewayError::Rejected {
                service: SERVICE,
                message: response
                    .error_message
                    .unwrap_or_else(|| other.to_string()),
            })
        }
    }

    let first = response
        .results
        .into_iter()
        .next()
        .ok_or_else(|| GatewayError::UnknownPostalCode(postal_code.to_string()))?;

    Ok(GeoLocation {
        postal_code: postal_code.to_string(),
        latitude: first.geometry.location.lat,
        longitude: first.geometry.location.lng,
        formatted_address: first.formatted_address,
    })
}

#[async_trait]
impl Geocoder for GoogleGeocoder {
    async fn lookup(&self, postal_code: &str) -> ClinicResult<GeoLocation> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&[("address", postal_code), ("key", self.api_key.as_str())])
            .send()
            .await
            .map_err(GatewayError::Request)?;

        let body = checked_body(SERVICE, response).await?;
        Ok(decode_location(postal_code, &body)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_result_becomes_location() {
        let body = r#"{"status":"OK","results":[
            {"formatted_address":"Bengaluru, Karnataka 560001, India",
             "geometry":{"location":{"lat":12.9716,"lng":77.5946}}},
            {"geometry":{"location":{"lat":0.0,"lng":0.0}}}
        ]}"#;
        let location = decode_location("560001", body).unwrap();
        assert_eq!(location.latitude, 12.9716);
        assert_eq!(location.longitude, 77.5946);
        assert_eq!(location.postal_code, "560001");
    }

    #[test]
    fn test_zero_results_is_unknown_postal_code() {
        let body = r#"{"status":"ZERO_RESULTS","results":[]}"#;
        assert!(matches!(
            decode_location("999999", body),
            Err(GatewayError::UnknownPostalCode(code)) if code == "999999"
        ));
    }

    #[test]
    fn test_denied_request_carries_provider_message() {
        let body = r#"{"status":"REQUEST_DENIED","error_message":"Bad API key","results":[]}"#;
        match decode_location("560001", body) {
            Err(GatewayError::Rejected { message, .. }) => assert!(message.contains("API key")),
            other => panic!("expected rejection, got {:?}", other.map(|l| l.postal_code)),
        }
    }
}
