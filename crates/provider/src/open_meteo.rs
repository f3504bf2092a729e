//! Open-Meteo forecast provider over HTTP.
//!
//! Open-Meteo needs no API key. Default units already match the domain
//! model (°C, %, mm, km/h, degrees); timestamps are requested as unix
//! seconds so no timezone parsing is needed.

use crate::WeatherProvider;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rainbow_core::error::{RainbowError, RainbowResult};
use rainbow_core::{Location, WeatherCondition};
use serde::Deserialize;
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://api.open-meteo.com";

const VARIABLES: &str = "temperature_2m,relative_humidity_2m,precipitation,cloud_cover,\
wind_speed_10m,wind_direction_10m";

/// Fetches weather from an Open-Meteo compatible endpoint.
///
/// ```ignore
/// let provider = OpenMeteoProvider::new("https://api.open-meteo.com")?;
/// let now = provider.current_weather(&seattle).await?;
/// ```
pub struct OpenMeteoProvider {
    client: reqwest::Client,
    endpoint: Url,
}

impl OpenMeteoProvider {
    pub fn new(base_url: &str) -> RainbowResult<Self> {
        if base_url.is_empty() {
            return Err(RainbowError::InvalidInput("base URL must not be empty".into()));
        }

        let mut base = Url::parse(base_url)
            .map_err(|e| RainbowError::InvalidInput(format!("bad base URL {base_url}: {e}")))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let endpoint = base
            .join("v1/forecast")
            .map_err(|e| RainbowError::InvalidInput(format!("bad base URL {base_url}: {e}")))?;

        tracing::info!(endpoint = %endpoint, "open-meteo provider ready");

        Ok(Self {
            client: reqwest::Client::new(),
            endpoint,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    async fn fetch(&self, query: &[(&str, String)]) -> RainbowResult<String> {
        let resp = self
            .client
            .get(self.endpoint.clone())
            .query(query)
            .send()
            .await
            .map_err(|e| {
                RainbowError::Provider(format!("request to {} failed: {e}", self.endpoint))
            })?;

        let status = resp.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(RainbowError::RateLimited(format!("{} returned 429", self.endpoint)));
        }

        let body = resp
            .text()
            .await
            .map_err(|e| RainbowError::Provider(format!("reading response body: {e}")))?;

        if !status.is_success() {
            return Err(RainbowError::Provider(format!("HTTP {status}: {body}")));
        }
        Ok(body)
    }
}

fn coords(location: &Location) -> [(&'static str, String); 2] {
    [
        ("latitude", format!("{:.4}", location.latitude)),
        ("longitude", format!("{:.4}", location.longitude)),
    ]
}

#[async_trait]
impl WeatherProvider for OpenMeteoProvider {
    fn name(&self) -> &str {
        "open-meteo"
    }

    async fn current_weather(&self, location: &Location) -> RainbowResult<WeatherCondition> {
        tracing::debug!(%location, "fetching current weather");

        let [lat, lon] = coords(location);
        let query = [
            lat,
            lon,
            ("current", VARIABLES.to_string()),
            ("timeformat", "unixtime".to_string()),
        ];
        let body = self.fetch(&query).await?;
        parse_current(&body)
    }

    async fn forecast(
        &self,
        location: &Location,
        hours: u32,
    ) -> RainbowResult<Vec<WeatherCondition>> {
        if hours == 0 {
            return Err(RainbowError::InvalidInput("forecast hours must be > 0".into()));
        }

        tracing::debug!(%location, hours, "fetching forecast");

        let [lat, lon] = coords(location);
        let query = [
            lat,
            lon,
            ("hourly", VARIABLES.to_string()),
            ("forecast_hours", hours.to_string()),
            ("timeformat", "unixtime".to_string()),
        ];
        let body = self.fetch(&query).await?;
        let samples = parse_hourly(&body, hours as usize)?;

        tracing::info!(%location, samples = samples.len(), "fetched forecast");
        Ok(samples)
    }
}

// ---------------------------------------------------------------------------
// Response parsing
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    current: Option<CurrentBlock>,
    hourly: Option<HourlyBlock>,
}

#[derive(Debug, Deserialize)]
struct CurrentBlock {
    time: i64,
    temperature_2m: Option<f64>,
    relative_humidity_2m: Option<f64>,
    precipitation: Option<f64>,
    cloud_cover: Option<f64>,
    wind_speed_10m: Option<f64>,
    wind_direction_10m: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct HourlyBlock {
    time: Vec<i64>,
    temperature_2m: Vec<Option<f64>>,
    relative_humidity_2m: Vec<Option<f64>>,
    precipitation: Vec<Option<f64>>,
    cloud_cover: Vec<Option<f64>>,
    wind_speed_10m: Vec<Option<f64>>,
    wind_direction_10m: Vec<Option<f64>>,
}

fn timestamp(secs: i64) -> RainbowResult<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| RainbowError::Provider(format!("timestamp {secs} out of range")))
}

fn decode(body: &str) -> RainbowResult<ForecastResponse> {
    serde_json::from_str(body)
        .map_err(|e| RainbowError::Provider(format!("malformed forecast response: {e}")))
}

/// Parses the `current` block of a forecast response.
pub fn parse_current(body: &str) -> RainbowResult<WeatherCondition> {
    let current = decode(body)?
        .current
        .ok_or_else(|| RainbowError::Provider("response has no 'current' block".into()))?;

    let (Some(precipitation), Some(cloud_cover)) = (current.precipitation, current.cloud_cover)
    else {
        return Err(RainbowError::Provider(
            "current conditions lack precipitation or cloud cover".into(),
        ));
    };

    Ok(WeatherCondition {
        temperature: current.temperature_2m.unwrap_or_default(),
        humidity: current.relative_humidity_2m.unwrap_or_default(),
        precipitation,
        cloud_cover,
        wind_speed: current.wind_speed_10m.unwrap_or_default(),
        wind_direction: current.wind_direction_10m.unwrap_or_default(),
        timestamp: timestamp(current.time)?,
    })
}

/// Parses the `hourly` block into at most `limit` samples.
///
/// Samples without precipitation or cloud cover are skipped: guessing
/// either would skew the probability model.
pub fn parse_hourly(body: &str, limit: usize) -> RainbowResult<Vec<WeatherCondition>> {
    let h = decode(body)?
        .hourly
        .ok_or_else(|| RainbowError::Provider("response has no 'hourly' block".into()))?;

    let n = h.time.len();
    let lengths = [
        h.temperature_2m.len(),
        h.relative_humidity_2m.len(),
        h.precipitation.len(),
        h.cloud_cover.len(),
        h.wind_speed_10m.len(),
        h.wind_direction_10m.len(),
    ];
    if lengths.iter().any(|&len| len != n) {
        return Err(RainbowError::Provider(format!(
            "hourly arrays disagree in length: time={n}, others={lengths:?}"
        )));
    }

    let mut out = Vec::with_capacity(n.min(limit));
    for i in 0..n {
        if out.len() == limit {
            break;
        }
        let (Some(precipitation), Some(cloud_cover)) = (h.precipitation[i], h.cloud_cover[i])
        else {
            tracing::debug!(index = i, "skipping incomplete hourly sample");
            continue;
        };
        out.push(WeatherCondition {
            temperature: h.temperature_2m[i].unwrap_or_default(),
            humidity: h.relative_humidity_2m[i].unwrap_or_default(),
            precipitation,
            cloud_cover,
            wind_speed: h.wind_speed_10m[i].unwrap_or_default(),
            wind_direction: h.wind_direction_10m[i].unwrap_or_default(),
            timestamp: timestamp(h.time[i])?,
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CURRENT: &str = r#"{
        "latitude": 47.6,
        "longitude": -122.3,
        "current": {
            "time": 1717761600,
            "interval": 900,
            "temperature_2m": 18.5,
            "relative_humidity_2m": 81,
            "precipitation": 0.4,
            "cloud_cover": 55,
            "wind_speed_10m": 12.2,
            "wind_direction_10m": 200
        }
    }"#;

    const HOURLY: &str = r#"{
        "hourly": {
            "time": [1717761600, 1717765200, 1717768800],
            "temperature_2m": [18.5, 18.0, null],
            "relative_humidity_2m": [80, 82, 85],
            "precipitation": [0.4, null, 1.2],
            "cloud_cover": [55, 60, 65],
            "wind_speed_10m": [12.0, 11.0, 10.0],
            "wind_direction_10m": [200, 210, 220]
        }
    }"#;

    #[test]
    fn parses_current_block() {
        let w = parse_current(CURRENT).unwrap();
        assert_eq!(w.temperature, 18.5);
        assert_eq!(w.humidity, 81.0);
        assert_eq!(w.precipitation, 0.4);
        assert_eq!(w.cloud_cover, 55.0);
        assert_eq!(w.timestamp.timestamp(), 1717761600);
    }

    #[test]
    fn hourly_skips_incomplete_samples() {
        let samples = parse_hourly(HOURLY, 24).unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[1].precipitation, 1.2);
        // Missing temperature defaults rather than dropping the sample.
        assert_eq!(samples[1].temperature, 0.0);
    }

    #[test]
    fn hourly_respects_limit() {
        assert_eq!(parse_hourly(HOURLY, 1).unwrap().len(), 1);
    }

    #[test]
    fn mismatched_arrays_rejected() {
        let body = r#"{"hourly":{"time":[1,2],"temperature_2m":[1],"relative_humidity_2m":[1,2],
            "precipitation":[1,2],"cloud_cover":[1,2],"wind_speed_10m":[1,2],"wind_direction_10m":[1,2]}}"#;
        assert!(matches!(parse_hourly(body, 10), Err(RainbowError::Provider(_))));
    }

    #[test]
    fn missing_blocks_are_provider_errors() {
        assert!(parse_current("{}").is_err());
        assert!(parse_hourly("{}", 5).is_err());
        assert!(parse_current("not json").is_err());
    }

    #[test]
    fn endpoint_joins_under_base_path() {
        let p = OpenMeteoProvider::new("http://localhost:8080/proxy").unwrap();
        assert_eq!(p.endpoint().as_str(), "http://localhost:8080/proxy/v1/forecast");
        let p = OpenMeteoProvider::new(DEFAULT_BASE_URL).unwrap();
        assert_eq!(p.endpoint().as_str(), "https://api.open-meteo.com/v1/forecast");
    }

    #[test]
    fn rejects_bad_base_url() {
        assert!(OpenMeteoProvider::new("").is_err());
        assert!(OpenMeteoProvider::new("not a url").is_err());
    }

    #[tokio::test]
    async fn zero_hour_forecast_rejected_without_network() {
        let p = OpenMeteoProvider::new(DEFAULT_BASE_URL).unwrap();
        let err = p.forecast(&Location::new(0.0, 0.0), 0).await.unwrap_err();
        assert!(matches!(err, RainbowError::InvalidInput(_)));
    }

    #[tokio::test]
    #[ignore]
    async fn live_forecast_smoke() {
        let p = OpenMeteoProvider::new(DEFAULT_BASE_URL).unwrap();
        let samples = p.forecast(&Location::new(47.6062, -122.3321), 6).await.unwrap();
        assert!(!samples.is_empty() && samples.len() <= 6);
    }
}
