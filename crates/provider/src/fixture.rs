//! Deterministic provider for offline runs, demos, and tests.

use crate::WeatherProvider;
use async_trait::async_trait;
use chrono::{DateTime, Duration, DurationRound, Utc};
use rainbow_core::error::{RainbowError, RainbowResult};
use rainbow_core::{Location, WeatherCondition};

/// Serves fixed conditions regardless of location.
///
/// With no sequence configured every sample is the same light-rain,
/// partly-cloudy reading. A sequence is cycled hour by hour.
#[derive(Debug, Clone)]
pub struct StaticProvider {
    sequence: Vec<WeatherCondition>,
    anchor: Option<DateTime<Utc>>,
}

impl Default for StaticProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl StaticProvider {
    pub fn new() -> Self {
        Self {
            sequence: vec![sample_condition(Utc::now())],
            anchor: None,
        }
    }

    /// Cycle through these conditions; their own timestamps are ignored.
    pub fn with_sequence(mut self, sequence: Vec<WeatherCondition>) -> Self {
        if !sequence.is_empty() {
            self.sequence = sequence;
        }
        self
    }

    /// Pin the first forecast hour instead of using the current hour.
    pub fn anchored_at(mut self, anchor: DateTime<Utc>) -> Self {
        self.anchor = Some(anchor);
        self
    }

    fn start(&self) -> DateTime<Utc> {
        match self.anchor {
            Some(t) => t,
            None => {
                let now = Utc::now();
                now.duration_trunc(Duration::hours(1)).unwrap_or(now)
            }
        }
    }

    fn at(&self, index: usize, timestamp: DateTime<Utc>) -> WeatherCondition {
        let mut w = self.sequence[index % self.sequence.len()].clone();
        w.timestamp = timestamp;
        w
    }
}

/// Light rain, 40% cloud: comfortably favorable for a bow.
pub fn sample_condition(timestamp: DateTime<Utc>) -> WeatherCondition {
    WeatherCondition {
        temperature: 20.0,
        humidity: 75.0,
        precipitation: 0.2,
        cloud_cover: 40.0,
        wind_speed: 10.0,
        wind_direction: 180.0,
        timestamp,
    }
}

#[async_trait]
impl WeatherProvider for StaticProvider {
    fn name(&self) -> &str {
        "static"
    }

    async fn current_weather(&self, _location: &Location) -> RainbowResult<WeatherCondition> {
        Ok(self.at(0, self.anchor.unwrap_or_else(Utc::now)))
    }

    async fn forecast(
        &self,
        _location: &Location,
        hours: u32,
    ) -> RainbowResult<Vec<WeatherCondition>> {
        if hours == 0 {
            return Err(RainbowError::InvalidInput("forecast hours must be > 0".into()));
        }
        let start = self.start();
        Ok((0..hours as usize)
            .map(|i| self.at(i, start + Duration::hours(i as i64)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[tokio::test]
    async fn forecast_is_hourly_from_anchor() {
        let t0 = Utc.with_ymd_and_hms(2025, 6, 7, 12, 0, 0).unwrap();
        let p = StaticProvider::new().anchored_at(t0);
        let f = p.forecast(&Location::new(0.0, 0.0), 3).await.unwrap();
        assert_eq!(f.len(), 3);
        assert_eq!(f[0].timestamp, t0);
        assert_eq!(f[2].timestamp, t0 + Duration::hours(2));
        assert!(f.iter().all(|w| w.precipitation == 0.2 && w.cloud_cover == 40.0));
    }

    #[tokio::test]
    async fn sequence_cycles() {
        let t0 = Utc.with_ymd_and_hms(2025, 6, 7, 12, 0, 0).unwrap();
        let dry = WeatherCondition {
            precipitation: 0.0,
            ..sample_condition(t0)
        };
        let p = StaticProvider::new()
            .with_sequence(vec![sample_condition(t0), dry])
            .anchored_at(t0);
        let f = p.forecast(&Location::new(0.0, 0.0), 4).await.unwrap();
        let rain: Vec<f64> = f.iter().map(|w| w.precipitation).collect();
        assert_eq!(rain, vec![0.2, 0.0, 0.2, 0.0]);
    }

    #[tokio::test]
    async fn zero_hours_is_invalid() {
        let p = StaticProvider::new();
        assert!(p.forecast(&Location::new(0.0, 0.0), 0).await.is_err());
    }

    #[tokio::test]
    async fn unanchored_forecast_starts_on_the_hour() {
        let f = StaticProvider::new()
            .forecast(&Location::new(0.0, 0.0), 1)
            .await
            .unwrap();
        assert_eq!(f[0].timestamp.timestamp() % 3600, 0);
    }
}
