//! Named weather-provider registry with a TTL cache in front.

use crate::cache::{TtlCache, WeatherKey};
use crate::WeatherProvider;
use rainbow_core::constants::{
    MAX_CLOUD_COVER, MIN_PRECIPITATION_RATE, WEATHER_UPDATE_INTERVAL_MINUTES,
};
use rainbow_core::error::{RainbowError, RainbowResult};
use rainbow_core::{Location, WeatherCondition};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

/// Outcome of checking one weather sample for rainbow potential.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConditionAnalysis {
    pub favorable: bool,
    pub explanation: String,
}

/// Rain is falling and the sky is open enough for direct sunlight.
pub fn conditions_favorable(weather: &WeatherCondition) -> bool {
    weather.precipitation >= MIN_PRECIPITATION_RATE && weather.cloud_cover <= MAX_CLOUD_COVER
}

pub fn analyze_conditions(weather: &WeatherCondition) -> ConditionAnalysis {
    let rain_ok = weather.precipitation >= MIN_PRECIPITATION_RATE;
    let sky_ok = weather.cloud_cover <= MAX_CLOUD_COVER;

    let rain = if rain_ok {
        format!("precipitation {:.1} mm/h supplies droplets", weather.precipitation)
    } else {
        format!(
            "precipitation {:.1} mm/h is below the {MIN_PRECIPITATION_RATE} mm/h needed",
            weather.precipitation
        )
    };
    let sky = if sky_ok {
        format!("cloud cover {:.0}% lets sunlight through", weather.cloud_cover)
    } else {
        format!(
            "cloud cover {:.0}% exceeds {MAX_CLOUD_COVER:.0}% and blocks the sun",
            weather.cloud_cover
        )
    };

    ConditionAnalysis {
        favorable: rain_ok && sky_ok,
        explanation: format!("{rain}; {sky}"),
    }
}

struct Registry {
    providers: BTreeMap<String, Arc<dyn WeatherProvider>>,
    default: Option<String>,
}

/// Routes weather lookups to named providers, caching results.
///
/// ```ignore
/// let service = WeatherService::new();
/// service.register_weather_provider("open-meteo", Arc::new(OpenMeteoProvider::new(url)?));
/// let now = service.get_current_weather(&seattle, None).await?;
/// ```
pub struct WeatherService {
    registry: RwLock<Registry>,
    current: TtlCache<WeatherKey, WeatherCondition>,
    forecasts: TtlCache<WeatherKey, Vec<WeatherCondition>>,
}

impl Default for WeatherService {
    fn default() -> Self {
        Self::new()
    }
}

impl WeatherService {
    pub fn new() -> Self {
        Self::with_ttl(Duration::from_secs(WEATHER_UPDATE_INTERVAL_MINUTES * 60))
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        tracing::debug!(ttl_secs = ttl.as_secs(), "weather service initialized");
        Self {
            registry: RwLock::new(Registry {
                providers: BTreeMap::new(),
                default: None,
            }),
            current: TtlCache::new(ttl),
            forecasts: TtlCache::new(ttl),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Registry> {
        self.registry.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Registry> {
        self.registry.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Registers (or replaces) a provider. The first one becomes the default.
    pub fn register_weather_provider(
        &self,
        name: impl Into<String>,
        provider: Arc<dyn WeatherProvider>,
    ) {
        let name = name.into();
        let mut reg = self.write();
        if reg.default.is_none() {
            reg.default = Some(name.clone());
        }
        tracing::info!(provider = %name, "registered weather provider");
        reg.providers.insert(name, provider);
    }

    pub fn set_default(&self, name: &str) -> RainbowResult<()> {
        let mut reg = self.write();
        if !reg.providers.contains_key(name) {
            return Err(RainbowError::NotFound(format!("weather provider '{name}'")));
        }
        reg.default = Some(name.to_string());
        Ok(())
    }

    pub fn default_provider(&self) -> Option<String> {
        self.read().default.clone()
    }

    pub fn providers(&self) -> Vec<String> {
        self.read().providers.keys().cloned().collect()
    }

    /// Resolves a provider by name, or the default when `name` is `None`.
    pub fn provider(
        &self,
        name: Option<&str>,
    ) -> RainbowResult<(String, Arc<dyn WeatherProvider>)> {
        let reg = self.read();
        let name = match name {
            Some(n) => n.to_string(),
            None => reg
                .default
                .clone()
                .ok_or_else(|| RainbowError::NotFound("no weather provider registered".into()))?,
        };
        let provider = reg
            .providers
            .get(&name)
            .cloned()
            .ok_or_else(|| RainbowError::NotFound(format!("weather provider '{name}'")))?;
        Ok((name, provider))
    }

    pub async fn get_current_weather(
        &self,
        location: &Location,
        provider: Option<&str>,
    ) -> RainbowResult<WeatherCondition> {
        let (name, p) = self.provider(provider)?;
        let key = WeatherKey::new(&name, location.latitude, location.longitude, 0);

        if let Some(hit) = self.current.get(&key).await {
            tracing::debug!(provider = %name, %location, "current weather cache hit");
            return Ok(hit);
        }

        let weather = p.current_weather(location).await?;
        self.current.insert(key, weather.clone()).await;
        Ok(weather)
    }

    pub async fn get_weather_forecast(
        &self,
        location: &Location,
        hours: u32,
        provider: Option<&str>,
    ) -> RainbowResult<Vec<WeatherCondition>> {
        if hours == 0 {
            return Err(RainbowError::InvalidInput("forecast hours must be > 0".into()));
        }
        let (name, p) = self.provider(provider)?;
        let key = WeatherKey::new(&name, location.latitude, location.longitude, hours);

        if let Some(hit) = self.forecasts.get(&key).await {
            tracing::debug!(provider = %name, %location, hours, "forecast cache hit");
            return Ok(hit);
        }

        let forecast = p.forecast(location, hours).await?;
        self.forecasts.insert(key, forecast.clone()).await;
        Ok(forecast)
    }

    /// Seeds the forecast cache, e.g. from a concurrent prefetch.
    pub async fn prime_forecast(
        &self,
        provider: &str,
        location: &Location,
        hours: u32,
        forecast: Vec<WeatherCondition>,
    ) {
        let key = WeatherKey::new(provider, location.latitude, location.longitude, hours);
        self.forecasts.insert(key, forecast).await;
    }

    /// Drops stale cache entries; returns how many were removed.
    pub async fn purge_cache(&self) -> usize {
        self.current.purge_expired().await + self.forecasts.purge_expired().await
    }
}
