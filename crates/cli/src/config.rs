//! CLI configuration.
//!
//! Load order: TOML file (if given) → `RAINBOW_*` environment variables → defaults.
//! Callers apply their own overrides and then call [`AppConfig::validate`].

use rainbow_analyzer::PredictionSettings;
use rainbow_core::constants::PREDICTION_UPDATE_INTERVAL_MINUTES;
use rainbow_core::error::{RainbowError, RainbowResult};
use rainbow_core::NotificationChannel;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub weather: WeatherConfig,
    pub prediction: PredictionConfig,
    pub notifications: NotificationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WeatherConfig {
    /// `open-meteo` or `static`.
    pub provider: String,
    pub base_url: String,
    /// Max concurrent forecast requests while watching.
    pub concurrency: usize,
    pub cache_ttl_minutes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictionConfig {
    /// Forecast horizon.
    pub hours: u32,
    #[serde(flatten)]
    pub settings: PredictionSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub channel: NotificationChannel,
    /// Target for the `webhook` channel.
    pub webhook_url: Option<String>,
    pub interval_minutes: u64,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            provider: "open-meteo".into(),
            base_url: rainbow_provider::open_meteo::DEFAULT_BASE_URL.into(),
            concurrency: 4,
            cache_ttl_minutes: rainbow_core::constants::WEATHER_UPDATE_INTERVAL_MINUTES,
        }
    }
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            hours: 24,
            settings: PredictionSettings::default(),
        }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            channel: NotificationChannel::default(),
            webhook_url: None,
            interval_minutes: PREDICTION_UPDATE_INTERVAL_MINUTES,
        }
    }
}

/// Helper to parse an env var and apply it to a config field.
fn env_override<T: std::str::FromStr>(var: &str, target: &mut T) {
    if let Ok(v) = std::env::var(var) {
        match v.parse() {
            Ok(parsed) => *target = parsed,
            Err(_) => tracing::warn!(var, value = %v, "ignoring unparsable override"),
        }
    }
}

impl AppConfig {
    /// Load from `path` (when given), then apply environment overrides.
    /// Does not validate.
    pub fn load(path: Option<&Path>) -> RainbowResult<Self> {
        let mut config = match path {
            Some(p) => {
                let content = std::fs::read_to_string(p)
                    .map_err(|e| RainbowError::Config(format!("reading {}: {e}", p.display())))?;
                toml::from_str(&content)
                    .map_err(|e| RainbowError::Config(format!("parsing {}: {e}", p.display())))?
            }
            None => Self::default(),
        };

        env_override("RAINBOW_PROVIDER", &mut config.weather.provider);
        env_override("RAINBOW_BASE_URL", &mut config.weather.base_url);
        env_override("RAINBOW_CONCURRENCY", &mut config.weather.concurrency);
        env_override("RAINBOW_CACHE_TTL_MINUTES", &mut config.weather.cache_ttl_minutes);
        env_override("RAINBOW_HOURS", &mut config.prediction.hours);
        env_override(
            "RAINBOW_MIN_WINDOW_PROBABILITY",
            &mut config.prediction.settings.min_window_probability,
        );
        env_override("RAINBOW_CHANNEL", &mut config.notifications.channel);
        if let Ok(url) = std::env::var("RAINBOW_WEBHOOK_URL") {
            config.notifications.webhook_url = Some(url);
        }

        Ok(config)
    }

    pub fn validate(&self) -> RainbowResult<()> {
        if !matches!(self.weather.provider.as_str(), "open-meteo" | "static") {
            return Err(RainbowError::Config(format!(
                "unknown weather provider '{}'",
                self.weather.provider
            )));
        }
        if self.weather.concurrency == 0 {
            return Err(RainbowError::Config("weather.concurrency must be >= 1".into()));
        }
        if self.prediction.hours == 0 {
            return Err(RainbowError::Config("prediction.hours must be >= 1".into()));
        }
        let p = self.prediction.settings.min_window_probability;
        if !(0.0..=1.0).contains(&p) {
            return Err(RainbowError::Config(format!(
                "prediction.min_window_probability {p} outside [0, 1]"
            )));
        }
        if self.notifications.interval_minutes == 0 {
            return Err(RainbowError::Config(
                "notifications.interval_minutes must be >= 1".into(),
            ));
        }
        if self.notifications.channel == NotificationChannel::Webhook
            && self.notifications.webhook_url.is_none()
        {
            return Err(RainbowError::Config(
                "webhook channel needs notifications.webhook_url".into(),
            ));
        }
        Ok(())
    }
}
