//! Weather provider abstraction, caching registry, forecast prefetching,
//! and geocoding for Rainbow Finder.

pub mod cache;
pub mod fixture;
pub mod gazetteer;
pub mod open_meteo;
pub mod prefetcher;
pub mod registry;

use async_trait::async_trait;
use rainbow_core::error::RainbowResult;
use rainbow_core::{Location, WeatherCondition};

pub use fixture::StaticProvider;
pub use open_meteo::OpenMeteoProvider;
pub use prefetcher::{ForecastPrefetcher, ForecastSet};
pub use registry::{ConditionAnalysis, WeatherService};

/// Abstraction for fetching weather data from any source.
#[async_trait]
pub trait WeatherProvider: Send + Sync {
    /// Short identifier used in logs and cache keys.
    fn name(&self) -> &str;

    async fn current_weather(&self, location: &Location) -> RainbowResult<WeatherCondition>;

    /// Hourly samples starting at the current hour, at most `hours` long.
    async fn forecast(
        &self,
        location: &Location,
        hours: u32,
    ) -> RainbowResult<Vec<WeatherCondition>>;
}
