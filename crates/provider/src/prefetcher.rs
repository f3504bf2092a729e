//! Concurrent forecast prefetcher with rate-limited concurrency and retry.
//!
//! Fetches hourly forecasts for many locations in parallel from one
//! provider, producing a [`ForecastSet`] indexed like the input slice.

use crate::WeatherProvider;
use rainbow_core::error::{RainbowError, RainbowResult};
use rainbow_core::{Location, WeatherCondition};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Default max concurrent provider requests.
/// Kept low for free-tier weather APIs; raise for paid plans.
const DEFAULT_CONCURRENCY: usize = 4;

/// Max retry attempts for rate-limited requests.
const MAX_RETRIES: u32 = 3;

const BASE_BACKOFF: Duration = Duration::from_millis(200);

/// Forecasts keyed by the index of the location in the prefetch input.
pub type ForecastSet = HashMap<usize, Vec<WeatherCondition>>;

/// Concurrent forecast prefetcher.
///
/// Owns a shared provider and fetches one forecast per location via
/// `JoinSet`, throttled by a semaphore.
///
/// ```ignore
/// let prefetcher = ForecastPrefetcher::new(provider.clone()).with_concurrency(8);
/// let forecasts = prefetcher.prefetch(&locations, 24).await?;
/// ```
pub struct ForecastPrefetcher {
    provider: Arc<dyn WeatherProvider>,
    max_concurrent: usize,
    backoff: Duration,
}

impl ForecastPrefetcher {
    pub fn new(provider: Arc<dyn WeatherProvider>) -> Self {
        Self {
            provider,
            max_concurrent: DEFAULT_CONCURRENCY,
            backoff: BASE_BACKOFF,
        }
    }

    /// Override max concurrent requests (default: 4). Zero is treated as one.
    pub fn with_concurrency(mut self, n: usize) -> Self {
        self.max_concurrent = n.max(1);
        self
    }

    /// Override the first retry delay; later retries double it.
    pub fn with_backoff(mut self, base: Duration) -> Self {
        self.backoff = base;
        self
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Concurrently fetches `hours` of forecast for every location.
    ///
    /// Individual failures are logged and skipped; the returned set simply
    /// lacks those indices.
    pub async fn prefetch(&self, locations: &[Location], hours: u32) -> RainbowResult<ForecastSet> {
        if hours == 0 {
            return Err(RainbowError::InvalidInput("forecast hours must be > 0".into()));
        }

        let semaphore = Arc::new(tokio::sync::Semaphore::new(self.max_concurrent));

        tracing::info!(
            provider = self.provider.name(),
            locations = locations.len(),
            hours,
            concurrency = self.max_concurrent,
            "prefetching forecasts"
        );

        let mut tasks = tokio::task::JoinSet::new();

        for (index, location) in locations.iter().enumerate() {
            let p = self.provider.clone();
            let sem = semaphore.clone();
            let location = location.clone();
            let backoff = self.backoff;
            tasks.spawn(async move {
                let _permit = sem
                    .acquire_owned()
                    .await
                    .map_err(|e| RainbowError::Internal(format!("semaphore closed: {e}")))?;
                let forecast =
                    fetch_forecast_with_retry(p.as_ref(), &location, hours, backoff).await?;
                Ok::<_, RainbowError>((index, forecast))
            });
        }

        // Drain into the set.
        let mut set = ForecastSet::with_capacity(locations.len());
        let mut failed = 0usize;

        while let Some(result) = tasks.join_next().await {
            match result {
                Ok(Ok((index, forecast))) => {
                    set.insert(index, forecast);
                }
                Ok(Err(e)) => {
                    tracing::warn!(error = %e, "forecast prefetch failed");
                    failed += 1;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "forecast prefetch task panicked");
                    failed += 1;
                }
            }
        }

        tracing::info!(fetched = set.len(), failed, "prefetch done");
        Ok(set)
    }
}

/// Fetch a forecast with exponential backoff retry on rate limiting.
async fn fetch_forecast_with_retry(
    p: &dyn WeatherProvider,
    location: &Location,
    hours: u32,
    backoff: Duration,
) -> RainbowResult<Vec<WeatherCondition>> {
    for attempt in 0..=MAX_RETRIES {
        if attempt > 0 {
            let delay = backoff * 2u32.pow(attempt - 1);
            tokio::time::sleep(delay).await;
        }

        match p.forecast(location, hours).await {
            Ok(forecast) => return Ok(forecast),
            Err(e) if e.is_retryable() && attempt < MAX_RETRIES => {
                tracing::debug!(%location, attempt, error = %e, "rate limited, retrying");
                continue;
            }
            Err(e) => return Err(e),
        }
    }
    Err(RainbowError::RateLimited(format!(
        "max retries exceeded for {location}"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::StaticProvider;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Rate-limits the first `fail_first` calls, then behaves like `StaticProvider`.
    struct Flaky {
        inner: StaticProvider,
        calls: AtomicUsize,
        fail_first: usize,
        hard_fail_lat: Option<f64>,
    }

    #[async_trait]
    impl WeatherProvider for Flaky {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn current_weather(&self, location: &Location) -> RainbowResult<WeatherCondition> {
            self.inner.current_weather(location).await
        }

        async fn forecast(
            &self,
            location: &Location,
            hours: u32,
        ) -> RainbowResult<Vec<WeatherCondition>> {
            if self.hard_fail_lat == Some(location.latitude) {
                return Err(RainbowError::Provider("station offline".into()));
            }
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first {
                return Err(RainbowError::RateLimited("429".into()));
            }
            self.inner.forecast(location, hours).await
        }
    }

    fn flaky(fail_first: usize, hard_fail_lat: Option<f64>) -> Arc<Flaky> {
        Arc::new(Flaky {
            inner: StaticProvider::new(),
            calls: AtomicUsize::new(0),
            fail_first,
            hard_fail_lat,
        })
    }

    #[tokio::test]
    async fn fetches_every_location() {
        let locations: Vec<Location> = (0..5).map(|i| Location::new(i as f64, 0.0)).collect();
        let prefetcher =
            ForecastPrefetcher::new(Arc::new(StaticProvider::new())).with_concurrency(2);
        let set = prefetcher.prefetch(&locations, 3).await.unwrap();
        assert_eq!(set.len(), 5);
        assert!(set.values().all(|f| f.len() == 3));
    }

    #[tokio::test]
    async fn retries_rate_limited_requests() {
        let p = flaky(2, None);
        let prefetcher = ForecastPrefetcher::new(p.clone())
            .with_concurrency(1)
            .with_backoff(Duration::from_millis(1));
        let set = prefetcher.prefetch(&[Location::new(1.0, 1.0)], 2).await.unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(p.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let p = flaky(usize::MAX, None);
        let prefetcher = ForecastPrefetcher::new(p.clone()).with_backoff(Duration::from_millis(1));
        let set = prefetcher.prefetch(&[Location::new(1.0, 1.0)], 2).await.unwrap();
        assert!(set.is_empty());
        assert_eq!(p.calls.load(Ordering::SeqCst), (MAX_RETRIES + 1) as usize);
    }

    #[tokio::test]
    async fn hard_failures_are_skipped_not_fatal() {
        let p = flaky(0, Some(2.0));
        let locations = [Location::new(1.0, 0.0), Location::new(2.0, 0.0), Location::new(3.0, 0.0)];
        let set = ForecastPrefetcher::new(p).prefetch(&locations, 1).await.unwrap();
        assert_eq!(set.len(), 2);
        assert!(set.contains_key(&0) && set.contains_key(&2));
        assert!(!set.contains_key(&1));
    }

    #[tokio::test]
    async fn zero_hours_rejected() {
        let prefetcher = ForecastPrefetcher::new(Arc::new(StaticProvider::new()));
        assert!(prefetcher.prefetch(&[Location::new(0.0, 0.0)], 0).await.is_err());
    }
}
