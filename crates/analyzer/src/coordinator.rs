//! Request coordinator: ties weather, prediction, users, and alerts together.
//!
//! Every public `process_*` entry point returns a [`CoordinatorResponse`]
//! and never an error; failures become `error` responses.

use crate::notification::NotificationCenter;
use crate::timing::{predict, PredictionSettings};
use crate::user::{filter_predictions_by_preferences, UserStore};
use chrono::{DateTime, Utc};
use rainbow_core::constants::PREDICTION_UPDATE_INTERVAL_MINUTES;
use rainbow_core::error::{RainbowError, RainbowResult};
use rainbow_core::{
    Location, Notification, NotificationChannel, RainbowPrediction, UserPreferences,
    WeatherCondition,
};
use rainbow_provider::registry::{analyze_conditions, conditions_favorable};
use rainbow_provider::{gazetteer, ForecastPrefetcher, WeatherService};
use serde::Serialize;
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseType {
    Prediction,
    Weather,
    UserUpdate,
    Notification,
    Error,
}

/// Uniform reply envelope for all coordinator requests.
#[derive(Debug, Clone, Serialize)]
pub struct CoordinatorResponse {
    pub response_type: ResponseType,
    pub message: String,
    pub data: serde_json::Value,
}

impl CoordinatorResponse {
    fn new(
        response_type: ResponseType,
        message: impl Into<String>,
        data: serde_json::Value,
    ) -> Self {
        Self {
            response_type,
            message: message.into(),
            data,
        }
    }

    pub fn error(err: &RainbowError) -> Self {
        Self::new(ResponseType::Error, err.to_string(), serde_json::Value::Null)
    }

    pub fn is_error(&self) -> bool {
        self.response_type == ResponseType::Error
    }
}

/// Everything one prediction run produced.
#[derive(Debug, Clone)]
pub struct PredictionOutcome {
    pub location: Location,
    pub predictions: Vec<RainbowPrediction>,
    pub notifications: Vec<Notification>,
    pub fetch_time: Duration,
    pub total_time: Duration,
}

impl PredictionOutcome {
    pub fn best(&self) -> Option<&RainbowPrediction> {
        self.predictions.first()
    }

    /// Summary in the shape returned by `process_rainbow_request`.
    pub fn to_json(&self) -> serde_json::Value {
        let best = self.best();
        json!({
            "location": self.location,
            "predictions": self.predictions,
            "highest_probability": best.map(|p| p.probability).unwrap_or(0.0),
            "best_viewing_time": best.map(|p| p.predicted_time_start),
            "best_viewing_locations": best
                .map(|p| p.viewing_locations.to_vec())
                .unwrap_or_default(),
            "notifications": self.notifications,
        })
    }
}

/// Current conditions plus forecast for one place.
#[derive(Debug, Clone, Serialize)]
pub struct WeatherReport {
    pub location: Location,
    pub current: WeatherCondition,
    pub forecast: Vec<WeatherCondition>,
    pub rainbow_favorable: bool,
    pub explanation: String,
    /// Forecast hours that look favorable on weather alone.
    pub favorable_hours: usize,
}

/// Totals across a watch loop's lifetime.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchSummary {
    pub ticks: usize,
    pub predictions: usize,
    pub notifications: usize,
    pub failures: usize,
}

pub struct Coordinator {
    weather: Arc<WeatherService>,
    users: Arc<UserStore>,
    notifier: Arc<NotificationCenter>,
    settings: PredictionSettings,
    channel: NotificationChannel,
    concurrency: usize,
}

impl Coordinator {
    pub fn new(
        weather: Arc<WeatherService>,
        users: Arc<UserStore>,
        notifier: Arc<NotificationCenter>,
    ) -> Self {
        Self {
            weather,
            users,
            notifier,
            settings: PredictionSettings::default(),
            channel: NotificationChannel::default(),
            concurrency: 4,
        }
    }

    pub fn with_settings(mut self, settings: PredictionSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_channel(mut self, channel: NotificationChannel) -> Self {
        self.channel = channel;
        self
    }

    pub fn with_concurrency(mut self, n: usize) -> Self {
        self.concurrency = n.max(1);
        self
    }

    pub fn weather(&self) -> &WeatherService {
        &self.weather
    }

    pub fn users(&self) -> &UserStore {
        &self.users
    }

    pub fn notifier(&self) -> &NotificationCenter {
        &self.notifier
    }

    pub fn settings(&self) -> &PredictionSettings {
        &self.settings
    }

    /// Resolves a place name or `"lat,lng"` string.
    pub fn resolve_location(&self, location: &str) -> RainbowResult<Location> {
        gazetteer::geocode(location)
            .ok_or_else(|| RainbowError::NotFound(format!("could not geocode '{location}'")))
    }

    pub async fn run_prediction(
        &self,
        location: &Location,
        hours: u32,
        user_id: Option<&str>,
    ) -> RainbowResult<PredictionOutcome> {
        self.run_prediction_at(location, hours, user_id, Utc::now()).await
    }

    /// Forecast, score, build, and (for a user) filter and notify, as of `now`.
    pub async fn run_prediction_at(
        &self,
        location: &Location,
        hours: u32,
        user_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> RainbowResult<PredictionOutcome> {
        if hours == 0 {
            return Err(RainbowError::InvalidInput(
                "time window must be at least one hour".into(),
            ));
        }
        let t0 = Instant::now();

        let forecast = self.weather.get_weather_forecast(location, hours, None).await?;
        let fetch_time = t0.elapsed();

        let mut predictions = predict(location, &forecast, &self.settings);
        let mut notifications = Vec::new();

        if let Some(user_id) = user_id {
            let prefs = self.users.get_preferences(user_id);
            let here = self.users.get_user_location(user_id);
            predictions = filter_predictions_by_preferences(&predictions, &prefs, here.as_ref());
            notifications = self
                .notify_all(user_id, &prefs, &predictions, now)
                .await?;
        }

        let total_time = t0.elapsed();
        tracing::info!(
            %location,
            hours,
            predictions = predictions.len(),
            notifications = notifications.len(),
            ?fetch_time,
            ?total_time,
            "prediction run complete"
        );

        Ok(PredictionOutcome {
            location: location.clone(),
            predictions,
            notifications,
            fetch_time,
            total_time,
        })
    }

    async fn notify_all(
        &self,
        user_id: &str,
        prefs: &UserPreferences,
        predictions: &[RainbowPrediction],
        now: DateTime<Utc>,
    ) -> RainbowResult<Vec<Notification>> {
        let mut out = Vec::new();
        for p in predictions {
            if let Some(n) = self
                .notifier
                .notify_for_prediction(user_id, prefs, p, self.channel, now)
                .await?
            {
                out.push(n);
            }
        }
        Ok(out)
    }

    /// Predicts rainbows for a place over the next `time_window_hours`.
    pub async fn process_rainbow_request(
        &self,
        location: &str,
        time_window_hours: u32,
        user_id: Option<&str>,
    ) -> CoordinatorResponse {
        let result = async {
            let loc = self.resolve_location(location)?;
            self.run_prediction(&loc, time_window_hours, user_id).await
        }
        .await;

        match result {
            Ok(outcome) => {
                let message = match outcome.best() {
                    Some(best) => format!(
                        "{} rainbow window(s) near {}; best {:.0}% at {}",
                        outcome.predictions.len(),
                        outcome.location,
                        best.probability * 100.0,
                        best.predicted_time_start.format("%Y-%m-%d %H:%M UTC"),
                    ),
                    None => format!(
                        "No rainbow expected near {} in the next {time_window_hours} hours",
                        outcome.location
                    ),
                };
                CoordinatorResponse::new(ResponseType::Prediction, message, outcome.to_json())
            }
            Err(e) => {
                tracing::warn!(location, error = %e, "rainbow request failed");
                CoordinatorResponse::error(&e)
            }
        }
    }

    pub async fn weather_report(
        &self,
        location: &Location,
        hours: u32,
    ) -> RainbowResult<WeatherReport> {
        let current = self.weather.get_current_weather(location, None).await?;
        let forecast = self.weather.get_weather_forecast(location, hours, None).await?;
        let analysis = analyze_conditions(&current);
        let favorable_hours = forecast.iter().filter(|w| conditions_favorable(w)).count();

        Ok(WeatherReport {
            location: location.clone(),
            current,
            forecast,
            rainbow_favorable: analysis.favorable,
            explanation: analysis.explanation,
            favorable_hours,
        })
    }

    pub async fn process_weather_request(&self, location: &str, hours: u32) -> CoordinatorResponse {
        let result = async {
            let loc = self.resolve_location(location)?;
            self.weather_report(&loc, hours).await
        }
        .await;

        match result.and_then(|r| {
            serde_json::to_value(&r)
                .map(|v| (r, v))
                .map_err(|e| RainbowError::Internal(e.to_string()))
        }) {
            Ok((report, data)) => {
                let verdict = if report.rainbow_favorable {
                    "favorable"
                } else {
                    "unfavorable"
                };
                CoordinatorResponse::new(
                    ResponseType::Weather,
                    format!("Conditions near {} are {verdict} for rainbows", report.location),
                    data,
                )
            }
            Err(e) => CoordinatorResponse::error(&e),
        }
    }

    /// Replaces a user's preferences and, if given, their location.
    pub fn process_user_update(
        &self,
        user_id: &str,
        preferences: UserPreferences,
        location: Option<Location>,
    ) -> CoordinatorResponse {
        if user_id.trim().is_empty() {
            return CoordinatorResponse::error(&RainbowError::InvalidInput(
                "user id must not be empty".into(),
            ));
        }
        if let Err(e) = self.users.update_preferences(user_id, preferences) {
            return CoordinatorResponse::error(&e);
        }
        if let Some(loc) = location {
            self.users.set_location(user_id, loc);
        }
        let profile = self.users.profile(user_id).unwrap_or_default();
        CoordinatorResponse::new(
            ResponseType::UserUpdate,
            format!("Updated preferences for {user_id}"),
            serde_json::to_value(profile).unwrap_or_default(),
        )
    }

    /// Recent alerts for a user, plus those still pending.
    pub async fn process_notification_request(
        &self,
        user_id: &str,
        limit: usize,
    ) -> CoordinatorResponse {
        let history = self.notifier.history(user_id, limit).await;
        let pending = self.notifier.pending(user_id).await;
        CoordinatorResponse::new(
            ResponseType::Notification,
            format!(
                "{} sent and {} pending notification(s) for {user_id}",
                history.len(),
                pending.len()
            ),
            json!({ "history": history, "pending": pending }),
        )
    }

    /// Re-runs predictions for `locations` every `interval` until `shutdown`
    /// resolves. Every stored user is notified about every location.
    pub async fn watch<F>(
        &self,
        locations: &[Location],
        hours: u32,
        interval: Option<Duration>,
        shutdown: F,
    ) -> RainbowResult<WatchSummary>
    where
        F: Future<Output = ()>,
    {
        if locations.is_empty() {
            return Err(RainbowError::InvalidInput("nothing to watch".into()));
        }
        let interval =
            interval.unwrap_or(Duration::from_secs(PREDICTION_UPDATE_INTERVAL_MINUTES * 60));
        let (provider_name, provider) = self.weather.provider(None)?;
        let prefetcher = ForecastPrefetcher::new(provider).with_concurrency(self.concurrency);

        tracing::info!(
            locations = locations.len(),
            provider = %provider_name,
            interval_secs = interval.as_secs(),
            "watch started"
        );

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        let mut summary = WatchSummary::default();
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!(ticks = summary.ticks, "watch stopping");
                    break;
                }
                _ = ticker.tick() => {
                    self.watch_tick(&prefetcher, &provider_name, locations, hours, &mut summary)
                        .await;
                }
            }
        }
        Ok(summary)
    }

    async fn watch_tick(
        &self,
        prefetcher: &ForecastPrefetcher,
        provider_name: &str,
        locations: &[Location],
        hours: u32,
        summary: &mut WatchSummary,
    ) {
        summary.ticks += 1;
        let now = Utc::now();

        match prefetcher.prefetch(locations, hours).await {
            Ok(set) => {
                for (index, forecast) in set {
                    if let Some(loc) = locations.get(index) {
                        self.weather.prime_forecast(provider_name, loc, hours, forecast).await;
                    }
                }
            }
            Err(e) => tracing::warn!(error = %e, "prefetch failed"),
        }

        let users = self.users.user_ids();
        for location in locations {
            let targets: Vec<Option<&str>> = if users.is_empty() {
                vec![None]
            } else {
                users.iter().map(|u| Some(u.as_str())).collect()
            };
            for user in targets {
                match self.run_prediction_at(location, hours, user, now).await {
                    Ok(outcome) => {
                        summary.predictions += outcome.predictions.len();
                        summary.notifications += outcome.notifications.len();
                    }
                    Err(e) => {
                        summary.failures += 1;
                        tracing::warn!(%location, error = %e, "watch prediction failed");
                    }
                }
            }
        }

        let due = self.notifier.dispatch_due(now).await;
        summary.notifications += due.len();

        let purged = self.weather.purge_cache().await;
        if purged > 0 {
            tracing::debug!(purged, "dropped expired weather cache entries");
        }
    }
}
