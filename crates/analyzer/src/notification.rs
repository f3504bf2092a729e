//! Rainbow alerts: when to notify, what to say, and how to deliver.
//!
//! [`NotificationCenter`] keeps a per-process queue of scheduled alerts and
//! a delivery history. Delivery goes through a [`NotificationDispatcher`]
//! per channel; channels without one fall back to [`LogDispatcher`].

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rainbow_core::error::{RainbowError, RainbowResult};
use rainbow_core::{
    Notification, NotificationChannel, NotificationStatus, RainbowPrediction, UserPreferences,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Delivered alerts kept per process; the oldest are dropped first.
pub const MAX_HISTORY: usize = 10_000;

/// Whether `prediction` is worth bothering this user about.
pub fn should_notify(preferences: &UserPreferences, prediction: &RainbowPrediction) -> bool {
    preferences.notification_enabled && prediction.probability >= preferences.min_probability
}

/// When the alert should go out: window start minus the user's lead time.
pub fn notification_time(
    prediction: &RainbowPrediction,
    preferences: &UserPreferences,
) -> DateTime<Utc> {
    prediction.predicted_time_start
        - Duration::minutes(i64::from(preferences.notification_lead_time_minutes))
}

/// Title and body for an alert as seen at `now`.
pub fn compose_message(prediction: &RainbowPrediction, now: DateTime<Utc>) -> (String, String) {
    let place = prediction
        .location
        .name
        .clone()
        .unwrap_or_else(|| prediction.location.to_string());
    let percent = (prediction.probability * 100.0).round();

    let minutes = (prediction.predicted_time_start - now).num_minutes();
    let when = if minutes > 0 {
        format!("in {minutes} minutes")
    } else if prediction.predicted_time_end > now {
        "now".to_string()
    } else {
        "earlier today".to_string()
    };

    let title = format!("Rainbow alert: {place}");
    let mut body = format!(
        "A {} rainbow may appear {when} near {place} ({percent:.0}% chance).",
        prediction.rainbow_type
    );
    if let Some(spot) = prediction.viewing_locations.first() {
        body.push_str(&format!(
            " Best view from {:.4},{:.4}, facing {:.0}°.",
            spot.latitude,
            spot.longitude,
            prediction.sun_position.antisolar_azimuth()
        ));
    }
    (title, body)
}

/// Delivers a single notification over some channel.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn deliver(&self, notification: &Notification) -> RainbowResult<()>;
}

/// Logs each notification and keeps a copy. Stands in for push and email.
#[derive(Debug, Default)]
pub struct LogDispatcher {
    delivered: Mutex<Vec<Notification>>,
}

impl LogDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delivered(&self) -> Vec<Notification> {
        self.delivered
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl NotificationDispatcher for LogDispatcher {
    async fn deliver(&self, notification: &Notification) -> RainbowResult<()> {
        tracing::info!(
            id = %notification.id,
            user_id = %notification.user_id,
            channel = %notification.channel,
            title = %notification.title,
            "{}",
            notification.message
        );
        self.delivered
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(notification.clone());
        Ok(())
    }
}

/// POSTs each notification as JSON to a fixed URL.
///
/// Requires the `webhook` feature flag.
#[cfg(feature = "webhook")]
pub struct WebhookDispatcher {
    url: String,
    client: reqwest::Client,
}

#[cfg(feature = "webhook")]
impl WebhookDispatcher {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[cfg(feature = "webhook")]
#[async_trait]
impl NotificationDispatcher for WebhookDispatcher {
    async fn deliver(&self, notification: &Notification) -> RainbowResult<()> {
        tracing::info!(id = %notification.id, url = %self.url, "posting webhook");

        let resp = self
            .client
            .post(&self.url)
            .json(notification)
            .send()
            .await
            .map_err(|e| RainbowError::Notification(format!("webhook request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(RainbowError::Notification(format!("HTTP {status}: {text}")));
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct State {
    scheduled: Vec<Notification>,
    history: Vec<Notification>,
}

impl State {
    fn record(&mut self, notification: Notification) {
        self.history.push(notification);
        if self.history.len() > MAX_HISTORY {
            let excess = self.history.len() - MAX_HISTORY;
            self.history.drain(..excess);
        }
    }
}

/// Same user, prediction, and channel, and not a failed attempt.
fn is_live_match(
    n: &Notification,
    user_id: &str,
    prediction_id: &str,
    channel: NotificationChannel,
) -> bool {
    n.user_id == user_id
        && n.prediction_id == prediction_id
        && n.channel == channel
        && n.status != NotificationStatus::Failed
}

/// Schedules, delivers, and remembers notifications.
pub struct NotificationCenter {
    dispatchers: HashMap<NotificationChannel, Arc<dyn NotificationDispatcher>>,
    fallback: Arc<LogDispatcher>,
    state: tokio::sync::Mutex<State>,
    seq: AtomicU64,
}

impl Default for NotificationCenter {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationCenter {
    pub fn new() -> Self {
        Self {
            dispatchers: HashMap::new(),
            fallback: Arc::new(LogDispatcher::new()),
            state: tokio::sync::Mutex::new(State::default()),
            seq: AtomicU64::new(0),
        }
    }

    pub fn with_dispatcher(
        mut self,
        channel: NotificationChannel,
        dispatcher: Arc<dyn NotificationDispatcher>,
    ) -> Self {
        self.dispatchers.insert(channel, dispatcher);
        self
    }

    /// The log dispatcher used for channels without their own.
    pub fn fallback(&self) -> &LogDispatcher {
        &self.fallback
    }

    fn dispatcher(&self, channel: NotificationChannel) -> Arc<dyn NotificationDispatcher> {
        self.dispatchers
            .get(&channel)
            .cloned()
            .unwrap_or_else(|| self.fallback.clone() as Arc<dyn NotificationDispatcher>)
    }

    fn next_id(&self, channel: NotificationChannel) -> String {
        let n = self.seq.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{channel}-{n:06}")
    }

    fn build(
        &self,
        user_id: &str,
        prediction: &RainbowPrediction,
        channel: NotificationChannel,
        at: DateTime<Utc>,
        now: DateTime<Utc>,
        status: NotificationStatus,
    ) -> Notification {
        let (title, message) = compose_message(prediction, now);
        Notification {
            id: self.next_id(channel),
            user_id: user_id.to_string(),
            prediction_id: prediction.id(),
            channel,
            title,
            message,
            notification_time: at,
            status,
        }
    }

    async fn deliver(&self, mut notification: Notification) -> Notification {
        match self.dispatcher(notification.channel).deliver(&notification).await {
            Ok(()) => notification.status = NotificationStatus::Sent,
            Err(e) => {
                tracing::warn!(id = %notification.id, error = %e, "notification delivery failed");
                notification.status = NotificationStatus::Failed;
            }
        }
        notification
    }

    /// Delivers an alert immediately and records the outcome.
    pub async fn send(
        &self,
        user_id: &str,
        prediction: &RainbowPrediction,
        channel: NotificationChannel,
        now: DateTime<Utc>,
    ) -> Notification {
        let pending =
            self.build(user_id, prediction, channel, now, now, NotificationStatus::Scheduled);
        let mut state = self.state.lock().await;
        let done = self.deliver(pending).await;
        state.record(done.clone());
        done
    }

    /// Queues an alert for `at`. A live (non-failed) alert for the same
    /// user, prediction, and channel is returned instead of a duplicate.
    pub async fn schedule(
        &self,
        user_id: &str,
        prediction: &RainbowPrediction,
        channel: NotificationChannel,
        at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Notification {
        let prediction_id = prediction.id();
        let mut state = self.state.lock().await;

        let existing = state
            .scheduled
            .iter()
            .chain(state.history.iter())
            .find(|n| is_live_match(n, user_id, &prediction_id, channel))
            .cloned();
        if let Some(n) = existing {
            tracing::debug!(id = %n.id, "notification already scheduled");
            return n;
        }

        let n = self.build(user_id, prediction, channel, at, now, NotificationStatus::Scheduled);
        tracing::info!(id = %n.id, user_id, at = %at, "scheduled notification");
        state.scheduled.push(n.clone());
        n
    }

    /// Delivers every scheduled alert due at or before `now`.
    ///
    /// The state lock is held until the results are recorded, so a
    /// concurrent `notify_for_prediction` never sees an alert in flight.
    pub async fn dispatch_due(&self, now: DateTime<Utc>) -> Vec<Notification> {
        let mut state = self.state.lock().await;
        let (due, later): (Vec<_>, Vec<_>) = std::mem::take(&mut state.scheduled)
            .into_iter()
            .partition(|n| n.notification_time <= now);
        state.scheduled = later;

        let mut delivered = Vec::with_capacity(due.len());
        for n in due {
            let done = self.deliver(n).await;
            state.record(done.clone());
            delivered.push(done);
        }
        if !delivered.is_empty() {
            tracing::info!(count = delivered.len(), "dispatched due notifications");
        }
        delivered
    }

    /// Sends now if the lead time has already passed, otherwise schedules.
    ///
    /// Returns `Ok(None)` when the user should not be notified.
    pub async fn notify_for_prediction(
        &self,
        user_id: &str,
        preferences: &UserPreferences,
        prediction: &RainbowPrediction,
        channel: NotificationChannel,
        now: DateTime<Utc>,
    ) -> RainbowResult<Option<Notification>> {
        if user_id.trim().is_empty() {
            return Err(RainbowError::InvalidInput("user id must not be empty".into()));
        }
        if !should_notify(preferences, prediction) {
            return Ok(None);
        }
        if prediction.predicted_time_end <= now {
            tracing::debug!(prediction = %prediction.id(), "window already over, skipping");
            return Ok(None);
        }

        let at = notification_time(prediction, preferences);
        if at > now {
            return Ok(Some(self.schedule(user_id, prediction, channel, at, now).await));
        }

        let prediction_id = prediction.id();
        let mut state = self.state.lock().await;
        if state
            .history
            .iter()
            .any(|n| is_live_match(n, user_id, &prediction_id, channel))
        {
            return Ok(None);
        }
        // An alert queued on an earlier pass is now due: deliver that one.
        let pending = match state
            .scheduled
            .iter()
            .position(|n| is_live_match(n, user_id, &prediction_id, channel))
        {
            Some(i) => state.scheduled.remove(i),
            None => {
                self.build(user_id, prediction, channel, now, now, NotificationStatus::Scheduled)
            }
        };
        let done = self.deliver(pending).await;
        state.record(done.clone());
        Ok(Some(done))
    }

    /// Delivered or failed alerts for a user, newest first.
    pub async fn history(&self, user_id: &str, limit: usize) -> Vec<Notification> {
        let state = self.state.lock().await;
        state
            .history
            .iter()
            .rev()
            .filter(|n| n.user_id == user_id)
            .take(limit)
            .cloned()
            .collect()
    }

    /// Alerts still waiting for their time, soonest first.
    pub async fn pending(&self, user_id: &str) -> Vec<Notification> {
        let state = self.state.lock().await;
        let mut out: Vec<Notification> = state
            .scheduled
            .iter()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect();
        out.sort_by_key(|n| n.notification_time);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rainbow_core::{Location, SunPosition, WeatherCondition};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 7, 16, 0, 0).unwrap()
    }

    fn prediction(start_in_minutes: i64, probability: f64) -> RainbowPrediction {
        let start = now() + Duration::minutes(start_in_minutes);
        RainbowPrediction {
            location: Location::new(47.6062, -122.3321).with_name("Seattle"),
            probability,
            predicted_time_start: start,
            predicted_time_end: start + Duration::hours(1),
            viewing_locations: [Location::new(47.60, -122.34)].into_iter().collect(),
            sun_position: SunPosition {
                azimuth: 270.0,
                elevation: 15.0,
                timestamp: start,
            },
            weather_condition: WeatherCondition {
                temperature: 15.0,
                humidity: 80.0,
                precipitation: 0.5,
                cloud_cover: 30.0,
                wind_speed: 5.0,
                wind_direction: 90.0,
                timestamp: start,
            },
            rainbow_type: Default::default(),
            intensity: 0.4,
            arc_coordinates: None,
        }
    }

    struct Failing;

    #[async_trait]
    impl NotificationDispatcher for Failing {
        async fn deliver(&self, _: &Notification) -> RainbowResult<()> {
            Err(RainbowError::Notification("smtp down".into()))
        }
    }

    #[test]
    fn notify_rules() {
        let prefs = UserPreferences::default();
        assert!(should_notify(&prefs, &prediction(60, 0.5)));
        assert!(!should_notify(&prefs, &prediction(60, 0.49)));

        let muted = UserPreferences {
            notification_enabled: false,
            ..Default::default()
        };
        assert!(!should_notify(&muted, &prediction(60, 0.9)));

        assert_eq!(
            notification_time(&prediction(60, 0.9), &prefs),
            now() + Duration::minutes(30)
        );
    }

    #[test]
    fn message_mentions_time_place_and_view() {
        let (title, body) = compose_message(&prediction(45, 0.72), now());
        assert_eq!(title, "Rainbow alert: Seattle");
        assert!(body.contains("in 45 minutes"), "{body}");
        assert!(body.contains("72% chance"), "{body}");
        assert!(body.contains("facing 90°"), "{body}");

        let (_, body) = compose_message(&prediction(-10, 0.72), now());
        assert!(body.contains("appear now"), "{body}");
    }

    #[tokio::test]
    async fn send_records_history_with_sequential_ids() {
        let center = NotificationCenter::new();
        let a = center
            .send("u1", &prediction(10, 0.9), NotificationChannel::Push, now())
            .await;
        let b = center
            .send("u1", &prediction(20, 0.9), NotificationChannel::Email, now())
            .await;

        assert_eq!(a.id, "push-000001");
        assert_eq!(b.id, "email-000002");
        assert_eq!(a.status, NotificationStatus::Sent);
        assert_eq!(center.fallback().delivered().len(), 2);

        let history = center.history("u1", 10).await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].id, b.id);
        assert_eq!(center.history("u1", 1).await.len(), 1);
        assert!(center.history("u2", 10).await.is_empty());
    }

    #[tokio::test]
    async fn failed_delivery_is_recorded() {
        let center = NotificationCenter::new()
            .with_dispatcher(NotificationChannel::Email, Arc::new(Failing));
        let n = center
            .send("u1", &prediction(10, 0.9), NotificationChannel::Email, now())
            .await;
        assert_eq!(n.status, NotificationStatus::Failed);
        assert!(center.fallback().delivered().is_empty());
    }

    #[tokio::test]
    async fn schedule_is_idempotent_and_dispatches_when_due() {
        let center = NotificationCenter::new();
        let p = prediction(120, 0.9);
        let at = now() + Duration::minutes(90);

        let first = center.schedule("u1", &p, NotificationChannel::Push, at, now()).await;
        let again = center.schedule("u1", &p, NotificationChannel::Push, at, now()).await;
        assert_eq!(first.id, again.id);
        assert_eq!(center.pending("u1").await.len(), 1);

        assert!(center.dispatch_due(now()).await.is_empty());
        let sent = center.dispatch_due(at).await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].status, NotificationStatus::Sent);
        assert!(center.pending("u1").await.is_empty());

        // Delivered already, so no new one.
        let third = center.schedule("u1", &p, NotificationChannel::Push, at, now()).await;
        assert_eq!(third.id, first.id);
        assert!(center.pending("u1").await.is_empty());
    }

    #[tokio::test]
    async fn notify_sends_or_schedules() {
        let center = NotificationCenter::new();
        let prefs = UserPreferences::default();

        let push = NotificationChannel::Push;
        let soon = center
            .notify_for_prediction("u1", &prefs, &prediction(10, 0.9), push, now())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(soon.status, NotificationStatus::Sent);

        let repeat = center
            .notify_for_prediction("u1", &prefs, &prediction(10, 0.9), push, now())
            .await
            .unwrap();
        assert!(repeat.is_none());

        let later = center
            .notify_for_prediction("u1", &prefs, &prediction(180, 0.9), push, now())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(later.status, NotificationStatus::Scheduled);
        assert_eq!(later.notification_time, now() + Duration::minutes(150));

        let unlikely = center
            .notify_for_prediction("u1", &prefs, &prediction(180, 0.1), push, now())
            .await
            .unwrap();
        assert!(unlikely.is_none());

        assert!(center
            .notify_for_prediction("", &prefs, &prediction(10, 0.9), push, now())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn due_scheduled_alert_is_sent_once() {
        let center = NotificationCenter::new();
        let prefs = UserPreferences::default();
        let push = NotificationChannel::Push;
        let p = prediction(35, 0.9);

        let first = center
            .notify_for_prediction("u1", &prefs, &p, push, now())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.status, NotificationStatus::Scheduled);

        // Next pass, after the lead time has passed.
        let later = now() + Duration::minutes(5);
        let sent = center
            .notify_for_prediction("u1", &prefs, &p, push, later)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(sent.id, first.id);
        assert_eq!(sent.status, NotificationStatus::Sent);
        assert!(center.pending("u1").await.is_empty());

        assert!(center.dispatch_due(later).await.is_empty());
        assert!(center
            .notify_for_prediction("u1", &prefs, &p, push, later)
            .await
            .unwrap()
            .is_none());
        assert_eq!(center.fallback().delivered().len(), 1);
        assert_eq!(center.history("u1", 10).await.len(), 1);
    }

    #[tokio::test]
    async fn history_is_capped() {
        let center = NotificationCenter::new();
        for i in 0..(MAX_HISTORY + 3) {
            center
                .send("u1", &prediction(i as i64, 0.9), NotificationChannel::Push, now())
                .await;
        }
        let history = center.history("u1", usize::MAX).await;
        assert_eq!(history.len(), MAX_HISTORY);
        assert_eq!(history.last().map(|n| n.id.as_str()), Some("push-000004"));
    }
}
