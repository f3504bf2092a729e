//! Domain types for the Rainbow Finder prediction pipeline.

use crate::constants::{
    DEFAULT_MIN_PROBABILITY, DEFAULT_NOTIFICATION_LEAD_TIME_MINUTES,
    DEFAULT_NOTIFICATION_RADIUS_KM, RAINBOW_ANGLE_PRIMARY, RAINBOW_ANGLE_SECONDARY,
};
use crate::error::{RainbowError, RainbowResult};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Location
// ---------------------------------------------------------------------------

/// A point on the Earth's surface (WGS84 degrees).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Location {
    /// Unchecked constructor; prefer [`Location::try_new`] for user input.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            altitude: None,
            name: None,
        }
    }

    pub fn try_new(latitude: f64, longitude: f64) -> RainbowResult<Self> {
        if !latitude.is_finite() || !longitude.is_finite() {
            return Err(RainbowError::InvalidInput(
                "coordinates must be finite".into(),
            ));
        }
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(RainbowError::InvalidInput(format!(
                "latitude {latitude} outside [-90, 90]"
            )));
        }
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(RainbowError::InvalidInput(format!(
                "longitude {longitude} outside [-180, 180]"
            )));
        }
        Ok(Self::new(latitude, longitude))
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_altitude(mut self, altitude: f64) -> Self {
        self.altitude = Some(altitude);
        self
    }
}

impl FromStr for Location {
    type Err = RainbowError;

    /// Parses `"lat,lng"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (lat, lon) = s
            .split_once(',')
            .ok_or_else(|| RainbowError::InvalidInput(format!("expected 'lat,lng', got '{s}'")))?;
        let lat: f64 = lat
            .trim()
            .parse()
            .map_err(|_| RainbowError::InvalidInput(format!("bad latitude in '{s}'")))?;
        let lon: f64 = lon
            .trim()
            .parse()
            .map_err(|_| RainbowError::InvalidInput(format!("bad longitude in '{s}'")))?;
        Self::try_new(lat, lon)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{name} ({:.4},{:.4})", self.latitude, self.longitude),
            None => write!(f, "{:.4},{:.4}", self.latitude, self.longitude),
        }
    }
}

// ---------------------------------------------------------------------------
// Sun
// ---------------------------------------------------------------------------

/// Apparent sun direction as seen by an observer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SunPosition {
    /// Degrees clockwise from true north, `[0, 360)`.
    pub azimuth: f64,
    /// Degrees above the horizon; negative at night.
    pub elevation: f64,
    pub timestamp: DateTime<Utc>,
}

impl SunPosition {
    /// Direction of the shadow of the observer's head -- the bow's center.
    pub fn antisolar_azimuth(&self) -> f64 {
        (self.azimuth + 180.0).rem_euclid(360.0)
    }

    pub fn is_above_horizon(&self) -> bool {
        self.elevation > 0.0
    }
}

/// Sunrise/sunset and related crossings for one calendar day (UTC).
///
/// Every crossing is optional: near the poles the sun may never reach the
/// corresponding altitude.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayNightCycle {
    pub date: NaiveDate,
    pub sunrise: Option<DateTime<Utc>>,
    pub sunset: Option<DateTime<Utc>>,
    pub civil_twilight_begin: Option<DateTime<Utc>>,
    pub civil_twilight_end: Option<DateTime<Utc>>,
    /// Morning: sun climbs past the golden-hour elevation.
    pub golden_hour_end: Option<DateTime<Utc>>,
    /// Evening: sun drops below the golden-hour elevation.
    pub golden_hour_begin: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Weather
// ---------------------------------------------------------------------------

/// A single weather observation or forecast sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherCondition {
    /// Celsius.
    pub temperature: f64,
    /// Relative humidity, percent.
    pub humidity: f64,
    /// mm/h.
    pub precipitation: f64,
    /// Percent.
    pub cloud_cover: f64,
    /// km/h.
    pub wind_speed: f64,
    /// Degrees.
    pub wind_direction: f64,
    pub timestamp: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Rainbow
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RainbowType {
    #[default]
    Primary,
    Secondary,
    Supernumerary,
    Fogbow,
    Moonbow,
}

impl RainbowType {
    /// Angular radius around the antisolar point, where it is well defined.
    pub fn angle(self) -> Option<f64> {
        match self {
            Self::Primary => Some(RAINBOW_ANGLE_PRIMARY),
            Self::Secondary => Some(RAINBOW_ANGLE_SECONDARY),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Secondary => "secondary",
            Self::Supernumerary => "supernumerary",
            Self::Fogbow => "fogbow",
            Self::Moonbow => "moonbow",
        }
    }
}

impl fmt::Display for RainbowType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A contiguous stretch of time with rainbow potential.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub probability: f64,
}

impl TimeWindow {
    pub fn duration(&self) -> chrono::Duration {
        self.end - self.start
    }
}

/// A predicted rainbow: where, when, how likely, and where to stand.
///
/// `viewing_locations` is a `SmallVec<[Location; 4]>`; the pipeline emits
/// three candidates per prediction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RainbowPrediction {
    pub location: Location,
    /// `[0, 1]`.
    pub probability: f64,
    pub predicted_time_start: DateTime<Utc>,
    pub predicted_time_end: DateTime<Utc>,
    pub viewing_locations: SmallVec<[Location; 4]>,
    pub sun_position: SunPosition,
    pub weather_condition: WeatherCondition,
    #[serde(default)]
    pub rainbow_type: RainbowType,
    /// `[0, 1]`.
    #[serde(default)]
    pub intensity: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arc_coordinates: Option<Vec<Location>>,
}

impl RainbowPrediction {
    /// Stable identifier: rounded coordinates plus window start.
    pub fn id(&self) -> String {
        format!(
            "{:.3},{:.3}@{}",
            self.location.latitude,
            self.location.longitude,
            self.predicted_time_start.to_rfc3339()
        )
    }
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserPreferences {
    pub min_probability: f64,
    /// Maximum distance the user is willing to travel.
    pub max_distance_km: f64,
    pub notification_enabled: bool,
    pub favorite_locations: Vec<Location>,
    pub notification_lead_time_minutes: u32,
}

impl Default for UserPreferences {
    fn default() -> Self {
        Self {
            min_probability: DEFAULT_MIN_PROBABILITY,
            max_distance_km: DEFAULT_NOTIFICATION_RADIUS_KM,
            notification_enabled: true,
            favorite_locations: Vec::new(),
            notification_lead_time_minutes: DEFAULT_NOTIFICATION_LEAD_TIME_MINUTES,
        }
    }
}

impl UserPreferences {
    pub fn validate(&self) -> RainbowResult<()> {
        if !(0.0..=1.0).contains(&self.min_probability) {
            return Err(RainbowError::InvalidInput(format!(
                "min_probability {} outside [0, 1]",
                self.min_probability
            )));
        }
        if !self.max_distance_km.is_finite() || self.max_distance_km < 0.0 {
            return Err(RainbowError::InvalidInput(format!(
                "max_distance_km {} must be a non-negative number",
                self.max_distance_km
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationChannel {
    #[default]
    Push,
    Email,
    Webhook,
}

impl fmt::Display for NotificationChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Push => "push",
            Self::Email => "email",
            Self::Webhook => "webhook",
        })
    }
}

impl FromStr for NotificationChannel {
    type Err = RainbowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "push" => Ok(Self::Push),
            "email" => Ok(Self::Email),
            "webhook" => Ok(Self::Webhook),
            other => Err(RainbowError::InvalidInput(format!(
                "unknown notification channel '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationStatus {
    Scheduled,
    Sent,
    Delivered,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub user_id: String,
    pub prediction_id: String,
    pub channel: NotificationChannel,
    pub title: String,
    pub message: String,
    /// When the notification was, or will be, sent.
    pub notification_time: DateTime<Utc>,
    pub status: NotificationStatus,
}
