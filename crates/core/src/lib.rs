//! Domain models, shared types, geodesy, and error definitions.
//!
//! Foundation crate -- no async or I/O dependencies.

pub mod constants;
pub mod error;
pub mod geo;
pub mod types;

pub use error::{RainbowError, RainbowResult};
pub use types::{
    DayNightCycle, Location, Notification, NotificationChannel, NotificationStatus,
    RainbowPrediction, RainbowType, SunPosition, TimeWindow, UserPreferences, WeatherCondition,
};
