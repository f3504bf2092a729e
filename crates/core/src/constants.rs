//! Physical constants and tuning thresholds shared across the workspace.

// ---------------------------------------------------------------------------
// Rainbow optics
// ---------------------------------------------------------------------------

/// Angular radius of the primary bow around the antisolar point (degrees).
pub const RAINBOW_ANGLE_PRIMARY: f64 = 42.0;
/// Angular radius of the secondary bow (degrees).
pub const RAINBOW_ANGLE_SECONDARY: f64 = 51.0;
pub const WATER_REFRACTIVE_INDEX: f64 = 1.33;

// ---------------------------------------------------------------------------
// Weather thresholds
// ---------------------------------------------------------------------------

/// mm/h of rain needed for droplets to form a bow.
pub const MIN_PRECIPITATION_RATE: f64 = 0.1;
/// Cloud cover (%) beyond which the sun is unlikely to break through.
pub const MAX_CLOUD_COVER: f64 = 70.0;
/// Relative humidity (%) at which fog droplets can produce a fogbow.
pub const FOG_HUMIDITY_THRESHOLD: f64 = 95.0;

// ---------------------------------------------------------------------------
// Sun elevation bounds (degrees above horizon)
// ---------------------------------------------------------------------------

pub const MIN_SUN_ELEVATION: f64 = 0.0;
pub const MAX_SUN_ELEVATION: f64 = 42.0;
/// Elevation where the probability model peaks.
pub const OPTIMAL_SUN_ELEVATION: f64 = 20.0;
/// Distance from the optimum at which the elevation factor reaches zero.
pub const SUN_ELEVATION_SPREAD: f64 = 30.0;
pub const GOLDEN_HOUR_ELEVATION: f64 = 6.0;

// ---------------------------------------------------------------------------
// Probability model
// ---------------------------------------------------------------------------

pub const PROBABILITY_SCALE: f64 = 0.8;
/// Rain rate (mm/h) beyond which more rain no longer raises the score.
pub const PRECIPITATION_SATURATION: f64 = 1.0;

// ---------------------------------------------------------------------------
// Geometry
// ---------------------------------------------------------------------------

pub const EARTH_RADIUS_KM: f64 = 6371.0;
/// How far an observer should stand from the rain curtain.
pub const DEFAULT_VIEWING_DISTANCE_KM: f64 = 3.0;
/// Nominal distance of the rain curtain when projecting the arc to ground.
pub const DEFAULT_ARC_DISTANCE_KM: f64 = 2.0;
pub const DEFAULT_ARC_SAMPLES: usize = 37;

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

pub const DEFAULT_MIN_PROBABILITY: f64 = 0.5;
pub const DEFAULT_NOTIFICATION_RADIUS_KM: f64 = 10.0;
pub const DEFAULT_NOTIFICATION_LEAD_TIME_MINUTES: u32 = 30;

// ---------------------------------------------------------------------------
// Refresh cadence
// ---------------------------------------------------------------------------

pub const PREDICTION_UPDATE_INTERVAL_MINUTES: u64 = 5;
pub const WEATHER_UPDATE_INTERVAL_MINUTES: u64 = 15;
