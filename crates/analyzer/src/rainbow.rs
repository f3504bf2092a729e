//! Rainbow formation model and viewing geometry.
//!
//! A primary bow is a 42° circle around the antisolar point. With the sun
//! at elevation `e` the antisolar point sits `e` below the horizon, so the
//! top of the bow is at `42 - e`; once the sun climbs past 42° the whole
//! circle is underground.

use rainbow_core::constants::{
    DEFAULT_VIEWING_DISTANCE_KM, FOG_HUMIDITY_THRESHOLD, MAX_CLOUD_COVER, MAX_SUN_ELEVATION,
    MIN_PRECIPITATION_RATE, MIN_SUN_ELEVATION, OPTIMAL_SUN_ELEVATION, PRECIPITATION_SATURATION,
    PROBABILITY_SCALE, RAINBOW_ANGLE_PRIMARY, SUN_ELEVATION_SPREAD,
};
use rainbow_core::geo::{destination, normalize_degrees};
use rainbow_core::{Location, RainbowType, SunPosition, WeatherCondition};
use serde::Serialize;
use smallvec::SmallVec;
use std::f64::consts::PI;

pub use rainbow_provider::registry::{analyze_conditions, conditions_favorable};

/// Where to stand to see a bow over a given patch of rain.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewingPosition {
    pub location: Location,
    /// Look this way: the antisolar azimuth.
    pub facing_azimuth: f64,
    pub distance_km: f64,
    /// Elevation of the top of the primary arc.
    pub arc_top_elevation: f64,
}

#[inline]
fn sun_in_range(sun: &SunPosition) -> bool {
    sun.elevation > MIN_SUN_ELEVATION && sun.elevation < MAX_SUN_ELEVATION
}

#[inline]
fn rain_factor(weather: &WeatherCondition) -> f64 {
    (weather.precipitation / PRECIPITATION_SATURATION).clamp(0.0, 1.0)
}

#[inline]
fn sky_factor(weather: &WeatherCondition) -> f64 {
    (1.0 - weather.cloud_cover / 100.0).clamp(0.0, 1.0)
}

/// Chance in `[0, 1]` that a bow is visible under these conditions.
///
/// Rises with rain up to saturation, falls with cloud cover, and peaks
/// with the sun at 20°. Zero whenever the sun is down or above 42°.
pub fn calculate_rainbow_probability(weather: &WeatherCondition, sun: &SunPosition) -> f64 {
    if !sun_in_range(sun) {
        return 0.0;
    }
    let elevation_factor = (1.0
        - (sun.elevation - OPTIMAL_SUN_ELEVATION).abs() / SUN_ELEVATION_SPREAD)
        .clamp(0.0, 1.0);
    (PROBABILITY_SCALE * rain_factor(weather) * sky_factor(weather) * elevation_factor)
        .clamp(0.0, 1.0)
}

/// Brightness estimate in `[0, 1]`. A lower sun gives a taller, fuller arc.
pub fn rainbow_intensity(weather: &WeatherCondition, sun: &SunPosition) -> f64 {
    if !sun_in_range(sun) {
        return 0.0;
    }
    let height = 1.0 - sun.elevation / MAX_SUN_ELEVATION;
    (rain_factor(weather) * sky_factor(weather) * height).clamp(0.0, 1.0)
}

/// Most likely bow type, or `None` if nothing can form.
pub fn classify(weather: &WeatherCondition, sun: &SunPosition) -> Option<RainbowType> {
    if !sun_in_range(sun) {
        return None;
    }
    if weather.precipitation < MIN_PRECIPITATION_RATE {
        let foggy =
            weather.humidity >= FOG_HUMIDITY_THRESHOLD && weather.cloud_cover <= MAX_CLOUD_COVER;
        return foggy.then_some(RainbowType::Fogbow);
    }
    if !conditions_favorable(weather) {
        return None;
    }
    if rainbow_intensity(weather, sun) >= 0.5 {
        Some(RainbowType::Secondary)
    } else {
        Some(RainbowType::Primary)
    }
}

// ---------------------------------------------------------------------------
// Arc geometry
// ---------------------------------------------------------------------------

type Vec3 = [f64; 3];

/// Unit vector in (east, north, up) for an azimuth/altitude pair in degrees.
fn direction(azimuth: f64, altitude: f64) -> Vec3 {
    let (az, alt) = (azimuth.to_radians(), altitude.to_radians());
    [alt.cos() * az.sin(), alt.cos() * az.cos(), alt.sin()]
}

fn cross(a: Vec3, b: Vec3) -> Vec3 {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

fn normalize(v: Vec3) -> Vec3 {
    let n = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
    [v[0] / n, v[1] / n, v[2] / n]
}

/// Ground projection of the visible primary arc.
///
/// Samples `samples` points evenly around the 42° circle, keeps those above
/// the horizon, and projects each along its azimuth to `distance_km` from
/// the observer. Points run from one foot of the arc to the other.
pub fn get_rainbow_arc_coordinates(
    observer: &Location,
    sun: &SunPosition,
    distance_km: f64,
    samples: usize,
) -> Vec<Location> {
    if samples < 2 || !sun_in_range(sun) {
        return Vec::new();
    }

    let anti = direction(sun.antisolar_azimuth(), -sun.elevation);
    // `up` is the component of zenith perpendicular to the antisolar axis,
    // so θ = 0 is the top of the bow and the visible part is contiguous.
    let up = normalize([
        -anti[2] * anti[0],
        -anti[2] * anti[1],
        1.0 - anti[2] * anti[2],
    ]);
    let side = cross(anti, up);

    let radius = RAINBOW_ANGLE_PRIMARY.to_radians();
    let (cos_r, sin_r) = (radius.cos(), radius.sin());

    (0..samples)
        .filter_map(|i| {
            let theta = -PI + 2.0 * PI * i as f64 / (samples - 1) as f64;
            let (c, s) = (theta.cos(), theta.sin());
            let p = [
                cos_r * anti[0] + sin_r * (c * up[0] + s * side[0]),
                cos_r * anti[1] + sin_r * (c * up[1] + s * side[1]),
                cos_r * anti[2] + sin_r * (c * up[2] + s * side[2]),
            ];
            if p[2] < 0.0 {
                return None;
            }
            let azimuth = normalize_degrees(p[0].atan2(p[1]).to_degrees());
            Some(destination(observer, azimuth, distance_km))
        })
        .collect()
}

/// Best observer position for rain falling at `precipitation_location`.
///
/// The observer stands between the sun and the rain, facing away from the
/// sun, at most `max_distance_km` from the rain.
pub fn calculate_optimal_viewing_position(
    precipitation_location: &Location,
    sun: &SunPosition,
    max_distance_km: f64,
) -> Option<ViewingPosition> {
    if !sun_in_range(sun) || !(max_distance_km > 0.0) {
        return None;
    }
    let distance_km = DEFAULT_VIEWING_DISTANCE_KM.min(max_distance_km);
    let location = destination(precipitation_location, sun.azimuth, distance_km)
        .with_name("Optimal Viewing Position");

    Some(ViewingPosition {
        location,
        facing_azimuth: sun.antisolar_azimuth(),
        distance_km,
        arc_top_elevation: RAINBOW_ANGLE_PRIMARY - sun.elevation,
    })
}

/// Three candidate spots on the sun side of `center`, fanned ±30°.
pub fn determine_viewing_locations(
    center: &Location,
    sun: &SunPosition,
    radius_km: f64,
) -> SmallVec<[Location; 4]> {
    if !(radius_km > 0.0) {
        return SmallVec::new();
    }
    [-30.0, 0.0, 30.0]
        .iter()
        .enumerate()
        .map(|(i, offset)| {
            destination(center, normalize_degrees(sun.azimuth + offset), radius_km / 2.0)
                .with_name(format!("Optimal Viewing Point {}", i + 1))
        })
        .collect()
}
