//! Solar ephemeris: sun position, day/night crossings, clear-sky intensity.
//!
//! Implements the NOAA general solar position algorithm (equation of time
//! plus declination from the sun's apparent longitude). Good to a few
//! hundredths of a degree between 1900 and 2100; elevations are geometric,
//! without atmospheric refraction.

use chrono::{DateTime, Duration, NaiveDate, Timelike, Utc};
use rainbow_core::constants::GOLDEN_HOUR_ELEVATION;
use rainbow_core::geo::normalize_degrees;
use rainbow_core::{DayNightCycle, Location, SunPosition};

/// Zenith at sunrise/sunset: 50' for refraction plus the solar radius.
const SUNRISE_ZENITH: f64 = 90.833;
const CIVIL_TWILIGHT_ZENITH: f64 = 96.0;

/// Solar constant, W/m².
const SOLAR_CONSTANT: f64 = 1361.0;

/// Declination and equation of time for one instant.
#[derive(Debug, Clone, Copy)]
struct SolarTerms {
    declination: f64,
    /// Minutes.
    eq_time: f64,
}

fn julian_century(at: DateTime<Utc>) -> f64 {
    let secs = at.timestamp() as f64 + f64::from(at.timestamp_subsec_nanos()) * 1e-9;
    let jd = secs / 86_400.0 + 2_440_587.5;
    (jd - 2_451_545.0) / 36_525.0
}

fn solar_terms(t: f64) -> SolarTerms {
    let l0 = normalize_degrees(280.46646 + t * (36_000.76983 + t * 0.000_303_2));
    let m = 357.52911 + t * (35_999.05029 - 0.000_153_7 * t);
    let e = 0.016_708_634 - t * (0.000_042_037 + 0.000_000_126_7 * t);

    let m_rad = m.to_radians();
    let center = m_rad.sin() * (1.914602 - t * (0.004817 + 0.000014 * t))
        + (2.0 * m_rad).sin() * (0.019993 - 0.000101 * t)
        + (3.0 * m_rad).sin() * 0.000289;
    let true_long = l0 + center;

    let omega = (125.04 - 1934.136 * t).to_radians();
    let apparent_long = (true_long - 0.00569 - 0.00478 * omega.sin()).to_radians();

    let mean_obliquity =
        23.0 + (26.0 + (21.448 - t * (46.815 + t * (0.00059 - t * 0.001813))) / 60.0) / 60.0;
    let obliquity = (mean_obliquity + 0.00256 * omega.cos()).to_radians();

    let declination = (obliquity.sin() * apparent_long.sin()).asin();

    let y = (obliquity / 2.0).tan().powi(2);
    let l0_rad = l0.to_radians();
    let eq_time = 4.0
        * (y * (2.0 * l0_rad).sin() - 2.0 * e * m_rad.sin()
            + 4.0 * e * y * m_rad.sin() * (2.0 * l0_rad).cos()
            - 0.5 * y * y * (4.0 * l0_rad).sin()
            - 1.25 * e * e * (2.0 * m_rad).sin())
        .to_degrees();

    SolarTerms {
        declination,
        eq_time,
    }
}

/// Sun azimuth/elevation for an observer at `location` and instant `at`.
pub fn sun_position(location: &Location, at: DateTime<Utc>) -> SunPosition {
    let terms = solar_terms(julian_century(at));

    let minutes = f64::from(at.num_seconds_from_midnight()) / 60.0;
    let true_solar_time = (minutes + terms.eq_time + 4.0 * location.longitude).rem_euclid(1440.0);
    let hour_angle = (true_solar_time / 4.0 - 180.0).to_radians();

    let lat = location.latitude.to_radians();
    let decl = terms.declination;

    let cos_zenith =
        (lat.sin() * decl.sin() + lat.cos() * decl.cos() * hour_angle.cos()).clamp(-1.0, 1.0);
    let elevation = 90.0 - cos_zenith.acos().to_degrees();

    let azimuth = normalize_degrees(
        hour_angle
            .sin()
            .atan2(hour_angle.cos() * lat.sin() - decl.tan() * lat.cos())
            .to_degrees()
            + 180.0,
    );

    SunPosition {
        azimuth,
        elevation,
        timestamp: at,
    }
}

/// `count` positions starting at `start`, spaced by `step`.
pub fn sun_positions(
    location: &Location,
    start: DateTime<Utc>,
    count: usize,
    step: Duration,
) -> Vec<SunPosition> {
    (0..count)
        .map(|i| sun_position(location, start + step * i as i32))
        .collect()
}

/// Hour angle (degrees) at which the sun crosses `zenith`; `None` if it never does.
fn crossing_hour_angle(latitude: f64, declination: f64, zenith: f64) -> Option<f64> {
    let lat = latitude.to_radians();
    let cos_h = zenith.to_radians().cos() / (lat.cos() * declination.cos())
        - lat.tan() * declination.tan();
    if !(-1.0..=1.0).contains(&cos_h) {
        return None;
    }
    Some(cos_h.acos().to_degrees())
}

/// Sunrise, sunset, civil twilight and golden hour for `date` (UTC day).
pub fn day_night_cycle(location: &Location, date: NaiveDate) -> DayNightCycle {
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc())
        .unwrap_or_default();
    let at_minutes = |m: f64| midnight + Duration::milliseconds((m * 60_000.0).round() as i64);

    // Solar noon, refined once with terms evaluated at the first estimate.
    let first = solar_terms(julian_century(at_minutes(720.0 - 4.0 * location.longitude)));
    let noon_guess = 720.0 - 4.0 * location.longitude - first.eq_time;
    let terms = solar_terms(julian_century(at_minutes(noon_guess)));
    let solar_noon = 720.0 - 4.0 * location.longitude - terms.eq_time;

    let pair = |zenith: f64| {
        crossing_hour_angle(location.latitude, terms.declination, zenith)
            .map(|ha| (at_minutes(solar_noon - 4.0 * ha), at_minutes(solar_noon + 4.0 * ha)))
    };

    let sun = pair(SUNRISE_ZENITH);
    let civil = pair(CIVIL_TWILIGHT_ZENITH);
    let golden = pair(90.0 - GOLDEN_HOUR_ELEVATION);

    DayNightCycle {
        date,
        sunrise: sun.map(|p| p.0),
        sunset: sun.map(|p| p.1),
        civil_twilight_begin: civil.map(|p| p.0),
        civil_twilight_end: civil.map(|p| p.1),
        golden_hour_end: golden.map(|p| p.0),
        golden_hour_begin: golden.map(|p| p.1),
    }
}

/// Clear-sky direct-beam irradiance (W/m²); zero with the sun down.
///
/// Uses the Kasten–Young air-mass formula and the Meinel attenuation model.
pub fn solar_intensity(location: &Location, at: DateTime<Utc>) -> f64 {
    let sun = sun_position(location, at);
    if sun.elevation <= 0.0 {
        return 0.0;
    }
    let zenith = 90.0 - sun.elevation;
    let air_mass =
        1.0 / (zenith.to_radians().cos() + 0.50572 * (96.07995 - zenith).powf(-1.6364));
    SOLAR_CONSTANT * 0.7_f64.powf(air_mass.powf(0.678))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn greenwich() -> Location {
        Location::new(51.4769, 0.0)
    }

    fn seattle() -> Location {
        Location::new(47.6062, -122.3321)
    }

    #[test]
    fn greenwich_solstice_noon() {
        let at = Utc.with_ymd_and_hms(2024, 6, 20, 12, 0, 0).unwrap();
        let sun = sun_position(&greenwich(), at);
        // 90 - 51.48 + 23.44
        assert!((sun.elevation - 61.96).abs() < 0.3, "elevation {}", sun.elevation);
        assert!((sun.azimuth - 180.0).abs() < 2.0, "azimuth {}", sun.azimuth);
    }

    #[test]
    fn equator_equinox_near_zenith() {
        let at = Utc.with_ymd_and_hms(2024, 3, 20, 12, 0, 0).unwrap();
        let sun = sun_position(&Location::new(0.0, 0.0), at);
        assert!(sun.elevation > 87.0, "elevation {}", sun.elevation);
    }

    #[test]
    fn morning_sun_is_in_the_east() {
        // 08:00 local (PDT = UTC-7).
        let at = Utc.with_ymd_and_hms(2024, 6, 20, 15, 0, 0).unwrap();
        let sun = sun_position(&seattle(), at);
        assert!(sun.azimuth > 45.0 && sun.azimuth < 135.0, "azimuth {}", sun.azimuth);
        assert!(sun.elevation > 10.0 && sun.elevation < 42.0, "elevation {}", sun.elevation);
    }

    #[test]
    fn midnight_sun_is_below_horizon_mid_latitudes() {
        // 00:00 local in Seattle.
        let at = Utc.with_ymd_and_hms(2024, 6, 21, 7, 0, 0).unwrap();
        assert!(sun_position(&seattle(), at).elevation < 0.0);
    }

    #[test]
    fn sunrise_is_where_sun_crosses_horizon() {
        let date = NaiveDate::from_ymd_opt(2024, 6, 20).unwrap();
        let cycle = day_night_cycle(&seattle(), date);
        let sunrise = cycle.sunrise.unwrap();
        let sunset = cycle.sunset.unwrap();

        let elev = sun_position(&seattle(), sunrise).elevation;
        assert!((elev + 0.833).abs() < 0.1, "elevation at sunrise {elev}");

        let day_hours = (sunset - sunrise).num_minutes() as f64 / 60.0;
        assert!(day_hours > 15.5 && day_hours < 16.5, "day length {day_hours}");
    }

    #[test]
    fn crossings_are_ordered() {
        let date = NaiveDate::from_ymd_opt(2024, 9, 1).unwrap();
        let c = day_night_cycle(&seattle(), date);
        let seq = [
            c.civil_twilight_begin.unwrap(),
            c.sunrise.unwrap(),
            c.golden_hour_end.unwrap(),
            c.golden_hour_begin.unwrap(),
            c.sunset.unwrap(),
            c.civil_twilight_end.unwrap(),
        ];
        assert!(seq.windows(2).all(|w| w[0] < w[1]), "{seq:?}");
    }

    #[test]
    fn polar_day_and_night() {
        let tromso = Location::new(69.65, 18.96);

        let summer = day_night_cycle(&tromso, NaiveDate::from_ymd_opt(2024, 6, 21).unwrap());
        assert!(summer.sunrise.is_none() && summer.sunset.is_none());

        let winter = day_night_cycle(&tromso, NaiveDate::from_ymd_opt(2024, 12, 21).unwrap());
        assert!(winter.sunrise.is_none());
        assert!(winter.golden_hour_end.is_none());
        // Sun still climbs above -6°, so civil twilight exists.
        assert!(winter.civil_twilight_begin.is_some());
    }

    #[test]
    fn intensity_zero_at_night_and_high_at_zenith() {
        let night = Utc.with_ymd_and_hms(2024, 3, 20, 0, 0, 0).unwrap();
        assert_eq!(solar_intensity(&Location::new(0.0, 0.0), night), 0.0);

        let noon = Utc.with_ymd_and_hms(2024, 3, 20, 12, 0, 0).unwrap();
        let i = solar_intensity(&Location::new(0.0, 0.0), noon);
        assert!(i > 900.0 && i < 1000.0, "intensity {i}");
    }

    #[test]
    fn position_series_spacing() {
        let start = Utc.with_ymd_and_hms(2024, 6, 20, 12, 0, 0).unwrap();
        let series = sun_positions(&seattle(), start, 4, Duration::minutes(30));
        assert_eq!(series.len(), 4);
        assert_eq!(series[3].timestamp, start + Duration::minutes(90));
    }
}
