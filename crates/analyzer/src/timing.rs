//! Rainbow timing: score a forecast hour by hour, merge promising hours
//! into time windows, and turn each window into a full prediction.

use crate::rainbow::{
    calculate_optimal_viewing_position, calculate_rainbow_probability, classify,
    determine_viewing_locations, get_rainbow_arc_coordinates, rainbow_intensity,
};
use crate::solar::sun_position;
use chrono::Duration;
use rainbow_core::constants::{DEFAULT_ARC_DISTANCE_KM, DEFAULT_ARC_SAMPLES};
use rainbow_core::{
    Location, RainbowPrediction, RainbowType, SunPosition, TimeWindow, WeatherCondition,
};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Knobs for turning scored samples into predictions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictionSettings {
    /// Samples below this probability never start or extend a window.
    pub min_window_probability: f64,
    /// Radius around the rain within which viewing spots are suggested.
    pub viewing_radius_km: f64,
    /// Distance from the observer at which the arc is drawn.
    pub arc_distance_km: f64,
    pub arc_samples: usize,
}

impl Default for PredictionSettings {
    fn default() -> Self {
        Self {
            min_window_probability: 0.05,
            viewing_radius_km: 5.0,
            arc_distance_km: DEFAULT_ARC_DISTANCE_KM,
            arc_samples: DEFAULT_ARC_SAMPLES,
        }
    }
}

/// One forecast sample with its sun position and model outputs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredSample {
    pub weather: WeatherCondition,
    pub sun: SunPosition,
    pub probability: f64,
    pub intensity: f64,
    pub rainbow_type: Option<RainbowType>,
}

/// A merged window plus the sample indices backing it.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateWindow {
    pub window: TimeWindow,
    pub members: Range<usize>,
    /// Index of the highest-probability member.
    pub peak: usize,
}

/// Scores every sample in parallel. Output order matches `forecast`.
pub fn score_forecast(location: &Location, forecast: &[WeatherCondition]) -> Vec<ScoredSample> {
    forecast
        .par_iter()
        .map(|weather| {
            let sun = sun_position(location, weather.timestamp);
            ScoredSample {
                probability: calculate_rainbow_probability(weather, &sun),
                intensity: rainbow_intensity(weather, &sun),
                rainbow_type: classify(weather, &sun),
                sun,
                weather: weather.clone(),
            }
        })
        .collect()
}

/// Typical spacing between samples: the median gap, or one hour.
pub fn sample_step(samples: &[ScoredSample]) -> Duration {
    let mut gaps: Vec<Duration> = samples
        .windows(2)
        .map(|w| w[1].weather.timestamp - w[0].weather.timestamp)
        .filter(|d| *d > Duration::zero())
        .collect();
    if gaps.is_empty() {
        return Duration::hours(1);
    }
    gaps.sort();
    gaps[gaps.len() / 2]
}

/// Merges runs of consecutive samples at or above `min_probability`.
///
/// Samples scoring exactly zero, or with no possible bow type, never
/// qualify. A gap wider than the sample step ends a run.
pub fn merge_windows(samples: &[ScoredSample], min_probability: f64) -> Vec<CandidateWindow> {
    let step = sample_step(samples);
    let qualifies = |s: &ScoredSample| {
        s.rainbow_type.is_some() && s.probability > 0.0 && s.probability >= min_probability
    };
    let contiguous =
        |i: usize| samples[i].weather.timestamp - samples[i - 1].weather.timestamp <= step;

    let mut windows = Vec::new();
    let mut i = 0;
    while i < samples.len() {
        if !qualifies(&samples[i]) {
            i += 1;
            continue;
        }
        let start = i;
        i += 1;
        while i < samples.len() && qualifies(&samples[i]) && contiguous(i) {
            i += 1;
        }
        let members = start..i;
        let peak = members
            .clone()
            .max_by(|a, b| {
                samples[*a]
                    .probability
                    .total_cmp(&samples[*b].probability)
                    // Earliest sample wins a tie.
                    .then(b.cmp(a))
            })
            .unwrap_or(start);

        windows.push(CandidateWindow {
            window: TimeWindow {
                start: samples[start].weather.timestamp,
                end: samples[i - 1].weather.timestamp + step,
                probability: samples[peak].probability,
            },
            members,
            peak,
        });
    }
    windows
}

/// One prediction per window, best first.
pub fn build_predictions(
    location: &Location,
    samples: &[ScoredSample],
    windows: &[CandidateWindow],
    settings: &PredictionSettings,
) -> Vec<RainbowPrediction> {
    let mut predictions: Vec<RainbowPrediction> = windows
        .iter()
        .filter_map(|cw| {
            let peak = &samples[cw.peak];
            let rainbow_type = peak.rainbow_type?;
            let viewing_locations =
                determine_viewing_locations(location, &peak.sun, settings.viewing_radius_km);
            let arc = calculate_optimal_viewing_position(
                location,
                &peak.sun,
                settings.viewing_radius_km,
            )
            .map(|vp| {
                get_rainbow_arc_coordinates(
                    &vp.location,
                    &peak.sun,
                    settings.arc_distance_km,
                    settings.arc_samples,
                )
            })
            .filter(|arc| !arc.is_empty());

            Some(RainbowPrediction {
                location: location.clone(),
                probability: cw.window.probability,
                predicted_time_start: cw.window.start,
                predicted_time_end: cw.window.end,
                viewing_locations,
                sun_position: peak.sun,
                weather_condition: peak.weather.clone(),
                rainbow_type,
                intensity: peak.intensity,
                arc_coordinates: arc,
            })
        })
        .collect();

    predictions.sort_by(|a, b| {
        b.probability
            .total_cmp(&a.probability)
            .then(a.predicted_time_start.cmp(&b.predicted_time_start))
    });
    predictions
}

/// Score, merge, and build in one call.
pub fn predict(
    location: &Location,
    forecast: &[WeatherCondition],
    settings: &PredictionSettings,
) -> Vec<RainbowPrediction> {
    let samples = score_forecast(location, forecast);
    let windows = merge_windows(&samples, settings.min_window_probability);
    tracing::debug!(
        %location,
        samples = samples.len(),
        windows = windows.len(),
        "scored forecast"
    );
    build_predictions(location, &samples, &windows, settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    fn sample(ts: DateTime<Utc>, probability: f64) -> ScoredSample {
        ScoredSample {
            weather: WeatherCondition {
                temperature: 15.0,
                humidity: 80.0,
                precipitation: 0.5,
                cloud_cover: 30.0,
                wind_speed: 5.0,
                wind_direction: 90.0,
                timestamp: ts,
            },
            sun: SunPosition {
                azimuth: 260.0,
                elevation: 15.0,
                timestamp: ts,
            },
            probability,
            intensity: probability / 2.0,
            rainbow_type: Some(RainbowType::Primary),
        }
    }

    fn hourly(probs: &[f64]) -> Vec<ScoredSample> {
        let t0 = Utc.with_ymd_and_hms(2025, 6, 7, 12, 0, 0).unwrap();
        probs
            .iter()
            .enumerate()
            .map(|(i, p)| sample(t0 + Duration::hours(i as i64), *p))
            .collect()
    }

    #[test]
    fn merges_consecutive_runs() {
        let samples = hourly(&[0.0, 0.3, 0.6, 0.2, 0.0, 0.0, 0.4, 0.0]);
        let windows = merge_windows(&samples, 0.1);
        assert_eq!(windows.len(), 2);

        assert_eq!(windows[0].members, 1..4);
        assert_eq!(windows[0].peak, 2);
        assert_eq!(windows[0].window.probability, 0.6);
        assert_eq!(windows[0].window.start, samples[1].weather.timestamp);
        assert_eq!(windows[0].window.end, samples[3].weather.timestamp + Duration::hours(1));
        assert_eq!(windows[0].window.duration(), Duration::hours(3));

        assert_eq!(windows[1].members, 6..7);
    }

    #[test]
    fn threshold_splits_windows() {
        let samples = hourly(&[0.3, 0.05, 0.3]);
        assert_eq!(merge_windows(&samples, 0.1).len(), 2);
        assert_eq!(merge_windows(&samples, 0.0).len(), 1);
    }

    #[test]
    fn zero_probability_never_qualifies() {
        assert!(merge_windows(&hourly(&[0.0, 0.0]), 0.0).is_empty());
        assert!(merge_windows(&[], 0.0).is_empty());
    }

    #[test]
    fn peak_tie_goes_to_earliest() {
        let windows = merge_windows(&hourly(&[0.4, 0.4, 0.1]), 0.1);
        assert_eq!(windows[0].peak, 0);
    }

    #[test]
    fn step_uses_median_spacing() {
        let t0 = Utc.with_ymd_and_hms(2025, 6, 7, 12, 0, 0).unwrap();
        let samples = vec![
            sample(t0, 0.5),
            sample(t0 + Duration::minutes(15), 0.5),
            sample(t0 + Duration::minutes(30), 0.5),
            sample(t0 + Duration::minutes(120), 0.5),
        ];
        assert_eq!(sample_step(&samples), Duration::minutes(15));
        assert_eq!(sample_step(&samples[..1]), Duration::hours(1));
    }

    #[test]
    fn predictions_sorted_best_first() {
        let location = Location::new(47.6062, -122.3321).with_name("Seattle");
        let samples = hourly(&[0.3, 0.0, 0.7, 0.0, 0.7]);
        let windows = merge_windows(&samples, 0.1);
        let preds =
            build_predictions(&location, &samples, &windows, &PredictionSettings::default());

        assert_eq!(preds.len(), 3);
        assert_eq!(preds[0].probability, 0.7);
        assert_eq!(preds[1].probability, 0.7);
        assert!(preds[0].predicted_time_start < preds[1].predicted_time_start);
        assert_eq!(preds[2].probability, 0.3);

        let best = &preds[0];
        assert_eq!(best.location, location);
        assert_eq!(best.viewing_locations.len(), 3);
        assert!(best.arc_coordinates.as_ref().is_some_and(|a| !a.is_empty()));
        assert_eq!(best.rainbow_type, RainbowType::Primary);
    }

    #[test]
    fn scoring_preserves_order_and_computes_sun() {
        let location = Location::new(47.6062, -122.3321);
        let t0 = Utc.with_ymd_and_hms(2024, 6, 20, 0, 0, 0).unwrap();
        let forecast: Vec<WeatherCondition> = (0..24)
            .map(|h| WeatherCondition {
                temperature: 15.0,
                humidity: 85.0,
                precipitation: 0.8,
                cloud_cover: 30.0,
                wind_speed: 5.0,
                wind_direction: 90.0,
                timestamp: t0 + Duration::hours(h),
            })
            .collect();

        let scored = score_forecast(&location, &forecast);
        assert_eq!(scored.len(), 24);
        for (s, w) in scored.iter().zip(&forecast) {
            assert_eq!(s.weather.timestamp, w.timestamp);
            assert_eq!(s.sun.timestamp, w.timestamp);
        }

        // Seattle on the solstice: low morning and evening sun both qualify,
        // midday sun (>42°) and night do not.
        let preds = predict(&location, &forecast, &PredictionSettings::default());
        assert!(preds.len() >= 2, "got {} windows", preds.len());
        for p in &preds {
            assert!(p.sun_position.elevation > 0.0 && p.sun_position.elevation < 42.0);
        }
    }

    #[test]
    fn gap_in_samples_ends_window() {
        let t0 = Utc.with_ymd_and_hms(2024, 6, 20, 2, 0, 0).unwrap();
        let samples: Vec<ScoredSample> = [0, 1, 12, 13]
            .iter()
            .map(|h| sample(t0 + Duration::hours(*h), 0.5))
            .collect();

        let windows = merge_windows(&samples, 0.1);
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[0].members, 0..2);
        assert_eq!(windows[0].window.end, t0 + Duration::hours(2));
        assert_eq!(windows[1].members, 2..4);
        assert_eq!(windows[1].window.start, t0 + Duration::hours(12));
    }

    #[test]
    fn samples_without_bow_type_never_qualify() {
        let mut samples = hourly(&[0.3, 0.3, 0.3]);
        samples[1].rainbow_type = None;
        let windows = merge_windows(&samples, 0.1);
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[0].members, 0..1);
        assert_eq!(windows[1].members, 2..3);
    }

    #[test]
    fn overcast_rain_yields_no_predictions() {
        let location = Location::new(47.6062, -122.3321);
        let t0 = Utc.with_ymd_and_hms(2024, 6, 20, 0, 0, 0).unwrap();
        let forecast: Vec<WeatherCondition> = (0..24)
            .map(|h| WeatherCondition {
                temperature: 15.0,
                humidity: 85.0,
                precipitation: 1.0,
                cloud_cover: 80.0,
                wind_speed: 5.0,
                wind_direction: 90.0,
                timestamp: t0 + Duration::hours(h),
            })
            .collect();

        let scored = score_forecast(&location, &forecast);
        assert!(scored.iter().any(|s| s.probability >= 0.05));
        assert!(scored.iter().all(|s| s.rainbow_type.is_none()));
        assert!(predict(&location, &forecast, &PredictionSettings::default()).is_empty());
    }
}
