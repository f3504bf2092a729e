//! Machine-readable output for prediction runs.
//!
//! Two row schemas:
//! - [`RunSummaryRow`]: one per prediction run
//! - [`PredictionRow`]: one per predicted window (denormalized)
//!
//! Backend: **NDJSON stream**, newline-delimited JSON rows to any `Write` impl.

pub mod json_stream;

use crate::reporter::PredictionReport;
use rainbow_core::RainbowPrediction;
use serde::Serialize;

// ---------------------------------------------------------------------------
// Serializable row types
// ---------------------------------------------------------------------------

/// One row per prediction run: summary statistics.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummaryRow {
    pub location_name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub total_windows: u32,
    pub highest_probability: f64,
    pub fetch_time_ms: u64,
    pub total_time_ms: u64,
    pub created_at: String,
}

/// One row per predicted window: append-only, fully denormalized.
#[derive(Debug, Clone, Serialize)]
pub struct PredictionRow {
    pub prediction_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub window_start: String,
    pub window_end: String,
    pub probability: f64,
    pub intensity: f64,
    pub rainbow_type: String,
    pub sun_azimuth: f64,
    pub sun_elevation: f64,
    pub precipitation: f64,
    pub cloud_cover: f64,
    pub best_view_latitude: Option<f64>,
    pub best_view_longitude: Option<f64>,
    pub created_at: String,
}

// ---------------------------------------------------------------------------
// Builder: Report → Rows
// ---------------------------------------------------------------------------

impl PredictionReport {
    /// Flatten the report plus its predictions into sink-ready rows.
    pub fn to_rows(
        &self,
        predictions: &[RainbowPrediction],
    ) -> (RunSummaryRow, Vec<PredictionRow>) {
        let now = self.generated_at.to_rfc3339();

        let summary = RunSummaryRow {
            location_name: self
                .location
                .name
                .clone()
                .unwrap_or_else(|| self.location.to_string()),
            latitude: self.location.latitude,
            longitude: self.location.longitude,
            total_windows: self.total_windows as u32,
            highest_probability: self.highest_probability,
            fetch_time_ms: self.fetch_time.as_millis() as u64,
            total_time_ms: self.total_time.as_millis() as u64,
            created_at: now.clone(),
        };

        let rows = predictions
            .iter()
            .map(|p| {
                let spot = p.viewing_locations.first();
                PredictionRow {
                    prediction_id: p.id(),
                    latitude: p.location.latitude,
                    longitude: p.location.longitude,
                    window_start: p.predicted_time_start.to_rfc3339(),
                    window_end: p.predicted_time_end.to_rfc3339(),
                    probability: p.probability,
                    intensity: p.intensity,
                    rainbow_type: p.rainbow_type.to_string(),
                    sun_azimuth: p.sun_position.azimuth,
                    sun_elevation: p.sun_position.elevation,
                    precipitation: p.weather_condition.precipitation,
                    cloud_cover: p.weather_condition.cloud_cover,
                    best_view_latitude: spot.map(|s| s.latitude),
                    best_view_longitude: spot.map(|s| s.longitude),
                    created_at: now.clone(),
                }
            })
            .collect();

        (summary, rows)
    }
}
