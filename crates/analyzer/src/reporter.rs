//! Human-readable prediction report.
//!
//! Takes the predictions of one run and produces a boxed summary with
//! per-window detail and timing.

use rainbow_core::{Location, RainbowPrediction};

/// Report produced from one prediction run.
#[derive(Debug)]
pub struct PredictionReport {
    pub location: Location,
    pub generated_at: chrono::DateTime<chrono::Utc>,
    pub total_windows: usize,
    pub highest_probability: f64,
    pub windows: Vec<WindowSummary>,
    pub fetch_time: std::time::Duration,
    pub total_time: std::time::Duration,
}

/// One prediction window, flattened for display.
#[derive(Debug)]
pub struct WindowSummary {
    pub start: String,
    pub end: String,
    pub probability: f64,
    pub intensity: f64,
    pub rainbow_type: String,
    pub sun_elevation: f64,
    pub facing_azimuth: f64,
    pub best_spot: Option<Location>,
}

impl PredictionReport {
    /// Build a report from predictions (assumed sorted best first).
    pub fn build(
        location: &Location,
        predictions: &[RainbowPrediction],
        fetch_time: std::time::Duration,
        total_time: std::time::Duration,
    ) -> Self {
        let windows: Vec<WindowSummary> = predictions
            .iter()
            .map(|p| WindowSummary {
                start: p.predicted_time_start.format("%Y-%m-%d %H:%M").to_string(),
                end: p.predicted_time_end.format("%H:%M").to_string(),
                probability: p.probability,
                intensity: p.intensity,
                rainbow_type: p.rainbow_type.to_string(),
                sun_elevation: p.sun_position.elevation,
                facing_azimuth: p.sun_position.antisolar_azimuth(),
                best_spot: p.viewing_locations.first().cloned(),
            })
            .collect();

        PredictionReport {
            location: location.clone(),
            generated_at: chrono::Utc::now(),
            total_windows: windows.len(),
            highest_probability: predictions
                .iter()
                .map(|p| p.probability)
                .fold(0.0, f64::max),
            windows,
            fetch_time,
            total_time,
        }
    }

    /// Render the report as a formatted string.
    pub fn render(&self) -> String {
        let mut out = String::new();

        out.push('\n');
        out.push_str("╔══════════════════════════════════════════════════════════════╗\n");
        out.push_str("║                   RAINBOW FORECAST REPORT                    ║\n");
        out.push_str("╠══════════════════════════════════════════════════════════════╣\n");
        field(&mut out, "Location:", &self.location.to_string());
        field(&mut out, "Windows:", &self.total_windows.to_string());
        field(
            &mut out,
            "Best chance:",
            &format!("{:.0}%", self.highest_probability * 100.0),
        );
        field(&mut out, "Fetch time:", &format!("{:?}", self.fetch_time));
        field(&mut out, "Total time:", &format!("{:?}", self.total_time));
        out.push_str("╠══════════════════════════════════════════════════════════════╣\n");

        if self.windows.is_empty() {
            row(&mut out, "  No rainbow windows in this forecast.");
        } else {
            row(&mut out, "  RAINBOW WINDOWS (UTC)");
            out.push_str("╠══════════════════════════════════════════════════════════════╣\n");

            for (i, w) in self.windows.iter().enumerate() {
                row(&mut out, "");
                row(
                    &mut out,
                    &format!(
                        "  {}. {} - {}  [{}]  {:.0}%",
                        i + 1,
                        w.start,
                        w.end,
                        w.rainbow_type,
                        w.probability * 100.0
                    ),
                );
                row(
                    &mut out,
                    &format!(
                        "     Sun {:.1}° up  |  Face {:.0}°  |  Intensity {:.2}",
                        w.sun_elevation, w.facing_azimuth, w.intensity
                    ),
                );
                if let Some(spot) = &w.best_spot {
                    row(
                        &mut out,
                        &format!("     View from {:.4},{:.4}", spot.latitude, spot.longitude),
                    );
                }
            }
        }

        out.push_str("╚══════════════════════════════════════════════════════════════╝\n");
        out
    }
}

/// Characters between the box borders.
const INNER_WIDTH: usize = 62;
const VALUE_WIDTH: usize = 38;

/// Truncates to `width` characters, marking the cut with an ellipsis.
fn fit(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(width.saturating_sub(1)).collect();
    cut.push('…');
    cut
}

fn row(out: &mut String, text: &str) {
    let text = fit(text, INNER_WIDTH);
    let pad = INNER_WIDTH - text.chars().count();
    out.push_str(&format!("║{text}{}║\n", " ".repeat(pad)));
}

fn field(out: &mut String, label: &str, value: &str) {
    let value = fit(value, VALUE_WIDTH);
    row(out, &format!("  {label:<20}{value:>width$}", width = VALUE_WIDTH));
}
