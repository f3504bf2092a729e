//! Static gazetteer of well-known places.
//!
//! Provides geocoding and reverse geocoding without external API calls.
//! The registry leans toward places known for frequent rainbows.

use rainbow_core::geo::haversine_km;
use rainbow_core::Location;
use std::collections::BTreeMap;
use std::sync::LazyLock;

/// A named place with its region.
#[derive(Debug, Clone)]
pub struct Place {
    pub name: &'static str,
    pub region: &'static str,
    pub latitude: f64,
    pub longitude: f64,
}

impl Place {
    const fn new(name: &'static str, region: &'static str, latitude: f64, longitude: f64) -> Self {
        Self {
            name,
            region,
            latitude,
            longitude,
        }
    }

    pub fn location(&self) -> Location {
        Location::new(self.latitude, self.longitude).with_name(self.name)
    }
}

/// Resolves an address to coordinates.
///
/// Accepts a registered place name (case and spacing are ignored) or a
/// literal `"lat,lng"` pair.
pub fn geocode(address: &str) -> Option<Location> {
    let key = normalize(address);
    if key.is_empty() {
        return None;
    }
    if let Some(place) = PLACES.get(key.as_str()) {
        return Some(place.location());
    }
    address.parse::<Location>().ok()
}

/// Nearest registered place within `max_km` of `location`.
///
/// Equidistant places resolve to the alphabetically first name.
pub fn reverse_geocode(location: &Location, max_km: f64) -> Option<&'static Place> {
    nearest(PLACES.values(), location, max_km)
}

fn nearest<'a>(
    places: impl Iterator<Item = &'a Place>,
    location: &Location,
    max_km: f64,
) -> Option<&'a Place> {
    places
        .map(|p| (haversine_km(location, &p.location()), p))
        .filter(|(d, _)| *d <= max_km)
        .min_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.name.cmp(b.1.name)))
        .map(|(_, p)| p)
}

/// All registered places, ordered by normalized name.
pub fn places() -> impl Iterator<Item = &'static Place> {
    PLACES.values()
}

fn normalize(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

static PLACES: LazyLock<BTreeMap<String, Place>> = LazyLock::new(|| {
    let list = [
        // ── Pacific Northwest ────────────────────────────────────
        Place::new("Pike Place Market", "Washington, US", 47.6097, -122.3422),
        Place::new("Seattle", "Washington, US", 47.6062, -122.3321),
        Place::new("Kerry Park", "Washington, US", 47.6295, -122.3599),
        Place::new("Portland", "Oregon, US", 45.5152, -122.6784),
        Place::new("Vancouver", "British Columbia, CA", 49.2827, -123.1207),
        // ── Hawaii ───────────────────────────────────────────────
        Place::new("Honolulu", "Hawaii, US", 21.3069, -157.8583),
        Place::new("Manoa Valley", "Hawaii, US", 21.3156, -157.8064),
        Place::new("Hilo", "Hawaii, US", 19.7241, -155.0868),
        // ── Waterfalls ───────────────────────────────────────────
        Place::new("Niagara Falls", "Ontario, CA", 43.0896, -79.0849),
        Place::new("Victoria Falls", "Zimbabwe/Zambia", -17.9243, 25.8572),
        Place::new("Iguazu Falls", "Argentina/Brazil", -25.6953, -54.4367),
        Place::new("Yosemite Valley", "California, US", 37.7456, -119.5936),
        Place::new("Skogafoss", "Iceland", 63.5321, -19.5114),
        // ── Europe ───────────────────────────────────────────────
        Place::new("Dublin", "Ireland", 53.3498, -6.2603),
        Place::new("Galway", "Ireland", 53.2707, -9.0568),
        Place::new("Reykjavik", "Iceland", 64.1466, -21.9426),
        Place::new("Edinburgh", "Scotland, UK", 55.9533, -3.1883),
        Place::new("Bergen", "Norway", 60.3913, 5.3221),
        // ── Southern hemisphere ──────────────────────────────────
        Place::new("Auckland", "New Zealand", -36.8485, 174.7633),
        Place::new("Cape Town", "South Africa", -33.9249, 18.4241),
        Place::new("Hobart", "Tasmania, AU", -42.8821, 147.3272),
    ];

    list.into_iter()
        .map(|p| (normalize(p.name), p))
        .collect()
});
