//! Spherical-earth geodesy helpers.
//!
//! Accurate to well under 0.5% at the distances the pipeline cares about
//! (a few tens of kilometres), which is plenty for "where should I stand".

use crate::constants::EARTH_RADIUS_KM;
use crate::types::Location;

/// Maps any angle in degrees into `[0, 360)`.
#[inline]
pub fn normalize_degrees(deg: f64) -> f64 {
    let d = deg.rem_euclid(360.0);
    // rem_euclid can return 360.0 for tiny negative inputs.
    if d >= 360.0 {
        0.0
    } else {
        d
    }
}

/// Great-circle distance between two points, in kilometres.
pub fn haversine_km(a: &Location, b: &Location) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let dlat = lat2 - lat1;
    let dlon = (b.longitude - a.longitude).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().min(1.0).asin()
}

/// Initial bearing from `a` towards `b`, degrees clockwise from north.
pub fn initial_bearing(a: &Location, b: &Location) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let dlon = (b.longitude - a.longitude).to_radians();

    let y = dlon.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlon.cos();
    normalize_degrees(y.atan2(x).to_degrees())
}

/// Point reached by travelling `distance_km` from `origin` on `bearing`.
///
/// The result carries the origin's altitude but no name.
pub fn destination(origin: &Location, bearing: f64, distance_km: f64) -> Location {
    let delta = distance_km / EARTH_RADIUS_KM;
    let theta = bearing.to_radians();
    let lat1 = origin.latitude.to_radians();
    let lon1 = origin.longitude.to_radians();

    let lat2 = (lat1.sin() * delta.cos() + lat1.cos() * delta.sin() * theta.cos()).asin();
    let lon2 = lon1
        + (theta.sin() * delta.sin() * lat1.cos()).atan2(delta.cos() - lat1.sin() * lat2.sin());

    let lon_deg = (lon2.to_degrees() + 540.0).rem_euclid(360.0) - 180.0;

    Location {
        latitude: lat2.to_degrees(),
        longitude: lon_deg,
        altitude: origin.altitude,
        name: None,
    }
}

/// Points within `radius_km` of `center`, nearest first.
pub fn find_locations_in_radius(
    center: &Location,
    radius_km: f64,
    points: &[Location],
) -> Vec<Location> {
    if !radius_km.is_finite() || radius_km < 0.0 {
        return Vec::new();
    }

    let mut hits: Vec<(f64, &Location)> = points
        .iter()
        .map(|p| (haversine_km(center, p), p))
        .filter(|(d, _)| *d <= radius_km)
        .collect();
    hits.sort_by(|a, b| a.0.total_cmp(&b.0));
    hits.into_iter().map(|(_, p)| p.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seattle() -> Location {
        Location::new(47.6062, -122.3321)
    }

    fn portland() -> Location {
        Location::new(45.5152, -122.6784)
    }

    #[test]
    fn seattle_to_portland_distance() {
        let d = haversine_km(&seattle(), &portland());
        // Published great-circle distance is ~233 km.
        assert!((d - 233.0).abs() < 3.0, "got {d}");
    }

    #[test]
    fn distance_to_self_is_zero() {
        assert_eq!(haversine_km(&seattle(), &seattle()), 0.0);
    }

    #[test]
    fn bearing_cardinal_directions() {
        let origin = Location::new(0.0, 0.0);
        assert!((initial_bearing(&origin, &Location::new(1.0, 0.0)) - 0.0).abs() < 1e-9);
        assert!((initial_bearing(&origin, &Location::new(0.0, 1.0)) - 90.0).abs() < 1e-9);
        assert!((initial_bearing(&origin, &Location::new(-1.0, 0.0)) - 180.0).abs() < 1e-9);
        assert!((initial_bearing(&origin, &Location::new(0.0, -1.0)) - 270.0).abs() < 1e-9);
    }

    #[test]
    fn destination_inverts_distance_and_bearing() {
        let origin = seattle().with_altitude(50.0);
        let dest = destination(&origin, 135.0, 12.5);
        assert!((haversine_km(&origin, &dest) - 12.5).abs() < 1e-6);
        assert!((initial_bearing(&origin, &dest) - 135.0).abs() < 0.01);
        assert_eq!(dest.altitude, Some(50.0));
        assert!(dest.name.is_none());
    }

    #[test]
    fn destination_wraps_antimeridian() {
        let dest = destination(&Location::new(0.0, 179.9), 90.0, 50.0);
        assert!(dest.longitude < -179.0 && dest.longitude >= -180.0);
    }

    #[test]
    fn radius_search_sorted_and_bounded() {
        let center = seattle();
        let near = destination(&center, 0.0, 2.0).with_name("near");
        let mid = destination(&center, 90.0, 5.0).with_name("mid");
        let far = portland().with_name("far");
        let hits = find_locations_in_radius(&center, 10.0, &[mid.clone(), far, near.clone()]);
        assert_eq!(hits, vec![near, mid]);
    }

    #[test]
    fn radius_search_rejects_bad_radius() {
        assert!(find_locations_in_radius(&seattle(), -1.0, &[seattle()]).is_empty());
        assert!(find_locations_in_radius(&seattle(), f64::NAN, &[seattle()]).is_empty());
    }

    #[test]
    fn normalize_handles_negatives() {
        assert_eq!(normalize_degrees(-90.0), 270.0);
        assert_eq!(normalize_degrees(720.0), 0.0);
    }
}
