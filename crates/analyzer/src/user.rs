//! User profiles: preferences, last known location, favorite spots.
//!
//! In-memory and thread-safe; optionally persisted as a JSON document.

use rainbow_core::error::{RainbowError, RainbowResult};
use rainbow_core::geo::haversine_km;
use rainbow_core::{Location, RainbowPrediction, UserPreferences};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserProfile {
    pub preferences: UserPreferences,
    pub location: Option<Location>,
}

/// Profiles keyed by user id.
#[derive(Debug, Default)]
pub struct UserStore {
    profiles: RwLock<BTreeMap<String, UserProfile>>,
}

impl UserStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, UserProfile>> {
        self.profiles.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, UserProfile>> {
        self.profiles.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Loads a store from `path`; a missing file yields an empty store.
    /// Every stored profile must hold valid preferences.
    pub fn load(path: &Path) -> RainbowResult<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no user store yet, starting empty");
            return Ok(Self::new());
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| RainbowError::Internal(format!("reading {}: {e}", path.display())))?;
        let profiles: BTreeMap<String, UserProfile> = serde_json::from_str(&content)
            .map_err(|e| RainbowError::InvalidInput(format!("parsing {}: {e}", path.display())))?;
        for (user_id, profile) in &profiles {
            profile.preferences.validate().map_err(|e| {
                RainbowError::InvalidInput(format!("{}: user '{user_id}': {e}", path.display()))
            })?;
        }
        tracing::info!(path = %path.display(), users = profiles.len(), "loaded user store");
        Ok(Self {
            profiles: RwLock::new(profiles),
        })
    }

    pub fn save(&self, path: &Path) -> RainbowResult<()> {
        let json = serde_json::to_string_pretty(&*self.read())
            .map_err(|e| RainbowError::Internal(format!("serializing user store: {e}")))?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| {
                    RainbowError::Internal(format!("creating {}: {e}", parent.display()))
                })?;
        }
        std::fs::write(path, json)
            .map_err(|e| RainbowError::Internal(format!("writing {}: {e}", path.display())))
    }

    pub fn user_ids(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    pub fn profile(&self, user_id: &str) -> Option<UserProfile> {
        self.read().get(user_id).cloned()
    }

    /// Stored preferences, or defaults for an unknown user.
    pub fn get_preferences(&self, user_id: &str) -> UserPreferences {
        self.read()
            .get(user_id)
            .map(|p| p.preferences.clone())
            .unwrap_or_default()
    }

    pub fn update_preferences(
        &self,
        user_id: &str,
        preferences: UserPreferences,
    ) -> RainbowResult<()> {
        preferences.validate()?;
        self.write()
            .entry(user_id.to_string())
            .or_default()
            .preferences = preferences;
        tracing::info!(user_id, "updated preferences");
        Ok(())
    }

    pub fn set_location(&self, user_id: &str, location: Location) {
        self.write().entry(user_id.to_string()).or_default().location = Some(location);
    }

    pub fn get_user_location(&self, user_id: &str) -> Option<Location> {
        self.read().get(user_id).and_then(|p| p.location.clone())
    }

    /// Adds a named favorite; an existing favorite with the same name
    /// (case-insensitive) is replaced.
    pub fn add_favorite_location(
        &self,
        user_id: &str,
        location: Location,
        name: &str,
    ) -> RainbowResult<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(RainbowError::InvalidInput("favorite name must not be empty".into()));
        }
        let mut profiles = self.write();
        let favorites = &mut profiles
            .entry(user_id.to_string())
            .or_default()
            .preferences
            .favorite_locations;

        favorites.retain(|f| {
            !f.name
                .as_deref()
                .is_some_and(|n| n.eq_ignore_ascii_case(name))
        });
        favorites.push(location.with_name(name));
        tracing::info!(user_id, favorite = name, "added favorite location");
        Ok(())
    }
}

/// Keeps predictions that clear the user's probability bar and, when the
/// user's location is known, are reachable within their travel distance.
pub fn filter_predictions_by_preferences(
    predictions: &[RainbowPrediction],
    preferences: &UserPreferences,
    user_location: Option<&Location>,
) -> Vec<RainbowPrediction> {
    predictions
        .iter()
        .filter(|p| p.probability >= preferences.min_probability)
        .filter(|p| match user_location {
            None => true,
            Some(here) => nearest_viewing_distance(p, here) <= preferences.max_distance_km,
        })
        .cloned()
        .collect()
}

/// Distance from `from` to the closest viewing spot (or the rain itself).
pub fn nearest_viewing_distance(prediction: &RainbowPrediction, from: &Location) -> f64 {
    if prediction.viewing_locations.is_empty() {
        return haversine_km(from, &prediction.location);
    }
    prediction
        .viewing_locations
        .iter()
        .map(|v| haversine_km(from, v))
        .fold(f64::INFINITY, f64::min)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rainbow_core::geo::destination;
    use rainbow_core::{SunPosition, WeatherCondition};

    fn prediction(probability: f64, viewing: Vec<Location>) -> RainbowPrediction {
        let t = Utc::now();
        RainbowPrediction {
            location: Location::new(47.6062, -122.3321),
            probability,
            predicted_time_start: t,
            predicted_time_end: t,
            viewing_locations: viewing.into_iter().collect(),
            sun_position: SunPosition {
                azimuth: 260.0,
                elevation: 15.0,
                timestamp: t,
            },
            weather_condition: WeatherCondition {
                temperature: 15.0,
                humidity: 80.0,
                precipitation: 0.5,
                cloud_cover: 30.0,
                wind_speed: 5.0,
                wind_direction: 90.0,
                timestamp: t,
            },
            rainbow_type: Default::default(),
            intensity: 0.4,
            arc_coordinates: None,
        }
    }

    #[test]
    fn unknown_user_gets_defaults() {
        let store = UserStore::new();
        assert_eq!(store.get_preferences("nobody"), UserPreferences::default());
        assert!(store.get_user_location("nobody").is_none());
    }

    #[test]
    fn update_validates() {
        let store = UserStore::new();
        let bad = UserPreferences {
            min_probability: 2.0,
            ..Default::default()
        };
        assert!(store.update_preferences("u1", bad).is_err());
        assert!(store.profile("u1").is_none());

        let good = UserPreferences {
            min_probability: 0.3,
            ..Default::default()
        };
        store.update_preferences("u1", good.clone()).unwrap();
        assert_eq!(store.get_preferences("u1"), good);
    }

    #[test]
    fn favorites_replace_same_name() {
        let store = UserStore::new();
        store
            .add_favorite_location("u1", Location::new(1.0, 1.0), "Home")
            .unwrap();
        store
            .add_favorite_location("u1", Location::new(2.0, 2.0), "home")
            .unwrap();
        store
            .add_favorite_location("u1", Location::new(3.0, 3.0), "Park")
            .unwrap();

        let favs = store.get_preferences("u1").favorite_locations;
        assert_eq!(favs.len(), 2);
        assert_eq!(favs[0].latitude, 2.0);
        assert_eq!(favs[0].name.as_deref(), Some("home"));
        assert!(store
            .add_favorite_location("u1", Location::new(0.0, 0.0), "  ")
            .is_err());
    }

    #[test]
    fn filter_by_probability_only_without_location() {
        let preds = vec![prediction(0.4, vec![]), prediction(0.6, vec![])];
        let kept = filter_predictions_by_preferences(&preds, &UserPreferences::default(), None);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].probability, 0.6);
    }

    #[test]
    fn filter_by_distance_uses_nearest_viewing_spot() {
        let here = Location::new(47.6062, -122.3321);
        let near = destination(&here, 90.0, 4.0);
        let far = destination(&here, 90.0, 40.0);

        let reachable = prediction(0.9, vec![far.clone(), near]);
        let unreachable = prediction(0.9, vec![far]);
        let prefs = UserPreferences::default(); // 10 km

        let kept = filter_predictions_by_preferences(
            &[reachable.clone(), unreachable],
            &prefs,
            Some(&here),
        );
        assert_eq!(kept, vec![reachable]);
    }

    #[test]
    fn falls_back_to_prediction_location() {
        let p = prediction(0.9, vec![]);
        let from = destination(&p.location, 0.0, 7.0);
        assert!((nearest_viewing_distance(&p, &from) - 7.0).abs() < 1e-6);
    }

    #[test]
    fn persistence_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("users.json");

        let store = UserStore::new();
        store.set_location("u1", Location::new(47.0, -122.0));
        store
            .add_favorite_location("u1", Location::new(47.1, -122.1), "Lake")
            .unwrap();
        store.save(&path).unwrap();

        let loaded = UserStore::load(&path).unwrap();
        assert_eq!(loaded.user_ids(), vec!["u1".to_string()]);
        assert_eq!(loaded.profile("u1"), store.profile("u1"));

        let missing = UserStore::load(&dir.path().join("absent.json")).unwrap();
        assert!(missing.user_ids().is_empty());
    }

    #[test]
    fn load_rejects_invalid_preferences() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");
        std::fs::write(&path, r#"{"u1": {"preferences": {"min_probability": 5.0}}}"#).unwrap();

        let err = UserStore::load(&path).unwrap_err();
        assert!(err.to_string().contains("u1"), "{err}");

        std::fs::write(&path, r#"{"u1": {"preferences": {"min_probability": 0.4}}}"#).unwrap();
        let store = UserStore::load(&path).unwrap();
        assert_eq!(store.get_preferences("u1").min_probability, 0.4);
    }
}
