//! Search configuration for one run.

use std::collections::BTreeSet;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::aggregator::ProximityClass;
use crate::error::{Result, TrackPoiError};
use crate::filter::PresetTable;
use crate::sampler::validate_positive;

/// Step between windows as a fraction of the radius when none is given.
/// Windows then overlap by 40% of their radius on a straight track.
pub const DEFAULT_STEP_RATIO: f64 = 0.6;

/// Distance limits of the proximity classes.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ProximityThresholds {
    /// POIs at most this far from the track are `Near`.
    /// Default: 2.0 km
    pub near_km: f64,

    /// POIs at most this far (and beyond `near_km`) are `Mid`; the rest are `Far`.
    /// Default: 5.0 km
    pub mid_km: f64,
}

impl Default for ProximityThresholds {
    fn default() -> Self {
        Self {
            near_km: 2.0,
            mid_km: 5.0,
        }
    }
}

impl ProximityThresholds {
    /// Bucket a distance. Each boundary belongs to the closer class.
    ///
    /// ```
    /// use alongtrack::{ProximityClass, ProximityThresholds};
    ///
    /// let t = ProximityThresholds::default();
    /// assert_eq!(t.classify(2.0), ProximityClass::Near);
    /// assert_eq!(t.classify(5.0), ProximityClass::Mid);
    /// assert_eq!(t.classify(5.1), ProximityClass::Far);
    /// ```
    pub fn classify(&self, distance_km: f64) -> ProximityClass {
        if distance_km <= self.near_km {
            ProximityClass::Near
        } else if distance_km <= self.mid_km {
            ProximityClass::Mid
        } else {
            ProximityClass::Far
        }
    }

    fn validate(&self) -> Result<()> {
        if !self.near_km.is_finite() || self.near_km < 0.0 {
            return Err(TrackPoiError::invalid_parameter(
                "thresholds.near_km",
                format!("must be a finite number >= 0, got {}", self.near_km),
            ));
        }
        if !self.mid_km.is_finite() || self.mid_km < self.near_km {
            return Err(TrackPoiError::invalid_parameter(
                "thresholds.mid_km",
                format!("must be finite and >= near_km ({}), got {}", self.near_km, self.mid_km),
            ));
        }
        Ok(())
    }
}

/// Configuration for one enrichment run. Immutable while the run is in progress.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SearchConfig {
    /// Maximum distance from the track for a POI to be reported, and the radius of
    /// every query window.
    /// Default: 5.0 km
    pub radius_km: f64,

    /// Distance along the track between consecutive query windows.
    /// Default: 3.0 km (0.6 x radius)
    pub step_km: f64,

    /// Allow-list of categories. Empty means every category is allowed.
    pub include_categories: BTreeSet<String>,

    /// Deny-list of categories, applied after the allow-list.
    pub exclude_categories: BTreeSet<String>,

    /// Preset names, expanded through `preset_table` into the allow-list.
    pub presets: BTreeSet<String>,

    /// Expansion table for `presets`.
    /// Default: [`PresetTable::builtin`]
    pub preset_table: PresetTable,

    /// Near/mid/far classification limits.
    pub thresholds: ProximityThresholds,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self::with_radius(5.0)
    }
}

impl SearchConfig {
    /// Default configuration with the given radius and a step of 0.6 x radius.
    pub fn with_radius(radius_km: f64) -> Self {
        Self {
            radius_km,
            step_km: radius_km * DEFAULT_STEP_RATIO,
            include_categories: BTreeSet::new(),
            exclude_categories: BTreeSet::new(),
            presets: BTreeSet::new(),
            preset_table: PresetTable::builtin(),
            thresholds: ProximityThresholds::default(),
        }
    }

    pub fn step_km(mut self, step_km: f64) -> Self {
        self.step_km = step_km;
        self
    }

    pub fn include<I, S>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.include_categories.extend(categories.into_iter().map(Into::into));
        self
    }

    pub fn exclude<I, S>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude_categories.extend(categories.into_iter().map(Into::into));
        self
    }

    pub fn preset<I, S>(mut self, presets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.presets.extend(presets.into_iter().map(Into::into));
        self
    }

    /// Check every numeric parameter and every preset name.
    pub fn validate(&self) -> Result<()> {
        validate_positive("radius_km", self.radius_km)?;
        validate_positive("step_km", self.step_km)?;
        self.thresholds.validate()?;
        for name in &self.presets {
            if self.preset_table.get(name).is_none() {
                return Err(TrackPoiError::invalid_parameter(
                    "presets",
                    format!("unknown preset `{}`", name),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_boundaries() {
        let t = ProximityThresholds::default();
        assert_eq!(t.classify(0.0), ProximityClass::Near);
        assert_eq!(t.classify(2.0), ProximityClass::Near);
        assert_eq!(t.classify(2.0000001), ProximityClass::Mid);
        assert_eq!(t.classify(5.0), ProximityClass::Mid);
        assert_eq!(t.classify(5.0000001), ProximityClass::Far);
    }

    #[test]
    fn test_custom_thresholds() {
        let t = ProximityThresholds { near_km: 0.5, mid_km: 1.0 };
        assert_eq!(t.classify(0.6), ProximityClass::Mid);
        assert_eq!(t.classify(1.5), ProximityClass::Far);
    }

    #[test]
    fn test_default_step_follows_radius() {
        let config = SearchConfig::with_radius(10.0);
        assert!((config.step_km - 6.0).abs() < 1e-12);
        assert_eq!(SearchConfig::default().radius_km, 5.0);
    }

    #[test]
    fn test_validate_numbers() {
        assert!(SearchConfig::default().validate().is_ok());
        assert!(SearchConfig::with_radius(0.0).validate().is_err());
        assert!(SearchConfig::with_radius(2.0).step_km(-1.0).validate().is_err());

        let mut config = SearchConfig::default();
        config.thresholds = ProximityThresholds { near_km: 3.0, mid_km: 1.0 };
        assert!(matches!(
            config.validate(),
            Err(TrackPoiError::InvalidParameter { ref name, .. }) if name == "thresholds.mid_km"
        ));
    }

    #[test]
    fn test_validate_unknown_preset() {
        let config = SearchConfig::default().preset(["no_such_preset"]);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("no_such_preset"));

        assert!(SearchConfig::default().preset(["camping"]).validate().is_ok());
    }

    #[test]
    fn test_builders_accumulate() {
        let config = SearchConfig::default()
            .include(["amenity=cafe"])
            .include(vec!["shop=bakery".to_string()])
            .exclude(["amenity=fast_food"]);
        assert_eq!(config.include_categories.len(), 2);
        assert!(config.exclude_categories.contains("amenity=fast_food"));
    }
}
