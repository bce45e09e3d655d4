//! Category filtering.
//!
//! Categories are opaque strings (the built-in presets use OpenStreetMap
//! `key=value` tags). A category without `=` also matches every `key=value` tag
//! with that key. A candidate passes when:
//! - the include set is empty, or at least one of its tags matches the include set, and
//! - none of its tags matches the exclude set.
//!
//! Presets are named category sets unioned into the include set.

use std::collections::{BTreeMap, BTreeSet};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::config::SearchConfig;
use crate::error::{Result, TrackPoiError};

/// Named category sets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct PresetTable {
    presets: BTreeMap<String, BTreeSet<String>>,
}

impl PresetTable {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Presets for common touring needs, as OpenStreetMap tags.
    pub fn builtin() -> Self {
        let mut table = Self::new();
        table.insert(
            "accommodation",
            [
                "tourism=hotel",
                "tourism=hostel",
                "tourism=guest_house",
                "tourism=alpine_hut",
                "tourism=camp_site",
            ],
        );
        table.insert("camping", ["tourism=camp_site", "tourism=caravan_site"]);
        table.insert("drinking_water", ["amenity=drinking_water", "amenity=water_point"]);
        table.insert(
            "food",
            ["amenity=restaurant", "amenity=cafe", "amenity=fast_food", "shop=bakery"],
        );
        table.insert("groceries", ["shop=supermarket", "shop=convenience", "shop=bakery"]);
        table.insert("bike_service", ["shop=bicycle", "amenity=bicycle_repair_station"]);
        table.insert("toilets", ["amenity=toilets"]);
        table
    }

    /// Add or replace a preset.
    pub fn insert<I, S>(&mut self, name: &str, categories: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.presets.insert(
            name.to_string(),
            categories.into_iter().map(Into::into).collect(),
        );
    }

    pub fn get(&self, name: &str) -> Option<&BTreeSet<String>> {
        self.presets.get(name)
    }

    /// Preset names in alphabetical order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.presets.keys().map(String::as_str)
    }
}

/// Result of filtering one candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterOutcome {
    Rejected,
    /// `matched` is the include category that admitted the candidate, if the include
    /// set is non-empty.
    Accepted { matched: Option<String> },
}

/// Resolved include/exclude sets for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryFilter {
    include: BTreeSet<String>,
    exclude: BTreeSet<String>,
}

impl CategoryFilter {
    pub fn new(include: BTreeSet<String>, exclude: BTreeSet<String>) -> Self {
        Self { include, exclude }
    }

    /// Expand the config's presets and build the filter.
    /// Fails with [`TrackPoiError::InvalidParameter`] on an unknown preset.
    pub fn from_config(config: &SearchConfig) -> Result<Self> {
        let mut include = config.include_categories.clone();
        for name in &config.presets {
            let categories = config.preset_table.get(name).ok_or_else(|| {
                TrackPoiError::invalid_parameter("presets", format!("unknown preset `{}`", name))
            })?;
            include.extend(categories.iter().cloned());
        }

        Ok(Self {
            include,
            exclude: config.exclude_categories.clone(),
        })
    }

    /// Effective allow-list, presets included.
    pub fn include_categories(&self) -> &BTreeSet<String> {
        &self.include
    }

    /// Filter one candidate by its tags.
    ///
    /// A category without `=` is a bare key and matches any `key=value` tag with that
    /// key. The reported match is the category, not the tag.
    pub fn evaluate(&self, tags: &[String]) -> FilterOutcome {
        let matched = if self.include.is_empty() {
            None
        } else {
            match tags.iter().find_map(|t| matching_category(&self.include, t)) {
                Some(category) => Some(category.to_string()),
                None => return FilterOutcome::Rejected,
            }
        };

        if tags.iter().any(|t| matching_category(&self.exclude, t).is_some()) {
            return FilterOutcome::Rejected;
        }

        FilterOutcome::Accepted { matched }
    }
}

/// Category in `set` admitting `tag`: the exact tag first, then its bare key.
fn matching_category<'a>(set: &'a BTreeSet<String>, tag: &str) -> Option<&'a str> {
    if let Some(exact) = set.get(tag) {
        return Some(exact.as_str());
    }
    let (key, _) = tag.split_once('=')?;
    set.get(key).map(String::as_str)
}
