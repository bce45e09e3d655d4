//! Merge, filter, deduplicate and classify POI candidates.
//!
//! Every raw candidate is measured against the *whole* track (a candidate found
//! through one window may be closer to a different part of the track), filtered by
//! radius and category, and folded into an [`Aggregation`] keyed by `stable_id`.
//!
//! The fold keeps, per id, the occurrence with the smallest distance to the track,
//! then the smallest `km_from_start`, then the earliest (window, position) it was seen
//! at. That order is total, so [`Aggregation::merge`] is commutative and associative
//! and window results can be combined in any order or in parallel.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

use log::{debug, warn};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::config::{ProximityThresholds, SearchConfig};
use crate::error::{Result, TrackPoiError};
use crate::filter::{CategoryFilter, FilterOutcome};
use crate::sampler::QueryWindow;
use crate::source::{ContactFields, PoiSource, RawCandidate};
use crate::spatial_index::TrackIndex;
use crate::track::Track;

/// Name reported for candidates without one.
const UNNAMED: &str = "Unnamed";

/// Coarse distance bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum ProximityClass {
    Near,
    Mid,
    Far,
}

impl fmt::Display for ProximityClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ProximityClass::Near => "near",
            ProximityClass::Mid => "mid",
            ProximityClass::Far => "far",
        };
        f.pad(label)
    }
}

/// A POI near the track, with its position relative to the track.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EnrichedPoi {
    pub stable_id: String,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Shortest distance from the POI to the track (km)
    pub distance_from_track_km: f64,
    /// Distance along the track to the point of nearest approach (km)
    pub km_from_start: f64,
    pub proximity_class: ProximityClass,
    /// Include category that admitted the POI (None when no include filter is set)
    pub matched_category: Option<String>,
    pub category_tags: Vec<String>,
    pub contact: ContactFields,
}

/// Where a candidate was first reported: window index, then position in that
/// window's result list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct SeenAt {
    window: usize,
    position: usize,
}

#[derive(Debug, Clone)]
struct Ranked {
    poi: EnrichedPoi,
    seen: SeenAt,
}

impl Ranked {
    fn rank_cmp(&self, other: &Ranked) -> Ordering {
        self.poi
            .distance_from_track_km
            .total_cmp(&other.poi.distance_from_track_km)
            .then_with(|| self.poi.km_from_start.total_cmp(&other.poi.km_from_start))
            .then_with(|| self.seen.cmp(&other.seen))
    }
}

/// Deduplicated table being built by one run.
#[derive(Debug, Clone, Default)]
pub struct Aggregation {
    entries: HashMap<String, Ranked>,
    raw_candidates: usize,
}

impl Aggregation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct POIs kept so far.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of raw candidates seen, before any filtering or deduplication.
    pub fn raw_candidates(&self) -> usize {
        self.raw_candidates
    }

    fn offer(&mut self, ranked: Ranked) {
        match self.entries.get_mut(&ranked.poi.stable_id) {
            Some(existing) => {
                if ranked.rank_cmp(existing) == Ordering::Less {
                    *existing = ranked;
                }
            }
            None => {
                self.entries.insert(ranked.poi.stable_id.clone(), ranked);
            }
        }
    }

    /// Combine two partial tables. Order of arguments does not matter.
    pub fn merge(self, other: Aggregation) -> Aggregation {
        let (mut larger, smaller) = if self.entries.len() >= other.entries.len() {
            (self, other)
        } else {
            (other, self)
        };
        larger.raw_candidates += smaller.raw_candidates;
        for ranked in smaller.entries.into_values() {
            larger.offer(ranked);
        }
        larger
    }

    /// Final table, ordered by `km_from_start`, then distance, then first-seen.
    pub fn into_sorted(self) -> Vec<EnrichedPoi> {
        let mut ranked: Vec<Ranked> = self.entries.into_values().collect();
        ranked.sort_by(|a, b| {
            a.poi
                .km_from_start
                .total_cmp(&b.poi.km_from_start)
                .then_with(|| a.poi.distance_from_track_km.total_cmp(&b.poi.distance_from_track_km))
                .then_with(|| a.seen.cmp(&b.seen))
        });
        ranked.into_iter().map(|r| r.poi).collect()
    }
}

/// Per-run state shared by every window: the track, its segment index and the
/// resolved filters.
#[derive(Debug)]
pub struct Aggregator<'a> {
    track: &'a Track,
    index: TrackIndex,
    filter: CategoryFilter,
    radius_km: f64,
    thresholds: ProximityThresholds,
}

impl<'a> Aggregator<'a> {
    /// Validate `config` and prepare the track index and category filter.
    pub fn new(track: &'a Track, config: &SearchConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            track,
            index: TrackIndex::new(track),
            filter: CategoryFilter::from_config(config)?,
            radius_km: config.radius_km,
            thresholds: config.thresholds,
        })
    }

    /// Measure, filter and classify one candidate.
    /// Returns `None` if it is beyond the radius or fails the category filter.
    pub fn enrich_candidate(&self, candidate: RawCandidate) -> Option<EnrichedPoi> {
        let location = candidate.location();
        if !location.is_valid() {
            warn!(
                "[Aggregator] Dropping {}: invalid coordinates ({}, {})",
                candidate.stable_id, candidate.latitude, candidate.longitude
            );
            return None;
        }

        let approach = self
            .index
            .nearest_within(self.track, &location, self.radius_km)?;

        let matched_category = match self.filter.evaluate(&candidate.category_tags) {
            FilterOutcome::Rejected => return None,
            FilterOutcome::Accepted { matched } => matched,
        };

        Some(EnrichedPoi {
            stable_id: candidate.stable_id,
            name: candidate.name.unwrap_or_else(|| UNNAMED.to_string()),
            latitude: candidate.latitude,
            longitude: candidate.longitude,
            distance_from_track_km: approach.distance_km,
            km_from_start: approach.km_from_start,
            proximity_class: self.thresholds.classify(approach.distance_km),
            matched_category,
            category_tags: candidate.category_tags,
            contact: candidate.contact,
        })
    }

    /// Fold one window's candidates into a fresh partial table.
    pub fn evaluate(&self, window: &QueryWindow, candidates: Vec<RawCandidate>) -> Aggregation {
        let mut table = Aggregation::new();
        table.raw_candidates = candidates.len();

        for (position, candidate) in candidates.into_iter().enumerate() {
            if let Some(poi) = self.enrich_candidate(candidate) {
                table.offer(Ranked {
                    poi,
                    seen: SeenAt { window: window.index, position },
                });
            }
        }

        debug!(
            "[Aggregator] Window #{} @ {:.2} km: {} candidates, {} kept",
            window.index,
            window.km_from_start,
            table.raw_candidates,
            table.len()
        );
        table
    }
}

/// Query every window and return the deduplicated, filtered, classified POIs in
/// order of increasing `km_from_start`.
///
/// The first failing window aborts with [`TrackPoiError::SourceQuery`]; retrying or
/// skipping windows is the orchestrator's decision (see [`crate::pipeline`]).
pub fn enrich<I, S>(
    track: &Track,
    windows: I,
    source: &S,
    config: &SearchConfig,
) -> Result<Vec<EnrichedPoi>>
where
    I: IntoIterator<Item = QueryWindow>,
    S: PoiSource + ?Sized,
{
    let aggregator = Aggregator::new(track, config)?;
    let mut table = Aggregation::new();

    for window in windows {
        let candidates = source.query(&window).map_err(|e| TrackPoiError::SourceQuery {
            window,
            message: e.message,
        })?;
        table = table.merge(aggregator.evaluate(&window, candidates));
    }

    Ok(table.into_sorted())
}

/// [`enrich`] with the windows queried on the rayon thread pool.
///
/// The output is identical to [`enrich`]. When several windows fail, the error of
/// the lowest window index is returned.
#[cfg(feature = "parallel")]
pub fn enrich_parallel<I, S>(
    track: &Track,
    windows: I,
    source: &S,
    config: &SearchConfig,
) -> Result<Vec<EnrichedPoi>>
where
    I: IntoIterator<Item = QueryWindow>,
    S: PoiSource + ?Sized,
{
    use rayon::prelude::*;

    let aggregator = Aggregator::new(track, config)?;
    let windows: Vec<QueryWindow> = windows.into_iter().collect();

    let partials: Vec<Result<Aggregation>> = windows
        .par_iter()
        .map(|window| {
            source
                .query(window)
                .map(|candidates| aggregator.evaluate(window, candidates))
                .map_err(|e| TrackPoiError::SourceQuery {
                    window: *window,
                    message: e.message,
                })
        })
        .collect();

    let mut table = Aggregation::new();
    for partial in partials {
        table = table.merge(partial?);
    }
    Ok(table.into_sorted())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SourceError;
    use crate::sampler::sample_windows;
    use crate::source::InMemorySource;
    use crate::TrackPoint;

    /// Returns a scripted candidate list per window index.
    struct Scripted(Vec<Vec<RawCandidate>>);

    impl PoiSource for Scripted {
        fn query(&self, window: &QueryWindow) -> std::result::Result<Vec<RawCandidate>, SourceError> {
            Ok(self.0.get(window.index).cloned().unwrap_or_default())
        }
    }

    fn equator_track() -> Track {
        // ~11.1 km east along the equator
        Track::load(vec![TrackPoint::new(0.0, 0.0), TrackPoint::new(0.0, 0.1)]).unwrap()
    }

    fn window(index: usize) -> QueryWindow {
        QueryWindow {
            index,
            center: TrackPoint::new(0.0, 0.0),
            radius_km: 3.0,
            km_from_start: 0.0,
        }
    }

    #[test]
    fn test_dedup_keeps_minimum_distance() {
        let track = equator_track();
        let config = SearchConfig::with_radius(3.0);
        // Same id reported at two different positions by two windows
        let source = Scripted(vec![
            vec![RawCandidate::new("node/7", 0.015, 0.05)],
            vec![RawCandidate::new("node/7", 0.008, 0.05)],
        ]);

        let pois = enrich(&track, [window(0), window(1)], &source, &config).unwrap();
        assert_eq!(pois.len(), 1);
        assert!((pois[0].distance_from_track_km - 0.008 * 111.195).abs() < 1e-3);
    }

    #[test]
    fn test_dedup_tie_prefers_first_seen() {
        let track = equator_track();
        let config = SearchConfig::with_radius(3.0);
        let source = Scripted(vec![
            vec![RawCandidate::new("node/7", 0.01, 0.05).with_name("first")],
            vec![RawCandidate::new("node/7", 0.01, 0.05).with_name("second")],
        ]);

        // Window 1 arrives first, but window 0 was seen first in sampling order
        let pois = enrich(&track, [window(1), window(0)], &source, &config).unwrap();
        assert_eq!(pois.len(), 1);
        assert_eq!(pois[0].name, "first");
    }

    #[test]
    fn test_merge_is_order_independent() {
        let track = equator_track();
        let config = SearchConfig::with_radius(3.0);
        let aggregator = Aggregator::new(&track, &config).unwrap();

        let a = aggregator.evaluate(
            &window(0),
            vec![
                RawCandidate::new("a", 0.010, 0.02),
                RawCandidate::new("b", 0.012, 0.06),
            ],
        );
        let b = aggregator.evaluate(
            &window(1),
            vec![
                RawCandidate::new("b", 0.005, 0.06),
                RawCandidate::new("c", -0.010, 0.09),
            ],
        );

        let ab = a.clone().merge(b.clone()).into_sorted();
        let ba = b.merge(a).into_sorted();
        assert_eq!(ab, ba);
        assert_eq!(ab.len(), 3);
        assert!(ab.windows(2).all(|w| w[0].km_from_start <= w[1].km_from_start));
    }

    #[test]
    fn test_radius_filter_defends_against_over_return() {
        let track = equator_track();
        let config = SearchConfig::with_radius(1.0);
        // Source ignores the radius and returns a POI ~2.2 km away
        let source = Scripted(vec![vec![RawCandidate::new("far", 0.02, 0.05)]]);

        let pois = enrich(&track, [window(0)], &source, &config).unwrap();
        assert!(pois.is_empty());
    }

    #[test]
    fn test_invalid_candidate_dropped() {
        let track = equator_track();
        let config = SearchConfig::with_radius(3.0);
        let source = Scripted(vec![vec![
            RawCandidate::new("bad", f64::NAN, 0.05),
            RawCandidate::new("good", 0.001, 0.05),
        ]]);

        let pois = enrich(&track, [window(0)], &source, &config).unwrap();
        assert_eq!(pois.len(), 1);
        assert_eq!(pois[0].stable_id, "good");
    }

    #[test]
    fn test_source_failure_reports_window() {
        struct Failing;
        impl PoiSource for Failing {
            fn query(&self, _: &QueryWindow) -> std::result::Result<Vec<RawCandidate>, SourceError> {
                Err(SourceError::retryable("HTTP 503"))
            }
        }

        let track = equator_track();
        let config = SearchConfig::with_radius(3.0);
        let err = enrich(&track, [window(4)], &Failing, &config).unwrap_err();
        match err {
            TrackPoiError::SourceQuery { window, message } => {
                assert_eq!(window.index, 4);
                assert_eq!(message, "HTTP 503");
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_classification_and_passthrough() {
        let track = equator_track();
        let config = SearchConfig::with_radius(6.0).include(["amenity=cafe"]);
        let contact = ContactFields {
            website: Some("https://example.org".to_string()),
            ..Default::default()
        };
        let source = Scripted(vec![vec![
            RawCandidate::new("n1", 0.009, 0.01).with_tags(["amenity=cafe"]).with_contact(contact.clone()),
            RawCandidate::new("n2", 0.030, 0.05).with_tags(["amenity=cafe"]),
            RawCandidate::new("n3", 0.050, 0.09).with_tags(["amenity=cafe", "outdoor_seating=yes"]),
            RawCandidate::new("n4", 0.001, 0.05).with_tags(["tourism=museum"]),
        ]]);

        let pois = enrich(&track, [window(0)], &source, &config).unwrap();
        let classes: Vec<ProximityClass> = pois.iter().map(|p| p.proximity_class).collect();
        assert_eq!(classes, vec![ProximityClass::Near, ProximityClass::Mid, ProximityClass::Far]);
        assert_eq!(pois[0].contact, contact);
        assert_eq!(pois[0].name, UNNAMED);
        assert_eq!(pois[2].matched_category.as_deref(), Some("amenity=cafe"));
    }

    #[test]
    fn test_unknown_preset_fails_before_querying() {
        let track = equator_track();
        let source = InMemorySource::new(vec![]);
        let config = SearchConfig::with_radius(3.0).preset(["nope"]);
        let windows: Vec<QueryWindow> = sample_windows(&track, 1.0, 3.0).unwrap().collect();

        assert!(matches!(
            enrich(&track, windows, &source, &config),
            Err(TrackPoiError::InvalidParameter { .. })
        ));
        assert_eq!(source.query_count(), 0);
    }

    #[cfg(feature = "parallel")]
    #[test]
    fn test_parallel_matches_sequential() {
        let track = Track::load(
            (0..40)
                .map(|i| TrackPoint::new((i as f64 * 0.3).sin() * 0.02, i as f64 * 0.005))
                .collect(),
        )
        .unwrap();
        let candidates: Vec<RawCandidate> = (0..200)
            .map(|i| {
                let lat = ((i * 37) % 100) as f64 * 0.0006 - 0.03;
                let lng = ((i * 53) % 100) as f64 * 0.0021;
                RawCandidate::new(format!("node/{}", i), lat, lng)
            })
            .collect();
        let source = InMemorySource::new(candidates);
        let config = SearchConfig::with_radius(2.0);
        let windows: Vec<QueryWindow> = sample_windows(&track, config.step_km, config.radius_km)
            .unwrap()
            .collect();

        let sequential = enrich(&track, windows.clone(), &source, &config).unwrap();
        let parallel = enrich_parallel(&track, windows, &source, &config).unwrap();
        assert!(!sequential.is_empty());
        assert_eq!(sequential, parallel);
    }

    #[test]
    fn test_display_labels() {
        assert_eq!(ProximityClass::Near.to_string(), "near");
        assert_eq!(ProximityClass::Mid.to_string(), "mid");
        assert_eq!(ProximityClass::Far.to_string(), "far");
    }
}
