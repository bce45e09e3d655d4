//! # alongtrack
//!
//! Find points of interest along a GPS track.
//!
//! Given a recorded track and a source of candidate points of interest (POIs), this
//! library reports every POI within a search radius of the track together with:
//! - its shortest distance to the track, and
//! - the distance along the track, from its start, to the point of nearest approach.
//!
//! The track is sampled into overlapping query windows, each window is sent to a
//! [`PoiSource`], and the candidates of all windows are merged into one deduplicated,
//! filtered and classified table.
//!
//! ## Features
//!
//! - **`parallel`** - Query windows on the rayon thread pool
//! - **`concurrent`** - Async pipeline with a bounded number of in-flight queries
//! - **`http`** - Overpass API adapter for OpenStreetMap POIs
//! - **`serde`** - Serialize/deserialize the public data types
//! - **`cli`** - Debug CLI (`alongtrack-cli`)
//!
//! ## Quick Start
//!
//! ```rust
//! use alongtrack::{
//!     pipeline, InMemorySource, PipelineOptions, ProximityClass, RawCandidate,
//!     SearchConfig, TrackPoint,
//! };
//!
//! let track = vec![TrackPoint::new(45.000, 7.000), TrackPoint::new(45.000, 7.100)];
//!
//! let source = InMemorySource::new(vec![
//!     RawCandidate::new("node/1", 45.005, 7.050).with_name("Rifugio").with_tags(["tourism=alpine_hut"]),
//! ]);
//!
//! let config = SearchConfig::with_radius(3.0);
//! let result = pipeline::run(&track, &source, &config, &PipelineOptions::default()).unwrap();
//!
//! assert_eq!(result.pois.len(), 1);
//! assert_eq!(result.pois[0].proximity_class, ProximityClass::Near);
//! println!("{} is {:.1} km along the track", result.pois[0].name, result.pois[0].km_from_start);
//! ```

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

// Unified error handling
pub mod error;
pub use error::{Result, SourceError, TrackPoiError};

// Geographic utilities (distance, projection, bounds)
pub mod geo_utils;

// Track model with cumulative-distance parameterization
pub mod track;
pub use track::{NearestApproach, Track, TrackSource};

// R-tree over track segments
pub mod spatial_index;
pub use spatial_index::TrackIndex;

// Query window sampling
pub mod sampler;
pub use sampler::{sample_windows, QueryWindow, Windows};

// POI source contract and in-memory adapter
pub mod source;
#[cfg(feature = "concurrent")]
pub use source::AsyncPoiSource;
pub use source::{ContactFields, InMemorySource, PoiSource, RawCandidate};

// Search configuration and category filtering
pub mod config;
pub use config::{ProximityThresholds, SearchConfig};
pub mod filter;
pub use filter::{CategoryFilter, FilterOutcome, PresetTable};

// Merge, dedup and classification
pub mod aggregator;
#[cfg(feature = "parallel")]
pub use aggregator::enrich_parallel;
pub use aggregator::{enrich, Aggregation, Aggregator, EnrichedPoi, ProximityClass};

// Orchestration
pub mod pipeline;
pub use pipeline::{
    CancelFlag, FailurePolicy, PipelineOptions, RetryPolicy, RunResult, RunSummary,
    SkippedWindow,
};

// Overpass API adapter
#[cfg(feature = "http")]
pub mod http;
#[cfg(feature = "http")]
pub use http::{OverpassConfig, OverpassSource};

// ============================================================================
// Core Types
// ============================================================================

/// A WGS84 coordinate.
///
/// # Example
/// ```
/// use alongtrack::TrackPoint;
/// let point = TrackPoint::new(46.5197, 6.6323); // Lausanne
/// assert!(point.is_valid());
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TrackPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl TrackPoint {
    /// Create a new point.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Create a point from a `(longitude, latitude)` pair, the order GPX/GeoJSON use.
    pub fn from_lon_lat(longitude: f64, latitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Check if the point has valid coordinates.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }
}

/// Bounding box in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Bounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl Bounds {
    /// Grow the box by `km` in every direction (conservative at the given latitude).
    pub fn expand_km(&self, km: f64) -> Self {
        let reference_lat = self.min_lat.abs().max(self.max_lat.abs());
        let buffer = geo_utils::km_to_degrees(km, reference_lat);
        Self {
            min_lat: self.min_lat - buffer,
            max_lat: self.max_lat + buffer,
            min_lng: self.min_lng - buffer,
            max_lng: self.max_lng + buffer,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
