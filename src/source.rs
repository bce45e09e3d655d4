//! POI source contract.
//!
//! The core never talks to a POI provider directly. It hands each
//! [`QueryWindow`] to a [`PoiSource`] and receives raw candidates back. Implementations
//! must be idempotent per call and safe to call from several threads at once.

use std::sync::atomic::{AtomicUsize, Ordering};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::SourceError;
use crate::geo_utils::haversine_km;
use crate::sampler::QueryWindow;
use crate::TrackPoint;

/// Contact metadata passed through to the output untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ContactFields {
    pub website: Option<String>,
    pub phone: Option<String>,
    pub opening_hours: Option<String>,
    pub email: Option<String>,
}

/// A candidate as returned by a POI source, before any geometry or filtering.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RawCandidate {
    /// Identity used for cross-window deduplication (e.g. `node/123`)
    pub stable_id: String,
    pub name: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    /// Category labels, matched against include/exclude filters
    #[cfg_attr(feature = "serde", serde(default))]
    pub category_tags: Vec<String>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub contact: ContactFields,
}

impl RawCandidate {
    /// Create an unnamed, untagged candidate.
    pub fn new(stable_id: impl Into<String>, latitude: f64, longitude: f64) -> Self {
        Self {
            stable_id: stable_id.into(),
            name: None,
            latitude,
            longitude,
            category_tags: Vec::new(),
            contact: ContactFields::default(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.category_tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_contact(mut self, contact: ContactFields) -> Self {
        self.contact = contact;
        self
    }

    /// Location of the candidate.
    pub fn location(&self) -> TrackPoint {
        TrackPoint::new(self.latitude, self.longitude)
    }
}

/// Blocking POI source.
pub trait PoiSource: Send + Sync {
    /// Return the candidates around `window.center` within `window.radius_km`.
    ///
    /// Sources may over-return (candidates outside the radius are dropped by the
    /// aggregator) but must not silently under-report a failure as an empty result.
    fn query(&self, window: &QueryWindow) -> Result<Vec<RawCandidate>, SourceError>;
}

impl<S: PoiSource + ?Sized> PoiSource for &S {
    fn query(&self, window: &QueryWindow) -> Result<Vec<RawCandidate>, SourceError> {
        (**self).query(window)
    }
}

/// Async POI source, for network-bound providers.
#[cfg(feature = "concurrent")]
pub trait AsyncPoiSource: Send + Sync {
    fn query(
        &self,
        window: &QueryWindow,
    ) -> impl std::future::Future<Output = Result<Vec<RawCandidate>, SourceError>> + Send;
}

/// A fixed pool of candidates, queried by distance to the window center.
#[derive(Debug, Default)]
pub struct InMemorySource {
    candidates: Vec<RawCandidate>,
    max_results: Option<usize>,
    queries: AtomicUsize,
}

impl InMemorySource {
    pub fn new(candidates: Vec<RawCandidate>) -> Self {
        Self {
            candidates,
            max_results: None,
            queries: AtomicUsize::new(0),
        }
    }

    /// Cap the number of candidates returned per query (nearest first).
    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = Some(max_results);
        self
    }

    /// Number of queries answered so far.
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::Relaxed)
    }

    /// Total number of candidates in the pool.
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    fn lookup(&self, window: &QueryWindow) -> Vec<RawCandidate> {
        self.queries.fetch_add(1, Ordering::Relaxed);

        let mut hits: Vec<(f64, &RawCandidate)> = self
            .candidates
            .iter()
            .map(|c| (haversine_km(&window.center, &c.location()), c))
            .filter(|(d, _)| *d <= window.radius_km)
            .collect();

        if let Some(cap) = self.max_results {
            hits.sort_by(|a, b| a.0.total_cmp(&b.0));
            hits.truncate(cap);
        }

        hits.into_iter().map(|(_, c)| c.clone()).collect()
    }
}

impl PoiSource for InMemorySource {
    fn query(&self, window: &QueryWindow) -> Result<Vec<RawCandidate>, SourceError> {
        Ok(self.lookup(window))
    }
}

#[cfg(feature = "concurrent")]
impl AsyncPoiSource for InMemorySource {
    async fn query(&self, window: &QueryWindow) -> Result<Vec<RawCandidate>, SourceError> {
        Ok(self.lookup(window))
    }
}
