//! Overpass API adapter for the async POI source contract.
//!
//! - Connection pooling through a shared `reqwest::Client`
//! - Dispatch rate limiting (spaces out request starts)
//! - Backoff penalty for every caller after an HTTP 429
//!
//! Retries are left to the pipeline: this module only labels failures as
//! retryable (429, 5xx, transport) or fatal.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::error::SourceError;
use crate::filter::CategoryFilter;
use crate::sampler::QueryWindow;
use crate::source::{AsyncPoiSource, ContactFields, RawCandidate};

pub const DEFAULT_ENDPOINT: &str = "https://overpass-api.de/api/interpreter";

/// Connection settings for [`OverpassSource`].
#[derive(Debug, Clone, PartialEq)]
pub struct OverpassConfig {
    /// Interpreter URL.
    /// Default: [`DEFAULT_ENDPOINT`]
    pub endpoint: String,

    /// Server-side query timeout, also used (plus a margin) as the HTTP timeout.
    /// Default: 60s
    pub timeout: Duration,

    /// Minimum spacing between request starts. Public instances throttle hard.
    /// Default: 1s
    pub dispatch_interval: Duration,

    /// Optional `out` limit per query.
    pub max_results: Option<usize>,
}

impl Default for OverpassConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            timeout: Duration::from_secs(60),
            dispatch_interval: Duration::from_secs(1),
            max_results: None,
        }
    }
}

/// Spaces out when requests START. Each caller reserves the next free slot.
struct DispatchRateLimiter {
    interval: Duration,
    next_dispatch: Mutex<Instant>,
    dispatched_count: AtomicU32,
    consecutive_429s: AtomicU32,
}

impl DispatchRateLimiter {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_dispatch: Mutex::new(Instant::now()),
            dispatched_count: AtomicU32::new(0),
            consecutive_429s: AtomicU32::new(0),
        }
    }

    async fn wait_for_dispatch_slot(&self) -> u32 {
        let (wait, dispatch_num) = {
            let mut next = self.next_dispatch.lock().await;
            let now = Instant::now();
            let dispatch_at = if *next > now { *next } else { now };
            *next = dispatch_at + self.interval;

            let num = self.dispatched_count.fetch_add(1, Ordering::Relaxed) + 1;
            (dispatch_at.saturating_duration_since(now), num)
        };

        // Wait outside the lock
        if wait > Duration::from_millis(5) {
            debug!("[Dispatch #{}] Waiting {:?} for slot", dispatch_num, wait);
            tokio::time::sleep(wait).await;
        }

        dispatch_num
    }

    fn record_success(&self) {
        self.consecutive_429s.store(0, Ordering::Relaxed);
    }

    /// Push the next free slot back: 1s, 2s, 4s, 8s max.
    async fn record_429(&self) -> Duration {
        let count = self.consecutive_429s.fetch_add(1, Ordering::Relaxed) + 1;
        let backoff = Duration::from_millis(500 * (1 << count.min(4)));

        let mut next = self.next_dispatch.lock().await;
        let earliest = Instant::now() + backoff;
        if *next < earliest {
            *next = earliest;
        }

        warn!("[DispatchRateLimiter] Got 429! Consecutive: {}, backing off {:?}", count, backoff);
        backoff
    }
}

/// Build the Overpass QL query for one window.
///
/// One `nwr` clause per `key=value` include category; bare keys match any value.
/// Without include categories every named feature is requested.
///
/// ```
/// use alongtrack::http::build_query;
/// use alongtrack::{QueryWindow, TrackPoint};
/// use std::collections::BTreeSet;
///
/// let window = QueryWindow { index: 0, center: TrackPoint::new(46.5, 7.25), radius_km: 2.0, km_from_start: 0.0 };
/// let include: BTreeSet<String> = ["amenity=cafe".to_string()].into();
/// let q = build_query(&window, &include, 25, None);
/// assert_eq!(q, "[out:json][timeout:25];(nwr[\"amenity\"=\"cafe\"](around:2000,46.500000,7.250000););out center tags;");
/// ```
pub fn build_query(
    window: &QueryWindow,
    include: &BTreeSet<String>,
    timeout_secs: u64,
    max_results: Option<usize>,
) -> String {
    let around = format!(
        "(around:{:.0},{:.6},{:.6})",
        window.radius_km * 1000.0,
        window.center.latitude,
        window.center.longitude
    );

    let mut query = format!("[out:json][timeout:{}];(", timeout_secs);
    if include.is_empty() {
        query.push_str(&format!("nwr[\"name\"]{};", around));
    } else {
        for category in include {
            let selector = match category.split_once('=') {
                Some((key, value)) => format!("[\"{}\"=\"{}\"]", escape(key), escape(value)),
                None => format!("[\"{}\"]", escape(category)),
            };
            query.push_str(&format!("nwr{}{};", selector, around));
        }
    }
    query.push_str(");out center tags");
    if let Some(max) = max_results {
        query.push_str(&format!(" {}", max));
    }
    query.push(';');
    query
}

fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

#[derive(Debug, Deserialize)]
struct OverpassResponse {
    #[serde(default)]
    elements: Vec<OverpassElement>,
}

#[derive(Debug, Deserialize)]
struct OverpassElement {
    #[serde(rename = "type")]
    kind: String,
    id: i64,
    lat: Option<f64>,
    lon: Option<f64>,
    center: Option<OverpassCenter>,
    #[serde(default)]
    tags: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct OverpassCenter {
    lat: f64,
    lon: f64,
}

impl OverpassElement {
    fn into_candidate(mut self) -> Option<RawCandidate> {
        let (latitude, longitude) = match (self.lat, self.lon, &self.center) {
            (Some(lat), Some(lon), _) => (lat, lon),
            (_, _, Some(c)) => (c.lat, c.lon),
            _ => return None,
        };

        let contact = ContactFields {
            website: take_tag(&mut self.tags, &["website", "contact:website"]),
            phone: take_tag(&mut self.tags, &["phone", "contact:phone"]),
            opening_hours: take_tag(&mut self.tags, &["opening_hours"]),
            email: take_tag(&mut self.tags, &["email", "contact:email"]),
        };

        Some(RawCandidate {
            stable_id: format!("{}/{}", self.kind, self.id),
            name: self.tags.get("name").cloned(),
            latitude,
            longitude,
            category_tags: self.tags.iter().map(|(k, v)| format!("{}={}", k, v)).collect(),
            contact,
        })
    }
}

/// First present key wins. Contact tags stay out of the category list.
fn take_tag(tags: &mut BTreeMap<String, String>, keys: &[&str]) -> Option<String> {
    let mut found = None;
    for key in keys {
        if let Some(value) = tags.remove(*key) {
            found.get_or_insert(value);
        }
    }
    found
}

/// Parse an Overpass JSON body into candidates.
/// Elements without coordinates (relations without `center`) are skipped.
pub fn parse_response(body: &[u8]) -> Result<Vec<RawCandidate>, SourceError> {
    let response: OverpassResponse = serde_json::from_slice(body)
        .map_err(|e| SourceError::fatal(format!("JSON parse error: {}", e)))?;
    Ok(response
        .elements
        .into_iter()
        .filter_map(OverpassElement::into_candidate)
        .collect())
}

/// [`AsyncPoiSource`] backed by an Overpass API instance.
pub struct OverpassSource {
    client: Client,
    config: OverpassConfig,
    include: BTreeSet<String>,
    rate_limiter: DispatchRateLimiter,
}

impl OverpassSource {
    /// Create a source that asks for the categories `filter` admits.
    pub fn new(config: OverpassConfig, filter: &CategoryFilter) -> Result<Self, SourceError> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .tcp_keepalive(Duration::from_secs(30))
            .timeout(config.timeout + Duration::from_secs(10))
            .user_agent(concat!("alongtrack/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SourceError::fatal(format!("Failed to create HTTP client: {}", e)))?;

        info!(
            "[OverpassSource] Endpoint {} (dispatch interval: {:?}, {} categories)",
            config.endpoint,
            config.dispatch_interval,
            filter.include_categories().len()
        );

        Ok(Self {
            client,
            rate_limiter: DispatchRateLimiter::new(config.dispatch_interval),
            include: filter.include_categories().clone(),
            config,
        })
    }

    pub fn config(&self) -> &OverpassConfig {
        &self.config
    }

    async fn fetch(&self, window: &QueryWindow) -> Result<Vec<RawCandidate>, SourceError> {
        let query = build_query(
            window,
            &self.include,
            self.config.timeout.as_secs(),
            self.config.max_results,
        );

        let dispatch_num = self.rate_limiter.wait_for_dispatch_slot().await;
        let req_start = Instant::now();

        let response = self
            .client
            .post(&self.config.endpoint)
            .form(&[("data", query.as_str())])
            .send()
            .await
            .map_err(|e| SourceError::retryable(format!("Request error: {}", e)))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let wait = self.rate_limiter.record_429().await;
            return Err(SourceError::retryable(format!(
                "HTTP 429 Too Many Requests (next dispatch in {:?})",
                wait
            )));
        }
        self.rate_limiter.record_success();

        if status.is_server_error() {
            return Err(SourceError::retryable(format!("HTTP {}", status)));
        }
        if !status.is_success() {
            return Err(SourceError::fatal(format!("HTTP {}", status)));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| SourceError::retryable(format!("Body download error: {}", e)))?;
        let candidates = parse_response(&bytes)?;

        debug!(
            "[Fetch #{}] window #{} {:.1}KB, {} elements in {:?}",
            dispatch_num,
            window.index,
            bytes.len() as f64 / 1024.0,
            candidates.len(),
            req_start.elapsed()
        );

        Ok(candidates)
    }
}

impl AsyncPoiSource for OverpassSource {
    async fn query(&self, window: &QueryWindow) -> Result<Vec<RawCandidate>, SourceError> {
        self.fetch(window).await
    }
}
