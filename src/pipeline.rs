//! Run orchestration: configuration checks, track loading, window sampling,
//! per-window retries and the abort-or-skip decision.
//!
//! - Retry with exponential backoff on retryable source errors
//! - Explicit failure policy once retries are exhausted
//! - Cancellation between windows, and of in-flight async queries (partial results
//!   are discarded)
//! - Bounded number of in-flight queries in [`run_concurrent`]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info, warn};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::aggregator::{Aggregation, Aggregator, EnrichedPoi};
use crate::config::SearchConfig;
use crate::error::{Result, TrackPoiError};
use crate::sampler::{sample_windows, QueryWindow};
use crate::source::{PoiSource, RawCandidate};
use crate::track::{Track, TrackSource};

#[cfg(feature = "concurrent")]
use crate::source::AsyncPoiSource;

/// Shared cancellation switch. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<CancelState>);

#[derive(Debug, Default)]
struct CancelState {
    cancelled: AtomicBool,
    #[cfg(feature = "concurrent")]
    notify: tokio::sync::Notify,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.cancelled.store(true, Ordering::SeqCst);
        #[cfg(feature = "concurrent")]
        self.0.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once [`cancel`](Self::cancel) has been called.
    #[cfg(feature = "concurrent")]
    pub async fn cancelled(&self) {
        loop {
            // Registered on creation, so a cancel between the check and the await is seen
            let notified = self.0.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// How often and how patiently a failing window is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt. Default: 3
    pub max_retries: u32,
    /// Wait before the first retry; doubles on every further retry. Default: 200ms
    pub base_backoff: Duration,
    /// Upper bound on a single wait. Default: 4s
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(4),
        }
    }
}

impl RetryPolicy {
    /// Never retry.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Wait before retry number `retry` (1-based).
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u32 << retry.saturating_sub(1).min(16);
        self.base_backoff.saturating_mul(factor).min(self.max_backoff)
    }
}

/// What to do with a window whose retries are exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum FailurePolicy {
    /// Fail the whole run with [`TrackPoiError::SourceQuery`].
    #[default]
    Abort,
    /// Leave the window's area uncovered, report it in [`RunSummary::skipped_windows`].
    SkipWindow,
}

/// Orchestration knobs that are not part of the search itself.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub retry: RetryPolicy,
    pub on_window_failure: FailurePolicy,
    /// Maximum concurrent window queries in [`run_concurrent`]. Default: 4
    pub max_in_flight: usize,
    pub cancel: Option<CancelFlag>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            on_window_failure: FailurePolicy::Abort,
            max_in_flight: 4,
            cancel: None,
        }
    }
}

impl PipelineOptions {
    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelFlag::is_cancelled)
    }

    fn validate(&self) -> Result<()> {
        if self.max_in_flight == 0 {
            return Err(TrackPoiError::invalid_parameter("max_in_flight", "must be at least 1"));
        }
        Ok(())
    }
}

/// A window left out of the result after its retries were exhausted.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SkippedWindow {
    pub window: QueryWindow,
    pub attempts: u32,
    pub message: String,
}

/// Statistics for the caller (and for the export/map collaborators).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RunSummary {
    pub rows_count: usize,
    pub track_length_km: f64,
    pub windows_queried: usize,
    pub raw_candidates: usize,
    /// Windows excluded under [`FailurePolicy::SkipWindow`], by window index
    pub skipped_windows: Vec<SkippedWindow>,
}

/// Output of one run: the track and the enriched POI table.
#[derive(Debug, Clone)]
pub struct RunResult {
    pub track: Track,
    pub pois: Vec<EnrichedPoi>,
    pub summary: RunSummary,
}

enum QueryOutcome {
    Candidates(Vec<RawCandidate>),
    Failed { attempts: u32, message: String },
    Cancelled,
}

/// Everything a run needs before the first query: fails fast on bad input.
fn prepare<T>(track_source: &T, config: &SearchConfig, options: &PipelineOptions) -> Result<Track>
where
    T: TrackSource + ?Sized,
{
    config.validate()?;
    options.validate()?;
    let track = Track::load(track_source.load_points()?)?;

    let area = track.bounds().expand_km(config.radius_km);
    debug!(
        "[Pipeline] Search area lat [{:.4}, {:.4}] lng [{:.4}, {:.4}]",
        area.min_lat, area.max_lat, area.min_lng, area.max_lng
    );
    Ok(track)
}

fn record_failure(
    window: &QueryWindow,
    attempts: u32,
    message: String,
    options: &PipelineOptions,
    skipped: &mut Vec<SkippedWindow>,
) -> Result<()> {
    match options.on_window_failure {
        FailurePolicy::Abort => {
            warn!(
                "[Pipeline] Window #{} failed after {} attempt(s): {}; aborting run",
                window.index, attempts, message
            );
            Err(TrackPoiError::SourceQuery {
                window: *window,
                message,
            })
        }
        FailurePolicy::SkipWindow => {
            warn!(
                "[Pipeline] Window #{} at {:.2} km failed after {} attempt(s): {}; skipping",
                window.index, window.km_from_start, attempts, message
            );
            skipped.push(SkippedWindow {
                window: *window,
                attempts,
                message,
            });
            Ok(())
        }
    }
}

fn finish(
    track: Track,
    table: Aggregation,
    windows_queried: usize,
    mut skipped_windows: Vec<SkippedWindow>,
    start: Instant,
) -> RunResult {
    skipped_windows.sort_by_key(|s| s.window.index);
    let raw_candidates = table.raw_candidates();
    let pois = table.into_sorted();

    let summary = RunSummary {
        rows_count: pois.len(),
        track_length_km: track.length_km(),
        windows_queried,
        raw_candidates,
        skipped_windows,
    };

    info!(
        "[Pipeline] DONE: {} POIs from {} raw candidates over {:.2} km ({} windows, {} skipped) in {:.2}s",
        summary.rows_count,
        summary.raw_candidates,
        summary.track_length_km,
        summary.windows_queried,
        summary.skipped_windows.len(),
        start.elapsed().as_secs_f64()
    );

    RunResult { track, pois, summary }
}

fn query_with_retry<S>(source: &S, window: &QueryWindow, options: &PipelineOptions) -> QueryOutcome
where
    S: PoiSource + ?Sized,
{
    let mut attempts = 0;
    loop {
        if options.is_cancelled() {
            return QueryOutcome::Cancelled;
        }
        attempts += 1;

        match source.query(window) {
            Ok(candidates) => return QueryOutcome::Candidates(candidates),
            Err(e) if e.retryable && attempts <= options.retry.max_retries => {
                let wait = options.retry.backoff(attempts);
                warn!(
                    "[Pipeline] Window #{} error: {}, retry {} after {:?}",
                    window.index, e.message, attempts, wait
                );
                std::thread::sleep(wait);
            }
            Err(e) => {
                return QueryOutcome::Failed {
                    attempts,
                    message: e.message,
                }
            }
        }
    }
}

/// Run the whole search for one track.
///
/// Configuration is validated before the track is loaded and before any query is
/// issued. Windows are queried one after another; see [`run_concurrent`] for
/// overlapping queries.
///
/// # Example
/// ```
/// use alongtrack::{pipeline, InMemorySource, PipelineOptions, RawCandidate, SearchConfig};
///
/// // (longitude, latitude) pairs
/// let track = vec![(7.00, 46.00), (7.05, 46.00), (7.10, 46.02)];
/// let source = InMemorySource::new(vec![RawCandidate::new("node/1", 46.01, 7.05)]);
///
/// let result = pipeline::run(&track, &source, &SearchConfig::with_radius(2.0), &PipelineOptions::default()).unwrap();
/// assert_eq!(result.summary.rows_count, 1);
/// assert!(result.summary.track_length_km > 7.0);
/// ```
pub fn run<T, S>(
    track_source: &T,
    poi_source: &S,
    config: &SearchConfig,
    options: &PipelineOptions,
) -> Result<RunResult>
where
    T: TrackSource + ?Sized,
    S: PoiSource + ?Sized,
{
    let start = Instant::now();
    let track = prepare(track_source, config, options)?;

    let (table, windows_queried, skipped) = {
        let aggregator = Aggregator::new(&track, config)?;
        let windows: Vec<QueryWindow> =
            sample_windows(&track, config.step_km, config.radius_km)?.collect();

        info!(
            "[Pipeline] Starting: {:.2} km track, {} windows (radius {} km, step {} km)",
            track.length_km(),
            windows.len(),
            config.radius_km,
            config.step_km
        );

        let mut table = Aggregation::new();
        let mut skipped = Vec::new();

        for window in &windows {
            match query_with_retry(poi_source, window, options) {
                QueryOutcome::Candidates(candidates) => {
                    table = table.merge(aggregator.evaluate(window, candidates));
                }
                QueryOutcome::Failed { attempts, message } => {
                    record_failure(window, attempts, message, options, &mut skipped)?;
                }
                QueryOutcome::Cancelled => {
                    info!("[Pipeline] Cancelled at window #{}", window.index);
                    return Err(TrackPoiError::Cancelled);
                }
            }
        }

        (table, windows.len(), skipped)
    };

    Ok(finish(track, table, windows_queried, skipped, start))
}

#[cfg(feature = "concurrent")]
async fn query_with_retry_async<S>(
    source: &S,
    window: &QueryWindow,
    options: &PipelineOptions,
) -> QueryOutcome
where
    S: AsyncPoiSource + ?Sized,
{
    let mut attempts = 0;
    loop {
        if options.is_cancelled() {
            return QueryOutcome::Cancelled;
        }
        attempts += 1;

        match source.query(window).await {
            Ok(candidates) => return QueryOutcome::Candidates(candidates),
            Err(e) if e.retryable && attempts <= options.retry.max_retries => {
                let wait = options.retry.backoff(attempts);
                warn!(
                    "[Pipeline] Window #{} error: {}, retry {} after {:?}",
                    window.index, e.message, attempts, wait
                );
                tokio::time::sleep(wait).await;
            }
            Err(e) => {
                return QueryOutcome::Failed {
                    attempts,
                    message: e.message,
                }
            }
        }
    }
}

/// Query one window, abandoning the query (or its backoff) as soon as the run is
/// cancelled.
#[cfg(feature = "concurrent")]
async fn query_until_cancelled<S>(
    source: &S,
    window: &QueryWindow,
    options: &PipelineOptions,
) -> QueryOutcome
where
    S: AsyncPoiSource + ?Sized,
{
    match &options.cancel {
        Some(flag) => tokio::select! {
            outcome = query_with_retry_async(source, window, options) => outcome,
            _ = flag.cancelled() => QueryOutcome::Cancelled,
        },
        None => query_with_retry_async(source, window, options).await,
    }
}

/// [`run`] with up to `options.max_in_flight` window queries in flight.
///
/// Results are merged as they arrive; the output is identical to [`run`] for any
/// concurrency degree. Cancelling (or dropping the returned future) abandons the
/// queries still in flight.
#[cfg(feature = "concurrent")]
pub async fn run_concurrent<T, S>(
    track_source: &T,
    poi_source: &S,
    config: &SearchConfig,
    options: &PipelineOptions,
) -> Result<RunResult>
where
    T: TrackSource + ?Sized,
    S: AsyncPoiSource + ?Sized,
{
    use futures::stream::{self, StreamExt};

    let start = Instant::now();
    let track = prepare(track_source, config, options)?;

    let (table, windows_queried, skipped) = {
        let aggregator = Aggregator::new(&track, config)?;
        let windows: Vec<QueryWindow> =
            sample_windows(&track, config.step_km, config.radius_km)?.collect();

        info!(
            "[Pipeline] Starting concurrent run: {:.2} km track, {} windows, max in flight: {}",
            track.length_km(),
            windows.len(),
            options.max_in_flight
        );

        let mut outcomes = std::pin::pin!(stream::iter(windows.iter())
            .map(|window| async move {
                let outcome = query_until_cancelled(poi_source, window, options).await;
                (window, outcome)
            })
            .buffer_unordered(options.max_in_flight));

        let mut table = Aggregation::new();
        let mut skipped = Vec::new();
        let mut completed = 0;

        while let Some((window, outcome)) = outcomes.next().await {
            if options.is_cancelled() {
                info!("[Pipeline] Cancelled with {} of {} windows done", completed, windows.len());
                return Err(TrackPoiError::Cancelled);
            }
            completed += 1;

            match outcome {
                QueryOutcome::Candidates(candidates) => {
                    table = table.merge(aggregator.evaluate(window, candidates));
                }
                QueryOutcome::Failed { attempts, message } => {
                    record_failure(window, attempts, message, options, &mut skipped)?;
                }
                QueryOutcome::Cancelled => {
                    info!("[Pipeline] Cancelled at window #{}", window.index);
                    return Err(TrackPoiError::Cancelled);
                }
            }
            debug!("[Pipeline] Progress {}/{}", completed, windows.len());
        }

        (table, windows.len(), skipped)
    };

    Ok(finish(track, table, windows_queried, skipped, start))
}
