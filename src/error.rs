//! Error types for track loading, search configuration and POI queries.

use thiserror::Error;

use crate::QueryWindow;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, TrackPoiError>;

/// Everything that can make a run fail.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TrackPoiError {
    /// The track has fewer than two points, so there is no segment to measure against.
    #[error("track needs at least 2 points, got {point_count}")]
    EmptyTrack { point_count: usize },

    /// A track point is not a finite WGS84 coordinate.
    #[error("invalid track point #{index}: lat={latitude}, lon={longitude}")]
    InvalidPoint {
        index: usize,
        latitude: f64,
        longitude: f64,
    },

    /// Search configuration rejected before any query was issued.
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: String, reason: String },

    /// The POI source failed for one window (after any retries).
    #[error("POI query for window #{} at {:.3} km failed: {message}", window.index, window.km_from_start)]
    SourceQuery {
        window: QueryWindow,
        message: String,
    },

    /// The run was cancelled; partial results are discarded.
    #[error("run cancelled")]
    Cancelled,
}

impl TrackPoiError {
    pub(crate) fn invalid_parameter(name: &str, reason: impl Into<String>) -> Self {
        TrackPoiError::InvalidParameter {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

/// Error reported by a [`PoiSource`](crate::PoiSource) for a single query.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct SourceError {
    pub message: String,
    /// Whether repeating the same query may succeed (rate limits, timeouts, 5xx).
    pub retryable: bool,
}

impl SourceError {
    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: true,
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TrackPoint;

    #[test]
    fn test_error_display() {
        let err = TrackPoiError::EmptyTrack { point_count: 1 };
        assert!(err.to_string().contains("got 1"));

        let err = TrackPoiError::invalid_parameter("step_km", "must be positive");
        assert_eq!(err.to_string(), "invalid parameter `step_km`: must be positive");
    }

    #[test]
    fn test_source_query_display_names_window() {
        let err = TrackPoiError::SourceQuery {
            window: QueryWindow {
                index: 3,
                center: TrackPoint::new(45.0, 7.0),
                radius_km: 2.0,
                km_from_start: 12.5,
            },
            message: "HTTP 504".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("#3"));
        assert!(text.contains("12.500 km"));
        assert!(text.contains("HTTP 504"));
    }

    #[test]
    fn test_source_error_constructors() {
        assert!(SourceError::retryable("429").retryable);
        assert!(!SourceError::fatal("bad query").retryable);
    }
}
