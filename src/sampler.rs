//! Query window sampling along a track.
//!
//! One query covering a whole track would return far more candidates than are
//! relevant on long or winding routes. Instead the track is walked by cumulative
//! distance and a small circular window is emitted every `step_km`. Neighbouring
//! windows overlap whenever `step_km < 2 * radius_km`, so the aggregator has to
//! deduplicate candidates across windows.

use crate::error::{Result, TrackPoiError};
use crate::track::Track;
use crate::TrackPoint;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A single query to the POI source.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct QueryWindow {
    /// Position of the window in the sampling sequence
    pub index: usize,
    /// Window center, on the track
    pub center: TrackPoint,
    /// Search radius around the center (km)
    pub radius_km: f64,
    /// Cumulative track distance of the center (km)
    pub km_from_start: f64,
}

/// Lazy sequence of windows produced by [`sample_windows`].
///
/// Cloning the iterator restarts nothing; it copies the current position.
#[derive(Debug, Clone)]
pub struct Windows<'a> {
    track: &'a Track,
    step_km: f64,
    radius_km: f64,
    next: usize,
    finished: bool,
}

impl Iterator for Windows<'_> {
    type Item = QueryWindow;

    fn next(&mut self) -> Option<QueryWindow> {
        if self.finished {
            return None;
        }

        let total = self.track.length_km();
        // Multiply instead of accumulating so positions do not drift on long tracks
        let mut position = self.next as f64 * self.step_km;
        if position >= total {
            // Final window sits on the last point
            position = total;
            self.finished = true;
        }

        let window = QueryWindow {
            index: self.next,
            center: self.track.point_at_km(position),
            radius_km: self.radius_km,
            km_from_start: position,
        };
        self.next += 1;
        Some(window)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.finished {
            return (0, Some(0));
        }
        let total = self.track.length_km();
        let remaining_steps = ((total / self.step_km).ceil() as usize).saturating_sub(self.next);
        // +1 for the final window, +1 for rounding between division and multiplication
        (1, Some(remaining_steps + 2))
    }
}

/// Walk `track` and emit a window every `step_km`, starting at 0 and ending with a
/// window centered on the last point.
///
/// Fails with [`TrackPoiError::InvalidParameter`] unless both `step_km` and
/// `radius_km` are finite and strictly positive. The sequence is a pure function of
/// its inputs: calling this twice yields identical windows.
///
/// # Example
/// ```
/// use alongtrack::{sample_windows, Track, TrackPoint};
///
/// let track = Track::load(vec![TrackPoint::new(0.0, 0.0), TrackPoint::new(0.0, 0.09)]).unwrap();
/// let windows: Vec<_> = sample_windows(&track, 4.0, 3.0).unwrap().collect();
///
/// // 0, 4 and 8 km, then the final window at ~10 km
/// assert_eq!(windows.len(), 4);
/// assert_eq!(windows[3].center, track.points()[1]);
/// ```
pub fn sample_windows(track: &Track, step_km: f64, radius_km: f64) -> Result<Windows<'_>> {
    validate_positive("step_km", step_km)?;
    validate_positive("radius_km", radius_km)?;

    Ok(Windows {
        track,
        step_km,
        radius_km,
        next: 0,
        finished: false,
    })
}

pub(crate) fn validate_positive(name: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value <= 0.0 {
        return Err(TrackPoiError::invalid_parameter(
            name,
            format!("must be a finite number > 0, got {}", value),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn straight_track() -> Track {
        // ~10.0 km along the equator
        Track::load(vec![TrackPoint::new(0.0, 0.0), TrackPoint::new(0.0, 0.09)]).unwrap()
    }

    #[test]
    fn test_rejects_bad_parameters() {
        let track = straight_track();
        for (step, radius) in [(0.0, 1.0), (-1.0, 1.0), (1.0, 0.0), (1.0, -2.0), (f64::NAN, 1.0), (1.0, f64::INFINITY)] {
            assert!(
                matches!(
                    sample_windows(&track, step, radius),
                    Err(TrackPoiError::InvalidParameter { .. })
                ),
                "step={} radius={}",
                step,
                radius
            );
        }
    }

    #[test]
    fn test_windows_cover_track() {
        let track = straight_track();
        let windows: Vec<QueryWindow> = sample_windows(&track, 3.0, 2.0).unwrap().collect();

        assert_eq!(windows[0].km_from_start, 0.0);
        assert_eq!(windows[0].center, track.points()[0]);

        let last = windows.last().unwrap();
        assert_eq!(last.km_from_start, track.length_km());
        assert_eq!(last.center, track.points()[1]);

        for (i, w) in windows.iter().enumerate() {
            assert_eq!(w.index, i);
            assert_eq!(w.radius_km, 2.0);
        }
        // 0, 3, 6, 9, end
        assert_eq!(windows.len(), 5);
    }

    #[test]
    fn test_step_longer_than_track() {
        let track = straight_track();
        let windows: Vec<QueryWindow> = sample_windows(&track, 50.0, 5.0).unwrap().collect();
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[1].km_from_start, track.length_km());
    }

    #[test]
    fn test_exact_multiple_has_no_duplicate_end() {
        let track = straight_track();
        let step = track.length_km() / 2.0;
        let windows: Vec<QueryWindow> = sample_windows(&track, step, 1.0).unwrap().collect();
        // 0, L/2, L: position 2*step == L becomes the final window
        assert_eq!(windows.len(), 3);
    }

    #[test]
    fn test_deterministic_and_restartable() {
        let track = straight_track();
        let first: Vec<QueryWindow> = sample_windows(&track, 1.7, 2.0).unwrap().collect();
        let second: Vec<QueryWindow> = sample_windows(&track, 1.7, 2.0).unwrap().collect();
        assert_eq!(first, second);

        let mut iter = sample_windows(&track, 1.7, 2.0).unwrap();
        iter.next();
        let resumed: Vec<QueryWindow> = iter.clone().collect();
        assert_eq!(resumed, first[1..].to_vec());
    }

    #[test]
    fn test_size_hint_upper_bound() {
        let track = straight_track();
        let iter = sample_windows(&track, 1.7, 2.0).unwrap();
        let (_, upper) = iter.size_hint();
        let count = iter.count();
        assert!(upper.unwrap() >= count);
    }
}
