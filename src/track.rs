//! Track model: an immutable polyline with a cumulative-distance table.
//!
//! Every position on the track can be addressed by its distance from the first point
//! ("km from start"). The table is computed once at load time from the haversine
//! length of each segment.

use log::debug;

use crate::error::{Result, TrackPoiError};
use crate::geo_utils::{self, haversine_km, project_point_to_segment};
use crate::{Bounds, TrackPoint};

/// Closest location on the track to some point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NearestApproach {
    /// Distance from the point to the track (km)
    pub distance_km: f64,
    /// Distance along the track from its start to the nearest location (km)
    pub km_from_start: f64,
    /// Index of the segment (`points[i] -> points[i + 1]`) that achieved the minimum
    pub segment_index: usize,
}

impl NearestApproach {
    /// True if `self` should replace `current` as the best approach.
    /// Smaller distance wins; equal distances prefer the earlier along-track position,
    /// then the lower segment index.
    #[inline]
    pub(crate) fn beats(&self, current: &NearestApproach) -> bool {
        if self.distance_km != current.distance_km {
            return self.distance_km < current.distance_km;
        }
        if self.km_from_start != current.km_from_start {
            return self.km_from_start < current.km_from_start;
        }
        self.segment_index < current.segment_index
    }
}

/// A loaded GPS track.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    points: Vec<TrackPoint>,
    cumulative_km: Vec<f64>,
}

impl Track {
    /// Load a track from an ordered list of points.
    ///
    /// Fails with [`TrackPoiError::EmptyTrack`] for fewer than 2 points and with
    /// [`TrackPoiError::InvalidPoint`] for the first point outside the WGS84 range.
    ///
    /// # Example
    /// ```
    /// use alongtrack::{Track, TrackPoint};
    ///
    /// let track = Track::load(vec![
    ///     TrackPoint::new(46.00, 7.00),
    ///     TrackPoint::new(46.01, 7.00),
    /// ]).unwrap();
    /// assert!((track.length_km() - 1.112).abs() < 0.001);
    /// ```
    pub fn load(points: Vec<TrackPoint>) -> Result<Self> {
        if points.len() < 2 {
            return Err(TrackPoiError::EmptyTrack { point_count: points.len() });
        }

        if let Some((index, p)) = points.iter().enumerate().find(|(_, p)| !p.is_valid()) {
            return Err(TrackPoiError::InvalidPoint {
                index,
                latitude: p.latitude,
                longitude: p.longitude,
            });
        }

        let mut cumulative_km = Vec::with_capacity(points.len());
        let mut total = 0.0;
        cumulative_km.push(total);
        for w in points.windows(2) {
            total += haversine_km(&w[0], &w[1]);
            cumulative_km.push(total);
        }

        debug!("[Track] Loaded {} points, {:.3} km", points.len(), total);

        Ok(Self { points, cumulative_km })
    }

    /// Track points in recording order.
    pub fn points(&self) -> &[TrackPoint] {
        &self.points
    }

    /// Cumulative distance (km) from the first point to each point.
    /// Same length as [`points`](Self::points); first entry is 0.
    pub fn cumulative_distance(&self) -> &[f64] {
        &self.cumulative_km
    }

    /// Total track length in kilometers.
    pub fn length_km(&self) -> f64 {
        // load() guarantees at least two entries
        self.cumulative_km[self.cumulative_km.len() - 1]
    }

    /// Number of segments (`points.len() - 1`).
    pub fn segment_count(&self) -> usize {
        self.points.len() - 1
    }

    /// Bounding box of all track points.
    pub fn bounds(&self) -> Bounds {
        geo_utils::compute_bounds(&self.points)
    }

    /// Location at `km` along the track, clamped to the track's extent.
    pub fn point_at_km(&self, km: f64) -> TrackPoint {
        let total = self.length_km();
        if km <= 0.0 {
            return self.points[0];
        }
        if km >= total {
            return self.points[self.points.len() - 1];
        }

        // First index whose cumulative distance exceeds km; 1 <= upper < len
        let upper = self.cumulative_km.partition_point(|&d| d <= km);
        let lower = upper - 1;
        let seg_len = self.cumulative_km[upper] - self.cumulative_km[lower];
        if seg_len <= 0.0 {
            return self.points[lower];
        }

        let ratio = (km - self.cumulative_km[lower]) / seg_len;
        geo_utils::interpolate(&self.points[lower], &self.points[upper], ratio)
    }

    /// Project `point` onto segment `index`.
    #[inline]
    pub(crate) fn approach_to_segment(&self, point: &TrackPoint, index: usize) -> NearestApproach {
        let proj = project_point_to_segment(
            point,
            &self.points[index],
            &self.points[index + 1],
            self.cumulative_km[index],
            self.cumulative_km[index + 1],
        );
        NearestApproach {
            distance_km: proj.distance_km,
            km_from_start: proj.along_km,
            segment_index: index,
        }
    }

    /// Nearest approach of `point` to the whole track.
    ///
    /// Every segment is evaluated; the smallest distance wins and ties go to the
    /// smallest `km_from_start`.
    pub fn nearest_point_on_track(&self, point: &TrackPoint) -> NearestApproach {
        let mut best = self.approach_to_segment(point, 0);
        for index in 1..self.segment_count() {
            let candidate = self.approach_to_segment(point, index);
            if candidate.beats(&best) {
                best = candidate;
            }
        }
        best
    }
}

/// Anything that can supply the ordered points of a track.
pub trait TrackSource {
    fn load_points(&self) -> Result<Vec<TrackPoint>>;
}

impl TrackSource for [TrackPoint] {
    fn load_points(&self) -> Result<Vec<TrackPoint>> {
        Ok(self.to_vec())
    }
}

impl TrackSource for Vec<TrackPoint> {
    fn load_points(&self) -> Result<Vec<TrackPoint>> {
        Ok(self.clone())
    }
}

/// `(longitude, latitude)` pairs, as GPX and GeoJSON order them.
impl TrackSource for [(f64, f64)] {
    fn load_points(&self) -> Result<Vec<TrackPoint>> {
        Ok(self
            .iter()
            .map(|&(lon, lat)| TrackPoint::from_lon_lat(lon, lat))
            .collect())
    }
}

impl TrackSource for Vec<(f64, f64)> {
    fn load_points(&self) -> Result<Vec<TrackPoint>> {
        self.as_slice().load_points()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zigzag() -> Vec<TrackPoint> {
        vec![
            TrackPoint::new(46.000, 7.000),
            TrackPoint::new(46.010, 7.010),
            TrackPoint::new(46.010, 7.010), // repeated fix
            TrackPoint::new(46.000, 7.020),
            TrackPoint::new(46.010, 7.030),
        ]
    }

    #[test]
    fn test_load_rejects_short_tracks() {
        assert_eq!(
            Track::load(vec![]).unwrap_err(),
            TrackPoiError::EmptyTrack { point_count: 0 }
        );
        assert_eq!(
            Track::load(vec![TrackPoint::new(46.0, 7.0)]).unwrap_err(),
            TrackPoiError::EmptyTrack { point_count: 1 }
        );
    }

    #[test]
    fn test_load_rejects_invalid_point() {
        let err = Track::load(vec![
            TrackPoint::new(46.0, 7.0),
            TrackPoint::new(46.0, 7.1),
            TrackPoint::new(95.0, 7.2),
        ])
        .unwrap_err();
        assert!(matches!(err, TrackPoiError::InvalidPoint { index: 2, .. }));
    }

    #[test]
    fn test_cumulative_distance_monotonic() {
        let track = Track::load(zigzag()).unwrap();
        let cum = track.cumulative_distance();

        assert_eq!(cum.len(), track.points().len());
        assert_eq!(cum[0], 0.0);
        assert!(cum.windows(2).all(|w| w[1] >= w[0]));
        assert_eq!(cum[1], cum[2]); // repeated fix adds nothing
        assert!(cum[3] > cum[2]);
        assert_eq!(*cum.last().unwrap(), track.length_km());
        assert!((track.length_km() - geo_utils::polyline_length_km(track.points())).abs() < 1e-9);
    }

    #[test]
    fn test_point_at_km() {
        let track = Track::load(zigzag()).unwrap();
        assert_eq!(track.point_at_km(-1.0), track.points()[0]);
        assert_eq!(track.point_at_km(0.0), track.points()[0]);
        assert_eq!(track.point_at_km(track.length_km()), track.points()[4]);
        assert_eq!(track.point_at_km(track.length_km() + 5.0), track.points()[4]);

        let cum = track.cumulative_distance();
        let halfway = (cum[0] + cum[1]) / 2.0;
        let p = track.point_at_km(halfway);
        assert!((p.latitude - 46.005).abs() < 1e-9);
        assert!((p.longitude - 7.005).abs() < 1e-9);

        // A vertex position returns the vertex itself
        let at_vertex = track.point_at_km(cum[3]);
        assert!((at_vertex.latitude - 46.000).abs() < 1e-9);
        assert!((at_vertex.longitude - 7.020).abs() < 1e-9);
    }

    #[test]
    fn test_nearest_on_vertex() {
        let track = Track::load(zigzag()).unwrap();
        for (i, p) in track.points().iter().enumerate() {
            let nearest = track.nearest_point_on_track(p);
            assert_eq!(nearest.distance_km, 0.0, "vertex {}", i);
            assert!((nearest.km_from_start - track.cumulative_distance()[i]).abs() < 1e-9);
        }
    }

    #[test]
    fn test_nearest_prefers_earlier_on_tie() {
        // Out-and-back: every point near the track is equally close to both legs
        let track = Track::load(vec![
            TrackPoint::new(0.0, 0.0),
            TrackPoint::new(0.0, 0.1),
            TrackPoint::new(0.0, 0.0),
        ])
        .unwrap();
        let poi = TrackPoint::new(0.001, 0.05);
        let nearest = track.nearest_point_on_track(&poi);
        assert_eq!(nearest.segment_index, 0);
        assert!(nearest.km_from_start < track.length_km() / 2.0);
    }

    #[test]
    fn test_track_sources() {
        let pairs = vec![(7.0, 46.0), (7.1, 46.1)];
        let points = pairs.load_points().unwrap();
        assert_eq!(points[0], TrackPoint::new(46.0, 7.0));
        assert_eq!(points[1], TrackPoint::new(46.1, 7.1));

        let owned = vec![TrackPoint::new(1.0, 2.0)];
        assert_eq!(owned.load_points().unwrap(), owned);
    }
}
