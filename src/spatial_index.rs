//! Spatial index over track segments.
//!
//! Uses an R-tree of segment bounding boxes so a POI only has to be projected onto
//! the segments that could possibly lie within the search radius.

use rstar::{RTree, RTreeObject, AABB};

use crate::geo_utils::km_to_degrees;
use crate::track::{NearestApproach, Track};
use crate::TrackPoint;

/// Extra room on the search box. Covers the gap between the flat projection used for
/// distances and the degree conversion used for the box.
const SEARCH_MARGIN: f64 = 1.25;

/// Square-ish box covering `km` around `point`, sized at its poleward edge where a
/// degree of longitude is shortest. `None` when that edge reaches the pole.
fn search_box(point: &TrackPoint, km: f64) -> Option<AABB<[f64; 2]>> {
    let lat_buffer = km_to_degrees(km, 0.0);
    let poleward = point.latitude.abs() + lat_buffer;
    if poleward >= 90.0 {
        return None;
    }

    let lng_buffer = lat_buffer / poleward.to_radians().cos();
    if lng_buffer >= 180.0 {
        return None;
    }

    Some(AABB::from_corners(
        [point.longitude - lng_buffer, point.latitude - lat_buffer],
        [point.longitude + lng_buffer, point.latitude + lat_buffer],
    ))
}

/// Segment bounds wrapper for R-tree spatial indexing.
#[derive(Debug, Clone)]
struct SegmentBounds {
    index: usize,
    min_lat: f64,
    max_lat: f64,
    min_lng: f64,
    max_lng: f64,
}

impl RTreeObject for SegmentBounds {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners([self.min_lng, self.min_lat], [self.max_lng, self.max_lat])
    }
}

/// R-tree of a track's segments.
///
/// Built once per run; the index borrows nothing, but must only be queried with the
/// track it was built from.
#[derive(Debug)]
pub struct TrackIndex {
    tree: RTree<SegmentBounds>,
}

impl TrackIndex {
    /// Index every segment of `track`.
    pub fn new(track: &Track) -> Self {
        let segments: Vec<SegmentBounds> = track
            .points()
            .windows(2)
            .enumerate()
            .map(|(index, w)| SegmentBounds {
                index,
                min_lat: w[0].latitude.min(w[1].latitude),
                max_lat: w[0].latitude.max(w[1].latitude),
                min_lng: w[0].longitude.min(w[1].longitude),
                max_lng: w[0].longitude.max(w[1].longitude),
            })
            .collect();

        Self {
            tree: RTree::bulk_load(segments),
        }
    }

    /// Number of indexed segments.
    pub fn len(&self) -> usize {
        self.tree.size()
    }

    /// Check if the index is empty.
    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    /// Nearest approach of `point` to `track`, if it is within `radius_km`.
    ///
    /// For every point whose distance to the track is at most `radius_km` the result
    /// is identical to [`Track::nearest_point_on_track`]: the winning segment always
    /// intersects the search box, and ties are broken the same way.
    pub fn nearest_within(
        &self,
        track: &Track,
        point: &TrackPoint,
        radius_km: f64,
    ) -> Option<NearestApproach> {
        let Some(search_box) = search_box(point, radius_km * SEARCH_MARGIN) else {
            // The box would wrap a pole or the whole globe
            let linear = track.nearest_point_on_track(point);
            return (linear.distance_km <= radius_km).then_some(linear);
        };

        let mut best: Option<NearestApproach> = None;
        for segment in self.tree.locate_in_envelope_intersecting(&search_box) {
            let candidate = track.approach_to_segment(point, segment.index);
            let better = match &best {
                None => true,
                Some(current) => candidate.beats(current),
            };
            if better {
                best = Some(candidate);
            }
        }

        best.filter(|b| b.distance_km <= radius_km)
    }
}
