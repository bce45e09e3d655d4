//! End-to-end enrichment scenarios on synthetic tracks.

use alongtrack::{
    enrich, pipeline, sample_windows, InMemorySource, PipelineOptions, ProximityClass,
    RawCandidate, SearchConfig, Track, TrackPoint,
};

/// Kilometers per degree on the mean-radius sphere.
const KM_PER_DEG: f64 = 111.195_08;

/// Straight 10 km track along the equator, heading east.
fn straight_track() -> Vec<TrackPoint> {
    vec![TrackPoint::new(0.0, 0.0), TrackPoint::new(0.0, 10.0 / KM_PER_DEG)]
}

fn midpoint_offset(km_north: f64) -> RawCandidate {
    RawCandidate::new("node/mid", km_north / KM_PER_DEG, 5.0 / KM_PER_DEG)
        .with_name("Halfway")
        .with_tags(["amenity=cafe"])
}

#[test]
fn test_poi_one_km_off_midpoint() {
    let source = InMemorySource::new(vec![midpoint_offset(1.0)]);
    let config = SearchConfig::with_radius(3.0).step_km(5.0);

    let result = pipeline::run(&straight_track(), &source, &config, &PipelineOptions::default()).unwrap();

    assert!((result.summary.track_length_km - 10.0).abs() < 1e-6);
    assert_eq!(result.pois.len(), 1);
    let poi = &result.pois[0];
    assert_eq!(poi.name, "Halfway");
    assert!((poi.distance_from_track_km - 1.0).abs() < 1e-3, "distance {}", poi.distance_from_track_km);
    assert!((poi.km_from_start - 5.0).abs() < 1e-3, "km {}", poi.km_from_start);
    assert_eq!(poi.proximity_class, ProximityClass::Near);
}

#[test]
fn test_poi_four_km_off_depends_on_radius() {
    let source = InMemorySource::new(vec![midpoint_offset(4.0)]);

    let narrow = SearchConfig::with_radius(3.0).step_km(5.0);
    let result = pipeline::run(&straight_track(), &source, &narrow, &PipelineOptions::default()).unwrap();
    assert!(result.pois.is_empty());

    let wide = SearchConfig::with_radius(5.0).step_km(5.0);
    let result = pipeline::run(&straight_track(), &source, &wide, &PipelineOptions::default()).unwrap();
    assert_eq!(result.pois.len(), 1);
    assert!((result.pois[0].distance_from_track_km - 4.0).abs() < 1e-3);
    assert_eq!(result.pois[0].proximity_class, ProximityClass::Mid);
}

#[test]
fn test_include_filter_drops_other_categories() {
    let lat = 0.5 / KM_PER_DEG;
    let source = InMemorySource::new(vec![
        RawCandidate::new("node/1", lat, 2.0 / KM_PER_DEG).with_name("Museum").with_tags(["museum"]),
        RawCandidate::new("node/2", lat, 3.0 / KM_PER_DEG).with_name("Cafe").with_tags(["cafe"]),
    ]);
    let config = SearchConfig::with_radius(3.0).include(["cafe"]);

    let result = pipeline::run(&straight_track(), &source, &config, &PipelineOptions::default()).unwrap();

    assert_eq!(result.pois.len(), 1);
    assert_eq!(result.pois[0].stable_id, "node/2");
    assert_eq!(result.pois[0].matched_category.as_deref(), Some("cafe"));
    assert!(result.summary.raw_candidates >= 2);
}

#[test]
fn test_overlapping_windows_yield_one_row() {
    // Dense windows: every candidate is returned by several of them
    let source = InMemorySource::new(vec![
        midpoint_offset(0.3),
        RawCandidate::new("node/start", 0.0005, 0.0),
        RawCandidate::new("node/end", -0.001, 10.0 / KM_PER_DEG),
    ]);
    let config = SearchConfig::with_radius(2.0).step_km(0.5);

    let result = pipeline::run(&straight_track(), &source, &config, &PipelineOptions::default()).unwrap();

    let ids: Vec<&str> = result.pois.iter().map(|p| p.stable_id.as_str()).collect();
    assert_eq!(ids, vec!["node/start", "node/mid", "node/end"]);
    assert!(result.summary.raw_candidates > result.summary.rows_count);
    assert_eq!(result.summary.rows_count, 3);
}

#[test]
fn test_rows_sorted_by_km_from_start() {
    let candidates: Vec<RawCandidate> = (0..20)
        .rev()
        .map(|i| {
            let km = i as f64 * 0.5;
            let off = if i % 2 == 0 { 0.2 } else { -0.4 };
            RawCandidate::new(format!("node/{}", i), off / KM_PER_DEG, km / KM_PER_DEG)
        })
        .collect();
    let source = InMemorySource::new(candidates);

    let result = pipeline::run(&straight_track(), &source, &SearchConfig::with_radius(1.0), &PipelineOptions::default())
        .unwrap();

    assert_eq!(result.pois.len(), 20);
    for pair in result.pois.windows(2) {
        assert!(pair[0].km_from_start <= pair[1].km_from_start);
    }
    assert!(result.pois.iter().all(|p| p.name == "Unnamed"));
}

#[test]
fn test_enrich_matches_pipeline() {
    let points = vec![
        TrackPoint::new(46.00, 7.00),
        TrackPoint::new(46.02, 7.03),
        TrackPoint::new(46.01, 7.08),
        TrackPoint::new(46.04, 7.12),
    ];
    let candidates: Vec<RawCandidate> = (0..60)
        .map(|i| {
            let lat = 45.99 + ((i * 17) % 60) as f64 * 0.001;
            let lng = 6.99 + ((i * 23) % 60) as f64 * 0.0025;
            RawCandidate::new(format!("node/{}", i), lat, lng)
        })
        .collect();
    let source = InMemorySource::new(candidates);
    let config = SearchConfig::with_radius(1.5);

    let track = Track::load(points.clone()).unwrap();
    let windows = sample_windows(&track, config.step_km, config.radius_km).unwrap();
    let direct = enrich(&track, windows, &source, &config).unwrap();

    let via_pipeline = pipeline::run(&points, &source, &config, &PipelineOptions::default()).unwrap();

    assert_eq!(direct, via_pipeline.pois);
    assert!(!direct.is_empty());
    for poi in &direct {
        assert!(poi.distance_from_track_km <= config.radius_km);
        assert!(poi.km_from_start >= 0.0 && poi.km_from_start <= track.length_km());
    }
}
