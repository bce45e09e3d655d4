//! Compare sequential and rayon-parallel window queries on a long synthetic track.
//!
//! Run with: cargo run --release --example parallel_windows --features parallel

use alongtrack::{enrich, enrich_parallel, sample_windows, InMemorySource, RawCandidate, SearchConfig, Track, TrackPoint};
use std::time::Instant;

fn main() {
    // ~200 km zig-zag track
    let points: Vec<TrackPoint> = (0..2000)
        .map(|i| {
            let t = i as f64;
            TrackPoint::new(47.0 + (t * 0.05).sin() * 0.05, 8.0 + t * 0.0013)
        })
        .collect();

    // Pseudo-random POI cloud around the track
    let candidates: Vec<RawCandidate> = (0..20_000u64)
        .map(|i| {
            let h = i.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let lat = 46.9 + ((h >> 33) % 10_000) as f64 * 0.00002;
            let lng = 8.0 + ((h >> 13) % 100_000) as f64 * 0.000027;
            RawCandidate::new(format!("node/{}", i), lat, lng).with_tags(["amenity=bench"])
        })
        .collect();

    let track = match Track::load(points) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("Invalid track: {}", e);
            return;
        }
    };
    let source = InMemorySource::new(candidates);
    let config = SearchConfig::with_radius(2.0);

    println!("Parallel Window Example\n");
    println!("Track: {:.1} km, {} points, {} candidates\n", track.length_km(), track.points().len(), source.len());

    let windows = || sample_windows(&track, config.step_km, config.radius_km);

    let start = Instant::now();
    let sequential = windows().and_then(|w| enrich(&track, w, &source, &config));
    let seq_time = start.elapsed();

    let start = Instant::now();
    let parallel = windows().and_then(|w| enrich_parallel(&track, w, &source, &config));
    let par_time = start.elapsed();

    match (sequential, parallel) {
        (Ok(seq), Ok(par)) => {
            println!("Sequential: {} POIs in {:?}", seq.len(), seq_time);
            println!("Parallel:   {} POIs in {:?}", par.len(), par_time);
            println!("Identical:  {}", seq == par);
        }
        (Err(e), _) | (_, Err(e)) => eprintln!("Run failed: {}", e),
    }
}
