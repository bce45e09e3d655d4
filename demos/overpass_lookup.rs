//! Query the public Overpass API for cafes and bakeries along a short track.
//!
//! Run with: RUST_LOG=info cargo run --example overpass_lookup --features http
//!
//! This talks to a live public service; please keep the track short.

use alongtrack::{
    pipeline, CategoryFilter, FailurePolicy, OverpassConfig, OverpassSource, PipelineOptions,
    SearchConfig, TrackPoint,
};
use std::time::Duration;

#[tokio::main]
async fn main() {
    // Bern old town, ~2 km
    let track = vec![
        TrackPoint::new(46.9481, 7.4474),
        TrackPoint::new(46.9479, 7.4520),
        TrackPoint::new(46.9475, 7.4580),
        TrackPoint::new(46.9470, 7.4640),
    ];

    let config = SearchConfig::with_radius(0.5).include(["amenity=cafe", "shop=bakery"]);

    let filter = match CategoryFilter::from_config(&config) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Invalid config: {}", e);
            return;
        }
    };

    let overpass = OverpassConfig {
        timeout: Duration::from_secs(25),
        ..Default::default()
    };
    let source = match OverpassSource::new(overpass, &filter) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Failed to create source: {}", e);
            return;
        }
    };

    let options = PipelineOptions {
        on_window_failure: FailurePolicy::SkipWindow,
        max_in_flight: 2,
        ..Default::default()
    };

    match pipeline::run_concurrent(&track, &source, &config, &options).await {
        Ok(result) => {
            println!("{} POIs along {:.2} km\n", result.pois.len(), result.summary.track_length_km);
            for poi in &result.pois {
                println!(
                    "{:>6.2} km  {:>5.2} km off  {:<5}  {}",
                    poi.km_from_start, poi.distance_from_track_km, poi.proximity_class, poi.name
                );
            }
            for skipped in &result.summary.skipped_windows {
                println!("Skipped window #{}: {}", skipped.window.index, skipped.message);
            }
        }
        Err(e) => eprintln!("Run failed: {}", e),
    }
}
