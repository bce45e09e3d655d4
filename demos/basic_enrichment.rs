//! Basic example of enriching a track with nearby POIs.
//!
//! Run with: cargo run --example basic_enrichment

use alongtrack::{
    pipeline, ContactFields, InMemorySource, PipelineOptions, RawCandidate, SearchConfig,
    TrackPoint,
};

fn main() {
    // A short ride along Lake Geneva, Lausanne to Vevey
    let track = vec![
        TrackPoint::new(46.5070, 6.6270), // Start
        TrackPoint::new(46.4960, 6.6700),
        TrackPoint::new(46.4880, 6.7200),
        TrackPoint::new(46.4750, 6.7800),
        TrackPoint::new(46.4600, 6.8430), // End
    ];

    let pool = vec![
        RawCandidate::new("node/1", 46.4990, 6.6690)
            .with_name("Cafe du Port")
            .with_tags(["amenity=cafe"])
            .with_contact(ContactFields {
                opening_hours: Some("Mo-Su 07:00-19:00".to_string()),
                ..Default::default()
            }),
        RawCandidate::new("node/2", 46.4860, 6.7310)
            .with_name("Boulangerie")
            .with_tags(["shop=bakery"]),
        RawCandidate::new("way/3", 46.5100, 6.7800)
            .with_name("Camping Les Vignes")
            .with_tags(["tourism=camp_site"]),
        RawCandidate::new("node/4", 46.4700, 6.7900)
            .with_name("Musee")
            .with_tags(["tourism=museum"]),
        // Far inland, outside any reasonable radius
        RawCandidate::new("node/5", 46.6500, 6.7000).with_name("Too far"),
    ];

    let source = InMemorySource::new(pool);
    let config = SearchConfig::with_radius(5.0).preset(["food", "camping"]);

    println!("Track POI Enrichment Example\n");
    println!(
        "Config: radius={} km, step={} km, near<={} km, mid<={} km\n",
        config.radius_km, config.step_km, config.thresholds.near_km, config.thresholds.mid_km
    );

    let result = match pipeline::run(&track, &source, &config, &PipelineOptions::default()) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Run failed: {}", e);
            return;
        }
    };

    println!(
        "Track: {:.2} km, {} windows, {} raw candidates, {} queries\n",
        result.summary.track_length_km,
        result.summary.windows_queried,
        result.summary.raw_candidates,
        source.query_count()
    );

    for poi in &result.pois {
        println!("{} ({})", poi.name, poi.stable_id);
        println!("   Km from start: {:.2}", poi.km_from_start);
        println!("   Off track:     {:.2} km ({})", poi.distance_from_track_km, poi.proximity_class);
        if let Some(category) = &poi.matched_category {
            println!("   Matched:       {}", category);
        }
        if let Some(hours) = &poi.contact.opening_hours {
            println!("   Open:          {}", hours);
        }
        println!();
    }
}
