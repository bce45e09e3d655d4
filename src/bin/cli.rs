//! alongtrack CLI - find POIs along a GPX track
//!
//! Usage:
//!   alongtrack-cli <track.gpx> --pois <pool.json> [--radius-km 5] [--include amenity=cafe]...
//!   alongtrack-cli <track.gpx> --overpass [--preset food] [--json]
//!
//! The POI pool is a JSON array of candidates (`stable_id`, `name`, `latitude`,
//! `longitude`, `category_tags`, `contact`). `--overpass` needs the `http` feature.

use std::fs::File;
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use alongtrack::{
    pipeline, FailurePolicy, InMemorySource, PipelineOptions, RawCandidate, RunResult,
    SearchConfig, TrackPoint,
};
use clap::Parser;
use gpx::{read, Gpx};
use log::{info, warn};

#[derive(Parser)]
#[command(name = "alongtrack-cli")]
#[command(about = "Find points of interest along a GPX track", long_about = None)]
struct Cli {
    /// GPX file with the track (all tracks and segments are concatenated)
    track: PathBuf,

    /// JSON file with the POI pool to search
    #[arg(long, conflicts_with = "overpass")]
    pois: Option<PathBuf>,

    /// Query the public Overpass API instead of a local pool
    #[arg(long)]
    overpass: bool,

    /// Maximum distance from the track in km
    #[arg(short, long, default_value = "5.0")]
    radius_km: f64,

    /// Distance between query windows in km (default: 0.6 x radius)
    #[arg(short, long)]
    step_km: Option<f64>,

    /// Only keep POIs with this category (repeatable)
    #[arg(short, long)]
    include: Vec<String>,

    /// Drop POIs with this category (repeatable)
    #[arg(short, long)]
    exclude: Vec<String>,

    /// Add a named category preset to the includes (repeatable)
    #[arg(short, long)]
    preset: Vec<String>,

    /// Leave failed windows uncovered instead of aborting
    #[arg(long)]
    skip_failed: bool,

    /// Print JSON instead of a table
    #[arg(long)]
    json: bool,

    /// Enable verbose debug output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format(|buf, record| writeln!(buf, "[{:5}] {}", record.level(), record.args()))
        .init();

    match run(&cli) {
        Ok(result) => {
            if cli.json {
                print_json(&result)
            } else {
                print_table(&result);
                ExitCode::SUCCESS
            }
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<RunResult, String> {
    let mut config = SearchConfig::with_radius(cli.radius_km)
        .include(cli.include.iter().cloned())
        .exclude(cli.exclude.iter().cloned())
        .preset(cli.preset.iter().cloned());
    if let Some(step) = cli.step_km {
        config = config.step_km(step);
    }
    config.validate().map_err(|e| e.to_string())?;

    let options = PipelineOptions {
        on_window_failure: if cli.skip_failed {
            FailurePolicy::SkipWindow
        } else {
            FailurePolicy::Abort
        },
        ..Default::default()
    };

    let points = parse_gpx_file(&cli.track)?;
    info!("Loaded {} track points from {}", points.len(), cli.track.display());

    let result = if cli.overpass {
        run_overpass(&points, &config, &options)?
    } else {
        let path = cli
            .pois
            .as_ref()
            .ok_or_else(|| "either --pois <file> or --overpass is required".to_string())?;
        let source = InMemorySource::new(load_pool(path)?);
        info!("Loaded {} candidates from {}", source.len(), path.display());
        pipeline::run(&points, &source, &config, &options).map_err(|e| e.to_string())?
    };

    for skipped in &result.summary.skipped_windows {
        warn!(
            "Window #{} at {:.2} km not covered: {}",
            skipped.window.index, skipped.window.km_from_start, skipped.message
        );
    }

    Ok(result)
}

#[cfg(feature = "http")]
fn run_overpass(
    points: &[TrackPoint],
    config: &SearchConfig,
    options: &PipelineOptions,
) -> Result<RunResult, String> {
    use alongtrack::{CategoryFilter, OverpassConfig, OverpassSource};

    let filter = CategoryFilter::from_config(config).map_err(|e| e.to_string())?;
    let source = OverpassSource::new(OverpassConfig::default(), &filter).map_err(|e| e.message)?;

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| format!("Failed to create tokio runtime: {}", e))?;

    rt.block_on(pipeline::run_concurrent(points, &source, config, options))
        .map_err(|e| e.to_string())
}

#[cfg(not(feature = "http"))]
fn run_overpass(_: &[TrackPoint], _: &SearchConfig, _: &PipelineOptions) -> Result<RunResult, String> {
    Err("--overpass requires building with the `http` feature".to_string())
}

/// Parse a GPX file into track points. Falls back to routes when there are no tracks.
fn parse_gpx_file(path: &Path) -> Result<Vec<TrackPoint>, String> {
    let file = File::open(path).map_err(|e| format!("{}: {}", path.display(), e))?;
    let gpx: Gpx = read(BufReader::new(file)).map_err(|e| format!("{}: {}", path.display(), e))?;

    let mut points = Vec::new();
    for track in &gpx.tracks {
        for segment in &track.segments {
            for pt in &segment.points {
                points.push(TrackPoint::from_lon_lat(pt.point().x(), pt.point().y()));
            }
        }
    }

    if points.is_empty() {
        for route in &gpx.routes {
            for pt in &route.points {
                points.push(TrackPoint::from_lon_lat(pt.point().x(), pt.point().y()));
            }
        }
    }

    Ok(points)
}

fn load_pool(path: &Path) -> Result<Vec<RawCandidate>, String> {
    let file = File::open(path).map_err(|e| format!("{}: {}", path.display(), e))?;
    serde_json::from_reader(BufReader::new(file)).map_err(|e| format!("{}: {}", path.display(), e))
}

fn print_table(result: &RunResult) {
    let summary = &result.summary;
    println!("\n{}", "=".repeat(100));
    println!(
        "{} POIs along {:.1} km ({} windows, {} raw candidates, {} skipped)",
        summary.rows_count,
        summary.track_length_km,
        summary.windows_queried,
        summary.raw_candidates,
        summary.skipped_windows.len()
    );
    println!("{}", "=".repeat(100));
    println!(
        "{:<30} {:>9} {:>9} {:<5} {:<28} {:<16} Opening hours",
        "Name", "Km", "Off (km)", "Class", "Website", "Phone"
    );

    for poi in &result.pois {
        println!(
            "{:<30} {:>9.2} {:>9.2} {:<5} {:<28} {:<16} {}",
            truncate(&poi.name, 30),
            poi.km_from_start,
            poi.distance_from_track_km,
            poi.proximity_class,
            truncate(poi.contact.website.as_deref().unwrap_or("-"), 28),
            truncate(poi.contact.phone.as_deref().unwrap_or("-"), 16),
            poi.contact.opening_hours.as_deref().unwrap_or("-")
        );
    }
}

fn print_json(result: &RunResult) -> ExitCode {
    let output = serde_json::json!({
        "summary": result.summary,
        "pois": result.pois,
    });
    match serde_json::to_string_pretty(&output) {
        Ok(text) => {
            println!("{}", text);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max - 1).collect();
        format!("{}…", cut)
    }
}
