use clap::Parser;
use log::info;

use speedcam::perspective::Calibration;
use speedcam::pipeline::{Pipeline, PipelineConfig};
use speedcam::replay::TrackLog;
use speedcam::Error;

#[derive(Debug, Parser)]
#[command(
    name = "speedcam",
    about = "Vehicle speed measurement over tracked detections"
)]
struct Opts {
    /// Input video file
    #[arg(short, long)]
    input: String,

    /// Annotated output video, same resolution and frame rate as the input
    #[arg(short, long)]
    output: String,

    /// CSV destination for the per-frame vehicle records
    #[arg(short, long)]
    records: String,

    /// Recorded tracker output, one `<frame>: <JSON array>` line per frame
    #[arg(short, long)]
    tracks: String,

    /// Camera calibration JSON: image quadrilateral to ground rectangle in
    /// meters; defaults to the built-in highway setup
    #[arg(short, long)]
    calibration: Option<String>,
}

fn load_calibration(path: &str) -> Result<Calibration, Error> {
    let file = std::fs::File::open(path)?;

    serde_json::from_reader(file).map_err(|err| Error::Calibration(err.to_string()))
}

fn run(opts: &Opts) -> Result<(), Error> {
    let calibration = match &opts.calibration {
        Some(path) => load_calibration(path)?,
        None => Calibration::default(),
    };

    info!("replaying tracker output from {}", opts.tracks);
    let log = TrackLog::open(&opts.tracks)?;

    let config = PipelineConfig {
        calibration,
        ..Default::default()
    };

    let mut pipeline = Pipeline::new(config, log)?;
    let summary = pipeline.run(&opts.input, &opts.output, &opts.records)?;

    println!(
        "processed {} frames, {} records -> {} / {}",
        summary.frames, summary.records, opts.output, opts.records
    );

    Ok(())
}

fn main() {
    env_logger::init();

    let opts = Opts::parse();

    if let Err(err) = run(&opts) {
        eprintln!("speedcam: {}", err);
        std::process::exit(1);
    }
}
