use super::CliError;
use anyhow::Context;
use std::fs;
use std::path::{Path, PathBuf};
use xrf_core::common::{FitRunConfig, load_fit_run_config};
use xrf_core::domain::{FittingRoutineKind, XrfError};
use xrf_core::overrides::load_params_override;
use xrf_core::pipeline::{AnalysisJob, ScanVolume};
use xrf_core::stream::{
    CollectingSink, StreamBlock, StreamSink, XRF_COUNTS_TOPIC, decode_frames, put_frame,
};

#[derive(clap::Args)]
pub(super) struct FitArgs {
    /// Parameter override file (`KEY: value` lines)
    #[arg(long)]
    params: PathBuf,

    /// Scan volume JSON (`height`, `width`, `detector`, `spectra`)
    #[arg(long)]
    scan: PathBuf,

    /// Element maps JSON output path
    #[arg(long)]
    output: PathBuf,

    /// Run configuration JSON
    #[arg(long)]
    config: Option<PathBuf>,

    /// Fitting routine, overrides the run configuration
    #[arg(long)]
    routine: Option<FittingRoutineKind>,

    /// Solver iteration cap, overrides the run configuration
    #[arg(long)]
    max_iterations: Option<usize>,

    /// Worker threads (0 uses every core), overrides the run configuration
    #[arg(long)]
    workers: Option<usize>,

    /// Detector number stamped on streamed records
    #[arg(long)]
    detector: Option<u32>,

    /// Write one length-prefixed count record per pixel to this file
    #[arg(long)]
    stream: Option<PathBuf>,
}

#[derive(clap::Args)]
pub(super) struct DecodeStreamArgs {
    /// Stream record file written by `fit --stream`
    #[arg(value_name = "FILE")]
    input: PathBuf,
}

pub(super) fn run_fit_command(args: FitArgs) -> Result<i32, CliError> {
    let mut config = match &args.config {
        Some(path) => load_fit_run_config(path).map_err(XrfError::from)?,
        None => FitRunConfig::default(),
    };
    if let Some(routine) = args.routine {
        config.routine = routine;
    }
    if let Some(max_iterations) = args.max_iterations {
        config.max_iterations = max_iterations;
    }
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    if let Some(detector) = args.detector {
        config.detector_number = detector;
    }

    let overrides = load_params_override(&args.params).map_err(XrfError::from)?;
    let mut volume = read_scan_volume(&args.scan)?;
    if args.detector.is_some() || args.config.is_some() {
        volume.detector = config.detector_number;
    }
    volume.validate()?;

    let job = AnalysisJob::new(&overrides, &config, volume.channels())?;
    let sink = args.stream.as_ref().map(|_| CollectingSink::new());
    let report = job.run(&volume, sink.as_ref().map(|sink| sink as &dyn StreamSink))?;

    write_output(
        &args.output,
        serde_json::to_string_pretty(&report)
            .context("failed to serialize element maps")?
            .as_bytes(),
    )?;

    if let (Some(path), Some(sink)) = (&args.stream, sink) {
        let records = sink.into_records();
        let mut buffer = Vec::new();
        for record in &records {
            put_frame(&mut buffer, record);
        }
        write_output(path, &buffer)?;
        tracing::info!(records = records.len(), path = %path.display(), "wrote stream records");
    }

    println!(
        "fitted {} pixels with {} over channels {}: {} converged, {} exhausted, {} failed",
        report.summary.pixels,
        config.routine,
        report.energy_range,
        report.summary.converged,
        report.summary.exhausted,
        report.summary.failed
    );
    Ok(0)
}

pub(super) fn run_decode_stream_command(args: DecodeStreamArgs) -> Result<i32, CliError> {
    let bytes = fs::read(&args.input)
        .with_context(|| format!("failed to read stream file '{}'", args.input.display()))?;
    let records = decode_frames(&bytes).map_err(XrfError::from)?;
    for record in &records {
        println!("{}", render_record(record));
    }
    Ok(0)
}

fn read_scan_volume(path: &Path) -> Result<ScanVolume, CliError> {
    let source = fs::read_to_string(path)
        .with_context(|| format!("failed to read scan volume '{}'", path.display()))?;
    serde_json::from_str(&source).map_err(|error| {
        CliError::Compute(XrfError::input_validation(
            "INPUT.SCAN_VOLUME",
            format!("failed to parse scan volume '{}': {}", path.display(), error),
        ))
    })
}

fn write_output(path: &Path, contents: &[u8]) -> Result<(), CliError> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory '{}'", parent.display()))?;
    }
    fs::write(path, contents)
        .with_context(|| format!("failed to write '{}'", path.display()))?;
    Ok(())
}

fn render_record(record: &StreamBlock) -> String {
    let mut line = format!(
        "{} detector={} row={} col={} height={} width={}",
        XRF_COUNTS_TOPIC, record.detector, record.row, record.col, record.height, record.width
    );
    for block in &record.fitting_blocks {
        line.push_str(&format!(" [{}]", block.routine));
        for (name, value) in &block.counts {
            line.push_str(&format!(" {}={}", name, value));
        }
    }
    line
}
