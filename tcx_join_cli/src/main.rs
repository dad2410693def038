use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, ValueHint};
use rayon::prelude::*;
use tcx_join::{join_tracks, parse_tcx, JoinParams, MergeMode, MergeReport, Sample};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Merge two TCX recordings and interpolate missing metrics",
    long_about = None
)]
struct Cli {
    /// Range policy: `union` (alias `all`) or `only-during-gps`
    mode: String,

    /// First TCX input
    #[arg(value_hint = ValueHint::FilePath)]
    input_a: PathBuf,

    /// Second TCX input
    #[arg(value_hint = ValueHint::FilePath)]
    input_b: PathBuf,

    /// Output TCX path
    #[arg(value_hint = ValueHint::FilePath)]
    output: PathBuf,

    /// Sport attribute written on the merged activity
    #[arg(long, default_value = "Running")]
    sport: String,

    /// Identifier for the merged activity (defaults to the current time)
    #[arg(long = "id")]
    activity_id: Option<String>,

    /// Write the merge report as JSON (`-` for stdout)
    #[arg(long, value_hint = ValueHint::FilePath)]
    report: Option<PathBuf>,

    /// Verbose logging
    #[arg(long, action = ArgAction::SetTrue)]
    verbose: bool,

    /// Profile major stages with timings
    #[arg(long, action = ArgAction::SetTrue)]
    profile: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    handle_join(cli)
}

fn handle_join(cli: Cli) -> Result<()> {
    let mut params = JoinParams::default();
    params.mode = cli.mode.parse::<MergeMode>()?;
    params.sport = cli.sport.clone();
    params.activity_id = cli.activity_id.clone();

    // Parse both inputs in parallel
    let t_parse = Instant::now();
    let inputs = vec![cli.input_a.clone(), cli.input_b.clone()];
    let mut tracks: Vec<Vec<Sample>> = inputs
        .par_iter()
        .map(|path| read_track(path))
        .collect::<Result<Vec<_>>>()?;
    let track_b = tracks.pop().unwrap_or_default();
    let track_a = tracks.pop().unwrap_or_default();
    if cli.profile || cli.verbose {
        info!(
            "Parse stage: {:.1} ms ({} + {} samples)",
            t_parse.elapsed().as_secs_f64() * 1000.0,
            track_a.len(),
            track_b.len()
        );
    }

    let t_merge = Instant::now();
    let joined = join_tracks(track_a, track_b, &params)?;
    if cli.profile || cli.verbose {
        info!(
            "Merge stage: {:.1} ms ({} samples)",
            t_merge.elapsed().as_secs_f64() * 1000.0,
            joined.report.output
        );
    }
    log_report(&joined.report);

    // The TCX output is written last so a failed run leaves no output file.
    if let Some(path) = cli.report.as_ref() {
        write_report(&joined.report, path)?;
    }
    fs::write(&cli.output, &joined.document)
        .with_context(|| format!("failed to write {}", cli.output.display()))?;

    info!("tcx-join finished writing {}", cli.output.display());
    Ok(())
}

fn read_track(path: &Path) -> Result<Vec<Sample>> {
    let data = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let samples =
        parse_tcx(&data).with_context(|| format!("failed to parse {}", path.display()))?;
    debug!("{}: {} trackpoints", path.display(), samples.len());
    Ok(samples)
}

fn log_report(report: &MergeReport) {
    info!(
        "Merged {} + {} samples into {} ({})",
        report.input_a, report.input_b, report.output, report.mode
    );
    if report.dropped_before + report.dropped_after > 0 {
        info!(
            "Dropped {} samples before and {} after the GPS range",
            report.dropped_before, report.dropped_after
        );
    }
    for metric in report.presence.metrics() {
        let fill = report.fill(metric);
        info!(
            "{}: {} interpolated, {} without value",
            metric.name(),
            fill.filled,
            fill.missing
        );
        if fill.missing > 0 {
            debug!(
                "{} samples outside the {} coverage were not extrapolated",
                fill.missing,
                metric.name()
            );
        }
    }
    if !report.presence.position {
        warn!("Neither input carries a position");
    }
}

fn write_report(report: &MergeReport, path: &Path) -> Result<()> {
    let text = serde_json::to_string_pretty(report)?;
    if path.as_os_str() == "-" {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        writeln!(handle, "{}", text)?;
    } else {
        fs::write(path, text).with_context(|| format!("failed to write {}", path.display()))?;
        info!("Wrote merge report: {}", path.display());
    }
    Ok(())
}
