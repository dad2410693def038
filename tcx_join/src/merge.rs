use std::fmt;
use std::ops::Range;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::interpolate::ensure_metric;
use crate::metric::Metric;
use crate::sample::Sample;
use crate::TcxError;

/// Range selection policy applied after the two tracks are merged.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MergeMode {
    /// Keep every merged sample.
    Union,
    /// Keep the samples between the first and last position fix, inclusive.
    OnlyDuringGps,
}

impl Default for MergeMode {
    fn default() -> Self {
        MergeMode::Union
    }
}

impl MergeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            MergeMode::Union => "union",
            MergeMode::OnlyDuringGps => "only-during-gps",
        }
    }
}

impl fmt::Display for MergeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MergeMode {
    type Err = TcxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "union" | "all" => Ok(MergeMode::Union),
            "only-during-gps" => Ok(MergeMode::OnlyDuringGps),
            other => Err(TcxError::InvalidMode(other.to_string())),
        }
    }
}

/// Which metrics appear anywhere in a track.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricPresence {
    pub distance: bool,
    pub heart_rate: bool,
    pub position: bool,
}

impl MetricPresence {
    pub fn detect(track: &[Sample]) -> Self {
        Self {
            distance: track.iter().any(|s| Metric::Distance.has(s)),
            heart_rate: track.iter().any(|s| Metric::HeartRate.has(s)),
            position: track.iter().any(|s| Metric::Position.has(s)),
        }
    }

    pub fn contains(&self, metric: Metric) -> bool {
        match metric {
            Metric::Distance => self.distance,
            Metric::HeartRate => self.heart_rate,
            Metric::Position => self.position,
        }
    }

    /// Present metrics in pipeline order.
    pub fn metrics(&self) -> Vec<Metric> {
        Metric::ALL
            .into_iter()
            .filter(|m| self.contains(*m))
            .collect()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricFill {
    pub filled: usize,
    pub missing: usize,
}

/// Counters describing one merge run.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MergeReport {
    pub mode: MergeMode,
    pub input_a: usize,
    pub input_b: usize,
    pub dropped_before: usize,
    pub dropped_after: usize,
    pub output: usize,
    pub presence: MetricPresence,
    pub distance: MetricFill,
    pub heart_rate: MetricFill,
    pub position: MetricFill,
}

impl MergeReport {
    pub fn fill(&self, metric: Metric) -> &MetricFill {
        match metric {
            Metric::Distance => &self.distance,
            Metric::HeartRate => &self.heart_rate,
            Metric::Position => &self.position,
        }
    }

    fn fill_mut(&mut self, metric: Metric) -> &mut MetricFill {
        match metric {
            Metric::Distance => &mut self.distance,
            Metric::HeartRate => &mut self.heart_rate,
            Metric::Position => &mut self.position,
        }
    }
}

/// A finalized merged track.
#[derive(Clone, Debug)]
pub struct Merged {
    pub samples: Vec<Sample>,
    pub report: MergeReport,
}

/// Merge two tracks, parsing `mode` first.
pub fn merge(a: Vec<Sample>, b: Vec<Sample>, mode: &str) -> Result<Merged, TcxError> {
    let mode: MergeMode = mode.parse()?;
    merge_tracks(a, b, mode)
}

/// Concatenate, sort, select, interpolate and finalize two tracks.
pub fn merge_tracks(a: Vec<Sample>, b: Vec<Sample>, mode: MergeMode) -> Result<Merged, TcxError> {
    let mut report = MergeReport {
        mode,
        input_a: a.len(),
        input_b: b.len(),
        ..MergeReport::default()
    };

    let mut samples = a;
    samples.extend(b);
    // Vec::sort_by_key is stable: ties keep A before B.
    samples.sort_by_key(|s| s.time());

    let total = samples.len();
    let range = select_range(&samples, mode)?;
    report.dropped_before = range.start;
    report.dropped_after = total - range.end;
    samples.truncate(range.end);
    samples.drain(..range.start);
    debug!("{} kept {} of {} samples", mode, samples.len(), total);

    let presence = MetricPresence::detect(&samples);
    report.presence = presence;
    let metrics = presence.metrics();

    for index in 0..samples.len() {
        for &metric in &metrics {
            if ensure_metric(&mut samples, index, metric) {
                report.fill_mut(metric).filled += 1;
            }
        }
    }

    // Commit only once every gap has been computed from original values.
    for sample in samples.iter_mut() {
        for &metric in &metrics {
            metric.unhide(sample);
        }
    }

    for &metric in &metrics {
        report.fill_mut(metric).missing = samples.iter().filter(|s| !metric.has(s)).count();
    }
    report.output = samples.len();

    Ok(Merged { samples, report })
}

/// Index range of the sorted `track` kept by `mode`.
pub fn select_range(track: &[Sample], mode: MergeMode) -> Result<Range<usize>, TcxError> {
    match mode {
        MergeMode::Union => Ok(0..track.len()),
        MergeMode::OnlyDuringGps => {
            let first = track
                .iter()
                .position(|s| Metric::Position.has(s))
                .ok_or(TcxError::UndefinedRangeBounds)?;
            let last = track
                .iter()
                .rposition(|s| Metric::Position.has(s))
                .ok_or(TcxError::UndefinedRangeBounds)?;
            Ok(first..last + 1)
        }
    }
}
