use serde::{Deserialize, Serialize};

use crate::sample::{Position, Sample};

/// The interpolatable per-sample metrics.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Distance,
    HeartRate,
    Position,
}

impl Metric {
    /// Processing order used by the merge pipeline.
    pub const ALL: [Metric; 3] = [Metric::Distance, Metric::HeartRate, Metric::Position];

    pub fn name(&self) -> &'static str {
        match self {
            Metric::Distance => "distance",
            Metric::HeartRate => "heart_rate",
            Metric::Position => "position",
        }
    }

    /// True when the sample's visible slot for this metric is populated.
    pub fn has(&self, sample: &Sample) -> bool {
        match self {
            Metric::Distance => sample.distance_meters.is_present(),
            Metric::HeartRate => sample.heart_rate_bpm.is_present(),
            Metric::Position => sample.position.is_present(),
        }
    }

    /// Stage the value at `track[index]` interpolated between the bounding
    /// samples `previous` and `next`, which must both carry the metric.
    pub fn save(&self, track: &mut [Sample], index: usize, previous: usize, next: usize) {
        let frac = time_fraction(&track[index], &track[previous], &track[next]);
        match self {
            Metric::Distance => {
                if let (Some(&a), Some(&b)) = (
                    track[previous].distance_meters.get(),
                    track[next].distance_meters.get(),
                ) {
                    track[index].distance_meters.stage(lerp(a, b, frac));
                }
            }
            Metric::HeartRate => {
                if let (Some(&a), Some(&b)) = (
                    track[previous].heart_rate_bpm.get(),
                    track[next].heart_rate_bpm.get(),
                ) {
                    let bpm = lerp(f64::from(a), f64::from(b), frac).floor();
                    track[index].heart_rate_bpm.stage(bpm as u16);
                }
            }
            Metric::Position => {
                if let (Some(&a), Some(&b)) =
                    (track[previous].position.get(), track[next].position.get())
                {
                    track[index].position.stage(Position::new(
                        lerp(a.latitude_degrees, b.latitude_degrees, frac),
                        lerp(a.longitude_degrees, b.longitude_degrees, frac),
                    ));
                }
            }
        }
    }

    /// Commit a staged value into the visible slot.
    pub fn unhide(&self, sample: &mut Sample) {
        match self {
            Metric::Distance => sample.distance_meters.commit(),
            Metric::HeartRate => sample.heart_rate_bpm.commit(),
            Metric::Position => sample.position.commit(),
        }
    }
}

// Position of `p` in time between `previous` and `next`, 0.0 when they coincide.
fn time_fraction(p: &Sample, previous: &Sample, next: &Sample) -> f64 {
    let span = (next.time() - previous.time()).num_milliseconds() as f64;
    if span.abs() < f64::EPSILON {
        return 0.0;
    }
    (p.time() - previous.time()).num_milliseconds() as f64 / span
}

fn lerp(a: f64, b: f64, frac: f64) -> f64 {
    a + frac * (b - a)
}
