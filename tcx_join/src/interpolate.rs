use crate::metric::Metric;
use crate::sample::Sample;

/// Fill `metric` for `track[index]` from its nearest bracketing samples.
///
/// Returns `true` when a value was staged. Samples that already carry the
/// metric, or that lack a bound on either side, are left alone; values are
/// never extrapolated.
pub fn ensure_metric(track: &mut [Sample], index: usize, metric: Metric) -> bool {
    if metric.has(&track[index]) {
        return false;
    }
    match bracket(track, index, metric) {
        Some((previous, next)) => {
            metric.save(track, index, previous, next);
            true
        }
        None => false,
    }
}

/// Nearest indices before and after `index` whose visible slot carries `metric`.
pub fn bracket(track: &[Sample], index: usize, metric: Metric) -> Option<(usize, usize)> {
    let previous = (0..index).rev().find(|&j| metric.has(&track[j]))?;
    let next = (index + 1..track.len()).find(|&k| metric.has(&track[k]))?;
    Some((previous, next))
}
