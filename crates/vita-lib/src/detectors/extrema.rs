use crate::config::ExtremaConfig;
use crate::metrics::stats::{coefficient_of_variation, mean};
use serde::{Deserialize, Serialize};

/// Peaks and valleys of one window plus a [0, 100] quality score.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Extrema {
    pub peaks: Vec<usize>,
    pub valleys: Vec<usize>,
    pub quality: f64,
}

impl Extrema {
    pub fn empty() -> Self {
        Self::default()
    }

    /// `(valley, peak)` pairs: each peak with its nearest preceding valley,
    /// falling back to the nearest following one.
    pub fn pairs(&self) -> Vec<(usize, usize)> {
        self.peaks
            .iter()
            .filter_map(|&p| paired_valley(&self.valleys, p).map(|v| (v, p)))
            .collect()
    }
}

fn paired_valley(valleys: &[usize], peak: usize) -> Option<usize> {
    let after = valleys.partition_point(|&v| v < peak);
    if after > 0 {
        Some(valleys[after - 1])
    } else {
        valleys.get(after).copied()
    }
}

/// Find local peaks/valleys of `values` sampled every `sample_period_ms`.
///
/// Pure function of its inputs. Windows shorter than five samples, or
/// containing non-finite values, produce an empty result with quality 0.
pub fn detect_extrema(values: &[f64], sample_period_ms: f64, cfg: &ExtremaConfig) -> Extrema {
    let n = values.len();
    if n < 5 || !(sample_period_ms > 0.0) || values.iter().any(|v| !v.is_finite()) {
        return Extrema::empty();
    }

    let span = ((cfg.threshold_span_ms / sample_period_ms).round() as usize).max(2);
    let min_distance = ((cfg.min_distance_ms / sample_period_ms).ceil() as usize).max(1);
    let bands = LocalBands::new(values, span);

    let mut peaks: Vec<usize> = Vec::new();
    let mut valleys: Vec<usize> = Vec::new();
    for i in 2..n - 2 {
        let (local_mean, local_std) = bands.at(i);
        let x = values[i];
        let is_max = x > values[i - 1]
            && x >= values[i + 1]
            && x >= values[i - 2]
            && x >= values[i + 2];
        if is_max && x > local_mean + cfg.threshold_k * local_std {
            accept(&mut peaks, i, min_distance, |a, b| values[a] > values[b]);
        }
        let is_min = x < values[i - 1]
            && x <= values[i + 1]
            && x <= values[i - 2]
            && x <= values[i + 2];
        if is_min && x < local_mean - cfg.threshold_k * local_std {
            accept(&mut valleys, i, min_distance, |a, b| values[a] < values[b]);
        }
    }

    let peaks = reject_weak_peaks(values, peaks, &valleys, cfg.min_amplitude_ratio);
    let quality = quality_score(values, &peaks, &valleys, min_distance, cfg.max_interval_cv);
    Extrema {
        peaks,
        valleys,
        quality,
    }
}

/// Accept `idx` if it is far enough from the last accepted extremum;
/// otherwise it displaces that extremum only when it is more extreme.
fn accept(
    accepted: &mut Vec<usize>,
    idx: usize,
    min_distance: usize,
    stronger: impl Fn(usize, usize) -> bool,
) {
    match accepted.last_mut() {
        Some(last) if idx - *last < min_distance => {
            if stronger(idx, *last) {
                *last = idx;
            }
        }
        _ => accepted.push(idx),
    }
}

fn reject_weak_peaks(
    values: &[f64],
    peaks: Vec<usize>,
    valleys: &[usize],
    ratio: f64,
) -> Vec<usize> {
    let amplitudes: Vec<Option<f64>> = peaks
        .iter()
        .map(|&p| paired_valley(valleys, p).map(|v| values[p] - values[v]))
        .collect();
    let known: Vec<f64> = amplitudes.iter().flatten().copied().collect();
    let Some(mean_amp) = mean(&known) else {
        return peaks;
    };
    let floor = ratio * mean_amp;
    peaks
        .into_iter()
        .zip(amplitudes)
        .filter(|(_, amp)| amp.map_or(true, |a| a >= floor))
        .map(|(p, _)| p)
        .collect()
}

fn quality_score(
    values: &[f64],
    peaks: &[usize],
    valleys: &[usize],
    min_distance: usize,
    max_cv: f64,
) -> f64 {
    let amplitudes: Vec<f64> = peaks
        .iter()
        .filter_map(|&p| paired_valley(valleys, p).map(|v| values[p] - values[v]))
        .collect();
    if amplitudes.len() < 2 {
        return 0.0;
    }

    let intervals: Vec<f64> = peaks.windows(2).map(|w| (w[1] - w[0]) as f64).collect();
    let regularity = coefficient_of_variation(&intervals)
        .map(|cv| (1.0 - cv / max_cv).clamp(0.0, 1.0))
        .unwrap_or(0.0);

    let density = (peaks.len() as f64 * min_distance as f64 * 2.0 / values.len() as f64).min(1.0);

    let lo = values.iter().copied().fold(f64::INFINITY, f64::min);
    let hi = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let range = hi - lo;
    let amplitude = if range > f64::EPSILON {
        (mean(&amplitudes).unwrap_or(0.0) / range).clamp(0.0, 1.0)
    } else {
        0.0
    };

    (100.0 * (0.5 * regularity + 0.2 * density + 0.3 * amplitude)).clamp(0.0, 100.0)
}

/// Sliding mean/std over `[i - span, i + span]`, from prefix sums.
struct LocalBands {
    sum: Vec<f64>,
    sum_sq: Vec<f64>,
    span: usize,
    /// Subtracted before accumulating so a large DC level does not swamp the variance.
    offset: f64,
}

impl LocalBands {
    fn new(values: &[f64], span: usize) -> Self {
        let offset = values[0];
        let mut sum = Vec::with_capacity(values.len() + 1);
        let mut sum_sq = Vec::with_capacity(values.len() + 1);
        let (mut acc, mut acc_sq) = (0.0, 0.0);
        sum.push(acc);
        sum_sq.push(acc_sq);
        for &v in values {
            let d = v - offset;
            acc += d;
            acc_sq += d * d;
            sum.push(acc);
            sum_sq.push(acc_sq);
        }
        Self {
            sum,
            sum_sq,
            span,
            offset,
        }
    }

    fn at(&self, i: usize) -> (f64, f64) {
        let len = self.sum.len() - 1;
        let start = i.saturating_sub(self.span);
        let end = (i + self.span + 1).min(len);
        let count = (end - start) as f64;
        let m = (self.sum[end] - self.sum[start]) / count;
        let var = ((self.sum_sq[end] - self.sum_sq[start]) / count - m * m).max(0.0);
        (m + self.offset, var.sqrt())
    }
}
