use crate::config::{ConditionerConfig, SmoothingMode};
use crate::signal::RollingWindow;
use log::debug;

/// Per-sample smoother that sits in front of every estimator.
///
/// Non-finite or out-of-range input is replaced by the previous valid raw
/// sample (or 0 before the first one) so the filter state never sees it.
#[derive(Debug, Clone)]
pub struct SignalConditioner {
    config: ConditionerConfig,
    recent: RollingWindow<f64>,
    low_pass: Option<f64>,
    last_valid: Option<f64>,
    substituted: u64,
}

impl SignalConditioner {
    pub fn new(config: ConditionerConfig) -> Self {
        let window = config.window.max(1);
        Self {
            config,
            recent: RollingWindow::new(window),
            low_pass: None,
            last_valid: None,
            substituted: 0,
        }
    }

    pub fn condition(&mut self, raw: f64) -> f64 {
        let value = self.sanitize(raw);
        match self.config.mode {
            SmoothingMode::MovingAverage => {
                self.recent.push(value);
                self.recent.iter().sum::<f64>() / self.recent.len() as f64
            }
            SmoothingMode::LowPass => {
                let next = match self.low_pass {
                    Some(prev) => prev + self.config.alpha * (value - prev),
                    None => value,
                };
                self.low_pass = Some(next);
                next
            }
        }
    }

    /// Apply the invalid-sample policy without touching the smoothing state.
    pub fn sanitize(&mut self, raw: f64) -> f64 {
        if self.accepts(raw) {
            self.last_valid = Some(raw);
            return raw;
        }
        self.substituted += 1;
        let replacement = self.last_valid.unwrap_or(0.0);
        debug!("substituting invalid sample {raw} with {replacement}");
        replacement
    }

    fn accepts(&self, raw: f64) -> bool {
        if !raw.is_finite() {
            return false;
        }
        if self.config.min_value.is_some_and(|lo| raw < lo) {
            return false;
        }
        if self.config.max_value.is_some_and(|hi| raw > hi) {
            return false;
        }
        true
    }

    /// Number of samples replaced since the last reset.
    pub fn substituted(&self) -> u64 {
        self.substituted
    }

    pub fn reset(&mut self) {
        self.recent.clear();
        self.low_pass = None;
        self.last_valid = None;
        self.substituted = 0;
    }
}

/// Single-pole low-pass over a whole buffer, seeded with the first sample.
pub fn single_pole_lowpass(data: &[f64], fs: f64, cutoff: f64) -> Vec<f64> {
    if data.is_empty() {
        return Vec::new();
    }
    let dt = 1.0 / fs.max(f64::EPSILON);
    let rc = 1.0 / (2.0 * std::f64::consts::PI * cutoff.max(0.01));
    let alpha = dt / (rc + dt);
    let mut out = Vec::with_capacity(data.len());
    let mut prev = data[0];
    for &x in data {
        prev += alpha * (x - prev);
        out.push(prev);
    }
    out
}

/// Trailing moving average; the first `win - 1` outputs average what is available.
pub fn moving_average(data: &[f64], win: usize) -> Vec<f64> {
    if data.is_empty() {
        return Vec::new();
    }
    if win <= 1 {
        return data.to_vec();
    }
    let mut out = Vec::with_capacity(data.len());
    let mut acc = 0.0;
    for (i, &sample) in data.iter().enumerate() {
        acc += sample;
        if i >= win {
            acc -= data[i - win];
        }
        out.push(acc / (i + 1).min(win) as f64);
    }
    out
}

/// Centered sliding maximum with half-width `half`.
pub fn sliding_max(data: &[f64], half: usize) -> Vec<f64> {
    sliding_extreme(data, half, f64::max, f64::NEG_INFINITY)
}

/// Centered sliding minimum with half-width `half`.
pub fn sliding_min(data: &[f64], half: usize) -> Vec<f64> {
    sliding_extreme(data, half, f64::min, f64::INFINITY)
}

fn sliding_extreme(data: &[f64], half: usize, pick: fn(f64, f64) -> f64, init: f64) -> Vec<f64> {
    let n = data.len();
    (0..n)
        .map(|i| {
            let start = i.saturating_sub(half);
            let end = (i + half + 1).min(n);
            data[start..end].iter().copied().fold(init, pick)
        })
        .collect()
}

/// Least-squares line through `segment` sampled at unit spacing.
pub fn linear_fit(segment: &[f64]) -> (f64, f64) {
    let n = segment.len();
    if n < 2 {
        let mean = segment.first().copied().unwrap_or(0.0);
        return (0.0, mean);
    }
    let mut sum_x = 0.0;
    let mut sum_y = 0.0;
    let mut sum_xx = 0.0;
    let mut sum_xy = 0.0;
    for (i, &y) in segment.iter().enumerate() {
        let x = i as f64;
        sum_x += x;
        sum_y += y;
        sum_xx += x * x;
        sum_xy += x * y;
    }
    let n_f = n as f64;
    let denom = n_f * sum_xx - sum_x * sum_x;
    if denom.abs() < f64::EPSILON {
        return (0.0, sum_y / n_f);
    }
    let slope = (n_f * sum_xy - sum_x * sum_y) / denom;
    let intercept = (sum_y - slope * sum_x) / n_f;
    (slope, intercept)
}

/// Subtract the least-squares line.
pub fn detrend(data: &[f64]) -> Vec<f64> {
    let (slope, intercept) = linear_fit(data);
    data.iter()
        .enumerate()
        .map(|(i, &y)| y - (slope * i as f64 + intercept))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn moving_average_smooths_step() {
        let mut cond = SignalConditioner::new(ConditionerConfig::default());
        let out: Vec<f64> = [0.0, 0.0, 0.0, 0.0, 10.0]
            .iter()
            .map(|&v| cond.condition(v))
            .collect();
        assert!((out[4] - 2.0).abs() < 1e-9);
    }

    #[test]
    fn nan_is_replaced_by_previous_valid_sample() {
        let mut cond = SignalConditioner::new(ConditionerConfig {
            window: 1,
            ..ConditionerConfig::default()
        });
        assert_eq!(cond.condition(f64::NAN), 0.0);
        assert_eq!(cond.condition(4.0), 4.0);
        assert_eq!(cond.condition(f64::INFINITY), 4.0);
        assert_eq!(cond.condition(f64::NEG_INFINITY), 4.0);
        assert_eq!(cond.substituted(), 3);
    }

    #[test]
    fn out_of_range_sample_is_treated_as_invalid() {
        let mut cond = SignalConditioner::new(ConditionerConfig {
            window: 1,
            min_value: Some(0.0),
            max_value: Some(255.0),
            ..ConditionerConfig::default()
        });
        assert_eq!(cond.condition(120.0), 120.0);
        assert_eq!(cond.condition(900.0), 120.0);
        assert_eq!(cond.condition(-3.0), 120.0);
    }

    #[test]
    fn low_pass_mode_converges() {
        let mut cond = SignalConditioner::new(ConditionerConfig {
            mode: SmoothingMode::LowPass,
            ..ConditionerConfig::default()
        });
        cond.condition(0.0);
        let mut last = 0.0;
        for _ in 0..60 {
            last = cond.condition(1.0);
        }
        assert!((last - 1.0).abs() < 1e-6);
    }

    #[test]
    fn reset_forgets_history() {
        let mut cond = SignalConditioner::new(ConditionerConfig::default());
        for v in [5.0, 6.0, 7.0] {
            cond.condition(v);
        }
        cond.reset();
        assert_eq!(cond.condition(1.0), 1.0);
        assert_eq!(cond.substituted(), 0);
    }

    #[test]
    fn detrend_removes_ramp() {
        let data: Vec<f64> = (0..20).map(|i| 3.0 + 0.5 * i as f64).collect();
        assert!(detrend(&data).iter().all(|v| v.abs() < 1e-9));
    }

    #[test]
    fn sliding_extremes_cover_neighbourhood() {
        let data = [1.0, 5.0, 2.0, 0.0, 3.0];
        assert_eq!(sliding_max(&data, 1), vec![5.0, 5.0, 5.0, 3.0, 3.0]);
        assert_eq!(sliding_min(&data, 1), vec![1.0, 1.0, 0.0, 0.0, 0.0]);
    }
}
