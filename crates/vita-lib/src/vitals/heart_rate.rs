use crate::config::HeartRateConfig;
use crate::metrics::stats::{mean, median};
use crate::signal::RollingWindow;
use serde::{Deserialize, Serialize};

/// Smoothed heart rate. `bpm == 0` means not enough clean intervals yet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HeartRate {
    pub bpm: u32,
    pub confidence: f64,
    /// Intervals (ms) that survived range and outlier rejection.
    pub intervals: Vec<i64>,
}

impl HeartRate {
    pub fn is_valid(&self) -> bool {
        self.bpm > 0
    }
}

/// Outcome of one tracker update.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HeartRateUpdate {
    pub reading: HeartRate,
    /// RR intervals created by peaks first seen in this update, in order.
    pub new_intervals: Vec<i64>,
}

/// Turns detector peaks into RR intervals and a median-anchored BPM.
///
/// Peaks are fed as absolute timestamps and may be repeated across updates
/// (the detector re-scans an overlapping window every frame); anything not
/// newer than the last accepted peak by at least one minimum interval is
/// ignored.
#[derive(Debug, Clone)]
pub struct HeartRateTracker {
    config: HeartRateConfig,
    peaks: RollingWindow<i64>,
    last_peak_ms: Option<i64>,
}

impl HeartRateTracker {
    pub fn new(config: HeartRateConfig) -> Self {
        let peaks = RollingWindow::new(config.peak_history);
        Self {
            config,
            peaks,
            last_peak_ms: None,
        }
    }

    pub fn update(&mut self, peak_times_ms: &[i64]) -> HeartRateUpdate {
        let min_gap = self.min_interval_ms();
        let mut new_intervals = Vec::new();
        for &t in peak_times_ms {
            if let Some(last) = self.last_peak_ms {
                if t - last < min_gap {
                    continue;
                }
                let rr = t - last;
                if (self.config.min_rr_ms..=self.config.max_rr_ms).contains(&rr) {
                    new_intervals.push(rr);
                }
            }
            self.peaks.push(t);
            self.last_peak_ms = Some(t);
        }
        HeartRateUpdate {
            reading: self.current(),
            new_intervals,
        }
    }

    /// Rate over the retained peak history.
    pub fn current(&self) -> HeartRate {
        let times = self.peaks.to_vec();
        let raw: Vec<f64> = times.windows(2).map(|w| (w[1] - w[0]) as f64).collect();
        if raw.is_empty() {
            return HeartRate::default();
        }
        let lo = 60_000.0 / self.config.max_bpm;
        let hi = 60_000.0 / self.config.min_bpm;
        let in_range: Vec<f64> = raw.iter().copied().filter(|rr| (lo..=hi).contains(rr)).collect();
        let Some(anchor) = median(&in_range) else {
            return HeartRate::default();
        };
        let tol = self.config.outlier_tolerance * anchor;
        let valid: Vec<f64> = in_range
            .into_iter()
            .filter(|rr| (rr - anchor).abs() <= tol)
            .collect();
        if valid.len() < self.config.min_valid_intervals {
            return HeartRate::default();
        }
        let Some(avg) = mean(&valid).filter(|m| *m > 0.0) else {
            return HeartRate::default();
        };
        HeartRate {
            bpm: (60_000.0 / avg).round() as u32,
            confidence: valid.len() as f64 / raw.len() as f64,
            intervals: valid.iter().map(|rr| rr.round() as i64).collect(),
        }
    }

    pub fn last_peak_ms(&self) -> Option<i64> {
        self.last_peak_ms
    }

    fn min_interval_ms(&self) -> i64 {
        (60_000.0 / self.config.max_bpm).round() as i64
    }

    pub fn reset(&mut self) {
        self.peaks.clear();
        self.last_peak_ms = None;
    }
}
