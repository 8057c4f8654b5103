use crate::metrics::stats::{mean, sample_std_dev, std_dev};
use crate::signal::RRSeries;
use serde::{Deserialize, Serialize};
use std::f64::consts::SQRT_2;

/// Time-domain and Poincaré variability of an RR window (all values in ms).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HrvSummary {
    pub n: usize,
    pub mean_rr: f64,
    pub sdnn: f64,
    pub rmssd: f64,
    pub pnn50: f64,
    pub sd1: f64,
    pub sd2: f64,
}

impl HrvSummary {
    /// SD1/SD2, or `None` while SD2 is degenerate.
    pub fn sd_ratio(&self) -> Option<f64> {
        if self.sd2 > f64::EPSILON {
            Some(self.sd1 / self.sd2)
        } else {
            None
        }
    }
}

pub fn hrv_summary(rr: &RRSeries) -> HrvSummary {
    let data = &rr.rr_ms;
    let n = data.len();
    let (sd1, sd2) = poincare(data);
    HrvSummary {
        n,
        mean_rr: mean(data).unwrap_or(0.0),
        sdnn: sample_std_dev(data).unwrap_or(0.0),
        rmssd: rmssd(data),
        pnn50: pnn50(data),
        sd1,
        sd2,
    }
}

/// Root mean square of successive differences.
pub fn rmssd(rr_ms: &[f64]) -> f64 {
    if rr_ms.len() < 2 {
        return 0.0;
    }
    let sum_sq: f64 = rr_ms.windows(2).map(|w| (w[1] - w[0]).powi(2)).sum();
    (sum_sq / (rr_ms.len() as f64 - 1.0)).sqrt()
}

fn pnn50(rr_ms: &[f64]) -> f64 {
    if rr_ms.len() < 2 {
        return 0.0;
    }
    let count = rr_ms
        .windows(2)
        .filter(|w| (w[1] - w[0]).abs() > 50.0)
        .count();
    count as f64 / (rr_ms.len() as f64 - 1.0)
}

/// Poincaré SD1/SD2 from the rotated successive-pair axes.
pub fn poincare(rr_ms: &[f64]) -> (f64, f64) {
    if rr_ms.len() < 2 {
        return (0.0, 0.0);
    }
    let across: Vec<f64> = rr_ms.windows(2).map(|w| (w[1] - w[0]) / SQRT_2).collect();
    let along: Vec<f64> = rr_ms.windows(2).map(|w| (w[1] + w[0]) / SQRT_2).collect();
    (
        std_dev(&across).unwrap_or(0.0),
        std_dev(&along).unwrap_or(0.0),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: f64, expected: f64, tol: f64) {
        let diff = (actual - expected).abs();
        assert!(
            diff <= tol,
            "expected {expected}, got {actual} (diff {diff} > tol {tol})"
        );
    }

    #[test]
    fn constant_rhythm_has_no_variability() {
        let rr = RRSeries {
            rr_ms: vec![800.0; 8],
        };
        let hrv = hrv_summary(&rr);
        assert_eq!(hrv.n, 8);
        assert_close(hrv.mean_rr, 800.0, 1e-9);
        assert_close(hrv.sdnn, 0.0, 1e-9);
        assert_close(hrv.rmssd, 0.0, 1e-9);
        assert!(hrv.sd_ratio().is_none());
    }

    #[test]
    fn alternating_rhythm_metrics() {
        let rr = RRSeries {
            rr_ms: vec![700.0, 900.0, 700.0, 900.0, 700.0],
        };
        let hrv = hrv_summary(&rr);
        assert_close(hrv.rmssd, 200.0, 1e-9);
        assert_close(hrv.pnn50, 1.0, 1e-9);
        // Successive differences alternate ±200, sums are constant.
        assert_close(hrv.sd1, 200.0 / SQRT_2, 1e-9);
        assert_close(hrv.sd2, 0.0, 1e-9);
        assert_close(hrv.sdnn, 109.544_511_501_033_2, 1e-6);
    }

    #[test]
    fn single_interval_is_degenerate() {
        let hrv = hrv_summary(&RRSeries { rr_ms: vec![812.0] });
        assert_eq!(hrv.n, 1);
        assert_close(hrv.rmssd, 0.0, 1e-12);
        assert_close(hrv.sd1, 0.0, 1e-12);
    }
}
