//! Oxygen saturation from the AC/DC structure of the pulse window.
//!
//! With a single intensity channel the ratio R is the perfusion index scaled
//! by a calibration factor. When red and infrared channels are available the
//! classic ratio of ratios `(AC_red/DC_red) / (AC_ir/DC_ir)` is used instead.
//! Both feed the same quadratic calibration curve.

use crate::config::Spo2Config;
use crate::metrics::stats::{interquartile_mean, median, percentile};
use crate::signal::RollingWindow;
use crate::vitals::estimate::VitalEstimate;
use log::{debug, info, warn};

/// Pulsatile and baseline level of one window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AcDc {
    pub ac: f64,
    pub dc: f64,
}

impl AcDc {
    pub fn perfusion_index(&self) -> f64 {
        if self.dc.abs() > f64::EPSILON {
            self.ac / self.dc
        } else {
            0.0
        }
    }
}

/// DC is the window median, AC the `low`..`high` percentile spread.
pub fn ac_dc(values: &[f64], low: f64, high: f64) -> Option<AcDc> {
    let dc = median(values)?;
    let ac = percentile(values, high)? - percentile(values, low)?;
    Some(AcDc { ac, dc })
}

#[derive(Debug, Clone)]
pub struct Spo2Estimator {
    config: Spo2Config,
    calibration_factor: f64,
    offset: f64,
    smoothing: RollingWindow<f64>,
    calibration: RollingWindow<f64>,
    last_raw: Option<f64>,
    /// Calibrated ratio behind the latest fresh reading.
    last_ratio: Option<f64>,
    last: Option<VitalEstimate<u32>>,
}

impl Spo2Estimator {
    pub fn new(config: Spo2Config) -> Self {
        Self {
            calibration_factor: config.calibration_factor,
            offset: 0.0,
            smoothing: RollingWindow::new(config.smoothing_len),
            calibration: RollingWindow::new(config.calibration_buffer),
            last_raw: None,
            last_ratio: None,
            last: None,
            config,
        }
    }

    /// Estimate from the pulse window, optionally with red/IR windows.
    ///
    /// Returns `None` while the window is too short or has never carried a
    /// usable pulse. A window whose perfusion index is too low yields the
    /// last reading with its confidence decayed.
    pub fn estimate(
        &mut self,
        values: &[f64],
        channels: Option<(&[f64], &[f64])>,
        timestamp_ms: i64,
    ) -> Option<VitalEstimate<u32>> {
        self.last_raw = None;
        let cfg = &self.config;
        if values.len() < cfg.min_samples || values.iter().any(|v| !v.is_finite()) {
            return None;
        }
        let Some(levels) = ac_dc(values, cfg.ac_low_percentile, cfg.ac_high_percentile) else {
            return None;
        };
        let perfusion = levels.perfusion_index();
        if !(levels.dc > f64::EPSILON) || perfusion < cfg.min_perfusion {
            debug!("spo2: perfusion {perfusion:.5} below threshold");
            return self.decayed();
        }

        let scale = cfg.calibration_factor / self.calibration_factor;
        let ratio = match channels.and_then(|(red, ir)| self.ratio_of_ratios(red, ir)) {
            Some(r) => r * scale,
            None => perfusion / self.calibration_factor,
        };
        let raw = self.curve(ratio);
        self.last_raw = Some(raw);
        self.last_ratio = Some(ratio);

        let calibrated = (raw + self.offset).clamp(cfg.lower_bound, cfg.upper_bound);
        self.smoothing.push(calibrated);
        let smoothed = median(&self.smoothing.to_vec()).unwrap_or(calibrated);
        let value = smoothed.round().clamp(cfg.lower_bound, cfg.upper_bound) as u32;

        let confidence = (perfusion / cfg.good_perfusion).min(1.0);
        let estimate = VitalEstimate::new(value, confidence, timestamp_ms);
        self.last = Some(estimate);
        Some(estimate)
    }

    fn ratio_of_ratios(&self, red: &[f64], ir: &[f64]) -> Option<f64> {
        let cfg = &self.config;
        if red.len() < cfg.min_samples || ir.len() < cfg.min_samples {
            return None;
        }
        let red = ac_dc(red, cfg.ac_low_percentile, cfg.ac_high_percentile)?;
        let ir = ac_dc(ir, cfg.ac_low_percentile, cfg.ac_high_percentile)?;
        let ir_pi = ir.perfusion_index();
        if red.dc <= f64::EPSILON || ir_pi <= f64::EPSILON {
            return None;
        }
        let r = red.perfusion_index() / ir_pi;
        r.is_finite().then_some(r)
    }

    /// Calibration curve clamped to the configured physiological bounds.
    fn curve(&self, r: f64) -> f64 {
        let [c0, c1, c2] = self.config.curve;
        let spo2 = c0 + c1 * r + c2 * r * r;
        if spo2.is_finite() {
            spo2.clamp(self.config.lower_bound, self.config.upper_bound)
        } else {
            self.config.lower_bound
        }
    }

    fn decayed(&mut self) -> Option<VitalEstimate<u32>> {
        let last = self.last.as_mut()?;
        last.confidence *= self.config.confidence_decay;
        Some(*last)
    }

    /// Uncalibrated curve output of the latest call, if it produced a fresh reading.
    pub fn last_raw(&self) -> Option<f64> {
        self.last_raw
    }

    pub fn add_calibration_sample(&mut self, value: f64) {
        if value.is_finite() {
            self.calibration.push(value);
        }
    }

    /// Commit an offset recentering the collected raw readings on the target.
    ///
    /// Returns the new offset, or `None` when too few samples were collected
    /// (the previous offset is then kept).
    pub fn calibrate(&mut self) -> Option<f64> {
        let samples = self.calibration.to_vec();
        if samples.len() < self.config.min_calibration_samples {
            warn!(
                "spo2 calibration skipped: {} of {} samples",
                samples.len(),
                self.config.min_calibration_samples
            );
            return None;
        }
        let center = interquartile_mean(&samples)?;
        let limit = self.config.max_calibration_offset;
        self.offset = (self.config.calibration_target - center).clamp(-limit, limit);
        self.calibration.clear();
        self.smoothing.clear();
        info!("spo2 calibrated: center {center:.1}, offset {:+.1}", self.offset);
        Some(self.offset)
    }

    /// Nudge the calibration factor toward an externally measured saturation.
    ///
    /// Takes a damped Newton step along the calibration curve at the last
    /// ratio, so the correction follows the curve's local slope. The ratio
    /// scales with `1 / calibration_factor`, which turns the step into a
    /// factor update.
    pub fn set_reference_value(&mut self, measured: f64) {
        let (Some(last), Some(ratio)) = (self.last, self.last_ratio) else {
            return;
        };
        if !measured.is_finite() || !(ratio > f64::EPSILON) {
            return;
        }
        let [_, c1, c2] = self.config.curve;
        let slope = c1 + 2.0 * c2 * ratio;
        if slope.abs() < 1e-6 {
            debug!("spo2 reference ignored: curve is flat at R {ratio:.3}");
            return;
        }
        let current = self.curve(ratio) + self.offset;
        let step = self.config.reference_gain * (measured - current) / slope;
        let target = (ratio + step).max(ratio * 0.25);
        let base = self.config.calibration_factor;
        self.calibration_factor =
            (self.calibration_factor * ratio / target).clamp(base * 0.25, base * 4.0);
        self.smoothing.clear();
        debug!(
            "spo2 reference {measured:.1} vs {}: R {ratio:.3} -> {target:.3}, factor {:.5}",
            last.value, self.calibration_factor
        );
    }

    pub fn offset(&self) -> f64 {
        self.offset
    }

    pub fn calibration_factor(&self) -> f64 {
        self.calibration_factor
    }

    pub fn calibration_samples(&self) -> usize {
        self.calibration.len()
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.config.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::f64::consts::PI;

    fn pulse(dc: f64, amplitude: f64, n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| dc + amplitude * (2.0 * PI * 1.2 * i as f64 / 30.0).sin())
            .collect()
    }

    #[test]
    fn short_window_is_insufficient() {
        let mut est = Spo2Estimator::new(Spo2Config::default());
        assert!(est.estimate(&pulse(100.0, 1.0, 10), None, 0).is_none());
    }

    #[test]
    fn flat_window_without_history_has_no_reading() {
        let mut est = Spo2Estimator::new(Spo2Config::default());
        assert!(est.estimate(&vec![100.0; 90], None, 0).is_none());
    }

    #[test]
    fn output_is_clamped_for_any_finite_window() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut est = Spo2Estimator::new(Spo2Config::default());
        for round in 0..200 {
            let n = rng.gen_range(30..300);
            let scale = 10f64.powi(rng.gen_range(-3..4));
            let window: Vec<f64> = (0..n).map(|_| rng.gen_range(-1.0..1.0) * scale).collect();
            let channels: (Vec<f64>, Vec<f64>) = (
                (0..n).map(|_| rng.gen_range(0.0..255.0)).collect(),
                (0..n).map(|_| rng.gen_range(0.0..255.0)).collect(),
            );
            let with_channels = round % 2 == 0;
            let reading = est.estimate(
                &window,
                with_channels.then_some((&channels.0[..], &channels.1[..])),
                round,
            );
            if let Some(r) = reading {
                assert!((70..=100).contains(&r.value), "{}", r.value);
                assert!((0.0..=1.0).contains(&r.confidence));
            }
        }
    }

    #[test]
    fn identical_windows_converge() {
        let mut est = Spo2Estimator::new(Spo2Config::default());
        let window = pulse(120.0, 1.0, 150);
        let readings: Vec<u32> = (0..10)
            .filter_map(|t| est.estimate(&window, None, t))
            .map(|r| r.value)
            .collect();
        assert_eq!(readings.len(), 10);
        assert!(readings.windows(2).all(|w| w[0] == w[1]), "{readings:?}");
    }

    #[test]
    fn low_perfusion_returns_decayed_last_value() {
        let mut est = Spo2Estimator::new(Spo2Config::default());
        let good = est.estimate(&pulse(100.0, 0.8, 150), None, 0).unwrap();
        let weak = est.estimate(&vec![100.0; 150], None, 33).unwrap();
        assert_eq!(weak.value, good.value);
        assert!((weak.confidence - good.confidence * 0.9).abs() < 1e-12);
    }

    #[test]
    fn red_ir_ratio_of_ratios_drives_curve() {
        let mut est = Spo2Estimator::new(Spo2Config::default());
        let value = pulse(100.0, 0.8, 150);
        // Red perfusion twice the IR perfusion: R ≈ 2 gives a low saturation.
        let red = pulse(80.0, 1.6, 150);
        let ir = pulse(160.0, 1.6, 150);
        let low = est.estimate(&value, Some((&red, &ir)), 0).unwrap();
        assert_eq!(low.value, 70);

        let mut est = Spo2Estimator::new(Spo2Config::default());
        let red = pulse(100.0, 0.25, 150);
        let ir = pulse(100.0, 0.5, 150);
        let high = est.estimate(&value, Some((&red, &ir)), 0).unwrap();
        assert_eq!(high.value, 98);
    }

    #[test]
    fn calibration_recenters_on_target() {
        let mut est = Spo2Estimator::new(Spo2Config::default());
        assert!(est.calibrate().is_none());
        for _ in 0..20 {
            est.add_calibration_sample(90.0);
        }
        est.add_calibration_sample(f64::NAN);
        assert_eq!(est.calibration_samples(), 20);
        assert_eq!(est.calibrate(), Some(6.5));
        assert_eq!(est.calibration_samples(), 0);

        let mut far = Spo2Estimator::new(Spo2Config::default());
        for _ in 0..20 {
            far.add_calibration_sample(75.0);
        }
        assert_eq!(far.calibrate(), Some(8.0));
    }

    #[test]
    fn offset_shifts_output() {
        let window = pulse(100.0, 0.8, 150);
        let mut plain = Spo2Estimator::new(Spo2Config::default());
        let base = plain.estimate(&window, None, 0).unwrap().value;

        let mut shifted = Spo2Estimator::new(Spo2Config::default());
        for _ in 0..10 {
            shifted.add_calibration_sample(93.5);
        }
        shifted.calibrate();
        let value = shifted.estimate(&window, None, 0).unwrap().value;
        assert_eq!(value, (base + 3).min(98));
    }

    #[test]
    fn reference_value_moves_estimate_toward_it() {
        let mut est = Spo2Estimator::new(Spo2Config {
            reference_gain: 1.0,
            ..Spo2Config::default()
        });
        let window = pulse(100.0, 0.8, 150);
        let before = est.estimate(&window, None, 0).unwrap().value;
        assert!(before < 95, "{before}");
        est.set_reference_value(99.0);
        assert!(est.calibration_factor() > Spo2Config::default().calibration_factor);
        let after = est.estimate(&window, None, 33).unwrap().value;
        assert!(after > before, "{before} -> {after}");
    }

    #[test]
    fn reference_value_follows_rising_curve_at_low_perfusion() {
        // PI ~ 0.002 puts R below the curve's vertex, where the curve rises
        // with R: a lower reference must shrink R, not grow it.
        let mut est = Spo2Estimator::new(Spo2Config::default());
        let window = pulse(100.0, 0.1, 150);
        let before = est.estimate(&window, None, 0).unwrap().value;
        let mut after = before;
        for t in 1..=5 {
            est.set_reference_value(90.0);
            after = est.estimate(&window, None, t * 33).unwrap().value;
        }
        assert!(after < before, "{before} -> {after}");
        assert!(est.calibration_factor() > Spo2Config::default().calibration_factor);
    }

    #[test]
    fn reference_value_without_reading_is_ignored() {
        let mut est = Spo2Estimator::new(Spo2Config::default());
        est.set_reference_value(90.0);
        assert_eq!(est.calibration_factor(), Spo2Config::default().calibration_factor);
    }

    #[test]
    fn reset_forgets_calibration() {
        let mut est = Spo2Estimator::new(Spo2Config::default());
        for _ in 0..10 {
            est.add_calibration_sample(92.0);
        }
        est.calibrate();
        est.estimate(&pulse(100.0, 0.8, 150), None, 0);
        est.reset();
        assert_eq!(est.offset(), 0.0);
        assert!(est.last_raw().is_none());
        assert!(est.estimate(&vec![100.0; 150], None, 0).is_none());
    }
}
