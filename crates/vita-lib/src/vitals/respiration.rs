//! Breathing rate from the amplitude modulation of the pulse waveform.

use crate::conditioning::{detrend, moving_average, single_pole_lowpass, sliding_max, sliding_min};
use crate::config::RespirationConfig;
use crate::detectors::extrema::detect_extrema;
use crate::metrics::stats::{coefficient_of_variation, mean, median};
use crate::signal::RollingWindow;
use crate::vitals::estimate::VitalEstimate;
use log::debug;
use realfft::RealFftPlanner;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BreathingPattern {
    Shallow,
    Normal,
    Deep,
    Irregular,
}

impl fmt::Display for BreathingPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BreathingPattern::Shallow => "shallow",
            BreathingPattern::Normal => "normal",
            BreathingPattern::Deep => "deep",
            BreathingPattern::Irregular => "irregular",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Respiration {
    /// Breaths per minute, one decimal.
    pub rate: f64,
    /// Breathing modulation depth relative to the pulse envelope.
    pub amplitude: f64,
    pub pattern: BreathingPattern,
}

pub fn classify_pattern(
    interval_cv: f64,
    depth: f64,
    cfg: &RespirationConfig,
) -> BreathingPattern {
    if interval_cv > cfg.irregular_cv {
        BreathingPattern::Irregular
    } else if depth < cfg.shallow_depth {
        BreathingPattern::Shallow
    } else if depth > cfg.deep_depth {
        BreathingPattern::Deep
    } else {
        BreathingPattern::Normal
    }
}

/// Estimate breathing over a whole PPG window sampled every `sample_period_ms`.
///
/// Returns `None` until the window spans enough consistent breaths inside
/// the accepted rate range.
pub fn estimate_respiration(
    values: &[f64],
    sample_period_ms: f64,
    cfg: &RespirationConfig,
    timestamp_ms: i64,
) -> Option<VitalEstimate<Respiration>> {
    if !(sample_period_ms > 0.0) || values.iter().any(|v| !v.is_finite()) {
        return None;
    }
    let min_span_ms = (cfg.min_cycles as f64 + 1.0) * 60_000.0 / cfg.max_rate;
    if (values.len() as f64) * sample_period_ms < min_span_ms {
        return None;
    }
    let fs = 1000.0 / sample_period_ms;

    let half = ((cfg.envelope_ms / sample_period_ms / 2.0).round() as usize).max(1);
    let upper = moving_average(&sliding_max(values, half), 2 * half + 1);
    let lower = moving_average(&sliding_min(values, half), 2 * half + 1);
    let modulation: Vec<f64> = upper.iter().zip(&lower).map(|(u, l)| u - l).collect();
    let envelope = mean(&modulation)?;
    if envelope <= f64::EPSILON {
        return None;
    }

    let smoothed = single_pole_lowpass(&modulation, fs, cfg.lowpass_hz);
    let smoothed = single_pole_lowpass(&smoothed, fs, cfg.lowpass_hz);
    let breathing = detrend(&smoothed);
    let lo = breathing.iter().copied().fold(f64::INFINITY, f64::min);
    let hi = breathing.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if hi - lo <= envelope * 1e-6 {
        return None;
    }

    let extrema = detect_extrema(&breathing, sample_period_ms, &cfg.extrema);
    let intervals: Vec<f64> = extrema
        .peaks
        .windows(2)
        .map(|w| (w[1] - w[0]) as f64 * sample_period_ms)
        .collect();
    if intervals.len() < cfg.min_cycles {
        return None;
    }
    let rate = 60_000.0 / mean(&intervals)?;
    if !(cfg.min_rate..=cfg.max_rate).contains(&rate) {
        debug!("respiration: rate {rate:.1} outside accepted range");
        return None;
    }
    let anchor = median(&intervals)?;
    let consistent = intervals
        .iter()
        .filter(|rr| (*rr - anchor).abs() <= 0.25 * anchor)
        .count();
    if consistent < cfg.min_cycles {
        return None;
    }

    let swings: Vec<f64> = extrema
        .pairs()
        .iter()
        .map(|&(v, p)| breathing[p] - breathing[v])
        .filter(|a| *a > 0.0)
        .collect();
    let depth = mean(&swings).unwrap_or(0.0) / envelope;
    let cv = coefficient_of_variation(&intervals).unwrap_or(0.0);
    let pattern = classify_pattern(cv, depth, cfg);

    let agreement = match spectral_rate(&breathing, fs, cfg.min_rate, cfg.max_rate) {
        Some(spectral) if (spectral - rate).abs() <= cfg.spectral_tolerance => 1.0,
        Some(_) => 0.5,
        None => 0.75,
    };
    let confidence = (extrema.quality / 100.0)
        * (consistent as f64 / intervals.len() as f64)
        * agreement;

    Some(VitalEstimate::new(
        Respiration {
            rate: (rate * 10.0).round() / 10.0,
            amplitude: depth,
            pattern,
        },
        confidence,
        timestamp_ms,
    ))
}

/// Dominant frequency inside `[min_rate, max_rate]` breaths/min, in breaths/min.
pub fn spectral_rate(values: &[f64], fs: f64, min_rate: f64, max_rate: f64) -> Option<f64> {
    let n = values.len();
    if n < 4 || !(fs > 0.0) {
        return None;
    }
    let mut planner = RealFftPlanner::<f64>::new();
    let fft = planner.plan_fft_forward(n);
    let mut buffer = values.to_vec();
    let mut spectrum = fft.make_output_vec();
    fft.process(&mut buffer, &mut spectrum).ok()?;

    let resolution = fs / n as f64;
    spectrum
        .iter()
        .enumerate()
        .skip(1)
        .map(|(k, c)| (k as f64 * resolution * 60.0, c.norm_sqr()))
        .filter(|(rate, _)| (min_rate..=max_rate).contains(rate))
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .filter(|(_, power)| *power > 0.0)
        .map(|(rate, _)| rate)
}

/// Windowed respiration tracker recomputing every few frames.
#[derive(Debug, Clone)]
pub struct RespirationEstimator {
    config: RespirationConfig,
    window: RollingWindow<f64>,
    frames_since_update: usize,
    last: Option<VitalEstimate<Respiration>>,
}

impl RespirationEstimator {
    pub fn new(config: RespirationConfig) -> Self {
        let window = RollingWindow::new(config.window);
        Self {
            config,
            window,
            frames_since_update: 0,
            last: None,
        }
    }

    /// Push one conditioned sample; between recomputations the previous
    /// estimate is returned unchanged.
    pub fn update(
        &mut self,
        value: f64,
        sample_period_ms: f64,
        timestamp_ms: i64,
    ) -> Option<VitalEstimate<Respiration>> {
        self.window.push(value);
        self.frames_since_update += 1;
        if self.frames_since_update >= self.config.update_every {
            self.frames_since_update = 0;
            self.last = estimate_respiration(
                &self.window.to_vec(),
                sample_period_ms,
                &self.config,
                timestamp_ms,
            );
        }
        self.last
    }

    pub fn last(&self) -> Option<&VitalEstimate<Respiration>> {
        self.last.as_ref()
    }

    pub fn reset(&mut self) {
        self.window.clear();
        self.frames_since_update = 0;
        self.last = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    const PERIOD_MS: f64 = 1000.0 / 30.0;

    /// 72 bpm pulse whose amplitude breathes at `breaths_per_min`.
    fn breathing_ppg(breaths_per_min: f64, depth: f64, seconds: f64) -> Vec<f64> {
        let n = (seconds * 30.0) as usize;
        (0..n)
            .map(|i| {
                let t = i as f64 / 30.0;
                let envelope = 1.0 + depth * (2.0 * PI * breaths_per_min / 60.0 * t).sin();
                100.0 + envelope * (2.0 * PI * 1.2 * t).sin()
            })
            .collect()
    }

    #[test]
    fn recovers_breathing_rate() {
        let cfg = RespirationConfig::default();
        for bpm in [12.0, 15.0, 20.0] {
            let values = breathing_ppg(bpm, 0.1, 32.0);
            let est = estimate_respiration(&values, PERIOD_MS, &cfg, 0).unwrap();
            assert!((est.value.rate - bpm).abs() <= 1.5, "{bpm}: {:?}", est.value);
            assert!(est.confidence > 0.0);
        }
    }

    #[test]
    fn moderate_modulation_is_normal_pattern() {
        let values = breathing_ppg(15.0, 0.1, 32.0);
        let est = estimate_respiration(&values, PERIOD_MS, &RespirationConfig::default(), 5)
            .unwrap();
        assert_eq!(est.value.pattern, BreathingPattern::Normal);
        assert_eq!(est.timestamp_ms, 5);
    }

    #[test]
    fn short_or_flat_window_is_insufficient() {
        let cfg = RespirationConfig::default();
        let short = breathing_ppg(15.0, 0.1, 5.0);
        assert!(estimate_respiration(&short, PERIOD_MS, &cfg, 0).is_none());
        assert!(estimate_respiration(&vec![100.0; 960], PERIOD_MS, &cfg, 0).is_none());
    }

    #[test]
    fn unmodulated_pulse_has_no_breathing() {
        let values = breathing_ppg(15.0, 0.0, 32.0);
        let cfg = RespirationConfig::default();
        assert!(estimate_respiration(&values, PERIOD_MS, &cfg, 0).is_none());
    }

    #[test]
    fn pattern_thresholds() {
        let cfg = RespirationConfig::default();
        assert_eq!(classify_pattern(0.4, 0.2, &cfg), BreathingPattern::Irregular);
        assert_eq!(classify_pattern(0.1, 0.02, &cfg), BreathingPattern::Shallow);
        assert_eq!(classify_pattern(0.1, 0.5, &cfg), BreathingPattern::Deep);
        assert_eq!(classify_pattern(0.1, 0.2, &cfg), BreathingPattern::Normal);
        assert_eq!(BreathingPattern::Irregular.to_string(), "irregular");
    }

    #[test]
    fn spectral_peak_matches_sine() {
        let values: Vec<f64> = (0..960)
            .map(|i| (2.0 * PI * 0.25 * i as f64 / 30.0).sin())
            .collect();
        let rate = spectral_rate(&values, 30.0, 8.0, 25.0).unwrap();
        assert!((rate - 15.0).abs() < 1e-9, "{rate}");
        assert!(spectral_rate(&[0.0; 64], 30.0, 8.0, 25.0).is_none());
    }

    #[test]
    fn tracker_recomputes_on_cadence_and_resets() {
        let cfg = RespirationConfig::default();
        let every = cfg.update_every;
        let mut tracker = RespirationEstimator::new(cfg);
        let values = breathing_ppg(15.0, 0.1, 32.0);
        let mut last = None;
        for (i, v) in values.iter().enumerate() {
            last = tracker.update(*v, PERIOD_MS, i as i64 * 33);
        }
        let est = last.unwrap();
        assert_eq!(est.timestamp_ms, ((values.len() / every) * every - 1) as i64 * 33);
        tracker.reset();
        assert!(tracker.last().is_none());
        assert!(tracker.update(100.0, PERIOD_MS, 0).is_none());
    }
}
