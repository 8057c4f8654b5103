//! Cuffless blood-pressure trend from single-site pulse morphology.
//!
//! Without a second sensing site the peak-to-peak interval stands in for
//! pulse transit time. Pressure is a linear model over three deviations
//! from a reference state: transit time, pulse perfusion and an arterial
//! stiffness score taken from the averaged pulse shape.

use crate::config::BloodPressureConfig;
use crate::detectors::extrema::Extrema;
use crate::metrics::stats::{mean, median, std_dev};
use crate::signal::RollingWindow;
use crate::vitals::estimate::VitalEstimate;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BloodPressure {
    pub systolic: u32,
    pub diastolic: u32,
}

impl BloodPressure {
    pub fn pulse_pressure(&self) -> u32 {
        self.systolic.saturating_sub(self.diastolic)
    }
}

impl fmt::Display for BloodPressure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.systolic, self.diastolic)
    }
}

/// Per-window pulse features feeding the regression.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PulseFeatures {
    /// Mean peak-to-valley amplitude over the window median.
    pub perfusion: f64,
    /// Mean peak-to-peak interval (ms), the transit-time proxy.
    pub ptt_ms: f64,
    /// Mean width at half amplitude (ms).
    pub width_ms: f64,
    /// Largest rebound on the falling limb of the normalized template.
    pub notch_depth: f64,
    /// Normalized fall from peak to foot per cycle.
    pub decay_slope: f64,
    /// Height of the reflected wave relative to the systolic peak.
    pub augmentation_index: f64,
    /// 0 (compliant) to 1 (stiff).
    pub stiffness: f64,
}

/// Extract features from a window and its extrema, given at least two pairs.
pub fn pulse_features(
    values: &[f64],
    extrema: &Extrema,
    sample_period_ms: f64,
    cfg: &BloodPressureConfig,
) -> Option<PulseFeatures> {
    let pairs = extrema.pairs();
    if pairs.len() < cfg.min_pairs || extrema.peaks.len() < 2 {
        return None;
    }
    let dc = median(values)?;
    if dc.abs() <= f64::EPSILON {
        return None;
    }
    let amplitudes: Vec<f64> = pairs
        .iter()
        .map(|&(v, p)| values[p] - values[v])
        .filter(|a| *a > 0.0)
        .collect();
    let perfusion = mean(&amplitudes)? / dc.abs();

    let intervals: Vec<f64> = extrema
        .peaks
        .windows(2)
        .map(|w| (w[1] - w[0]) as f64 * sample_period_ms)
        .collect();
    let ptt_ms = mean(&intervals)?;

    let widths: Vec<f64> = pairs
        .iter()
        .map(|&(v, p)| half_width(values, v, p) as f64 * sample_period_ms)
        .collect();
    let width_ms = mean(&widths).unwrap_or(0.0);

    let template = pulse_template(values, &extrema.peaks, cfg.template_points)?;
    let shape = template_shape(&template);
    let notch_score = 1.0 - (shape.notch_depth / cfg.notch_reference).min(1.0);
    let slope_score = ((shape.decay_slope - 1.0) / (cfg.slope_reference - 1.0)).clamp(0.0, 1.0);

    Some(PulseFeatures {
        perfusion,
        ptt_ms,
        width_ms,
        notch_depth: shape.notch_depth,
        decay_slope: shape.decay_slope,
        augmentation_index: shape.augmentation_index,
        stiffness: 0.5 * (notch_score + slope_score),
    })
}

/// Samples around `peak` staying above half the pulse amplitude.
fn half_width(values: &[f64], valley: usize, peak: usize) -> usize {
    let level = values[valley] + 0.5 * (values[peak] - values[valley]);
    let left = values[..peak].iter().rev().take_while(|v| **v >= level).count();
    let right = values[peak + 1..].iter().take_while(|v| **v >= level).count();
    left + right + 1
}

/// Peak-to-peak cycles resampled to `points`, scaled to [0, 1] and averaged.
fn pulse_template(values: &[f64], peaks: &[usize], points: usize) -> Option<Vec<f64>> {
    let mut sum = vec![0.0; points];
    let mut cycles = 0usize;
    for w in peaks.windows(2) {
        let cycle = &values[w[0]..=w[1]];
        if cycle.len() < 4 {
            continue;
        }
        let lo = cycle.iter().copied().fold(f64::INFINITY, f64::min);
        let hi = cycle.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if hi - lo <= f64::EPSILON {
            continue;
        }
        for (k, slot) in sum.iter_mut().enumerate() {
            let pos = k as f64 * (cycle.len() - 1) as f64 / (points - 1) as f64;
            let i = pos.floor() as usize;
            let j = (i + 1).min(cycle.len() - 1);
            let y = cycle[i] + (cycle[j] - cycle[i]) * (pos - i as f64);
            *slot += (y - lo) / (hi - lo);
        }
        cycles += 1;
    }
    if cycles == 0 {
        return None;
    }
    Some(sum.into_iter().map(|s| s / cycles as f64).collect())
}

struct TemplateShape {
    notch_depth: f64,
    decay_slope: f64,
    augmentation_index: f64,
}

fn template_shape(template: &[f64]) -> TemplateShape {
    let foot = template
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.total_cmp(b.1))
        .map(|(i, _)| i)
        .unwrap_or(0)
        .max(1);
    let start = template[0];
    let fall = (start - template[foot]).max(0.0);
    let decay_slope = fall * (template.len() - 1) as f64 / foot as f64;

    // Dicrotic rebound: deepest dip followed by a rise while still falling overall.
    let mut running_min = start;
    let mut notch_depth = 0.0f64;
    let mut rebound_peak = 0.0f64;
    for &y in &template[1..foot] {
        running_min = running_min.min(y);
        let rise = y - running_min;
        if rise > notch_depth {
            notch_depth = rise;
            rebound_peak = y;
        }
    }
    let augmentation_index = if start > f64::EPSILON && notch_depth > 0.0 {
        rebound_peak / start
    } else {
        0.0
    };
    TemplateShape {
        notch_depth,
        decay_slope,
        augmentation_index,
    }
}

#[derive(Debug, Clone)]
pub struct BloodPressureEstimator {
    config: BloodPressureConfig,
    previous: Option<(f64, f64)>,
    recent_systolic: RollingWindow<f64>,
    last_features: Option<PulseFeatures>,
    baseline_ptt_ms: Option<f64>,
}

impl BloodPressureEstimator {
    pub fn new(config: BloodPressureConfig) -> Self {
        let recent_systolic = RollingWindow::new(config.stability_len);
        Self {
            config,
            previous: None,
            recent_systolic,
            last_features: None,
            baseline_ptt_ms: None,
        }
    }

    /// Anchor the transit-time deviation to the session's learned beat
    /// interval. `None` (or a non-positive value) falls back to
    /// `reference_ptt_ms`.
    pub fn set_baseline_ptt(&mut self, baseline_ms: Option<f64>) {
        self.baseline_ptt_ms = baseline_ms.filter(|b| b.is_finite() && *b > 0.0);
    }

    pub fn reference_ptt_ms(&self) -> f64 {
        self.baseline_ptt_ms.unwrap_or(self.config.reference_ptt_ms)
    }

    /// `None` until the window holds enough clean pulses.
    pub fn estimate(
        &mut self,
        values: &[f64],
        extrema: &Extrema,
        sample_period_ms: f64,
        timestamp_ms: i64,
    ) -> Option<VitalEstimate<BloodPressure>> {
        if values.iter().any(|v| !v.is_finite()) || !(sample_period_ms > 0.0) {
            return None;
        }
        let features = pulse_features(values, extrema, sample_period_ms, &self.config)?;
        let (raw_sys, raw_dia) = self.regress(&features);
        let (sys, dia) = match self.previous {
            Some((prev_sys, prev_dia)) => {
                let w = self.config.history_weight;
                (
                    w * prev_sys + (1.0 - w) * raw_sys,
                    w * prev_dia + (1.0 - w) * raw_dia,
                )
            }
            None => (raw_sys, raw_dia),
        };
        let pressure = self.constrain(sys, dia);
        self.previous = Some((pressure.systolic as f64, pressure.diastolic as f64));
        self.recent_systolic.push(pressure.systolic as f64);
        self.last_features = Some(features);

        let quality = (extrema.quality / 100.0).clamp(0.0, 1.0);
        let perfusion = (features.perfusion / self.config.reference_perfusion).min(1.0);
        let spread = std_dev(&self.recent_systolic.to_vec()).unwrap_or(0.0);
        let stability = 1.0 / (1.0 + spread * spread / 25.0);
        Some(VitalEstimate::new(
            pressure,
            quality * perfusion * stability,
            timestamp_ms,
        ))
    }

    fn regress(&self, f: &PulseFeatures) -> (f64, f64) {
        let cfg = &self.config;
        let reference = self.reference_ptt_ms();
        let ptt_dev = (reference - f.ptt_ms) / reference;
        let amp_dev = (f.perfusion / cfg.reference_perfusion - 1.0).clamp(-1.0, 3.0);
        let stiff_dev = 2.0 * (f.stiffness - 0.5);
        let sys = cfg.base_systolic
            + cfg.ptt_weight_systolic * ptt_dev
            + cfg.amplitude_weight_systolic * amp_dev
            + cfg.stiffness_weight_systolic * stiff_dev;
        let dia = cfg.base_diastolic
            + cfg.ptt_weight_diastolic * ptt_dev
            + cfg.amplitude_weight_diastolic * amp_dev
            + cfg.stiffness_weight_diastolic * stiff_dev;
        (sys, dia)
    }

    /// Clamp to the physiological ranges, keeping the pulse pressure in range.
    fn constrain(&self, sys: f64, dia: f64) -> BloodPressure {
        let (s_lo, s_hi) = self.config.systolic_range;
        let (d_lo, d_hi) = self.config.diastolic_range;
        let (p_lo, p_hi) = self.config.pulse_pressure_range;
        let sys = finite_or(sys, self.config.base_systolic);
        let dia = finite_or(dia, self.config.base_diastolic);

        let sys = sys.round().max(s_lo.ceil()).min(s_hi.floor());
        let lo = d_lo.ceil().max(sys - p_hi.floor());
        let hi = d_hi.floor().min(sys - p_lo.ceil());
        let dia = dia.round().max(lo).min(hi);
        BloodPressure {
            systolic: sys as u32,
            diastolic: dia as u32,
        }
    }

    pub fn last_features(&self) -> Option<&PulseFeatures> {
        self.last_features.as_ref()
    }

    pub fn reset(&mut self) {
        self.previous = None;
        self.recent_systolic.clear();
        self.last_features = None;
        self.baseline_ptt_ms = None;
    }
}

fn finite_or(x: f64, fallback: f64) -> f64 {
    if x.is_finite() {
        x
    } else {
        fallback
    }
}
