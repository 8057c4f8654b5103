//! Tunable constants for every stage of the pipeline.
//!
//! Each block is a plain struct with a `Default` that carries the shipped
//! values, so a host can override a single knob from TOML without restating
//! the rest.

use crate::error::{Result, VitaError};
use serde::{Deserialize, Serialize};

/// Top-level configuration for a [`crate::pipeline::VitalsProcessor`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorConfig {
    /// Capacity of the conditioned signal window (samples).
    pub signal_window: usize,
    /// Samples required before the detector runs at all.
    pub min_window: usize,
    /// Sample period assumed until timestamps give a better estimate.
    pub nominal_sample_period_ms: f64,
    pub conditioner: ConditionerConfig,
    pub cardiac_extrema: ExtremaConfig,
    pub heart_rate: HeartRateConfig,
    pub arrhythmia: ArrhythmiaConfig,
    pub spo2: Spo2Config,
    pub blood_pressure: BloodPressureConfig,
    pub respiration: RespirationConfig,
    pub fallback: FallbackConfig,
    pub variation: VariationConfig,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            signal_window: 300,
            min_window: 45,
            nominal_sample_period_ms: 1000.0 / 30.0,
            conditioner: ConditionerConfig::default(),
            cardiac_extrema: ExtremaConfig::cardiac(),
            heart_rate: HeartRateConfig::default(),
            arrhythmia: ArrhythmiaConfig::default(),
            spo2: Spo2Config::default(),
            blood_pressure: BloodPressureConfig::default(),
            respiration: RespirationConfig::default(),
            fallback: FallbackConfig::default(),
            variation: VariationConfig::default(),
        }
    }
}

impl ProcessorConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let cfg: ProcessorConfig = toml::from_str(text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Reject combinations that would make a stage degenerate.
    pub fn validate(&self) -> Result<()> {
        if self.signal_window < 16 {
            return invalid("signal_window must hold at least 16 samples");
        }
        if self.min_window < 5 || self.min_window > self.signal_window {
            return invalid("min_window must be in [5, signal_window]");
        }
        if !(self.nominal_sample_period_ms > 0.0) {
            return invalid("nominal_sample_period_ms must be positive");
        }
        self.conditioner.validate()?;
        self.cardiac_extrema.validate("cardiac_extrema")?;
        self.respiration.extrema.validate("respiration.extrema")?;
        self.heart_rate.validate()?;
        self.arrhythmia.validate()?;
        self.spo2.validate()?;
        self.blood_pressure.validate()?;
        self.respiration.validate()?;
        if !(0.0..=1.0).contains(&self.fallback.confidence_decay) {
            return invalid("fallback.confidence_decay must be in [0, 1]");
        }
        Ok(())
    }
}

fn invalid<T>(msg: &str) -> Result<T> {
    Err(VitaError::InvalidConfig(msg.to_string()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SmoothingMode {
    MovingAverage,
    LowPass,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConditionerConfig {
    pub mode: SmoothingMode,
    /// Moving-average length (3 to 5 samples).
    pub window: usize,
    /// Single-pole smoothing factor used in `LowPass` mode.
    pub alpha: f64,
    /// Samples outside these bounds are treated like NaN.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_value: Option<f64>,
}

impl Default for ConditionerConfig {
    fn default() -> Self {
        Self {
            mode: SmoothingMode::MovingAverage,
            window: 5,
            alpha: 0.35,
            min_value: None,
            max_value: None,
        }
    }
}

impl ConditionerConfig {
    fn validate(&self) -> Result<()> {
        if !(1..=16).contains(&self.window) {
            return invalid("conditioner.window must be in [1, 16]");
        }
        if !(self.alpha > 0.0 && self.alpha <= 1.0) {
            return invalid("conditioner.alpha must be in (0, 1]");
        }
        if let (Some(lo), Some(hi)) = (self.min_value, self.max_value) {
            if lo >= hi {
                return invalid("conditioner.min_value must be below max_value");
            }
        }
        Ok(())
    }
}

/// Extrema detector tuning; one preset per consumer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtremaConfig {
    /// Multiplier on the local standard deviation for the dynamic threshold.
    pub threshold_k: f64,
    /// Half-width of the neighbourhood used for local mean/std (ms).
    pub threshold_span_ms: f64,
    /// Minimum spacing between accepted peaks (ms).
    pub min_distance_ms: f64,
    /// Peaks whose peak-valley amplitude falls below this fraction of the
    /// mean amplitude are discarded as noise.
    pub min_amplitude_ratio: f64,
    /// Interval CV at which the regularity component of quality reaches zero.
    pub max_interval_cv: f64,
}

impl ExtremaConfig {
    pub fn cardiac() -> Self {
        Self {
            threshold_k: 0.8,
            threshold_span_ms: 500.0,
            min_distance_ms: 300.0,
            min_amplitude_ratio: 0.25,
            max_interval_cv: 0.5,
        }
    }

    pub fn respiratory() -> Self {
        Self {
            threshold_k: 0.3,
            threshold_span_ms: 2000.0,
            min_distance_ms: 2400.0,
            min_amplitude_ratio: 0.3,
            max_interval_cv: 0.5,
        }
    }

    fn validate(&self, name: &str) -> Result<()> {
        if !(self.threshold_k >= 0.0) || !(self.threshold_span_ms > 0.0) {
            return Err(VitaError::InvalidConfig(format!(
                "{name}: threshold_k must be >= 0 and threshold_span_ms > 0"
            )));
        }
        if !(self.min_distance_ms > 0.0) || !(0.0..1.0).contains(&self.min_amplitude_ratio) {
            return Err(VitaError::InvalidConfig(format!(
                "{name}: min_distance_ms must be > 0 and min_amplitude_ratio in [0, 1)"
            )));
        }
        if !(self.max_interval_cv > 0.0) {
            return Err(VitaError::InvalidConfig(format!(
                "{name}: max_interval_cv must be > 0"
            )));
        }
        Ok(())
    }
}

impl Default for ExtremaConfig {
    fn default() -> Self {
        Self::cardiac()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartRateConfig {
    pub min_bpm: f64,
    pub max_bpm: f64,
    /// Accepted deviation from the median interval (fraction).
    pub outlier_tolerance: f64,
    pub min_valid_intervals: usize,
    /// Peak timestamps retained between updates.
    pub peak_history: usize,
    /// RR intervals outside this range are never forwarded to the classifier.
    pub min_rr_ms: i64,
    pub max_rr_ms: i64,
}

impl Default for HeartRateConfig {
    fn default() -> Self {
        Self {
            min_bpm: 40.0,
            max_bpm: 200.0,
            outlier_tolerance: 0.25,
            min_valid_intervals: 3,
            peak_history: 16,
            min_rr_ms: 300,
            max_rr_ms: 1700,
        }
    }
}

impl HeartRateConfig {
    fn validate(&self) -> Result<()> {
        if !(self.min_bpm > 0.0 && self.min_bpm < self.max_bpm) {
            return invalid("heart_rate: min_bpm must be positive and below max_bpm");
        }
        if self.peak_history < self.min_valid_intervals + 1 {
            return invalid("heart_rate.peak_history must exceed min_valid_intervals");
        }
        if self.min_rr_ms <= 0 || self.min_rr_ms >= self.max_rr_ms {
            return invalid("heart_rate: min_rr_ms must be positive and below max_rr_ms");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArrhythmiaConfig {
    /// Minimum session time spent in LEARNING (ms).
    pub learning_period_ms: i64,
    /// Consecutive consistent beats required to leave LEARNING.
    pub min_learning_beats: usize,
    /// Number of consistent intervals the baseline median is taken over.
    pub baseline_beats: usize,
    /// A learning interval is consistent when within this fraction of the running median.
    pub learning_tolerance: f64,
    pub rr_window: usize,
    pub bradycardia_bpm: f64,
    pub tachycardia_bpm: f64,
    pub rr_variation_threshold: f64,
    /// SD1/SD2 ratio above which the window is considered scattered.
    pub sd_ratio_threshold: f64,
    /// SD1 floor so that ordinary sinus variability never counts as scatter.
    pub min_sd1_ms: f64,
    pub premature_factor: f64,
    pub compensatory_factor: f64,
    pub debounce_ms: i64,
    pub min_rr_ms: i64,
    pub max_rr_ms: i64,
    /// Detector quality [0, 100] below which new intervals are withheld.
    pub min_event_quality: f64,
}

impl Default for ArrhythmiaConfig {
    fn default() -> Self {
        Self {
            learning_period_ms: 6000,
            min_learning_beats: 6,
            baseline_beats: 8,
            learning_tolerance: 0.25,
            rr_window: 8,
            bradycardia_bpm: 50.0,
            tachycardia_bpm: 100.0,
            rr_variation_threshold: 0.2,
            sd_ratio_threshold: 0.75,
            min_sd1_ms: 40.0,
            premature_factor: 0.75,
            compensatory_factor: 1.2,
            debounce_ms: 1000,
            min_rr_ms: 300,
            max_rr_ms: 1700,
            min_event_quality: 45.0,
        }
    }
}

impl ArrhythmiaConfig {
    fn validate(&self) -> Result<()> {
        if self.learning_period_ms < 0 {
            return invalid("arrhythmia.learning_period_ms must not be negative");
        }
        if self.min_learning_beats == 0 || self.baseline_beats == 0 {
            return invalid("arrhythmia: min_learning_beats and baseline_beats must be > 0");
        }
        if self.rr_window < 3 {
            return invalid("arrhythmia.rr_window must hold at least 3 intervals");
        }
        if self.bradycardia_bpm >= self.tachycardia_bpm {
            return invalid("arrhythmia.bradycardia_bpm must be below tachycardia_bpm");
        }
        if !(self.premature_factor > 0.0 && self.premature_factor < 1.0) {
            return invalid("arrhythmia.premature_factor must be in (0, 1)");
        }
        if self.compensatory_factor <= 1.0 {
            return invalid("arrhythmia.compensatory_factor must exceed 1");
        }
        if self.min_rr_ms <= 0 || self.min_rr_ms >= self.max_rr_ms {
            return invalid("arrhythmia: min_rr_ms must be positive and below max_rr_ms");
        }
        if !(0.0..=100.0).contains(&self.min_event_quality) {
            return invalid("arrhythmia.min_event_quality must be within [0, 100]");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Spo2Config {
    pub min_samples: usize,
    pub ac_low_percentile: f64,
    pub ac_high_percentile: f64,
    /// Perfusion index (AC/DC) below which a reading is rejected.
    pub min_perfusion: f64,
    /// Perfusion index at which perfusion stops limiting confidence.
    pub good_perfusion: f64,
    /// Divides the single-channel perfusion index to obtain the ratio R.
    pub calibration_factor: f64,
    /// Calibration curve `c0 + c1·R + c2·R²`.
    pub curve: [f64; 3],
    pub lower_bound: f64,
    pub upper_bound: f64,
    /// Length of the median smoothing buffer.
    pub smoothing_len: usize,
    /// Confidence multiplier applied on each rejected update.
    pub confidence_decay: f64,
    pub calibration_target: f64,
    pub max_calibration_offset: f64,
    pub min_calibration_samples: usize,
    pub calibration_buffer: usize,
    /// Damping of each reference-driven step along the calibration curve.
    pub reference_gain: f64,
}

impl Default for Spo2Config {
    fn default() -> Self {
        Self {
            min_samples: 30,
            ac_low_percentile: 5.0,
            ac_high_percentile: 95.0,
            min_perfusion: 0.001,
            good_perfusion: 0.01,
            calibration_factor: 0.02,
            curve: [94.845, 30.354, -45.060],
            lower_bound: 70.0,
            upper_bound: 98.0,
            smoothing_len: 5,
            confidence_decay: 0.9,
            calibration_target: 96.5,
            max_calibration_offset: 8.0,
            min_calibration_samples: 10,
            calibration_buffer: 120,
            reference_gain: 0.5,
        }
    }
}

impl Spo2Config {
    fn validate(&self) -> Result<()> {
        if self.min_samples < 5 {
            return invalid("spo2.min_samples must be at least 5");
        }
        if !(0.0..50.0).contains(&self.ac_low_percentile)
            || !(50.0..=100.0).contains(&self.ac_high_percentile)
        {
            return invalid("spo2: AC percentiles must straddle the median");
        }
        if !(self.calibration_factor > 0.0) {
            return invalid("spo2.calibration_factor must be positive");
        }
        if !(70.0..=100.0).contains(&self.lower_bound)
            || !(70.0..=100.0).contains(&self.upper_bound)
            || self.lower_bound >= self.upper_bound
        {
            return invalid("spo2: bounds must be ordered within [70, 100]");
        }
        if self.smoothing_len == 0 || self.calibration_buffer == 0 {
            return invalid("spo2: smoothing_len and calibration_buffer must be > 0");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BloodPressureConfig {
    pub min_pairs: usize,
    pub base_systolic: f64,
    pub base_diastolic: f64,
    /// Transit-time proxy that maps to the base pressures.
    pub reference_ptt_ms: f64,
    /// Pulse perfusion index that maps to the base pressures.
    pub reference_perfusion: f64,
    pub ptt_weight_systolic: f64,
    pub ptt_weight_diastolic: f64,
    pub amplitude_weight_systolic: f64,
    pub amplitude_weight_diastolic: f64,
    pub stiffness_weight_systolic: f64,
    pub stiffness_weight_diastolic: f64,
    /// Weight kept on the previous estimate when smoothing.
    pub history_weight: f64,
    pub systolic_range: (f64, f64),
    pub diastolic_range: (f64, f64),
    pub pulse_pressure_range: (f64, f64),
    pub stability_len: usize,
    /// Samples in the resampled pulse template.
    pub template_points: usize,
    /// Notch depth regarded as fully compliant.
    pub notch_reference: f64,
    /// Normalized decay slope regarded as fully stiff.
    pub slope_reference: f64,
}

impl Default for BloodPressureConfig {
    fn default() -> Self {
        Self {
            min_pairs: 2,
            base_systolic: 120.0,
            base_diastolic: 80.0,
            reference_ptt_ms: 800.0,
            reference_perfusion: 0.01,
            ptt_weight_systolic: 40.0,
            ptt_weight_diastolic: 25.0,
            amplitude_weight_systolic: -6.0,
            amplitude_weight_diastolic: -3.0,
            stiffness_weight_systolic: 12.0,
            stiffness_weight_diastolic: 6.0,
            history_weight: 0.75,
            systolic_range: (90.0, 180.0),
            diastolic_range: (50.0, 115.0),
            pulse_pressure_range: (20.0, 80.0),
            stability_len: 10,
            template_points: 32,
            notch_reference: 0.1,
            slope_reference: 3.0,
        }
    }
}

impl BloodPressureConfig {
    fn validate(&self) -> Result<()> {
        if self.min_pairs < 2 {
            return invalid("blood_pressure.min_pairs must be at least 2");
        }
        if !(0.0..1.0).contains(&self.history_weight) {
            return invalid("blood_pressure.history_weight must be in [0, 1)");
        }
        let (s_lo, s_hi) = self.systolic_range;
        let (d_lo, d_hi) = self.diastolic_range;
        let (p_lo, p_hi) = self.pulse_pressure_range;
        if s_lo >= s_hi || d_lo >= d_hi || p_lo >= p_hi || p_lo < 0.0 {
            return invalid("blood_pressure: ranges must be ordered");
        }
        // Every systolic value must admit a diastolic partner inside both ranges.
        if s_hi - p_hi > d_hi || s_lo - p_lo < d_lo {
            return invalid("blood_pressure: ranges cannot be satisfied together");
        }
        if self.template_points < 8 || self.stability_len == 0 {
            return invalid("blood_pressure: template_points >= 8 and stability_len > 0");
        }
        if !(self.reference_ptt_ms > 0.0 && self.reference_perfusion > 0.0) {
            return invalid("blood_pressure: reference values must be positive");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RespirationConfig {
    /// Capacity of the respiratory window (samples, ~32 s at 30 Hz).
    pub window: usize,
    /// Sub-window used for the sliding envelope (ms, about one beat).
    pub envelope_ms: f64,
    pub lowpass_hz: f64,
    pub min_rate: f64,
    pub max_rate: f64,
    pub min_cycles: usize,
    pub irregular_cv: f64,
    /// Normalized modulation depth thresholds for shallow/deep breathing.
    pub shallow_depth: f64,
    pub deep_depth: f64,
    /// Recompute every N frames; the last estimate is reused in between.
    pub update_every: usize,
    /// Max disagreement (breaths/min) with the spectral peak before confidence is cut.
    pub spectral_tolerance: f64,
    pub extrema: ExtremaConfig,
}

impl Default for RespirationConfig {
    fn default() -> Self {
        Self {
            window: 960,
            envelope_ms: 1000.0,
            lowpass_hz: 0.4,
            min_rate: 8.0,
            max_rate: 25.0,
            min_cycles: 3,
            irregular_cv: 0.25,
            shallow_depth: 0.08,
            deep_depth: 0.35,
            update_every: 15,
            spectral_tolerance: 3.0,
            extrema: ExtremaConfig::respiratory(),
        }
    }
}

impl RespirationConfig {
    fn validate(&self) -> Result<()> {
        if self.window < 64 {
            return invalid("respiration.window must hold at least 64 samples");
        }
        if !(self.min_rate > 0.0 && self.min_rate < self.max_rate) {
            return invalid("respiration: min_rate must be positive and below max_rate");
        }
        if self.min_cycles == 0 || self.update_every == 0 {
            return invalid("respiration: min_cycles and update_every must be > 0");
        }
        if !(self.lowpass_hz > 0.0 && self.envelope_ms > 0.0) {
            return invalid("respiration: lowpass_hz and envelope_ms must be positive");
        }
        if self.shallow_depth >= self.deep_depth {
            return invalid("respiration.shallow_depth must be below deep_depth");
        }
        Ok(())
    }
}

/// Policy for values that were not freshly computed this frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackConfig {
    /// Confidence multiplier applied per frame while a stale value is shown.
    pub confidence_decay: f64,
    /// Stale values are dropped to the pending sentinel below this confidence.
    pub min_confidence: f64,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            confidence_decay: 0.97,
            min_confidence: 0.05,
        }
    }
}

/// Optional cosmetic jitter on displayed SpO2/pressure values.
///
/// Disabled by default. It only touches the reported `FrameResult`; the
/// estimators' internal state never sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VariationConfig {
    pub enabled: bool,
    pub spo2_amplitude: u32,
    pub pressure_amplitude: u32,
    pub seed: u64,
}

impl Default for VariationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            spo2_amplitude: 1,
            pressure_amplitude: 2,
            seed: 0,
        }
    }
}
