//! Per-session coordinator: one call per camera frame, one result per call.

use crate::conditioning::SignalConditioner;
use crate::config::ProcessorConfig;
use crate::detectors::extrema::{detect_extrema, Extrema};
use crate::error::Result;
use crate::metrics::hrv::HrvSummary;
use crate::signal::{Frame, RollingWindow, Sample};
use crate::vitals::arrhythmia::{ArrhythmiaClassifier, RhythmStatus};
use crate::vitals::blood_pressure::{BloodPressure, BloodPressureEstimator};
use crate::vitals::estimate::{LastValid, VitalEstimate};
use crate::vitals::heart_rate::{HeartRate, HeartRateTracker};
use crate::vitals::respiration::{BreathingPattern, Respiration, RespirationEstimator};
use crate::vitals::spo2::Spo2Estimator;
use log::{info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Shown instead of `systolic/diastolic` until a pressure is available.
pub const PENDING_PRESSURE: &str = "--/--";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RespirationReading {
    pub rate: f64,
    pub amplitude: f64,
    pub pattern: BreathingPattern,
    pub confidence: f64,
}

impl From<VitalEstimate<Respiration>> for RespirationReading {
    fn from(est: VitalEstimate<Respiration>) -> Self {
        Self {
            rate: est.value.rate,
            amplitude: est.value.amplitude,
            pattern: est.value.pattern,
            confidence: est.confidence,
        }
    }
}

/// Everything the display layer needs for one frame.
///
/// Missing values use sentinels rather than errors: `bpm == 0`, `spo2 == 0`
/// and `blood_pressure == "--/--"` mean "not enough data yet".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameResult {
    pub timestamp_ms: i64,
    pub bpm: u32,
    pub bpm_confidence: f64,
    pub spo2: u32,
    pub spo2_confidence: f64,
    pub blood_pressure: String,
    pub blood_pressure_confidence: f64,
    pub rhythm: RhythmStatus,
    pub arrhythmia_count: u32,
    pub new_arrhythmia_event: bool,
    pub respiration: Option<RespirationReading>,
    pub hrv: Option<HrvSummary>,
    /// Extrema quality of the current window, [0, 100].
    pub signal_quality: f64,
    pub filtered_value: f64,
}

impl FrameResult {
    pub fn pressure_pending(&self) -> bool {
        self.blood_pressure == PENDING_PRESSURE
    }
}

/// Owns all per-session state. Not thread-safe by itself; see
/// [`crate::worker::ProcessorWorker`] for an off-thread wrapper.
#[derive(Debug, Clone)]
pub struct VitalsProcessor {
    config: ProcessorConfig,
    conditioner: SignalConditioner,
    window: RollingWindow<Sample>,
    red: RollingWindow<f64>,
    ir: RollingWindow<f64>,
    heart_rate: HeartRateTracker,
    arrhythmia: ArrhythmiaClassifier,
    spo2: Spo2Estimator,
    blood_pressure: BloodPressureEstimator,
    respiration: RespirationEstimator,
    shown_heart_rate: LastValid<u32>,
    shown_spo2: LastValid<u32>,
    shown_pressure: LastValid<BloodPressure>,
    shown_respiration: LastValid<Respiration>,
    variation: Option<StdRng>,
    calibration_pending: bool,
    last_timestamp_ms: Option<i64>,
    frames: u64,
}

impl VitalsProcessor {
    pub fn new(config: ProcessorConfig) -> Result<Self> {
        config.validate()?;
        let decay = config.fallback.confidence_decay;
        let floor = config.fallback.min_confidence;
        Ok(Self {
            conditioner: SignalConditioner::new(config.conditioner.clone()),
            window: RollingWindow::new(config.signal_window),
            red: RollingWindow::new(config.signal_window),
            ir: RollingWindow::new(config.signal_window),
            heart_rate: HeartRateTracker::new(config.heart_rate.clone()),
            arrhythmia: ArrhythmiaClassifier::new(config.arrhythmia.clone()),
            spo2: Spo2Estimator::new(config.spo2.clone()),
            blood_pressure: BloodPressureEstimator::new(config.blood_pressure.clone()),
            respiration: RespirationEstimator::new(config.respiration.clone()),
            shown_heart_rate: LastValid::new(decay, floor),
            shown_spo2: LastValid::new(decay, floor),
            shown_pressure: LastValid::new(decay, floor),
            shown_respiration: LastValid::new(decay, floor),
            variation: config
                .variation
                .enabled
                .then(|| StdRng::seed_from_u64(config.variation.seed)),
            calibration_pending: true,
            last_timestamp_ms: None,
            frames: 0,
            config,
        })
    }

    pub fn process_frame(&mut self, frame: Frame) -> FrameResult {
        let timestamp_ms = self.monotonic(frame.timestamp_ms);
        let filtered = self.conditioner.condition(frame.value);
        self.window.push(Sample::new(filtered, timestamp_ms));
        self.push_channels(&frame);
        self.frames += 1;

        let values = self.window.values();
        let period = self
            .window
            .sample_period_ms()
            .unwrap_or(self.config.nominal_sample_period_ms);
        let ready = self.window.len() >= self.config.min_window;
        let extrema = if ready {
            detect_extrema(&values, period, &self.config.cardiac_extrema)
        } else {
            Extrema::empty()
        };

        let timestamps = self.window.timestamps();
        let peak_times: Vec<i64> = extrema.peaks.iter().map(|&i| timestamps[i]).collect();
        let hr = self.heart_rate.update(&peak_times);
        let rhythm = self.arrhythmia.update_with_quality(
            timestamp_ms,
            &hr.new_intervals,
            hr.reading.bpm,
            extrema.quality,
        );
        self.blood_pressure
            .set_baseline_ptt(self.arrhythmia.baseline_ms());

        let spo2 = self.estimate_spo2(&values, timestamp_ms);
        if self.calibration_pending && !self.arrhythmia.is_learning() {
            self.calibration_pending = false;
            match self.spo2.calibrate() {
                Some(offset) => info!("learning complete; spo2 offset {offset:+.1}"),
                None => info!("learning complete; spo2 left uncalibrated"),
            }
        }
        let pressure = if ready {
            self.blood_pressure
                .estimate(&values, &extrema, period, timestamp_ms)
        } else {
            None
        };
        let respiration = self.respiration.update(filtered, period, timestamp_ms);

        let fresh_heart_rate = hr
            .reading
            .is_valid()
            .then(|| VitalEstimate::new(hr.reading.bpm, hr.reading.confidence, timestamp_ms));
        let heart_rate = self.shown_heart_rate.resolve(fresh_heart_rate);
        let spo2 = self.shown_spo2.resolve(spo2);
        let pressure = self.shown_pressure.resolve(pressure);
        let respiration = self.shown_respiration.resolve(respiration);
        let (spo2, pressure) = self.vary(spo2, pressure);

        FrameResult {
            timestamp_ms,
            bpm: heart_rate.map_or(0, |e| e.value),
            bpm_confidence: heart_rate.map_or(0.0, |e| e.confidence),
            spo2: spo2.map_or(0, |e| e.value),
            spo2_confidence: spo2.map_or(0.0, |e| e.confidence),
            blood_pressure: pressure
                .map_or_else(|| PENDING_PRESSURE.to_string(), |e| e.value.to_string()),
            blood_pressure_confidence: pressure.map_or(0.0, |e| e.confidence),
            rhythm: rhythm.status,
            arrhythmia_count: rhythm.event_count,
            new_arrhythmia_event: rhythm.new_event,
            respiration: respiration.map(RespirationReading::from),
            hrv: rhythm.hrv,
            signal_quality: extrema.quality,
            filtered_value: filtered,
        }
    }

    pub fn process_all<I>(&mut self, frames: I) -> Vec<FrameResult>
    where
        I: IntoIterator<Item = Frame>,
    {
        frames.into_iter().map(|f| self.process_frame(f)).collect()
    }

    /// Out-of-order or repeated timestamps are nudged just past the previous one.
    fn monotonic(&mut self, timestamp_ms: i64) -> i64 {
        let ts = match self.last_timestamp_ms {
            Some(last) if timestamp_ms <= last => {
                warn!("non-monotonic timestamp {timestamp_ms} after {last}");
                last + 1
            }
            _ => timestamp_ms,
        };
        self.last_timestamp_ms = Some(ts);
        ts
    }

    fn push_channels(&mut self, frame: &Frame) {
        match (frame.red, frame.ir) {
            (Some(red), Some(ir)) if red.is_finite() && ir.is_finite() => {
                self.red.push(red);
                self.ir.push(ir);
            }
            _ => {
                self.red.clear();
                self.ir.clear();
            }
        }
    }

    fn estimate_spo2(&mut self, values: &[f64], timestamp_ms: i64) -> Option<VitalEstimate<u32>> {
        let red = self.red.to_vec();
        let ir = self.ir.to_vec();
        let channels = (!red.is_empty()).then_some((red.as_slice(), ir.as_slice()));
        let estimate = self.spo2.estimate(values, channels, timestamp_ms);
        if self.arrhythmia.is_learning() {
            if let Some(raw) = self.spo2.last_raw() {
                self.spo2.add_calibration_sample(raw);
            }
        }
        estimate
    }

    /// Optional presentation jitter; off by default.
    fn vary(
        &mut self,
        spo2: Option<VitalEstimate<u32>>,
        pressure: Option<VitalEstimate<BloodPressure>>,
    ) -> (Option<VitalEstimate<u32>>, Option<VitalEstimate<BloodPressure>>) {
        let Some(rng) = self.variation.as_mut() else {
            return (spo2, pressure);
        };
        let cfg = &self.config;
        let spo2 = spo2.map(|mut e| {
            let a = cfg.variation.spo2_amplitude as i64;
            let jittered = e.value as i64 + rng.gen_range(-a..=a);
            e.value = (jittered as f64).clamp(cfg.spo2.lower_bound, cfg.spo2.upper_bound) as u32;
            e
        });
        let pressure = pressure.map(|mut e| {
            let a = cfg.variation.pressure_amplitude as i64;
            let delta = rng.gen_range(-a..=a);
            let sys = e.value.systolic as i64 + delta;
            let dia = e.value.diastolic as i64 + delta;
            let (s_lo, s_hi) = cfg.blood_pressure.systolic_range;
            let (d_lo, d_hi) = cfg.blood_pressure.diastolic_range;
            if (s_lo..=s_hi).contains(&(sys as f64)) && (d_lo..=d_hi).contains(&(dia as f64)) {
                e.value = BloodPressure {
                    systolic: sys as u32,
                    diastolic: dia as u32,
                };
            }
            e
        });
        (spo2, pressure)
    }

    /// Clear every buffer, baseline and counter; the next frame starts a new session.
    pub fn reset(&mut self) {
        self.conditioner.reset();
        self.window.clear();
        self.red.clear();
        self.ir.clear();
        self.heart_rate.reset();
        self.arrhythmia.reset();
        self.spo2.reset();
        self.blood_pressure.reset();
        self.respiration.reset();
        self.shown_heart_rate.clear();
        self.shown_spo2.clear();
        self.shown_pressure.clear();
        self.shown_respiration.clear();
        self.variation = self
            .config
            .variation
            .enabled
            .then(|| StdRng::seed_from_u64(self.config.variation.seed));
        self.calibration_pending = true;
        self.last_timestamp_ms = None;
        self.frames = 0;
    }

    pub fn add_calibration_sample(&mut self, value: f64) {
        self.spo2.add_calibration_sample(value);
    }

    pub fn calibrate(&mut self) -> Option<f64> {
        self.spo2.calibrate()
    }

    pub fn set_reference_value(&mut self, measured_spo2: f64) {
        self.spo2.set_reference_value(measured_spo2);
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames
    }

    pub fn is_learning(&self) -> bool {
        self.arrhythmia.is_learning()
    }

    pub fn rhythm_status(&self) -> RhythmStatus {
        self.arrhythmia.status()
    }

    pub fn arrhythmia_count(&self) -> u32 {
        self.arrhythmia.event_count()
    }

    pub fn heart_rate(&self) -> HeartRate {
        self.heart_rate.current()
    }

    pub fn spo2_offset(&self) -> f64 {
        self.spo2.offset()
    }

    pub fn substituted_samples(&self) -> u64 {
        self.conditioner.substituted()
    }

    pub fn last_timestamp_ms(&self) -> Option<i64> {
        self.last_timestamp_ms
    }
}
