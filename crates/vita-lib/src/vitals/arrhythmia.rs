//! Rhythm classification over the RR-interval stream.
//!
//! The classifier starts in [`ClassifierPhase::Learning`], where it only
//! collects intervals until the session is old enough and a run of
//! consistent beats gives a trustworthy baseline. From then on every new
//! interval is scored against that frozen baseline and a short variability
//! window.

use crate::config::ArrhythmiaConfig;
use crate::metrics::hrv::{hrv_summary, HrvSummary};
use crate::metrics::stats::median;
use crate::signal::{RRSeries, RollingWindow};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RhythmStatus {
    Learning,
    Normal,
    Bradycardia,
    Tachycardia,
    Irregular,
    PrematureBeat,
}

impl RhythmStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RhythmStatus::Learning => "LEARNING",
            RhythmStatus::Normal => "NORMAL",
            RhythmStatus::Bradycardia => "BRADYCARDIA",
            RhythmStatus::Tachycardia => "TACHYCARDIA",
            RhythmStatus::Irregular => "IRREGULAR",
            RhythmStatus::PrematureBeat => "PREMATURE_BEAT",
        }
    }

    pub fn is_event(&self) -> bool {
        !matches!(self, RhythmStatus::Learning | RhythmStatus::Normal)
    }
}

impl fmt::Display for RhythmStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClassifierPhase {
    Learning,
    Monitoring,
}

/// Snapshot returned after every update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RhythmReading {
    pub status: RhythmStatus,
    pub event_count: u32,
    /// True when this update surfaced a new (debounced) event.
    pub new_event: bool,
    pub baseline_ms: Option<f64>,
    pub hrv: Option<HrvSummary>,
}

#[derive(Debug, Clone)]
pub struct ArrhythmiaClassifier {
    config: ArrhythmiaConfig,
    phase: ClassifierPhase,
    session_start_ms: Option<i64>,
    learning_run: Vec<f64>,
    consecutive: usize,
    baseline_ms: Option<f64>,
    window: RollingWindow<f64>,
    status: RhythmStatus,
    event_count: u32,
    last_event_ms: Option<i64>,
    hrv: Option<HrvSummary>,
}

impl ArrhythmiaClassifier {
    pub fn new(config: ArrhythmiaConfig) -> Self {
        let window = RollingWindow::new(config.rr_window);
        Self {
            learning_run: Vec::with_capacity(config.baseline_beats),
            config,
            phase: ClassifierPhase::Learning,
            session_start_ms: None,
            consecutive: 0,
            baseline_ms: None,
            window,
            status: RhythmStatus::Learning,
            event_count: 0,
            last_event_ms: None,
            hrv: None,
        }
    }

    /// Feed the intervals produced since the previous call.
    ///
    /// Call once per frame even when `new_intervals` is empty: the learning
    /// period is measured from the first call's `now_ms`. `bpm` is the
    /// tracker's rate; pass 0 to derive it from the RR window.
    pub fn update(&mut self, now_ms: i64, new_intervals: &[i64], bpm: u32) -> RhythmReading {
        let start = *self.session_start_ms.get_or_insert(now_ms);
        let mut new_event = false;
        for &rr in new_intervals {
            if !(self.config.min_rr_ms..=self.config.max_rr_ms).contains(&rr) {
                continue;
            }
            match self.phase {
                ClassifierPhase::Learning => self.learn(rr as f64),
                ClassifierPhase::Monitoring => {
                    let status = self.classify(rr as f64, bpm);
                    if status.is_event() && self.debounced(now_ms) {
                        self.event_count += 1;
                        self.last_event_ms = Some(now_ms);
                        new_event = true;
                        debug!("rhythm event #{}: {} (rr {rr} ms)", self.event_count, status);
                    }
                    self.status = status;
                }
            }
        }

        if self.phase == ClassifierPhase::Learning
            && now_ms - start >= self.config.learning_period_ms
            && self.consecutive >= self.config.min_learning_beats
        {
            self.finish_learning();
        }

        RhythmReading {
            status: self.status,
            event_count: self.event_count,
            new_event,
            baseline_ms: self.baseline_ms,
            hrv: self.hrv,
        }
    }

    /// [`update`](Self::update) for intervals measured on a window of the
    /// given detector quality. Below `min_event_quality` the intervals are
    /// withheld: they neither teach the baseline nor raise events.
    pub fn update_with_quality(
        &mut self,
        now_ms: i64,
        new_intervals: &[i64],
        bpm: u32,
        quality: f64,
    ) -> RhythmReading {
        if quality >= self.config.min_event_quality {
            return self.update(now_ms, new_intervals, bpm);
        }
        if !new_intervals.is_empty() {
            debug!(
                "withholding {} intervals at quality {quality:.0}",
                new_intervals.len()
            );
        }
        self.update(now_ms, &[], bpm)
    }

    fn learn(&mut self, rr: f64) {
        let consistent = median(&self.learning_run)
            .map_or(true, |m| (rr - m).abs() <= self.config.learning_tolerance * m);
        if consistent {
            self.consecutive += 1;
        } else {
            self.learning_run.clear();
            self.consecutive = 1;
        }
        if self.learning_run.len() < self.config.baseline_beats {
            self.learning_run.push(rr);
        }
    }

    fn finish_learning(&mut self) {
        self.baseline_ms = median(&self.learning_run);
        self.phase = ClassifierPhase::Monitoring;
        self.status = RhythmStatus::Normal;
        for &rr in &self.learning_run {
            self.window.push(rr);
        }
        info!(
            "rhythm baseline learned: {:.0} ms over {} beats",
            self.baseline_ms.unwrap_or(0.0),
            self.consecutive
        );
    }

    fn classify(&mut self, rr: f64, bpm: u32) -> RhythmStatus {
        self.window.push(rr);
        let rr_window = RRSeries {
            rr_ms: self.window.to_vec(),
        };
        let hrv = hrv_summary(&rr_window);
        self.hrv = Some(hrv);

        let Some(baseline) = self.baseline_ms.filter(|b| *b > 0.0) else {
            return RhythmStatus::Normal;
        };
        let cfg = &self.config;
        let rate = if bpm > 0 {
            bpm as f64
        } else if hrv.mean_rr > 0.0 {
            60_000.0 / hrv.mean_rr
        } else {
            0.0
        };

        let rr_variation = (rr - baseline).abs() / baseline;
        let premature = rr < baseline * cfg.premature_factor;
        let pattern = compensatory_pattern(
            &rr_window.rr_ms,
            cfg.premature_factor,
            cfg.compensatory_factor,
        );
        let scattered = rr_variation > cfg.rr_variation_threshold
            || (hrv.sd1 > cfg.min_sd1_ms
                && hrv.sd_ratio().is_some_and(|r| r > cfg.sd_ratio_threshold));

        if rate > 0.0 && rate < cfg.bradycardia_bpm {
            RhythmStatus::Bradycardia
        } else if rate > cfg.tachycardia_bpm {
            RhythmStatus::Tachycardia
        } else if scattered {
            if premature || pattern {
                RhythmStatus::PrematureBeat
            } else {
                RhythmStatus::Irregular
            }
        } else if premature || pattern {
            RhythmStatus::PrematureBeat
        } else {
            RhythmStatus::Normal
        }
    }

    fn debounced(&self, now_ms: i64) -> bool {
        self.last_event_ms
            .map_or(true, |last| now_ms - last >= self.config.debounce_ms)
    }

    pub fn phase(&self) -> ClassifierPhase {
        self.phase
    }

    pub fn is_learning(&self) -> bool {
        self.phase == ClassifierPhase::Learning
    }

    pub fn status(&self) -> RhythmStatus {
        self.status
    }

    pub fn event_count(&self) -> u32 {
        self.event_count
    }

    pub fn baseline_ms(&self) -> Option<f64> {
        self.baseline_ms
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.config.clone());
    }
}

/// normal → short → compensatory pause over the last three intervals.
fn compensatory_pattern(rr: &[f64], short_factor: f64, pause_factor: f64) -> bool {
    let [prev, short, next] = match rr {
        [.., a, b, c] => [*a, *b, *c],
        _ => return false,
    };
    short < prev * short_factor && next > prev * pause_factor
}
