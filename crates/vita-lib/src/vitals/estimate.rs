use serde::{Deserialize, Serialize};

/// A derived vital with its confidence and the frame it was computed on.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VitalEstimate<T> {
    pub value: T,
    /// Always within [0, 1].
    pub confidence: f64,
    pub timestamp_ms: i64,
}

impl<T> VitalEstimate<T> {
    pub fn new(value: T, confidence: f64, timestamp_ms: i64) -> Self {
        let confidence = if confidence.is_finite() {
            confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            value,
            confidence,
            timestamp_ms,
        }
    }
}

/// Holds the most recent fresh estimate and ages it while no fresh one arrives.
///
/// Each frame without a fresh estimate multiplies the stored confidence by
/// `decay`; once it drops below `min_confidence` the value is forgotten.
#[derive(Debug, Clone)]
pub struct LastValid<T> {
    estimate: Option<VitalEstimate<T>>,
    decay: f64,
    min_confidence: f64,
}

impl<T: Clone> LastValid<T> {
    pub fn new(decay: f64, min_confidence: f64) -> Self {
        Self {
            estimate: None,
            decay,
            min_confidence,
        }
    }

    pub fn resolve(&mut self, fresh: Option<VitalEstimate<T>>) -> Option<VitalEstimate<T>> {
        match fresh {
            Some(estimate) if estimate.confidence >= self.min_confidence => {
                self.estimate = Some(estimate.clone());
                Some(estimate)
            }
            _ => {
                let stale = self.estimate.as_mut()?;
                stale.confidence *= self.decay;
                if stale.confidence < self.min_confidence {
                    self.estimate = None;
                    return None;
                }
                Some(stale.clone())
            }
        }
    }

    pub fn get(&self) -> Option<&VitalEstimate<T>> {
        self.estimate.as_ref()
    }

    pub fn clear(&mut self) {
        self.estimate = None;
    }
}
