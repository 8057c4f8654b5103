use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// One conditioned brightness sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub value: f64,
    /// Monotonic capture time in milliseconds.
    pub timestamp_ms: i64,
}

impl Sample {
    pub fn new(value: f64, timestamp_ms: i64) -> Self {
        Self {
            value,
            timestamp_ms,
        }
    }
}

/// Raw camera frame as handed over by the capture layer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// Scalar intensity (usually the mean red brightness of the frame).
    pub value: f64,
    pub timestamp_ms: i64,
    #[serde(default)]
    pub red: Option<f64>,
    #[serde(default)]
    pub ir: Option<f64>,
}

impl Frame {
    pub fn new(value: f64, timestamp_ms: i64) -> Self {
        Self {
            value,
            timestamp_ms,
            red: None,
            ir: None,
        }
    }

    pub fn with_channels(mut self, red: f64, ir: f64) -> Self {
        self.red = Some(red);
        self.ir = Some(ir);
        self
    }
}

/// Fixed-capacity FIFO. Pushing onto a full window evicts the oldest entry.
#[derive(Debug, Clone)]
pub struct RollingWindow<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T: Clone> RollingWindow<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, item: T) {
        if self.items.len() == self.capacity {
            self.items.pop_front();
        }
        self.items.push_back(item);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.items.len() == self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn last(&self) -> Option<&T> {
        self.items.back()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator {
        self.items.iter()
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.items.iter().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

impl RollingWindow<Sample> {
    pub fn values(&self) -> Vec<f64> {
        self.items.iter().map(|s| s.value).collect()
    }

    pub fn timestamps(&self) -> Vec<i64> {
        self.items.iter().map(|s| s.timestamp_ms).collect()
    }

    /// Median spacing between consecutive samples, robust to dropped frames.
    pub fn sample_period_ms(&self) -> Option<f64> {
        if self.items.len() < 2 {
            return None;
        }
        let mut deltas: Vec<f64> = self
            .items
            .iter()
            .zip(self.items.iter().skip(1))
            .map(|(a, b)| (b.timestamp_ms - a.timestamp_ms) as f64)
            .filter(|d| *d > 0.0)
            .collect();
        if deltas.is_empty() {
            return None;
        }
        deltas.sort_by(|a, b| a.total_cmp(b));
        Some(deltas[deltas.len() / 2])
    }
}

/// RR intervals in milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RRSeries {
    pub rr_ms: Vec<f64>,
}

impl RRSeries {
    pub fn from_peak_times(timestamps_ms: &[i64]) -> Self {
        let rr_ms = timestamps_ms
            .windows(2)
            .map(|w| (w[1] - w[0]) as f64)
            .collect();
        Self { rr_ms }
    }

    pub fn len(&self) -> usize {
        self.rr_ms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rr_ms.is_empty()
    }
}
