//! Vital-sign estimation from camera photoplethysmography.
//!
//! Feed one [`Frame`] per camera frame into a [`VitalsProcessor`] and read
//! heart rate, SpO2, blood pressure, rhythm status and respiration from the
//! returned [`FrameResult`].

pub mod conditioning;
pub mod config;
pub mod detectors;
pub mod error;
pub mod io;
pub mod metrics;
pub mod pipeline;
pub mod signal;
pub mod synth;
pub mod vitals;
pub mod worker;

pub use config::ProcessorConfig;
pub use detectors::*;
pub use error::{Result, VitaError};
pub use metrics::*;
pub use pipeline::{FrameResult, RespirationReading, VitalsProcessor, PENDING_PRESSURE};
pub use signal::*;
pub use vitals::arrhythmia::RhythmStatus;
pub use worker::ProcessorWorker;
