//! Per-vital estimators. Each owns only its own state and is driven by
//! [`crate::pipeline::VitalsProcessor`].

pub mod arrhythmia;
pub mod blood_pressure;
pub mod estimate;
pub mod heart_rate;
pub mod respiration;
pub mod spo2;
