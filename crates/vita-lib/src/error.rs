use thiserror::Error;

/// Failures on the non-realtime surfaces of the crate.
///
/// The per-frame path never produces one of these: missing or poor data is
/// expressed through `Option` results and confidence values instead.
#[derive(Debug, Error)]
pub enum VitaError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),
    #[error("failed to serialize configuration: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),
    #[error("a frame is already in flight; receive its result before submitting another")]
    FrameInFlight,
    #[error("no frame is in flight")]
    NothingInFlight,
    #[error("processing worker has stopped")]
    WorkerStopped,
}

pub type Result<T> = std::result::Result<T, VitaError>;
