use grindvakt_capture::CaptureError;
use grindvakt_config::ConfigError;
use grindvakt_core::CoreError;
use grindvakt_prevention::EnforcementError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    #[error("Rule store error: {0}")]
    Store(#[from] CoreError),

    #[error("Enforcement error: {0}")]
    Enforcement(#[from] EnforcementError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Metrics registry error: {0}")]
    Metrics(String),

    #[error("Not an IP address: {0:?}")]
    InvalidTarget(String),
}
