use thiserror::Error;

use crate::session::SessionState;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("No non-loopback network interface found")]
    NoInterfaceFound,

    #[error("Network interface {0:?} not found")]
    UnknownInterface(String),

    /// Usually insufficient privilege.
    #[error("Failed to open capture on {interface}: {reason}")]
    CaptureOpenFailed { interface: String, reason: String },

    /// The receive call was broken on purpose. Expected during shutdown.
    #[error("Capture loop interrupted")]
    CaptureLoopInterrupted,

    #[error("Capture read failed: {0}")]
    Read(String),

    #[error("Capture session is {actual}, expected {expected}")]
    InvalidState {
        expected: SessionState,
        actual: SessionState,
    },
}
