//! # grindvakt Telemetry
//!
//! Subscriber setup, structured security events and prometheus counters.

pub mod logging;
pub mod metrics;

pub use logging::EventLogger;
pub use metrics::MetricsRecorder;
