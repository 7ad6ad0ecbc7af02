//! ## grindvakt-telemetry::logging
//! **Structured logging with tracing and OpenTelemetry attributes**
//!
//! Security events (blocks, unblocks, rule changes, enforcement failures)
//! are emitted inside a `security_event` span so they can be filtered apart
//! from ordinary diagnostics.

use opentelemetry::KeyValue;
use tracing::info_span;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{fmt, EnvFilter};

pub type InitError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Clone)]
pub struct EventLogger;

impl EventLogger {
    /// Installs the global fmt subscriber. `RUST_LOG` overrides `level`.
    ///
    /// Fails if a global subscriber is already set.
    pub fn init(level: &str) -> Result<(), InitError> {
        fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
            )
            .with_thread_names(true)
            .with_span_events(FmtSpan::NONE)
            .try_init()
    }

    #[inline]
    pub fn log_event(event_type: &str, metadata: Vec<KeyValue>) {
        let span = info_span!(
            "security_event",
            event_type = event_type,
            otel.kind = "INTERNAL"
        );
        let _entered = span.enter();

        let fields = metadata
            .iter()
            .map(|kv| format!("{}={}", kv.key.as_str(), kv.value))
            .collect::<Vec<_>>()
            .join(" ");
        tracing::info!(event_type, metadata = %fields, "Security event occurred");
    }
}
