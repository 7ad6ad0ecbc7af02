//! Callback for the human-readable line emitted on each fired match.

use tracing::warn;

pub trait BlockListener: Send + Sync {
    fn on_block(&self, message: &str);
}

impl<F> BlockListener for F
where
    F: Fn(&str) + Send + Sync,
{
    fn on_block(&self, message: &str) {
        self(message)
    }
}

/// Writes match lines to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingListener;

impl BlockListener for TracingListener {
    fn on_block(&self, message: &str) {
        warn!("{message}");
    }
}
