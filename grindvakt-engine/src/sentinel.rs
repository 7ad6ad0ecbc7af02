//! ## grindvakt-engine::sentinel
//! **Runtime wiring**
//!
//! Startup order: rule store snapshot → matching engine → capture thread.
//! The capture loop runs on its own thread; the facade is handed to
//! whoever drives rule changes.

use std::sync::Arc;

use grindvakt_capture::{CaptureSession, CaptureSummary, SessionState};
use grindvakt_config::GrindvaktConfig;
use grindvakt_core::{MemoryRuleStore, NewRule, RuleStore};
use grindvakt_detection::{BlockListener, MatchingEngine, TracingListener};
use grindvakt_prevention::{Enforcer, Firewall};
use grindvakt_telemetry::MetricsRecorder;
use tracing::info;
use tracing_attributes::instrument;

use crate::error::EngineError;
use crate::facade::ControlFacade;
use crate::settings::{capture_options, firewall_settings};

/// Components a sentinel runs with. `session` must already be opened.
pub struct SentinelParts {
    pub store: Arc<dyn RuleStore>,
    pub enforcer: Arc<dyn Enforcer>,
    pub session: CaptureSession,
    pub listener: Arc<dyn BlockListener>,
}

pub struct Sentinel {
    session: Arc<CaptureSession>,
    engine: Arc<MatchingEngine>,
    facade: Arc<ControlFacade>,
    metrics: Option<MetricsRecorder>,
}

impl Sentinel {
    /// Starts live enforcement: configured rules in memory, iptables for
    /// enforcement and pcap for capture.
    #[instrument(skip_all)]
    pub fn start(config: &GrindvaktConfig) -> Result<Self, EngineError> {
        let store = MemoryRuleStore::with_rules(config.rules.iter().cloned().map(NewRule::from))?;
        let enforcer = Firewall::new(firewall_settings(&config.prevention.firewall));

        let session = CaptureSession::new(capture_options(&config.capture));
        session.open()?;

        Self::start_with(
            config,
            SentinelParts {
                store: Arc::new(store),
                enforcer: Arc::new(enforcer),
                session,
                listener: Arc::new(TracingListener),
            },
        )
    }

    /// Starts with caller-supplied components.
    #[instrument(skip_all)]
    pub fn start_with(config: &GrindvaktConfig, parts: SentinelParts) -> Result<Self, EngineError> {
        let SentinelParts {
            store,
            enforcer,
            session,
            listener,
        } = parts;

        let rules = store.load_active_rules()?;
        info!("Loaded {} active rules from the store", rules.len());

        let mut engine = MatchingEngine::new(rules, enforcer, store.clone())
            .with_listener(listener)
            .retry_failed(config.prevention.retry_failed);

        let metrics = if config.telemetry.metrics.enabled {
            let metrics =
                MetricsRecorder::new().map_err(|e| EngineError::Metrics(e.to_string()))?;
            engine = engine.with_metrics(metrics.clone());
            Some(metrics)
        } else {
            None
        };

        let engine = Arc::new(engine);
        let session = Arc::new(session);
        if let Err(e) = session.spawn(engine.clone()) {
            session.stop();
            return Err(e.into());
        }
        info!(
            interface = session.interface().as_deref().unwrap_or("<unknown>"),
            "Enforcement running"
        );

        let facade = Arc::new(ControlFacade::new(engine.clone(), store));
        Ok(Self {
            session,
            engine,
            facade,
            metrics,
        })
    }

    pub fn facade(&self) -> Arc<ControlFacade> {
        self.facade.clone()
    }

    pub fn engine(&self) -> &Arc<MatchingEngine> {
        &self.engine
    }

    pub fn metrics(&self) -> Option<&MetricsRecorder> {
        self.metrics.as_ref()
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    pub fn interface(&self) -> Option<String> {
        self.session.interface()
    }

    /// Stops capture. Enforced blocks stay in place.
    #[instrument(skip(self))]
    pub fn stop(&self) -> CaptureSummary {
        self.session.stop();
        let summary = self.session.summary();
        let enforced = self.engine.enforced().len();
        if enforced > 0 {
            info!("{enforced} blocks remain in the firewall after shutdown");
        }
        info!(
            frames = summary.frames,
            unresolved = summary.unresolved,
            "Sentinel stopped"
        );
        summary
    }
}
