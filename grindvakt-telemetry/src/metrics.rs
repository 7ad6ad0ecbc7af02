//! ## grindvakt-telemetry::metrics
//! **Prometheus counters for the capture and enforcement paths**

use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Registry, TextEncoder};

/// Cheap to clone; every handle shares the same registry.
#[derive(Debug, Clone)]
pub struct MetricsRecorder {
    pub registry: Registry,
    pub packets: IntCounter,
    pub unresolved_packets: IntCounter,
    pub rule_matches: IntCounter,
    pub enforcements: IntCounter,
    pub enforcement_failures: IntCounter,
    pub active_rules: IntGauge,
    pub enforcement_latency: Histogram,
}

impl MetricsRecorder {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let packets = IntCounter::new("grindvakt_packets_total", "Captured frames delivered")?;
        let unresolved_packets = IntCounter::new(
            "grindvakt_unresolved_packets_total",
            "Frames without a usable IPv4/IPv6 header",
        )?;
        let rule_matches = IntCounter::new(
            "grindvakt_rule_matches_total",
            "Firing rule matches, before de-duplication",
        )?;
        let enforcements = IntCounter::new(
            "grindvakt_enforcements_total",
            "Enforcement actions issued",
        )?;
        let enforcement_failures = IntCounter::new(
            "grindvakt_enforcement_failures_total",
            "Enforcement actions whose firewall command failed",
        )?;
        let active_rules = IntGauge::new("grindvakt_active_rules", "Rules in the live index")?;
        let enforcement_latency = Histogram::with_opts(
            HistogramOpts::new(
                "grindvakt_enforcement_duration_seconds",
                "Wall time spent running firewall commands",
            )
            .buckets(vec![0.005, 0.025, 0.1, 0.5, 2.0]),
        )?;

        registry.register(Box::new(packets.clone()))?;
        registry.register(Box::new(unresolved_packets.clone()))?;
        registry.register(Box::new(rule_matches.clone()))?;
        registry.register(Box::new(enforcements.clone()))?;
        registry.register(Box::new(enforcement_failures.clone()))?;
        registry.register(Box::new(active_rules.clone()))?;
        registry.register(Box::new(enforcement_latency.clone()))?;

        Ok(Self {
            registry,
            packets,
            unresolved_packets,
            rule_matches,
            enforcements,
            enforcement_failures,
            active_rules,
            enforcement_latency,
        })
    }

    pub fn gather_metrics(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::<u8>::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}
