//! ## grindvakt-detection::matching
//! **Direction-aware endpoint matching with at-most-once enforcement**
//!
//! For every observation the source address is checked as `Incoming` and
//! the destination as `Outgoing`. A firing match claims its key in the
//! ledger; only the claimant runs the enforcer, records the audit event and
//! notifies the listener.
//!
//! The key is claimed while the index read lock is held, so a concurrent
//! removal either hides the rule from the match or releases the key after
//! it. The lock is dropped before any enforcement command runs, so a hung
//! firewall command never stalls rule mutation from the control side.
//!
//! A block that completes after its key was released is lifted again
//! straight away.

use std::sync::Arc;
use std::time::Instant;

use grindvakt_core::{BlockEvent, BlockKey, Direction, EventKind, Rule, RuleStore};
use grindvakt_prevention::Enforcer;
use grindvakt_protocols::{PacketObservation, PacketSink, ParseError};
use grindvakt_telemetry::{EventLogger, MetricsRecorder};
use opentelemetry::KeyValue;
use tracing::{debug, error, info, trace, warn};

use crate::index::{canonical_value, RuleIndex};
use crate::ledger::BlockLedger;
use crate::listener::{BlockListener, TracingListener};

pub struct MatchingEngine {
    index: RuleIndex,
    ledger: BlockLedger,
    enforcer: Arc<dyn Enforcer>,
    store: Arc<dyn RuleStore>,
    listener: Arc<dyn BlockListener>,
    metrics: Option<MetricsRecorder>,
    retry_failed: bool,
}

impl MatchingEngine {
    /// Builds the index from an initial rule snapshot. Domain rules are
    /// skipped.
    pub fn new<I>(rules: I, enforcer: Arc<dyn Enforcer>, store: Arc<dyn RuleStore>) -> Self
    where
        I: IntoIterator<Item = Rule>,
    {
        let index = RuleIndex::from_rules(rules.into_iter().filter(Rule::is_ip_block));
        info!("Matching engine loaded {} rules", index.len());
        Self {
            index,
            ledger: BlockLedger::new(),
            enforcer,
            store,
            listener: Arc::new(TracingListener),
            metrics: None,
            retry_failed: false,
        }
    }

    pub fn with_listener(mut self, listener: Arc<dyn BlockListener>) -> Self {
        self.listener = listener;
        self
    }

    pub fn with_metrics(self, metrics: MetricsRecorder) -> Self {
        metrics.active_rules.set(self.index.len() as i64);
        Self {
            metrics: Some(metrics),
            ..self
        }
    }

    /// When set, a failed block releases its key so a later packet retries.
    /// Off by default: a failed pair stays marked until its rule is removed.
    pub fn retry_failed(mut self, retry: bool) -> Self {
        self.retry_failed = retry;
        self
    }

    pub fn enforcer(&self) -> &Arc<dyn Enforcer> {
        &self.enforcer
    }

    /// Inserts or overwrites by value. No enforcement happens until a
    /// packet matches. Returns the replaced rule.
    pub fn add_rule(&self, rule: Rule) -> Option<Rule> {
        if !rule.is_ip_block() {
            debug!("Not indexing {} rule for {}", rule.kind, rule.value);
            return None;
        }
        debug!(
            "Indexing rule {} for {} ({}, enabled={})",
            rule.id, rule.value, rule.direction, rule.enabled
        );
        let previous = self.index.insert(rule);
        self.update_gauge();
        previous
    }

    /// Removes the rule for `value` and forgets both of its enforced keys.
    pub fn remove_rule(&self, value: &str) -> Option<Rule> {
        self.take_rule(value).0
    }

    /// Like [`remove_rule`](Self::remove_rule), also returning the
    /// directions whose keys were released. Those blocks are still in the
    /// firewall; lifting them is up to the caller.
    pub fn take_rule(&self, value: &str) -> (Option<Rule>, Vec<Direction>) {
        let value = canonical_value(value);
        let removed = self.index.remove(&value);
        let released = self.ledger.release_value(&value);
        if removed.is_some() || !released.is_empty() {
            debug!("Removed rule for {value}, released {:?}", released);
        }
        self.update_gauge();
        (removed, released)
    }

    /// Forgets one enforced key, e.g. after a manual unblock.
    pub fn release(&self, value: &str, direction: Direction) -> bool {
        self.ledger
            .release(&BlockKey::new(canonical_value(value), direction))
    }

    /// Empties the index and the ledger. Returns the keys that were
    /// enforced.
    pub fn clear(&self) -> Vec<BlockKey> {
        let rules = self.index.clear();
        let keys = self.ledger.clear();
        info!(
            "Cleared {rules} rules and {} enforced pairs from the matching engine",
            keys.len()
        );
        self.update_gauge();
        keys
    }

    pub fn rule(&self, value: &str) -> Option<Rule> {
        self.index.get(value)
    }

    pub fn rules(&self) -> Vec<Rule> {
        self.index.snapshot()
    }

    pub fn is_enforced(&self, value: &str, direction: Direction) -> bool {
        direction
            .observed_pairs()
            .iter()
            .all(|&d| self.ledger.contains(&BlockKey::new(canonical_value(value), d)))
    }

    pub fn enforced(&self) -> Vec<BlockKey> {
        self.ledger.snapshot()
    }

    fn check(&self, value: String, observed: Direction) {
        let key = BlockKey::new(value, observed);
        let mut fires = false;
        let claimed = self.index.test(&key.value, |rule| {
            fires = rule.enabled && rule.direction.matches(observed);
            fires && self.ledger.mark(key.clone())
        });
        if !fires {
            return;
        }

        if let Some(metrics) = &self.metrics {
            metrics.rule_matches.inc();
        }
        if !claimed {
            trace!("Already enforced: {key}");
            return;
        }
        self.enforce(key);
    }

    fn enforce(&self, key: BlockKey) {
        let BlockKey { value, direction } = &key;
        self.listener.on_block(&format!(
            "Match found: blocking {direction} traffic for {value}"
        ));

        let started = Instant::now();
        let outcome = self.enforcer.block(value, *direction);
        if let Some(metrics) = &self.metrics {
            metrics
                .enforcement_latency
                .observe(started.elapsed().as_secs_f64());
        }

        match outcome {
            Ok(()) if !self.ledger.contains(&key) => {
                warn!(
                    "Rule for {value} went away while blocking {direction} traffic; lifting the block"
                );
                if let Err(e) = self.enforcer.unblock(value, *direction) {
                    error!("Failed to lift stale block on {direction} traffic for {value}: {e}");
                }
            }
            Ok(()) => {
                if let Some(metrics) = &self.metrics {
                    metrics.enforcements.inc();
                }
                info!(ip = %value, %direction, "Enforcement issued");
                EventLogger::log_event(
                    EventKind::IpBlocked.as_str(),
                    vec![
                        KeyValue::new("target", value.clone()),
                        KeyValue::new("direction", direction.as_str()),
                    ],
                );
                if let Err(e) = self
                    .store
                    .record_block_event(BlockEvent::blocked(value, *direction))
                {
                    warn!("Failed to record block of {value}: {e}");
                }
            }
            Err(e) => {
                if let Some(metrics) = &self.metrics {
                    metrics.enforcement_failures.inc();
                }
                error!("Failed to block {direction} traffic for {value}: {e}");
                EventLogger::log_event(
                    "ENFORCEMENT_FAILED",
                    vec![
                        KeyValue::new("target", value.clone()),
                        KeyValue::new("direction", direction.as_str()),
                        KeyValue::new("error", e.to_string()),
                    ],
                );
                if self.retry_failed {
                    self.ledger.release(&key);
                }
            }
        }
    }

    fn update_gauge(&self) {
        if let Some(metrics) = &self.metrics {
            metrics.active_rules.set(self.index.len() as i64);
        }
    }
}

impl PacketSink for MatchingEngine {
    #[inline]
    fn on_packet(&self, packet: &PacketObservation) {
        if let Some(metrics) = &self.metrics {
            metrics.packets.inc();
        }
        self.check(packet.source.to_string(), Direction::Incoming);
        self.check(packet.destination.to_string(), Direction::Outgoing);
    }

    fn on_unresolved(&self, _error: &ParseError) {
        if let Some(metrics) = &self.metrics {
            metrics.unresolved_packets.inc();
        }
    }
}
