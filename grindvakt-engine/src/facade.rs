//! ## grindvakt-engine::facade
//! **Runtime rule control**
//!
//! The only surface an operator front-end calls into. Safe to use from any
//! thread while the capture loop is running.
//!
//! Ordering:
//! - add: store first, then index. A rule may briefly be stored but not yet
//!   matching; it is never matching but unstored.
//! - remove: the rule leaves the index together with its enforced keys,
//!   then each released block is lifted, then the store record goes. No
//!   new block can start once the rule is out of the index, and a block
//!   already in flight is lifted by the engine when it lands.

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::sync::Arc;

use grindvakt_core::{
    BlockEvent, BlockKey, CoreError, Direction, EventKind, NewRule, Rule, RuleKind, RuleStore,
};
use grindvakt_detection::{canonical_value, MatchingEngine};
use grindvakt_telemetry::EventLogger;
use opentelemetry::KeyValue;
use tracing::{info, warn};
use tracing_attributes::instrument;

use crate::error::EngineError;

/// Counts derived from recorded block events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockStatistics {
    pub total: usize,
    pub by_direction: BTreeMap<Direction, usize>,
    pub top: Vec<(String, usize)>,
}

pub struct ControlFacade {
    engine: Arc<MatchingEngine>,
    store: Arc<dyn RuleStore>,
}

impl ControlFacade {
    pub fn new(engine: Arc<MatchingEngine>, store: Arc<dyn RuleStore>) -> Self {
        Self { engine, store }
    }

    /// Adds an IP rule for `value`.
    pub fn add_rule(&self, value: &str, direction: Direction) -> Result<Rule, EngineError> {
        self.add(NewRule::ip_block(value, direction))
    }

    /// Persists `rule` and then indexes it.
    ///
    /// A value the store already holds keeps its stored id, but the new
    /// direction and enabled flag replace the live entry.
    #[instrument(skip(self))]
    pub fn add(&self, rule: NewRule) -> Result<Rule, EngineError> {
        let rule = rule.normalized()?;
        if rule.kind == RuleKind::IpBlock && rule.value.parse::<IpAddr>().is_err() {
            return Err(EngineError::InvalidTarget(rule.value));
        }

        let live = match self.store.add_rule(rule.clone()) {
            Ok(stored) => stored,
            Err(CoreError::DuplicateRule(value)) => {
                let existing = self
                    .store
                    .find_by_value(&value)?
                    .ok_or_else(|| CoreError::Store(format!("{value} vanished from store")))?;
                info!("Rule for {value} already stored as {}", existing.id);
                Rule::from_new(existing.id, rule)
            }
            Err(e) => return Err(e.into()),
        };

        self.engine.add_rule(live.clone());
        self.audit(
            BlockEvent::new(
                EventKind::RuleAdded,
                Some(live.direction),
                format!("Added {} rule for {}", live.kind, live.value),
            )
            .with_target(live.value.clone()),
        );
        info!("Rule {} added: {} ({})", live.id, live.value, live.direction);
        Ok(live)
    }

    /// Removes the rule for `value`, lifting any blocks it caused.
    ///
    /// Unblocking is best-effort; failures are logged and removal goes on.
    #[instrument(skip(self))]
    pub fn remove_rule(&self, value: &str) -> Result<Option<Rule>, EngineError> {
        let value = canonical_value(value);

        let (indexed, released) = self.engine.take_rule(&value);
        for direction in released {
            self.lift(&value, direction);
        }

        let stored = self.store.find_by_value(&value)?;
        if let Some(rule) = &stored {
            self.store.delete_rule(rule.id)?;
        }

        let removed = stored.or(indexed);
        if let Some(rule) = &removed {
            self.audit(
                BlockEvent::new(
                    EventKind::RuleRemoved,
                    Some(rule.direction),
                    format!("Removed rule for {}", rule.value),
                )
                .with_target(rule.value.clone()),
            );
            info!("Rule {} removed: {}", rule.id, rule.value);
        }
        Ok(removed)
    }

    /// Lifts the block on `value` in `direction` without touching its rule.
    ///
    /// Each observed direction is handled on its own: a pair is forgotten
    /// only once its firewall rule is gone, so a rule that still matches
    /// will block it again on the next packet. Returns the first failure.
    #[instrument(skip(self))]
    pub fn unblock(&self, value: &str, direction: Direction) -> Result<(), EngineError> {
        let value = canonical_value(value);
        let mut failure = None;
        for &observed in direction.observed_pairs() {
            match self.engine.enforcer().unblock(&value, observed) {
                Ok(()) => {
                    self.engine.release(&value, observed);
                    self.audit(BlockEvent::unblocked(&value, observed));
                    EventLogger::log_event(
                        EventKind::IpUnblocked.as_str(),
                        vec![
                            KeyValue::new("target", value.clone()),
                            KeyValue::new("direction", observed.as_str()),
                        ],
                    );
                }
                Err(e) => {
                    warn!("Failed to unblock {observed} traffic for {value}: {e}");
                    if failure.is_none() {
                        failure = Some(e);
                    }
                }
            }
        }
        match failure {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    /// Empties the index, lifts every block it held, then clears the store.
    /// Returns how many rules left the live index.
    #[instrument(skip(self))]
    pub fn clear_rules(&self) -> Result<usize, EngineError> {
        let removed = self.engine.rules().len();
        for BlockKey { value, direction } in self.engine.clear() {
            self.lift(&value, direction);
        }

        self.store.delete_all_rules()?;
        self.audit(BlockEvent::new(
            EventKind::RulesCleared,
            None,
            format!("Cleared {removed} rules"),
        ));
        info!("Cleared {removed} rules");
        Ok(removed)
    }

    pub fn is_enforced(&self, value: &str, direction: Direction) -> bool {
        self.engine.is_enforced(value, direction)
    }

    pub fn enforced(&self) -> Vec<BlockKey> {
        self.engine.enforced()
    }

    pub fn rules(&self) -> Vec<Rule> {
        self.engine.rules()
    }

    pub fn statistics(&self, top: usize) -> Result<BlockStatistics, EngineError> {
        Ok(BlockStatistics {
            total: self.store.total_blocked()?,
            by_direction: self.store.blocked_by_direction()?,
            top: self.store.top_blocked(top)?,
        })
    }

    fn lift(&self, value: &str, direction: Direction) {
        match self.engine.enforcer().unblock(value, direction) {
            Ok(()) => self.audit(BlockEvent::unblocked(value, direction)),
            Err(e) => warn!("Failed to unblock {direction} traffic for {value}: {e}"),
        }
    }

    fn audit(&self, event: BlockEvent) {
        if let Err(e) = self.store.record_block_event(event) {
            warn!("Failed to record audit event: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grindvakt_core::MemoryRuleStore;
    use grindvakt_prevention::{EnforcementError, Enforcer};
    use grindvakt_protocols::{PacketObservation, PacketSink};
    use parking_lot::Mutex;
    use std::collections::HashSet;
    use std::net::Ipv4Addr;
    use std::thread;
    use std::time::Duration;

    /// Keeps the set of installed drop rules the way the firewall would:
    /// deleting one that is not there fails.
    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<(&'static str, String, Direction)>>,
        installed: Mutex<HashSet<(String, Direction)>>,
        block_delay: Duration,
        unblock_delay: Duration,
    }

    impl Recorder {
        fn calls(&self) -> Vec<(&'static str, String, Direction)> {
            self.calls.lock().clone()
        }

        fn installed(&self) -> HashSet<(String, Direction)> {
            self.installed.lock().clone()
        }
    }

    impl Enforcer for Recorder {
        fn block(&self, target: &str, direction: Direction) -> Result<(), EnforcementError> {
            thread::sleep(self.block_delay);
            self.calls
                .lock()
                .push(("block", target.to_string(), direction));
            self.installed.lock().insert((target.to_string(), direction));
            Ok(())
        }

        fn unblock(&self, target: &str, direction: Direction) -> Result<(), EnforcementError> {
            thread::sleep(self.unblock_delay);
            self.calls
                .lock()
                .push(("unblock", target.to_string(), direction));
            if self.installed.lock().remove(&(target.to_string(), direction)) {
                Ok(())
            } else {
                Err(EnforcementError::CommandFailed {
                    command: format!("iptables -D ... {target} -j DROP"),
                    code: Some(1),
                    stderr: "Bad rule (does a matching rule exist in that chain?)".into(),
                })
            }
        }
    }

    fn setup_with(
        enforcer: Recorder,
    ) -> (ControlFacade, Arc<MatchingEngine>, Arc<Recorder>, Arc<MemoryRuleStore>) {
        let enforcer = Arc::new(enforcer);
        let store = Arc::new(MemoryRuleStore::new());
        let engine = Arc::new(MatchingEngine::new(
            Vec::new(),
            enforcer.clone(),
            store.clone(),
        ));
        let facade = ControlFacade::new(engine.clone(), store.clone());
        (facade, engine, enforcer, store)
    }

    fn setup() -> (ControlFacade, Arc<MatchingEngine>, Arc<Recorder>, Arc<MemoryRuleStore>) {
        setup_with(Recorder::default())
    }

    fn outbound(dst: [u8; 4]) -> PacketObservation {
        PacketObservation::new(Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::from(dst))
    }

    fn inbound(src: [u8; 4]) -> PacketObservation {
        PacketObservation::new(Ipv4Addr::from(src), Ipv4Addr::new(10, 0, 0, 1))
    }

    const TARGET: [u8; 4] = [203, 0, 113, 5];

    #[test]
    fn add_stores_then_indexes() {
        let (facade, engine, _, store) = setup();
        let rule = facade.add_rule("203.0.113.5", Direction::Outgoing).unwrap();

        assert_eq!(rule.id, 1);
        assert_eq!(store.rules(), vec![rule.clone()]);
        assert_eq!(engine.rule("203.0.113.5"), Some(rule));
    }

    #[test]
    fn duplicate_add_replaces_live_state_only() {
        let (facade, engine, _, store) = setup();
        facade.add_rule("203.0.113.5", Direction::Outgoing).unwrap();
        let again = facade.add_rule("203.0.113.5", Direction::Both).unwrap();

        assert_eq!(again.id, 1);
        assert_eq!(engine.rule("203.0.113.5").unwrap().direction, Direction::Both);
        assert_eq!(store.rules().len(), 1);
    }

    #[test]
    fn rejects_non_ip_values() {
        let (facade, engine, _, _) = setup();
        assert!(matches!(
            facade.add_rule("not an ip", Direction::Incoming),
            Err(EngineError::InvalidTarget(_))
        ));
        assert!(matches!(
            facade.add_rule("   ", Direction::Incoming),
            Err(EngineError::Store(CoreError::EmptyValue))
        ));
        assert!(engine.rules().is_empty());
    }

    #[test]
    fn domain_rules_are_stored_but_not_matched() {
        let (facade, engine, _, store) = setup();
        let rule = facade
            .add(NewRule {
                kind: RuleKind::DomainBlock,
                value: "example.com".into(),
                direction: Direction::Both,
                enabled: true,
            })
            .unwrap();
        assert_eq!(store.rules(), vec![rule]);
        assert!(engine.rules().is_empty());
    }

    #[test]
    fn seeded_ipv6_spelling_can_be_removed() {
        let enforcer = Arc::new(Recorder::default());
        let store = Arc::new(
            MemoryRuleStore::with_rules([NewRule::ip_block("2001:DB8::1", Direction::Both)])
                .unwrap(),
        );
        let engine = Arc::new(MatchingEngine::new(
            store.load_active_rules().unwrap(),
            enforcer,
            store.clone(),
        ));
        let facade = ControlFacade::new(engine.clone(), store.clone());

        let removed = facade.remove_rule("2001:DB8::1").unwrap();
        assert_eq!(removed.map(|r| r.id), Some(1));
        assert!(store.rules().is_empty());
        assert!(engine.rules().is_empty());

        let again = facade.add_rule("2001:db8::1", Direction::Incoming).unwrap();
        assert_eq!(store.rules(), vec![again]);
    }

    #[test]
    fn remove_unblocks_enforced_direction_once() {
        let (facade, engine, enforcer, store) = setup();
        facade.add_rule("203.0.113.5", Direction::Outgoing).unwrap();
        engine.on_packet(&outbound(TARGET));
        engine.on_packet(&outbound(TARGET));

        let removed = facade.remove_rule("203.0.113.5").unwrap();
        assert_eq!(removed.map(|r| r.id), Some(1));
        assert_eq!(
            enforcer.calls(),
            vec![
                ("block", "203.0.113.5".to_string(), Direction::Outgoing),
                ("unblock", "203.0.113.5".to_string(), Direction::Outgoing),
            ]
        );
        assert!(store.rules().is_empty());
        assert!(engine.rule("203.0.113.5").is_none());
        assert!(!facade.is_enforced("203.0.113.5", Direction::Outgoing));
    }

    #[test]
    fn packet_during_a_slow_remove_leaves_no_block_behind() {
        let (facade, engine, enforcer, _) = setup_with(Recorder {
            unblock_delay: Duration::from_millis(200),
            ..Recorder::default()
        });
        facade.add_rule("203.0.113.5", Direction::Both).unwrap();
        engine.on_packet(&inbound(TARGET));
        assert_eq!(enforcer.installed().len(), 1);

        thread::scope(|scope| {
            let remover = scope.spawn(|| facade.remove_rule("203.0.113.5"));
            thread::sleep(Duration::from_millis(50));
            engine.on_packet(&outbound(TARGET));
            remover.join().unwrap().unwrap();
        });

        assert!(enforcer.installed().is_empty(), "{:?}", enforcer.calls());
        assert!(engine.rule("203.0.113.5").is_none());
        assert!(facade.enforced().is_empty());
    }

    #[test]
    fn block_landing_during_remove_is_lifted() {
        let (facade, engine, enforcer, _) = setup_with(Recorder {
            block_delay: Duration::from_millis(200),
            ..Recorder::default()
        });
        facade.add_rule("203.0.113.5", Direction::Outgoing).unwrap();

        thread::scope(|scope| {
            let matcher = scope.spawn(|| engine.on_packet(&outbound(TARGET)));
            thread::sleep(Duration::from_millis(50));
            facade.remove_rule("203.0.113.5").unwrap();
            matcher.join().unwrap();
        });

        assert!(enforcer.installed().is_empty(), "{:?}", enforcer.calls());
        assert!(facade.enforced().is_empty());
    }

    #[test]
    fn removing_an_unknown_value_is_a_no_op() {
        let (facade, _, enforcer, _) = setup();
        assert_eq!(facade.remove_rule("192.0.2.9").unwrap(), None);
        assert!(enforcer.calls().is_empty());
    }

    #[test]
    fn manual_unblock_releases_the_pair() {
        let (facade, engine, enforcer, _) = setup();
        facade.add_rule("203.0.113.5", Direction::Outgoing).unwrap();
        engine.on_packet(&outbound(TARGET));
        assert!(facade.is_enforced("203.0.113.5", Direction::Outgoing));

        facade.unblock("203.0.113.5", Direction::Outgoing).unwrap();
        assert!(facade.enforced().is_empty());

        // Rule is still live, so the next packet blocks again.
        engine.on_packet(&outbound(TARGET));
        assert_eq!(enforcer.calls().len(), 3);
    }

    #[test]
    fn unblock_both_releases_the_direction_that_was_lifted() {
        let (facade, engine, enforcer, _) = setup();
        facade.add_rule("203.0.113.5", Direction::Both).unwrap();
        engine.on_packet(&outbound(TARGET));

        let result = facade.unblock("203.0.113.5", Direction::Both);
        assert!(matches!(result, Err(EngineError::Enforcement(_))));
        assert!(!facade.is_enforced("203.0.113.5", Direction::Outgoing));
        assert!(enforcer.installed().is_empty());

        engine.on_packet(&outbound(TARGET));
        assert_eq!(
            enforcer.installed(),
            HashSet::from([("203.0.113.5".to_string(), Direction::Outgoing)])
        );
    }

    #[test]
    fn clear_lifts_everything() {
        let (facade, engine, enforcer, store) = setup();
        facade.add_rule("203.0.113.5", Direction::Outgoing).unwrap();
        facade.add_rule("198.51.100.7", Direction::Outgoing).unwrap();
        engine.on_packet(&outbound(TARGET));
        engine.on_packet(&outbound([198, 51, 100, 7]));

        assert_eq!(facade.clear_rules().unwrap(), 2);
        let unblocks = enforcer
            .calls()
            .into_iter()
            .filter(|(action, _, _)| *action == "unblock")
            .count();
        assert_eq!(unblocks, 2);
        assert!(enforcer.installed().is_empty());
        assert!(facade.rules().is_empty());
        assert!(facade.enforced().is_empty());
        assert!(store.rules().is_empty());
    }

    #[test]
    fn statistics_come_from_recorded_blocks() {
        let (facade, engine, _, _) = setup();
        facade.add_rule("203.0.113.5", Direction::Both).unwrap();
        engine.on_packet(&outbound(TARGET));
        engine.on_packet(&inbound(TARGET));

        let stats = facade.statistics(5).unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.by_direction.get(&Direction::Incoming), Some(&1));
        assert_eq!(stats.by_direction.get(&Direction::Outgoing), Some(&1));
        assert_eq!(stats.top, vec![("203.0.113.5".to_string(), 2)]);
    }
}
