//! ## grindvakt-core::store
//! Rule store seam.
//!
//! The durable store lives outside this workspace. It hands the engine an
//! initial rule set and receives audit events; `MemoryRuleStore` is the
//! in-process implementation used by the CLI and the tests.

use std::collections::{BTreeMap, HashMap};

use parking_lot::Mutex;
use tracing::debug;

use crate::error::CoreError;
use crate::events::{BlockEvent, EventKind};
use crate::rule::{canonical_value, Direction, NewRule, Rule, RuleId};

pub trait RuleStore: Send + Sync {
    /// Enabled rules, in id order.
    fn load_active_rules(&self) -> Result<Vec<Rule>, CoreError>;

    /// Persists a rule and assigns its id. Values are unique per store.
    fn add_rule(&self, rule: NewRule) -> Result<Rule, CoreError>;

    fn find_by_value(&self, value: &str) -> Result<Option<Rule>, CoreError>;

    fn delete_rule(&self, id: RuleId) -> Result<(), CoreError>;

    fn delete_all_rules(&self) -> Result<(), CoreError>;

    fn record_block_event(&self, event: BlockEvent) -> Result<(), CoreError>;

    /// Number of `IP_BLOCKED` events recorded.
    fn total_blocked(&self) -> Result<usize, CoreError>;

    fn blocked_by_direction(&self) -> Result<BTreeMap<Direction, usize>, CoreError>;

    /// Most frequently blocked targets, highest count first.
    fn top_blocked(&self, limit: usize) -> Result<Vec<(String, usize)>, CoreError>;
}

#[derive(Debug)]
struct StoreState {
    rules: BTreeMap<RuleId, Rule>,
    next_id: RuleId,
    events: Vec<BlockEvent>,
}

impl Default for StoreState {
    fn default() -> Self {
        Self {
            rules: BTreeMap::new(),
            next_id: 1,
            events: Vec::new(),
        }
    }
}

/// Rule store kept entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryRuleStore {
    state: Mutex<StoreState>,
}

impl MemoryRuleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the store. Duplicate values after the first are ignored, the
    /// same way the durable store treats a repeated insert.
    pub fn with_rules<I>(rules: I) -> Result<Self, CoreError>
    where
        I: IntoIterator<Item = NewRule>,
    {
        let store = Self::new();
        for rule in rules {
            match store.add_rule(rule) {
                Ok(_) | Err(CoreError::DuplicateRule(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(store)
    }

    /// Every rule, enabled or not.
    pub fn rules(&self) -> Vec<Rule> {
        self.state.lock().rules.values().cloned().collect()
    }

    pub fn events(&self) -> Vec<BlockEvent> {
        self.state.lock().events.clone()
    }
}

impl RuleStore for MemoryRuleStore {
    fn load_active_rules(&self) -> Result<Vec<Rule>, CoreError> {
        Ok(self
            .state
            .lock()
            .rules
            .values()
            .filter(|r| r.enabled)
            .cloned()
            .collect())
    }

    fn add_rule(&self, rule: NewRule) -> Result<Rule, CoreError> {
        let rule = rule.normalized()?;
        let mut state = self.state.lock();
        if state.rules.values().any(|r| r.value == rule.value) {
            return Err(CoreError::DuplicateRule(rule.value));
        }
        let id = state.next_id;
        state.next_id += 1;
        let rule = Rule::from_new(id, rule);
        debug!(id, value = %rule.value, "Rule stored");
        state.rules.insert(id, rule.clone());
        Ok(rule)
    }

    fn find_by_value(&self, value: &str) -> Result<Option<Rule>, CoreError> {
        let value = canonical_value(value);
        Ok(self
            .state
            .lock()
            .rules
            .values()
            .find(|r| r.value == value)
            .cloned())
    }

    fn delete_rule(&self, id: RuleId) -> Result<(), CoreError> {
        match self.state.lock().rules.remove(&id) {
            Some(_) => Ok(()),
            None => Err(CoreError::UnknownRule(id)),
        }
    }

    fn delete_all_rules(&self) -> Result<(), CoreError> {
        let mut state = self.state.lock();
        state.rules.clear();
        state.next_id = 1;
        Ok(())
    }

    fn record_block_event(&self, event: BlockEvent) -> Result<(), CoreError> {
        self.state.lock().events.push(event);
        Ok(())
    }

    fn total_blocked(&self) -> Result<usize, CoreError> {
        Ok(self
            .state
            .lock()
            .events
            .iter()
            .filter(|e| e.kind == EventKind::IpBlocked)
            .count())
    }

    fn blocked_by_direction(&self) -> Result<BTreeMap<Direction, usize>, CoreError> {
        let state = self.state.lock();
        let mut counts = BTreeMap::new();
        for event in state.events.iter().filter(|e| e.kind == EventKind::IpBlocked) {
            if let Some(direction) = event.direction {
                *counts.entry(direction).or_insert(0) += 1;
            }
        }
        Ok(counts)
    }

    fn top_blocked(&self, limit: usize) -> Result<Vec<(String, usize)>, CoreError> {
        let state = self.state.lock();
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for event in state.events.iter().filter(|e| e.kind == EventKind::IpBlocked) {
            if let Some(target) = event.target.as_deref() {
                *counts.entry(target).or_insert(0) += 1;
            }
        }
        let mut top: Vec<(String, usize)> = counts
            .into_iter()
            .map(|(target, count)| (target.to_string(), count))
            .collect();
        // Ties broken by value so the listing is stable.
        top.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        top.truncate(limit);
        Ok(top)
    }
}
