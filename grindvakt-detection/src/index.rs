//! ## grindvakt-detection::index
//! **Live rule index with thread-safe updates**
//!
//! Readers on the capture path take the read lock only long enough to copy
//! out what they need. Nothing slow ever runs under the lock.

use std::collections::HashMap;

pub use grindvakt_core::canonical_value;
use grindvakt_core::Rule;
use parking_lot::RwLock;

/// Target value → rule. Each key equals its rule's own `value`.
#[derive(Debug, Default)]
pub struct RuleIndex {
    rules: RwLock<HashMap<String, Rule>>,
}

impl RuleIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rules<I: IntoIterator<Item = Rule>>(rules: I) -> Self {
        let index = Self::new();
        for rule in rules {
            index.insert(rule);
        }
        index
    }

    /// Inserts or overwrites by value. Returns the replaced rule.
    pub fn insert(&self, mut rule: Rule) -> Option<Rule> {
        rule.value = canonical_value(&rule.value);
        self.rules.write().insert(rule.value.clone(), rule)
    }

    pub fn remove(&self, value: &str) -> Option<Rule> {
        self.rules.write().remove(&canonical_value(value))
    }

    pub fn get(&self, value: &str) -> Option<Rule> {
        self.rules.read().get(&canonical_value(value)).cloned()
    }

    /// Applies `check` to the rule for an already-canonical `value`, under
    /// the read lock.
    #[inline]
    pub fn test<F>(&self, value: &str, check: F) -> bool
    where
        F: FnOnce(&Rule) -> bool,
    {
        self.rules.read().get(value).is_some_and(check)
    }

    /// All rules, ordered by id.
    pub fn snapshot(&self) -> Vec<Rule> {
        let mut rules: Vec<Rule> = self.rules.read().values().cloned().collect();
        rules.sort_by_key(|r| r.id);
        rules
    }

    pub fn clear(&self) -> usize {
        let mut rules = self.rules.write();
        let removed = rules.len();
        rules.clear();
        removed
    }

    pub fn len(&self) -> usize {
        self.rules.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.read().is_empty()
    }
}
