//! ## grindvakt-detection::ledger
//! De-duplication set of (target, direction) pairs with an issued block.

use std::collections::HashSet;

use grindvakt_core::{BlockKey, Direction};
use parking_lot::Mutex;

#[derive(Debug, Default)]
pub struct BlockLedger {
    keys: Mutex<HashSet<BlockKey>>,
}

impl BlockLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `key`. Only the caller that gets `true` may enforce it.
    pub fn mark(&self, key: BlockKey) -> bool {
        self.keys.lock().insert(key)
    }

    pub fn release(&self, key: &BlockKey) -> bool {
        self.keys.lock().remove(key)
    }

    /// Drops both direction-scoped keys of `value`, returning the
    /// directions that were present.
    pub fn release_value(&self, value: &str) -> Vec<Direction> {
        let mut keys = self.keys.lock();
        Direction::OBSERVABLE
            .into_iter()
            .filter(|&direction| keys.remove(&BlockKey::new(value, direction)))
            .collect()
    }

    pub fn contains(&self, key: &BlockKey) -> bool {
        self.keys.lock().contains(key)
    }

    /// Sorted copy of every key.
    pub fn snapshot(&self) -> Vec<BlockKey> {
        let mut keys: Vec<BlockKey> = self.keys.lock().iter().cloned().collect();
        keys.sort();
        keys
    }

    pub fn clear(&self) -> Vec<BlockKey> {
        let mut keys: Vec<BlockKey> = self.keys.lock().drain().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.keys.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mark_is_novel_once() {
        let ledger = BlockLedger::new();
        let key = BlockKey::new("203.0.113.5", Direction::Incoming);
        assert!(ledger.mark(key.clone()));
        assert!(!ledger.mark(key.clone()));
        assert!(ledger.contains(&key));
    }

    #[test]
    fn release_value_clears_both_directions_only() {
        let ledger = BlockLedger::new();
        ledger.mark(BlockKey::new("203.0.113.5", Direction::Incoming));
        ledger.mark(BlockKey::new("203.0.113.5", Direction::Outgoing));
        ledger.mark(BlockKey::new("198.51.100.7", Direction::Outgoing));

        let released = ledger.release_value("203.0.113.5");
        assert_eq!(released, vec![Direction::Incoming, Direction::Outgoing]);
        assert_eq!(
            ledger.snapshot(),
            vec![BlockKey::new("198.51.100.7", Direction::Outgoing)]
        );
    }
}
