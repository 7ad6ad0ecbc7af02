//! # grindvakt Detection
//!
//! Direction-aware matching of packet endpoints against the live rule set.
//!
//! ### Key Submodules:
//! - `index`: the live rule index, keyed by target value
//! - `ledger`: the de-duplication set of enforced (target, direction) pairs
//! - `listener`: per-match log line callback
//! - `matching`: `MatchingEngine`, the `PacketSink` the capture loop feeds

pub mod index;
pub mod ledger;
pub mod listener;
pub mod matching;

pub use index::{canonical_value, RuleIndex};
pub use ledger::BlockLedger;
pub use listener::{BlockListener, TracingListener};
pub use matching::MatchingEngine;
