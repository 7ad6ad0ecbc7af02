//! # grindvakt-core
//!
//! Shared vocabulary for the grindvakt enforcement point: block rules,
//! traffic directions, audit events and the rule store seam.
//!
//! ### Key Submodules:
//! - `rule`: `Rule`, `RuleKind`, `Direction` and the `BlockKey` used for de-duplication
//! - `events`: audit records handed to the rule store
//! - `store`: `RuleStore` trait plus an in-memory implementation
//! - `error`: error taxonomy shared by the crates above

pub mod error;
pub mod events;
pub mod rule;
pub mod store;

pub mod prelude {
    pub use crate::error::*;
    pub use crate::events::*;
    pub use crate::rule::*;
    pub use crate::store::*;
}

pub use error::CoreError;
pub use events::{BlockEvent, EventKind};
pub use rule::{canonical_value, BlockKey, Direction, NewRule, Rule, RuleId, RuleKind};
pub use store::{MemoryRuleStore, RuleStore};
