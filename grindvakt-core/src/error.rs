use thiserror::Error;

use crate::rule::RuleId;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error("Invalid direction: {0:?} (expected Incoming, Outgoing or Both)")]
    InvalidDirection(String),

    #[error("Invalid rule kind: {0:?} (expected ip_block or domain_block)")]
    InvalidKind(String),

    #[error("Rule value must not be empty")]
    EmptyValue,

    #[error("A rule for {0:?} already exists")]
    DuplicateRule(String),

    #[error("No rule with id {0}")]
    UnknownRule(RuleId),

    #[error("Rule store error: {0}")]
    Store(String),
}
