//! Audit records handed to the rule store.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::rule::Direction;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    IpBlocked,
    IpUnblocked,
    RuleAdded,
    RuleRemoved,
    RulesCleared,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::IpBlocked => "IP_BLOCKED",
            EventKind::IpUnblocked => "IP_UNBLOCKED",
            EventKind::RuleAdded => "RULE_ADDED",
            EventKind::RuleRemoved => "RULE_REMOVED",
            EventKind::RulesCleared => "RULES_CLEARED",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One audit entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockEvent {
    pub timestamp: DateTime<Utc>,
    pub kind: EventKind,
    pub direction: Option<Direction>,
    /// The rule value the event concerns, if any.
    pub target: Option<String>,
    pub detail: String,
}

impl BlockEvent {
    pub fn new(kind: EventKind, direction: Option<Direction>, detail: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            kind,
            direction,
            target: None,
            detail: detail.into(),
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// Audit record for an enforcement issued by the matching engine.
    pub fn blocked(target: &str, direction: Direction) -> Self {
        let detail = match direction {
            Direction::Incoming => format!("Blocked incoming packet from source IP: {target}"),
            _ => format!("Blocked outgoing packet to destination IP: {target}"),
        };
        Self::new(EventKind::IpBlocked, Some(direction), detail).with_target(target)
    }

    pub fn unblocked(target: &str, direction: Direction) -> Self {
        Self::new(
            EventKind::IpUnblocked,
            Some(direction),
            format!("Unblocked {direction} traffic for IP: {target}"),
        )
        .with_target(target)
    }
}
