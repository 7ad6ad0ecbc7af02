//! ## grindvakt-core::rule
//! Block rules and the direction vocabulary used to match them.
//!
//! A `Rule` is a plain immutable record. Updates are expressed by replacing
//! the whole rule in whatever index holds it.

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// The form an address takes when rendered from a captured packet.
///
/// IPv6 literals have many spellings (`2001:DB8:0::1` vs `2001:db8::1`);
/// only the canonical one can ever match. Non-IP values are only trimmed.
pub fn canonical_value(value: &str) -> String {
    let trimmed = value.trim();
    match trimmed.parse::<IpAddr>() {
        Ok(addr) => addr.to_string(),
        Err(_) => trimmed.to_string(),
    }
}

/// Opaque identifier assigned by the rule store.
pub type RuleId = u64;

/// What a rule targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    /// Literal IPv4 or IPv6 address.
    #[serde(alias = "IP_BLOCK")]
    IpBlock,
    /// Domain name. Stored, but never indexed by the packet matcher.
    #[serde(alias = "DOMAIN_BLOCK")]
    DomainBlock,
}

impl RuleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleKind::IpBlock => "IP_BLOCK",
            RuleKind::DomainBlock => "DOMAIN_BLOCK",
        }
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RuleKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ip_block" | "ip" => Ok(RuleKind::IpBlock),
            "domain_block" | "domain" => Ok(RuleKind::DomainBlock),
            _ => Err(CoreError::InvalidKind(s.to_string())),
        }
    }
}

/// Relationship of an address to this host.
///
/// An address seen as a packet's source is `Incoming`; as its destination,
/// `Outgoing`. Rules may additionally ask for `Both`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum Direction {
    #[serde(alias = "incoming")]
    Incoming,
    #[default]
    #[serde(alias = "outgoing")]
    Outgoing,
    #[serde(alias = "both")]
    Both,
}

impl Direction {
    /// The two directions a single packet can be observed in.
    pub const OBSERVABLE: [Direction; 2] = [Direction::Incoming, Direction::Outgoing];

    /// Whether a rule with this direction fires for traffic observed in `observed`.
    #[inline]
    pub fn matches(self, observed: Direction) -> bool {
        self == Direction::Both || self == observed
    }

    /// Observable directions covered by this rule direction.
    pub fn observed_pairs(self) -> &'static [Direction] {
        match self {
            Direction::Incoming => &[Direction::Incoming],
            Direction::Outgoing => &[Direction::Outgoing],
            Direction::Both => &Self::OBSERVABLE,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Incoming => "Incoming",
            Direction::Outgoing => "Outgoing",
            Direction::Both => "Both",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "incoming" | "in" | "inbound" => Ok(Direction::Incoming),
            "outgoing" | "out" | "outbound" => Ok(Direction::Outgoing),
            "both" => Ok(Direction::Both),
            _ => Err(CoreError::InvalidDirection(s.to_string())),
        }
    }
}

/// A block rule as held by the store and the matching engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub id: RuleId,
    pub kind: RuleKind,
    /// Literal IP address or domain name, depending on `kind`.
    pub value: String,
    pub direction: Direction,
    pub enabled: bool,
}

impl Rule {
    pub fn new(
        id: RuleId,
        kind: RuleKind,
        value: impl Into<String>,
        direction: Direction,
        enabled: bool,
    ) -> Self {
        Self {
            id,
            kind,
            value: value.into(),
            direction,
            enabled,
        }
    }

    /// Enabled IP rule, the common case.
    pub fn ip_block(id: RuleId, value: impl Into<String>, direction: Direction) -> Self {
        Self::new(id, RuleKind::IpBlock, value, direction, true)
    }

    #[inline]
    pub fn is_ip_block(&self) -> bool {
        self.kind == RuleKind::IpBlock
    }

    /// Rule with the store-assigned id attached.
    pub fn from_new(id: RuleId, new: NewRule) -> Self {
        Self::new(id, new.kind, new.value, new.direction, new.enabled)
    }
}

/// A rule that has not been through the store yet and so has no id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRule {
    #[serde(default = "default_kind")]
    pub kind: RuleKind,
    pub value: String,
    #[serde(default)]
    pub direction: Direction,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_kind() -> RuleKind {
    RuleKind::IpBlock
}

fn default_enabled() -> bool {
    true
}

impl NewRule {
    pub fn ip_block(value: impl Into<String>, direction: Direction) -> Self {
        Self {
            kind: RuleKind::IpBlock,
            value: value.into(),
            direction,
            enabled: true,
        }
    }

    /// Trims the value, rejects empty targets and puts IP literals in
    /// canonical form.
    pub fn normalized(mut self) -> Result<Self, CoreError> {
        let value = match self.kind {
            RuleKind::IpBlock => canonical_value(&self.value),
            RuleKind::DomainBlock => self.value.trim().to_string(),
        };
        if value.is_empty() {
            return Err(CoreError::EmptyValue);
        }
        self.value = value;
        Ok(self)
    }
}

/// Composite de-duplication key: one enforcement per (target, direction).
///
/// `direction` is always `Incoming` or `Outgoing` here; `Both` is never
/// observed on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockKey {
    pub value: String,
    pub direction: Direction,
}

impl BlockKey {
    pub fn new(value: impl Into<String>, direction: Direction) -> Self {
        Self {
            value: value.into(),
            direction,
        }
    }
}

impl fmt::Display for BlockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.value, self.direction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_matches_either_observed_direction() {
        assert!(Direction::Both.matches(Direction::Incoming));
        assert!(Direction::Both.matches(Direction::Outgoing));
        assert!(Direction::Incoming.matches(Direction::Incoming));
        assert!(!Direction::Incoming.matches(Direction::Outgoing));
        assert!(!Direction::Outgoing.matches(Direction::Incoming));
    }

    #[test]
    fn observed_pairs_expand_both() {
        assert_eq!(Direction::Incoming.observed_pairs(), &[Direction::Incoming]);
        assert_eq!(
            Direction::Both.observed_pairs(),
            &[Direction::Incoming, Direction::Outgoing]
        );
    }

    #[test]
    fn direction_parses_case_insensitively() {
        assert_eq!("incoming".parse::<Direction>().unwrap(), Direction::Incoming);
        assert_eq!("OUT".parse::<Direction>().unwrap(), Direction::Outgoing);
        assert_eq!(" Both ".parse::<Direction>().unwrap(), Direction::Both);
        assert!(matches!(
            "sideways".parse::<Direction>(),
            Err(CoreError::InvalidDirection(_))
        ));
    }

    #[test]
    fn block_key_display() {
        let key = BlockKey::new("203.0.113.5", Direction::Incoming);
        assert_eq!(key.to_string(), "203.0.113.5:Incoming");
    }

    #[test]
    fn normalized_rejects_blank_values() {
        let rule = NewRule::ip_block("  ", Direction::Both);
        assert_eq!(rule.normalized(), Err(CoreError::EmptyValue));

        let rule = NewRule::ip_block(" 10.0.0.1 ", Direction::Both)
            .normalized()
            .unwrap();
        assert_eq!(rule.value, "10.0.0.1");
    }

    #[test]
    fn normalized_canonicalizes_ip_literals() {
        let rule = NewRule::ip_block("2001:DB8:0::1", Direction::Incoming)
            .normalized()
            .unwrap();
        assert_eq!(rule.value, "2001:db8::1");

        let domain = NewRule {
            kind: RuleKind::DomainBlock,
            value: " Example.COM ".into(),
            direction: Direction::Both,
            enabled: true,
        }
        .normalized()
        .unwrap();
        assert_eq!(domain.value, "Example.COM");
    }

    #[test]
    fn canonical_value_keeps_non_ip_values() {
        assert_eq!(canonical_value(" example.com "), "example.com");
        assert_eq!(canonical_value("10.0.0.1"), "10.0.0.1");
        assert_eq!(canonical_value("::FFFF:192.0.2.1"), "::ffff:192.0.2.1");
    }
}
