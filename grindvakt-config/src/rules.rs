//! Static rule list seeded into the in-memory rule store at startup.

use grindvakt_core::{Direction, NewRule, RuleKind};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct RuleConfig {
    pub value: String,

    #[serde(default)]
    pub direction: Direction,

    #[serde(default = "default_kind")]
    pub kind: RuleKind,

    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_kind() -> RuleKind {
    RuleKind::IpBlock
}

fn default_enabled() -> bool {
    true
}

impl RuleConfig {
    pub fn ip(value: impl Into<String>, direction: Direction) -> Self {
        Self {
            value: value.into(),
            direction,
            kind: RuleKind::IpBlock,
            enabled: true,
        }
    }
}

impl From<RuleConfig> for NewRule {
    fn from(rule: RuleConfig) -> Self {
        NewRule {
            kind: rule.kind,
            value: rule.value,
            direction: rule.direction,
            enabled: rule.enabled,
        }
    }
}
