//! Enforcement configuration.

use serde::{Deserialize, Serialize};
use validator::{self, Validate};

use crate::validation;

#[derive(Default, Debug, Serialize, Deserialize, Validate, Clone, PartialEq, Eq)]
pub struct PreventionConfig {
    #[validate(nested)]
    #[serde(default)]
    pub firewall: FirewallConfig,

    /// Release a (target, direction) pair when its block fails so a later
    /// packet tries again. Off keeps the pair marked until rule removal.
    #[serde(default)]
    pub retry_failed: bool,
}

/// Firewall commands and chains.
#[derive(Debug, Serialize, Deserialize, Validate, Clone, PartialEq, Eq)]
pub struct FirewallConfig {
    #[validate(custom(function = validation::validate_command))]
    #[serde(default = "default_ipv4_command")]
    pub ipv4_command: String,

    #[validate(custom(function = validation::validate_command))]
    #[serde(default = "default_ipv6_command")]
    pub ipv6_command: String,

    #[serde(default = "default_use_sudo")]
    pub use_sudo: bool,

    #[validate(custom(function = validation::validate_command))]
    #[serde(default = "default_sudo_command")]
    pub sudo_command: String,

    #[validate(custom(function = validation::validate_chain))]
    #[serde(default = "default_inbound_chain")]
    pub inbound_chain: String,

    #[validate(custom(function = validation::validate_chain))]
    #[serde(default = "default_outbound_chain")]
    pub outbound_chain: String,
}

fn default_ipv4_command() -> String {
    "iptables".into()
}
fn default_ipv6_command() -> String {
    "ip6tables".into()
}
fn default_use_sudo() -> bool {
    true
}
fn default_sudo_command() -> String {
    "sudo".into()
}
fn default_inbound_chain() -> String {
    "INPUT".into()
}
fn default_outbound_chain() -> String {
    "OUTPUT".into()
}

impl Default for FirewallConfig {
    fn default() -> Self {
        Self {
            ipv4_command: default_ipv4_command(),
            ipv6_command: default_ipv6_command(),
            use_sudo: default_use_sudo(),
            sudo_command: default_sudo_command(),
            inbound_chain: default_inbound_chain(),
            outbound_chain: default_outbound_chain(),
        }
    }
}
