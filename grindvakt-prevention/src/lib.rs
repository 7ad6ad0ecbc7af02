//! # grindvakt Prevention
//!
//! Turns (target, direction) pairs into OS packet-filter state by running
//! the privileged firewall command for the target's address family.

pub mod firewall;

pub use firewall::{
    Action, CommandOutput, CommandRunner, Enforcer, EnforcementError, Firewall, FirewallCommand,
    FirewallSettings, SystemRunner,
};
