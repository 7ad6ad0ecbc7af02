//! Custom validation functions shared by the configuration sections.

use std::net::IpAddr;
use std::sync::LazyLock;

use grindvakt_core::{canonical_value, RuleKind};
use regex::Regex;
use validator::ValidationError;

use crate::rules::RuleConfig;

static INTERFACE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new("^[A-Za-z0-9_][A-Za-z0-9_.:-]*$").ok());

static CHAIN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new("^[A-Za-z0-9_-]+$").ok());

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

fn is_match(re: &LazyLock<Option<Regex>>, value: &str) -> Result<bool, ValidationError> {
    re.as_ref()
        .map(|re| re.is_match(value))
        .ok_or_else(|| ValidationError::new("invalid_regex"))
}

/// Validate that an interface name follows Linux naming conventions
/// (at most 15 bytes, no slashes or whitespace).
pub fn validate_interface(name: &str) -> Result<(), ValidationError> {
    if name.len() <= 15 && is_match(&INTERFACE, name)? {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_interface"))
    }
}

/// iptables caps user chain names at 28 characters.
pub fn validate_chain(name: &str) -> Result<(), ValidationError> {
    if name.len() <= 28 && is_match(&CHAIN, name)? {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_chain"))
    }
}

/// A program name or path, run without a shell.
pub fn validate_command(command: &str) -> Result<(), ValidationError> {
    if command.is_empty() || command.chars().any(char::is_whitespace) {
        return Err(ValidationError::new("invalid_command"));
    }
    Ok(())
}

pub fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    if LOG_LEVELS.contains(&level.to_ascii_lowercase().as_str()) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_log_level"))
    }
}

/// IP rules must carry a literal address; values must be unique once
/// canonicalized.
pub fn validate_rules(rules: &[RuleConfig]) -> Result<(), ValidationError> {
    let mut seen = std::collections::HashSet::new();
    for rule in rules {
        let value = rule.value.trim();
        if value.is_empty() {
            return Err(ValidationError::new("empty_rule_value"));
        }
        if rule.kind == RuleKind::IpBlock && value.parse::<IpAddr>().is_err() {
            let mut err = ValidationError::new("invalid_ip_rule");
            err.add_param("value".into(), &value);
            return Err(err);
        }
        if !seen.insert(canonical_value(value)) {
            let mut err = ValidationError::new("duplicate_rule");
            err.add_param("value".into(), &value);
            return Err(err);
        }
    }
    Ok(())
}
