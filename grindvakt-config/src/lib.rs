//! # grindvakt Configuration
//!
//! Layered configuration for the enforcement point:
//!
//! 1. built-in defaults
//! 2. `config/grindvakt.yaml`, if present
//! 3. `config/<GRINDVAKT_ENV>.yaml`, if present (`GRINDVAKT_ENV` defaults to `production`)
//! 4. `GRINDVAKT_*` environment variables, `__` separating nested keys
//!
//! Every load is validated before it is returned.

#![warn(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use validator::Validate;

mod capture;
mod error;
mod prevention;
mod rules;
mod telemetry;
mod validation;

pub use capture::CaptureConfig;
pub use error::ConfigError;
pub use prevention::{FirewallConfig, PreventionConfig};
pub use rules::RuleConfig;
pub use telemetry::{MetricsConfig, TelemetryConfig};

const BASE_FILE: &str = "config/grindvakt.yaml";
const ENV_PREFIX: &str = "GRINDVAKT_";

#[derive(Debug, Serialize, Deserialize, Validate, Default, Clone, PartialEq, Eq)]
pub struct GrindvaktConfig {
    #[validate(nested)]
    #[serde(default)]
    pub capture: CaptureConfig,

    #[validate(nested)]
    #[serde(default)]
    pub prevention: PreventionConfig,

    #[validate(nested)]
    #[serde(default)]
    pub telemetry: TelemetryConfig,

    /// Rules seeded into the rule store at startup.
    #[validate(custom(function = validation::validate_rules))]
    #[serde(default)]
    pub rules: Vec<RuleConfig>,
}

impl GrindvaktConfig {
    /// Loads defaults, the base and environment files, then the environment.
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(GrindvaktConfig::default()));

        if Path::new(BASE_FILE).exists() {
            figment = figment.merge(Yaml::file(BASE_FILE));
        } else {
            info!("{BASE_FILE} not found, using default configuration");
        }

        let env = std::env::var("GRINDVAKT_ENV").unwrap_or_else(|_| "production".into());
        let env_file = format!("config/{env}.yaml");
        if Path::new(&env_file).exists() {
            debug!("Applying overrides from {env_file}");
            figment = figment.merge(Yaml::file(env_file));
        }

        Self::finish(figment)
    }

    /// Loads an explicit file over the defaults, then the environment.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let figment = Figment::from(Serialized::defaults(GrindvaktConfig::default()))
            .merge(Yaml::file(path));
        Self::finish(figment)
    }

    fn finish(figment: Figment) -> Result<Self, ConfigError> {
        let config: Self = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;
    use grindvakt_core::{Direction, RuleKind};

    #[test]
    fn full_config_validation() {
        let config = GrindvaktConfig::default();
        config.validate().expect("Default config should validate");
        assert_eq!(config.capture.snaplen, 65_536);
        assert_eq!(config.prevention.firewall.inbound_chain, "INPUT");
        assert!(!config.prevention.retry_failed);
    }

    #[test]
    fn environment_override() {
        Jail::expect_with(|jail| {
            jail.set_env("GRINDVAKT_CAPTURE__READ_TIMEOUT_MS", "2500");
            jail.set_env("GRINDVAKT_PREVENTION__FIREWALL__USE_SUDO", "false");
            let config = GrindvaktConfig::load().unwrap();
            assert_eq!(config.capture.read_timeout_ms, 2500);
            assert!(!config.prevention.firewall.use_sudo);
            Ok(())
        });
    }

    #[test]
    fn layered_files() {
        Jail::expect_with(|jail| {
            jail.create_dir("config")?;
            jail.create_file(
                "config/grindvakt.yaml",
                r#"
capture:
  interface: eth0
  snaplen: 128KiB
rules:
  - value: 203.0.113.5
    direction: incoming
  - value: example.com
    kind: domain_block
"#,
            )?;
            jail.create_file("config/staging.yaml", "telemetry:\n  log_level: debug\n")?;
            jail.set_env("GRINDVAKT_ENV", "staging");

            let config = GrindvaktConfig::load().unwrap();
            assert_eq!(config.capture.interface.as_deref(), Some("eth0"));
            assert_eq!(config.capture.snaplen, 131_072);
            assert_eq!(config.telemetry.log_level, "debug");
            assert_eq!(config.rules.len(), 2);
            assert_eq!(config.rules[0].direction, Direction::Incoming);
            assert_eq!(config.rules[1].kind, RuleKind::DomainBlock);
            assert_eq!(config.rules[1].direction, Direction::Outgoing);
            Ok(())
        });
    }

    #[test]
    fn rejects_out_of_range_timeouts() {
        Jail::expect_with(|jail| {
            jail.create_file("bad.yaml", "capture:\n  read_timeout_ms: 50\n")?;
            let err = GrindvaktConfig::load_from_path("bad.yaml").unwrap_err();
            assert!(matches!(err, ConfigError::Validation(_)));
            assert!(err.to_string().contains("capture.read_timeout_ms"));
            Ok(())
        });
    }

    #[test]
    fn rejects_non_ip_rules() {
        Jail::expect_with(|jail| {
            jail.create_file("rules.yaml", "rules:\n  - value: not-an-address\n")?;
            let err = GrindvaktConfig::load_from_path("rules.yaml").unwrap_err();
            assert!(err.to_string().contains("invalid_ip_rule"));
            Ok(())
        });
    }

    #[test]
    fn missing_file_is_reported() {
        let err = GrindvaktConfig::load_from_path("/nonexistent/grindvakt.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound(_)));
    }
}
