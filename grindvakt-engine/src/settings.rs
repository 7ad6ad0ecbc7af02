//! Translation from loaded configuration into component settings.

use grindvakt_capture::CaptureOptions;
use grindvakt_config::{CaptureConfig, FirewallConfig};
use grindvakt_prevention::FirewallSettings;

pub fn capture_options(config: &CaptureConfig) -> CaptureOptions {
    let defaults = CaptureOptions::default();
    CaptureOptions {
        interface: config.interface.clone(),
        promiscuous: config.promiscuous,
        snaplen: i32::try_from(config.snaplen).unwrap_or(defaults.snaplen),
        read_timeout: config.read_timeout(),
        shutdown_timeout: config.shutdown_timeout(),
    }
}

pub fn firewall_settings(config: &FirewallConfig) -> FirewallSettings {
    FirewallSettings {
        ipv4_command: config.ipv4_command.clone(),
        ipv6_command: config.ipv6_command.clone(),
        use_sudo: config.use_sudo,
        sudo_command: config.sudo_command.clone(),
        inbound_chain: config.inbound_chain.clone(),
        outbound_chain: config.outbound_chain.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn defaults_line_up() {
        let options = capture_options(&CaptureConfig::default());
        assert_eq!(options.snaplen, 65_536);
        assert!(options.promiscuous);
        assert_eq!(options.read_timeout, Duration::from_secs(1));
        assert_eq!(options.shutdown_timeout, Duration::from_secs(1));

        assert_eq!(
            firewall_settings(&FirewallConfig::default()),
            FirewallSettings::default()
        );
    }
}
