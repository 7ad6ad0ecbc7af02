//! Live capture configuration.
//!
//! The snapshot length accepts either a byte count or a human-friendly
//! size such as `"64KiB"`.

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};
use validator::{self, Validate};

use crate::validation;

#[derive(Debug, Serialize, Deserialize, Validate, Clone, PartialEq, Eq)]
pub struct CaptureConfig {
    /// Interface to capture on. Unset picks the first non-loopback device.
    #[validate(custom(function = validation::validate_interface))]
    #[serde(default)]
    pub interface: Option<String>,

    #[serde(default = "default_promiscuous")]
    pub promiscuous: bool,

    /// Snapshot length in bytes.
    #[validate(range(min = 65536, max = 262144))]
    #[serde(default = "default_snaplen", deserialize_with = "deserialize_size")]
    pub snaplen: u32,

    /// How long a receive call may block before re-checking for stop.
    #[validate(range(min = 1000, max = 10000))]
    #[serde(default = "default_read_timeout")]
    pub read_timeout_ms: u64,

    /// Bound on joining the capture thread during shutdown.
    #[validate(range(min = 100, max = 10000))]
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_ms: u64,
}

fn default_promiscuous() -> bool {
    true
}

fn default_snaplen() -> u32 {
    65_536
}

fn default_read_timeout() -> u64 {
    1_000
}

fn default_shutdown_timeout() -> u64 {
    1_000
}

impl CaptureConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            interface: None,
            promiscuous: default_promiscuous(),
            snaplen: default_snaplen(),
            read_timeout_ms: default_read_timeout(),
            shutdown_timeout_ms: default_shutdown_timeout(),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SizeValue {
    Num(u32),
    Str(String),
}

fn deserialize_size<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    match SizeValue::deserialize(deserializer)? {
        SizeValue::Num(n) => Ok(n),
        SizeValue::Str(s) => {
            let s = s.trim();
            let split = s
                .find(|c: char| !c.is_ascii_digit())
                .unwrap_or(s.len());
            let (number, unit) = s.split_at(split);
            let number: u32 = number.parse().map_err(serde::de::Error::custom)?;
            let multiplier = match unit.trim().to_ascii_lowercase().as_str() {
                "" | "b" => 1,
                "kb" | "kib" => 1024,
                _ => return Err(serde::de::Error::custom("Unknown size unit")),
            };
            number
                .checked_mul(multiplier)
                .ok_or_else(|| serde::de::Error::custom("Size out of range"))
        }
    }
}
