//! # grindvakt Engine
//!
//! Wires the rule store, matching engine, firewall executor and capture
//! session into a running enforcement point, and exposes the
//! `ControlFacade` through which rules are changed at runtime.

pub mod error;
pub mod facade;
pub mod sentinel;
pub mod settings;

pub use error::EngineError;
pub use facade::{BlockStatistics, ControlFacade};
pub use sentinel::{Sentinel, SentinelParts};
pub use settings::{capture_options, firewall_settings};
