//! Device and network configuration
//!
//! This module contains types and functions for configuring LoRaWAN devices
//! and network parameters. It includes:
//! - Session provisioning (DevAddr, session keys, frame counters)
//! - Radio operating parameters (class, channels, data rates, port)

/// Session keys, device address and frame counters
pub mod device;

/// Radio operating parameters
pub mod radio;

pub use device::{AESKey, DevAddr, Session};
pub use radio::{ConfigError, DeviceClass, FPort, RadioConfiguration};
