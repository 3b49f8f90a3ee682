//! LoRaWAN end-node MAC layer in Rust
//!
//! This crate implements the device side of a LoRaWAN 1.0 Class A / Class C node
//! on top of an RFM95 (SX1276) transceiver. It builds and parses data frames,
//! handles session encryption and integrity, drives the transceiver registers and
//! schedules the RX1/RX2 receive windows after every uplink.
//!
//! # Features
//! - ABP sessions with uplink/downlink frame counters and replay protection
//! - AES-128 payload encryption and CMAC message integrity codes
//! - Class A and Class C receive scheduling
//! - Swappable regional plans (EU868, US902)
//! - Register-level RFM95 driver over SPI or a simulated register file
//! - No heap allocation
//!
//! # Example
//! ```no_run
//! use lorawan_node::{
//!     config::{AESKey, DevAddr, RadioConfiguration, Session},
//!     lorawan::{mac::MacLayer, region::EU868, timing::VirtualClock},
//!     radio::{RadioDevice, RegisterModel},
//! };
//!
//! let session = Session::new_abp(
//!     DevAddr::from_u32(0x2601_1BDA),
//!     AESKey::new([0x2B; 16]), // NwkSKey
//!     AESKey::new([0x3C; 16]), // AppSKey
//! );
//! let radio = RadioDevice::new(RegisterModel::new(), &EU868);
//! let config = RadioConfiguration::for_region(&EU868);
//!
//! let mut mac = MacLayer::new(radio, VirtualClock::new(), &EU868, session, config).unwrap();
//! mac.initialize().unwrap();
//!
//! mac.send_uplink(b"Hello, LoRaWAN!", false).unwrap();
//! let outcome = mac.run_cycle().unwrap();
//! ```

#![warn(missing_docs)]
#![cfg_attr(not(any(test, feature = "std")), no_std)]

/// Session and radio configuration
pub mod config;
/// LoRaWAN cryptographic operations
pub mod crypto;
/// LoRaWAN protocol implementation
pub mod lorawan;
/// Radio transceiver support
pub mod radio;
