//! LoRaWAN protocol implementation
//!
//! This module contains the protocol side of the node:
//! - Frame encoding and decoding
//! - Regional channel and data rate plans
//! - Receive window timing
//! - The MAC layer state machine

/// Data frame layout
pub mod frame;

/// MAC layer implementation
pub mod mac;

/// Regional parameters
pub mod region;

/// Receive window timing and time sources
pub mod timing;

pub use frame::{decode, encode, Frame, FrameError, FrameType, MType};
pub use mac::{
    CycleOutcome, CycleReport, Downlink, MacError, MacLayer, MacState, Rejection, RxStatus, Window,
};
pub use region::{RegionalPlan, EU868, US902};
pub use timing::{Timer, TimingParams, VirtualClock};
