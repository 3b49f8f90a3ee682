//! Radio transceiver support
//!
//! [`Transceiver`] is the boundary the MAC layer drives. [`RadioDevice`] implements
//! it for the RFM95/SX1276 on top of any [`RegisterAccess`] bus.

/// RFM95 driver
pub mod rfm95;

/// Register map and register buses
pub mod registers;

/// Transceiver boundary types
pub mod traits;

pub use registers::{BusError, Reception, RegisterAccess, RegisterModel, SpiRegisters};
pub use rfm95::{RadioDevice, RadioError};
pub use traits::{LinkSettings, Mode, PackageStatus, ReceivedPackage, RxMode, Transceiver};
