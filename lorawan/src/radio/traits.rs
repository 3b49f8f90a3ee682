use core::fmt::Debug;

use heapless::Vec;

/// Largest packet the transceiver FIFO can hold
pub const MAX_PACKAGE_SIZE: usize = 255;

/// Transceiver operating modes (RegOpMode `Mode` field)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Mode {
    /// Sleep
    Sleep = 0x00,
    /// Standby
    Standby = 0x01,
    /// Frequency synthesis TX
    FsTx = 0x02,
    /// Transmit
    Tx = 0x03,
    /// Frequency synthesis RX
    FsRx = 0x04,
    /// Receive continuous
    RxContinuous = 0x05,
    /// Receive single
    RxSingle = 0x06,
    /// Channel activity detection
    ChannelActivityDetect = 0x07,
}

impl Mode {
    /// Mode from the low three bits of RegOpMode
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x07 {
            0x00 => Mode::Sleep,
            0x01 => Mode::Standby,
            0x02 => Mode::FsTx,
            0x03 => Mode::Tx,
            0x04 => Mode::FsRx,
            0x05 => Mode::RxContinuous,
            0x06 => Mode::RxSingle,
            _ => Mode::ChannelActivityDetect,
        }
    }
}

/// How a receive window listens
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RxMode {
    /// One packet or symbol timeout
    Single,
    /// Until told otherwise
    Continuous,
}

/// Channel and data rate indices for one transmission or window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LinkSettings {
    /// Channel index in the regional plan
    pub channel: u8,
    /// Data rate index in the regional plan
    pub data_rate: u8,
}

/// Result of checking the receiver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PackageStatus {
    /// Nothing received yet
    NoMessage,
    /// Packet received with a good CRC
    CrcOk,
    /// Packet received with a CRC error
    Malformed,
}

/// A packet read out of the transceiver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedPackage {
    /// Reception status
    pub status: PackageStatus,
    /// Packet bytes, empty for `NoMessage`
    pub data: Vec<u8, MAX_PACKAGE_SIZE>,
}

impl ReceivedPackage {
    /// Nothing there
    pub fn none() -> Self {
        Self {
            status: PackageStatus::NoMessage,
            data: Vec::new(),
        }
    }
}

/// What the MAC layer needs from a LoRa transceiver
pub trait Transceiver {
    /// Error type for radio operations
    type Error: Debug;

    /// Check the chip identity and load the default configuration
    fn initialize(&mut self) -> Result<(), Self::Error>;

    /// Change operating mode
    fn switch_mode(&mut self, mode: Mode) -> Result<(), Self::Error>;

    /// Tune to a channel of the regional plan
    fn change_channel(&mut self, channel: u8) -> Result<(), Self::Error>;

    /// Apply the modulation of a data rate index
    fn change_data_rate(&mut self, data_rate: u8) -> Result<(), Self::Error>;

    /// Set output power in dBm, clamped to 0-20
    fn set_transmit_power(&mut self, level: i32) -> Result<(), Self::Error>;

    /// Transmit a packet and wait for TX done
    fn send_package(&mut self, data: &[u8], settings: &LinkSettings) -> Result<(), Self::Error>;

    /// Configure a receive window and start listening
    fn start_receive(&mut self, settings: &LinkSettings, mode: RxMode) -> Result<(), Self::Error>;

    /// Collect a received packet, if any
    fn receive_package(&mut self) -> Result<ReceivedPackage, Self::Error>;

    /// RSSI of the last packet in dBm
    fn get_rssi(&mut self) -> Result<i32, Self::Error>;
}
