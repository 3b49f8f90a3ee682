use crate::lorawan::region::RegionalPlan;

/// LoRaWAN device class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DeviceClass {
    /// Class A: Uplink followed by two receive windows
    A,
    /// Class C: Continuously listening except when transmitting
    C,
}

/// Configuration errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// Port outside the application range 1..=223
    InvalidPort(u8),
    /// Channel index not in the regional plan
    InvalidChannel(u8),
    /// Data rate index not in the regional plan
    InvalidDataRate(u8),
}

/// Application port (FPort)
///
/// Port 0 carries MAC commands only, 224 is the test protocol and 225..=255 are
/// reserved, so an application may only send on 1..=223.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FPort(u8);

impl FPort {
    /// MAC-only port
    pub const MAC: u8 = 0;
    /// LoRaWAN test protocol port
    pub const TEST: u8 = 224;

    /// Validate an application port
    pub fn new(port: u8) -> Result<Self, ConfigError> {
        match port {
            1..=223 => Ok(Self(port)),
            _ => Err(ConfigError::InvalidPort(port)),
        }
    }

    /// Port number
    pub fn value(&self) -> u8 {
        self.0
    }
}

impl Default for FPort {
    fn default() -> Self {
        Self(1)
    }
}

/// Mutable operating parameters of the node
#[derive(Debug, Clone)]
pub struct RadioConfiguration {
    /// Device class
    pub device_class: DeviceClass,
    /// Channel used for the next uplink (and RX1)
    pub uplink_channel: u8,
    /// Channel used for RX2 and Class C listening
    pub downlink_channel: u8,
    /// Data rate used for uplinks (and RX1)
    pub uplink_data_rate: u8,
    /// Data rate used for RX2 and Class C listening
    pub downlink_data_rate: u8,
    /// Transmit power in dBm (0-20)
    pub tx_power: i32,
    /// Send confirmed data uplinks
    pub confirmed_uplink: bool,
    /// Advance the uplink channel after each transmission
    pub channel_hopping: bool,
    /// Port for application data
    pub application_port: FPort,
}

impl RadioConfiguration {
    /// Defaults for a regional plan: Class A, channel 0, slowest data rate,
    /// RX2 on the plan's downlink channel and data rate, 20 dBm.
    pub fn for_region(plan: &RegionalPlan) -> Self {
        Self {
            device_class: DeviceClass::A,
            uplink_channel: 0,
            downlink_channel: plan.rx2_channel(),
            uplink_data_rate: 0,
            downlink_data_rate: plan.rx2_data_rate,
            tx_power: 20,
            confirmed_uplink: false,
            channel_hopping: false,
            application_port: FPort::default(),
        }
    }

    /// Check channel and data rate indices against a regional plan
    pub fn validate(&self, plan: &RegionalPlan) -> Result<(), ConfigError> {
        if (self.uplink_channel as usize) >= plan.channel_count() {
            return Err(ConfigError::InvalidChannel(self.uplink_channel));
        }
        if plan.frequency(self.downlink_channel).is_none() {
            return Err(ConfigError::InvalidChannel(self.downlink_channel));
        }
        if plan.data_rate(self.uplink_data_rate).is_none() {
            return Err(ConfigError::InvalidDataRate(self.uplink_data_rate));
        }
        if plan.data_rate(self.downlink_data_rate).is_none() {
            return Err(ConfigError::InvalidDataRate(self.downlink_data_rate));
        }
        Ok(())
    }

    /// Move the uplink channel to the next one in the plan, wrapping around
    pub(crate) fn hop(&mut self, channel_count: usize) {
        if channel_count == 0 {
            return;
        }
        self.uplink_channel = ((self.uplink_channel as usize + 1) % channel_count) as u8;
    }
}
