/// Crystal frequency of the RFM95/SX1276 in Hz
const FXOSC: u64 = 32_000_000;

/// LoRa signal bandwidth, with the value the modem configuration register expects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Bandwidth {
    /// 125 kHz
    Khz125,
    /// 250 kHz
    Khz250,
    /// 500 kHz
    Khz500,
}

impl Bandwidth {
    /// Bandwidth in Hz
    pub fn hz(&self) -> u32 {
        match self {
            Bandwidth::Khz125 => 125_000,
            Bandwidth::Khz250 => 250_000,
            Bandwidth::Khz500 => 500_000,
        }
    }

    /// `Bw` field of RegModemConfig1
    pub fn register_value(&self) -> u8 {
        match self {
            Bandwidth::Khz125 => 0x07,
            Bandwidth::Khz250 => 0x08,
            Bandwidth::Khz500 => 0x09,
        }
    }
}

/// Modulation parameters behind a data rate index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DataRate {
    /// Spreading factor (SF7-SF12)
    pub spreading_factor: u8,
    /// Bandwidth
    pub bandwidth: Bandwidth,
}

impl DataRate {
    const fn new(spreading_factor: u8, bandwidth: Bandwidth) -> Self {
        Self {
            spreading_factor,
            bandwidth,
        }
    }

    /// Long symbols need low data rate optimization
    pub fn needs_low_data_rate_optimize(&self) -> bool {
        self.spreading_factor > 10
    }
}

/// Regional channel and data rate plan
///
/// Channel indices `0..channel_count()` are uplink channels. The index right after
/// them is reserved for the downlink-only RX2 frequency.
#[derive(Debug)]
pub struct RegionalPlan {
    /// Region name
    pub name: &'static str,
    /// Uplink channel frequencies in Hz
    pub channels: &'static [u32],
    /// RX2 frequency in Hz
    pub rx2_frequency: u32,
    /// Data rate table, indexed by DR number. Holes are `None`.
    pub data_rates: &'static [Option<DataRate>],
    /// Default RX2 data rate index
    pub rx2_data_rate: u8,
    /// Maximum application payload in bytes
    pub max_payload: usize,
}

impl RegionalPlan {
    /// Number of uplink channels
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Index of the downlink-only RX2 channel
    pub fn rx2_channel(&self) -> u8 {
        self.channels.len() as u8
    }

    /// Carrier frequency of a channel index
    pub fn frequency(&self, channel: u8) -> Option<u32> {
        let index = channel as usize;
        if index < self.channels.len() {
            Some(self.channels[index])
        } else if index == self.channels.len() {
            Some(self.rx2_frequency)
        } else {
            None
        }
    }

    /// RegFrfMsb/Mid/Lsb values for a channel index
    pub fn frf(&self, channel: u8) -> Option<[u8; 3]> {
        self.frequency(channel).map(frf_bytes)
    }

    /// Modulation parameters of a data rate index
    pub fn data_rate(&self, index: u8) -> Option<DataRate> {
        self.data_rates.get(index as usize).copied().flatten()
    }
}

/// Frequency register value: `f * 2^19 / FXOSC`, most significant byte first
pub fn frf_bytes(frequency: u32) -> [u8; 3] {
    let frf = ((frequency as u64) << 19) / FXOSC;
    [(frf >> 16) as u8, (frf >> 8) as u8, frf as u8]
}

/// EU863-870
pub const EU868: RegionalPlan = RegionalPlan {
    name: "EU868",
    channels: &[
        868_100_000,
        868_300_000,
        868_500_000,
        867_100_000,
        867_300_000,
        867_500_000,
        867_700_000,
        867_900_000,
    ],
    rx2_frequency: 869_525_000,
    data_rates: &[
        Some(DataRate::new(12, Bandwidth::Khz125)), // DR0
        Some(DataRate::new(11, Bandwidth::Khz125)), // DR1
        Some(DataRate::new(10, Bandwidth::Khz125)), // DR2
        Some(DataRate::new(9, Bandwidth::Khz125)),  // DR3
        Some(DataRate::new(8, Bandwidth::Khz125)),  // DR4
        Some(DataRate::new(7, Bandwidth::Khz125)),  // DR5
        Some(DataRate::new(7, Bandwidth::Khz250)),  // DR6
    ],
    rx2_data_rate: 0,
    max_payload: 220,
};

/// US902-928, sub-band 2 (channels 8-15)
pub const US902: RegionalPlan = RegionalPlan {
    name: "US902",
    channels: &[
        903_900_000,
        904_100_000,
        904_300_000,
        904_500_000,
        904_700_000,
        904_900_000,
        905_100_000,
        905_300_000,
    ],
    rx2_frequency: 923_300_000,
    data_rates: &[
        Some(DataRate::new(10, Bandwidth::Khz125)), // DR0
        Some(DataRate::new(9, Bandwidth::Khz125)),  // DR1
        Some(DataRate::new(8, Bandwidth::Khz125)),  // DR2
        Some(DataRate::new(7, Bandwidth::Khz125)),  // DR3
        Some(DataRate::new(8, Bandwidth::Khz500)),  // DR4
        None,
        None,
        None,
        Some(DataRate::new(12, Bandwidth::Khz500)), // DR8
        Some(DataRate::new(11, Bandwidth::Khz500)), // DR9
        Some(DataRate::new(10, Bandwidth::Khz500)), // DR10
        Some(DataRate::new(9, Bandwidth::Khz500)),  // DR11
        Some(DataRate::new(8, Bandwidth::Khz500)),  // DR12
        Some(DataRate::new(7, Bandwidth::Khz500)),  // DR13
    ],
    rx2_data_rate: 8,
    max_payload: 220,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eu868_frequencies() {
        assert_eq!(EU868.channel_count(), 8);
        assert_eq!(EU868.frequency(0), Some(868_100_000));
        assert_eq!(EU868.frequency(8), Some(869_525_000));
        assert_eq!(EU868.frequency(9), None);
        assert_eq!(EU868.frf(0), Some([0xD9, 0x06, 0x66]));
        assert_eq!(EU868.frf(7), Some([0xD8, 0xF9, 0x99]));
        assert_eq!(EU868.frf(EU868.rx2_channel()), Some([0xD9, 0x61, 0x99]));
    }

    #[test]
    fn test_us902_frequencies() {
        assert_eq!(US902.frf(0), Some([0xE1, 0xF9, 0x99]));
        assert_eq!(US902.frf(US902.rx2_channel()), Some([0xE6, 0xD3, 0x33]));
    }

    #[test]
    fn test_eu868_data_rates() {
        let dr0 = EU868.data_rate(0).unwrap();
        assert_eq!(dr0.spreading_factor, 12);
        assert_eq!(dr0.bandwidth, Bandwidth::Khz125);
        assert!(dr0.needs_low_data_rate_optimize());

        let dr6 = EU868.data_rate(6).unwrap();
        assert_eq!(dr6.spreading_factor, 7);
        assert_eq!(dr6.bandwidth.hz(), 250_000);
        assert!(!dr6.needs_low_data_rate_optimize());

        assert_eq!(EU868.data_rate(7), None);
    }

    #[test]
    fn test_us902_data_rate_table_has_holes() {
        assert!(US902.data_rate(4).is_some());
        assert_eq!(US902.data_rate(5), None);
        assert_eq!(
            US902.data_rate(US902.rx2_data_rate),
            Some(DataRate::new(12, Bandwidth::Khz500))
        );
    }
}
