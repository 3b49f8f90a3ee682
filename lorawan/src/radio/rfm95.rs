use log::{debug, warn};

use crate::lorawan::region::RegionalPlan;
use crate::radio::registers::*;
use crate::radio::traits::{
    LinkSettings, Mode, PackageStatus, ReceivedPackage, RxMode, Transceiver, MAX_PACKAGE_SIZE,
};

// PA config
const PA_BOOST: u8 = 0x80;
const PA_DAC_DEFAULT: u8 = 0x84;
const PA_DAC_HIGH_POWER: u8 = 0x87;

// Defaults loaded by `initialize`
const DEFAULT_TX_POWER: i32 = 20;
const LNA_MAX_GAIN_BOOST: u8 = 0x23;
const SYMBOL_TIMEOUT: u8 = 0x25;
const PREAMBLE_LENGTH: u16 = 8;
const LORAWAN_SYNC_WORD: u8 = 0x34;
const FIFO_TX_BASE: u8 = 0x80;
const FIFO_RX_BASE: u8 = 0x00;

// DIO0 mapping
const DIO0_RX_DONE: u8 = 0x00;
const DIO0_TX_DONE: u8 = 0x40;

// IQ polarity: uplinks normal, downlinks inverted
const INVERTIQ_NORMAL: u8 = 0x27;
const INVERTIQ2_NORMAL: u8 = 0x1D;
const INVERTIQ_INVERTED: u8 = 0x66;
const INVERTIQ2_INVERTED: u8 = 0x19;

// RegPktRssiValue offset for the high-frequency port
const RSSI_OFFSET: i32 = 157;

/// IRQ register reads before `send_package` gives up on TX done
pub const TX_DONE_POLL_LIMIT: u32 = 1_000_000;

/// Possible errors in radio operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioError<E> {
    /// Version register did not read 0x12
    InitializationFailed {
        /// Value that was read
        version: u8,
    },
    /// Channel index outside the regional plan
    InvalidChannel(u8),
    /// Data rate index not defined by the regional plan
    InvalidDataRate(u8),
    /// Packet longer than the FIFO
    PayloadTooLarge(usize),
    /// TX done never showed up
    Timeout,
    /// Register bus error
    Bus(E),
}

/// RFM95 (SX1276) driver
///
/// Owns a register bus and a regional plan; channel and data rate indices are
/// resolved against the plan.
pub struct RadioDevice<B> {
    bus: B,
    plan: &'static RegionalPlan,
    mode: Mode,
}

impl<B: RegisterAccess> RadioDevice<B> {
    /// Create a driver; call `initialize` before use
    pub fn new(bus: B, plan: &'static RegionalPlan) -> Self {
        Self {
            bus,
            plan,
            mode: Mode::Sleep,
        }
    }

    /// Regional plan in use
    pub fn plan(&self) -> &'static RegionalPlan {
        self.plan
    }

    /// Mode last written to the chip
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Borrow the register bus
    pub fn bus(&self) -> &B {
        &self.bus
    }

    /// Mutably borrow the register bus
    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    /// Give the register bus back
    pub fn release(self) -> B {
        self.bus
    }

    fn read_register(&mut self, addr: u8) -> Result<u8, RadioError<B::Error>> {
        self.bus.read_register(addr).map_err(RadioError::Bus)
    }

    fn write_register(&mut self, addr: u8, value: u8) -> Result<(), RadioError<B::Error>> {
        self.bus.write_register(addr, value).map_err(RadioError::Bus)
    }

    /// Set the over-current protection trip point
    pub fn set_ocp(&mut self, milliamps: u8) -> Result<(), RadioError<B::Error>> {
        let trim = match milliamps {
            0..=120 => milliamps.saturating_sub(45) / 5,
            121..=240 => ((milliamps as u16 + 30) / 10) as u8,
            _ => 27,
        };
        self.write_register(REG_OCP, 0x20 | (trim & 0x1F))
    }

    /// Load a packet into the FIFO and enter TX mode without waiting
    pub fn start_transmit(
        &mut self,
        data: &[u8],
        settings: &LinkSettings,
    ) -> Result<(), RadioError<B::Error>> {
        if data.len() > MAX_PACKAGE_SIZE {
            return Err(RadioError::PayloadTooLarge(data.len()));
        }

        self.switch_mode(Mode::Standby)?;
        self.change_data_rate(settings.data_rate)?;
        self.change_channel(settings.channel)?;

        self.write_register(REG_DIO_MAPPING_1, DIO0_TX_DONE)?;
        self.write_register(REG_INVERTIQ, INVERTIQ_NORMAL)?;
        self.write_register(REG_INVERTIQ2, INVERTIQ2_NORMAL)?;
        self.write_register(REG_PAYLOAD_LENGTH, data.len() as u8)?;

        let base = self.read_register(REG_FIFO_TX_BASE_ADDR)?;
        self.write_register(REG_FIFO_ADDR_PTR, base)?;
        self.bus.write_fifo(data).map_err(RadioError::Bus)?;

        self.switch_mode(Mode::Tx)
    }

    /// Check for TX done, clearing the flag when it is set
    pub fn poll_transmit_done(&mut self) -> nb::Result<(), RadioError<B::Error>> {
        let flags = self.read_register(REG_IRQ_FLAGS)?;
        if flags & IRQ_TX_DONE_MASK == 0 {
            return Err(nb::Error::WouldBlock);
        }
        self.write_register(REG_IRQ_FLAGS, IRQ_TX_DONE_MASK)?;
        Ok(())
    }
}

impl<B: RegisterAccess> Transceiver for RadioDevice<B> {
    type Error = RadioError<B::Error>;

    fn initialize(&mut self) -> Result<(), Self::Error> {
        let version = self.read_register(REG_VERSION)?;
        if version != EXPECTED_VERSION {
            warn!("unexpected transceiver version {:#04x}", version);
            return Err(RadioError::InitializationFailed { version });
        }

        // LoRa mode can only be selected from sleep
        self.write_register(REG_OP_MODE, Mode::Sleep as u8)?;
        self.switch_mode(Mode::Sleep)?;
        self.switch_mode(Mode::Standby)?;

        self.change_channel(0)?;
        self.set_transmit_power(DEFAULT_TX_POWER)?;
        self.write_register(REG_LNA, LNA_MAX_GAIN_BOOST)?;
        self.change_data_rate(0)?;
        self.write_register(REG_SYMB_TIMEOUT_LSB, SYMBOL_TIMEOUT)?;

        let [preamble_msb, preamble_lsb] = PREAMBLE_LENGTH.to_be_bytes();
        self.write_register(REG_PREAMBLE_MSB, preamble_msb)?;
        self.write_register(REG_PREAMBLE_LSB, preamble_lsb)?;
        self.write_register(REG_SYNC_WORD, LORAWAN_SYNC_WORD)?;

        self.write_register(REG_FIFO_TX_BASE_ADDR, FIFO_TX_BASE)?;
        self.write_register(REG_FIFO_RX_BASE_ADDR, FIFO_RX_BASE)?;

        debug!("transceiver initialized for {}", self.plan.name);
        Ok(())
    }

    fn switch_mode(&mut self, mode: Mode) -> Result<(), Self::Error> {
        self.write_register(REG_OP_MODE, MODE_LONG_RANGE_MODE | mode as u8)?;
        self.mode = mode;
        debug!("radio mode {:?}", mode);
        Ok(())
    }

    fn change_channel(&mut self, channel: u8) -> Result<(), Self::Error> {
        let [msb, mid, lsb] = self
            .plan
            .frf(channel)
            .ok_or(RadioError::InvalidChannel(channel))?;
        self.write_register(REG_FRF_MSB, msb)?;
        self.write_register(REG_FRF_MID, mid)?;
        self.write_register(REG_FRF_LSB, lsb)?;
        debug!("radio channel {}", channel);
        Ok(())
    }

    fn change_data_rate(&mut self, data_rate: u8) -> Result<(), Self::Error> {
        let dr = self
            .plan
            .data_rate(data_rate)
            .ok_or(RadioError::InvalidDataRate(data_rate))?;

        // SF and CRC on
        self.write_register(REG_MODEM_CONFIG_2, (dr.spreading_factor << 4) | 0x04)?;
        // BW, coding rate 4/5, explicit header
        self.write_register(
            REG_MODEM_CONFIG_1,
            (dr.bandwidth.register_value() << 4) | 0x02,
        )?;
        // AGC auto, plus low data rate optimize above SF10
        let config3 = if dr.needs_low_data_rate_optimize() {
            0x0C
        } else {
            0x04
        };
        self.write_register(REG_MODEM_CONFIG_3, config3)
    }

    fn set_transmit_power(&mut self, level: i32) -> Result<(), Self::Error> {
        let level = level.clamp(0, 20);
        let output = if level > 17 {
            self.write_register(REG_PA_DAC, PA_DAC_HIGH_POWER)?;
            self.set_ocp(140)?;
            level - 3
        } else {
            self.write_register(REG_PA_DAC, PA_DAC_DEFAULT)?;
            self.set_ocp(100)?;
            level
        };
        self.write_register(REG_PA_CONFIG, PA_BOOST | (output as u8).saturating_sub(2))
    }

    fn send_package(&mut self, data: &[u8], settings: &LinkSettings) -> Result<(), Self::Error> {
        self.start_transmit(data, settings)?;
        for _ in 0..TX_DONE_POLL_LIMIT {
            match self.poll_transmit_done() {
                Ok(()) => return Ok(()),
                Err(nb::Error::WouldBlock) => core::hint::spin_loop(),
                Err(nb::Error::Other(e)) => return Err(e),
            }
        }
        Err(RadioError::Timeout)
    }

    fn start_receive(&mut self, settings: &LinkSettings, mode: RxMode) -> Result<(), Self::Error> {
        self.switch_mode(Mode::Standby)?;
        self.change_data_rate(settings.data_rate)?;
        self.change_channel(settings.channel)?;

        self.write_register(REG_DIO_MAPPING_1, DIO0_RX_DONE)?;
        self.write_register(REG_INVERTIQ, INVERTIQ_INVERTED)?;
        self.write_register(REG_INVERTIQ2, INVERTIQ2_INVERTED)?;

        let base = self.read_register(REG_FIFO_RX_BASE_ADDR)?;
        self.write_register(REG_FIFO_ADDR_PTR, base)?;
        self.write_register(REG_IRQ_FLAGS, 0xFF)?;

        match mode {
            RxMode::Single => self.switch_mode(Mode::RxSingle),
            RxMode::Continuous => self.switch_mode(Mode::RxContinuous),
        }
    }

    fn receive_package(&mut self) -> Result<ReceivedPackage, Self::Error> {
        let flags = self.read_register(REG_IRQ_FLAGS)?;
        if flags & IRQ_RX_DONE_MASK == 0 {
            if flags & IRQ_RX_TIMEOUT_MASK != 0 {
                self.write_register(REG_IRQ_FLAGS, IRQ_RX_TIMEOUT_MASK)?;
            }
            return Ok(ReceivedPackage::none());
        }

        let status = if flags & IRQ_PAYLOAD_CRC_ERROR_MASK != 0 {
            warn!("received packet with CRC error");
            PackageStatus::Malformed
        } else {
            PackageStatus::CrcOk
        };

        let start = self.read_register(REG_FIFO_RX_CURRENT_ADDR)?;
        let len = self.read_register(REG_RX_NB_BYTES)? as usize;
        self.write_register(REG_FIFO_ADDR_PTR, start)?;

        let mut package = ReceivedPackage::none();
        package.status = status;
        package
            .data
            .resize(len, 0)
            .map_err(|_| RadioError::PayloadTooLarge(len))?;
        self.bus.read_fifo(&mut package.data).map_err(RadioError::Bus)?;

        self.write_register(REG_IRQ_FLAGS, flags)?;
        Ok(package)
    }

    fn get_rssi(&mut self) -> Result<i32, Self::Error> {
        Ok(self.read_register(REG_PKT_RSSI_VALUE)? as i32 - RSSI_OFFSET)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lorawan::region::{EU868, US902};

    fn radio() -> RadioDevice<RegisterModel> {
        let mut radio = RadioDevice::new(RegisterModel::new(), &EU868);
        radio.initialize().unwrap();
        radio
    }

    #[test]
    fn test_initialize_loads_defaults() {
        let radio = radio();
        let regs = radio.bus();
        assert_eq!(regs.op_mode(), 0x81);
        assert_eq!(
            [regs.peek(REG_FRF_MSB), regs.peek(REG_FRF_MID), regs.peek(REG_FRF_LSB)],
            [0xD9, 0x06, 0x66]
        );
        assert_eq!(regs.peek(REG_LNA), 0x23);
        assert_eq!(regs.peek(REG_SYMB_TIMEOUT_LSB), 0x25);
        assert_eq!(regs.peek(REG_PREAMBLE_MSB), 0x00);
        assert_eq!(regs.peek(REG_PREAMBLE_LSB), 0x08);
        assert_eq!(regs.peek(REG_SYNC_WORD), 0x34);
        assert_eq!(regs.peek(REG_FIFO_TX_BASE_ADDR), 0x80);
        assert_eq!(regs.peek(REG_FIFO_RX_BASE_ADDR), 0x00);
        assert_eq!(radio.mode(), Mode::Standby);
    }

    #[test]
    fn test_initialize_rejects_wrong_version() {
        let mut radio = RadioDevice::new(RegisterModel::with_version(0x22), &EU868);
        assert_eq!(
            radio.initialize(),
            Err(RadioError::InitializationFailed { version: 0x22 })
        );
    }

    #[test]
    fn test_transmit_power_registers() {
        let mut radio = radio();

        radio.set_transmit_power(20).unwrap();
        assert_eq!(radio.bus().peek(REG_PA_CONFIG), 0x8F);
        assert_eq!(radio.bus().peek(REG_PA_DAC), 0x87);
        assert_eq!(radio.bus().peek(REG_OCP), 0x31);

        radio.set_transmit_power(14).unwrap();
        assert_eq!(radio.bus().peek(REG_PA_CONFIG), 0x8C);
        assert_eq!(radio.bus().peek(REG_PA_DAC), 0x84);
        assert_eq!(radio.bus().peek(REG_OCP), 0x2B);

        radio.set_transmit_power(40).unwrap();
        assert_eq!(radio.bus().peek(REG_PA_CONFIG), 0x8F);

        radio.set_transmit_power(-5).unwrap();
        assert_eq!(radio.bus().peek(REG_PA_CONFIG), 0x80);
    }

    #[test]
    fn test_data_rate_registers() {
        let mut radio = radio();

        radio.change_data_rate(0).unwrap();
        assert_eq!(radio.bus().peek(REG_MODEM_CONFIG_2), 0xC4);
        assert_eq!(radio.bus().peek(REG_MODEM_CONFIG_1), 0x72);
        assert_eq!(radio.bus().peek(REG_MODEM_CONFIG_3), 0x0C);

        radio.change_data_rate(5).unwrap();
        assert_eq!(radio.bus().peek(REG_MODEM_CONFIG_2), 0x74);
        assert_eq!(radio.bus().peek(REG_MODEM_CONFIG_3), 0x04);

        radio.change_data_rate(6).unwrap();
        assert_eq!(radio.bus().peek(REG_MODEM_CONFIG_1), 0x82);

        assert_eq!(
            radio.change_data_rate(9),
            Err(RadioError::InvalidDataRate(9))
        );
    }

    #[test]
    fn test_channel_registers_follow_plan() {
        let mut radio = radio();
        radio.change_channel(8).unwrap();
        assert_eq!(
            [
                radio.bus().peek(REG_FRF_MSB),
                radio.bus().peek(REG_FRF_MID),
                radio.bus().peek(REG_FRF_LSB)
            ],
            [0xD9, 0x61, 0x99]
        );
        assert_eq!(radio.change_channel(9), Err(RadioError::InvalidChannel(9)));

        let mut us = RadioDevice::new(RegisterModel::new(), &US902);
        us.initialize().unwrap();
        assert_eq!(us.bus().peek(REG_FRF_MSB), 0xE1);
        assert_eq!(us.change_data_rate(5), Err(RadioError::InvalidDataRate(5)));
    }

    #[test]
    fn test_send_package_writes_fifo_and_waits_for_tx_done() {
        let mut radio = radio();
        let settings = LinkSettings {
            channel: 7,
            data_rate: 5,
        };
        radio.send_package(b"uplink", &settings).unwrap();

        let regs = radio.bus();
        assert_eq!(regs.last_transmission(), b"uplink");
        assert_eq!(regs.peek(REG_PAYLOAD_LENGTH), 6);
        assert_eq!(regs.peek(REG_DIO_MAPPING_1), 0x40);
        assert_eq!(regs.peek(REG_INVERTIQ), 0x27);
        assert_eq!(regs.peek(REG_INVERTIQ2), 0x1D);
        assert_eq!(regs.peek(REG_IRQ_FLAGS) & IRQ_TX_DONE_MASK, 0);
        assert_eq!(
            [regs.peek(REG_FRF_MSB), regs.peek(REG_FRF_MID), regs.peek(REG_FRF_LSB)],
            [0xD8, 0xF9, 0x99]
        );
    }

    #[test]
    fn test_send_package_times_out_without_tx_done() {
        struct Stuck(RegisterModel);

        impl RegisterAccess for Stuck {
            type Error = core::convert::Infallible;

            fn read_register(&mut self, addr: u8) -> Result<u8, Self::Error> {
                match addr {
                    REG_IRQ_FLAGS => Ok(0),
                    _ => self.0.read_register(addr),
                }
            }

            fn write_register(&mut self, addr: u8, value: u8) -> Result<(), Self::Error> {
                self.0.write_register(addr, value)
            }
        }

        let mut radio = RadioDevice::new(Stuck(RegisterModel::new()), &EU868);
        radio.initialize().unwrap();
        let settings = LinkSettings {
            channel: 0,
            data_rate: 5,
        };
        assert_eq!(radio.send_package(&[1], &settings), Err(RadioError::Timeout));
    }

    #[test]
    fn test_receive_reads_fifo_and_rssi() {
        let mut radio = radio();
        assert_eq!(radio.receive_package().unwrap(), ReceivedPackage::none());

        radio
            .bus_mut()
            .push_reception(Reception::packet(&[0x60, 1, 2, 3]).unwrap())
            .unwrap();
        let settings = LinkSettings {
            channel: 8,
            data_rate: 0,
        };
        radio.start_receive(&settings, RxMode::Single).unwrap();
        assert_eq!(radio.bus().peek(REG_INVERTIQ), 0x66);

        let package = radio.receive_package().unwrap();
        assert_eq!(package.status, PackageStatus::CrcOk);
        assert_eq!(&package.data[..], &[0x60, 1, 2, 3]);
        assert_eq!(radio.get_rssi().unwrap(), -57);
        assert_eq!(radio.bus().peek(REG_IRQ_FLAGS), 0);
    }

    #[test]
    fn test_crc_error_is_malformed() {
        let mut radio = radio();
        radio
            .bus_mut()
            .push_reception(Reception::corrupted(&[1, 2]).unwrap())
            .unwrap();
        let settings = LinkSettings {
            channel: 0,
            data_rate: 5,
        };
        radio.start_receive(&settings, RxMode::Continuous).unwrap();
        let package = radio.receive_package().unwrap();
        assert_eq!(package.status, PackageStatus::Malformed);
    }

    #[test]
    fn test_rssi_offset() {
        let mut radio = radio();
        radio.bus_mut().poke(REG_PKT_RSSI_VALUE, 0);
        assert_eq!(radio.get_rssi().unwrap(), -157);
    }
}
