//! Register-level access to an RFM95/SX1276
//!
//! The driver only ever talks to the chip through [`RegisterAccess`]. Two
//! implementations are provided: [`SpiRegisters`] for real hardware and
//! [`RegisterModel`], an owned in-memory model of the register file used for
//! simulation and tests.

use core::convert::Infallible;
use core::fmt::Debug;

use embedded_hal::blocking::spi::{Transfer, Write};
use embedded_hal::digital::v2::OutputPin;
use heapless::Vec;

use super::traits::MAX_PACKAGE_SIZE;

// SX1276 LoRa register map
/// RegFifo, FIFO read/write access
pub const REG_FIFO: u8 = 0x00;
/// RegOpMode
pub const REG_OP_MODE: u8 = 0x01;
/// RegFrfMsb, carrier frequency bits 23..16
pub const REG_FRF_MSB: u8 = 0x06;
/// RegFrfMid, carrier frequency bits 15..8
pub const REG_FRF_MID: u8 = 0x07;
/// RegFrfLsb, carrier frequency bits 7..0
pub const REG_FRF_LSB: u8 = 0x08;
/// RegPaConfig
pub const REG_PA_CONFIG: u8 = 0x09;
/// RegOcp, over-current protection
pub const REG_OCP: u8 = 0x0B;
/// RegLna
pub const REG_LNA: u8 = 0x0C;
/// RegFifoAddrPtr
pub const REG_FIFO_ADDR_PTR: u8 = 0x0D;
/// RegFifoTxBaseAddr
pub const REG_FIFO_TX_BASE_ADDR: u8 = 0x0E;
/// RegFifoRxBaseAddr
pub const REG_FIFO_RX_BASE_ADDR: u8 = 0x0F;
/// RegFifoRxCurrentAddr, start of the last received packet
pub const REG_FIFO_RX_CURRENT_ADDR: u8 = 0x10;
/// RegIrqFlags, write 1 to clear
pub const REG_IRQ_FLAGS: u8 = 0x12;
/// RegRxNbBytes, length of the last received packet
pub const REG_RX_NB_BYTES: u8 = 0x13;
/// RegPktRssiValue
pub const REG_PKT_RSSI_VALUE: u8 = 0x1A;
/// RegModemConfig1: bandwidth, coding rate, header mode
pub const REG_MODEM_CONFIG_1: u8 = 0x1D;
/// RegModemConfig2: spreading factor, CRC
pub const REG_MODEM_CONFIG_2: u8 = 0x1E;
/// RegSymbTimeoutLsb
pub const REG_SYMB_TIMEOUT_LSB: u8 = 0x1F;
/// RegPreambleMsb
pub const REG_PREAMBLE_MSB: u8 = 0x20;
/// RegPreambleLsb
pub const REG_PREAMBLE_LSB: u8 = 0x21;
/// RegPayloadLength
pub const REG_PAYLOAD_LENGTH: u8 = 0x22;
/// RegModemConfig3: low data rate optimize, AGC
pub const REG_MODEM_CONFIG_3: u8 = 0x26;
/// RegInvertIQ
pub const REG_INVERTIQ: u8 = 0x33;
/// RegSyncWord
pub const REG_SYNC_WORD: u8 = 0x39;
/// RegInvertIQ2
pub const REG_INVERTIQ2: u8 = 0x3B;
/// RegDioMapping1
pub const REG_DIO_MAPPING_1: u8 = 0x40;
/// RegVersion, silicon revision
pub const REG_VERSION: u8 = 0x42;
/// RegPaDac, +20 dBm switch on PA_BOOST
pub const REG_PA_DAC: u8 = 0x4D;

// Operating mode bits
/// LoRa mode bit of RegOpMode
pub const MODE_LONG_RANGE_MODE: u8 = 0x80;
/// Operating mode bits of RegOpMode
pub const MODE_MASK: u8 = 0x07;

// IRQ flags
/// RxTimeout
pub const IRQ_RX_TIMEOUT_MASK: u8 = 0x80;
/// RxDone
pub const IRQ_RX_DONE_MASK: u8 = 0x40;
/// PayloadCrcError
pub const IRQ_PAYLOAD_CRC_ERROR_MASK: u8 = 0x20;
/// TxDone
pub const IRQ_TX_DONE_MASK: u8 = 0x08;

/// Silicon revision reported by RFM95/SX1276 parts
pub const EXPECTED_VERSION: u8 = 0x12;

/// Raw register read/write primitive
pub trait RegisterAccess {
    /// Bus error type
    type Error: Debug;

    /// Read one register
    fn read_register(&mut self, addr: u8) -> Result<u8, Self::Error>;

    /// Write one register
    fn write_register(&mut self, addr: u8, value: u8) -> Result<(), Self::Error>;

    /// Write bytes to the FIFO at the current FIFO pointer
    fn write_fifo(&mut self, data: &[u8]) -> Result<(), Self::Error> {
        for &byte in data {
            self.write_register(REG_FIFO, byte)?;
        }
        Ok(())
    }

    /// Read bytes from the FIFO at the current FIFO pointer
    fn read_fifo(&mut self, buffer: &mut [u8]) -> Result<(), Self::Error> {
        for byte in buffer.iter_mut() {
            *byte = self.read_register(REG_FIFO)?;
        }
        Ok(())
    }
}

/// What the simulated air delivers when the model enters a receive mode
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reception {
    /// Nothing on the channel for this window
    Silence,
    /// A packet arrives
    Packet {
        /// Packet bytes
        data: Vec<u8, MAX_PACKAGE_SIZE>,
        /// Whether the payload CRC checks out
        crc_ok: bool,
        /// Raw RegPktRssiValue
        rssi: u8,
    },
}

impl Reception {
    /// A clean packet at -57 dBm
    pub fn packet(data: &[u8]) -> Option<Self> {
        Some(Reception::Packet {
            data: Vec::from_slice(data).ok()?,
            crc_ok: true,
            rssi: 100,
        })
    }

    /// A packet whose CRC fails
    pub fn corrupted(data: &[u8]) -> Option<Self> {
        Some(Reception::Packet {
            data: Vec::from_slice(data).ok()?,
            crc_ok: false,
            rssi: 100,
        })
    }
}

const RECEPTION_QUEUE_SIZE: usize = 16;

/// In-memory RFM95 register file
///
/// Behaves like the chip where the driver depends on it: the FIFO pointer
/// auto-increments, IRQ flags are cleared by writing ones, entering TX mode
/// completes the transmission at once, and entering an RX mode delivers the next
/// scripted [`Reception`].
#[derive(Debug, Clone)]
pub struct RegisterModel {
    registers: [u8; 256],
    fifo: [u8; 256],
    receptions: Vec<Reception, RECEPTION_QUEUE_SIZE>,
    next_reception: usize,
    last_transmission: Vec<u8, MAX_PACKAGE_SIZE>,
    transmissions: usize,
    rx_entries: usize,
}

impl Default for RegisterModel {
    fn default() -> Self {
        Self::new()
    }
}

impl RegisterModel {
    /// Register file of a freshly reset RFM95
    pub fn new() -> Self {
        Self::with_version(EXPECTED_VERSION)
    }

    /// Register file reporting another silicon version
    pub fn with_version(version: u8) -> Self {
        let mut registers = [0u8; 256];
        registers[REG_VERSION as usize] = version;
        Self {
            registers,
            fifo: [0; 256],
            receptions: Vec::new(),
            next_reception: 0,
            last_transmission: Vec::new(),
            transmissions: 0,
            rx_entries: 0,
        }
    }

    /// Script what the next receive mode entry hears
    pub fn push_reception(&mut self, reception: Reception) -> Result<(), Reception> {
        if self.next_reception == self.receptions.len() {
            self.receptions.clear();
            self.next_reception = 0;
        }
        self.receptions.push(reception)
    }

    /// Register value without side effects
    pub fn peek(&self, addr: u8) -> u8 {
        self.registers[addr as usize]
    }

    /// Set a register without side effects
    pub fn poke(&mut self, addr: u8, value: u8) {
        self.registers[addr as usize] = value;
    }

    /// Bytes sent by the last transmission
    pub fn last_transmission(&self) -> &[u8] {
        &self.last_transmission
    }

    /// Number of completed transmissions
    pub fn transmission_count(&self) -> usize {
        self.transmissions
    }

    /// Number of times a receive mode was entered
    pub fn rx_entries(&self) -> usize {
        self.rx_entries
    }

    /// Mode currently in RegOpMode
    pub fn op_mode(&self) -> u8 {
        self.registers[REG_OP_MODE as usize]
    }

    fn advance_fifo_pointer(&mut self) -> usize {
        let ptr = self.registers[REG_FIFO_ADDR_PTR as usize];
        self.registers[REG_FIFO_ADDR_PTR as usize] = ptr.wrapping_add(1);
        ptr as usize
    }

    fn complete_transmission(&mut self) {
        let base = self.registers[REG_FIFO_TX_BASE_ADDR as usize] as usize;
        let len = self.registers[REG_PAYLOAD_LENGTH as usize] as usize;
        self.last_transmission.clear();
        for i in 0..len {
            // len is a u8, the buffer holds 255 bytes
            let _ = self.last_transmission.push(self.fifo[(base + i) % 256]);
        }
        self.transmissions += 1;
        self.registers[REG_IRQ_FLAGS as usize] |= IRQ_TX_DONE_MASK;
    }

    fn deliver_reception(&mut self, single: bool) {
        self.rx_entries += 1;
        let reception = self.receptions.get(self.next_reception).cloned();
        if reception.is_some() {
            self.next_reception += 1;
        }

        match reception {
            Some(Reception::Packet { data, crc_ok, rssi }) => {
                let base = self.registers[REG_FIFO_RX_BASE_ADDR as usize];
                for (i, &byte) in data.iter().enumerate() {
                    self.fifo[(base as usize + i) % 256] = byte;
                }
                self.registers[REG_FIFO_RX_CURRENT_ADDR as usize] = base;
                self.registers[REG_RX_NB_BYTES as usize] = data.len() as u8;
                self.registers[REG_PKT_RSSI_VALUE as usize] = rssi;
                let mut flags = IRQ_RX_DONE_MASK;
                if !crc_ok {
                    flags |= IRQ_PAYLOAD_CRC_ERROR_MASK;
                }
                self.registers[REG_IRQ_FLAGS as usize] |= flags;
            }
            Some(Reception::Silence) | None => {
                if single {
                    self.registers[REG_IRQ_FLAGS as usize] |= IRQ_RX_TIMEOUT_MASK;
                }
            }
        }
    }
}

impl RegisterAccess for RegisterModel {
    type Error = Infallible;

    fn read_register(&mut self, addr: u8) -> Result<u8, Self::Error> {
        if addr == REG_FIFO {
            let ptr = self.advance_fifo_pointer();
            return Ok(self.fifo[ptr]);
        }
        Ok(self.registers[addr as usize])
    }

    fn write_register(&mut self, addr: u8, value: u8) -> Result<(), Self::Error> {
        match addr {
            REG_FIFO => {
                let ptr = self.advance_fifo_pointer();
                self.fifo[ptr] = value;
            }
            REG_IRQ_FLAGS => self.registers[addr as usize] &= !value,
            REG_OP_MODE => {
                self.registers[addr as usize] = value;
                match value & MODE_MASK {
                    0x03 => self.complete_transmission(),
                    0x05 => self.deliver_reception(false),
                    0x06 => self.deliver_reception(true),
                    _ => {}
                }
            }
            _ => self.registers[addr as usize] = value,
        }
        Ok(())
    }
}

/// SPI bus errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BusError {
    /// SPI transfer error
    Spi,
    /// Chip select error
    Gpio,
}

/// Registers of a real chip behind an SPI bus
pub struct SpiRegisters<SPI, CS> {
    spi: SPI,
    cs: CS,
}

impl<SPI, CS> SpiRegisters<SPI, CS>
where
    SPI: Transfer<u8> + Write<u8>,
    CS: OutputPin,
{
    /// Wrap an SPI bus and its chip select line
    pub fn new(spi: SPI, cs: CS) -> Self {
        Self { spi, cs }
    }

    /// Give the bus and pin back
    pub fn release(self) -> (SPI, CS) {
        (self.spi, self.cs)
    }

    fn transaction<T>(
        &mut self,
        f: impl FnOnce(&mut SPI) -> Result<T, BusError>,
    ) -> Result<T, BusError> {
        self.cs.set_low().map_err(|_| BusError::Gpio)?;
        let result = f(&mut self.spi);
        self.cs.set_high().map_err(|_| BusError::Gpio)?;
        result
    }
}

impl<SPI, CS> RegisterAccess for SpiRegisters<SPI, CS>
where
    SPI: Transfer<u8> + Write<u8>,
    CS: OutputPin,
{
    type Error = BusError;

    fn read_register(&mut self, addr: u8) -> Result<u8, Self::Error> {
        self.transaction(|spi| {
            let mut buffer = [addr & 0x7F, 0];
            let response = spi.transfer(&mut buffer).map_err(|_| BusError::Spi)?;
            Ok(response[1])
        })
    }

    fn write_register(&mut self, addr: u8, value: u8) -> Result<(), Self::Error> {
        self.transaction(|spi| spi.write(&[addr | 0x80, value]).map_err(|_| BusError::Spi))
    }

    fn write_fifo(&mut self, data: &[u8]) -> Result<(), Self::Error> {
        self.transaction(|spi| {
            spi.write(&[REG_FIFO | 0x80]).map_err(|_| BusError::Spi)?;
            spi.write(data).map_err(|_| BusError::Spi)
        })
    }

    fn read_fifo(&mut self, buffer: &mut [u8]) -> Result<(), Self::Error> {
        self.transaction(|spi| {
            spi.write(&[REG_FIFO & 0x7F]).map_err(|_| BusError::Spi)?;
            buffer.fill(0);
            spi.transfer(buffer).map_err(|_| BusError::Spi)?;
            Ok(())
        })
    }
}
