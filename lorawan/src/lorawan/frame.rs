use heapless::Vec;

use crate::config::device::{DevAddr, Session};
use crate::config::radio::{FPort, RadioConfiguration};
use crate::crypto::MIC_SIZE;

/// MHDR + DevAddr + FCtrl + FCnt
pub const HEADER_SIZE: usize = 8;

/// Maximum application payload for this node, uplink and downlink
pub const MAX_PAYLOAD_SIZE: usize = 220;

/// Header, port and MIC around the payload
pub const FRAME_OVERHEAD: usize = HEADER_SIZE + 1 + MIC_SIZE;

/// Largest LoRa packet
pub const MAX_FRAME_SIZE: usize = 255;

/// Maximum FOpts length (4-bit field)
pub const MAX_FOPTS_SIZE: usize = 15;

/// Serialized frame
pub type FrameBuffer = Vec<u8, MAX_FRAME_SIZE>;

/// MAC header types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum MType {
    /// Join request
    JoinRequest = 0x00,
    /// Join accept
    JoinAccept = 0x20,
    /// Unconfirmed data uplink
    UnconfirmedDataUp = 0x40,
    /// Unconfirmed data downlink
    UnconfirmedDataDown = 0x60,
    /// Confirmed data uplink
    ConfirmedDataUp = 0x80,
    /// Confirmed data downlink
    ConfirmedDataDown = 0xA0,
    /// Rejoin request
    RejoinRequest = 0xC0,
    /// Proprietary
    Proprietary = 0xE0,
}

impl MType {
    /// Message type from the top bits of an MHDR byte
    pub fn from_mhdr(mhdr: u8) -> Self {
        match mhdr & 0xE0 {
            0x00 => MType::JoinRequest,
            0x20 => MType::JoinAccept,
            0x40 => MType::UnconfirmedDataUp,
            0x60 => MType::UnconfirmedDataDown,
            0x80 => MType::ConfirmedDataUp,
            0xA0 => MType::ConfirmedDataDown,
            0xC0 => MType::RejoinRequest,
            _ => MType::Proprietary,
        }
    }

    /// Data (or ACK) frame sent by the network
    pub fn is_data_down(&self) -> bool {
        matches!(self, MType::UnconfirmedDataDown | MType::ConfirmedDataDown)
    }

    /// Data frame that asks for an acknowledgement
    pub fn is_confirmed(&self) -> bool {
        matches!(self, MType::ConfirmedDataUp | MType::ConfirmedDataDown)
    }
}

/// Frame control flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FCtrl {
    /// Adaptive data rate enabled
    pub adr: bool,
    /// ADR acknowledgement requested
    pub adr_ack_req: bool,
    /// Acknowledges the last confirmed frame of the other direction
    pub ack: bool,
    /// More downlink data pending
    pub f_pending: bool,
    /// Length of FOpts
    pub f_opts_len: u8,
}

impl FCtrl {
    /// Wire representation
    pub fn to_byte(&self) -> u8 {
        let mut byte = self.f_opts_len & 0x0F;
        if self.adr {
            byte |= 0x80;
        }
        if self.adr_ack_req {
            byte |= 0x40;
        }
        if self.ack {
            byte |= 0x20;
        }
        if self.f_pending {
            byte |= 0x10;
        }
        byte
    }

    /// Parse the wire representation
    pub fn from_byte(byte: u8) -> Self {
        Self {
            adr: (byte & 0x80) != 0,
            adr_ack_req: (byte & 0x40) != 0,
            ack: (byte & 0x20) != 0,
            f_pending: (byte & 0x10) != 0,
            f_opts_len: byte & 0x0F,
        }
    }
}

/// Frame codec errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameError {
    /// Payload exceeds the regional maximum
    PayloadTooLarge,
    /// Buffer does not hold a well-formed data frame
    Malformed,
}

/// What kind of uplink to build
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameType {
    /// Application data on the configured port
    Data {
        /// Request an acknowledgement from the network
        confirmed: bool,
        /// Acknowledge the last confirmed downlink
        ack: bool,
    },
    /// Empty unconfirmed frame with the ACK bit set, port 0 if a payload follows
    Ack,
}

/// LoRaWAN data frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Message type
    pub mtype: MType,
    /// Device address
    pub dev_addr: DevAddr,
    /// Frame control
    pub f_ctrl: FCtrl,
    /// 16-bit frame counter
    pub f_cnt: u16,
    /// MAC commands carried in the header
    pub f_opts: Vec<u8, MAX_FOPTS_SIZE>,
    /// Port, present only if a payload follows
    pub f_port: Option<u8>,
    /// Payload, encrypted on the air
    pub payload: Vec<u8, MAX_PAYLOAD_SIZE>,
    /// Message integrity code
    pub mic: [u8; MIC_SIZE],
}

impl Frame {
    /// Serialize the frame, MIC included
    pub fn to_bytes(&self) -> Result<FrameBuffer, FrameError> {
        let mut buffer = FrameBuffer::new();
        let mut f_ctrl = self.f_ctrl;
        f_ctrl.f_opts_len = self.f_opts.len() as u8;

        buffer.push(self.mtype as u8).map_err(|_| FrameError::PayloadTooLarge)?;
        buffer
            .extend_from_slice(&self.dev_addr.to_wire())
            .map_err(|_| FrameError::PayloadTooLarge)?;
        buffer.push(f_ctrl.to_byte()).map_err(|_| FrameError::PayloadTooLarge)?;
        buffer
            .extend_from_slice(&self.f_cnt.to_le_bytes())
            .map_err(|_| FrameError::PayloadTooLarge)?;
        buffer
            .extend_from_slice(&self.f_opts)
            .map_err(|_| FrameError::PayloadTooLarge)?;
        if let Some(port) = self.f_port {
            buffer.push(port).map_err(|_| FrameError::PayloadTooLarge)?;
            buffer
                .extend_from_slice(&self.payload)
                .map_err(|_| FrameError::PayloadTooLarge)?;
        }
        buffer
            .extend_from_slice(&self.mic)
            .map_err(|_| FrameError::PayloadTooLarge)?;
        Ok(buffer)
    }
}

/// Build an uplink frame
///
/// The trailing MIC bytes are left zeroed for the caller to fill in. The payload is
/// written as given; encrypting it first is up to the caller.
pub fn encode(
    session: &Session,
    config: &RadioConfiguration,
    frame_type: FrameType,
    payload: &[u8],
) -> Result<FrameBuffer, FrameError> {
    let payload: Vec<u8, MAX_PAYLOAD_SIZE> =
        Vec::from_slice(payload).map_err(|_| FrameError::PayloadTooLarge)?;

    let (mtype, ack, port) = match frame_type {
        FrameType::Data { confirmed, ack } => {
            let mtype = if confirmed {
                MType::ConfirmedDataUp
            } else {
                MType::UnconfirmedDataUp
            };
            (mtype, ack, config.application_port.value())
        }
        FrameType::Ack => (MType::UnconfirmedDataUp, true, FPort::MAC),
    };

    let frame = Frame {
        mtype,
        dev_addr: session.dev_addr(),
        f_ctrl: FCtrl {
            ack,
            ..FCtrl::default()
        },
        f_cnt: session.fcnt_up(),
        f_opts: Vec::new(),
        f_port: if payload.is_empty() { None } else { Some(port) },
        payload,
        mic: [0; MIC_SIZE],
    };
    frame.to_bytes()
}

/// Parse a data frame
pub fn decode(bytes: &[u8]) -> Result<Frame, FrameError> {
    if bytes.len() < HEADER_SIZE + MIC_SIZE {
        return Err(FrameError::Malformed);
    }

    let f_ctrl = FCtrl::from_byte(bytes[5]);
    let opts_end = HEADER_SIZE + f_ctrl.f_opts_len as usize;
    let mic_start = bytes.len() - MIC_SIZE;
    if opts_end > mic_start {
        return Err(FrameError::Malformed);
    }

    let f_opts = Vec::from_slice(&bytes[HEADER_SIZE..opts_end]).map_err(|_| FrameError::Malformed)?;
    let (f_port, payload) = match &bytes[opts_end..mic_start] {
        [] => (None, Vec::new()),
        [port, rest @ ..] => (
            Some(*port),
            Vec::from_slice(rest).map_err(|_| FrameError::Malformed)?,
        ),
    };

    let mut mic = [0u8; MIC_SIZE];
    mic.copy_from_slice(&bytes[mic_start..]);

    Ok(Frame {
        mtype: MType::from_mhdr(bytes[0]),
        dev_addr: DevAddr::from_wire([bytes[1], bytes[2], bytes[3], bytes[4]]),
        f_ctrl,
        f_cnt: u16::from_le_bytes([bytes[6], bytes[7]]),
        f_opts,
        f_port,
        payload,
        mic,
    })
}
