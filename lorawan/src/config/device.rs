use core::fmt;

use crate::crypto::CryptoError;

/// AES-128 key (16 bytes)
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct AESKey([u8; 16]);

impl AESKey {
    /// Wrap raw key bytes
    pub const fn new(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Raw key bytes
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl TryFrom<&[u8]> for AESKey {
    type Error = CryptoError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let key: [u8; 16] = bytes.try_into().map_err(|_| CryptoError::InvalidKeyLength)?;
        Ok(Self(key))
    }
}

// Keys never show up in logs.
impl fmt::Debug for AESKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AESKey(..)")
    }
}

/// Device address (4 bytes)
///
/// Stored most significant byte first, the way addresses are written down
/// (`7F000001` is `[0x7F, 0x00, 0x00, 0x01]`). On the air the order is reversed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DevAddr([u8; 4]);

impl DevAddr {
    /// Wrap raw address bytes, most significant first
    pub const fn new(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }

    /// Build an address from its numeric form
    pub const fn from_u32(addr: u32) -> Self {
        Self(addr.to_be_bytes())
    }

    /// Raw address bytes, most significant first
    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }

    /// Bytes in wire order (least significant first)
    pub fn to_wire(&self) -> [u8; 4] {
        let [a, b, c, d] = self.0;
        [d, c, b, a]
    }

    /// Rebuild an address from wire-order bytes
    pub fn from_wire(wire: [u8; 4]) -> Self {
        let [a, b, c, d] = wire;
        Self([d, c, b, a])
    }
}

impl fmt::Display for DevAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.0 {
            write!(f, "{:02X}", b)?;
        }
        Ok(())
    }
}

/// Session state for an ABP-provisioned device
///
/// Only the MAC layer mutates a session once it has been handed over.
#[derive(Debug, Clone)]
pub struct Session {
    dev_addr: DevAddr,
    nwk_skey: AESKey,
    app_skey: AESKey,
    fcnt_up: u16,
    last_fcnt_down: Option<u16>,
}

impl Session {
    /// Create a new session from statically provisioned (ABP) parameters
    pub fn new_abp(dev_addr: DevAddr, nwk_skey: AESKey, app_skey: AESKey) -> Self {
        Self {
            dev_addr,
            nwk_skey,
            app_skey,
            fcnt_up: 0,
            last_fcnt_down: None,
        }
    }

    /// Start the uplink counter at a given value, e.g. when restoring a session
    pub fn with_fcnt_up(mut self, fcnt_up: u16) -> Self {
        self.fcnt_up = fcnt_up;
        self
    }

    /// Mark a downlink counter as already consumed
    pub fn with_last_fcnt_down(mut self, fcnt_down: u16) -> Self {
        self.last_fcnt_down = Some(fcnt_down);
        self
    }

    /// Device address
    pub fn dev_addr(&self) -> DevAddr {
        self.dev_addr
    }

    /// Network session key (integrity)
    pub fn nwk_skey(&self) -> &AESKey {
        &self.nwk_skey
    }

    /// Application session key (payload encryption)
    pub fn app_skey(&self) -> &AESKey {
        &self.app_skey
    }

    /// Counter the next uplink will carry
    pub fn fcnt_up(&self) -> u16 {
        self.fcnt_up
    }

    /// Counter of the last accepted downlink, if any
    pub fn last_fcnt_down(&self) -> Option<u16> {
        self.last_fcnt_down
    }

    /// Whether a downlink with this counter would be new
    ///
    /// A counter that is not strictly greater than the last accepted one is a replay.
    pub fn is_fresh_downlink(&self, fcnt: u16) -> bool {
        match self.last_fcnt_down {
            None => true,
            Some(last) => fcnt > last,
        }
    }

    pub(crate) fn increment_fcnt_up(&mut self) {
        self.fcnt_up = self.fcnt_up.wrapping_add(1);
    }

    pub(crate) fn accept_fcnt_down(&mut self, fcnt: u16) {
        self.last_fcnt_down = Some(fcnt);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dev_addr_wire_order_is_reversed() {
        let addr = DevAddr::from_u32(0x7F00_0001);
        assert_eq!(addr.as_bytes(), &[0x7F, 0x00, 0x00, 0x01]);
        assert_eq!(addr.to_wire(), [0x01, 0x00, 0x00, 0x7F]);
        assert_eq!(DevAddr::from_wire(addr.to_wire()), addr);
    }

    #[test]
    fn test_key_from_slice_checks_length() {
        assert!(AESKey::try_from(&[0u8; 16][..]).is_ok());
        assert_eq!(
            AESKey::try_from(&[0u8; 15][..]),
            Err(CryptoError::InvalidKeyLength)
        );
        assert_eq!(
            AESKey::try_from(&[0u8; 17][..]),
            Err(CryptoError::InvalidKeyLength)
        );
    }

    #[test]
    fn test_uplink_counter_wraps() {
        let mut session = Session::new_abp(
            DevAddr::from_u32(1),
            AESKey::new([1; 16]),
            AESKey::new([2; 16]),
        )
        .with_fcnt_up(0xFFFF);
        session.increment_fcnt_up();
        assert_eq!(session.fcnt_up(), 0);
    }

    #[test]
    fn test_downlink_replay_window() {
        let mut session = Session::new_abp(
            DevAddr::from_u32(1),
            AESKey::new([1; 16]),
            AESKey::new([2; 16]),
        );
        assert!(session.is_fresh_downlink(0));
        session.accept_fcnt_down(5);
        assert!(!session.is_fresh_downlink(4));
        assert!(!session.is_fresh_downlink(5));
        assert!(session.is_fresh_downlink(6));
    }
}
