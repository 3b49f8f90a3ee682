//! LoRaWAN cryptographic operations
//!
//! This module provides the LoRaWAN 1.0 security primitives on top of AES-128:
//! - Message Integrity Code (MIC) computation and verification (AES-CMAC)
//! - Payload encryption/decryption (AES keystream over the `A_i` blocks)

use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockEncrypt, KeyInit};
use aes::Aes128;
use cmac::{Cmac, Mac};
use heapless::Vec;

use crate::config::device::{AESKey, DevAddr};

/// MIC size in bytes
pub const MIC_SIZE: usize = 4;

/// Largest buffer the copying helpers produce (a full LoRa packet)
pub const MAX_CRYPT_LEN: usize = 255;

/// Block size for AES-128
const BLOCK_SIZE: usize = 16;

/// Cryptographic errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CryptoError {
    /// Key material is not 16 bytes
    InvalidKeyLength,
    /// Payload longer than a LoRa packet
    PayloadTooLarge,
}

/// Direction identifiers for cryptographic operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    /// Uplink (device to network)
    Up = 0,
    /// Downlink (network to device)
    Down = 1,
}

/// Common layout of the `A_i` and `B0` blocks
fn header_block(tag: u8, dev_addr: DevAddr, fcnt: u32, dir: Direction, last: u8) -> [u8; BLOCK_SIZE] {
    let mut block = [0u8; BLOCK_SIZE];
    block[0] = tag;
    block[5] = dir as u8;
    block[6..10].copy_from_slice(&dev_addr.to_wire());
    block[10..14].copy_from_slice(&fcnt.to_le_bytes());
    block[15] = last;
    block
}

/// Encrypt or decrypt a payload in place
///
/// XORs the data with the keystream `S_i = aes(key, A_i)`, `i` starting at 1.
/// The same call decrypts.
pub fn crypt_payload_in_place(
    key: &AESKey,
    dev_addr: DevAddr,
    fcnt: u32,
    dir: Direction,
    data: &mut [u8],
) {
    let cipher = <Aes128 as KeyInit>::new(GenericArray::from_slice(key.as_bytes()));

    for (i, chunk) in data.chunks_mut(BLOCK_SIZE).enumerate() {
        let mut s = header_block(0x01, dev_addr, fcnt, dir, (i + 1) as u8);
        cipher.encrypt_block(GenericArray::from_mut_slice(&mut s));
        for (byte, k) in chunk.iter_mut().zip(s.iter()) {
            *byte ^= k;
        }
    }
}

/// Encrypt a payload
///
/// # Arguments
/// * `key` - AppSKey, or NwkSKey for port 0
/// * `dev_addr` - Device address
/// * `fcnt` - Frame counter
/// * `dir` - Message direction
/// * `payload` - Plaintext
pub fn encrypt_payload(
    key: &AESKey,
    dev_addr: DevAddr,
    fcnt: u32,
    dir: Direction,
    payload: &[u8],
) -> Result<Vec<u8, MAX_CRYPT_LEN>, CryptoError> {
    let mut buffer: Vec<u8, MAX_CRYPT_LEN> =
        Vec::from_slice(payload).map_err(|_| CryptoError::PayloadTooLarge)?;
    crypt_payload_in_place(key, dev_addr, fcnt, dir, &mut buffer);
    Ok(buffer)
}

/// Decrypt a payload; the keystream cipher is its own inverse
pub fn decrypt_payload(
    key: &AESKey,
    dev_addr: DevAddr,
    fcnt: u32,
    dir: Direction,
    ciphertext: &[u8],
) -> Result<Vec<u8, MAX_CRYPT_LEN>, CryptoError> {
    encrypt_payload(key, dev_addr, fcnt, dir, ciphertext)
}

fn mic_state(key: &AESKey, data: &[u8], dev_addr: DevAddr, fcnt: u32, dir: Direction) -> Cmac<Aes128> {
    let b0 = header_block(0x49, dev_addr, fcnt, dir, data.len() as u8);
    let mut mac = <Cmac<Aes128> as KeyInit>::new(GenericArray::from_slice(key.as_bytes()));
    mac.update(&b0);
    mac.update(data);
    mac
}

/// Compute the Message Integrity Code of a data frame
///
/// `cmac = aes128_cmac(NwkSKey, B0 | msg)`, MIC is `cmac[0..4]`.
///
/// # Arguments
/// * `key` - Network session key
/// * `data` - MHDR through FRMPayload (everything but the MIC)
/// * `dev_addr` - Device address
/// * `fcnt` - Frame counter
/// * `dir` - Message direction
pub fn compute_mic(
    key: &AESKey,
    data: &[u8],
    dev_addr: DevAddr,
    fcnt: u32,
    dir: Direction,
) -> [u8; MIC_SIZE] {
    let tag = mic_state(key, data, dev_addr, fcnt, dir).finalize().into_bytes();
    let mut mic = [0u8; MIC_SIZE];
    mic.copy_from_slice(&tag[..MIC_SIZE]);
    mic
}

/// Check the trailing MIC of a complete frame in constant time
pub fn verify_mic(
    key: &AESKey,
    frame: &[u8],
    dev_addr: DevAddr,
    fcnt: u32,
    dir: Direction,
) -> bool {
    if frame.len() < MIC_SIZE {
        return false;
    }
    let (data, mic) = frame.split_at(frame.len() - MIC_SIZE);
    mic_state(key, data, dev_addr, fcnt, dir)
        .verify_truncated_left(mic)
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr() -> DevAddr {
        DevAddr::from_u32(0x2601_1BDA)
    }

    #[test]
    fn test_keystream_is_symmetric_for_all_lengths() {
        let key = AESKey::new([0x2B; 16]);
        let mut plain = [0u8; 220];
        for (i, b) in plain.iter_mut().enumerate() {
            *b = i as u8;
        }
        for len in 0..=220 {
            let cipher = encrypt_payload(&key, addr(), 7, Direction::Up, &plain[..len]).unwrap();
            assert_eq!(cipher.len(), len);
            let back = decrypt_payload(&key, addr(), 7, Direction::Up, &cipher).unwrap();
            assert_eq!(&back[..], &plain[..len]);
        }
    }

    #[test]
    fn test_known_answer_uplink() {
        let nwk_skey = AESKey::new([
            0x2B, 0x7E, 0x15, 0x16, 0x28, 0xAE, 0xD2, 0xA6, 0xAB, 0xF7, 0x15, 0x88, 0x09, 0xCF,
            0x4F, 0x3C,
        ]);
        let app_skey = AESKey::new([
            0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0A, 0x0B, 0x0C, 0x0D,
            0x0E, 0x0F,
        ]);
        let cipher = encrypt_payload(&app_skey, addr(), 1, Direction::Up, b"Hello World!").unwrap();
        assert_eq!(
            &cipher[..],
            &[0x9A, 0x96, 0xC8, 0xF0, 0xFC, 0x81, 0xFC, 0xA8, 0xE1, 0xF7, 0x1E, 0x5C]
        );

        let mut frame = [0u8; 21];
        frame[..9].copy_from_slice(&[0x40, 0xDA, 0x1B, 0x01, 0x26, 0x00, 0x01, 0x00, 0x7B]);
        frame[9..].copy_from_slice(&cipher);
        assert_eq!(
            compute_mic(&nwk_skey, &frame, addr(), 1, Direction::Up),
            [0xFB, 0xA8, 0x48, 0x73]
        );
    }

    #[test]
    fn test_keystream_depends_on_direction_and_counter() {
        let key = AESKey::new([0x2B; 16]);
        let up = encrypt_payload(&key, addr(), 1, Direction::Up, b"abcd").unwrap();
        let down = encrypt_payload(&key, addr(), 1, Direction::Down, b"abcd").unwrap();
        let next = encrypt_payload(&key, addr(), 2, Direction::Up, b"abcd").unwrap();
        assert_ne!(up, down);
        assert_ne!(up, next);
    }

    #[test]
    fn test_oversized_payload_is_rejected() {
        let key = AESKey::new([0; 16]);
        let big = [0u8; MAX_CRYPT_LEN + 1];
        assert_eq!(
            encrypt_payload(&key, addr(), 0, Direction::Up, &big),
            Err(CryptoError::PayloadTooLarge)
        );
    }

    #[test]
    fn test_mic_is_deterministic_and_sensitive() {
        let key = AESKey::new([0x11; 16]);
        let data = [0x40, 0xDA, 0x1B, 0x01, 0x26, 0x00, 0x01, 0x00, 0x01, 0xAA];
        let mic = compute_mic(&key, &data, addr(), 1, Direction::Up);
        assert_eq!(mic, compute_mic(&key, &data, addr(), 1, Direction::Up));

        for i in 0..data.len() {
            let mut changed = data;
            changed[i] ^= 0x01;
            assert_ne!(mic, compute_mic(&key, &changed, addr(), 1, Direction::Up));
        }

        let mut other_key = [0x11; 16];
        other_key[15] = 0x12;
        assert_ne!(
            mic,
            compute_mic(&AESKey::new(other_key), &data, addr(), 1, Direction::Up)
        );
        assert_ne!(mic, compute_mic(&key, &data, addr(), 2, Direction::Up));
        assert_ne!(mic, compute_mic(&key, &data, addr(), 1, Direction::Down));
    }

    #[test]
    fn test_verify_accepts_own_mic_and_rejects_tampering() {
        let key = AESKey::new([0x11; 16]);
        let mut frame = [0x60, 0xDA, 0x1B, 0x01, 0x26, 0x00, 0x05, 0x00, 0, 0, 0, 0];
        let mic = compute_mic(&key, &frame[..8], addr(), 5, Direction::Down);
        frame[8..].copy_from_slice(&mic);
        assert!(verify_mic(&key, &frame, addr(), 5, Direction::Down));

        frame[11] ^= 0x80;
        assert!(!verify_mic(&key, &frame, addr(), 5, Direction::Down));
        assert!(!verify_mic(&key, &frame[..3], addr(), 5, Direction::Down));
    }
}
