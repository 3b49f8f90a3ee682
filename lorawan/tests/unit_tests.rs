use lorawan_node::{
    config::{AESKey, ConfigError, DevAddr, FPort, RadioConfiguration, Session},
    crypto::{self, CryptoError, Direction},
    lorawan::{
        frame::{decode, encode, FrameError, FrameType, MType},
        region::{frf_bytes, Bandwidth, EU868, US902},
    },
};


#[test]
fn test_session_provisioning() {
    let session = mock::session();
    assert_eq!(session.dev_addr(), DevAddr::new([0x7F, 0x00, 0x00, 0x01]));
    assert_eq!(session.nwk_skey().as_bytes(), &mock::NWK_SKEY);
    assert_eq!(session.app_skey().as_bytes(), &mock::APP_SKEY);
    assert_eq!(session.fcnt_up(), 0);
    assert_eq!(session.last_fcnt_down(), None);
    assert!(session.is_fresh_downlink(0));

    let resumed = Session::new_abp(
        DevAddr::from_u32(1),
        AESKey::new([0; 16]),
        AESKey::new([0; 16]),
    )
    .with_last_fcnt_down(10);
    assert!(!resumed.is_fresh_downlink(10));
    assert!(resumed.is_fresh_downlink(11));
}

#[test]
fn test_key_length_is_checked() {
    let short: &[u8] = &[0u8; 15];
    assert_eq!(AESKey::try_from(short), Err(CryptoError::InvalidKeyLength));
    let exact: &[u8] = &[7u8; 16];
    assert_eq!(AESKey::try_from(exact).unwrap().as_bytes(), &[7u8; 16]);
}

#[test]
fn test_application_port_range() {
    assert_eq!(FPort::new(0), Err(ConfigError::InvalidPort(0)));
    assert_eq!(FPort::new(1).unwrap().value(), 1);
    assert_eq!(FPort::new(223).unwrap().value(), 223);
    assert_eq!(FPort::new(224), Err(ConfigError::InvalidPort(224)));
    assert_eq!(FPort::new(255), Err(ConfigError::InvalidPort(255)));
}

#[test]
fn test_regional_tables() {
    assert_eq!(EU868.channel_count(), 8);
    assert_eq!(EU868.frf(0), Some([0xD9, 0x06, 0x66]));
    assert_eq!(EU868.frf(EU868.rx2_channel()), Some([0xD9, 0x61, 0x99]));
    assert_eq!(EU868.frf(9), None);

    let dr0 = EU868.data_rate(0).unwrap();
    assert_eq!(dr0.spreading_factor, 12);
    assert_eq!(dr0.bandwidth, Bandwidth::Khz125);
    assert!(dr0.needs_low_data_rate_optimize());
    let dr6 = EU868.data_rate(6).unwrap();
    assert_eq!(dr6.spreading_factor, 7);
    assert_eq!(dr6.bandwidth, Bandwidth::Khz250);

    assert_eq!(US902.frf(0), Some([0xE1, 0xF9, 0x99]));
    assert!(US902.data_rate(5).is_none());
    assert_eq!(US902.data_rate(8).unwrap().bandwidth, Bandwidth::Khz500);
    assert_eq!(frf_bytes(923_300_000), [0xE6, 0xD3, 0x33]);
}

#[test]
fn test_frame_round_trip() {
    let session = mock::session().with_fcnt_up(0x1234);
    let mut config = RadioConfiguration::for_region(&EU868);
    config.application_port = FPort::new(42).unwrap();

    let payload = [0xA5u8; 220];
    let bytes = encode(
        &session,
        &config,
        FrameType::Data {
            confirmed: true,
            ack: false,
        },
        &payload,
    )
    .unwrap();
    assert_eq!(bytes.len(), 220 + 13);

    let frame = decode(&bytes).unwrap();
    assert_eq!(frame.mtype, MType::ConfirmedDataUp);
    assert_eq!(frame.dev_addr, session.dev_addr());
    assert_eq!(frame.f_cnt, 0x1234);
    assert_eq!(frame.f_port, Some(42));
    assert_eq!(&frame.payload[..], &payload[..]);

    assert_eq!(
        encode(
            &session,
            &config,
            FrameType::Data {
                confirmed: false,
                ack: false
            },
            &[0u8; 221]
        ),
        Err(FrameError::PayloadTooLarge)
    );
}

#[test]
fn test_decode_rejects_short_or_inconsistent_buffers() {
    assert_eq!(decode(&[0x60; 7]), Err(FrameError::Malformed));
    // FOpts length 15 in a 12-byte frame
    let bytes = [0x60, 1, 0, 0, 0x7F, 0x0F, 0, 0, 0, 0, 0, 0];
    assert_eq!(decode(&bytes), Err(FrameError::Malformed));
}

#[test]
fn test_crypto_encrypt_decrypt() {
    let key = AESKey::new(mock::APP_SKEY);
    let addr = DevAddr::from_u32(mock::DEV_ADDR);
    let data = b"Test Data";

    let encrypted = crypto::encrypt_payload(&key, addr, 0, Direction::Up, data).unwrap();
    assert_ne!(&encrypted[..], &data[..]);

    let decrypted = crypto::decrypt_payload(&key, addr, 0, Direction::Up, &encrypted).unwrap();
    assert_eq!(&decrypted[..], &data[..]);
}

#[test]
fn test_crypto_mic() {
    let key = AESKey::new(mock::NWK_SKEY);
    let addr = DevAddr::from_u32(mock::DEV_ADDR);
    let data = b"Test Data";

    let mic = crypto::compute_mic(&key, data, addr, 0, Direction::Up);
    assert_eq!(mic, crypto::compute_mic(&key, data, addr, 0, Direction::Up));

    let mut frame = [0u8; 13];
    frame[..9].copy_from_slice(data);
    frame[9..].copy_from_slice(&mic);
    assert!(crypto::verify_mic(&key, &frame, addr, 0, Direction::Up));
    assert!(!crypto::verify_mic(&key, &frame, addr, 1, Direction::Up));
}
