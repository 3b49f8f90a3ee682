//! Simulated Class A node
//!
//! Runs the full MAC cycle against the in-memory RFM95 register file:
//! - ABP session provisioning
//! - Uplinks with channel hopping
//! - A scripted network downlink arriving in RX1
//! - Window timing reported on a virtual clock

use lorawan_node::{
    config::{AESKey, DevAddr, FPort, RadioConfiguration, Session},
    crypto::{self, Direction, MIC_SIZE},
    lorawan::{
        frame::{FCtrl, Frame, MType},
        mac::{CycleOutcome, MacLayer},
        region::EU868,
        timing::VirtualClock,
    },
    radio::{RadioDevice, Reception, RegisterModel},
};

const DEV_ADDR: u32 = 0x2601_1BDA;
const NWK_SKEY: [u8; 16] = [
    0x2B, 0x7E, 0x15, 0x16, 0x28, 0xAE, 0xD2, 0xA6, 0xAB, 0xF7, 0x15, 0x88, 0x09, 0xCF, 0x4F, 0x3C,
];
const APP_SKEY: [u8; 16] = [
    0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0A, 0x0B, 0x0C, 0x0D, 0x0E, 0x0F,
];

// What a network server would send back on port 2
fn network_downlink(fcnt: u16, text: &[u8]) -> Reception {
    let dev_addr = DevAddr::from_u32(DEV_ADDR);
    let mut payload = heapless::Vec::from_slice(text).unwrap();
    crypto::crypt_payload_in_place(
        &AESKey::new(APP_SKEY),
        dev_addr,
        fcnt as u32,
        Direction::Down,
        &mut payload,
    );
    let frame = Frame {
        mtype: MType::UnconfirmedDataDown,
        dev_addr,
        f_ctrl: FCtrl::default(),
        f_cnt: fcnt,
        f_opts: heapless::Vec::new(),
        f_port: Some(2),
        payload,
        mic: [0; MIC_SIZE],
    };
    let mut bytes = frame.to_bytes().unwrap();
    let split = bytes.len() - MIC_SIZE;
    let mic = crypto::compute_mic(
        &AESKey::new(NWK_SKEY),
        &bytes[..split],
        dev_addr,
        fcnt as u32,
        Direction::Down,
    );
    bytes[split..].copy_from_slice(&mic);
    Reception::packet(&bytes).unwrap()
}

fn main() {
    let session = Session::new_abp(
        DevAddr::from_u32(DEV_ADDR),
        AESKey::new(NWK_SKEY),
        AESKey::new(APP_SKEY),
    );

    let mut config = RadioConfiguration::for_region(&EU868);
    config.uplink_data_rate = 5;
    config.channel_hopping = true;
    config.application_port = FPort::new(10).unwrap();

    let radio = RadioDevice::new(RegisterModel::new(), &EU868);
    let mut node = MacLayer::new(radio, VirtualClock::new(), &EU868, session, config).unwrap();
    node.initialize().unwrap();

    node.radio_mut()
        .bus_mut()
        .push_reception(network_downlink(1, b"welcome"))
        .unwrap();

    for counter in 0..3 {
        let channel = node.config().uplink_channel;
        let text = format!("Hello, LoRaWAN! #{}", counter);
        let outcome = node.send_and_receive(text.as_bytes()).unwrap();
        let report = node.report();

        println!(
            "uplink {} on channel {}: tx done {} ms, RX1 {:?}, RX2 {:?}",
            counter, channel, report.tx_done_at, report.rx1_opened_at, report.rx2_opened_at
        );
        match outcome {
            CycleOutcome::Received { window, downlink } => println!(
                "  {:?} downlink on port {:?}: {:?} ({:?} dBm)",
                window,
                downlink.port,
                core::str::from_utf8(&downlink.payload).unwrap_or("<binary>"),
                downlink.rssi
            ),
            CycleOutcome::NoDownlink => println!("  no downlink"),
        }
    }
}
