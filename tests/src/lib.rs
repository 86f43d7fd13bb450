// Copyright (c) 2024-2025 The Keywarden Project

//! End-to-end scenario helpers for the Keywarden core.
//!
//! Tests drive the HID pump with host-framed reports, the way the USB
//! layer would, and reassemble the chunked responses on the host side.

use keywarden_core::{
    apps::{cosmos::Cosmos, Handler},
    crypto::{LocalToken, Token},
    hid::HidHandler,
};
use keywarden_transport::{encode_frames, Report, Session};

/// Initialise test logging, once
pub fn init_logging() {
    let _ = simplelog::SimpleLogger::init(log::LevelFilter::Debug, Default::default());
}

/// Cosmos application class byte
pub const COSMOS_CLA: u8 = 0x55;

/// `m/44'/118'/0'/0/0` in wire form, hardened bits set by the host
pub const COSMOS_PATH_WIRE: [u8; 20] = [
    0x2c, 0x00, 0x00, 0x80, //
    0x76, 0x00, 0x00, 0x80, //
    0x00, 0x00, 0x00, 0x80, //
    0x00, 0x00, 0x00, 0x00, //
    0x00, 0x00, 0x00, 0x00, //
];

/// Public key at [`COSMOS_PATH_WIRE`], compressed SEC1
pub const STANDARD_PUBKEY: &str =
    "029ac8e45aa5c4bf453980d6f5fce78f6b7f55b42add2e7700709320ac8da8bb9e";

/// Device secret derived from the embedded diversifier and entropy
pub const STANDARD_SECRET: &str =
    "10cbc65c342e07b730ffb0f48fe2c41e9776363c73ade5e699c4cccb1257188d";

/// Build a device pump around a local token
pub fn device() -> HidHandler {
    device_with_token(Box::new(LocalToken::new()))
}

/// Build a device pump around the provided token
pub fn device_with_token(token: Box<dyn Token>) -> HidHandler {
    let mut apps = Handler::new();
    apps.register(Box::new(Cosmos::new(token)))
        .expect("cosmos registration");

    HidHandler::new(apps)
}

/// Drain every queued outbound report
pub fn drain(hid: &mut HidHandler) -> Vec<Report> {
    let mut reports = vec![];
    while let Some(report) = hid.tx() {
        reports.push(report);
    }
    reports
}

/// Reassemble device reports into the response APDU, host side
pub fn reassemble(reports: &[Report]) -> Vec<u8> {
    let mut session = Session::new(&reports[0]).expect("response init frame");
    for report in &reports[1..] {
        session.read_report(report).expect("response continuation");
    }

    assert!(session.is_complete(), "partial response transmission");
    session.data().to_vec()
}

/// Exchange one APDU with the device over a channel, returning the full
/// response including the status word trailer
pub fn exchange(hid: &mut HidHandler, channel: u16, apdu: &[u8]) -> Vec<u8> {
    for frame in encode_frames(channel, apdu) {
        hid.rx(&frame);
    }

    let reports = drain(hid);
    assert!(!reports.is_empty(), "device produced no response");

    reassemble(&reports)
}

/// Build a `SignSecp256K1` APDU segment
pub fn sign_apdu(descriptor: u8, payload: &[u8]) -> Vec<u8> {
    let mut apdu = vec![
        COSMOS_CLA,
        0x02,
        descriptor,
        0x00,
        payload.len() as u8,
    ];
    apdu.extend_from_slice(payload);
    apdu
}

/// Build a `GetAddrSecp256K1` APDU for an HRP and the standard path
pub fn get_addr_apdu(hrp: &str) -> Vec<u8> {
    let mut apdu = vec![
        COSMOS_CLA,
        0x04,
        0x00,
        0x00,
        (1 + hrp.len() + COSMOS_PATH_WIRE.len()) as u8,
        hrp.len() as u8,
    ];
    apdu.extend_from_slice(hrp.as_bytes());
    apdu.extend_from_slice(&COSMOS_PATH_WIRE);
    apdu
}
