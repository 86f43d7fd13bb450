// Copyright (c) 2024-2025 The Keywarden Project

//! End-to-end device scenarios: host-framed APDUs in, chunked
//! responses out.

use std::sync::Arc;

use keywarden_core::crypto::{derive_secret, LocalToken, Token};
use keywarden_tee::{applet::CryptoApplet, rpc::TrustedOs, token::TeeToken};
use keywarden_transport::encode_frames;

use keywarden_tests::*;

#[test]
fn get_version_roundtrip() {
    init_logging();

    let mut device = device();

    let frames = encode_frames(0x0101, &[0x55, 0x00, 0x00, 0x00, 0x00]);
    assert_eq!(frames.len(), 1);
    device.rx(&frames[0]);

    let reports = drain(&mut device);
    assert_eq!(reports.len(), 1);

    // Same channel, seven bytes announced, version plus Success trailer
    assert_eq!(&reports[0][..2], &[0x01, 0x01]);
    assert_eq!(
        &reports[0][5..14],
        &[0x00, 0x07, 0x00, 0x02, 0x00, 0x00, 0x00, 0x90, 0x00]
    );
}

#[test]
fn derive_secret_vector() {
    assert_eq!(hex::encode(derive_secret().unwrap()), STANDARD_SECRET);

    // Pure function of the embedded constants
    assert_eq!(derive_secret().unwrap(), derive_secret().unwrap());
}

#[test]
fn get_address() {
    let mut device = device();

    let response = exchange(&mut device, 0x0101, &get_addr_apdu("cosmos"));

    let (payload, status) = response.split_at(response.len() - 2);
    assert_eq!(status, &[0x90, 0x00]);

    assert_eq!(hex::encode(&payload[..33]), STANDARD_PUBKEY);

    let address = core::str::from_utf8(&payload[33..]).unwrap();
    assert!(address.starts_with("cosmos1"), "address {address}");
}

#[test]
fn multi_frame_sign_transaction() {
    let mut device = device();
    let channel = 0x0202;

    let json = br#"{"account_number":"0","chain_id":"testing","fee":{"amount":[{"amount":"5","denom":"photino"}],"gas":"200000"},"memo":"","msgs":[],"sequence":"1"}"#;
    let (first, second) = json.split_at(64);

    let response = exchange(&mut device, channel, &sign_apdu(0, &COSMOS_PATH_WIRE));
    assert_eq!(response, &[0x90, 0x00]);

    let response = exchange(&mut device, channel, &sign_apdu(1, first));
    assert_eq!(response, &[0x90, 0x00]);

    let response = exchange(&mut device, channel, &sign_apdu(2, second));
    let (signature, status) = response.split_at(response.len() - 2);
    assert_eq!(status, &[0x90, 0x00]);

    // DER-encoded ECDSA signature
    assert_eq!(signature[0], 0x30);
    assert_eq!(signature[1] as usize, signature.len() - 2);

    // The signature session is cleared, a new init must be accepted
    let response = exchange(&mut device, channel, &sign_apdu(0, &COSMOS_PATH_WIRE));
    assert_eq!(response, &[0x90, 0x00]);
}

#[test]
fn malformed_frame_answers_command_not_allowed() {
    let mut device = device();

    let mut report = encode_frames(0x0101, &[0x55, 0x00, 0x00, 0x00, 0x00])[0];
    report[2] = 0x06;
    device.rx(&report);

    let reports = drain(&mut device);
    assert_eq!(reports.len(), 1);
    assert_eq!(reassemble(&reports), &[0x69, 0x86]);

    // A subsequent init frame on a new channel succeeds
    let response = exchange(&mut device, 0x0303, &[0x55, 0x00, 0x00, 0x00, 0x00]);
    assert_eq!(response, &[0x00, 0x02, 0x00, 0x00, 0x00, 0x90, 0x00]);
}

#[test]
fn sign_payload_spanning_many_frames() {
    let mut device = device();
    let channel = 0x0404;

    // Large enough that single segments span multiple HID frames
    let filler = "x".repeat(400);
    let json = format!(r#"{{"memo":"{filler}"}}"#);

    let response = exchange(&mut device, channel, &sign_apdu(0, &COSMOS_PATH_WIRE));
    assert_eq!(response, &[0x90, 0x00]);

    // Segment payloads are bounded by the one-byte APDU length field
    for chunk in json.as_bytes().chunks(128) {
        let response = exchange(&mut device, channel, &sign_apdu(1, chunk));
        assert_eq!(response, &[0x90, 0x00]);
    }

    let response = exchange(&mut device, channel, &sign_apdu(2, b""));
    let (signature, status) = response.split_at(response.len() - 2);

    assert_eq!(status, &[0x90, 0x00]);
    assert_eq!(signature[0], 0x30);
}

#[test]
fn tee_device_signs_like_a_local_one() {
    let mut os = TrustedOs::new();
    os.register_applet(Box::new(CryptoApplet::new())).unwrap();
    let mut tee_device = device_with_token(Box::new(TeeToken::new(
        Arc::new(os).nonsecure_rpc(),
    )));

    let mut local_device = device();

    let json = br#"{"chain_id":"testing"}"#;

    for device in [&mut tee_device, &mut local_device] {
        let response = exchange(device, 0x0101, &sign_apdu(0, &COSMOS_PATH_WIRE));
        assert_eq!(response, &[0x90, 0x00]);
    }

    let tee_response = exchange(&mut tee_device, 0x0101, &sign_apdu(2, json));
    let local_response = exchange(&mut local_device, 0x0101, &sign_apdu(2, json));

    // Deterministic signing: both worlds produce the same signature
    assert_eq!(tee_response, local_response);
    assert_eq!(&tee_response[tee_response.len() - 2..], &[0x90, 0x00]);
}

#[test]
fn tee_device_serves_addresses() {
    let mut os = TrustedOs::new();
    os.register_applet(Box::new(CryptoApplet::new())).unwrap();
    let mut device = device_with_token(Box::new(TeeToken::new(
        Arc::new(os).nonsecure_rpc(),
    )));

    let response = exchange(&mut device, 0x0101, &get_addr_apdu("cosmos"));

    assert_eq!(&response[response.len() - 2..], &[0x90, 0x00]);
    assert_eq!(hex::encode(&response[..33]), STANDARD_PUBKEY);
}

#[test]
fn unknown_class_and_instruction() {
    let mut device = device();

    // Unknown class
    let response = exchange(&mut device, 0x0101, &[0xab, 0x00, 0x00, 0x00, 0x00]);
    assert_eq!(response, &[0x6e, 0x00]);

    // Known class, unknown instruction: source-compatible ClaNotSupported
    let response = exchange(&mut device, 0x0101, &[0x55, 0x7f, 0x00, 0x00, 0x00]);
    assert_eq!(response, &[0x6e, 0x00]);
}

#[test]
fn every_response_carries_a_status_word() {
    let mut device = device();

    let inputs: &[&[u8]] = &[
        &[0x55, 0x00, 0x00, 0x00, 0x00],
        &[0x55, 0x02, 0x09, 0x00, 0x00],
        &[0x55, 0x04, 0x00],
        &[0x00],
        &[],
    ];

    for (i, input) in inputs.iter().enumerate() {
        let response = exchange(&mut device, 0x0600 + i as u16, input);
        assert!(response.len() >= 2, "input {input:02x?}");

        let status = u16::from_be_bytes([response[response.len() - 2], response[response.len() - 1]]);
        assert!(
            matches!(status, 0x9000 | 0x6400 | 0x6700 | 0x6982 | 0x6984 | 0x6986 | 0x6d00 | 0x6e00),
            "status {status:#06x} for input {input:02x?}"
        );
    }
}

#[test]
fn token_clone_initialization_is_independent() {
    let mut original = LocalToken::new();
    original
        .initialize(keywarden_core::crypto::DerivationPath {
            purpose: 44,
            coin_type: 118,
            account: 0,
            change: 0,
            address_index: 0,
        })
        .unwrap();

    let before = original.public_key().unwrap();

    let mut clone = original.clone_token();
    clone
        .initialize(keywarden_core::crypto::DerivationPath {
            purpose: 44,
            coin_type: 118,
            account: 0,
            change: 0,
            address_index: 9,
        })
        .unwrap();

    assert_eq!(original.public_key().unwrap(), before);
    assert_ne!(clone.public_key().unwrap(), before);
}
