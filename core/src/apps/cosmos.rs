// Copyright (c) 2024-2025 The Keywarden Project

//! Cosmos SDK application.
//!
//! Handles `GetVersion`, `SignSecp256K1` and `GetAddrSecp256K1`. Signing
//! is a multi-segment protocol: an init segment carries the derivation
//! path, add segments stream the transaction JSON, and the last segment
//! triggers validation and signature over `sha256(payload)`.

use bech32::{ToBase32, Variant};
use log::debug;
use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

use keywarden_apdu::{StatusWord, APDU_HEADER_LEN};

use super::{App, AppError};
use crate::crypto::{Algorithm, DerivationPath, Token};

const APP_NAME: &str = "COSMOS";
const APP_ID: u8 = 0x55;

/// Shortest processable command, the APDU header itself
const MIN_DATA_LEN: usize = APDU_HEADER_LEN;

const INS_GET_VERSION: u8 = 0x00;
const INS_SIGN_SECP256K1: u8 = 0x02;
const INS_GET_ADDR_SECP256K1: u8 = 0x04;

/// Version reported by `GetVersion`
const VERSION: [u8; 3] = [2, 0, 0];

/// Sign payload descriptors, APDU byte 2
const SIGN_INIT: u8 = 0;
const SIGN_ADD: u8 = 1;
const SIGN_LAST: u8 = 2;

/// Cosmos SDK command handler.
///
/// Holds at most one signature session; a new init segment replaces any
/// session in progress.
pub struct Cosmos {
    token: Box<dyn Token>,
    signature_session: Option<SignatureSession>,
}

/// Signature assembly state, created on init and destroyed after the
/// last segment regardless of the signing outcome.
struct SignatureSession {
    derivation_path: DerivationPath,
    data: Vec<u8>,
}

impl Cosmos {
    pub fn new(token: Box<dyn Token>) -> Self {
        Self {
            token,
            signature_session: None,
        }
    }

    fn handle_get_version(&self) -> Result<Vec<u8>, AppError> {
        // TestMode, Major, Minor, Patch, DeviceLocked
        Ok(vec![0, VERSION[0], VERSION[1], VERSION[2], 0])
    }

    fn handle_sign_secp256k1(&mut self, data: &[u8]) -> Result<Vec<u8>, AppError> {
        let descriptor = data[2];

        if self.signature_session.is_none() && descriptor != SIGN_INIT {
            return Err(AppError::new(
                StatusWord::ExecutionError,
                format!("sign descriptor {descriptor} with no session initialized"),
            ));
        }

        let payload = &data[APDU_HEADER_LEN..];

        match descriptor {
            SIGN_INIT => {
                // An init segment replaces any session in progress
                self.signature_session = None;

                let path_bytes = payload.get(..DerivationPath::WIRE_LEN).ok_or_else(|| {
                    AppError::new(
                        StatusWord::EmptyBuffer,
                        "init payload too short for a derivation path",
                    )
                })?;

                let path = DerivationPath::from_wire(path_bytes)
                    .map_err(|e| AppError::new(StatusWord::DataInvalid, e.to_string()))?;

                debug!("read derivation path in sign init: {path}");

                self.signature_session = Some(SignatureSession {
                    derivation_path: path,
                    data: Vec::new(),
                });
            }
            SIGN_ADD | SIGN_LAST => {
                if let Some(session) = self.signature_session.as_mut() {
                    debug!("writing {} bytes to signature session", payload.len());
                    session.data.extend_from_slice(payload);
                }
            }
            // Unknown descriptors on a live session are ignored
            _ => (),
        }

        if descriptor != SIGN_LAST {
            return Ok(Vec::new());
        }

        // The session ends here whether or not signing succeeds
        let Some(session) = self.signature_session.take() else {
            return Err(AppError::new(
                StatusWord::ExecutionError,
                "sign last with no session initialized",
            ));
        };

        // Syntactic JSON validation only, semantics are the host's concern
        if serde_json::from_slice::<serde::de::IgnoredAny>(&session.data).is_err() {
            return Err(AppError::new(
                StatusWord::DataInvalid,
                "provided signature data isn't JSON",
            ));
        }

        let digest = Sha256::digest(&session.data);

        // The init path may differ from whatever the shared token was
        // initialized with, so sign with a fresh clone
        let mut token = self.token.clone_token();
        token.initialize(session.derivation_path)?;

        let signature = token.sign(digest.as_slice(), Algorithm::Secp256k1)?;
        debug!("signature length {}", signature.len());

        Ok(signature)
    }

    fn handle_get_addr_secp256k1(&self, data: &[u8]) -> Result<Vec<u8>, AppError> {
        let req = GetAddressRequest::parse(data)?;
        req.validate()?;

        debug!("should display on device: {}", req.display_on_device());

        let hrp_end = GetAddressRequest::HRP_OFFSET + req.hrp_length as usize;
        let hrp_bytes = data.get(GetAddressRequest::HRP_OFFSET..hrp_end).ok_or_else(|| {
            AppError::new(StatusWord::EmptyBuffer, "payload too short for announced hrp")
        })?;
        let hrp = core::str::from_utf8(hrp_bytes)
            .map_err(|_| AppError::new(StatusWord::DataInvalid, "hrp is not valid utf-8"))?;

        let path_bytes = data
            .get(hrp_end..hrp_end + DerivationPath::WIRE_LEN)
            .ok_or_else(|| {
                AppError::new(
                    StatusWord::EmptyBuffer,
                    "payload too short for a derivation path",
                )
            })?;
        let path = DerivationPath::from_wire(path_bytes)
            .map_err(|e| AppError::new(StatusWord::DataInvalid, e.to_string()))?;

        debug!("request hrp {hrp}, derivation path {path}");

        let mut token = self.token.clone_token();
        token.initialize(path)?;

        let pubkey = token.public_key()?;
        let address = address_from_pubkey(&pubkey, hrp)?;

        debug!("address generation complete: {address}");

        let mut response = pubkey;
        response.extend_from_slice(address.as_bytes());

        Ok(response)
    }
}

impl App for Cosmos {
    fn name(&self) -> &'static str {
        APP_NAME
    }

    fn id(&self) -> u8 {
        APP_ID
    }

    fn commands(&self) -> Vec<u8> {
        vec![INS_GET_VERSION, INS_SIGN_SECP256K1, INS_GET_ADDR_SECP256K1]
    }

    fn handle(&mut self, command: u8, data: &[u8]) -> Result<Vec<u8>, AppError> {
        if data.len() < MIN_DATA_LEN {
            return Err(AppError::new(
                StatusWord::WrongLength,
                "data is too small to be processed",
            ));
        }

        match command {
            INS_GET_VERSION => self.handle_get_version(),
            INS_SIGN_SECP256K1 => self.handle_sign_secp256k1(data),
            INS_GET_ADDR_SECP256K1 => self.handle_get_addr_secp256k1(data),
            _ => Err(AppError::new(StatusWord::InsNotSupported, "command not found")),
        }
    }
}

/// `GetAddrSecp256K1` request header.
///
/// Layout after class and instruction: `P1`, `P2`, payload length, HRP
/// length, HRP string, 20-byte derivation path.
struct GetAddressRequest {
    p1: u8,
    payload_length: u8,
    hrp_length: u8,
}

impl GetAddressRequest {
    /// Offset of the HRP string within the command
    const HRP_OFFSET: usize = 6;

    fn parse(data: &[u8]) -> Result<Self, AppError> {
        if data.len() < Self::HRP_OFFSET {
            return Err(AppError::new(
                StatusWord::EmptyBuffer,
                "payload too short for an address request",
            ));
        }

        Ok(Self {
            p1: data[2],
            payload_length: data[4],
            hrp_length: data[5],
        })
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.p1 > 1 {
            return Err(AppError::new(
                StatusWord::ExecutionError,
                "first parameter cannot be greater than 1",
            ));
        }

        if self.payload_length == 0 {
            return Err(AppError::new(
                StatusWord::ExecutionError,
                "no payload specified but should be present",
            ));
        }

        if self.hrp_length < 1 || self.hrp_length > 83 {
            return Err(AppError::new(
                StatusWord::ExecutionError,
                format!(
                    "hrp length cannot be less than 1 or exceed 83, found {}",
                    self.hrp_length
                ),
            ));
        }

        Ok(())
    }

    fn display_on_device(&self) -> bool {
        self.p1 == 0x01
    }
}

/// Cosmos account address: `bech32(hrp, ripemd160(sha256(pubkey)))`
fn address_from_pubkey(pubkey: &[u8], hrp: &str) -> Result<String, AppError> {
    let sha = Sha256::digest(pubkey);
    let hash = Ripemd160::digest(sha.as_slice());

    bech32::encode(hrp, hash.as_slice().to_base32(), Variant::Bech32)
        .map_err(|e| AppError::new(StatusWord::ExecutionError, format!("bech32 encoding failed: {e}")))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::crypto::LocalToken;

    const COSMOS_PATH_WIRE: [u8; 20] = [
        0x2c, 0x00, 0x00, 0x80, //
        0x76, 0x00, 0x00, 0x80, //
        0x00, 0x00, 0x00, 0x80, //
        0x00, 0x00, 0x00, 0x00, //
        0x00, 0x00, 0x00, 0x00, //
    ];

    const STANDARD_PUBKEY: &str =
        "029ac8e45aa5c4bf453980d6f5fce78f6b7f55b42add2e7700709320ac8da8bb9e";

    fn cosmos() -> Cosmos {
        Cosmos::new(Box::new(LocalToken::new()))
    }

    fn sign_apdu(descriptor: u8, payload: &[u8]) -> Vec<u8> {
        let mut apdu = vec![APP_ID, INS_SIGN_SECP256K1, descriptor, 0x00, payload.len() as u8];
        apdu.extend_from_slice(payload);
        apdu
    }

    #[test]
    fn get_version() {
        let mut app = cosmos();

        let resp = app
            .handle(INS_GET_VERSION, &[APP_ID, 0x00, 0x00, 0x00, 0x00])
            .unwrap();

        assert_eq!(resp, &[0x00, 0x02, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn short_payload_fails_wrong_length() {
        let mut app = cosmos();

        let err = app.handle(INS_GET_VERSION, &[APP_ID, 0x00]).unwrap_err();
        assert_eq!(err.status(), StatusWord::WrongLength);
    }

    #[test]
    fn get_address() {
        let mut app = cosmos();

        let hrp = b"cosmos";
        let mut apdu = vec![
            APP_ID,
            INS_GET_ADDR_SECP256K1,
            0x00,
            0x00,
            (hrp.len() + 1 + COSMOS_PATH_WIRE.len()) as u8,
            hrp.len() as u8,
        ];
        apdu.extend_from_slice(hrp);
        apdu.extend_from_slice(&COSMOS_PATH_WIRE);

        let resp = app.handle(INS_GET_ADDR_SECP256K1, &apdu).unwrap();

        assert_eq!(hex::encode(&resp[..33]), STANDARD_PUBKEY);

        let address = core::str::from_utf8(&resp[33..]).unwrap();
        assert!(address.starts_with("cosmos1"), "address {address}");
    }

    #[test]
    fn get_address_rejects_invalid_p1() {
        let mut app = cosmos();

        let apdu = [APP_ID, INS_GET_ADDR_SECP256K1, 0x02, 0x00, 0x1a, 0x06];
        let err = app.handle(INS_GET_ADDR_SECP256K1, &apdu).unwrap_err();

        assert_eq!(err.status(), StatusWord::ExecutionError);
    }

    #[test]
    fn get_address_rejects_truncated_payload() {
        let mut app = cosmos();

        // Announces a 6-byte hrp but carries none
        let apdu = [APP_ID, INS_GET_ADDR_SECP256K1, 0x00, 0x00, 0x1a, 0x06];
        let err = app.handle(INS_GET_ADDR_SECP256K1, &apdu).unwrap_err();

        assert_eq!(err.status(), StatusWord::EmptyBuffer);
    }

    #[test]
    fn sign_transaction_roundtrip() {
        let mut app = cosmos();

        let json = br#"{"account_number":"1","chain_id":"testing","fee":{"amount":[],"gas":"200000"}}"#;
        let (first, second) = json.split_at(40);

        let resp = app
            .handle(INS_SIGN_SECP256K1, &sign_apdu(SIGN_INIT, &COSMOS_PATH_WIRE))
            .unwrap();
        assert!(resp.is_empty());

        let resp = app
            .handle(INS_SIGN_SECP256K1, &sign_apdu(SIGN_ADD, first))
            .unwrap();
        assert!(resp.is_empty());

        let signature = app
            .handle(INS_SIGN_SECP256K1, &sign_apdu(SIGN_LAST, second))
            .unwrap();

        // DER-encoded signature
        assert_eq!(signature[0], 0x30);

        // Session is destroyed, a bare add segment fails again
        let err = app
            .handle(INS_SIGN_SECP256K1, &sign_apdu(SIGN_ADD, first))
            .unwrap_err();
        assert_eq!(err.status(), StatusWord::ExecutionError);
    }

    #[test]
    fn sign_without_session_fails() {
        let mut app = cosmos();

        let err = app
            .handle(INS_SIGN_SECP256K1, &sign_apdu(SIGN_ADD, b"{}"))
            .unwrap_err();

        assert_eq!(err.status(), StatusWord::ExecutionError);
    }

    #[test]
    fn sign_rejects_non_json_payload() {
        let mut app = cosmos();

        app.handle(INS_SIGN_SECP256K1, &sign_apdu(SIGN_INIT, &COSMOS_PATH_WIRE))
            .unwrap();

        let err = app
            .handle(INS_SIGN_SECP256K1, &sign_apdu(SIGN_LAST, b"not json"))
            .unwrap_err();
        assert_eq!(err.status(), StatusWord::DataInvalid);

        // Failed signing also destroys the session
        let err = app
            .handle(INS_SIGN_SECP256K1, &sign_apdu(SIGN_ADD, b"{}"))
            .unwrap_err();
        assert_eq!(err.status(), StatusWord::ExecutionError);
    }

    #[test]
    fn sign_init_resets_running_session() {
        let mut app = cosmos();

        app.handle(INS_SIGN_SECP256K1, &sign_apdu(SIGN_INIT, &COSMOS_PATH_WIRE))
            .unwrap();
        app.handle(INS_SIGN_SECP256K1, &sign_apdu(SIGN_ADD, b"garbage"))
            .unwrap();

        // Restart discards the accumulated garbage
        app.handle(INS_SIGN_SECP256K1, &sign_apdu(SIGN_INIT, &COSMOS_PATH_WIRE))
            .unwrap();
        let signature = app
            .handle(INS_SIGN_SECP256K1, &sign_apdu(SIGN_LAST, b"{}"))
            .unwrap();

        assert_eq!(signature[0], 0x30);
    }

    #[test]
    fn sign_init_with_short_path_fails() {
        let mut app = cosmos();

        let err = app
            .handle(INS_SIGN_SECP256K1, &sign_apdu(SIGN_INIT, &[0x2c, 0x00]))
            .unwrap_err();

        assert_eq!(err.status(), StatusWord::EmptyBuffer);
    }
}
