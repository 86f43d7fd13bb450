// Copyright (c) 2024-2025 The Keywarden Project

//! Token RPC envelopes.
//!
//! Requests and responses cross the mailbox as JSON envelopes
//! `{"id": <u32>, ...}`; the id tag drives dispatch to the typed
//! request handlers. Binary fields travel base64-encoded.

use serde::{Deserialize, Serialize};

use keywarden_core::crypto::{Algorithm, DerivationPath, Token, TokenError};

pub const REQUEST_RANDOM_BYTES: u32 = 0;
pub const REQUEST_SIGN: u32 = 1;
pub const REQUEST_PUBLIC_KEY: u32 = 2;
pub const REQUEST_MNEMONIC: u32 = 3;
pub const REQUEST_SUPPORTED_SIGN_ALGORITHMS: u32 = 4;

/// serde adapter encoding `Vec<u8>` fields as base64 strings
mod b64 {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        STANDARD.encode(data).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

/// Envelope header, used to peek the request id before typed decoding
#[derive(Deserialize)]
struct Envelope {
    id: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RandomBytesRequest {
    pub id: u32,
    pub amount: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RandomBytesResponse {
    pub id: u32,
    #[serde(with = "b64")]
    pub data: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SignRequest {
    pub id: u32,
    #[serde(with = "b64")]
    pub data: Vec<u8>,
    pub derivation_path: DerivationPath,
    pub algorithm: Algorithm,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SignResponse {
    pub id: u32,
    #[serde(with = "b64")]
    pub data: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PublicKeyRequest {
    pub id: u32,
    pub derivation_path: DerivationPath,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PublicKeyResponse {
    pub id: u32,
    #[serde(with = "b64")]
    pub data: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MnemonicRequest {
    pub id: u32,
    pub derivation_path: DerivationPath,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MnemonicResponse {
    pub id: u32,
    pub words: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SupportedSignAlgorithmsRequest {
    pub id: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SupportedSignAlgorithmsResponse {
    pub id: u32,
    pub algorithms: Vec<Algorithm>,
}

/// Envelope dispatch errors
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("cannot read request envelope: {0}")]
    Envelope(#[from] serde_json::Error),

    #[error("cannot handle request id {0}")]
    UnknownRequest(u32),

    #[error("token operation failed: {0}")]
    Token(#[from] TokenError),
}

/// Requested operation id of an encoded envelope
pub fn requested_op(data: &[u8]) -> Result<u32, serde_json::Error> {
    serde_json::from_slice::<Envelope>(data).map(|e| e.id)
}

/// Handle one request envelope with the provided token.
///
/// Key operations run on a freshly initialized clone, the same
/// clone-per-use contract the APDU layer follows.
pub fn dispatch(data: &[u8], token: &dyn Token) -> Result<Vec<u8>, DispatchError> {
    let id = requested_op(data)?;

    log::debug!("dispatching secure request id {id}");

    let response = match id {
        REQUEST_RANDOM_BYTES => {
            let req: RandomBytesRequest = serde_json::from_slice(data)?;

            let data = token.random_bytes(req.amount)?;

            serde_json::to_vec(&RandomBytesResponse { id, data })?
        }
        REQUEST_SIGN => {
            let req: SignRequest = serde_json::from_slice(data)?;

            let mut session_token = token.clone_token();
            session_token.initialize(req.derivation_path)?;

            let data = session_token.sign(&req.data, req.algorithm)?;

            serde_json::to_vec(&SignResponse { id, data })?
        }
        REQUEST_PUBLIC_KEY => {
            let req: PublicKeyRequest = serde_json::from_slice(data)?;

            let mut session_token = token.clone_token();
            session_token.initialize(req.derivation_path)?;

            let data = session_token.public_key()?;

            serde_json::to_vec(&PublicKeyResponse { id, data })?
        }
        REQUEST_MNEMONIC => {
            let req: MnemonicRequest = serde_json::from_slice(data)?;

            let mut session_token = token.clone_token();
            session_token.initialize(req.derivation_path)?;

            let words = session_token.mnemonic()?;

            serde_json::to_vec(&MnemonicResponse { id, words })?
        }
        REQUEST_SUPPORTED_SIGN_ALGORITHMS => serde_json::to_vec(&SupportedSignAlgorithmsResponse {
            id,
            algorithms: token.supported_sign_algorithms(),
        })?,
        other => return Err(DispatchError::UnknownRequest(other)),
    };

    Ok(response)
}
