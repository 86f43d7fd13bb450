// Copyright (c) 2024-2025 The Keywarden Project

//! Cryptographic primitives: entropy diversification, BIP32 derivation
//! paths and secp256k1 key derivation.
//!
//! Key material is deterministic from an on-device entropy source at
//! every power cycle; in this implementation the entropy is a
//! compile-time constant and a production device must replace it with a
//! hardware source.

use core::fmt;

use bip32::{ChildNumber, XPrv};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

mod token;
pub use token::{LocalToken, Token, TokenError};

/// BIP32 hardened derivation flag
pub const HARDENED_FLAG: u32 = 1 << 31;

/// Seed entropy. Stand-in for a hardware entropy source.
const DEFAULT_ENTROPY: [u8; 32] = [
    118, 252, 209, 103, //
    94, 240, 60, 245, //
    18, 224, 156, 240, //
    11, 232, 52, 25, //
    31, 134, 125, 135, //
    192, 2, 31, 206, //
    216, 100, 159, 234, //
    150, 9, 236, 57, //
];

/// HMAC key used to diversify the entropy into the wallet secret.
/// Secret diversification is vendor-specific.
const DIVERSIFIER: [u8; 82] = [
    116, 101, 110, 103, //
    32, 101, 32, 115, //
    111, 114, 100, 10, //
    116, 101, 110, 103, //
    32, 101, 32, 115, //
    111, 114, 100, 10, //
    116, 101, 110, 103, //
    32, 101, 32, 115, //
    111, 114, 100, 32, //
    111, 32, 118, 101, //
    114, 10, 102, 97, //
    99, 105, 116, 109, //
    32, 115, 116, 97, //
    32, 113, 117, 105, //
    101, 116, 10, 109, //
    32, 109, 97, 103, //
    110, 32, 109, 105, //
    108, 108, 39, 101, //
    117, 114, 32, 111, //
    32, 106, 117, 111, //
    114, 110,
];

/// Derive the 32-byte wallet secret, `HMAC-SHA256(diversifier, entropy)`.
///
/// Deterministic and idempotent: two calls always return the same value.
pub fn derive_secret() -> Result<[u8; 32], TokenError> {
    let mut mac = Hmac::<Sha256>::new_from_slice(&DIVERSIFIER)?;
    mac.update(&DEFAULT_ENTROPY);

    let mut secret = [0u8; 32];
    secret.copy_from_slice(&mac.finalize().into_bytes());

    Ok(secret)
}

/// Signing algorithms known to the token layer.
///
/// Encoded as the numeric identifier in RPC envelopes.
#[derive(Copy, Clone, Debug, PartialEq, Eq, strum::Display, Serialize, Deserialize)]
#[serde(into = "u32", try_from = "u32")]
#[repr(u32)]
pub enum Algorithm {
    Secp256k1 = 0,
}

/// Unknown [`Algorithm`] identifier
#[derive(Copy, Clone, Debug, PartialEq, thiserror::Error)]
#[error("unknown algorithm identifier {0}")]
pub struct UnknownAlgorithm(pub u32);

impl From<Algorithm> for u32 {
    fn from(a: Algorithm) -> Self {
        a as u32
    }
}

impl TryFrom<u32> for Algorithm {
    type Error = UnknownAlgorithm;

    fn try_from(v: u32) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(Algorithm::Secp256k1),
            _ => Err(UnknownAlgorithm(v)),
        }
    }
}

/// Error decoding a derivation path from its wire form
#[derive(Copy, Clone, Debug, PartialEq, thiserror::Error)]
#[error("derivation path must be {expected} bytes, received {received}")]
pub struct PathLengthError {
    pub expected: usize,
    pub received: usize,
}

/// Five-level BIP32 derivation path,
/// `m / purpose' / coin_type' / account' / change / address_index`.
///
/// Components are stored un-hardened; the first three are hardened at
/// derivation time.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivationPath {
    pub purpose: u32,
    pub coin_type: u32,
    pub account: u32,
    pub change: u32,
    pub address_index: u32,
}

impl DerivationPath {
    /// Wire form length, five little-endian u32 components
    pub const WIRE_LEN: usize = 20;

    /// Decode the 20-byte wire form.
    ///
    /// Hosts set the hardened bit on the first three components; it is
    /// stripped here and re-applied by [`key_from_path`].
    pub fn from_wire(data: &[u8]) -> Result<Self, PathLengthError> {
        if data.len() < Self::WIRE_LEN {
            return Err(PathLengthError {
                expected: Self::WIRE_LEN,
                received: data.len(),
            });
        }

        let word = |i: usize| {
            u32::from_le_bytes([data[4 * i], data[4 * i + 1], data[4 * i + 2], data[4 * i + 3]])
        };

        Ok(Self {
            purpose: HARDENED_FLAG ^ word(0),
            coin_type: HARDENED_FLAG ^ word(1),
            account: HARDENED_FLAG ^ word(2),
            change: word(3),
            address_index: word(4),
        })
    }

    /// Components in order, purpose first
    pub fn components(&self) -> [u32; 5] {
        [
            self.purpose,
            self.coin_type,
            self.account,
            self.change,
            self.address_index,
        ]
    }
}

impl fmt::Display for DerivationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "m/{}'/{}'/{}'/{}/{}",
            self.purpose, self.coin_type, self.account, self.change, self.address_index
        )
    }
}

/// BIP32 master key over secp256k1 for the provided seed
pub fn master_key(seed: &[u8]) -> Result<XPrv, bip32::Error> {
    XPrv::new(seed)
}

/// Derive the extended key at `path`, hardening the purpose, coin type
/// and account components.
pub fn key_from_path(master: &XPrv, path: &DerivationPath) -> Result<XPrv, bip32::Error> {
    let mut key = master.clone();

    for (idx, component) in path.components().into_iter().enumerate() {
        let number = match idx <= 2 {
            true => component.wrapping_add(HARDENED_FLAG),
            false => component,
        };

        key = key.derive_child(ChildNumber(number))?;
    }

    Ok(key)
}
