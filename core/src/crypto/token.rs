// Copyright (c) 2024-2025 The Keywarden Project

//! The [`Token`] capability: key derivation, signing and related
//! secret-handling operations.
//!
//! Dispatchers never operate on a shared token directly. The contract is
//! clone-per-use: clone the token, initialize the clone with the
//! request's derivation path, discard it afterwards, so derivation state
//! cannot leak between requests.

use bip32::XPrv;
use bip39::Mnemonic;
use k256::ecdsa::signature::hazmat::PrehashSigner;
use k256::ecdsa::Signature;
use k256::elliptic_curve::sec1::ToEncodedPoint;
use rand_core::{OsRng, RngCore};
use zeroize::Zeroize;

use super::{derive_secret, key_from_path, master_key, Algorithm, DerivationPath};

/// Token operation errors.
///
/// At the APDU layer these surface as `ExecutionError`; the cause is
/// only logged locally.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    /// Token has not been initialized with a derivation path
    #[error("token has not been initialized")]
    Uninitialized,

    /// Requested signing algorithm is not supported
    #[error("unsupported signing algorithm {0}")]
    UnsupportedAlgorithm(Algorithm),

    /// Zero-length random byte request
    #[error("requested bytes amount is zero")]
    ZeroRandomBytes,

    /// Operation is not available on this token variant
    #[error("operation is not available on this token")]
    Unavailable,

    /// Diversifier rejected as HMAC key
    #[error("invalid diversifier: {0}")]
    Diversifier(#[from] hmac::digest::InvalidLength),

    /// Key derivation failed
    #[error("key derivation failed: {0}")]
    Derivation(#[from] bip32::Error),

    /// Signing failed
    #[error("signing failed: {0}")]
    Signing(#[from] k256::ecdsa::Error),

    /// Mnemonic generation failed
    #[error("mnemonic generation failed: {0}")]
    Mnemonic(#[from] bip39::Error),

    /// Failure in a token backend (secure-world RPC and the like)
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Cryptographic capability executing secret derivation and signatures.
///
/// Two variants exist: [`LocalToken`] performs every operation
/// in-process, while the secure-world proxy forwards requests over the
/// mailbox RPC.
pub trait Token: Send {
    /// Fetch cryptographically secure random bytes, `amount > 0`
    fn random_bytes(&self, amount: u64) -> Result<Vec<u8>, TokenError>;

    /// Derive the device secret used as seed material
    fn derive_secret(&self) -> Result<[u8; 32], TokenError>;

    /// Initialize the token at a derivation path
    fn initialize(&mut self, path: DerivationPath) -> Result<(), TokenError>;

    /// Sign a digest with the key selected by [`Token::initialize`]
    fn sign(&self, digest: &[u8], algorithm: Algorithm) -> Result<Vec<u8>, TokenError>;

    /// Compressed SEC1 public key for the initialized path
    fn public_key(&self) -> Result<Vec<u8>, TokenError>;

    /// BIP39 mnemonic words for the device secret
    fn mnemonic(&self) -> Result<Vec<String>, TokenError>;

    /// Algorithms accepted by [`Token::sign`]
    fn supported_sign_algorithms(&self) -> Vec<Algorithm>;

    /// Independently re-initializable copy of this token.
    ///
    /// The copy shares no key state with the original; initializing it
    /// leaves the original untouched.
    fn clone_token(&self) -> Box<dyn Token>;
}

/// In-process [`Token`] holding the derived extended key.
///
/// Callers should [`Token::clone_token`] this instance and initialize
/// the clone.
#[derive(Clone, Default)]
pub struct LocalToken {
    key: Option<XPrv>,
}

impl LocalToken {
    pub fn new() -> Self {
        Self { key: None }
    }

    fn key(&self) -> Result<&XPrv, TokenError> {
        self.key.as_ref().ok_or(TokenError::Uninitialized)
    }
}

impl Token for LocalToken {
    fn random_bytes(&self, amount: u64) -> Result<Vec<u8>, TokenError> {
        if amount == 0 {
            return Err(TokenError::ZeroRandomBytes);
        }

        let mut bytes = vec![0u8; amount as usize];
        OsRng.fill_bytes(&mut bytes);

        Ok(bytes)
    }

    fn derive_secret(&self) -> Result<[u8; 32], TokenError> {
        derive_secret()
    }

    fn initialize(&mut self, path: DerivationPath) -> Result<(), TokenError> {
        let mut secret = self.derive_secret()?;

        let master = master_key(&secret)?;
        secret.zeroize();

        self.key = Some(key_from_path(&master, &path)?);

        Ok(())
    }

    fn sign(&self, digest: &[u8], algorithm: Algorithm) -> Result<Vec<u8>, TokenError> {
        if algorithm != Algorithm::Secp256k1 {
            return Err(TokenError::UnsupportedAlgorithm(algorithm));
        }

        let signature: Signature = self.key()?.private_key().sign_prehash(digest)?;

        Ok(signature.to_der().as_bytes().to_vec())
    }

    fn public_key(&self) -> Result<Vec<u8>, TokenError> {
        let verifying = self.key()?.private_key().verifying_key();

        Ok(verifying.to_encoded_point(true).as_bytes().to_vec())
    }

    fn mnemonic(&self) -> Result<Vec<String>, TokenError> {
        let secret = self.derive_secret()?;
        let mnemonic = Mnemonic::from_entropy(&secret)?;

        Ok(mnemonic.to_string().split(' ').map(String::from).collect())
    }

    fn supported_sign_algorithms(&self) -> Vec<Algorithm> {
        vec![Algorithm::Secp256k1]
    }

    fn clone_token(&self) -> Box<dyn Token> {
        Box::new(self.clone())
    }
}
