// Copyright (c) 2024-2025 The Keywarden Project

//! Secure-world proxy token.

use anyhow::Context;
use serde::{de::DeserializeOwned, Serialize};

use keywarden_core::crypto::{Algorithm, DerivationPath, Token, TokenError};

use crate::mailbox::Mail;
use crate::request::{
    MnemonicRequest, MnemonicResponse, PublicKeyRequest, PublicKeyResponse, RandomBytesRequest,
    RandomBytesResponse, SignRequest, SignResponse, REQUEST_MNEMONIC, REQUEST_PUBLIC_KEY,
    REQUEST_RANDOM_BYTES, REQUEST_SIGN,
};
use crate::rpc::NonsecureRpc;
use crate::CRYPTO_APPLET_ID;

/// [`Token`] proxy marshalling every operation across the monitor
/// boundary.
///
/// Holds the derivation path only; key material lives and dies inside
/// the secure world. The single-slot mailbox serializes the exchange,
/// so a request observes exactly its own reply.
#[derive(Clone)]
pub struct TeeToken {
    rpc: NonsecureRpc,
    path: DerivationPath,
}

impl TeeToken {
    pub fn new(rpc: NonsecureRpc) -> Self {
        Self {
            rpc,
            path: DerivationPath::default(),
        }
    }

    fn do_request<R: DeserializeOwned>(
        &self,
        request: &impl Serialize,
    ) -> Result<R, TokenError> {
        let payload = serde_json::to_vec(request).context("cannot package request")?;

        self.rpc
            .send_mail(Mail {
                app_id: CRYPTO_APPLET_ID,
                payload,
            })
            .context("cannot deliver mail")?;

        let result = self
            .rpc
            .retrieve_result(CRYPTO_APPLET_ID)
            .context("no response from the secure world")?;

        let response = serde_json::from_slice(&result.payload).context("cannot unpack response")?;

        Ok(response)
    }
}

impl Token for TeeToken {
    fn random_bytes(&self, amount: u64) -> Result<Vec<u8>, TokenError> {
        let resp: RandomBytesResponse = self.do_request(&RandomBytesRequest {
            id: REQUEST_RANDOM_BYTES,
            amount,
        })?;

        Ok(resp.data)
    }

    // The device secret never leaves the secure world
    fn derive_secret(&self) -> Result<[u8; 32], TokenError> {
        Err(TokenError::Unavailable)
    }

    fn initialize(&mut self, path: DerivationPath) -> Result<(), TokenError> {
        self.path = path;
        Ok(())
    }

    fn sign(&self, digest: &[u8], algorithm: Algorithm) -> Result<Vec<u8>, TokenError> {
        let resp: SignResponse = self.do_request(&SignRequest {
            id: REQUEST_SIGN,
            data: digest.to_vec(),
            derivation_path: self.path,
            algorithm,
        })?;

        Ok(resp.data)
    }

    fn public_key(&self) -> Result<Vec<u8>, TokenError> {
        let resp: PublicKeyResponse = self.do_request(&PublicKeyRequest {
            id: REQUEST_PUBLIC_KEY,
            derivation_path: self.path,
        })?;

        Ok(resp.data)
    }

    fn mnemonic(&self) -> Result<Vec<String>, TokenError> {
        let resp: MnemonicResponse = self.do_request(&MnemonicRequest {
            id: REQUEST_MNEMONIC,
            derivation_path: self.path,
        })?;

        Ok(resp.words)
    }

    fn supported_sign_algorithms(&self) -> Vec<Algorithm> {
        vec![Algorithm::Secp256k1]
    }

    fn clone_token(&self) -> Box<dyn Token> {
        Box::new(self.clone())
    }
}
