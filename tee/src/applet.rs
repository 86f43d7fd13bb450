// Copyright (c) 2024-2025 The Keywarden Project

//! Secure-world applets.
//!
//! An applet is loaded on demand to service a single request: the
//! trusted OS hands it the pending mail, it processes the payload and
//! returns the reply, then exits. Applets hold no state between
//! requests.

use keywarden_core::crypto::LocalToken;

use crate::request;

/// A secure-world program servicing one mailbox request at a time
pub trait Applet: Send + Sync {
    /// Applet id, the mailbox routing key
    fn id(&self) -> u32;

    /// Service one request payload, returning the reply payload.
    ///
    /// A failure here is the applet crashing: no reply is written and
    /// the non-secure client observes an empty result slot.
    fn process(&self, payload: &[u8]) -> anyhow::Result<Vec<u8>>;
}

/// The cryptography applet: token request dispatch over an in-process
/// token, keys derived and used entirely inside the secure world.
#[derive(Default)]
pub struct CryptoApplet {
    token: LocalToken,
}

impl CryptoApplet {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Applet for CryptoApplet {
    fn id(&self) -> u32 {
        crate::CRYPTO_APPLET_ID
    }

    fn process(&self, payload: &[u8]) -> anyhow::Result<Vec<u8>> {
        let response = request::dispatch(payload, &self.token)?;

        Ok(response)
    }
}
