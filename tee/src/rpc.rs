// Copyright (c) 2024-2025 The Keywarden Project

//! RPC endpoints over the mailbox, and the trusted-OS dispatch model.
//!
//! Both worlds see the mailbox through a pair of endpoints. The
//! non-secure send traps into the trusted OS, which runs the target
//! applet to completion — retrieve, process, write the reply, exit —
//! before control returns, so a client's `send → retrieve` sequence
//! always observes its own reply. Every client follows
//! `send → (wait) → retrieve`; every applet follows
//! `retrieve → process → write`.

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, error};

use crate::applet::Applet;
use crate::mailbox::{Mail, Mailbox, MailboxError};

/// Trusted-OS configuration errors
#[derive(Debug, thiserror::Error)]
pub enum OsError {
    #[error("applet {0} already registered")]
    DuplicateApplet(u32),
}

/// Secure-world endpoints, handed to running applets
#[derive(Clone)]
pub struct SecureRpc {
    mailbox: Arc<Mailbox>,
}

impl SecureRpc {
    /// Pull the pending request for an applet
    pub fn retrieve_mail(&self, app_id: u32) -> Result<Mail, MailboxError> {
        self.mailbox.retrieve_mail(app_id)
    }

    /// Push an applet's reply into the result slot
    pub fn write_response(&self, mail: Mail) -> Result<(), MailboxError> {
        self.mailbox.write_response(mail)
    }
}

/// Non-secure-world endpoints
#[derive(Clone)]
pub struct NonsecureRpc {
    os: Arc<TrustedOs>,
}

impl NonsecureRpc {
    /// Deposit a request and run secure-world dispatch.
    ///
    /// Fails `MailboxFull` while a request for the same applet is in
    /// flight; the client must retrieve before sending again.
    pub fn send_mail(&self, mail: Mail) -> Result<(), MailboxError> {
        self.os.mailbox.send_mail(mail)?;
        self.os.dispatch_pending();

        Ok(())
    }

    /// Pull the reply for an applet
    pub fn retrieve_result(&self, app_id: u32) -> Result<Mail, MailboxError> {
        self.os.mailbox.retrieve_result(app_id)
    }
}

/// The trusted OS: applet registry plus the dispatch the monitor runs
/// whenever the non-secure world deposits mail.
pub struct TrustedOs {
    mailbox: Arc<Mailbox>,
    applets: HashMap<u32, Box<dyn Applet>>,
}

impl TrustedOs {
    pub fn new() -> Self {
        Self {
            mailbox: Arc::new(Mailbox::new()),
            applets: HashMap::new(),
        }
    }

    /// Register an applet image. Ids are unique.
    pub fn register_applet(&mut self, applet: Box<dyn Applet>) -> Result<(), OsError> {
        let id = applet.id();

        if self.applets.contains_key(&id) {
            return Err(OsError::DuplicateApplet(id));
        }
        self.applets.insert(id, applet);

        Ok(())
    }

    /// Endpoints for the non-secure world
    pub fn nonsecure_rpc(self: &Arc<Self>) -> NonsecureRpc {
        NonsecureRpc { os: self.clone() }
    }

    /// Endpoints for secure-world applets
    pub fn secure_rpc(&self) -> SecureRpc {
        SecureRpc {
            mailbox: self.mailbox.clone(),
        }
    }

    /// Run every applet with pending mail to completion.
    ///
    /// Mail addressed to an unregistered applet is a wiring defect the
    /// device cannot recover from.
    fn dispatch_pending(&self) {
        let secure = self.secure_rpc();

        for app_id in self.mailbox.pending_ids() {
            let Some(applet) = self.applets.get(&app_id) else {
                panic!("cannot load applet {app_id}: not registered");
            };

            // Another dispatch round may already have consumed the slot
            let Ok(mail) = secure.retrieve_mail(app_id) else {
                continue;
            };

            debug!("running applet {app_id}");

            match applet.process(&mail.payload) {
                Ok(payload) => {
                    if let Err(e) = secure.write_response(Mail { app_id, payload }) {
                        error!("cannot write applet {app_id} response: {e}");
                    }
                }
                // The reply slot stays empty; the client observes NoResult
                Err(e) => error!("applet {app_id} crashed: {e}"),
            }
        }
    }
}

impl Default for TrustedOs {
    fn default() -> Self {
        Self::new()
    }
}
