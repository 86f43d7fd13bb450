// Copyright (c) 2024-2025 The Keywarden Project

//! Single-slot request/response mailbox crossing the monitor boundary.

use std::collections::HashMap;
use std::sync::Mutex;

/// A mailbox entry, addressed by applet id
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Mail {
    pub app_id: u32,
    pub payload: Vec<u8>,
}

/// Mailbox protocol errors.
///
/// These never reach the host; they indicate a protocol violation by
/// the other world.
#[derive(Copy, Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum MailboxError {
    #[error("no mail")]
    NoMail,

    #[error("no result")]
    NoResult,

    #[error("mailbox full")]
    MailboxFull,

    #[error("result box full")]
    ResultBoxFull,
}

/// Two logically independent single-slot maps keyed by applet id:
/// `inbox` carries Non-Secure → Secure requests, `outbox` the replies.
///
/// Each slot is single-shot: writing to an occupied slot fails and
/// reading removes. Slot occupancy is what serializes the exchange —
/// at most one request is in flight per applet id, enforced by
/// slot-full errors rather than a lock shared across the boundary.
#[derive(Default)]
pub struct Mailbox {
    inbox: Mutex<HashMap<u32, Vec<u8>>>,
    outbox: Mutex<HashMap<u32, Vec<u8>>>,
}

impl Mailbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deposit a request for the secure world
    pub fn send_mail(&self, mail: Mail) -> Result<(), MailboxError> {
        let mut inbox = self.inbox.lock().unwrap();

        if inbox.contains_key(&mail.app_id) {
            return Err(MailboxError::MailboxFull);
        }
        inbox.insert(mail.app_id, mail.payload);

        Ok(())
    }

    /// Pull a pending request, removing it from the slot
    pub fn retrieve_mail(&self, app_id: u32) -> Result<Mail, MailboxError> {
        let payload = self
            .inbox
            .lock()
            .unwrap()
            .remove(&app_id)
            .ok_or(MailboxError::NoMail)?;

        Ok(Mail { app_id, payload })
    }

    /// Deposit a reply for the non-secure world
    pub fn write_response(&self, mail: Mail) -> Result<(), MailboxError> {
        let mut outbox = self.outbox.lock().unwrap();

        if outbox.contains_key(&mail.app_id) {
            return Err(MailboxError::ResultBoxFull);
        }
        outbox.insert(mail.app_id, mail.payload);

        Ok(())
    }

    /// Pull a reply, removing it from the slot
    pub fn retrieve_result(&self, app_id: u32) -> Result<Mail, MailboxError> {
        let payload = self
            .outbox
            .lock()
            .unwrap()
            .remove(&app_id)
            .ok_or(MailboxError::NoResult)?;

        Ok(Mail { app_id, payload })
    }

    /// Applet ids with undelivered requests
    pub fn pending_ids(&self) -> Vec<u32> {
        self.inbox.lock().unwrap().keys().copied().collect()
    }
}
