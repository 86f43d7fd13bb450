// Copyright (c) 2024-2025 The Keywarden Project

//! HID receive/transmit pump.
//!
//! Owns at most one transport [`Session`] at a time. Inbound reports
//! accumulate until the announced APDU is complete, the dispatcher runs,
//! and the chunked response is queued for the transmit side. Framing
//! errors reset the link: the offending channel receives a single
//! `CommandNotAllowed` response and the next init frame starts fresh.

use std::collections::VecDeque;

use log::{debug, warn};

use keywarden_apdu::{package_response, StatusWord};
use keywarden_transport::{encode_frames, peek_channel, Report, Session};

use crate::apps::Handler;

/// Pump between the USB layer and the APDU dispatcher.
pub struct HidHandler {
    apps: Handler,
    session: Option<Session>,
    outbound: VecDeque<Report>,
}

impl HidHandler {
    pub fn new(apps: Handler) -> Self {
        Self {
            apps,
            session: None,
            outbound: VecDeque::new(),
        }
    }

    /// Feed one inbound 64-byte report.
    ///
    /// Responses, when ready, appear on the outbound queue via
    /// [`HidHandler::tx`].
    pub fn rx(&mut self, report: &[u8]) {
        match self.session.as_mut() {
            None => match Session::new(report) {
                Ok(session) => self.session = Some(session),
                Err(e) => {
                    warn!("cannot open session: {e}");
                    self.reject(report);
                    return;
                }
            },
            Some(session) => {
                if let Err(e) = session.read_report(report) {
                    warn!("cannot read input data: {e}");
                    self.session = None;
                    self.reject(report);
                    return;
                }
            }
        }

        let Some(session) = self.session.as_ref() else {
            return;
        };

        if !session.is_complete() {
            debug!("should still read more data, continuing");
            return;
        }

        let response = self.apps.handle(session.data());
        let chunks = session.format_response(&response);

        self.session = None;
        self.outbound.extend(chunks);
    }

    /// Next queued outbound report, in emission order
    pub fn tx(&mut self) -> Option<Report> {
        self.outbound.pop_front()
    }

    /// Whether responses are waiting to be transmitted
    pub fn has_pending_tx(&self) -> bool {
        !self.outbound.is_empty()
    }

    // A report that cannot be parsed or sequenced answers
    // CommandNotAllowed on the channel it named, when readable.
    fn reject(&mut self, report: &[u8]) {
        let Some(channel) = peek_channel(report) else {
            return;
        };

        let response = package_response(&[], StatusWord::CommandNotAllowed);
        self.outbound.extend(encode_frames(channel, &response));
    }
}
