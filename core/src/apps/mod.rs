// Copyright (c) 2024-2025 The Keywarden Project

//! Application registry and APDU dispatch.
//!
//! An [`App`] owns one APDU class byte and a set of instructions. The
//! [`Handler`] routes incoming command APDUs to the registered app and
//! packages the result with a trailing status word. Execution always
//! returns a response to the host, handler errors included; the error
//! itself is only logged.

use std::collections::{BTreeMap, BTreeSet};

use log::{debug, warn};

use keywarden_apdu::{package_response, CommandApdu, StatusWord};

use crate::crypto::TokenError;

pub mod cosmos;

/// An application handling one APDU class and a set of instructions.
///
/// `data` is the full command APDU, header included, so apps with
/// irregular layouts can re-read their own fields.
pub trait App: Send {
    fn name(&self) -> &'static str;

    /// APDU class byte owned by this app
    fn id(&self) -> u8;

    /// Instruction bytes this app accepts
    fn commands(&self) -> Vec<u8>;

    /// Handle a command, returning the response payload
    fn handle(&mut self, command: u8, data: &[u8]) -> Result<Vec<u8>, AppError>;
}

/// Failure raised by an app handler.
///
/// Carries the status word reported to the host; the reason is local
/// log material only.
#[derive(Debug, thiserror::Error)]
#[error("{status}: {reason}")]
pub struct AppError {
    status: StatusWord,
    reason: String,
}

impl AppError {
    pub fn new(status: StatusWord, reason: impl Into<String>) -> Self {
        Self {
            status,
            reason: reason.into(),
        }
    }

    /// Status word to package into the response
    pub fn status(&self) -> StatusWord {
        self.status
    }
}

impl From<TokenError> for AppError {
    fn from(e: TokenError) -> Self {
        Self::new(StatusWord::ExecutionError, e.to_string())
    }
}

/// App registration errors
#[derive(Debug, thiserror::Error)]
pub enum RegisterError {
    #[error("mapping for {0} already exists")]
    DuplicateApp(&'static str),
}

/// Routes command APDUs to registered applications.
#[derive(Default)]
pub struct Handler {
    apps: BTreeMap<u8, Box<dyn App>>,
    commands: BTreeSet<(u8, u8)>,
}

impl Handler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an app, recording its class and every declared instruction.
    ///
    /// Registering a second app for an already claimed class fails.
    pub fn register(&mut self, app: Box<dyn App>) -> Result<(), RegisterError> {
        let id = app.id();

        if self.apps.contains_key(&id) {
            return Err(RegisterError::DuplicateApp(app.name()));
        }

        for command in app.commands() {
            self.commands.insert((id, command));
        }
        self.apps.insert(id, app);

        Ok(())
    }

    /// Route a command APDU to the appropriate app handler.
    ///
    /// Always returns a packaged response. Unknown instructions answer
    /// `ClaNotSupported`, the status deployed hosts expect from this
    /// device family.
    pub fn handle(&mut self, data: &[u8]) -> Vec<u8> {
        let capdu = match CommandApdu::parse(data) {
            Ok(v) => v,
            Err(e) => {
                warn!("unroutable apdu: {e}");
                return package_response(&[], StatusWord::ClaNotSupported);
            }
        };

        let Some(app) = self.apps.get_mut(&capdu.cla) else {
            warn!("app {:#04x} not supported", capdu.cla);
            return package_response(&[], StatusWord::ClaNotSupported);
        };

        if !self.commands.contains(&(capdu.cla, capdu.ins)) {
            warn!(
                "command {:#04x} not supported in app {}",
                capdu.ins,
                app.name()
            );
            return package_response(&[], StatusWord::ClaNotSupported);
        }

        debug!("dispatching command {:#04x} to {}", capdu.ins, app.name());

        match app.handle(capdu.ins, data) {
            Ok(response) => package_response(&response, StatusWord::Success),
            Err(e) => {
                warn!("{} handler failed: {e}", app.name());
                package_response(&[], e.status())
            }
        }
    }
}
