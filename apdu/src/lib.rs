// Copyright (c) 2024-2025 The Keywarden Project

//! ISO 7816-4 APDU protocol types.
//!
//! A command APDU carries a five byte header `(CLA, INS, P1, P2, Lc)`
//! followed by `Lc` bytes of payload. Responses are an opaque byte string
//! trailed by a big-endian status word.
//!
//! Applications receive the full command bytes (header included) so that
//! commands with irregular layouts can re-read their own fields.

/// Length of the APDU command header
pub const APDU_HEADER_LEN: usize = 5;

/// APDU response status words
#[derive(Copy, Clone, Debug, PartialEq, Eq, strum::Display)]
#[repr(u16)]
pub enum StatusWord {
    /// Handler failed while executing the command
    ExecutionError = 0x6400,
    /// Command length is wrong
    WrongLength = 0x6700,
    /// Payload too short to be processed
    EmptyBuffer = 0x6982,
    /// Response does not fit the output buffer
    OutputBufferTooSmall = 0x6983,
    /// Payload failed validation
    DataInvalid = 0x6984,
    /// Command not allowed in the current state
    CommandNotAllowed = 0x6986,
    /// Instruction not known to the addressed application
    InsNotSupported = 0x6D00,
    /// No application registered for the class byte
    ClaNotSupported = 0x6E00,
    /// Unspecified failure
    Unknown = 0x6F00,
    /// OK
    Success = 0x9000,
}

impl StatusWord {
    /// Wire encoding, big-endian per ISO 7816-4
    pub fn to_be_bytes(self) -> [u8; 2] {
        (self as u16).to_be_bytes()
    }
}

/// Error parsing a command APDU
#[derive(Copy, Clone, Debug, PartialEq, thiserror::Error)]
pub enum ApduError {
    #[error("command must carry at least class and instruction bytes")]
    InvalidLength,
}

/// Parsed command APDU header.
///
/// Only the class and instruction bytes are required to be present;
/// trailing header fields default to zero so that routing still works for
/// short commands (the addressed application rejects them with
/// [`StatusWord::WrongLength`]).
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct CommandApdu {
    pub cla: u8,
    pub ins: u8,
    pub p1: u8,
    pub p2: u8,
    pub lc: u8,
}

impl CommandApdu {
    /// Parse the header of a command APDU
    pub fn parse(data: &[u8]) -> Result<Self, ApduError> {
        if data.len() < 2 {
            return Err(ApduError::InvalidLength);
        }

        Ok(Self {
            cla: data[0],
            ins: data[1],
            p1: data.get(2).copied().unwrap_or(0),
            p2: data.get(3).copied().unwrap_or(0),
            lc: data.get(4).copied().unwrap_or(0),
        })
    }
}

/// Package a response APDU as `data || status`.
///
/// Every command receives a packaged response, including failed ones; the
/// status word is the only error channel visible to the host.
pub fn package_response(data: &[u8], status: StatusWord) -> Vec<u8> {
    let mut resp = Vec::with_capacity(data.len() + 2);
    resp.extend_from_slice(data);
    resp.extend_from_slice(&status.to_be_bytes());
    resp
}
