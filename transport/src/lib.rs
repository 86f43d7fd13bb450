// Copyright (c) 2024-2025 The Keywarden Project

//! USB HID transport for the Keywarden wallet.
//!
//! APDUs travel over 64-byte HID reports using the LedgerJS framing:
//! an init frame announces the total payload length and carries the first
//! 57 bytes, continuation frames carry 59 bytes each. All header fields
//! are big-endian. A [`Session`] reassembles one inbound APDU per channel
//! and chunks the response back into reports.

mod frame;
pub use frame::{peek_channel, ContinuationFrame, FrameError, InitFrame};

mod session;
pub use session::{encode_frames, Session};

/// HID report length in both directions
pub const REPORT_LEN: usize = 64;

/// Tag byte carried by every frame
pub const FRAME_TAG: u8 = 0x05;

/// Payload capacity of an init frame
pub const INIT_DATA_LEN: usize = 57;

/// Payload capacity of a continuation frame
pub const CONT_DATA_LEN: usize = 59;

/// A single 64-byte HID report
pub type Report = [u8; REPORT_LEN];
