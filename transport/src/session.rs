// Copyright (c) 2024-2025 The Keywarden Project

//! Per-channel APDU reassembly.

use encdec::DecodeOwned;
use log::debug;

use crate::{
    frame::{ContinuationFrame, FrameError, InitFrame},
    Report, CONT_DATA_LEN, INIT_DATA_LEN,
};

/// A single data transmission session, identified by its channel id.
///
/// Created from the init frame of a transmission, fed continuation
/// frames until the announced payload length has been accumulated.
/// Continuation indices must be monotonic by one, and the buffer is
/// truncated to the announced length on completion.
#[derive(Clone, Debug)]
pub struct Session {
    channel_id: u16,
    next_expected_index: u16,
    buffer: Vec<u8>,
    remaining: u16,
    complete: bool,
}

impl Session {
    /// Create a session from the init frame of a transmission
    pub fn new(report: &[u8]) -> Result<Self, FrameError> {
        let (frame, _) = InitFrame::decode_owned(report)?;
        frame.validate()?;

        // Init frames carry index zero, anything else means we joined a
        // transmission half way through
        if frame.packet_index != 0 {
            return Err(FrameError::OutOfOrder {
                expected: 0,
                received: frame.packet_index,
            });
        }

        let mut session = Self {
            channel_id: frame.channel_id,
            next_expected_index: 1,
            buffer: Vec::with_capacity(frame.data_length as usize),
            remaining: frame.data_length,
            complete: false,
        };

        session.buffer.extend_from_slice(&frame.data);
        session.truncate_if_complete();

        debug!(
            "new session: channel {:#06x}, announced {} bytes",
            session.channel_id, session.remaining
        );

        Ok(session)
    }

    /// Read a continuation report into the session
    pub fn read_report(&mut self, report: &[u8]) -> Result<(), FrameError> {
        if self.complete {
            return Err(FrameError::SessionComplete);
        }

        let (frame, _) = ContinuationFrame::decode_owned(report)?;
        frame.validate()?;

        if frame.channel_id != self.channel_id {
            return Err(FrameError::ChannelMismatch {
                expected: self.channel_id,
                received: frame.channel_id,
            });
        }

        if frame.packet_index != self.next_expected_index {
            return Err(FrameError::OutOfOrder {
                expected: self.next_expected_index,
                received: frame.packet_index,
            });
        }

        self.buffer.extend_from_slice(&frame.data);
        self.next_expected_index += 1;
        self.truncate_if_complete();

        Ok(())
    }

    // Frames are appended whole, so the buffer overshoots the announced
    // total on the last one and must be trimmed back to it.
    fn truncate_if_complete(&mut self) {
        if self.buffer.len() >= self.remaining as usize {
            self.buffer.truncate(self.remaining as usize);
            self.complete = true;
        }
    }

    /// Whether the announced payload has been fully received
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Channel id of this session
    pub fn channel_id(&self) -> u16 {
        self.channel_id
    }

    /// Reassembled payload, truncated to the announced length once complete
    pub fn data(&self) -> &[u8] {
        &self.buffer
    }

    /// Chunk a response into reports on this session's channel
    pub fn format_response(&self, data: &[u8]) -> Vec<Report> {
        encode_frames(self.channel_id, data)
    }
}

/// Chunk a payload into HID reports.
///
/// The init frame announces the total length and carries up to 57 bytes,
/// continuations carry 59 bytes each. The same framing serves both
/// directions, so hosts use this to emit commands and devices to emit
/// responses.
pub fn encode_frames(channel_id: u16, data: &[u8]) -> Vec<Report> {
    let first = data.len().min(INIT_DATA_LEN);
    let rest = &data[first..];

    let mut reports = Vec::with_capacity(1 + rest.len().div_ceil(CONT_DATA_LEN));

    reports.push(InitFrame::new(channel_id, 0, data.len() as u16, &data[..first]).to_report());

    for (i, chunk) in rest.chunks(CONT_DATA_LEN).enumerate() {
        reports.push(ContinuationFrame::new(channel_id, (i + 1) as u16, chunk).to_report());
    }

    reports
}
