// Copyright (c) 2024-2025 The Keywarden Project

//! HID frame types and their wire codecs.
//!
//! Whether a report is an init or a continuation frame is decided by
//! session state, not by the frame's own content, so both types decode
//! from the same 64 bytes and validation is left to the caller.

use encdec::{DecodeOwned, Encode};

use crate::{CONT_DATA_LEN, FRAME_TAG, INIT_DATA_LEN, REPORT_LEN};

/// HID framing errors
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum FrameError {
    #[error("report must be exactly {REPORT_LEN} bytes, received {0}")]
    InvalidLength(usize),

    #[error("invalid frame tag {0:#04x}")]
    InvalidTag(u8),

    #[error("channel id cannot be zero")]
    ZeroChannel,

    #[error("out-of-order packet: expecting {expected}, received {received}")]
    OutOfOrder { expected: u16, received: u16 },

    #[error("different channel id: expecting {expected:#06x}, received {received:#06x}")]
    ChannelMismatch { expected: u16, received: u16 },

    #[error("cannot read any more data in this session")]
    SessionComplete,

    #[error("frame codec error")]
    Codec,
}

impl From<encdec::Error> for FrameError {
    fn from(_: encdec::Error) -> Self {
        Self::Codec
    }
}

/// First frame of a transmission.
///
/// ## Encoding
///
/// ```text
/// 0        2     3         5          7                 64
/// +--------+-----+---------+----------+------------------+
/// | CHANNEL| TAG | PKT IDX | DATA LEN |   DATA (57)      |
/// +--------+-----+---------+----------+------------------+
/// ```
///
/// `data_length` announces the length of the whole payload, which may
/// span many frames.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct InitFrame {
    pub channel_id: u16,
    pub tag: u8,
    pub packet_index: u16,
    pub data_length: u16,
    pub data: [u8; INIT_DATA_LEN],
}

/// Continuation frame, `packet_index >= 1`.
///
/// Carries no length field; it consumes from the total announced by the
/// init frame.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ContinuationFrame {
    pub channel_id: u16,
    pub tag: u8,
    pub packet_index: u16,
    pub data: [u8; CONT_DATA_LEN],
}

impl InitFrame {
    pub fn new(channel_id: u16, packet_index: u16, data_length: u16, payload: &[u8]) -> Self {
        let mut data = [0u8; INIT_DATA_LEN];
        data[..payload.len()].copy_from_slice(payload);

        Self {
            channel_id,
            tag: FRAME_TAG,
            packet_index,
            data_length,
            data,
        }
    }

    /// Basic frame validation, tag and channel
    pub fn validate(&self) -> Result<(), FrameError> {
        validate_header(self.tag, self.channel_id)
    }

    /// Serialize into a report, infallible by construction
    pub fn to_report(&self) -> crate::Report {
        let mut buff = [0u8; REPORT_LEN];

        buff[..2].copy_from_slice(&self.channel_id.to_be_bytes());
        buff[2] = self.tag;
        buff[3..5].copy_from_slice(&self.packet_index.to_be_bytes());
        buff[5..7].copy_from_slice(&self.data_length.to_be_bytes());
        buff[7..].copy_from_slice(&self.data);

        buff
    }
}

impl ContinuationFrame {
    pub fn new(channel_id: u16, packet_index: u16, payload: &[u8]) -> Self {
        let mut data = [0u8; CONT_DATA_LEN];
        data[..payload.len()].copy_from_slice(payload);

        Self {
            channel_id,
            tag: FRAME_TAG,
            packet_index,
            data,
        }
    }

    /// Basic frame validation, tag and channel
    pub fn validate(&self) -> Result<(), FrameError> {
        validate_header(self.tag, self.channel_id)
    }

    /// Serialize into a report, infallible by construction
    pub fn to_report(&self) -> crate::Report {
        let mut buff = [0u8; REPORT_LEN];

        buff[..2].copy_from_slice(&self.channel_id.to_be_bytes());
        buff[2] = self.tag;
        buff[3..5].copy_from_slice(&self.packet_index.to_be_bytes());
        buff[5..].copy_from_slice(&self.data);

        buff
    }
}

fn validate_header(tag: u8, channel_id: u16) -> Result<(), FrameError> {
    if tag != FRAME_TAG {
        return Err(FrameError::InvalidTag(tag));
    }

    if channel_id == 0 {
        return Err(FrameError::ZeroChannel);
    }

    Ok(())
}

/// Check a buffer holds exactly one report
fn check_report_len(buff: &[u8]) -> Result<(), FrameError> {
    if buff.len() != REPORT_LEN {
        return Err(FrameError::InvalidLength(buff.len()));
    }
    Ok(())
}

/// Read the channel id of a raw report without full decoding.
///
/// Used to address error responses for reports that fail validation.
pub fn peek_channel(buff: &[u8]) -> Option<u16> {
    if buff.len() < 2 {
        return None;
    }

    Some(u16::from_be_bytes([buff[0], buff[1]]))
}

impl Encode for InitFrame {
    type Error = FrameError;

    fn encode_len(&self) -> Result<usize, Self::Error> {
        Ok(REPORT_LEN)
    }

    fn encode(&self, buff: &mut [u8]) -> Result<usize, Self::Error> {
        check_report_len(buff)?;

        buff.copy_from_slice(&self.to_report());

        Ok(REPORT_LEN)
    }
}

impl DecodeOwned for InitFrame {
    type Output = Self;
    type Error = FrameError;

    fn decode_owned(buff: &[u8]) -> Result<(Self::Output, usize), Self::Error> {
        check_report_len(buff)?;

        let mut data = [0u8; INIT_DATA_LEN];
        data.copy_from_slice(&buff[7..]);

        let frame = Self {
            channel_id: u16::from_be_bytes([buff[0], buff[1]]),
            tag: buff[2],
            packet_index: u16::from_be_bytes([buff[3], buff[4]]),
            data_length: u16::from_be_bytes([buff[5], buff[6]]),
            data,
        };

        Ok((frame, REPORT_LEN))
    }
}

impl Encode for ContinuationFrame {
    type Error = FrameError;

    fn encode_len(&self) -> Result<usize, Self::Error> {
        Ok(REPORT_LEN)
    }

    fn encode(&self, buff: &mut [u8]) -> Result<usize, Self::Error> {
        check_report_len(buff)?;

        buff.copy_from_slice(&self.to_report());

        Ok(REPORT_LEN)
    }
}

impl DecodeOwned for ContinuationFrame {
    type Output = Self;
    type Error = FrameError;

    fn decode_owned(buff: &[u8]) -> Result<(Self::Output, usize), Self::Error> {
        check_report_len(buff)?;

        let mut data = [0u8; CONT_DATA_LEN];
        data.copy_from_slice(&buff[5..]);

        let frame = Self {
            channel_id: u16::from_be_bytes([buff[0], buff[1]]),
            tag: buff[2],
            packet_index: u16::from_be_bytes([buff[3], buff[4]]),
            data,
        };

        Ok((frame, REPORT_LEN))
    }
}
