//! Wire framing for the control chain bus.
//!
//! Every message on the bus uses the same envelope:
//! ```text
//! ┌─────────┬─────────┬────────────┬─────────────┬──────────┐
//! │ ADDRESS │ COMMAND │ LENGTH     │ PAYLOAD     │ CHECKSUM │
//! │ 1B      │ 1B      │ 2B (LE)    │ 0–65535B    │ 1B       │
//! └─────────┴─────────┴────────────┴─────────────┴──────────┘
//! ```
//!
//! The checksum is the wrapping 8-bit sum of every byte that precedes it.
//! Address `0` is the broadcast address: devices use it to handshake before
//! they have been given an id, and the host uses it for chain sync.
//!
//! [`decode`] works on a borrowed prefix and reports how many bytes it used,
//! so a caller can drop exactly one bad frame and keep whatever follows it.
//! [`FrameReader`] wraps that in an accumulating buffer for streaming input.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Broadcast address (no device id assigned yet).
pub const BROADCAST_ADDRESS: u8 = 0;

/// Bytes before the payload: address, command, length.
pub const HEADER_SIZE: usize = 4;

/// Largest payload the length field can describe.
pub const MAX_PAYLOAD_SIZE: usize = u16::MAX as usize;

/// Command codes carried in the second byte of each frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Command {
    ChainSync = 0,
    Handshake = 1,
    DevDescriptor = 2,
    Assignment = 3,
    DataUpdate = 4,
    Unassignment = 5,
    SetValue = 6,
}

impl TryFrom<u8> for Command {
    type Error = FrameError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Ok(match code {
            0 => Command::ChainSync,
            1 => Command::Handshake,
            2 => Command::DevDescriptor,
            3 => Command::Assignment,
            4 => Command::DataUpdate,
            5 => Command::Unassignment,
            6 => Command::SetValue,
            other => return Err(FrameError::UnknownCommand(other)),
        })
    }
}

/// Framing and payload errors.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    /// Not enough bytes for a whole frame (or a whole payload field).
    #[error("truncated frame")]
    Truncated,

    /// Trailer byte does not match the sum of the frame.
    #[error("checksum mismatch: expected {expected:#04x}, found {found:#04x}")]
    ChecksumMismatch { expected: u8, found: u8 },

    /// Payload longer than the 16-bit length field allows.
    #[error("payload of {0} bytes exceeds the frame limit")]
    PayloadTooLarge(usize),

    /// Command byte outside the known set.
    #[error("unknown command code {0}")]
    UnknownCommand(u8),

    /// String field longer than its one-byte length prefix allows.
    #[error("string of {0} bytes exceeds the 255-byte field limit")]
    StringTooLong(usize),

    /// Count or index too large for its one-byte field.
    #[error("{field} {value} does not fit in one byte")]
    FieldOverflow { field: &'static str, value: usize },

    /// Payload is structurally invalid for its command.
    #[error("malformed payload: {0}")]
    Malformed(&'static str),
}

/// A decoded frame.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    pub address: u8,
    pub command: Command,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(address: u8, command: Command, payload: Vec<u8>) -> Result<Self, FrameError> {
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(FrameError::PayloadTooLarge(payload.len()));
        }
        Ok(Self {
            address,
            command,
            payload,
        })
    }

    /// Total size of this frame on the wire.
    pub fn wire_len(&self) -> usize {
        HEADER_SIZE + self.payload.len() + 1
    }

    /// Serialize into a fresh byte vector.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.wire_len());
        let length = self.payload.len() as u16;

        out.push(self.address);
        out.push(self.command as u8);
        out.extend_from_slice(&length.to_le_bytes());
        out.extend_from_slice(&self.payload);
        out.push(checksum(&out));
        out
    }
}

/// Encode a frame in one call.
pub fn encode(address: u8, command: Command, payload: &[u8]) -> Result<Vec<u8>, FrameError> {
    Ok(Frame::new(address, command, payload.to_vec())?.encode())
}

/// Wrapping 8-bit sum.
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

/// Size of the frame starting at `bytes[0]`, if the header is present.
pub fn frame_len(bytes: &[u8]) -> Option<usize> {
    if bytes.len() < HEADER_SIZE {
        return None;
    }
    let length = u16::from_le_bytes([bytes[2], bytes[3]]) as usize;
    Some(HEADER_SIZE + length + 1)
}

/// Decode the frame at the start of `bytes`.
///
/// On success returns the frame and the number of bytes it occupied; anything
/// after that belongs to the next frame and is left untouched.
pub fn decode(bytes: &[u8]) -> Result<(Frame, usize), FrameError> {
    let total = frame_len(bytes).ok_or(FrameError::Truncated)?;
    if bytes.len() < total {
        return Err(FrameError::Truncated);
    }

    let expected = checksum(&bytes[..total - 1]);
    let found = bytes[total - 1];
    if expected != found {
        return Err(FrameError::ChecksumMismatch { expected, found });
    }

    let command = Command::try_from(bytes[1])?;
    let frame = Frame {
        address: bytes[0],
        command,
        payload: bytes[HEADER_SIZE..total - 1].to_vec(),
    };
    Ok((frame, total))
}

/// Accumulates bytes from a stream and yields complete frames.
#[derive(Debug, Default, Clone)]
pub struct FrameReader {
    buffer: Vec<u8>,
}

impl FrameReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append freshly read bytes.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Bytes waiting for the rest of their frame.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Next frame in the buffer.
    ///
    /// `None` means more bytes are needed. A checksum or command error drops
    /// the offending frame's bytes only; later frames stay buffered.
    pub fn next_frame(&mut self) -> Option<Result<Frame, FrameError>> {
        match decode(&self.buffer) {
            Ok((frame, used)) => {
                self.buffer.drain(..used);
                Some(Ok(frame))
            }
            Err(FrameError::Truncated) => None,
            Err(err) => {
                let used = frame_len(&self.buffer)
                    .unwrap_or(self.buffer.len())
                    .min(self.buffer.len());
                self.buffer.drain(..used);
                Some(Err(err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_layout() {
        let bytes = encode(3, Command::Unassignment, &[7]).unwrap();
        assert_eq!(bytes, vec![3, 5, 1, 0, 7, 3 + 5 + 1 + 7]);
    }

    #[test]
    fn decode_reports_consumed_length() {
        let mut bytes = encode(1, Command::DataUpdate, &[1, 2, 3]).unwrap();
        let first_len = bytes.len();
        bytes.extend(encode(2, Command::ChainSync, &[]).unwrap());

        let (frame, used) = decode(&bytes).unwrap();
        assert_eq!(used, first_len);
        assert_eq!(frame.address, 1);
        assert_eq!(frame.command, Command::DataUpdate);
        assert_eq!(frame.payload, vec![1, 2, 3]);

        let (next, _) = decode(&bytes[used..]).unwrap();
        assert_eq!(next.command, Command::ChainSync);
    }

    #[test]
    fn flipped_payload_byte_is_checksum_error() {
        let mut bytes = encode(1, Command::DataUpdate, &[1, 0, 0, 0, 0, 0]).unwrap();
        bytes[5] ^= 0x40;
        assert!(matches!(
            decode(&bytes),
            Err(FrameError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn short_input_is_truncated() {
        let bytes = encode(1, Command::Handshake, &[1, 2, 3, 4]).unwrap();
        assert_eq!(decode(&bytes[..2]), Err(FrameError::Truncated));
        assert_eq!(decode(&bytes[..bytes.len() - 1]), Err(FrameError::Truncated));
    }

    #[test]
    fn unknown_command_after_valid_checksum() {
        let mut bytes = vec![1, 0x42, 0, 0];
        bytes.push(checksum(&bytes));
        assert_eq!(decode(&bytes), Err(FrameError::UnknownCommand(0x42)));
    }

    #[test]
    fn reader_handles_split_input() {
        let bytes = encode(4, Command::ChainSync, &[9]).unwrap();
        let mut reader = FrameReader::new();

        reader.extend(&bytes[..3]);
        assert!(reader.next_frame().is_none());

        reader.extend(&bytes[3..]);
        let frame = reader.next_frame().unwrap().unwrap();
        assert_eq!(frame.payload, vec![9]);
        assert_eq!(reader.pending(), 0);
    }

    #[test]
    fn reader_keeps_next_frame_after_bad_one() {
        let mut bad = encode(1, Command::DataUpdate, &[0xAA]).unwrap();
        let last = bad.len() - 1;
        bad[last] ^= 0xFF;
        let good = encode(2, Command::ChainSync, &[1]).unwrap();

        let mut reader = FrameReader::new();
        reader.extend(&bad);
        reader.extend(&good);

        assert!(matches!(
            reader.next_frame(),
            Some(Err(FrameError::ChecksumMismatch { .. }))
        ));
        let frame = reader.next_frame().unwrap().unwrap();
        assert_eq!(frame.address, 2);
        assert!(reader.next_frame().is_none());
    }

    #[test]
    fn oversized_payload_rejected() {
        let payload = vec![0u8; MAX_PAYLOAD_SIZE + 1];
        assert_eq!(
            Frame::new(1, Command::Assignment, payload),
            Err(FrameError::PayloadTooLarge(MAX_PAYLOAD_SIZE + 1))
        );
    }
}
