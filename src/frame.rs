//! Framing shared by every B2500 message.
//!
//! The frame format is:
//!
//! Start Byte | End Byte     | Meaning
//! 0          | 0            | A constant start byte 0x73
//! 1          | 1            | The length in bytes of the whole frame, checksum included
//! 2          | 2            | A constant control byte 0x23
//! 3          | 3            | The opcode
//! 4          | x            | The payload
//! x+1        | x+1          | XOR over bytes 0-x

use log::{debug, warn};

use crate::error::{DecodeError, ValidationError};

pub const CMD_SET_CHARGE_MODE: u8 = 0x01;
pub const CMD_RUNTIME_INFO: u8 = 0x03;
pub const CMD_SET_TIMERS: u8 = 0x11;
pub const CMD_GET_TIMERS: u8 = 0x12;

/// Start byte, length, control byte, opcode and checksum
pub const MIN_FRAME_LEN: usize = 5;
pub const MAX_FRAME_LEN: usize = u8::MAX as usize;

const START_BYTE: u8 = 0x73;
const CONTROL_BYTE: u8 = 0x23;
const PAYLOAD_OFFSET: usize = 4;

/// A frame with valid framing and checksum, payload not yet interpreted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub opcode: u8,
    pub payload: Vec<u8>,
}

/// Wrap a payload into a transmittable frame.
pub fn encode_frame(opcode: u8, payload: &[u8]) -> Result<Vec<u8>, ValidationError> {
    let len = payload.len() + MIN_FRAME_LEN;
    if len > MAX_FRAME_LEN {
        return Err(ValidationError::PayloadTooLong { len: payload.len() });
    }

    let mut frame = Vec::with_capacity(len);
    frame.extend_from_slice(&[START_BYTE, len as u8, CONTROL_BYTE, opcode]);
    frame.extend_from_slice(payload);
    frame.push(checksum(&frame));
    Ok(frame)
}

/// Check the framing of exactly one received frame and split off its payload.
pub fn decode_frame(buffer: &[u8]) -> Result<Frame, DecodeError> {
    if buffer.len() < MIN_FRAME_LEN {
        return Err(DecodeError::TooShort {
            expected: MIN_FRAME_LEN,
            actual: buffer.len(),
        });
    }

    if buffer[0] != START_BYTE {
        return Err(DecodeError::BadHeader { found: buffer[0] });
    }

    let declared = buffer[1] as usize;
    if declared != buffer.len() {
        return Err(DecodeError::LengthMismatch {
            declared,
            actual: buffer.len(),
        });
    }

    if buffer[2] != CONTROL_BYTE {
        return Err(DecodeError::BadControl { found: buffer[2] });
    }

    let (body, crc) = buffer.split_at(buffer.len() - 1);
    let expected = checksum(body);
    if crc[0] != expected {
        return Err(DecodeError::ChecksumMismatch {
            expected,
            actual: crc[0],
        });
    }

    Ok(Frame {
        opcode: buffer[3],
        payload: body[PAYLOAD_OFFSET..].to_vec(),
    })
}

/// Compute the check value for the given bytes
fn checksum(data: &[u8]) -> u8 {
    data.iter().fold(0, |acc, b| acc ^ b)
}

/// Splits a raw byte stream into frames.
///
/// Transports deliver bytes in arbitrary chunks: BLE notifications may carry a
/// fraction of a frame or several frames at once, and serial reads are cut
/// wherever the driver returns. Chunks are buffered until the start byte and
/// the declared length show that a whole frame is present. A candidate whose
/// control byte or checksum is wrong did not start at a real frame boundary, so
/// only its start byte is dropped and the search resumes at the next start
/// byte. Frames a stray start byte seemed to cover are recovered this way.
pub struct FrameAssembler {
    buffer: Vec<u8>,
    max_buffered: usize,
}

impl FrameAssembler {
    pub fn new(max_buffered: usize) -> Self {
        Self {
            buffer: Vec::new(),
            max_buffered: max_buffered.max(MAX_FRAME_LEN),
        }
    }

    pub fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
        if self.buffer.len() > self.max_buffered {
            let excess = self.buffer.len() - self.max_buffered;
            warn!("Receive buffer overflow, dropping {excess} bytes");
            self.buffer.drain(..excess);
        }
    }

    /// Number of bytes waiting for the rest of their frame
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Take the next complete frame out of the buffer, if there is one.
    pub fn next_frame(&mut self) -> Option<Vec<u8>> {
        loop {
            match Self::scan(&self.buffer) {
                ScanResult::Complete(len) => return Some(self.buffer.drain(..len).collect()),
                ScanResult::Incomplete => return None,
                ScanResult::Invalid(reason) => {
                    let skip = self.buffer[1..]
                        .iter()
                        .position(|&b| b == START_BYTE)
                        .map_or(self.buffer.len(), |pos| pos + 1);
                    let dropped = hex::encode(&self.buffer[..skip]);
                    debug!("Dropping {skip} bytes: {reason}: {dropped}");
                    self.buffer.drain(..skip);
                }
            }
        }
    }

    fn scan(buffer: &[u8]) -> ScanResult {
        if buffer.is_empty() {
            return ScanResult::Incomplete;
        }

        if buffer[0] != START_BYTE {
            return ScanResult::Invalid("Unexpected start byte");
        }

        if buffer.len() < 2 {
            return ScanResult::Incomplete;
        }

        let len = buffer[1] as usize;
        if len < MIN_FRAME_LEN {
            return ScanResult::Invalid("Declared length too short");
        }

        if buffer.len() >= 3 && buffer[2] != CONTROL_BYTE {
            return ScanResult::Invalid("Unexpected control byte");
        }

        if buffer.len() < len {
            return ScanResult::Incomplete;
        }

        if checksum(&buffer[..len - 1]) != buffer[len - 1] {
            return ScanResult::Invalid("Checksum mismatch");
        }

        ScanResult::Complete(len)
    }
}

#[derive(PartialEq, Eq, Debug)]
enum ScanResult {
    Complete(usize),
    Incomplete,
    Invalid(&'static str),
}

#[test]
fn test_encode_frame() {
    let frame = encode_frame(CMD_RUNTIME_INFO, &[0x01]).unwrap();
    assert_eq!(hex::encode(frame), "730623030154");
}

#[test]
fn test_encode_frame_payload_too_long() {
    let payload = [0u8; 251];
    assert_eq!(
        encode_frame(CMD_SET_TIMERS, &payload),
        Err(ValidationError::PayloadTooLong { len: 251 })
    );
    assert!(encode_frame(CMD_SET_TIMERS, &payload[..250]).is_ok());
}

#[test]
fn test_decode_frame_happy() {
    let message = hex::decode("73072304dead20").unwrap();
    let frame = decode_frame(&message[..]).unwrap();
    assert_eq!(
        frame,
        Frame {
            opcode: 0x04,
            payload: vec![0xde, 0xad]
        }
    );
}

#[test]
fn test_decode_frame_too_short() {
    let message = hex::decode("7306").unwrap();
    assert_eq!(
        decode_frame(&message[..]),
        Err(DecodeError::TooShort { expected: 5, actual: 2 })
    );
}

#[test]
fn test_decode_frame_bad_header() {
    let message = hex::decode("720623030154").unwrap();
    assert_eq!(decode_frame(&message[..]), Err(DecodeError::BadHeader { found: 0x72 }));
}

#[test]
fn test_decode_frame_truncated() {
    let message = hex::decode("73072304dead").unwrap();
    assert_eq!(
        decode_frame(&message[..]),
        Err(DecodeError::LengthMismatch { declared: 7, actual: 6 })
    );
}

#[test]
fn test_decode_frame_bad_checksum() {
    let message = hex::decode("73072304dead21").unwrap();
    assert_eq!(
        decode_frame(&message[..]),
        Err(DecodeError::ChecksumMismatch {
            expected: 0x20,
            actual: 0x21
        })
    );
}

#[test]
fn test_assembler_split_and_joined_chunks() {
    let mut assembler = FrameAssembler::new(1024);
    assembler.push(&hex::decode("7306").unwrap());
    assert_eq!(assembler.next_frame(), None);

    assembler.push(&hex::decode("2303015473072304dead20").unwrap());
    assert_eq!(assembler.next_frame(), Some(hex::decode("730623030154").unwrap()));
    assert_eq!(assembler.next_frame(), Some(hex::decode("73072304dead20").unwrap()));
    assert_eq!(assembler.next_frame(), None);
    assert_eq!(assembler.buffered(), 0);
}

#[test]
fn test_assembler_resyncs_after_garbage() {
    let mut assembler = FrameAssembler::new(1024);
    assembler.push(&hex::decode("00ff7301730623030154").unwrap());
    assert_eq!(assembler.next_frame(), Some(hex::decode("730623030154").unwrap()));
    assert_eq!(assembler.buffered(), 0);
}

#[test]
fn test_assembler_recovers_after_false_start_byte() {
    let timers = crate::test_support::TIMERS;
    let mut assembler = FrameAssembler::new(1024);
    assembler.push(&hex::decode("7340").unwrap());
    assembler.push(&hex::decode("730623030154").unwrap());
    assembler.push(&hex::decode(timers).unwrap());
    assembler.push(&hex::decode(timers).unwrap());

    let frames: Vec<String> = std::iter::from_fn(|| assembler.next_frame()).map(hex::encode).collect();
    assert_eq!(frames, vec!["730623030154", timers, timers]);
    assert_eq!(assembler.buffered(), 0);
}

#[test]
fn test_assembler_recovers_after_corrupted_length() {
    let mut assembler = FrameAssembler::new(1024);
    // Declared length 8 instead of 6 reaches into the next frame
    assembler.push(&hex::decode("730823030154730623120145").unwrap());
    assert_eq!(assembler.next_frame(), Some(hex::decode("730623120145").unwrap()));

    // Declared length 5 cuts the frame short
    assembler.push(&hex::decode("730523030154730623030154").unwrap());
    assert_eq!(assembler.next_frame(), Some(hex::decode("730623030154").unwrap()));
    assert_eq!(assembler.next_frame(), None);
}

#[test]
fn test_assembler_drops_frame_with_bad_checksum() {
    let mut assembler = FrameAssembler::new(1024);
    assembler.push(&hex::decode("73072304dead2173072304dead20").unwrap());
    assert_eq!(assembler.next_frame(), Some(hex::decode("73072304dead20").unwrap()));
    assert_eq!(assembler.next_frame(), None);
    assert_eq!(assembler.buffered(), 0);
}

#[test]
fn test_assembler_bounded() {
    let mut assembler = FrameAssembler::new(0);
    assembler.push(&[0u8; 300]);
    assert_eq!(assembler.buffered(), MAX_FRAME_LEN);
    assert_eq!(assembler.next_frame(), None);
    assert_eq!(assembler.buffered(), 0);
}
