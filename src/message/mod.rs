//! Typed messages carried inside frames.
//!
//! Inbound frames decode to a [`Message`]; outbound requests and settings are
//! built as a [`Command`] and encoded to bytes. Frame kinds this crate does not
//! understand are kept as raw [`Frame`]s so they can be handed on unchanged.

mod runtime_info_message;
mod timer_info_message;

use std::fmt;

use crate::device_state::{ChargeMode, RuntimeInfo, TimerInfo};
use crate::error::{DecodeError, ValidationError};
use crate::frame::{
    decode_frame, encode_frame, Frame, CMD_GET_TIMERS, CMD_RUNTIME_INFO, CMD_SET_CHARGE_MODE, CMD_SET_TIMERS,
};

use runtime_info_message::RuntimeInfoMessage;
use timer_info_message::{encode_timer_table, TimerInfoMessage};

pub use timer_info_message::WATTS_PER_LSB;

/// Payload of requests that carry no parameters
const SIMPLE_COMMAND_PAYLOAD: [u8; 1] = [0x01];

/// What a frame represents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    RuntimeInfo,
    TimerInfo,
    /// A kind this crate does not interpret, with its opcode
    Other(u8),
}

impl MessageKind {
    pub fn from_opcode(opcode: u8) -> Self {
        match opcode {
            CMD_RUNTIME_INFO => MessageKind::RuntimeInfo,
            CMD_GET_TIMERS => MessageKind::TimerInfo,
            other => MessageKind::Other(other),
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageKind::RuntimeInfo => f.write_str("RUNTIME_INFO"),
            MessageKind::TimerInfo => f.write_str("TIMER_INFO"),
            MessageKind::Other(opcode) => write!(f, "0x{opcode:02x}"),
        }
    }
}

/// A decoded inbound frame
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    RuntimeInfo(RuntimeInfo),
    TimerInfo(TimerInfo),
    Other(Frame),
}

impl Message {
    /// Decode one complete frame.
    pub fn decode(buffer: &[u8]) -> Result<Self, DecodeError> {
        let frame = decode_frame(buffer)?;
        let message = match MessageKind::from_opcode(frame.opcode) {
            MessageKind::RuntimeInfo => {
                Message::RuntimeInfo(RuntimeInfoMessage::new(&frame.payload)?.to_runtime_info())
            }
            MessageKind::TimerInfo => Message::TimerInfo(TimerInfoMessage::new(&frame.payload)?.to_timer_info()),
            MessageKind::Other(_) => Message::Other(frame),
        };
        Ok(message)
    }

    pub fn kind(&self) -> MessageKind {
        match self {
            Message::RuntimeInfo(_) => MessageKind::RuntimeInfo,
            Message::TimerInfo(_) => MessageKind::TimerInfo,
            Message::Other(frame) => MessageKind::Other(frame.opcode),
        }
    }
}

/// An outbound request: an opcode and its parameters
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    RequestRuntimeInfo,
    RequestTimers,
    SetChargeMode(ChargeMode),
    /// The device only accepts the whole timer table at once
    SetTimers(TimerInfo),
}

impl Command {
    pub fn opcode(&self) -> u8 {
        match self {
            Command::RequestRuntimeInfo => CMD_RUNTIME_INFO,
            Command::RequestTimers => CMD_GET_TIMERS,
            Command::SetChargeMode(_) => CMD_SET_CHARGE_MODE,
            Command::SetTimers(_) => CMD_SET_TIMERS,
        }
    }

    /// The kind of the frame the device answers with, for requests that expect one
    pub fn reply_kind(&self) -> Option<MessageKind> {
        match self {
            Command::RequestRuntimeInfo => Some(MessageKind::RuntimeInfo),
            Command::RequestTimers => Some(MessageKind::TimerInfo),
            Command::SetChargeMode(_) | Command::SetTimers(_) => None,
        }
    }

    /// Encode to a complete frame. Out of range parameters fail here rather than wrap.
    pub fn encode(&self) -> Result<Vec<u8>, ValidationError> {
        let payload = match self {
            Command::RequestRuntimeInfo | Command::RequestTimers => SIMPLE_COMMAND_PAYLOAD.to_vec(),
            Command::SetChargeMode(mode) => vec![mode.is_load_first() as u8],
            Command::SetTimers(info) => encode_timer_table(info)?,
        };
        encode_frame(self.opcode(), &payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device_state::{TimeOfDay, TimerSlot};
    use crate::test_support::{as_timer_info_reply, RUNTIME_LOAD_FIRST, RUNTIME_SIMULTANEOUS};

    fn decode_hex(frame: &str) -> Result<Message, DecodeError> {
        Message::decode(&hex::decode(frame).unwrap()[..])
    }

    #[test]
    fn test_encode_requests() {
        assert_eq!(hex::encode(Command::RequestRuntimeInfo.encode().unwrap()), "730623030154");
        assert_eq!(hex::encode(Command::RequestTimers.encode().unwrap()), "730623120145");
    }

    #[test]
    fn test_encode_charge_mode() {
        let load_first = Command::SetChargeMode(ChargeMode::LoadFirst).encode().unwrap();
        assert_eq!(hex::encode(load_first), "730623010156");
        let simultaneous = Command::SetChargeMode(ChargeMode::SimultaneousChargeAndDischarge)
            .encode()
            .unwrap();
        assert_eq!(hex::encode(simultaneous), "730623010057");
    }

    #[test]
    fn test_decode_runtime_info_frame() {
        let message = decode_hex(RUNTIME_LOAD_FIRST).unwrap();
        assert_eq!(message.kind(), MessageKind::RuntimeInfo);
        match message {
            Message::RuntimeInfo(info) => assert_eq!(info.charge_mode, ChargeMode::LoadFirst),
            other => panic!("unexpected message {other:?}"),
        }

        let message = decode_hex(RUNTIME_SIMULTANEOUS).unwrap();
        match message {
            Message::RuntimeInfo(info) => {
                assert_eq!(info.charge_mode, ChargeMode::SimultaneousChargeAndDischarge)
            }
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn test_decode_unknown_kind() {
        let message = decode_hex("73072304dead20").unwrap();
        assert_eq!(message.kind(), MessageKind::Other(0x04));
        assert_eq!(
            message,
            Message::Other(Frame {
                opcode: 0x04,
                payload: vec![0xde, 0xad]
            })
        );
    }

    #[test]
    fn test_decode_truncated_timer_info() {
        assert!(matches!(
            decode_hex("730623120145"),
            Err(DecodeError::PayloadTooShort { kind: "timer info", .. })
        ));
    }

    #[test]
    fn test_timer_table_round_trip() {
        let mut info = TimerInfo::default();
        info.adaptive_mode_enabled = true;
        info.timers[2] = TimerSlot {
            enabled: true,
            output_power: 65535.0,
            start: TimeOfDay { hour: 23, minute: 59 },
            end: TimeOfDay { hour: 0, minute: 0 },
        };
        let frame = Command::SetTimers(info).encode().unwrap();

        let reply = as_timer_info_reply(&frame);
        assert_eq!(Message::decode(&reply[..]), Ok(Message::TimerInfo(info)));
    }
}
