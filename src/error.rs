use thiserror::Error;

/// Why an inbound frame could not be decoded. The frame is dropped and the
/// device state stays at its previous value.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("frame too short: expected at least {expected} bytes, got {actual}")]
    TooShort { expected: usize, actual: usize },
    #[error("unexpected start byte 0x{found:02x}")]
    BadHeader { found: u8 },
    #[error("unexpected control byte 0x{found:02x}")]
    BadControl { found: u8 },
    #[error("length mismatch: declared {declared} bytes but frame has {actual} bytes")]
    LengthMismatch { declared: usize, actual: usize },
    #[error("checksum mismatch: expected 0x{expected:02x}, got 0x{actual:02x}")]
    ChecksumMismatch { expected: u8, actual: u8 },
    #[error("{kind} payload too short: expected at least {expected} bytes, got {actual}")]
    PayloadTooShort {
        kind: &'static str,
        expected: usize,
        actual: usize,
    },
}

/// Why a requested setting was refused. Nothing is sent when this is returned.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("timer {timer} does not exist, expected 0..=2")]
    TimerOutOfRange { timer: usize },
    #[error("hour {hour} out of range, expected 0..=23")]
    HourOutOfRange { hour: u8 },
    #[error("minute {minute} out of range, expected 0..=59")]
    MinuteOutOfRange { minute: u8 },
    #[error("output power {power} W cannot be encoded")]
    PowerOutOfRange { power: f32 },
    #[error("invalid charge mode: {0}")]
    UnknownChargeMode(String),
    #[error("timer table not received from the device yet")]
    TimersUnknown,
    #[error("payload of {len} bytes does not fit in a frame")]
    PayloadTooLong { len: usize },
}
