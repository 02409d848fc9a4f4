use crate::device_state::{TimeOfDay, TimerInfo, TimerSlot, TIMER_COUNT};
use crate::error::{DecodeError, ValidationError};

/// Resolution of the output power fields on the wire
pub const WATTS_PER_LSB: f32 = 1.0;

const RECORD_LEN: usize = 7;
const RECORDS_OFFSET: usize = 1;
pub(crate) const PAYLOAD_LEN: usize = RECORDS_OFFSET + TIMER_COUNT * RECORD_LEN;

/// A message type which contains the adaptive mode flag and the three timer records.
///
/// Each record is laid out as:
///
/// Offset | Meaning
/// 0      | enabled
/// 1      | start hour
/// 2      | start minute
/// 3      | end hour
/// 4      | end minute
/// 5-6    | output power, little endian, in units of `WATTS_PER_LSB`
pub(crate) struct TimerInfoMessage<'a>(&'a [u8]);

impl<'a> TimerInfoMessage<'a> {
    pub fn new(payload: &'a [u8]) -> Result<Self, DecodeError> {
        if payload.len() < PAYLOAD_LEN {
            return Err(DecodeError::PayloadTooShort {
                kind: "timer info",
                expected: PAYLOAD_LEN,
                actual: payload.len(),
            });
        }
        Ok(Self(payload))
    }

    pub fn adaptive_mode_enabled(&self) -> bool {
        self.0[0] != 0
    }

    pub fn timer(&self, index: usize) -> TimerSlot {
        let offset = RECORDS_OFFSET + index * RECORD_LEN;
        let r = &self.0[offset..offset + RECORD_LEN];
        TimerSlot {
            enabled: r[0] != 0,
            start: TimeOfDay::wrapping(r[1], r[2]),
            end: TimeOfDay::wrapping(r[3], r[4]),
            output_power: raw_to_power(u16::from_le_bytes([r[5], r[6]])),
        }
    }

    pub fn to_timer_info(&self) -> TimerInfo {
        TimerInfo {
            adaptive_mode_enabled: self.adaptive_mode_enabled(),
            timers: std::array::from_fn(|i| self.timer(i)),
        }
    }
}

/// Serialize a whole timer table. Values are checked, never wrapped.
pub(crate) fn encode_timer_table(info: &TimerInfo) -> Result<Vec<u8>, ValidationError> {
    let mut payload = Vec::with_capacity(PAYLOAD_LEN);
    payload.push(info.adaptive_mode_enabled as u8);
    for timer in &info.timers {
        let start = TimeOfDay::new(timer.start.hour, timer.start.minute)?;
        let end = TimeOfDay::new(timer.end.hour, timer.end.minute)?;
        payload.extend_from_slice(&[timer.enabled as u8, start.hour, start.minute, end.hour, end.minute]);
        payload.extend_from_slice(&power_to_raw(timer.output_power)?.to_le_bytes());
    }
    Ok(payload)
}

pub(crate) fn raw_to_power(raw: u16) -> f32 {
    raw as f32 * WATTS_PER_LSB
}

/// Rounds to the nearest representable step; anything outside the field's range is refused.
pub(crate) fn power_to_raw(power: f32) -> Result<u16, ValidationError> {
    let raw = (power / WATTS_PER_LSB).round();
    if !raw.is_finite() || raw < 0.0 || raw > u16::MAX as f32 {
        return Err(ValidationError::PowerOutOfRange { power });
    }
    Ok(raw as u16)
}

#[cfg(test)]
fn sample_timer_info() -> TimerInfo {
    TimerInfo {
        adaptive_mode_enabled: true,
        timers: [
            TimerSlot {
                enabled: true,
                output_power: 200.0,
                start: TimeOfDay { hour: 8, minute: 0 },
                end: TimeOfDay { hour: 16, minute: 30 },
            },
            TimerSlot {
                enabled: false,
                output_power: 150.0,
                start: TimeOfDay { hour: 1, minute: 1 },
                end: TimeOfDay { hour: 1, minute: 0 },
            },
            TimerSlot {
                enabled: true,
                output_power: 80.0,
                start: TimeOfDay { hour: 22, minute: 0 },
                end: TimeOfDay { hour: 23, minute: 59 },
            },
        ],
    }
}

#[test]
fn test_decode_timer_info_normalizes_times() {
    // Timer 1 starts at 25:61 on the wire
    let payload = hex::decode("01010800101ec80000193d01009600011600173b5000").unwrap();
    let info = TimerInfoMessage::new(&payload[..]).unwrap().to_timer_info();
    assert_eq!(info, sample_timer_info());
    assert_eq!(info.timers[1].start, TimeOfDay { hour: 1, minute: 1 });
}

#[test]
fn test_decode_timer_info_ignores_trailing_bytes() {
    let mut payload = encode_timer_table(&sample_timer_info()).unwrap();
    payload.extend_from_slice(&[0xaa, 0xbb, 0xcc]);
    let info = TimerInfoMessage::new(&payload[..]).unwrap().to_timer_info();
    assert_eq!(info, sample_timer_info());
}

#[test]
fn test_timer_info_too_short() {
    let payload = [0u8; 21];
    assert!(matches!(
        TimerInfoMessage::new(&payload[..]),
        Err(DecodeError::PayloadTooShort { expected: 22, actual: 21, .. })
    ));
}

#[test]
fn test_encode_timer_table_rejects_bad_times() {
    let mut info = sample_timer_info();
    info.timers[2].end.hour = 24;
    assert_eq!(encode_timer_table(&info), Err(ValidationError::HourOutOfRange { hour: 24 }));

    let mut info = sample_timer_info();
    info.timers[0].start.minute = 60;
    assert_eq!(encode_timer_table(&info), Err(ValidationError::MinuteOutOfRange { minute: 60 }));
}

#[test]
fn test_power_round_trip() {
    for raw in 0..=u16::MAX {
        let power = raw_to_power(raw);
        assert_eq!(power_to_raw(power), Ok(raw));
        assert_eq!(raw_to_power(power_to_raw(power).unwrap()), power);
    }
}

#[test]
fn test_power_out_of_range() {
    assert!(power_to_raw(-1.0).is_err());
    assert!(power_to_raw(65536.0).is_err());
    assert!(power_to_raw(f32::NAN).is_err());
    assert!(power_to_raw(f32::INFINITY).is_err());
    assert_eq!(power_to_raw(-0.2), Ok(0));
    assert_eq!(power_to_raw(99.6), Ok(100));
}
