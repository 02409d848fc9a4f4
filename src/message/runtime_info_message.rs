use crate::device_state::{ChargeMode, RuntimeInfo};
use crate::error::DecodeError;

pub(crate) const PAYLOAD_LEN: usize = 24;

const CHARGE_FLAG_LOAD_FIRST: u8 = 0x01;
const CHARGE_FLAG_PV2_PASSTHROUGH: u8 = 0x02;
const DISCHARGE_FLAG_OUT1: u8 = 0x01;
const DISCHARGE_FLAG_OUT2: u8 = 0x02;

/// A message type which contains the runtime state of the device.
/// Newer firmware appends fields after the known layout; they are ignored.
pub(crate) struct RuntimeInfoMessage<'a>(&'a [u8]);

impl<'a> RuntimeInfoMessage<'a> {
    pub fn new(payload: &'a [u8]) -> Result<Self, DecodeError> {
        if payload.len() < PAYLOAD_LEN {
            return Err(DecodeError::PayloadTooShort {
                kind: "runtime info",
                expected: PAYLOAD_LEN,
                actual: payload.len(),
            });
        }
        Ok(Self(payload))
    }

    fn flag(&self, offset: usize) -> bool {
        self.0[offset] != 0
    }

    fn le_u16(&self, offset: usize) -> u16 {
        u16::from_le_bytes([self.0[offset], self.0[offset + 1]])
    }

    pub fn charge_mode(&self) -> ChargeMode {
        ChargeMode::from_load_first(self.0[9] & CHARGE_FLAG_LOAD_FIRST != 0)
    }

    pub fn to_runtime_info(&self) -> RuntimeInfo {
        RuntimeInfo {
            charge_mode: self.charge_mode(),
            pv2_passthrough: self.0[9] & CHARGE_FLAG_PV2_PASSTHROUGH != 0,
            in1_active: self.flag(0),
            in2_active: self.flag(1),
            in1_power: self.le_u16(2),
            in2_power: self.le_u16(4),
            battery_dpct: self.le_u16(6),
            firmware_version: self.0[8],
            out1_enabled: self.0[10] & DISCHARGE_FLAG_OUT1 != 0,
            out2_enabled: self.0[10] & DISCHARGE_FLAG_OUT2 != 0,
            out1_active: self.flag(12),
            out2_active: self.flag(13),
            depth_of_discharge_pct: self.0[14],
            discharge_threshold: self.le_u16(15),
            remaining_capacity_wh: self.le_u16(18),
            out1_power: self.le_u16(20),
            out2_power: self.le_u16(22),
        }
    }
}

#[test]
fn test_decode_runtime_info() {
    let payload = hex::decode("0100780000008f028b010100010050c80000600464000000").unwrap();
    let info = RuntimeInfoMessage::new(&payload[..]).unwrap().to_runtime_info();
    assert_eq!(info.charge_mode, ChargeMode::LoadFirst);
    assert!(!info.pv2_passthrough);
    assert!(info.in1_active);
    assert!(!info.in2_active);
    assert_eq!(info.in1_power, 120);
    assert_eq!(info.battery_dpct, 655);
    assert_eq!(info.firmware_version, 0x8b);
    assert!(info.out1_enabled);
    assert!(!info.out2_enabled);
    assert_eq!(info.depth_of_discharge_pct, 80);
    assert_eq!(info.discharge_threshold, 200);
    assert_eq!(info.remaining_capacity_wh, 1120);
    assert_eq!(info.out1_power, 100);
    assert_eq!(info.out2_power, 0);
}

#[test]
fn test_decode_runtime_info_flags() {
    let mut payload = hex::decode("0100780000008f028b010100010050c80000600464000000").unwrap();
    payload[9] = CHARGE_FLAG_PV2_PASSTHROUGH;
    let info = RuntimeInfoMessage::new(&payload[..]).unwrap().to_runtime_info();
    assert_eq!(info.charge_mode, ChargeMode::SimultaneousChargeAndDischarge);
    assert!(info.pv2_passthrough);
}

#[test]
fn test_runtime_info_too_short() {
    let payload = [0u8; 10];
    assert_eq!(
        RuntimeInfoMessage::new(&payload[..]).err(),
        Some(DecodeError::PayloadTooShort {
            kind: "runtime info",
            expected: 24,
            actual: 10
        })
    );
}
