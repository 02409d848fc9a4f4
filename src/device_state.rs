use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;

/// Number of independently addressable timer slots on the device
pub const TIMER_COUNT: usize = 3;

const CHARGE_MODE_LOAD_FIRST: &str = "LoadFirst";
const CHARGE_MODE_SIMULTANEOUS: &str = "SimultaneousChargeAndDischarge";

/// How the device splits solar input between the battery and the outputs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargeMode {
    /// Feed the load before charging the battery
    LoadFirst,
    SimultaneousChargeAndDischarge,
}

impl ChargeMode {
    /// Every mode the device understands, in the order a selector should list them
    pub const ALL: [ChargeMode; 2] = [ChargeMode::LoadFirst, ChargeMode::SimultaneousChargeAndDischarge];

    /// The exact string used by external selectors for this mode
    pub fn as_str(&self) -> &'static str {
        match self {
            ChargeMode::LoadFirst => CHARGE_MODE_LOAD_FIRST,
            ChargeMode::SimultaneousChargeAndDischarge => CHARGE_MODE_SIMULTANEOUS,
        }
    }

    pub(crate) fn from_load_first(load_first: bool) -> Self {
        if load_first {
            ChargeMode::LoadFirst
        } else {
            ChargeMode::SimultaneousChargeAndDischarge
        }
    }

    pub(crate) fn is_load_first(&self) -> bool {
        matches!(self, ChargeMode::LoadFirst)
    }
}

impl fmt::Display for ChargeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChargeMode {
    type Err = ValidationError;

    /// Case-sensitive; only the two names shown by [`ChargeMode::as_str`] are accepted.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            CHARGE_MODE_LOAD_FIRST => Ok(ChargeMode::LoadFirst),
            CHARGE_MODE_SIMULTANEOUS => Ok(ChargeMode::SimultaneousChargeAndDischarge),
            other => Err(ValidationError::UnknownChargeMode(other.to_string())),
        }
    }
}

/// A wall clock time with minute resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimeOfDay {
    pub hour: u8,
    pub minute: u8,
}

impl TimeOfDay {
    /// Build a time from user input, rejecting anything outside 00:00..=23:59.
    pub fn new(hour: u8, minute: u8) -> Result<Self, ValidationError> {
        if hour > 23 {
            return Err(ValidationError::HourOutOfRange { hour });
        }
        if minute > 59 {
            return Err(ValidationError::MinuteOutOfRange { minute });
        }
        Ok(Self { hour, minute })
    }

    /// Build a time from device telemetry. Firmware occasionally reports values past
    /// the end of the day, so they are wrapped instead of rejected.
    pub fn wrapping(hour: u8, minute: u8) -> Self {
        Self {
            hour: hour % 24,
            minute: minute % 60,
        }
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

/// One scheduled discharge window
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TimerSlot {
    pub enabled: bool,
    /// Output power while the window is active, in W
    pub output_power: f32,
    pub start: TimeOfDay,
    pub end: TimeOfDay,
}

/// The device's timer table as reported by the last timer info frame
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TimerInfo {
    /// Device wide automatic power adjustment, shared by all slots
    pub adaptive_mode_enabled: bool,
    pub timers: [TimerSlot; TIMER_COUNT],
}

/// The reported runtime state of the device
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RuntimeInfo {
    pub charge_mode: ChargeMode,
    /// Whether solar input 2 is passed straight through to output 2
    pub pv2_passthrough: bool,
    pub in1_active: bool,
    pub in2_active: bool,
    /// Solar input power in W
    pub in1_power: u16,
    pub in2_power: u16,
    /// State of charge of the battery in %/10
    pub battery_dpct: u16,
    pub firmware_version: u8,
    pub out1_enabled: bool,
    pub out2_enabled: bool,
    pub out1_active: bool,
    pub out2_active: bool,
    /// Depth of discharge in %
    pub depth_of_discharge_pct: u8,
    /// Solar power below which the outputs are fed from the battery, in W
    pub discharge_threshold: u16,
    /// Energy left in the battery in Wh
    pub remaining_capacity_wh: u16,
    pub out1_power: u16,
    pub out2_power: u16,
}

#[test]
fn test_charge_mode_names() {
    for mode in ChargeMode::ALL {
        assert_eq!(mode.as_str().parse::<ChargeMode>(), Ok(mode));
    }
    assert_eq!(
        "loadfirst".parse::<ChargeMode>(),
        Err(ValidationError::UnknownChargeMode("loadfirst".to_string()))
    );
}

#[test]
fn test_time_of_day_rejects_out_of_range() {
    assert_eq!(TimeOfDay::new(23, 59), Ok(TimeOfDay { hour: 23, minute: 59 }));
    assert_eq!(TimeOfDay::new(24, 0), Err(ValidationError::HourOutOfRange { hour: 24 }));
    assert_eq!(TimeOfDay::new(0, 60), Err(ValidationError::MinuteOutOfRange { minute: 60 }));
}

#[test]
fn test_time_of_day_wrapping() {
    assert_eq!(TimeOfDay::wrapping(25, 61), TimeOfDay { hour: 1, minute: 1 });
    assert_eq!(TimeOfDay::wrapping(7, 30).to_string(), "07:30");
}
