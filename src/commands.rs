//! Builders for the user facing settings.
//!
//! Every builder either returns one complete frame ready for the transport, or
//! a [`ValidationError`] without having produced anything. Timer settings are
//! written as a whole table, so those builders start from the last table the
//! device reported and change a single field of a copy. The reported table
//! itself is left alone: it only changes once the device confirms the write.

use crate::device_state::{ChargeMode, TimeOfDay, TimerInfo, TimerSlot, TIMER_COUNT};
use crate::error::ValidationError;
use crate::message::Command;

pub fn set_timer_enabled(current: Option<&TimerInfo>, timer: usize, enabled: bool) -> Result<Vec<u8>, ValidationError> {
    update_timer(current, timer, |slot| {
        slot.enabled = enabled;
        Ok(())
    })
}

pub fn set_timer_output_power(current: Option<&TimerInfo>, timer: usize, power: f32) -> Result<Vec<u8>, ValidationError> {
    update_timer(current, timer, |slot| {
        slot.output_power = power;
        Ok(())
    })
}

pub fn set_timer_start(
    current: Option<&TimerInfo>,
    timer: usize,
    hour: u8,
    minute: u8,
) -> Result<Vec<u8>, ValidationError> {
    update_timer(current, timer, |slot| {
        slot.start = TimeOfDay::new(hour, minute)?;
        Ok(())
    })
}

pub fn set_timer_end(
    current: Option<&TimerInfo>,
    timer: usize,
    hour: u8,
    minute: u8,
) -> Result<Vec<u8>, ValidationError> {
    update_timer(current, timer, |slot| {
        slot.end = TimeOfDay::new(hour, minute)?;
        Ok(())
    })
}

pub fn set_adaptive_mode_enabled(current: Option<&TimerInfo>, enabled: bool) -> Result<Vec<u8>, ValidationError> {
    let mut table = *current.ok_or(ValidationError::TimersUnknown)?;
    table.adaptive_mode_enabled = enabled;
    Command::SetTimers(table).encode()
}

pub fn set_charge_mode(mode: ChargeMode) -> Result<Vec<u8>, ValidationError> {
    Command::SetChargeMode(mode).encode()
}

fn update_timer<F>(current: Option<&TimerInfo>, timer: usize, update: F) -> Result<Vec<u8>, ValidationError>
where
    F: FnOnce(&mut TimerSlot) -> Result<(), ValidationError>,
{
    if timer >= TIMER_COUNT {
        return Err(ValidationError::TimerOutOfRange { timer });
    }
    let mut table = *current.ok_or(ValidationError::TimersUnknown)?;
    update(&mut table.timers[timer])?;
    Command::SetTimers(table).encode()
}
