//! Forwards decoded device state to external entities, but only on change.
//!
//! Each observable field has an optional callback. A missing callback means the
//! host has no entity for that field and the field is skipped. For every field
//! the publisher remembers the last value it handed out and calls the callback
//! again only when the new value differs. A field that has never been published
//! always counts as changed.

use log::debug;

use crate::device_state::{RuntimeInfo, TimeOfDay, TimerInfo, TIMER_COUNT};

/// Callback receiving the new state of one entity
pub type Publish<T> = Box<dyn FnMut(T) + Send>;

/// Entities for one timer slot
#[derive(Default)]
pub struct TimerEntities {
    pub enabled: Option<Publish<bool>>,
    /// Output power in W
    pub output_power: Option<Publish<f32>>,
    pub start: Option<Publish<TimeOfDay>>,
    pub end: Option<Publish<TimeOfDay>>,
}

/// Every entity the host may expose. All of them are optional.
#[derive(Default)]
pub struct Entities {
    /// Receives one of the two charge mode names
    pub charge_mode: Option<Publish<&'static str>>,
    pub timers: [TimerEntities; TIMER_COUNT],
    pub adaptive_mode: Option<Publish<bool>>,
}

#[derive(Default, Clone, Copy)]
struct TimerShadow {
    enabled: Option<bool>,
    output_power: Option<f32>,
    start: Option<TimeOfDay>,
    end: Option<TimeOfDay>,
}

/// Values last handed to the entities
#[derive(Default)]
struct Shadow {
    charge_mode: Option<&'static str>,
    timers: [TimerShadow; TIMER_COUNT],
    adaptive_mode: Option<bool>,
}

pub struct ChangePublisher {
    entities: Entities,
    shadow: Shadow,
}

impl ChangePublisher {
    pub fn new(entities: Entities) -> Self {
        Self {
            entities,
            shadow: Shadow::default(),
        }
    }

    /// Returns the number of entities that were updated.
    pub fn publish_runtime_info(&mut self, info: &RuntimeInfo) -> usize {
        let mode = info.charge_mode.as_str();
        publish_if_changed("charge mode", &mut self.entities.charge_mode, &mut self.shadow.charge_mode, mode) as usize
    }

    /// Returns the number of entities that were updated.
    pub fn publish_timer_info(&mut self, info: &TimerInfo) -> usize {
        let mut published = 0;
        for (i, timer) in info.timers.iter().enumerate() {
            let entities = &mut self.entities.timers[i];
            let shadow = &mut self.shadow.timers[i];
            published += publish_if_changed("timer enabled", &mut entities.enabled, &mut shadow.enabled, timer.enabled) as usize;
            published += publish_if_changed(
                "timer output power",
                &mut entities.output_power,
                &mut shadow.output_power,
                timer.output_power,
            ) as usize;
            published += publish_if_changed("timer start", &mut entities.start, &mut shadow.start, timer.start) as usize;
            published += publish_if_changed("timer end", &mut entities.end, &mut shadow.end, timer.end) as usize;
        }
        published += publish_if_changed(
            "adaptive mode",
            &mut self.entities.adaptive_mode,
            &mut self.shadow.adaptive_mode,
            info.adaptive_mode_enabled,
        ) as usize;
        published
    }
}

fn publish_if_changed<T>(name: &str, sink: &mut Option<Publish<T>>, last: &mut Option<T>, value: T) -> bool
where
    T: PartialEq + Copy + std::fmt::Debug,
{
    let Some(sink) = sink.as_mut() else {
        return false;
    };
    if *last == Some(value) {
        return false;
    }
    debug!("Publishing {name}: {value:?}");
    sink(value);
    *last = Some(value);
    true
}
