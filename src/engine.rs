use std::collections::vec_deque::Drain;
use std::collections::VecDeque;

use log::{debug, warn};

use crate::commands;
use crate::device_state::{ChargeMode, RuntimeInfo, TimerInfo};
use crate::error::{DecodeError, ValidationError};
use crate::frame::Frame;
use crate::message::{Command, Message, MessageKind};
use crate::publisher::{ChangePublisher, Entities};

/// Whether a poll request is still waiting for its reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Idle,
    AwaitingReply,
}

/// What became of an inbound frame
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch {
    RuntimeInfo,
    TimerInfo,
    /// A kind this crate does not interpret, handed back unchanged
    PassThrough(Frame),
    /// The frame was malformed and dropped
    Discarded(DecodeError),
}

/// The protocol engine for one device connection.
///
/// Owns the latest decoded runtime and timer state and replaces each wholesale
/// when a new frame of that kind arrives. Frames to send are queued in the order
/// they are produced; the transport takes them with [`Engine::drain_outbound`].
///
/// Nothing here blocks or awaits. All entry points take `&mut self`, so a host
/// with several threads has to put the whole engine behind one owner.
pub struct Engine {
    runtime_info: Option<RuntimeInfo>,
    timer_info: Option<TimerInfo>,
    publisher: ChangePublisher,
    outbound: VecDeque<Vec<u8>>,
    awaiting: Vec<MessageKind>,
    missed_replies: u64,
}

impl Engine {
    pub fn new(entities: Entities) -> Self {
        Self {
            runtime_info: None,
            timer_info: None,
            publisher: ChangePublisher::new(entities),
            outbound: VecDeque::new(),
            awaiting: Vec::new(),
            missed_replies: 0,
        }
    }

    pub fn runtime_info(&self) -> Option<&RuntimeInfo> {
        self.runtime_info.as_ref()
    }

    pub fn timer_info(&self) -> Option<&TimerInfo> {
        self.timer_info.as_ref()
    }

    pub fn link_state(&self) -> LinkState {
        if self.awaiting.is_empty() {
            LinkState::Idle
        } else {
            LinkState::AwaitingReply
        }
    }

    /// Number of poll requests that were still unanswered when the next poll came
    pub fn missed_replies(&self) -> u64 {
        self.missed_replies
    }

    /// Queue the periodic requests: runtime info, then the timer table.
    pub fn poll(&mut self) {
        for request in [Command::RequestRuntimeInfo, Command::RequestTimers] {
            if let Some(kind) = request.reply_kind() {
                if self.awaiting.contains(&kind) {
                    self.missed_replies += 1;
                    warn!("No reply to previous {kind} request");
                } else {
                    self.awaiting.push(kind);
                }
            }
            self.send("poll", request.encode());
        }
    }

    /// Process one complete inbound frame.
    pub fn handle_frame(&mut self, buffer: &[u8]) -> Dispatch {
        let message = match Message::decode(buffer) {
            Ok(message) => message,
            Err(err) => {
                let h_msg = hex::encode(buffer);
                warn!("Discarding frame: {err}: {h_msg}");
                return Dispatch::Discarded(err);
            }
        };

        let kind = message.kind();
        let before = self.awaiting.len();
        self.awaiting.retain(|k| *k != kind);
        if self.awaiting.len() == before {
            debug!("RX unsolicited {kind}");
        } else {
            debug!("RX {kind}");
        }

        match message {
            Message::RuntimeInfo(info) => {
                self.runtime_info = Some(info);
                self.publisher.publish_runtime_info(&info);
                Dispatch::RuntimeInfo
            }
            Message::TimerInfo(info) => {
                self.timer_info = Some(info);
                self.publisher.publish_timer_info(&info);
                Dispatch::TimerInfo
            }
            Message::Other(frame) => Dispatch::PassThrough(frame),
        }
    }

    /// Hand the queued frames to the transport, oldest first.
    pub fn drain_outbound(&mut self) -> Drain<'_, Vec<u8>> {
        self.outbound.drain(..)
    }

    pub fn has_outbound(&self) -> bool {
        !self.outbound.is_empty()
    }

    pub fn set_timer_enabled(&mut self, timer: usize, enabled: bool) -> bool {
        let frame = commands::set_timer_enabled(self.timer_info.as_ref(), timer, enabled);
        self.send("set timer enabled", frame)
    }

    pub fn set_timer_output_power(&mut self, timer: usize, power: f32) -> bool {
        let frame = commands::set_timer_output_power(self.timer_info.as_ref(), timer, power);
        self.send("set timer output power", frame)
    }

    pub fn set_timer_start(&mut self, timer: usize, hour: u8, minute: u8) -> bool {
        let frame = commands::set_timer_start(self.timer_info.as_ref(), timer, hour, minute);
        self.send("set timer start", frame)
    }

    pub fn set_timer_end(&mut self, timer: usize, hour: u8, minute: u8) -> bool {
        let frame = commands::set_timer_end(self.timer_info.as_ref(), timer, hour, minute);
        self.send("set timer end", frame)
    }

    /// Accepts `"LoadFirst"` or `"SimultaneousChargeAndDischarge"`.
    pub fn set_charge_mode(&mut self, name: &str) -> bool {
        let frame = name.parse::<ChargeMode>().and_then(commands::set_charge_mode);
        self.send("set charge mode", frame)
    }

    pub fn set_adaptive_mode_enabled(&mut self, enabled: bool) -> bool {
        let frame = commands::set_adaptive_mode_enabled(self.timer_info.as_ref(), enabled);
        self.send("set adaptive mode enabled", frame)
    }

    fn send(&mut self, what: &str, frame: Result<Vec<u8>, ValidationError>) -> bool {
        match frame {
            Ok(frame) => {
                let h = hex::encode(&frame);
                debug!("TX {what}: {h}");
                self.outbound.push_back(frame);
                true
            }
            Err(err) => {
                warn!("Failed to {what}: {err}");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device_state::{TimeOfDay, TIMER_COUNT};
    use crate::publisher::TimerEntities;
    use crate::test_support::{
        as_timer_info_reply, decode_timer_info, RUNTIME_LOAD_FIRST, RUNTIME_SIMULTANEOUS, TIMERS,
    };
    use std::sync::{Arc, Mutex};

    // Same as TIMERS with timer 1 output power 175 W
    const TIMERS_POWER_CHANGED: &str = "731b231201010800101ec80000193d0100af00011600173b500076";
    const UNKNOWN: &str = "73072304dead20";

    type Log = Arc<Mutex<Vec<String>>>;

    fn recorder<T: std::fmt::Debug + 'static>(log: &Log, name: String) -> Option<crate::publisher::Publish<T>> {
        let log = log.clone();
        Some(Box::new(move |value: T| log.lock().unwrap().push(format!("{name}={value:?}"))))
    }

    fn engine() -> (Engine, Log) {
        let log = Log::default();
        let entities = Entities {
            charge_mode: recorder(&log, "charge_mode".into()),
            timers: std::array::from_fn(|i| TimerEntities {
                enabled: recorder(&log, format!("timer{i}.enabled")),
                output_power: recorder(&log, format!("timer{i}.output_power")),
                start: recorder(&log, format!("timer{i}.start")),
                end: recorder(&log, format!("timer{i}.end")),
            }),
            adaptive_mode: recorder(&log, "adaptive_mode".into()),
        };
        (Engine::new(entities), log)
    }

    fn feed(engine: &mut Engine, frame: &str) -> Dispatch {
        engine.handle_frame(&hex::decode(frame).unwrap()[..])
    }

    fn published(log: &Log) -> Vec<String> {
        std::mem::take(&mut *log.lock().unwrap())
    }

    #[test]
    fn test_rejected_command_has_no_side_effects() {
        let (mut engine, log) = engine();
        feed(&mut engine, TIMERS);
        published(&log);
        let before = *engine.timer_info().unwrap();

        assert!(!engine.set_timer_enabled(5, true));
        assert!(!engine.has_outbound());
        assert_eq!(engine.timer_info(), Some(&before));
        assert!(engine.runtime_info().is_none());
        assert!(published(&log).is_empty());
    }

    #[test]
    fn test_unknown_charge_mode_rejected() {
        let (mut engine, _log) = engine();
        assert!(!engine.set_charge_mode("loadfirst"));
        assert!(!engine.set_charge_mode(""));
        assert_eq!(engine.drain_outbound().count(), 0);
    }

    #[test]
    fn test_charge_mode_confirmed_by_telemetry() {
        let (mut engine, log) = engine();
        assert!(engine.set_charge_mode("LoadFirst"));
        let sent: Vec<Vec<u8>> = engine.drain_outbound().collect();
        assert_eq!(sent, vec![hex::decode("730623010156").unwrap()]);
        // Not applied until the device reports it
        assert!(engine.runtime_info().is_none());
        assert!(published(&log).is_empty());

        assert_eq!(feed(&mut engine, RUNTIME_LOAD_FIRST), Dispatch::RuntimeInfo);
        assert_eq!(published(&log), vec!["charge_mode=\"LoadFirst\""]);

        feed(&mut engine, RUNTIME_SIMULTANEOUS);
        assert_eq!(published(&log), vec!["charge_mode=\"SimultaneousChargeAndDischarge\""]);
        assert_eq!(
            engine.runtime_info().map(|info| info.charge_mode),
            Some(ChargeMode::SimultaneousChargeAndDischarge)
        );
    }

    #[test]
    fn test_identical_timer_frames_publish_once() {
        let (mut engine, log) = engine();
        assert_eq!(feed(&mut engine, TIMERS), Dispatch::TimerInfo);
        assert_eq!(published(&log).len(), TIMER_COUNT * 4 + 1);

        feed(&mut engine, TIMERS);
        assert!(published(&log).is_empty());

        feed(&mut engine, TIMERS_POWER_CHANGED);
        assert_eq!(published(&log), vec!["timer1.output_power=175.0"]);
    }

    #[test]
    fn test_published_times_are_normalized() {
        let (mut engine, log) = engine();
        feed(&mut engine, TIMERS);
        assert!(published(&log).contains(&"timer1.start=TimeOfDay { hour: 1, minute: 1 }".to_string()));
        assert_eq!(engine.timer_info().unwrap().timers[1].start, TimeOfDay { hour: 1, minute: 1 });
    }

    #[test]
    fn test_timer_frame_replaces_whole_table() {
        let (mut engine, _log) = engine();
        feed(&mut engine, TIMERS);
        assert!(engine.set_timer_enabled(0, false));
        let frame = engine.drain_outbound().next().unwrap();

        // Echo the written table back as the device would report it
        let reply = as_timer_info_reply(&frame);
        let expected = decode_timer_info(&reply);
        assert_eq!(engine.handle_frame(&reply[..]), Dispatch::TimerInfo);
        assert_eq!(engine.timer_info(), Some(&expected));
        assert!(!engine.timer_info().unwrap().timers[0].enabled);
    }

    #[test]
    fn test_unknown_and_malformed_frames_leave_state_alone() {
        let (mut engine, log) = engine();
        feed(&mut engine, RUNTIME_LOAD_FIRST);
        feed(&mut engine, TIMERS);
        published(&log);
        let runtime = *engine.runtime_info().unwrap();
        let timers = *engine.timer_info().unwrap();

        assert_eq!(
            feed(&mut engine, UNKNOWN),
            Dispatch::PassThrough(Frame {
                opcode: 0x04,
                payload: vec![0xde, 0xad]
            })
        );
        assert!(matches!(
            feed(&mut engine, "731b231201010800101ec80000193d01009600011600173b500000"),
            Dispatch::Discarded(DecodeError::ChecksumMismatch { .. })
        ));
        assert!(matches!(feed(&mut engine, "7306"), Dispatch::Discarded(_)));

        assert_eq!(engine.runtime_info(), Some(&runtime));
        assert_eq!(engine.timer_info(), Some(&timers));
        assert!(published(&log).is_empty());
    }

    #[test]
    fn test_poll_requests_runtime_info_and_timers() {
        let (mut engine, _log) = engine();
        assert_eq!(engine.link_state(), LinkState::Idle);
        engine.poll();
        let sent: Vec<String> = engine.drain_outbound().map(hex::encode).collect();
        assert_eq!(sent, vec!["730623030154", "730623120145"]);
        assert_eq!(engine.link_state(), LinkState::AwaitingReply);

        feed(&mut engine, RUNTIME_LOAD_FIRST);
        assert_eq!(engine.link_state(), LinkState::AwaitingReply);
        feed(&mut engine, TIMERS);
        assert_eq!(engine.link_state(), LinkState::Idle);
        assert_eq!(engine.missed_replies(), 0);
    }

    #[test]
    fn test_poll_counts_missed_replies() {
        let (mut engine, _log) = engine();
        engine.poll();
        feed(&mut engine, TIMERS);
        engine.poll();
        assert_eq!(engine.missed_replies(), 1);
        // Requests are still sent so the device gets another chance
        assert_eq!(engine.drain_outbound().count(), 4);
    }

    #[test]
    fn test_timer_commands_after_first_report() {
        let (mut engine, _log) = engine();
        assert!(!engine.set_timer_start(0, 6, 0));
        assert!(!engine.set_adaptive_mode_enabled(true));
        feed(&mut engine, TIMERS);
        assert!(engine.set_timer_start(0, 6, 0));
        assert!(engine.set_timer_end(0, 7, 0));
        assert!(engine.set_timer_output_power(2, 400.0));
        assert!(engine.set_adaptive_mode_enabled(false));
        assert!(!engine.set_timer_end(0, 7, 60));
        assert_eq!(engine.drain_outbound().count(), 4);
    }
}
