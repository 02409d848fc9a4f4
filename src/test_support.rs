//! Captured frames and helpers shared by the unit tests.

use crate::device_state::TimerInfo;
use crate::frame::{CMD_GET_TIMERS, CMD_SET_TIMERS};
use crate::message::Message;

/// Runtime info reply, charge mode load first
pub const RUNTIME_LOAD_FIRST: &str = "731d23030100780000008f028b010100010050c80000600464000000a8";
/// Runtime info reply, charge mode simultaneous charge and discharge
pub const RUNTIME_SIMULTANEOUS: &str = "731d23030100780000008f028b000100010050c80000600464000000a9";
/// Timer info reply with adaptive mode on; timer 1 starts at 25:61 on the wire
pub const TIMERS: &str = "731b231201010800101ec80000193d01009600011600173b50004f";

/// Rewrite a set timers frame into the timer info reply the device sends once
/// it applied the table. Both carry the same payload layout.
pub fn as_timer_info_reply(set_timers: &[u8]) -> Vec<u8> {
    assert_eq!(set_timers[3], CMD_SET_TIMERS);
    let mut reply = set_timers.to_vec();
    reply[3] = CMD_GET_TIMERS;
    let last = reply.len() - 1;
    reply[last] ^= CMD_SET_TIMERS ^ CMD_GET_TIMERS;
    reply
}

pub fn decode_timer_info(frame: &[u8]) -> TimerInfo {
    match Message::decode(frame).unwrap() {
        Message::TimerInfo(info) => info,
        other => panic!("unexpected message {other:?}"),
    }
}
