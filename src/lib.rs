//! Control and telemetry protocol for B2500 battery storage units.
//!
//! The device is reached over a byte oriented link, either its BLE serial
//! service or a wired serial port. On top of that it speaks a small framed
//! request-response protocol, although it also pushes frames on its own.
//! This crate does not open the link; it consumes received bytes and produces
//! bytes to send.
//!
//! Currently the following can be accessed:
//!
//! - Charge mode (load first or simultaneous charge and discharge)
//! - The three discharge timers: enabled, output power, start and end time
//! - Adaptive mode
//! - Runtime telemetry: solar inputs, outputs, state of charge, remaining capacity
//!
//! Decoded state is forwarded to optional per-entity callbacks, and only when
//! a value actually changed.
//!
//! # Example
//!
//! ```rust
//! use b2500::{Engine, Entities};
//!
//! let mut entities = Entities::default();
//! entities.charge_mode = Some(Box::new(|mode: &str| println!("charge mode: {mode}")));
//! let mut engine = Engine::new(entities);
//!
//! engine.poll();
//! for frame in engine.drain_outbound() {
//!     // hand `frame` to the transport
//!     # let _ = frame;
//! }
//!
//! let reply = hex::decode("731d23030100780000008f028b010100010050c80000600464000000a8").unwrap();
//! engine.handle_frame(&reply);
//! assert_eq!(engine.runtime_info().unwrap().charge_mode, b2500::ChargeMode::LoadFirst);
//! ```

pub mod commands;
mod config;
mod device_state;
mod engine;
mod error;
pub mod frame;
mod message;
mod publisher;
mod session;
#[cfg(test)]
mod test_support;

pub use config::SessionConfig;
pub use device_state::{ChargeMode, RuntimeInfo, TimeOfDay, TimerInfo, TimerSlot, TIMER_COUNT};
pub use engine::{Dispatch, Engine, LinkState};
pub use error::{DecodeError, ValidationError};
pub use frame::{Frame, FrameAssembler};
pub use message::{Command, Message, MessageKind, WATTS_PER_LSB};
pub use publisher::{ChangePublisher, Entities, Publish, TimerEntities};
pub use session::{Session, SessionHandle};
