use anyhow::anyhow;
use futures_util::Stream;
use futures_util::StreamExt;
use log::{debug, info, warn};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;

use crate::config::SessionConfig;
use crate::engine::{Dispatch, Engine};
use crate::frame::{Frame, FrameAssembler};

/// A setting change requested through a [`SessionHandle`]
#[derive(Debug, Clone, PartialEq)]
enum Request {
    SetTimerEnabled { timer: usize, enabled: bool },
    SetTimerOutputPower { timer: usize, power: f32 },
    SetTimerStart { timer: usize, hour: u8, minute: u8 },
    SetTimerEnd { timer: usize, hour: u8, minute: u8 },
    SetChargeMode(String),
    SetAdaptiveModeEnabled(bool),
}

struct Envelope {
    request: Request,
    reply: oneshot::Sender<bool>,
}

/// Cloneable access to a running [`Session`] for callers outside its task.
///
/// Each method returns `Ok(false)` when the setting was rejected and nothing was
/// sent, and an error only when the session is no longer running.
#[derive(Clone)]
pub struct SessionHandle {
    requests: mpsc::Sender<Envelope>,
}

impl SessionHandle {
    pub async fn set_timer_enabled(&self, timer: usize, enabled: bool) -> anyhow::Result<bool> {
        self.call(Request::SetTimerEnabled { timer, enabled }).await
    }

    pub async fn set_timer_output_power(&self, timer: usize, power: f32) -> anyhow::Result<bool> {
        self.call(Request::SetTimerOutputPower { timer, power }).await
    }

    pub async fn set_timer_start(&self, timer: usize, hour: u8, minute: u8) -> anyhow::Result<bool> {
        self.call(Request::SetTimerStart { timer, hour, minute }).await
    }

    pub async fn set_timer_end(&self, timer: usize, hour: u8, minute: u8) -> anyhow::Result<bool> {
        self.call(Request::SetTimerEnd { timer, hour, minute }).await
    }

    pub async fn set_charge_mode(&self, name: &str) -> anyhow::Result<bool> {
        self.call(Request::SetChargeMode(name.to_string())).await
    }

    pub async fn set_adaptive_mode_enabled(&self, enabled: bool) -> anyhow::Result<bool> {
        self.call(Request::SetAdaptiveModeEnabled(enabled)).await
    }

    async fn call(&self, request: Request) -> anyhow::Result<bool> {
        let (reply, response) = oneshot::channel();
        self.requests
            .send(Envelope { request, reply })
            .await
            .map_err(|_| anyhow!("Session has stopped"))?;
        response.await.map_err(|_| anyhow!("Session has stopped"))
    }
}

/// The one task that owns an [`Engine`] for the lifetime of a connection.
///
/// Polls on a fixed cadence, feeds received bytes to the engine, applies
/// setting requests from [`SessionHandle`]s and writes every queued frame to
/// the transport. Everything the engine sees happens in arrival order on this
/// task, so the engine itself needs no locking.
pub struct Session {
    engine: Engine,
    config: SessionConfig,
    requests: mpsc::Receiver<Envelope>,
    unknown_frames: Option<mpsc::UnboundedSender<Frame>>,
}

impl Session {
    pub fn new(engine: Engine, config: SessionConfig) -> (Self, SessionHandle) {
        let (tx, rx) = mpsc::channel(config.request_queue.max(1));
        let session = Self {
            engine,
            config,
            requests: rx,
            unknown_frames: None,
        };
        (session, SessionHandle { requests: tx })
    }

    /// Forward frames of kinds the engine does not interpret to another consumer
    /// instead of dropping them after logging.
    pub fn forward_unknown_frames(mut self, tx: mpsc::UnboundedSender<Frame>) -> Self {
        self.unknown_frames = Some(tx);
        self
    }

    /// Run until the inbound stream ends, returning the engine with its final state.
    ///
    /// `inbound` yields raw chunks as the transport delivers them, for example BLE
    /// notifications or serial reads. Frames may be split across chunks.
    pub async fn run<R, E, W>(mut self, mut inbound: R, mut outbound: W) -> anyhow::Result<Engine>
    where
        R: Stream<Item = Result<Vec<u8>, E>> + Unpin,
        E: std::error::Error + Send + Sync + 'static,
        W: AsyncWrite + Unpin,
    {
        info!("Session started, polling every {:?}", self.config.poll_interval);

        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut assembler = FrameAssembler::new(self.config.max_buffered);
        let mut accepting_requests = true;

        loop {
            tokio::select! {
                _ = ticker.tick() => self.engine.poll(),
                chunk = inbound.next() => match chunk {
                    None => {
                        info!("End of inbound stream");
                        break;
                    }
                    Some(Ok(data)) => {
                        let h_chunk = hex::encode(&data);
                        debug!("RX chunk: {h_chunk}");
                        assembler.push(&data);
                        while let Some(frame) = assembler.next_frame() {
                            self.dispatch(&frame);
                        }
                    }
                    Some(Err(err)) => {
                        warn!("Inbound stream error: {err}");
                        return Err(err.into());
                    }
                },
                envelope = self.requests.recv(), if accepting_requests => match envelope {
                    Some(Envelope { request, reply }) => {
                        let accepted = self.apply(request);
                        // The caller may have given up waiting
                        let _ = reply.send(accepted);
                    }
                    None => {
                        debug!("All session handles dropped");
                        accepting_requests = false;
                    }
                },
            }

            for frame in self.engine.drain_outbound() {
                outbound.write_all(&frame).await?;
            }
            outbound.flush().await?;
        }

        Ok(self.engine)
    }

    fn dispatch(&mut self, frame: &[u8]) {
        if let Dispatch::PassThrough(frame) = self.engine.handle_frame(frame) {
            match &self.unknown_frames {
                Some(tx) => {
                    if tx.send(frame).is_err() {
                        debug!("Unknown frame consumer has gone away");
                        self.unknown_frames = None;
                    }
                }
                None => debug!("Ignoring frame with opcode 0x{:02x}", frame.opcode),
            }
        }
    }

    fn apply(&mut self, request: Request) -> bool {
        match request {
            Request::SetTimerEnabled { timer, enabled } => self.engine.set_timer_enabled(timer, enabled),
            Request::SetTimerOutputPower { timer, power } => self.engine.set_timer_output_power(timer, power),
            Request::SetTimerStart { timer, hour, minute } => self.engine.set_timer_start(timer, hour, minute),
            Request::SetTimerEnd { timer, hour, minute } => self.engine.set_timer_end(timer, hour, minute),
            Request::SetChargeMode(name) => self.engine.set_charge_mode(&name),
            Request::SetAdaptiveModeEnabled(enabled) => self.engine.set_adaptive_mode_enabled(enabled),
        }
    }
}
