//! The voice session controller.
//!
//! Owns the lifecycle state machine (Idle → Connecting → Active → Idle),
//! acquires and releases the device pair, opens the transport, and demuxes
//! inbound messages to the playback scheduler, the transcript emitter, and
//! the tool dispatcher.
//!
//! Teardown is idempotent from every path: manual `stop()`, transport error,
//! and peer close all funnel through one slot-taking routine, so devices,
//! transport, and pending playback are released exactly once per session
//! instance.

use crate::audio::{AudioDevices, FrameQueue, PlaybackCommand, encode};
use crate::config::VoxConfig;
use crate::error::{Result, VoxError};
use crate::session::events::SessionNotice;
use crate::session::state::SessionState;
use crate::tools::{DeferredToken, ToolDispatcher, ToolHandler, catalog};
use crate::transcript::TurnAggregator;
use crate::transport::messages::{ClientMessage, ServerMessage, SetupPayload};
use crate::transport::{Connector, TransportLink};
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Mutex, broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Broadcast buffer for session notices.
const NOTICE_CHANNEL_SIZE: usize = 64;

/// Resources owned by one running session instance.
struct ActiveSession {
    cancel: CancellationToken,
    dispatcher: ToolDispatcher,
    tasks: Vec<JoinHandle<()>>,
}

/// Realtime voice session manager.
///
/// At most one session is active per controller; `start()` while not Idle is
/// rejected. Hosts are expected to hold a single controller per process.
pub struct VoiceSession {
    config: VoxConfig,
    connector: Arc<dyn Connector>,
    devices: Arc<dyn AudioDevices>,
    handler: Arc<dyn ToolHandler>,
    state_tx: watch::Sender<SessionState>,
    notices: broadcast::Sender<SessionNotice>,
    active: Arc<Mutex<Option<ActiveSession>>>,
    /// Token for the session currently starting or running. `stop()` cancels
    /// through here before waiting on the slot, so a stop issued while the
    /// transport handshake is in flight aborts it instead of blocking.
    cancel_slot: std::sync::Mutex<Option<CancellationToken>>,
}

impl VoiceSession {
    pub fn new(
        config: VoxConfig,
        connector: Arc<dyn Connector>,
        devices: Arc<dyn AudioDevices>,
        handler: Arc<dyn ToolHandler>,
    ) -> Self {
        let (state_tx, _state_rx) = watch::channel(SessionState::Idle);
        let (notices, _) = broadcast::channel(NOTICE_CHANNEL_SIZE);
        Self {
            config,
            connector,
            devices,
            handler,
            state_tx,
            notices,
            active: Arc::new(Mutex::new(None)),
            cancel_slot: std::sync::Mutex::new(None),
        }
    }

    /// Readable lifecycle-state signal for the host UI.
    pub fn state(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    /// The state right now.
    pub fn current_state(&self) -> SessionState {
        *self.state_tx.borrow()
    }

    /// Subscribe to transcript/tool/lifecycle notices.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionNotice> {
        self.notices.subscribe()
    }

    /// Start a session: acquire devices, open the transport, begin capture.
    ///
    /// # Errors
    ///
    /// Returns `VoxError::Session` if a session is already running,
    /// `VoxError::DeviceAccess` if a device cannot be acquired (the session
    /// never leaves Idle in that case), or `VoxError::Transport` if the
    /// connection fails.
    pub async fn start(&self) -> Result<()> {
        let mut active = self.active.lock().await;
        if active.is_some() {
            return Err(VoxError::Session("session already started".into()));
        }
        self.set_state(SessionState::Connecting);

        // Devices are acquired before the transport so a permission failure
        // surfaces as a failed start, never as a mid-session fault.
        let input = match self.devices.open_input(&self.config.audio) {
            Ok(device) => device,
            Err(e) => {
                self.set_state(SessionState::Idle);
                return Err(e);
            }
        };
        let output = match self.devices.open_output(&self.config.audio) {
            Ok(device) => device,
            Err(e) => {
                self.set_state(SessionState::Idle);
                return Err(e);
            }
        };

        let cancel = CancellationToken::new();
        self.store_cancel(Some(cancel.clone()));
        let link = match self
            .connector
            .connect(
                self.setup_payload(),
                self.config.session.outbound_queue_size,
                cancel.child_token(),
            )
            .await
        {
            Ok(link) => link,
            Err(e) => {
                self.store_cancel(None);
                self.set_state(SessionState::Idle);
                return Err(e);
            }
        };
        let TransportLink { outbound, inbound } = link;

        let dispatcher = ToolDispatcher::new(
            Arc::clone(&self.handler),
            outbound.clone(),
            Some(self.notices.clone()),
            cancel.clone(),
        );

        let mut tasks = Vec::with_capacity(4);

        // Capture: device callback -> bounded frame queue.
        let frames = FrameQueue::new(self.config.audio.capture_queue_frames);
        tasks.push(tokio::spawn({
            let frames = frames.clone();
            let cancel = cancel.clone();
            async move {
                if let Err(e) = input.run(frames, cancel).await {
                    error!("capture task error: {e}");
                }
            }
        }));

        // Encode-and-send: decoupled from the capture callback.
        tasks.push(tokio::spawn(encode_and_send(
            frames,
            outbound.clone(),
            cancel.clone(),
        )));

        // Playback: scheduled, gapless output.
        let (playback_tx, playback_rx) = mpsc::unbounded_channel::<PlaybackCommand>();
        tasks.push(tokio::spawn({
            let cancel = cancel.clone();
            async move {
                if let Err(e) = output.run(playback_rx, cancel).await {
                    error!("playback task error: {e}");
                }
            }
        }));

        // Demux: the single sequential consumer of inbound messages.
        tasks.push(tokio::spawn(demux(
            inbound,
            playback_tx,
            dispatcher.clone(),
            self.notices.clone(),
            Arc::clone(&self.active),
            self.state_tx.clone(),
            cancel.clone(),
        )));

        *active = Some(ActiveSession {
            cancel,
            dispatcher,
            tasks,
        });
        self.set_state(SessionState::Active);
        info!("voice session active");
        Ok(())
    }

    /// Stop the session and release all resources.
    ///
    /// Safe to call repeatedly or after the transport already failed: a
    /// second invocation finds nothing to release and is a no-op.
    pub async fn stop(&self) {
        // Cancel before touching the slot: a start() still inside the
        // transport handshake holds the slot lock, and cancelling first
        // aborts the handshake instead of waiting it out.
        if let Some(token) = self
            .cancel_slot
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .as_ref()
        {
            token.cancel();
        }
        let taken = self.active.lock().await.take();
        let Some(session) = taken else {
            debug!("stop: no active session");
            return;
        };
        session.cancel.cancel();
        for task in session.tasks {
            let _ = task.await;
        }
        self.store_cancel(None);
        self.set_state(SessionState::Idle);
        info!("voice session stopped");
    }

    /// Complete a previously deferred tool call.
    ///
    /// Consuming the token guarantees a deferred call completes at most once
    /// from the host side. If the session already ended, the response is
    /// dropped rather than transmitted to a dead transport.
    pub async fn send_deferred_response(&self, token: DeferredToken, result: serde_json::Value) {
        let (id, name) = token.into_parts();
        self.send_deferred_response_raw(&id, &name, result).await;
    }

    /// Id/name variant of [`Self::send_deferred_response`] for hosts that
    /// track correlation ids themselves.
    pub async fn send_deferred_response_raw(
        &self,
        id: &str,
        name: &str,
        result: serde_json::Value,
    ) {
        let dispatcher = self
            .active
            .lock()
            .await
            .as_ref()
            .map(|session| session.dispatcher.clone());
        match dispatcher {
            Some(dispatcher) => dispatcher.complete_deferred(id, name, result).await,
            None => debug!("session not active, dropping deferred response for {id}"),
        }
    }

    fn setup_payload(&self) -> SetupPayload {
        let session = &self.config.session;
        SetupPayload {
            model: session.model.clone(),
            response_modality: "audio".to_owned(),
            voice: session.voice.clone(),
            transcribe_input: session.transcribe_input,
            transcribe_output: session.transcribe_output,
            tools: catalog::declarations(),
            system_instruction: session.system_instruction.clone(),
        }
    }

    fn store_cancel(&self, token: Option<CancellationToken>) {
        *self
            .cancel_slot
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = token;
    }

    fn set_state(&self, state: SessionState) {
        let _ = self.state_tx.send_replace(state);
        let _ = self.notices.send(SessionNotice::State(state));
    }
}

/// Drain captured frames, encode them, and queue them for send.
///
/// The outbound queue is bounded: under sustained network slowness audio is
/// dropped here instead of backpressuring the device.
async fn encode_and_send(
    frames: FrameQueue,
    outbound: mpsc::Sender<ClientMessage>,
    cancel: CancellationToken,
) {
    loop {
        let frame = tokio::select! {
            () = cancel.cancelled() => break,
            frame = frames.pop() => frame,
        };
        let msg = ClientMessage::AudioInputChunk {
            chunk: encode::encode_frame(&frame),
        };
        match outbound.try_send(msg) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => debug!("outbound queue full, dropping audio chunk"),
            Err(TrySendError::Closed(_)) => break,
        }
    }
    debug!("encode-and-send task finished");
}

/// Single sequential consumer of inbound messages.
///
/// Transport error, peer close, and stream end all fall through to the same
/// teardown; `stop()` arriving first makes that teardown a no-op.
async fn demux(
    mut inbound: mpsc::Receiver<ServerMessage>,
    playback_tx: mpsc::UnboundedSender<PlaybackCommand>,
    dispatcher: ToolDispatcher,
    notices: broadcast::Sender<SessionNotice>,
    active: Arc<Mutex<Option<ActiveSession>>>,
    state_tx: watch::Sender<SessionState>,
    cancel: CancellationToken,
) {
    let mut turns = TurnAggregator::new();

    loop {
        let msg = tokio::select! {
            () = cancel.cancelled() => return,
            msg = inbound.recv() => msg,
        };
        let Some(msg) = msg else {
            warn!("transport stream ended");
            break;
        };

        match msg {
            ServerMessage::AudioDelta { data: Some(data) } => match encode::decode_pcm16(&data) {
                Ok(samples) => {
                    let _ = playback_tx.send(PlaybackCommand::Enqueue { samples });
                }
                Err(e) => warn!("dropping malformed audio delta: {e}"),
            },
            ServerMessage::AudioDelta { data: None } => {}
            ServerMessage::TranscriptDelta {
                role,
                text: Some(text),
            } => {
                let event = turns.push(role, &text);
                let _ = notices.send(SessionNotice::Transcript(event));
            }
            ServerMessage::TranscriptDelta { text: None, .. } => {}
            ServerMessage::ToolCallBatch { calls } => {
                // Each call runs on its own task; items in one batch resolve
                // independently and possibly out of order.
                for call in calls {
                    dispatcher.dispatch(call);
                }
            }
            ServerMessage::Interrupted => {
                debug!("interruption: flushing playback");
                let _ = playback_tx.send(PlaybackCommand::Flush);
            }
            ServerMessage::Error { message } => {
                warn!("transport error: {}", message.as_deref().unwrap_or("<none>"));
                let _ = notices.send(SessionNotice::TransportFailure { message });
                break;
            }
            ServerMessage::Closed => {
                info!("transport closed by peer");
                let _ = notices.send(SessionNotice::TransportFailure { message: None });
                break;
            }
        }
    }

    // Transport-triggered teardown. Tasks shut down on the cancellation
    // token; the slot take makes a later stop() a no-op.
    let taken = active.lock().await.take();
    if let Some(session) = taken {
        session.cancel.cancel();
    }
    let _ = state_tx.send_replace(SessionState::Idle);
    let _ = notices.send(SessionNotice::State(SessionState::Idle));
}
