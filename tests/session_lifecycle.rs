//! Session lifecycle integration tests.
//!
//! Exercises the session controller end to end against an in-memory
//! connector and fake audio devices: lifecycle transitions, the demux
//! routing of audio/transcript/tool/interruption messages, deferred tool
//! completion, and teardown idempotence.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use async_trait::async_trait;
use finvox::audio::{AudioDevices, FrameQueue, InputDevice, OutputDevice, PlaybackCommand};
use finvox::config::{AudioConfig, VoxConfig};
use finvox::session::{SessionNotice, SessionState, VoiceSession};
use finvox::tools::{ToolCallRequest, ToolOutcome};
use finvox::transport::{ClientMessage, Connector, ServerMessage, SetupPayload, TransportLink};
use finvox::{DeferredToken, Result, ToolHandler, TranscriptRole, VoxError};
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// In-memory transport: the test feeds inbound messages and reads what the
/// session sent outbound.
struct FakeConnector {
    handles: Mutex<Option<FakeLinkHandles>>,
}

struct FakeLinkHandles {
    inbound_tx: mpsc::Sender<ServerMessage>,
    outbound_rx: mpsc::Receiver<ClientMessage>,
    setup: SetupPayload,
}

impl FakeConnector {
    fn new() -> Self {
        Self {
            handles: Mutex::new(None),
        }
    }

    fn take_handles(&self) -> FakeLinkHandles {
        self.handles
            .lock()
            .unwrap()
            .take()
            .expect("connect was never called")
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(
        &self,
        setup: SetupPayload,
        outbound_capacity: usize,
        _cancel: CancellationToken,
    ) -> Result<TransportLink> {
        let (outbound_tx, outbound_rx) = mpsc::channel(outbound_capacity);
        let (inbound_tx, inbound_rx) = mpsc::channel(64);
        *self.handles.lock().unwrap() = Some(FakeLinkHandles {
            inbound_tx,
            outbound_rx,
            setup,
        });
        Ok(TransportLink {
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }
}

/// Silent input device: produces nothing, waits for cancellation.
struct SilentInput;

#[async_trait]
impl InputDevice for SilentInput {
    async fn run(self: Box<Self>, _frames: FrameQueue, cancel: CancellationToken) -> Result<()> {
        cancel.cancelled().await;
        Ok(())
    }
}

/// Output device that forwards every playback command to the test.
struct RecordingOutput {
    commands_tx: mpsc::UnboundedSender<PlaybackCommand>,
}

#[async_trait]
impl OutputDevice for RecordingOutput {
    async fn run(
        self: Box<Self>,
        mut commands: mpsc::UnboundedReceiver<PlaybackCommand>,
        cancel: CancellationToken,
    ) -> Result<()> {
        loop {
            tokio::select! {
                () = cancel.cancelled() => return Ok(()),
                cmd = commands.recv() => {
                    let Some(cmd) = cmd else { return Ok(()) };
                    let _ = self.commands_tx.send(cmd);
                }
            }
        }
    }
}

struct FakeAudio {
    playback_tx: mpsc::UnboundedSender<PlaybackCommand>,
}

impl FakeAudio {
    fn new() -> (Self, mpsc::UnboundedReceiver<PlaybackCommand>) {
        let (playback_tx, playback_rx) = mpsc::unbounded_channel();
        (Self { playback_tx }, playback_rx)
    }
}

impl AudioDevices for FakeAudio {
    fn open_input(&self, _config: &AudioConfig) -> Result<Box<dyn InputDevice>> {
        Ok(Box::new(SilentInput))
    }

    fn open_output(&self, _config: &AudioConfig) -> Result<Box<dyn OutputDevice>> {
        Ok(Box::new(RecordingOutput {
            commands_tx: self.playback_tx.clone(),
        }))
    }
}

/// Audio stack whose input device cannot be acquired.
struct DeniedAudio;

impl AudioDevices for DeniedAudio {
    fn open_input(&self, _config: &AudioConfig) -> Result<Box<dyn InputDevice>> {
        Err(VoxError::DeviceAccess("microphone permission refused".into()))
    }

    fn open_output(&self, _config: &AudioConfig) -> Result<Box<dyn OutputDevice>> {
        Ok(Box::new(RecordingOutput {
            commands_tx: mpsc::unbounded_channel().0,
        }))
    }
}

/// Connector that never completes its handshake; only cancellation ends it.
struct HangingConnector;

#[async_trait]
impl Connector for HangingConnector {
    async fn connect(
        &self,
        _setup: SetupPayload,
        _outbound_capacity: usize,
        cancel: CancellationToken,
    ) -> Result<TransportLink> {
        cancel.cancelled().await;
        Err(VoxError::Transport("connection cancelled".into()))
    }
}

/// Handler that answers everything immediately except `pay_bill`, which it
/// defers and parks the token for the test to complete.
struct ScriptedHandler {
    deferred: Mutex<Option<DeferredToken>>,
}

impl ScriptedHandler {
    fn new() -> Self {
        Self {
            deferred: Mutex::new(None),
        }
    }

    fn take_token(&self) -> Option<DeferredToken> {
        self.deferred.lock().unwrap().take()
    }
}

#[async_trait]
impl ToolHandler for ScriptedHandler {
    async fn on_tool_call(&self, call: &ToolCallRequest) -> Result<ToolOutcome> {
        if call.name == "pay_bill" {
            *self.deferred.lock().unwrap() = Some(DeferredToken::for_call(call));
            return Ok(ToolOutcome::Deferred);
        }
        Ok(ToolOutcome::Immediate(json!({"echo": call.name})))
    }
}

struct Harness {
    session: Arc<VoiceSession>,
    connector: Arc<FakeConnector>,
    handler: Arc<ScriptedHandler>,
    playback_rx: mpsc::UnboundedReceiver<PlaybackCommand>,
}

fn harness() -> Harness {
    let connector = Arc::new(FakeConnector::new());
    let handler = Arc::new(ScriptedHandler::new());
    let (audio, playback_rx) = FakeAudio::new();
    let session = Arc::new(VoiceSession::new(
        VoxConfig::default(),
        connector.clone(),
        Arc::new(audio),
        handler.clone(),
    ));
    Harness {
        session,
        connector,
        handler,
        playback_rx,
    }
}

async fn recv_notice(rx: &mut tokio::sync::broadcast::Receiver<SessionNotice>) -> SessionNotice {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for notice")
        .expect("notice channel closed")
}

#[tokio::test]
async fn start_reaches_active_and_advertises_the_catalog() {
    let h = harness();
    assert_eq!(h.session.current_state(), SessionState::Idle);

    // Subscribed before start: the broadcast queue retains the intermediate
    // Connecting transition even though the watch channel only holds the
    // latest state.
    let mut notices = h.session.subscribe();
    h.session.start().await.unwrap();
    assert_eq!(h.session.current_state(), SessionState::Active);

    let mut states = Vec::new();
    while states.len() < 2 {
        if let SessionNotice::State(state) = recv_notice(&mut notices).await {
            states.push(state);
        }
    }
    assert_eq!(states, vec![SessionState::Connecting, SessionState::Active]);

    let handles = h.connector.take_handles();
    assert_eq!(handles.setup.tools.len(), 7);
    assert!(handles.setup.tools.iter().any(|t| t.name == "pay_bill"));

    h.session.stop().await;
    assert_eq!(h.session.current_state(), SessionState::Idle);
}

#[tokio::test]
async fn second_start_is_rejected_while_active() {
    let h = harness();
    h.session.start().await.unwrap();

    let err = h.session.start().await.unwrap_err();
    assert!(err.to_string().contains("already started"), "{err}");

    // The running session is unaffected.
    assert_eq!(h.session.current_state(), SessionState::Active);
    h.session.stop().await;
}

#[tokio::test]
async fn stop_twice_is_a_no_op() {
    let h = harness();
    h.session.start().await.unwrap();
    h.session.stop().await;
    h.session.stop().await;
    assert_eq!(h.session.current_state(), SessionState::Idle);

    // A fresh session can start after the previous one fully stopped.
    h.session.start().await.unwrap();
    assert_eq!(h.session.current_state(), SessionState::Active);
    h.session.stop().await;
}

#[tokio::test]
async fn transcript_fragments_are_merged_and_broadcast() {
    let h = harness();
    h.session.start().await.unwrap();
    let mut notices = h.session.subscribe();
    let handles = h.connector.take_handles();

    for text in ["Pay ", "my bill"] {
        handles
            .inbound_tx
            .send(ServerMessage::TranscriptDelta {
                role: TranscriptRole::User,
                text: Some(text.to_owned()),
            })
            .await
            .unwrap();
    }

    let mut events = Vec::new();
    while events.len() < 2 {
        if let SessionNotice::Transcript(event) = recv_notice(&mut notices).await {
            events.push(event);
        }
    }
    assert!(events[0].starts_turn);
    assert_eq!(events[0].text, "Pay ");
    assert!(!events[1].starts_turn, "same role continues the turn");
    assert_eq!(events[1].text, "my bill");

    h.session.stop().await;
}

#[tokio::test]
async fn audio_deltas_flow_to_playback_and_interruption_flushes() {
    let mut h = harness();
    h.session.start().await.unwrap();
    let handles = h.connector.take_handles();

    // A real PCM16 chunk: two samples.
    let pcm: Vec<u8> = [(0.25f32 * 32767.0) as i16, 0i16]
        .iter()
        .flat_map(|s| s.to_le_bytes())
        .collect();
    let data = {
        use base64::Engine as _;
        base64::engine::general_purpose::STANDARD.encode(pcm)
    };
    handles
        .inbound_tx
        .send(ServerMessage::AudioDelta { data: Some(data) })
        .await
        .unwrap();
    handles.inbound_tx.send(ServerMessage::Interrupted).await.unwrap();

    let first = tokio::time::timeout(Duration::from_secs(2), h.playback_rx.recv())
        .await
        .unwrap()
        .unwrap();
    match first {
        PlaybackCommand::Enqueue { samples } => {
            assert_eq!(samples.len(), 2);
            assert!((samples[0] - 0.25).abs() < 1e-3);
        }
        PlaybackCommand::Flush => panic!("enqueue must precede flush"),
    }

    let second = tokio::time::timeout(Duration::from_secs(2), h.playback_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(second, PlaybackCommand::Flush));

    h.session.stop().await;
}

#[tokio::test]
async fn malformed_audio_delta_is_skipped_without_teardown() {
    let h = harness();
    h.session.start().await.unwrap();
    let handles = h.connector.take_handles();

    handles
        .inbound_tx
        .send(ServerMessage::AudioDelta {
            data: Some("not base64!!".to_owned()),
        })
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    // The session survived the bad chunk.
    assert_eq!(h.session.current_state(), SessionState::Active);
    h.session.stop().await;
}

#[tokio::test]
async fn deferred_tool_call_completes_through_the_session() {
    let h = harness();
    h.session.start().await.unwrap();
    let mut handles = h.connector.take_handles();

    handles
        .inbound_tx
        .send(ServerMessage::ToolCallBatch {
            calls: vec![ToolCallRequest {
                id: "call-7".into(),
                name: "pay_bill".into(),
                args: serde_json::from_value(json!({"billId": "b1"})).unwrap(),
            }],
        })
        .await
        .unwrap();

    // The handler defers; nothing goes out until the host decides.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(handles.outbound_rx.try_recv().is_err());

    let token = h.handler.take_token().expect("call was deferred");
    h.session
        .send_deferred_response(token, json!("Payment successful. Voice ID verified."))
        .await;

    let sent = tokio::time::timeout(Duration::from_secs(2), handles.outbound_rx.recv())
        .await
        .unwrap()
        .unwrap();
    match sent {
        ClientMessage::ToolCallResponse { id, name, result } => {
            assert_eq!(id, "call-7");
            assert_eq!(name, "pay_bill");
            assert_eq!(result, json!("Payment successful. Voice ID verified."));
        }
        other => panic!("unexpected outbound message: {other:?}"),
    }

    h.session.stop().await;
}

#[tokio::test]
async fn immediate_tool_call_responds_on_the_wire() {
    let h = harness();
    h.session.start().await.unwrap();
    let mut handles = h.connector.take_handles();

    handles
        .inbound_tx
        .send(ServerMessage::ToolCallBatch {
            calls: vec![ToolCallRequest {
                id: "call-1".into(),
                name: "get_account_balances".into(),
                args: serde_json::Map::new(),
            }],
        })
        .await
        .unwrap();

    let sent = tokio::time::timeout(Duration::from_secs(2), handles.outbound_rx.recv())
        .await
        .unwrap()
        .unwrap();
    match sent {
        ClientMessage::ToolCallResponse { id, result, .. } => {
            assert_eq!(id, "call-1");
            assert_eq!(result, json!({"echo": "get_account_balances"}));
        }
        other => panic!("unexpected outbound message: {other:?}"),
    }

    h.session.stop().await;
}

#[tokio::test]
async fn transport_close_tears_the_session_down() {
    let h = harness();
    h.session.start().await.unwrap();
    let mut state = h.session.state();
    let handles = h.connector.take_handles();

    handles.inbound_tx.send(ServerMessage::Closed).await.unwrap();

    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            state.changed().await.unwrap();
            if *state.borrow() == SessionState::Idle {
                break;
            }
        }
    })
    .await
    .expect("session never returned to idle");

    // stop() after transport teardown finds nothing to release.
    h.session.stop().await;
    assert_eq!(h.session.current_state(), SessionState::Idle);
}

#[tokio::test]
async fn denied_input_device_fails_start_back_to_idle() {
    let session = Arc::new(VoiceSession::new(
        VoxConfig::default(),
        Arc::new(FakeConnector::new()),
        Arc::new(DeniedAudio),
        Arc::new(ScriptedHandler::new()),
    ));

    let err = session.start().await.unwrap_err();
    assert!(matches!(err, VoxError::DeviceAccess(_)), "{err}");
    assert_eq!(session.current_state(), SessionState::Idle);

    // Nothing was acquired, so stop() finds nothing to release.
    session.stop().await;
    assert_eq!(session.current_state(), SessionState::Idle);
}

#[tokio::test]
async fn stop_during_connect_aborts_the_handshake() {
    let session = Arc::new(VoiceSession::new(
        VoxConfig::default(),
        Arc::new(HangingConnector),
        Arc::new(FakeAudio::new().0),
        Arc::new(ScriptedHandler::new()),
    ));

    let starter = {
        let session = Arc::clone(&session);
        tokio::spawn(async move { session.start().await })
    };
    // Let start() reach the hanging handshake.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(session.current_state(), SessionState::Connecting);

    tokio::time::timeout(Duration::from_secs(1), session.stop())
        .await
        .expect("stop must not wait out the handshake");

    let result = starter.await.unwrap();
    assert!(matches!(result, Err(VoxError::Transport(_))), "{result:?}");
    assert_eq!(session.current_state(), SessionState::Idle);
}

#[tokio::test]
async fn deferred_response_after_stop_is_dropped() {
    let h = harness();
    h.session.start().await.unwrap();
    let handles = h.connector.take_handles();

    handles
        .inbound_tx
        .send(ServerMessage::ToolCallBatch {
            calls: vec![ToolCallRequest {
                id: "call-9".into(),
                name: "pay_bill".into(),
                args: serde_json::from_value(json!({"billId": "b1"})).unwrap(),
            }],
        })
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    let token = h.handler.take_token().expect("call was deferred");

    h.session.stop().await;
    // No panic, no send: the session is gone.
    h.session.send_deferred_response(token, json!("late")).await;
    assert_eq!(h.session.current_state(), SessionState::Idle);
}
