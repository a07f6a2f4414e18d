//! Finvox: realtime voice session manager for a finance assistant.
//!
//! The crate drives a bidirectional audio conversation with a realtime
//! speech model and routes model-initiated tool calls into a personal
//! finance backend.
//!
//! # Architecture
//!
//! Independent stages connected by async channels:
//! - **Audio capture**: Records microphone frames via `cpal` through a
//!   bounded drop-oldest queue
//! - **Transport**: WebSocket link carrying PCM16 chunks and tagged JSON
//!   messages both ways
//! - **Session controller**: Lifecycle state machine plus the single
//!   sequential demux of inbound messages
//! - **Playback scheduler**: Gapless back-to-back scheduling of audio
//!   deltas, flushed on interruption
//! - **Tool dispatcher**: Immediate and deferred tool call resolution with
//!   at-most-once responses per call id
//! - **Finance client**: REST client and tool handlers over the account
//!   backend

pub mod audio;
pub mod config;
pub mod error;
pub mod finance;
pub mod session;
pub mod tools;
pub mod transcript;
pub mod transport;

pub use config::VoxConfig;
pub use error::{Result, VoxError};
pub use session::{SessionNotice, SessionState, VoiceSession};
pub use tools::{DeferredToken, ToolHandler, ToolOutcome};
pub use transcript::{TranscriptEvent, TranscriptRole};
