//! Wire message types exchanged with the conversational service.
//!
//! The protocol is message-oriented JSON over a bidirectional transport.
//! Inbound messages tolerate missing optional fields: a delta without its
//! payload deserializes cleanly and is treated as a no-op by the demux loop.

use crate::tools::{ToolCallRequest, ToolDeclaration};
use crate::transcript::TranscriptRole;
use serde::{Deserialize, Serialize};

/// A unit of encoded audio on the wire: base64 bytes tagged with their format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedChunk {
    /// Base64-encoded sample bytes.
    pub data: String,
    /// Encoding tag, e.g. `audio/pcm;rate=16000`.
    pub mime_type: String,
}

impl EncodedChunk {
    /// Build a PCM16 chunk tag for the given sample rate.
    pub fn pcm16(data: String, sample_rate: u32) -> Self {
        Self {
            data,
            mime_type: format!("audio/pcm;rate={sample_rate}"),
        }
    }
}

/// Session configuration carried by the opening message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetupPayload {
    /// Model identifier to converse with.
    pub model: String,
    /// Requested response modality. Always `audio` for voice sessions.
    pub response_modality: String,
    /// Prebuilt voice name.
    pub voice: String,
    /// Whether the service should transcribe captured user audio.
    pub transcribe_input: bool,
    /// Whether the service should transcribe its own replies.
    pub transcribe_output: bool,
    /// Tool catalog advertised for this session.
    pub tools: Vec<ToolDeclaration>,
    /// System instruction text block.
    pub system_instruction: String,
}

/// Messages sent from client to service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Session open: carries the full session configuration.
    Setup { config: SetupPayload },
    /// One captured-and-encoded audio chunk.
    AudioInputChunk { chunk: EncodedChunk },
    /// Correlated result for a previously received tool call.
    ToolCallResponse {
        id: String,
        name: String,
        result: serde_json::Value,
    },
}

/// Messages received from the service.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Encoded assistant audio for gapless playback.
    AudioDelta {
        #[serde(default)]
        data: Option<String>,
    },
    /// Transcript fragment attributed to one role.
    TranscriptDelta {
        role: TranscriptRole,
        #[serde(default)]
        text: Option<String>,
    },
    /// A batch of tool invocations to dispatch.
    ToolCallBatch {
        #[serde(default)]
        calls: Vec<ToolCallRequest>,
    },
    /// The user barged in over assistant audio; flush playback.
    Interrupted,
    /// Terminal transport-level failure.
    Error {
        #[serde(default)]
        message: Option<String>,
    },
    /// The service closed the session.
    Closed,
}
