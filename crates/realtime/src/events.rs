//! Wire events exchanged with the realtime voice service.
//!
//! Both directions are JSON objects tagged by a `type` field. Only the
//! event types this client consumes get their own variant; everything else
//! deserializes to [`ServerEvent::Ignored`] so new server event types never
//! break an existing session.

use serde::{Deserialize, Serialize};

/// Events received from the realtime service.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// Server-side voice activity detection saw the user start talking.
    #[serde(rename = "input_audio_buffer.speech_started")]
    SpeechStarted,
    /// Server-side voice activity detection saw the user stop talking.
    #[serde(rename = "input_audio_buffer.speech_stopped")]
    SpeechStopped,
    /// The assistant began producing a response.
    #[serde(rename = "response.created")]
    ResponseCreated,
    /// The assistant finished its response.
    #[serde(rename = "response.done")]
    ResponseDone,
    /// The response was cancelled, typically because the user barged in.
    #[serde(rename = "response.cancelled")]
    ResponseCancelled,
    /// Assistant audio started playing out.
    #[serde(rename = "output_audio_buffer.started")]
    OutputAudioStarted,
    /// Assistant audio finished playing out.
    #[serde(rename = "output_audio_buffer.stopped")]
    OutputAudioStopped,
    /// Assistant audio was discarded server-side mid-utterance.
    #[serde(rename = "output_audio_buffer.cleared")]
    OutputAudioCleared,
    /// A chunk of assistant audio, base64-encoded PCM16.
    #[serde(rename = "response.audio.delta")]
    ResponseAudioDelta { delta: String },
    #[serde(rename = "error")]
    Error { error: ServerErrorDetail },
    /// Any event type this client does not consume.
    #[serde(other)]
    Ignored,
}

/// Payload of a server `error` event.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ServerErrorDetail {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub code: Option<String>,
}

/// Events sent to the realtime service.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    /// Configures the session after the socket opens.
    #[serde(rename = "session.update")]
    SessionUpdate { session: SessionConfig },
    /// Appends a chunk of microphone audio, base64-encoded PCM16.
    #[serde(rename = "input_audio_buffer.append")]
    InputAudioBufferAppend { audio: String },
}

/// Session parameters sent in the initial `session.update`.
#[derive(Debug, Clone, Serialize)]
pub struct SessionConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    pub voice: String,
    pub modalities: Vec<String>,
    pub input_audio_format: String,
    pub output_audio_format: String,
    pub turn_detection: TurnDetection,
}

/// Turn-detection settings; only server-side VAD is used.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnDetection {
    ServerVad {
        threshold: f32,
        prefix_padding_ms: u32,
        silence_duration_ms: u32,
        create_response: bool,
    },
}
