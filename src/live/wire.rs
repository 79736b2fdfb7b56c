//! Wire format for the live API
//!
//! JSON message shapes exchanged over the websocket: the setup payload sent
//! on open, the realtime-input envelope wrapping each audio frame, and the
//! server messages carrying transcription, audio, and interruption notices.

use serde::{Deserialize, Serialize};

use super::{AudioFrame, ServerEvent, SessionSetup};

/// First message on the socket: session setup
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetupMessage {
    setup: Setup,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Setup {
    model: String,
    generation_config: GenerationConfig,
    system_instruction: Content,
    /// Requests transcript text alongside the spoken reply
    output_audio_transcription: Empty,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_modalities: Vec<String>,
    speech_config: SpeechConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SpeechConfig {
    voice_config: VoiceConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VoiceConfig {
    prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PrebuiltVoiceConfig {
    voice_name: String,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct Empty {}

impl SetupMessage {
    /// Build the setup payload for a session
    #[must_use]
    pub fn new(setup: &SessionSetup) -> Self {
        Self {
            setup: Setup {
                model: format!("models/{}", setup.model),
                generation_config: GenerationConfig {
                    response_modalities: vec!["AUDIO".to_string()],
                    speech_config: SpeechConfig {
                        voice_config: VoiceConfig {
                            prebuilt_voice_config: PrebuiltVoiceConfig {
                                voice_name: setup.voice.clone(),
                            },
                        },
                    },
                },
                system_instruction: Content {
                    parts: vec![Part {
                        text: setup.system_instruction.clone(),
                    }],
                },
                output_audio_transcription: Empty {},
            },
        }
    }
}

/// Envelope wrapping one outbound audio frame
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInputMessage {
    realtime_input: RealtimeInput,
}

#[derive(Debug, Serialize)]
struct RealtimeInput {
    media: MediaBlob,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MediaBlob {
    data: String,
    mime_type: String,
}

impl RealtimeInputMessage {
    /// Wrap a frame for transmission
    #[must_use]
    pub fn new(frame: AudioFrame) -> Self {
        Self {
            realtime_input: RealtimeInput {
                media: MediaBlob {
                    data: frame.data,
                    mime_type: frame.mime_type,
                },
            },
        }
    }
}

/// Inbound message from the live endpoint
///
/// Fields this client does not consume are ignored by serde.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerMessage {
    setup_complete: Option<Empty>,
    server_content: Option<ServerContent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerContent {
    output_transcription: Option<Transcription>,
    model_turn: Option<ModelTurn>,
    #[serde(default)]
    interrupted: bool,
}

#[derive(Debug, Deserialize)]
struct Transcription {
    text: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModelTurn {
    #[serde(default)]
    parts: Vec<InboundPart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InboundPart {
    inline_data: Option<MediaBlob>,
}

impl ServerMessage {
    /// Parse one websocket text payload
    ///
    /// # Errors
    ///
    /// Returns a serialization error for payloads that are not valid JSON.
    pub fn parse(text: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Whether this is the setup acknowledgment
    #[must_use]
    pub const fn is_setup_complete(&self) -> bool {
        self.setup_complete.is_some()
    }

    /// Extract session events, preserving transcript-before-audio order
    #[must_use]
    pub fn into_events(self) -> Vec<ServerEvent> {
        let Some(content) = self.server_content else {
            return Vec::new();
        };

        let mut events = Vec::new();
        if let Some(transcription) = content.output_transcription {
            events.push(ServerEvent::TranscriptFragment(transcription.text));
        }
        if let Some(turn) = content.model_turn {
            for part in turn.parts {
                if let Some(blob) = part.inline_data {
                    events.push(ServerEvent::AudioChunk(blob.data));
                }
            }
        }
        if content.interrupted {
            events.push(ServerEvent::Interrupted);
        }
        events
    }
}
