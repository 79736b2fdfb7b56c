//! Live conversational endpoint
//!
//! A live session is a duplex stream: PCM16 microphone frames go out, and
//! transcript fragments, spoken-reply audio, interruption notices, and a
//! closing notice come back. [`LiveConnector`] and [`LiveSession`] are the
//! seams the session manager works against; [`gemini`] provides the real
//! websocket-backed implementation.

pub mod gemini;
pub mod wire;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::Result;
use crate::audio::pcm;

pub use gemini::GeminiConnector;

/// One outbound audio frame in wire form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    /// Base64-encoded PCM16 payload
    pub data: String,
    /// MIME descriptor, e.g. `audio/pcm;rate=16000`
    pub mime_type: String,
}

impl AudioFrame {
    /// Encode captured f32 samples into a frame
    #[must_use]
    pub fn from_samples(samples: &[f32], sample_rate: u32) -> Self {
        Self {
            data: pcm::encode_frame(samples),
            mime_type: pcm::mime_type(sample_rate),
        }
    }
}

/// Events delivered by the remote end of a live session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    /// Fragment of the spoken reply's transcript, in arrival order
    TranscriptFragment(String),
    /// Base64-encoded PCM16 audio chunk at the playback rate
    AudioChunk(String),
    /// The user spoke over playback; flush everything queued
    Interrupted,
    /// The remote end closed the session
    Closed,
}

/// Parameters sent when opening a live session
#[derive(Debug, Clone)]
pub struct SessionSetup {
    /// Model identifier
    pub model: String,
    /// System instruction text
    pub system_instruction: String,
    /// Prebuilt voice name for audio replies
    pub voice: String,
}

/// Handle to an open live session
#[async_trait]
pub trait LiveSession: Send + Sync {
    /// Forward one captured audio frame
    ///
    /// Implementations must not block: the caller awaits this inline for
    /// every frame and relies on it to preserve submission order.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Connection`] if the session is gone.
    async fn send_audio(&self, frame: AudioFrame) -> Result<()>;

    /// Close the session; idempotent
    async fn close(&self);
}

/// Opens live sessions
#[async_trait]
pub trait LiveConnector: Send + Sync {
    /// Open a session and wait for the remote acknowledgment
    ///
    /// Resolves once the remote end has accepted the setup; this is the one
    /// point `start` suspends on before the session is listening.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Connection`] if the session cannot be opened.
    async fn connect(
        &self,
        setup: SessionSetup,
    ) -> Result<(Box<dyn LiveSession>, mpsc::UnboundedReceiver<ServerEvent>)>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_from_samples_carries_mime_tag() {
        let frame = AudioFrame::from_samples(&[0.0, 0.5], 16_000);
        assert_eq!(frame.mime_type, "audio/pcm;rate=16000");
        assert!(!frame.data.is_empty());
    }
}
