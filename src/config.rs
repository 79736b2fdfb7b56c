//! Configuration for voice tutoring sessions

use serde::{Deserialize, Serialize};

/// Default live API model for native audio conversations
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-native-audio-preview-09-2025";

/// Default prebuilt voice used for spoken replies
pub const DEFAULT_VOICE: &str = "Zephyr";

/// Audio pipeline parameters
///
/// Capture runs at 16 kHz mono, playback at 24 kHz mono, matching what the
/// live API expects on each leg.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Microphone sample rate in Hz
    pub capture_sample_rate: u32,

    /// Playback sample rate in Hz
    pub playback_sample_rate: u32,

    /// Samples per outbound capture frame (4096 ≈ 256 ms at 16 kHz)
    pub frame_samples: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            capture_sample_rate: 16_000,
            playback_sample_rate: 24_000,
            frame_samples: 4096,
        }
    }
}

/// Configuration for one voice session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Subject being studied (e.g. "Mathematics"); opaque to the session
    pub subject: String,

    /// Grade level (e.g. "Grade 5"); opaque to the session
    pub grade: String,

    /// Response language tag ("ar", "en", "fr")
    pub language: String,

    /// Model identifier for the live endpoint
    pub model: String,

    /// Prebuilt voice name for spoken replies
    pub voice: String,

    /// Audio pipeline parameters
    #[serde(default)]
    pub audio: AudioConfig,
}

impl SessionConfig {
    /// Create a session config with default model, voice, and audio settings
    #[must_use]
    pub fn new(subject: &str, grade: &str, language: &str) -> Self {
        Self {
            subject: subject.to_string(),
            grade: grade.to_string(),
            language: language.to_string(),
            model: DEFAULT_MODEL.to_string(),
            voice: DEFAULT_VOICE.to_string(),
            audio: AudioConfig::default(),
        }
    }

    /// Build the system instruction sent when the live session opens
    #[must_use]
    pub fn system_instruction(&self) -> String {
        format!(
            "You are the Smart Professor for ({}) for ({}). Always respond in {}. \
             Start with a story when explaining. Be helpful and professional.",
            self.subject,
            self.grade,
            language_name(&self.language),
        )
    }
}

/// Map a language tag to the spelled-out name used in the instruction
fn language_name(tag: &str) -> &'static str {
    match tag {
        "ar" => "Arabic",
        "fr" => "French",
        _ => "English",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audio_defaults() {
        let audio = AudioConfig::default();
        assert_eq!(audio.capture_sample_rate, 16_000);
        assert_eq!(audio.playback_sample_rate, 24_000);
        assert_eq!(audio.frame_samples, 4096);
    }

    #[test]
    fn system_instruction_mentions_context() {
        let config = SessionConfig::new("Science", "Grade 4", "ar");
        let instruction = config.system_instruction();
        assert!(instruction.contains("(Science)"));
        assert!(instruction.contains("(Grade 4)"));
        assert!(instruction.contains("Arabic"));
    }

    #[test]
    fn unknown_language_falls_back_to_english() {
        let config = SessionConfig::new("Math", "Grade 1", "xx");
        assert!(config.system_instruction().contains("English"));
    }
}
