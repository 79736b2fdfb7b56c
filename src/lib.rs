//! Tutor Voice - Realtime voice session manager for an AI tutoring assistant
//!
//! This library owns the duplex audio path between a local microphone and a
//! remote conversational endpoint:
//! - Capture: 16 kHz mono frames, PCM16-encoded and streamed out
//! - Playback: 24 kHz reply audio, scheduled gaplessly behind a cursor
//! - Barge-in: user speech over playback flushes everything queued
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │                  VoiceSession                     │
//! │   start / stop  │  status + transcript watches   │
//! └───────┬──────────────────┬───────────────┬───────┘
//!         │                  │               │
//! ┌───────▼──────┐  ┌────────▼───────┐  ┌────▼───────────┐
//! │ AudioCapture │  │ LiveConnector  │  │ Playback       │
//! │ cpal 16 kHz  │  │ websocket      │  │ Scheduler      │
//! │ frame chan   │  │ ServerEvents   │  │ cpal 24 kHz    │
//! └──────────────┘  └────────────────┘  └────────────────┘
//! ```

pub mod audio;
pub mod config;
pub mod error;
pub mod live;
pub mod session;

pub use audio::{
    AudioCapture, CaptureSource, CpalSink, OutputSink, PlaybackScheduler, Scheduled, SourceId,
};
pub use config::{AudioConfig, SessionConfig};
pub use error::{Error, Result};
pub use live::{AudioFrame, GeminiConnector, LiveConnector, LiveSession, ServerEvent, SessionSetup};
pub use session::{SessionStatus, VoiceSession};
