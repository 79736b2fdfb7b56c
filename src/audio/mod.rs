//! Audio pipeline
//!
//! Capture from the microphone at 16 kHz, PCM16 wire conversion, and scheduled
//! gapless playback at 24 kHz.

mod capture;
pub mod pcm;
mod playback;

pub use capture::{AudioCapture, CaptureSource, samples_to_wav, write_wav};
pub use playback::{CpalSink, OutputSink, PlaybackScheduler, Scheduled, SourceId};
