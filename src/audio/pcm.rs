//! PCM16 frame codec
//!
//! The live API carries audio as base64-encoded little-endian signed 16-bit
//! PCM, tagged with a MIME descriptor like `audio/pcm;rate=16000`. This module
//! converts between that wire form and the f32 sample buffers the audio
//! devices work with.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;

use crate::{Error, Result};

/// MIME descriptor for a PCM stream at the given sample rate
#[must_use]
pub fn mime_type(sample_rate: u32) -> String {
    format!("audio/pcm;rate={sample_rate}")
}

/// Convert f32 samples in `[-1.0, 1.0]` to PCM16 bytes and base64-encode them
#[must_use]
pub fn encode_frame(samples: &[f32]) -> String {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        #[allow(clippy::cast_possible_truncation)]
        let value = (sample * 32768.0).clamp(-32768.0, 32767.0) as i16;
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    BASE64.encode(bytes)
}

/// Decode a base64 PCM16 payload into f32 samples
///
/// # Errors
///
/// Returns [`Error::Decode`] if the payload is not valid base64 or does not
/// contain a whole number of 16-bit samples.
pub fn decode_frame(data: &str) -> Result<Vec<f32>> {
    let bytes = BASE64.decode(data)?;
    if bytes.len() % 2 != 0 {
        return Err(Error::Decode(format!(
            "PCM16 payload has odd length {}",
            bytes.len()
        )));
    }

    Ok(bytes
        .chunks_exact(2)
        .map(|pair| f32::from(i16::from_le_bytes([pair[0], pair[1]])) / 32768.0)
        .collect())
}

/// Duration in seconds of a mono sample buffer at the given rate
#[must_use]
pub fn duration_secs(sample_count: usize, sample_rate: u32) -> f64 {
    #[allow(clippy::cast_precision_loss)]
    let samples = sample_count as f64;
    samples / f64::from(sample_rate)
}
