//! Audio capture from microphone

use std::sync::mpsc as std_mpsc;
use std::thread::JoinHandle;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};
use tokio::sync::mpsc;

use crate::{Error, Result};

/// Source of captured microphone frames
///
/// Implemented by [`AudioCapture`] for real hardware and by test doubles in
/// the integration suite. Frames are fixed-size f32 sample buffers delivered
/// on an unbounded channel; the capture path never applies backpressure.
pub trait CaptureSource: Send {
    /// Begin capturing and return the frame channel
    ///
    /// # Errors
    ///
    /// Returns [`Error::MediaAccessDenied`] if the microphone cannot be opened.
    fn start(&mut self) -> Result<mpsc::UnboundedReceiver<Vec<f32>>>;

    /// Stop capturing; idempotent
    fn stop(&mut self);
}

/// Captures audio from the default input device
///
/// The cpal stream is owned by a dedicated thread so the handle stays `Send`;
/// the stream itself is not.
pub struct AudioCapture {
    sample_rate: u32,
    frame_samples: usize,
    worker: Option<CaptureWorker>,
}

struct CaptureWorker {
    stop_tx: std_mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

impl AudioCapture {
    /// Create a capture instance for the given rate and frame size
    #[must_use]
    pub const fn new(sample_rate: u32, frame_samples: usize) -> Self {
        Self {
            sample_rate,
            frame_samples,
            worker: None,
        }
    }

    /// Check if currently capturing
    #[must_use]
    pub const fn is_capturing(&self) -> bool {
        self.worker.is_some()
    }

    fn spawn_worker(&self) -> Result<(CaptureWorker, mpsc::UnboundedReceiver<Vec<f32>>)> {
        let (frame_tx, frame_rx) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = std_mpsc::channel();
        let (stop_tx, stop_rx) = std_mpsc::channel();

        let sample_rate = self.sample_rate;
        let frame_samples = self.frame_samples;

        let handle = std::thread::spawn(move || {
            let stream = match build_input_stream(sample_rate, frame_samples, frame_tx) {
                Ok(stream) => stream,
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };

            if let Err(e) = stream.play() {
                let _ = ready_tx.send(Err(Error::MediaAccessDenied(e.to_string())));
                return;
            }

            let _ = ready_tx.send(Ok(()));

            // Hold the stream alive until stop() or handle drop.
            let _ = stop_rx.recv();
            drop(stream);
        });

        match ready_rx.recv() {
            Ok(Ok(())) => Ok((CaptureWorker { stop_tx, handle }, frame_rx)),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(Error::Audio("capture worker exited early".to_string())),
        }
    }
}

impl CaptureSource for AudioCapture {
    fn start(&mut self) -> Result<mpsc::UnboundedReceiver<Vec<f32>>> {
        if self.worker.is_some() {
            return Err(Error::Session("capture already running".to_string()));
        }

        let (worker, frame_rx) = self.spawn_worker()?;
        self.worker = Some(worker);

        tracing::debug!(
            sample_rate = self.sample_rate,
            frame_samples = self.frame_samples,
            "audio capture started"
        );
        Ok(frame_rx)
    }

    fn stop(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = worker.stop_tx.send(());
            let _ = worker.handle.join();
            tracing::debug!("audio capture stopped");
        }
    }
}

impl Drop for AudioCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Build a mono input stream that emits fixed-size frames
fn build_input_stream(
    sample_rate: u32,
    frame_samples: usize,
    frame_tx: mpsc::UnboundedSender<Vec<f32>>,
) -> Result<cpal::Stream> {
    let host = cpal::default_host();

    let device = host
        .default_input_device()
        .ok_or_else(|| Error::MediaAccessDenied("no input device available".to_string()))?;

    let supported_config = device
        .supported_input_configs()
        .map_err(|e| Error::MediaAccessDenied(e.to_string()))?
        .find(|c| {
            c.channels() == 1
                && c.min_sample_rate() <= SampleRate(sample_rate)
                && c.max_sample_rate() >= SampleRate(sample_rate)
        })
        .ok_or_else(|| Error::Audio("no suitable input config found".to_string()))?;

    let config: StreamConfig = supported_config
        .with_sample_rate(SampleRate(sample_rate))
        .config();

    tracing::debug!(
        device = device.name().unwrap_or_default(),
        sample_rate,
        channels = config.channels,
        "audio capture initialized"
    );

    let mut pending: Vec<f32> = Vec::with_capacity(frame_samples * 2);

    let stream = device
        .build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                pending.extend_from_slice(data);
                while pending.len() >= frame_samples {
                    let frame: Vec<f32> = pending.drain(..frame_samples).collect();
                    // Fire-and-forget: a closed receiver just means the
                    // session is tearing down.
                    let _ = frame_tx.send(frame);
                }
            },
            |err| {
                tracing::error!(error = %err, "audio capture error");
            },
            None,
        )
        .map_err(|e| Error::MediaAccessDenied(e.to_string()))?;

    Ok(stream)
}

/// Convert f32 samples to WAV bytes for debug dumps
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;

        for &sample in samples {
            #[allow(clippy::cast_possible_truncation)]
            let sample_i16 = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
            writer
                .write_sample(sample_i16)
                .map_err(|e| Error::Audio(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}

/// Dump f32 samples to a WAV file
///
/// # Errors
///
/// Returns error if WAV encoding or the file write fails
pub fn write_wav(path: &std::path::Path, samples: &[f32], sample_rate: u32) -> Result<()> {
    let wav = samples_to_wav(samples, sample_rate)?;
    std::fs::write(path, wav)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wav_header_is_valid() {
        let samples: Vec<f32> = (0..160).map(|i| (i as f32 / 160.0).sin()).collect();
        let wav = samples_to_wav(&samples, 16_000).unwrap();
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        assert!(wav.len() > 44);
    }

    #[test]
    fn write_wav_creates_readable_file() {
        let path = std::env::temp_dir().join("tutor-voice-write-wav-test.wav");
        let samples: Vec<f32> = vec![0.0; 320];

        write_wav(&path, &samples, 16_000).unwrap();
        let written = std::fs::read(&path).unwrap();
        assert_eq!(&written[0..4], b"RIFF");

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn write_wav_surfaces_io_failure() {
        let path = std::env::temp_dir().join("tutor-voice-missing-dir/out.wav");
        let err = write_wav(&path, &[0.0], 16_000).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn stop_without_start_is_noop() {
        let mut capture = AudioCapture::new(16_000, 4096);
        capture.stop();
        assert!(!capture.is_capturing());
    }
}
