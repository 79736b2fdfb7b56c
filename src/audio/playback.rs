//! Scheduled audio playback
//!
//! Inbound audio chunks arrive faster than real time, so they are queued
//! back-to-back against a playback cursor rather than played as they land.
//! The cursor always sits at or ahead of the output clock; each scheduled
//! buffer advances it by its own duration, which keeps playback gapless and
//! overlap-free. Barge-in flushes every active source and resets the cursor
//! so the next chunk starts from the live clock instead of a stale position.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};
use tokio::sync::mpsc;

use crate::{Error, Result};

/// Identifier for one scheduled playback source
pub type SourceId = u64;

/// Audio output primitive
///
/// Accepts decoded sample buffers with a scheduled start time on its own
/// clock, and signals completion out-of-band (see [`CpalSink::new`]).
pub trait OutputSink: Send {
    /// Current output clock time in seconds
    fn now(&self) -> f64;

    /// Schedule a buffer to start playing at `at` seconds on the output clock
    ///
    /// # Errors
    ///
    /// Returns error if the sink can no longer accept buffers.
    fn start(&mut self, id: SourceId, samples: Vec<f32>, at: f64) -> Result<()>;

    /// Stop a scheduled or playing source; unknown ids are ignored
    fn stop(&mut self, id: SourceId);
}

/// One accepted playback buffer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scheduled {
    /// Source identifier, echoed by the ended channel on completion
    pub id: SourceId,
    /// Start time in seconds on the output clock
    pub start: f64,
    /// Buffer duration in seconds
    pub duration: f64,
}

/// Sequences inbound buffers for gapless playback and handles barge-in
pub struct PlaybackScheduler<S> {
    sink: S,
    sample_rate: u32,
    next_start: f64,
    next_id: SourceId,
    active: HashSet<SourceId>,
}

impl<S: OutputSink> PlaybackScheduler<S> {
    /// Create a scheduler over the given sink
    #[must_use]
    pub fn new(sink: S, sample_rate: u32) -> Self {
        Self {
            sink,
            sample_rate,
            next_start: 0.0,
            next_id: 0,
            active: HashSet::new(),
        }
    }

    /// Queue a decoded buffer immediately after the last scheduled one
    ///
    /// The start time never falls in the past: if the cursor has been
    /// overtaken by the output clock (startup, or right after an
    /// interruption), the buffer starts from the clock instead.
    ///
    /// # Errors
    ///
    /// Returns error if the sink rejects the buffer.
    pub fn enqueue(&mut self, samples: Vec<f32>) -> Result<Scheduled> {
        let start = self.next_start.max(self.sink.now());
        let duration = super::pcm::duration_secs(samples.len(), self.sample_rate);

        let id = self.next_id;
        self.next_id += 1;

        self.sink.start(id, samples, start)?;
        self.next_start = start + duration;
        self.active.insert(id);

        tracing::trace!(id, start, duration, "playback buffer scheduled");
        Ok(Scheduled {
            id,
            start,
            duration,
        })
    }

    /// Handle a source-ended signal; a no-op for already-removed sources
    pub fn source_ended(&mut self, id: SourceId) -> bool {
        self.active.remove(&id)
    }

    /// Barge-in: stop every active source and reset the cursor
    pub fn interrupt(&mut self) {
        let stopped = self.active.len();
        for id in self.active.drain() {
            self.sink.stop(id);
        }
        self.next_start = 0.0;
        if stopped > 0 {
            tracing::debug!(stopped, "playback interrupted");
        }
    }

    /// Number of sources currently scheduled or playing
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Current value of the playback cursor in seconds
    #[must_use]
    pub const fn next_start(&self) -> f64 {
        self.next_start
    }

    /// Access the underlying sink
    pub const fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }
}

/// A buffer queued inside the cpal output callback
struct SinkSource {
    id: SourceId,
    start_sample: u64,
    samples: Vec<f32>,
    position: usize,
}

struct SinkShared {
    sources: Vec<SinkSource>,
}

/// cpal-backed [`OutputSink`]
///
/// Owns an output stream on a dedicated thread. The clock is a sample
/// counter advanced by the output callback; scheduled buffers are mixed into
/// the callback's frames once the counter passes their start sample.
/// Completed source ids are reported on the channel returned by [`Self::new`].
pub struct CpalSink {
    sample_rate: u32,
    cursor: Arc<AtomicU64>,
    shared: Arc<Mutex<SinkShared>>,
    stop_tx: std_mpsc::Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl CpalSink {
    /// Open the default output device at the given rate
    ///
    /// Returns the sink and the channel carrying ended source ids.
    ///
    /// # Errors
    ///
    /// Returns error if no suitable output device is available.
    pub fn new(sample_rate: u32) -> Result<(Self, mpsc::UnboundedReceiver<SourceId>)> {
        let cursor = Arc::new(AtomicU64::new(0));
        let shared = Arc::new(Mutex::new(SinkShared {
            sources: Vec::new(),
        }));
        let (ended_tx, ended_rx) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = std_mpsc::channel();
        let (stop_tx, stop_rx) = std_mpsc::channel();

        let thread_cursor = Arc::clone(&cursor);
        let thread_shared = Arc::clone(&shared);

        let handle = std::thread::spawn(move || {
            let stream =
                match build_output_stream(sample_rate, thread_cursor, thread_shared, ended_tx) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

            if let Err(e) = stream.play() {
                let _ = ready_tx.send(Err(Error::Audio(e.to_string())));
                return;
            }

            let _ = ready_tx.send(Ok(()));
            let _ = stop_rx.recv();
            drop(stream);
        });

        match ready_rx.recv() {
            Ok(Ok(())) => Ok((
                Self {
                    sample_rate,
                    cursor,
                    shared,
                    stop_tx,
                    handle: Some(handle),
                },
                ended_rx,
            )),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(Error::Audio("playback worker exited early".to_string())),
        }
    }
}

impl OutputSink for CpalSink {
    fn now(&self) -> f64 {
        #[allow(clippy::cast_precision_loss)]
        let played = self.cursor.load(Ordering::Acquire) as f64;
        played / f64::from(self.sample_rate)
    }

    fn start(&mut self, id: SourceId, samples: Vec<f32>, at: f64) -> Result<()> {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let start_sample = (at * f64::from(self.sample_rate)).round() as u64;

        let mut shared = self
            .shared
            .lock()
            .map_err(|_| Error::Audio("playback state poisoned".to_string()))?;
        shared.sources.push(SinkSource {
            id,
            start_sample,
            samples,
            position: 0,
        });
        Ok(())
    }

    fn stop(&mut self, id: SourceId) {
        if let Ok(mut shared) = self.shared.lock() {
            shared.sources.retain(|s| s.id != id);
        }
    }
}

impl Drop for CpalSink {
    fn drop(&mut self) {
        let _ = self.stop_tx.send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Build the mixing output stream
fn build_output_stream(
    sample_rate: u32,
    cursor: Arc<AtomicU64>,
    shared: Arc<Mutex<SinkShared>>,
    ended_tx: mpsc::UnboundedSender<SourceId>,
) -> Result<cpal::Stream> {
    let host = cpal::default_host();

    let device = host
        .default_output_device()
        .ok_or_else(|| Error::Audio("no output device available".to_string()))?;

    let supported_config = device
        .supported_output_configs()
        .map_err(|e| Error::Audio(e.to_string()))?
        .find(|c| {
            c.channels() == 1
                && c.min_sample_rate() <= SampleRate(sample_rate)
                && c.max_sample_rate() >= SampleRate(sample_rate)
        })
        .or_else(|| {
            // Fallback: try stereo
            device.supported_output_configs().ok()?.find(|c| {
                c.channels() == 2
                    && c.min_sample_rate() <= SampleRate(sample_rate)
                    && c.max_sample_rate() >= SampleRate(sample_rate)
            })
        })
        .ok_or_else(|| Error::Audio("no suitable output config found".to_string()))?;

    let config: StreamConfig = supported_config
        .with_sample_rate(SampleRate(sample_rate))
        .config();

    tracing::debug!(
        device = device.name().unwrap_or_default(),
        sample_rate,
        channels = config.channels,
        "audio playback initialized"
    );

    let channels = config.channels as usize;

    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let mut now = cursor.load(Ordering::Acquire);
                let Ok(mut shared) = shared.lock() else {
                    data.fill(0.0);
                    return;
                };

                for frame in data.chunks_mut(channels) {
                    let mut mixed = 0.0f32;
                    for source in &mut shared.sources {
                        if source.start_sample <= now && source.position < source.samples.len() {
                            mixed += source.samples[source.position];
                            source.position += 1;
                        }
                    }

                    for out in frame.iter_mut() {
                        *out = mixed.clamp(-1.0, 1.0);
                    }
                    now += 1;
                }

                shared.sources.retain(|source| {
                    if source.position >= source.samples.len() {
                        let _ = ended_tx.send(source.id);
                        false
                    } else {
                        true
                    }
                });

                cursor.store(now, Ordering::Release);
            },
            |err| {
                tracing::error!(error = %err, "audio playback error");
            },
            None,
        )
        .map_err(|e| Error::Audio(e.to_string()))?;

    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Sink that records calls and lets tests move the clock
    struct FakeSink {
        clock: f64,
        started: Vec<(SourceId, usize, f64)>,
        stopped: Vec<SourceId>,
    }

    impl FakeSink {
        fn new() -> Self {
            Self {
                clock: 0.0,
                started: Vec::new(),
                stopped: Vec::new(),
            }
        }
    }

    impl OutputSink for FakeSink {
        fn now(&self) -> f64 {
            self.clock
        }

        fn start(&mut self, id: SourceId, samples: Vec<f32>, at: f64) -> Result<()> {
            self.started.push((id, samples.len(), at));
            Ok(())
        }

        fn stop(&mut self, id: SourceId) {
            self.stopped.push(id);
        }
    }

    fn scheduler() -> PlaybackScheduler<FakeSink> {
        PlaybackScheduler::new(FakeSink::new(), 24_000)
    }

    #[test]
    fn buffers_schedule_back_to_back() {
        let mut scheduler = scheduler();
        scheduler.sink_mut().clock = 1.5;

        let first = scheduler.enqueue(vec![0.0; 24_000]).unwrap();
        let second = scheduler.enqueue(vec![0.0; 12_000]).unwrap();
        let third = scheduler.enqueue(vec![0.0; 6_000]).unwrap();

        // First start is pinned to the live clock, the rest queue gaplessly.
        assert!((first.start - 1.5).abs() < f64::EPSILON);
        assert!((second.start - (first.start + first.duration)).abs() < f64::EPSILON);
        assert!((third.start - (second.start + second.duration)).abs() < f64::EPSILON);
        assert_eq!(scheduler.active_count(), 3);
    }

    #[test]
    fn start_never_precedes_output_clock() {
        let mut scheduler = scheduler();
        let first = scheduler.enqueue(vec![0.0; 2_400]).unwrap();
        assert!(first.start >= 0.0);

        // Clock drifts past the cursor while nothing is queued.
        scheduler.sink_mut().clock = 10.0;
        let late = scheduler.enqueue(vec![0.0; 2_400]).unwrap();
        assert!((late.start - 10.0).abs() < f64::EPSILON);
    }

    #[test]
    fn interrupt_stops_all_and_resets_cursor() {
        let mut scheduler = scheduler();
        let a = scheduler.enqueue(vec![0.0; 24_000]).unwrap();
        let b = scheduler.enqueue(vec![0.0; 24_000]).unwrap();
        assert_eq!(scheduler.active_count(), 2);

        scheduler.interrupt();

        assert_eq!(scheduler.active_count(), 0);
        assert!(scheduler.next_start().abs() < f64::EPSILON);
        let stopped = &scheduler.sink_mut().stopped;
        assert_eq!(stopped.len(), 2);
        assert!(stopped.contains(&a.id));
        assert!(stopped.contains(&b.id));
    }

    #[test]
    fn next_buffer_after_interrupt_uses_live_clock() {
        let mut scheduler = scheduler();
        scheduler.enqueue(vec![0.0; 240_000]).unwrap();
        assert!(scheduler.next_start() > 9.0);

        scheduler.sink_mut().clock = 2.0;
        scheduler.interrupt();

        let next = scheduler.enqueue(vec![0.0; 2_400]).unwrap();
        assert!((next.start - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn ended_is_idempotent_after_interrupt() {
        let mut scheduler = scheduler();
        let a = scheduler.enqueue(vec![0.0; 2_400]).unwrap();
        scheduler.interrupt();

        // An in-flight ended signal for a source the interrupt already
        // removed must be a no-op.
        assert!(!scheduler.source_ended(a.id));
        assert_eq!(scheduler.active_count(), 0);
    }

    #[test]
    fn natural_completion_removes_from_active_set() {
        let mut scheduler = scheduler();
        let a = scheduler.enqueue(vec![0.0; 2_400]).unwrap();
        let b = scheduler.enqueue(vec![0.0; 2_400]).unwrap();

        assert!(scheduler.source_ended(a.id));
        assert_eq!(scheduler.active_count(), 1);
        assert!(scheduler.source_ended(b.id));
        assert_eq!(scheduler.active_count(), 0);

        // Cursor is untouched by natural completion.
        assert!(scheduler.next_start() > 0.0);
    }

    #[test]
    fn interrupt_with_nothing_queued_is_safe() {
        let mut scheduler = scheduler();
        scheduler.interrupt();
        assert_eq!(scheduler.active_count(), 0);
        assert!(scheduler.next_start().abs() < f64::EPSILON);
    }
}
