//! Realtime voice session manager
//!
//! Owns one duplex audio session: microphone frames go out to the live
//! endpoint while transcript fragments and spoken-reply audio come back. A
//! single driver task selects over the capture, server-event, and
//! playback-ended channels, so the three event sources interleave on one
//! execution context and never race each other.

use std::sync::Arc;

use tokio::sync::{Notify, mpsc, watch};
use tokio::task::JoinHandle;

use crate::audio::{CaptureSource, OutputSink, PlaybackScheduler, SourceId, pcm};
use crate::config::SessionConfig;
use crate::live::{AudioFrame, LiveConnector, LiveSession, ServerEvent, SessionSetup};
use crate::{Error, Result};

/// Lifecycle state of a voice session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// No session running
    Idle,
    /// Connection handshake in progress
    Connecting,
    /// Session open, microphone live
    Listening,
    /// Session ended (locally or by the remote end)
    Closed,
}

/// Resources held while a session is active
struct Running {
    capture: Box<dyn CaptureSource>,
    live: Arc<dyn LiveSession>,
    shutdown: Arc<Notify>,
    driver: JoinHandle<()>,
}

/// Manages the lifecycle of one duplex voice session
///
/// Create one per conversation; a session that has closed is not restarted,
/// a fresh `start` is required.
pub struct VoiceSession {
    status_tx: watch::Sender<SessionStatus>,
    transcript_tx: watch::Sender<String>,
    running: Option<Running>,
}

impl Default for VoiceSession {
    fn default() -> Self {
        Self::new()
    }
}

impl VoiceSession {
    /// Create an idle session manager
    #[must_use]
    pub fn new() -> Self {
        let (status_tx, _) = watch::channel(SessionStatus::Idle);
        let (transcript_tx, _) = watch::channel(String::new());
        Self {
            status_tx,
            transcript_tx,
            running: None,
        }
    }

    /// Observe the session status
    #[must_use]
    pub fn status(&self) -> watch::Receiver<SessionStatus> {
        self.status_tx.subscribe()
    }

    /// Observe the accumulated transcript of spoken replies
    #[must_use]
    pub fn transcript(&self) -> watch::Receiver<String> {
        self.transcript_tx.subscribe()
    }

    /// Current status snapshot
    #[must_use]
    pub fn current_status(&self) -> SessionStatus {
        *self.status_tx.borrow()
    }

    /// Start a session: open the microphone, connect, and begin streaming
    ///
    /// Resolves once the remote end has acknowledged the setup and the
    /// session is listening. Playback completion signals for `sink` must be
    /// delivered on `ended_rx` (see [`crate::audio::CpalSink::new`]).
    ///
    /// # Errors
    ///
    /// Returns [`Error::MediaAccessDenied`] if the microphone cannot be
    /// opened (no connection is attempted in that case),
    /// [`Error::Connection`] if the live endpoint cannot be reached, and
    /// [`Error::Session`] if a session is already active. Every failure
    /// path releases whatever was acquired and leaves the status at `Idle`.
    pub async fn start<S>(
        &mut self,
        config: &SessionConfig,
        connector: &dyn LiveConnector,
        mut capture: Box<dyn CaptureSource>,
        sink: S,
        ended_rx: mpsc::UnboundedReceiver<SourceId>,
    ) -> Result<()>
    where
        S: OutputSink + 'static,
    {
        if self.running.is_some() {
            return Err(Error::Session("session already active".to_string()));
        }

        self.transcript_tx.send_replace(String::new());
        self.status_tx.send_replace(SessionStatus::Connecting);

        // Microphone first: a denied microphone must not open a connection.
        let frames = match capture.start() {
            Ok(frames) => frames,
            Err(e) => {
                self.status_tx.send_replace(SessionStatus::Idle);
                return Err(e);
            }
        };

        let setup = SessionSetup {
            model: config.model.clone(),
            system_instruction: config.system_instruction(),
            voice: config.voice.clone(),
        };

        let (live, events) = match connector.connect(setup).await {
            Ok(opened) => opened,
            Err(e) => {
                capture.stop();
                self.status_tx.send_replace(SessionStatus::Idle);
                return Err(e);
            }
        };
        let live: Arc<dyn LiveSession> = Arc::from(live);

        // Listening before the driver runs, so a remote close processed by
        // the driver is never overwritten.
        self.status_tx.send_replace(SessionStatus::Listening);

        let shutdown = Arc::new(Notify::new());
        let driver = tokio::spawn(drive(
            DriverChannels {
                frames,
                events,
                ended_rx,
                shutdown: Arc::clone(&shutdown),
            },
            Arc::clone(&live),
            PlaybackScheduler::new(sink, config.audio.playback_sample_rate),
            config.audio.capture_sample_rate,
            self.status_tx.clone(),
            self.transcript_tx.clone(),
        ));

        self.running = Some(Running {
            capture,
            live,
            shutdown,
            driver,
        });

        tracing::info!(
            subject = %config.subject,
            grade = %config.grade,
            "voice session listening"
        );
        Ok(())
    }

    /// Tear the session down; idempotent and safe in every state
    pub async fn stop(&mut self) {
        let Some(mut running) = self.running.take() else {
            return;
        };

        running.capture.stop();
        running.shutdown.notify_one();
        running.live.close().await;
        let _ = running.driver.await;

        self.status_tx.send_replace(SessionStatus::Closed);
        tracing::info!("voice session stopped");
    }
}

struct DriverChannels {
    frames: mpsc::UnboundedReceiver<Vec<f32>>,
    events: mpsc::UnboundedReceiver<ServerEvent>,
    ended_rx: mpsc::UnboundedReceiver<SourceId>,
    shutdown: Arc<Notify>,
}

/// Single consumer loop over the session's three event sources
async fn drive<S: OutputSink>(
    mut channels: DriverChannels,
    live: Arc<dyn LiveSession>,
    mut scheduler: PlaybackScheduler<S>,
    capture_sample_rate: u32,
    status_tx: watch::Sender<SessionStatus>,
    transcript_tx: watch::Sender<String>,
) {
    let mut frames_open = true;
    let mut ended_open = true;

    loop {
        tokio::select! {
            () = channels.shutdown.notified() => break,

            frame = channels.frames.recv(), if frames_open => {
                match frame {
                    Some(samples) => {
                        // send_audio is a non-blocking channel push, so
                        // awaiting it inline keeps outbound frames in
                        // capture order without stalling the cadence.
                        let frame = AudioFrame::from_samples(&samples, capture_sample_rate);
                        if let Err(e) = live.send_audio(frame).await {
                            tracing::warn!(error = %e, "dropping capture frame");
                        }
                    }
                    None => frames_open = false,
                }
            }

            event = channels.events.recv() => {
                match event {
                    Some(ServerEvent::TranscriptFragment(text)) => {
                        transcript_tx.send_modify(|t| t.push_str(&text));
                    }
                    Some(ServerEvent::AudioChunk(data)) => {
                        match pcm::decode_frame(&data) {
                            Ok(samples) => {
                                if let Err(e) = scheduler.enqueue(samples) {
                                    tracing::warn!(error = %e, "failed to schedule audio chunk");
                                }
                            }
                            // A malformed chunk is dropped; the session
                            // keeps running.
                            Err(e) => tracing::warn!(error = %e, "dropping malformed audio chunk"),
                        }
                    }
                    Some(ServerEvent::Interrupted) => scheduler.interrupt(),
                    Some(ServerEvent::Closed) | None => {
                        status_tx.send_replace(SessionStatus::Closed);
                        break;
                    }
                }
            }

            ended = channels.ended_rx.recv(), if ended_open => {
                match ended {
                    Some(id) => { scheduler.source_ended(id); }
                    None => ended_open = false,
                }
            }
        }
    }

    // Nothing queued may keep playing past the session.
    scheduler.interrupt();
    tracing::debug!("session driver finished");
}
