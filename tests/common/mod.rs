//! Shared test doubles for session tests
//!
//! Everything here runs without audio hardware or a network: capture is a
//! hand-fed channel, the connector replays scripted server events, and the
//! sink records scheduling calls.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use tutor_voice::audio::{CaptureSource, OutputSink, SourceId};
use tutor_voice::live::{AudioFrame, LiveConnector, LiveSession, ServerEvent, SessionSetup};
use tutor_voice::{Error, Result};

/// Poll until `condition` holds or a short deadline passes
pub async fn wait_until<F: FnMut() -> bool>(mut condition: F) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

/// Capture source fed by the test instead of a microphone
pub struct MockCapture {
    rx: Option<mpsc::UnboundedReceiver<Vec<f32>>>,
    deny: bool,
    pub stopped: Arc<AtomicBool>,
}

impl MockCapture {
    /// Working capture; frames pushed on the returned sender flow through
    pub fn working() -> (Self, mpsc::UnboundedSender<Vec<f32>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                rx: Some(rx),
                deny: false,
                stopped: Arc::new(AtomicBool::new(false)),
            },
            tx,
        )
    }

    /// Capture whose start fails like a refused microphone permission
    pub fn denied() -> Self {
        Self {
            rx: None,
            deny: true,
            stopped: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl CaptureSource for MockCapture {
    fn start(&mut self) -> Result<mpsc::UnboundedReceiver<Vec<f32>>> {
        if self.deny {
            return Err(Error::MediaAccessDenied("permission refused".to_string()));
        }
        self.rx
            .take()
            .ok_or_else(|| Error::Session("capture already started".to_string()))
    }

    fn stop(&mut self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}

/// Connector that hands out a scripted event stream
pub struct MockConnector {
    events: Mutex<Option<mpsc::UnboundedReceiver<ServerEvent>>>,
    fail: bool,
    pub attempts: AtomicUsize,
    pub sent: Arc<Mutex<Vec<AudioFrame>>>,
    pub closed: Arc<AtomicBool>,
}

impl MockConnector {
    /// Connector that succeeds; events pushed on the returned sender are
    /// delivered to the session
    pub fn working() -> (Self, mpsc::UnboundedSender<ServerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                events: Mutex::new(Some(rx)),
                fail: false,
                attempts: AtomicUsize::new(0),
                sent: Arc::new(Mutex::new(Vec::new())),
                closed: Arc::new(AtomicBool::new(false)),
            },
            tx,
        )
    }

    /// Connector that refuses to open
    pub fn failing() -> Self {
        Self {
            events: Mutex::new(None),
            fail: true,
            attempts: AtomicUsize::new(0),
            sent: Arc::new(Mutex::new(Vec::new())),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn connect_attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn sent_frames(&self) -> Vec<AudioFrame> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl LiveConnector for MockConnector {
    async fn connect(
        &self,
        _setup: SessionSetup,
    ) -> Result<(Box<dyn LiveSession>, mpsc::UnboundedReceiver<ServerEvent>)> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(Error::Connection("refused".to_string()));
        }

        let events = self
            .events
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| Error::Session("connector reused".to_string()))?;

        Ok((
            Box::new(MockLive {
                sent: Arc::clone(&self.sent),
                closed: Arc::clone(&self.closed),
            }),
            events,
        ))
    }
}

struct MockLive {
    sent: Arc<Mutex<Vec<AudioFrame>>>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl LiveSession for MockLive {
    async fn send_audio(&self, frame: AudioFrame) -> Result<()> {
        self.sent.lock().unwrap().push(frame);
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Snapshot of sink activity
#[derive(Default)]
pub struct SinkState {
    pub clock: f64,
    pub started: Vec<(SourceId, usize, f64)>,
    pub stopped: Vec<SourceId>,
    pub live: HashSet<SourceId>,
}

/// Sink that records every call for later assertions
#[derive(Clone, Default)]
pub struct RecordingSink {
    pub state: Arc<Mutex<SinkState>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn started(&self) -> Vec<(SourceId, usize, f64)> {
        self.state.lock().unwrap().started.clone()
    }

    pub fn stopped(&self) -> Vec<SourceId> {
        self.state.lock().unwrap().stopped.clone()
    }

    pub fn live_count(&self) -> usize {
        self.state.lock().unwrap().live.len()
    }
}

impl OutputSink for RecordingSink {
    fn now(&self) -> f64 {
        self.state.lock().unwrap().clock
    }

    fn start(&mut self, id: SourceId, samples: Vec<f32>, at: f64) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.started.push((id, samples.len(), at));
        state.live.insert(id);
        Ok(())
    }

    fn stop(&mut self, id: SourceId) {
        let mut state = self.state.lock().unwrap();
        state.stopped.push(id);
        state.live.remove(&id);
    }
}
