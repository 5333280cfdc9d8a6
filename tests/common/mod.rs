// Test doubles shared by the integration tests: scripted transports,
// capture devices and sinks

#![allow(dead_code)]

use anyhow::Result;
use audio_relay::capture::{CaptureConstraints, CaptureDevice, CaptureError, CaptureEvent, CaptureStream};
use audio_relay::client::{LinkEnd, OutboundFrame, StatusSnapshot, Transport, TransportEvent, TransportLink};
use audio_relay::relay::{SessionId, Sink, SinkFactory};
use audio_relay::RecordingClient;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};

pub const WAIT: Duration = Duration::from_secs(5);

// ============================================================================
// Transport
// ============================================================================

/// Transport whose connections either open immediately or are refused
#[derive(Default)]
pub struct MockTransport {
    refuse: AtomicBool,
    opens: AtomicUsize,
    ends: Mutex<Vec<LinkEnd>>,
}

impl MockTransport {
    pub fn accepting() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn refusing() -> Arc<Self> {
        let transport = Self::default();
        transport.refuse.store(true, Ordering::SeqCst);
        Arc::new(transport)
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Take the relay side of the most recent accepted connection
    pub fn take_end(&self) -> LinkEnd {
        self.ends
            .lock()
            .unwrap()
            .pop()
            .expect("no accepted connection")
    }
}

#[async_trait::async_trait]
impl Transport for MockTransport {
    async fn open(&self, _url: &str) -> Result<TransportLink> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let (link, end) = TransportLink::pair(64);

        if self.refuse.load(Ordering::SeqCst) {
            end.events
                .try_send(TransportEvent::Error("connection refused".to_string()))?;
            end.events.try_send(TransportEvent::Closed)?;
        } else {
            end.events.try_send(TransportEvent::Opened)?;
            self.ends.lock().unwrap().push(end);
        }

        Ok(link)
    }
}

pub async fn next_frame(end: &mut LinkEnd) -> OutboundFrame {
    tokio::time::timeout(WAIT, end.outbound.recv())
        .await
        .expect("timed out waiting for outbound frame")
        .expect("link closed")
}

// ============================================================================
// Capture
// ============================================================================

/// Handle on a capture stream handed out by `MockDevice`
#[derive(Default)]
pub struct MockStreamState {
    pub started: AtomicBool,
    pub stopped: AtomicBool,
    pub released: AtomicBool,
    events: Mutex<Option<mpsc::Sender<CaptureEvent>>>,
}

impl MockStreamState {
    pub async fn emit(&self, event: CaptureEvent) {
        let tx = self
            .events
            .lock()
            .unwrap()
            .clone()
            .expect("capture not started");
        tx.send(event).await.expect("client stopped listening");
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

struct MockStream {
    state: Arc<MockStreamState>,
}

impl CaptureStream for MockStream {
    fn start(&mut self, _timeslice: Duration) -> Result<mpsc::Receiver<CaptureEvent>, CaptureError> {
        let (tx, rx) = mpsc::channel(32);
        *self.state.events.lock().unwrap() = Some(tx);
        self.state.started.store(true, Ordering::SeqCst);
        Ok(rx)
    }

    fn stop(&mut self) {
        self.state.stopped.store(true, Ordering::SeqCst);
    }

    fn release(&mut self) {
        self.state.released.store(true, Ordering::SeqCst);
        self.state.events.lock().unwrap().take();
    }

    fn is_active(&self) -> bool {
        self.state.started.load(Ordering::SeqCst) && !self.state.released.load(Ordering::SeqCst)
    }
}

/// Capture device that records acquisitions and can be told to fail
#[derive(Default)]
pub struct MockDevice {
    acquires: AtomicUsize,
    fail_with: Mutex<Option<CaptureError>>,
    streams: Mutex<Vec<Arc<MockStreamState>>>,
    constraints: Mutex<Vec<CaptureConstraints>>,
}

impl MockDevice {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing(error: CaptureError) -> Arc<Self> {
        let device = Self::default();
        *device.fail_with.lock().unwrap() = Some(error);
        Arc::new(device)
    }

    pub fn acquires(&self) -> usize {
        self.acquires.load(Ordering::SeqCst)
    }

    pub fn last_stream(&self) -> Arc<MockStreamState> {
        Arc::clone(self.streams.lock().unwrap().last().expect("no stream acquired"))
    }

    pub fn last_constraints(&self) -> CaptureConstraints {
        self.constraints.lock().unwrap().last().cloned().expect("no acquisition")
    }
}

#[async_trait::async_trait]
impl CaptureDevice for MockDevice {
    async fn acquire(
        &self,
        constraints: &CaptureConstraints,
    ) -> Result<Box<dyn CaptureStream>, CaptureError> {
        self.acquires.fetch_add(1, Ordering::SeqCst);
        self.constraints.lock().unwrap().push(constraints.clone());

        if let Some(error) = self.fail_with.lock().unwrap().clone() {
            return Err(error);
        }

        let state = Arc::new(MockStreamState::default());
        self.streams.lock().unwrap().push(Arc::clone(&state));
        Ok(Box::new(MockStream { state }))
    }
}

pub async fn wait_for_status<F>(client: &RecordingClient, predicate: F) -> StatusSnapshot
where
    F: FnMut(&StatusSnapshot) -> bool,
{
    let mut status = client.subscribe();
    let snapshot = tokio::time::timeout(WAIT, status.wait_for(predicate))
        .await
        .expect("timed out waiting for status")
        .expect("client task stopped")
        .clone();
    snapshot
}

// ============================================================================
// Sinks
// ============================================================================

/// In-memory sinks; `disk_full` makes every append fail while set
///
/// Sinks opened while `gate_new_sinks` is set hold every append until
/// `open_gate` is called, like a disk that stopped keeping up.
pub struct MemorySinks {
    pub disk_full: Arc<AtomicBool>,
    pub refuse_open: AtomicBool,
    pub gate_new_sinks: AtomicBool,
    gate: Arc<Semaphore>,
    contents: Arc<Mutex<Vec<(SessionId, Arc<Mutex<Vec<u8>>>)>>>,
}

impl MemorySinks {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            disk_full: Arc::new(AtomicBool::new(false)),
            refuse_open: AtomicBool::new(false),
            gate_new_sinks: AtomicBool::new(false),
            gate: Arc::new(Semaphore::new(0)),
            contents: Arc::new(Mutex::new(Vec::new())),
        })
    }

    /// Let held appends through, and every later one
    pub fn open_gate(&self) {
        // Appends hand the permit back, so one is enough to stay open
        self.gate.add_permits(1);
    }

    pub fn content(&self, id: &SessionId) -> Vec<u8> {
        self.contents
            .lock()
            .unwrap()
            .iter()
            .find(|(existing, _)| existing == id)
            .map(|(_, data)| data.lock().unwrap().clone())
            .unwrap_or_default()
    }
}

struct MemorySink {
    data: Arc<Mutex<Vec<u8>>>,
    disk_full: Arc<AtomicBool>,
    gate: Option<Arc<Semaphore>>,
    closed: bool,
}

#[async_trait::async_trait]
impl Sink for MemorySink {
    async fn append(&mut self, bytes: &[u8]) -> io::Result<()> {
        if self.closed {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"));
        }
        if let Some(gate) = &self.gate {
            let _permit = gate
                .acquire()
                .await
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        }
        if self.disk_full.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::Other, "No space left on device"));
        }
        self.data.lock().unwrap().extend_from_slice(bytes);
        Ok(())
    }

    async fn close(&mut self) -> io::Result<()> {
        self.closed = true;
        Ok(())
    }
}

#[async_trait::async_trait]
impl SinkFactory for MemorySinks {
    fn location(&self, id: &SessionId) -> String {
        format!("memory://{}", id)
    }

    async fn open(&self, id: &SessionId) -> io::Result<Box<dyn Sink>> {
        if self.refuse_open.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only volume"));
        }
        let data = Arc::new(Mutex::new(Vec::new()));
        self.contents
            .lock()
            .unwrap()
            .push((id.clone(), Arc::clone(&data)));
        Ok(Box::new(MemorySink {
            data,
            disk_full: Arc::clone(&self.disk_full),
            gate: self
                .gate_new_sinks
                .load(Ordering::SeqCst)
                .then(|| Arc::clone(&self.gate)),
            closed: false,
        }))
    }
}
