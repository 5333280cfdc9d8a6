use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Sleep;
use tracing::{debug, info, warn};

use super::error::ClientError;
use super::machine::{ClientMachine, Effect};
use super::observers::{StatusObservers, SubscriptionId};
use super::reconnect::ReconnectPolicy;
use super::status::{ConnectionStatus, RecordingStatus, StatusSnapshot};
use super::transport::{OutboundFrame, SendOutcome, Transport, TransportEvent, TransportLink};
use crate::capture::{CaptureConstraints, CaptureDevice, CaptureError, CaptureEvent, CaptureStream};
use crate::config::ClientConfig;

const COMMAND_BUFFER: usize = 16;

/// Settings for a `RecordingClient`
#[derive(Debug, Clone, Default)]
pub struct ClientOptions {
    pub reconnect: ReconnectPolicy,
    pub constraints: CaptureConstraints,
}

impl From<&ClientConfig> for ClientOptions {
    fn from(config: &ClientConfig) -> Self {
        Self {
            reconnect: config.reconnect_policy(),
            constraints: CaptureConstraints {
                mime_type: config.mime_type.clone(),
                audio_bits_per_second: config.audio_bits_per_second,
                timeslice: config.chunk_interval(),
                ..Default::default()
            },
        }
    }
}

enum Command {
    Connect {
        url: String,
        reply: oneshot::Sender<()>,
    },
    Disconnect {
        reply: oneshot::Sender<()>,
    },
    StartRecording {
        reply: oneshot::Sender<Result<(), ClientError>>,
    },
    StopRecording {
        reply: oneshot::Sender<()>,
    },
}

/// Client side of one recording session
///
/// Explicitly constructed and owned. All transport, capture and timer
/// events are serialized through a single task that owns the state
/// machine; this handle only sends commands and reads status.
pub struct RecordingClient {
    commands: mpsc::Sender<Command>,
    status: watch::Receiver<StatusSnapshot>,
    observers: Arc<StatusObservers>,
    task: JoinHandle<()>,
}

impl RecordingClient {
    /// Spawn the client task; must be called within a tokio runtime
    pub fn spawn(
        transport: Arc<dyn Transport>,
        device: Arc<dyn CaptureDevice>,
        options: ClientOptions,
    ) -> Self {
        let machine = ClientMachine::new(options.reconnect, options.constraints);
        let (status_tx, status_rx) = watch::channel(machine.snapshot());
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_BUFFER);
        let observers = Arc::new(StatusObservers::new());

        let driver = Driver {
            machine,
            transport,
            device,
            link: None,
            capture: None,
            capture_events: None,
            reconnect: None,
            capture_error: None,
            status_tx,
            observers: Arc::clone(&observers),
        };

        Self {
            commands: commands_tx,
            status: status_rx,
            observers,
            task: tokio::spawn(driver.run(commands_rx)),
        }
    }

    /// Begin connecting to `url`; no-op if already connected
    ///
    /// Returns once the attempt is under way. Watch `status()` or a listener
    /// for the outcome.
    pub async fn connect(&self, url: &str) -> Result<(), ClientError> {
        let (reply, done) = oneshot::channel();
        self.request(Command::Connect {
            url: url.to_string(),
            reply,
        })
        .await?;
        done.await.map_err(|_| ClientError::Shutdown)
    }

    /// Stop recording (best effort) and close the connection
    pub async fn disconnect(&self) -> Result<(), ClientError> {
        let (reply, done) = oneshot::channel();
        self.request(Command::Disconnect { reply }).await?;
        done.await.map_err(|_| ClientError::Shutdown)
    }

    /// Acquire the capture source and start streaming chunks
    ///
    /// Fails with `NotConnected` unless connected, or with the categorized
    /// capture error if the source could not be acquired or started.
    pub async fn start_recording(&self) -> Result<(), ClientError> {
        let (reply, done) = oneshot::channel();
        self.request(Command::StartRecording { reply }).await?;
        done.await.map_err(|_| ClientError::Shutdown)?
    }

    /// Send `stop`, stop and release the capture source; no-op if not recording
    pub async fn stop_recording(&self) -> Result<(), ClientError> {
        let (reply, done) = oneshot::channel();
        self.request(Command::StopRecording { reply }).await?;
        done.await.map_err(|_| ClientError::Shutdown)
    }

    pub fn status(&self) -> StatusSnapshot {
        self.status.borrow().clone()
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        self.status.borrow().connection
    }

    pub fn recording_status(&self) -> RecordingStatus {
        self.status.borrow().recording
    }

    /// Register a listener fired after every status mutation
    pub fn on_status_change<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&StatusSnapshot) + Send + Sync + 'static,
    {
        self.observers.subscribe(callback)
    }

    pub fn remove_status_listener(&self, id: SubscriptionId) -> bool {
        self.observers.unsubscribe(id)
    }

    /// Watch channel carrying the latest status
    pub fn subscribe(&self) -> watch::Receiver<StatusSnapshot> {
        self.status.clone()
    }

    /// Disconnect and wait for the client task to finish
    pub async fn shutdown(self) {
        let RecordingClient { commands, task, .. } = self;
        drop(commands);
        if let Err(e) = task.await {
            warn!("Recording client task ended abnormally: {}", e);
        }
    }

    async fn request(&self, command: Command) -> Result<(), ClientError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| ClientError::Shutdown)
    }
}

/// Owns the state machine and every resource its effects touch
struct Driver {
    machine: ClientMachine,
    transport: Arc<dyn Transport>,
    device: Arc<dyn CaptureDevice>,
    link: Option<TransportLink>,
    capture: Option<Box<dyn CaptureStream>>,
    capture_events: Option<mpsc::Receiver<CaptureEvent>>,
    reconnect: Option<Pin<Box<Sleep>>>,
    /// Failure of the capture step of the in-flight `start_recording`
    capture_error: Option<CaptureError>,
    status_tx: watch::Sender<StatusSnapshot>,
    observers: Arc<StatusObservers>,
}

impl Driver {
    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        debug!("Recording client task started");

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
                event = next_transport_event(&mut self.link) => {
                    self.handle_transport_event(event).await;
                }
                event = next_capture_event(&mut self.capture_events) => {
                    self.handle_capture_event(event).await;
                }
                () = reconnect_elapsed(&mut self.reconnect) => {
                    self.reconnect = None;
                    let effects = self.machine.reconnect_due();
                    self.apply(effects).await;
                }
            }
        }

        // Every handle dropped: release whatever is still held
        let effects = self.machine.disconnect();
        self.apply(effects).await;
        debug!("Recording client task stopped");
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect { url, reply } => {
                let effects = self.machine.connect(url);
                self.apply(effects).await;
                let _ = reply.send(());
            }
            Command::Disconnect { reply } => {
                let effects = self.machine.disconnect();
                self.apply(effects).await;
                let _ = reply.send(());
            }
            Command::StartRecording { reply } => {
                let result = match self.machine.begin_recording() {
                    Ok(effects) => {
                        self.capture_error = None;
                        self.apply(effects).await;
                        match self.capture_error.take() {
                            Some(e) => Err(ClientError::Capture(e)),
                            None => Ok(()),
                        }
                    }
                    Err(e) => Err(e),
                };
                let _ = reply.send(result);
            }
            Command::StopRecording { reply } => {
                let effects = self.machine.stop_recording();
                self.apply(effects).await;
                let _ = reply.send(());
            }
        }
    }

    async fn handle_transport_event(&mut self, event: TransportEvent) {
        let effects = match event {
            TransportEvent::Opened => self.machine.transport_opened(),
            TransportEvent::Text(text) => self.machine.transport_message(&text),
            TransportEvent::Error(reason) => self.machine.transport_error(&reason),
            TransportEvent::Closed => {
                self.link = None;
                self.machine.transport_closed()
            }
        };
        self.apply(effects).await;
    }

    async fn handle_capture_event(&mut self, event: CaptureEvent) {
        let effects = match event {
            CaptureEvent::Chunk(chunk) => self.machine.capture_chunk(chunk),
            CaptureEvent::Stopped => {
                self.capture_events = None;
                self.machine.capture_stopped()
            }
            CaptureEvent::Error(reason) => {
                self.capture_events = None;
                self.machine.capture_error(&reason)
            }
        };
        self.apply(effects).await;
    }

    /// Execute effects in order; effects produced while executing are queued behind
    async fn apply(&mut self, effects: Vec<Effect>) {
        let mut queue: VecDeque<Effect> = effects.into();

        while let Some(effect) = queue.pop_front() {
            match effect {
                Effect::OpenTransport(url) => {
                    self.link = None;
                    match self.transport.open(&url).await {
                        Ok(link) => self.link = Some(link),
                        Err(e) => {
                            queue.extend(self.machine.transport_error(&e.to_string()));
                            queue.extend(self.machine.transport_closed());
                        }
                    }
                }
                Effect::CloseTransport => {
                    if let Some(link) = self.link.take() {
                        link.close();
                    }
                }
                Effect::SendControl(message) => {
                    self.send(OutboundFrame::Text(message.to_json()));
                }
                Effect::SendAudio(chunk) => {
                    self.send(OutboundFrame::Binary(chunk));
                }
                Effect::ScheduleReconnect { attempt, delay } => {
                    debug!("Reconnect attempt {} scheduled in {:?}", attempt, delay);
                    self.reconnect = Some(Box::pin(tokio::time::sleep(delay)));
                }
                Effect::CancelReconnect => {
                    self.reconnect = None;
                }
                Effect::AcquireCapture(constraints) => {
                    match self.device.acquire(&constraints).await {
                        Ok(stream) => {
                            self.capture = Some(stream);
                            queue.extend(self.machine.capture_acquired());
                        }
                        Err(e) => {
                            queue.extend(self.machine.capture_failed(&e));
                            self.capture_error = Some(e);
                        }
                    }
                }
                Effect::StartCapture(timeslice) => {
                    let started = match self.capture.as_mut() {
                        Some(stream) => stream.start(timeslice),
                        None => Err(CaptureError::Other("capture source not acquired".to_string())),
                    };
                    match started {
                        Ok(events) => {
                            self.capture_events = Some(events);
                            queue.extend(self.machine.capture_started());
                        }
                        Err(e) => {
                            queue.extend(self.machine.capture_failed(&e));
                            self.capture_error = Some(e);
                        }
                    }
                }
                Effect::StopCapture => {
                    if let Some(stream) = self.capture.as_mut() {
                        stream.stop();
                    }
                }
                Effect::ReleaseCapture => {
                    self.capture_events = None;
                    if let Some(mut stream) = self.capture.take() {
                        stream.release();
                        info!("Capture source released");
                    }
                }
                Effect::Notify(snapshot) => {
                    self.status_tx.send_replace(snapshot.clone());
                    self.observers.notify(&snapshot);
                }
            }
        }
    }

    /// Hand a frame to the transport; never waits, so a stalled relay
    /// cannot freeze the command loop
    fn send(&self, frame: OutboundFrame) {
        let Some(link) = &self.link else {
            debug!("No transport; frame dropped");
            return;
        };
        let kind = match &frame {
            OutboundFrame::Text(_) => "control",
            OutboundFrame::Binary(_) => "audio",
        };
        match link.send(frame) {
            SendOutcome::Queued => {}
            SendOutcome::Full => warn!("Transport backlog full; {} frame dropped", kind),
            SendOutcome::Closed => debug!("Transport gone; {} frame dropped", kind),
        }
    }
}

async fn next_transport_event(link: &mut Option<TransportLink>) -> TransportEvent {
    match link {
        Some(link) => link.next_event().await,
        None => std::future::pending().await,
    }
}

async fn next_capture_event(events: &mut Option<mpsc::Receiver<CaptureEvent>>) -> CaptureEvent {
    match events {
        Some(events) => events.recv().await.unwrap_or(CaptureEvent::Stopped),
        None => std::future::pending().await,
    }
}

async fn reconnect_elapsed(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer {
        Some(timer) => timer.as_mut().await,
        None => std::future::pending().await,
    }
}
