use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::error::ClientError;
use super::reconnect::ReconnectPolicy;
use super::status::{ConnectionStatus, RecordingStatus, StatusSnapshot};
use crate::capture::{CaptureConstraints, CaptureError};
use crate::protocol::{ClientMessage, ServerMessage};

/// Side effect requested by the state machine, executed by the driver in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    OpenTransport(String),
    CloseTransport,
    SendControl(ClientMessage),
    SendAudio(Vec<u8>),
    ScheduleReconnect { attempt: u32, delay: Duration },
    CancelReconnect,
    AcquireCapture(CaptureConstraints),
    StartCapture(Duration),
    StopCapture,
    ReleaseCapture,
    Notify(StatusSnapshot),
}

/// Recording client state machine
///
/// Inputs are user commands, transport events, capture events and timer
/// expiry; outputs are `Effect`s. Holds no IO, so every transition can be
/// exercised without a network or a microphone.
#[derive(Debug, Clone)]
pub struct ClientMachine {
    connection: ConnectionStatus,
    recording: RecordingStatus,
    session_id: Option<String>,
    url: Option<String>,
    reconnect_attempts: u32,
    reconnect_pending: bool,
    capture_held: bool,
    policy: ReconnectPolicy,
    constraints: CaptureConstraints,
}

impl ClientMachine {
    pub fn new(policy: ReconnectPolicy, constraints: CaptureConstraints) -> Self {
        Self {
            connection: ConnectionStatus::Disconnected,
            recording: RecordingStatus::Inactive,
            session_id: None,
            url: None,
            reconnect_attempts: 0,
            reconnect_pending: false,
            capture_held: false,
            policy,
            constraints,
        }
    }

    pub fn connection(&self) -> ConnectionStatus {
        self.connection
    }

    pub fn recording(&self) -> RecordingStatus {
        self.recording
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            connection: self.connection,
            recording: self.recording,
            session_id: self.session_id.clone(),
        }
    }

    // ---- user commands ------------------------------------------------

    pub fn connect(&mut self, url: impl Into<String>) -> Vec<Effect> {
        if matches!(
            self.connection,
            ConnectionStatus::Connected | ConnectionStatus::Connecting
        ) {
            info!("Already connected to relay ({})", self.connection);
            return Vec::new();
        }

        let url = url.into();
        self.url = Some(url.clone());

        let mut effects = Vec::new();
        if self.reconnect_pending {
            self.reconnect_pending = false;
            effects.push(Effect::CancelReconnect);
        }
        self.set_connection(ConnectionStatus::Connecting, &mut effects);
        effects.push(Effect::OpenTransport(url));
        effects
    }

    /// Stop recording if needed, close the transport, and stay disconnected
    pub fn disconnect(&mut self) -> Vec<Effect> {
        let mut effects = self.stop_recording();

        self.url = None;
        self.reconnect_attempts = 0;
        self.reconnect_pending = false;
        self.session_id = None;

        effects.push(Effect::CancelReconnect);
        effects.push(Effect::CloseTransport);
        self.set_connection(ConnectionStatus::Disconnected, &mut effects);
        effects
    }

    /// First half of `start_recording`: checks, then asks for a capture source
    pub fn begin_recording(&mut self) -> Result<Vec<Effect>, ClientError> {
        if self.connection != ConnectionStatus::Connected {
            return Err(ClientError::NotConnected);
        }
        if self.recording == RecordingStatus::Recording {
            info!("Already recording");
            return Ok(Vec::new());
        }
        Ok(vec![Effect::AcquireCapture(self.constraints.clone())])
    }

    pub fn stop_recording(&mut self) -> Vec<Effect> {
        if self.recording != RecordingStatus::Recording {
            debug!("Not currently recording");
            return Vec::new();
        }

        let mut effects = Vec::new();
        if self.connection == ConnectionStatus::Connected {
            effects.push(Effect::SendControl(ClientMessage::Stop));
        }
        self.teardown_capture(RecordingStatus::Inactive, &mut effects);
        info!("Recording stopped");
        effects
    }

    // ---- transport events ---------------------------------------------

    pub fn transport_opened(&mut self) -> Vec<Effect> {
        let mut effects = Vec::new();
        self.reconnect_attempts = 0;
        self.set_connection(ConnectionStatus::Connected, &mut effects);
        info!("Connected to relay");
        effects
    }

    pub fn transport_message(&mut self, payload: &str) -> Vec<Effect> {
        let message = match serde_json::from_str::<ServerMessage>(payload) {
            Ok(message) => message,
            Err(e) => {
                warn!("Error processing relay message: {}", e);
                return Vec::new();
            }
        };

        match message {
            ServerMessage::Connection { user_id, .. } => {
                info!("Connection established with session id: {}", user_id);
                self.session_id = Some(user_id);
                vec![Effect::Notify(self.snapshot())]
            }
            ServerMessage::Start { .. } => {
                info!("Relay acknowledged recording start");
                Vec::new()
            }
            ServerMessage::Stop { .. } => {
                info!("Relay acknowledged recording stop");
                Vec::new()
            }
            ServerMessage::AudioChunk { timestamp, .. } => {
                debug!("Relay acknowledged audio chunk at {}", timestamp);
                Vec::new()
            }
            ServerMessage::Error { message } => {
                error!("Relay error: {}", message);
                Vec::new()
            }
        }
    }

    pub fn transport_error(&mut self, reason: &str) -> Vec<Effect> {
        warn!("Transport error: {}", reason);
        let mut effects = Vec::new();
        self.set_connection(ConnectionStatus::Error, &mut effects);
        if self.recording == RecordingStatus::Recording {
            self.teardown_capture(RecordingStatus::Error, &mut effects);
        }
        effects
    }

    pub fn transport_closed(&mut self) -> Vec<Effect> {
        info!("Relay connection closed");
        let mut effects = Vec::new();
        self.session_id = None;
        self.set_connection(ConnectionStatus::Disconnected, &mut effects);
        if self.recording == RecordingStatus::Recording {
            self.teardown_capture(RecordingStatus::Inactive, &mut effects);
        }

        if self.url.is_none() {
            return effects;
        }

        if self.reconnect_attempts < self.policy.max_attempts {
            self.reconnect_attempts += 1;
            self.reconnect_pending = true;
            let attempt = self.reconnect_attempts;
            let delay = self.policy.delay_for(attempt);
            info!(
                "Attempting to reconnect ({}/{}) in {:?}",
                attempt, self.policy.max_attempts, delay
            );
            effects.push(Effect::ScheduleReconnect { attempt, delay });
        } else {
            warn!(
                "Giving up after {} reconnect attempts",
                self.reconnect_attempts
            );
        }
        effects
    }

    pub fn reconnect_due(&mut self) -> Vec<Effect> {
        if !self.reconnect_pending {
            return Vec::new();
        }
        self.reconnect_pending = false;
        match self.url.clone() {
            Some(url) => self.connect(url),
            None => Vec::new(),
        }
    }

    // ---- capture events -----------------------------------------------

    pub fn capture_acquired(&mut self) -> Vec<Effect> {
        self.capture_held = true;
        let mut effects = Vec::new();
        if self.connection == ConnectionStatus::Connected {
            effects.push(Effect::SendControl(ClientMessage::Start));
        }
        effects.push(Effect::StartCapture(self.constraints.timeslice));
        effects
    }

    pub fn capture_started(&mut self) -> Vec<Effect> {
        let mut effects = Vec::new();
        self.set_recording(RecordingStatus::Recording, &mut effects);
        info!("Recording started");
        effects
    }

    pub fn capture_failed(&mut self, error: &CaptureError) -> Vec<Effect> {
        error!("Failed to start recording: {}", error);
        let mut effects = Vec::new();
        self.teardown_capture(RecordingStatus::Error, &mut effects);
        effects
    }

    pub fn capture_chunk(&mut self, chunk: Vec<u8>) -> Vec<Effect> {
        if chunk.is_empty() {
            return Vec::new();
        }
        if self.connection != ConnectionStatus::Connected {
            debug!("Dropping {} byte chunk: not connected", chunk.len());
            return Vec::new();
        }
        debug!("Sending audio chunk: {} bytes", chunk.len());
        vec![Effect::SendAudio(chunk)]
    }

    pub fn capture_stopped(&mut self) -> Vec<Effect> {
        let mut effects = Vec::new();
        if self.capture_held {
            self.capture_held = false;
            effects.push(Effect::ReleaseCapture);
        }
        if self.recording == RecordingStatus::Recording {
            self.set_recording(RecordingStatus::Inactive, &mut effects);
        }
        effects
    }

    pub fn capture_error(&mut self, reason: &str) -> Vec<Effect> {
        error!("Capture error: {}", reason);
        let mut effects = Vec::new();
        self.teardown_capture(RecordingStatus::Error, &mut effects);
        effects
    }

    // ---- helpers --------------------------------------------------------

    fn teardown_capture(&mut self, next: RecordingStatus, effects: &mut Vec<Effect>) {
        if self.capture_held {
            self.capture_held = false;
            effects.push(Effect::StopCapture);
            effects.push(Effect::ReleaseCapture);
        }
        self.set_recording(next, effects);
    }

    fn set_connection(&mut self, status: ConnectionStatus, effects: &mut Vec<Effect>) {
        self.connection = status;
        effects.push(Effect::Notify(self.snapshot()));
    }

    fn set_recording(&mut self, status: RecordingStatus, effects: &mut Vec<Effect>) {
        self.recording = status;
        effects.push(Effect::Notify(self.snapshot()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL: &str = "ws://localhost:3001";

    fn machine() -> ClientMachine {
        ClientMachine::new(ReconnectPolicy::default(), CaptureConstraints::default())
    }

    fn connected() -> ClientMachine {
        let mut m = machine();
        m.connect(URL);
        m.transport_opened();
        m
    }

    fn recording() -> ClientMachine {
        let mut m = connected();
        m.begin_recording().unwrap();
        m.capture_acquired();
        m.capture_started();
        m
    }

    fn notified(effects: &[Effect]) -> Vec<StatusSnapshot> {
        effects
            .iter()
            .filter_map(|e| match e {
                Effect::Notify(s) => Some(s.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_connect_sets_connecting_then_opens() {
        let mut m = machine();
        let effects = m.connect(URL);
        assert_eq!(m.connection(), ConnectionStatus::Connecting);
        assert_eq!(effects.last(), Some(&Effect::OpenTransport(URL.to_string())));
        assert_eq!(notified(&effects)[0].connection, ConnectionStatus::Connecting);
    }

    #[test]
    fn test_connect_when_connected_is_noop() {
        let mut m = connected();
        assert!(m.connect(URL).is_empty());
        assert_eq!(m.connection(), ConnectionStatus::Connected);
    }

    #[test]
    fn test_start_recording_requires_connection() {
        let mut m = machine();
        assert!(matches!(m.begin_recording(), Err(ClientError::NotConnected)));
        assert_eq!(m.recording(), RecordingStatus::Inactive);
    }

    #[test]
    fn test_start_recording_sends_start_before_capture() {
        let mut m = connected();
        let effects = m.begin_recording().unwrap();
        assert_eq!(
            effects,
            vec![Effect::AcquireCapture(CaptureConstraints::default())]
        );

        let effects = m.capture_acquired();
        assert_eq!(
            effects,
            vec![
                Effect::SendControl(ClientMessage::Start),
                Effect::StartCapture(Duration::from_millis(500)),
            ]
        );
        // Not recording until the capture actually began
        assert_eq!(m.recording(), RecordingStatus::Inactive);

        m.capture_started();
        assert_eq!(m.recording(), RecordingStatus::Recording);
    }

    #[test]
    fn test_start_recording_twice_is_noop() {
        let mut m = recording();
        assert_eq!(m.begin_recording().unwrap(), Vec::new());
    }

    #[test]
    fn test_capture_failure_sets_error_without_touching_connection() {
        let mut m = connected();
        m.begin_recording().unwrap();
        m.capture_failed(&CaptureError::PermissionDenied);
        assert_eq!(m.recording(), RecordingStatus::Error);
        assert_eq!(m.connection(), ConnectionStatus::Connected);

        // error → recording is allowed again
        assert!(m.begin_recording().is_ok());
    }

    #[test]
    fn test_stop_recording_sends_stop_and_releases() {
        let mut m = recording();
        let effects = m.stop_recording();
        assert_eq!(effects[0], Effect::SendControl(ClientMessage::Stop));
        assert!(effects.contains(&Effect::StopCapture));
        assert!(effects.contains(&Effect::ReleaseCapture));
        assert_eq!(m.recording(), RecordingStatus::Inactive);
        assert!(m.stop_recording().is_empty());
    }

    #[test]
    fn test_chunks_forwarded_only_when_connected_and_non_empty() {
        let mut m = recording();
        assert!(m.capture_chunk(Vec::new()).is_empty());
        assert_eq!(m.capture_chunk(vec![1, 2]), vec![Effect::SendAudio(vec![1, 2])]);

        m.transport_closed();
        assert!(m.capture_chunk(vec![3]).is_empty());
    }

    #[test]
    fn test_transport_close_while_recording_releases_capture() {
        let mut m = recording();
        let effects = m.transport_closed();
        assert!(effects.contains(&Effect::StopCapture));
        assert!(effects.contains(&Effect::ReleaseCapture));
        assert_eq!(m.recording(), RecordingStatus::Inactive);
        assert_eq!(m.connection(), ConnectionStatus::Disconnected);
    }

    #[test]
    fn test_transport_error_while_recording_sets_recording_error() {
        let mut m = recording();
        let effects = m.transport_error("reset by peer");
        assert!(effects.contains(&Effect::ReleaseCapture));
        assert_eq!(m.recording(), RecordingStatus::Error);
        assert_eq!(m.connection(), ConnectionStatus::Error);

        // The close that follows must not release twice
        let effects = m.transport_closed();
        assert!(!effects.contains(&Effect::ReleaseCapture));
        assert_eq!(m.recording(), RecordingStatus::Error);
    }

    #[test]
    fn test_reconnect_stops_after_max_attempts() {
        let mut m = machine();
        m.connect(URL);

        let mut scheduled = Vec::new();
        loop {
            m.transport_error("refused");
            let effects = m.transport_closed();
            match effects
                .iter()
                .find(|e| matches!(e, Effect::ScheduleReconnect { .. }))
            {
                Some(Effect::ScheduleReconnect { attempt, delay }) => {
                    scheduled.push((*attempt, *delay));
                    let effects = m.reconnect_due();
                    assert!(effects.contains(&Effect::OpenTransport(URL.to_string())));
                }
                _ => break,
            }
        }

        assert_eq!(
            scheduled,
            vec![
                (1, Duration::from_secs(2)),
                (2, Duration::from_secs(4)),
                (3, Duration::from_secs(6)),
            ]
        );
        assert_eq!(m.connection(), ConnectionStatus::Disconnected);
        assert!(m.reconnect_due().is_empty());
    }

    #[test]
    fn test_successful_open_resets_attempts() {
        let mut m = machine();
        m.connect(URL);
        m.transport_closed();
        m.reconnect_due();
        assert_eq!(m.reconnect_attempts(), 1);
        m.transport_opened();
        assert_eq!(m.reconnect_attempts(), 0);
    }

    #[test]
    fn test_disconnect_cancels_reconnect_and_stops_recording() {
        let mut m = recording();
        let effects = m.disconnect();
        assert_eq!(effects[0], Effect::SendControl(ClientMessage::Stop));
        assert!(effects.contains(&Effect::CancelReconnect));
        assert!(effects.contains(&Effect::CloseTransport));
        assert_eq!(m.connection(), ConnectionStatus::Disconnected);
        assert_eq!(m.recording(), RecordingStatus::Inactive);

        // A close event racing the disconnect schedules nothing
        let effects = m.transport_closed();
        assert!(!effects
            .iter()
            .any(|e| matches!(e, Effect::ScheduleReconnect { .. })));
    }

    #[test]
    fn test_disconnect_when_disconnected_is_safe() {
        let mut m = machine();
        let effects = m.disconnect();
        assert_eq!(m.connection(), ConnectionStatus::Disconnected);
        assert_eq!(notified(&effects).len(), 1);
    }

    #[test]
    fn test_connection_frame_records_session_id() {
        let mut m = connected();
        let effects =
            m.transport_message(r#"{"type":"connection","userId":"9-0","message":"hi"}"#);
        assert_eq!(notified(&effects)[0].session_id.as_deref(), Some("9-0"));
        assert!(m.transport_message("garbage").is_empty());
        assert!(m
            .transport_message(r#"{"type":"error","message":"disk full"}"#)
            .is_empty());
    }

    #[test]
    fn test_capture_stop_event_marks_inactive() {
        let mut m = recording();
        let effects = m.capture_stopped();
        assert_eq!(effects[0], Effect::ReleaseCapture);
        assert_eq!(m.recording(), RecordingStatus::Inactive);
        assert!(m.capture_stopped().is_empty());
    }

    #[test]
    fn test_capture_error_event_releases_and_sets_error() {
        let mut m = recording();
        let effects = m.capture_error("encoder crashed");
        assert!(effects.contains(&Effect::ReleaseCapture));
        assert_eq!(m.recording(), RecordingStatus::Error);
        assert_eq!(m.connection(), ConnectionStatus::Connected);
    }

    #[test]
    fn test_every_mutation_notifies() {
        let mut m = machine();
        assert_eq!(notified(&m.connect(URL)).len(), 1);
        assert_eq!(notified(&m.transport_opened()).len(), 1);
        m.begin_recording().unwrap();
        m.capture_acquired();
        assert_eq!(notified(&m.capture_started()).len(), 1);
        // connection + recording both change
        assert_eq!(notified(&m.transport_error("x")).len(), 2);
    }
}
