//! [`BridgeSession`] – one rosbridge connection and the telemetry it feeds.
//!
//! The session is a plain state machine. Public operations (`connect`,
//! `publish`, …) act on the socket immediately and return; everything the
//! socket reports afterwards is fed back through
//! [`BridgeSession::handle_event`], which is the only place connection state
//! changes in response to the network.
//!
//! | event | effect |
//! |---|---|
//! | `Open` | `Connecting → Connected`, subscribe to the three feeds |
//! | `Message` | decode and update the snapshot / last error |
//! | `Error` | `→ Error`, record a transport error |
//! | `Closed` | `→ Disconnected`, drop the socket, reset the snapshot |
//!
//! Events carrying a [`SocketId`] other than the currently held socket's are
//! ignored, so a late `Open` from an abandoned connection attempt cannot
//! resurrect it.
//!
//! Nothing here returns an error to the caller. Failures land in
//! [`BridgeSession::last_error`] and the log.

use serde_json::{Value, json};
use teleop_types::{
    ConnectionState, Notice, OutboundCommand, SessionError, TelemetrySnapshot, Twist,
};
use tracing::{debug, info, warn};

use crate::config::BridgeConfig;
use crate::decode;
use crate::ids::IdSource;
use crate::protocol::{InboundFrame, OutboundFrame};
use crate::transport::{Connector, Socket, SocketId, TransportEvent, TransportEventKind};

/// Message type used for free-form text commands.
pub const STRING_MSG_TYPE: &str = "std_msgs/String";

const NOT_CONNECTED: &str = "cannot send command: not connected";

/// Directional drive shortcut, scaled by the configured sensitivity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
    Left,
    Right,
}

pub struct BridgeSession<C: Connector, I: IdSource> {
    config: BridgeConfig,
    connector: C,
    ids: I,
    endpoint: String,
    socket: Option<C::Socket>,
    state: ConnectionState,
    snapshot: TelemetrySnapshot,
    last_error: Option<SessionError>,
    notices: Vec<Notice>,
}

impl<C: Connector, I: IdSource> BridgeSession<C, I> {
    pub fn new(config: BridgeConfig, connector: C, ids: I, endpoint: impl Into<String>) -> Self {
        Self {
            config,
            connector,
            ids,
            endpoint: endpoint.into(),
            socket: None,
            state: ConnectionState::Disconnected,
            snapshot: TelemetrySnapshot::default(),
            last_error: None,
            notices: Vec::new(),
        }
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn snapshot(&self) -> &TelemetrySnapshot {
        &self.snapshot
    }

    pub fn last_error(&self) -> Option<&SessionError> {
        self.last_error.as_ref()
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Drain notices raised since the last call.
    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    /// Change the endpoint used by the next [`connect`][Self::connect].
    ///
    /// Only allowed while disconnected; returns whether the change was made.
    pub fn set_endpoint(&mut self, endpoint: impl Into<String>) -> bool {
        if self.state != ConnectionState::Disconnected {
            self.record(SessionError::Precondition(format!(
                "cannot change endpoint in {} state; disconnect first",
                self.state
            )));
            return false;
        }
        self.endpoint = endpoint.into();
        true
    }

    // -----------------------------------------------------------------------
    // Connection lifecycle
    // -----------------------------------------------------------------------

    /// Open a socket to `endpoint`.
    ///
    /// A no-op while a connection is open or in flight. The feed
    /// subscriptions go out once the transport reports `Open`.
    pub fn connect(&mut self, endpoint: &str) {
        if matches!(
            self.state,
            ConnectionState::Connecting | ConnectionState::Connected
        ) {
            info!(endpoint = %self.endpoint, "already connected");
            self.notices.push(Notice::AlreadyConnected);
            return;
        }

        // An errored socket may still be waiting for its close event.
        if let Some(mut stale) = self.socket.take() {
            debug!(socket = %stale.id(), "closing errored socket before reconnect");
            stale.close();
        }

        self.endpoint = endpoint.to_string();
        self.last_error = None;
        self.state = ConnectionState::Connecting;
        info!(endpoint = %self.endpoint, "connecting to bridge");

        match self.connector.open(endpoint) {
            Ok(socket) => {
                debug!(socket = %socket.id(), "socket constructed");
                self.socket = Some(socket);
            }
            Err(e) => {
                self.state = ConnectionState::Error;
                self.record(e);
            }
        }
    }

    /// Close the socket (if any) and return to the initial state.
    pub fn disconnect(&mut self) {
        if let Some(mut socket) = self.socket.take() {
            info!(socket = %socket.id(), endpoint = %self.endpoint, "disconnecting");
            socket.close();
        }
        self.state = ConnectionState::Disconnected;
        self.snapshot = TelemetrySnapshot::default();
    }

    /// Apply one transport event.
    pub fn handle_event(&mut self, event: TransportEvent) {
        let current = self.socket.as_ref().map(Socket::id);
        if current != Some(event.socket) {
            debug!(socket = %event.socket, kind = ?event.kind, "ignoring event from superseded socket");
            return;
        }

        match event.kind {
            TransportEventKind::Open => {
                self.state = ConnectionState::Connected;
                info!(endpoint = %self.endpoint, "bridge connected");
                self.subscribe_feeds();
            }
            TransportEventKind::Message(raw) => self.dispatch(&raw),
            TransportEventKind::Error(reason) => {
                self.state = ConnectionState::Error;
                self.record(SessionError::Transport(reason));
            }
            TransportEventKind::Closed(code) => {
                info!(endpoint = %self.endpoint, ?code, "bridge connection closed");
                self.socket = None;
                self.state = ConnectionState::Disconnected;
                self.snapshot = TelemetrySnapshot::default();
            }
        }
    }

    fn subscribe_feeds(&mut self) {
        let throttle = self.config.throttle_rate_ms;
        let feeds: Vec<(String, String)> = self
            .config
            .feeds()
            .iter()
            .map(|b| (b.topic.clone(), b.msg_type.clone()))
            .collect();
        for (topic, msg_type) in feeds {
            self.subscribe(&topic, &msg_type, throttle);
        }
    }

    // -----------------------------------------------------------------------
    // Outbound requests
    // -----------------------------------------------------------------------

    pub fn subscribe(&mut self, topic: &str, msg_type: &str, throttle_rate_ms: u32) {
        if !self.is_connected() {
            self.record(SessionError::Precondition(format!(
                "cannot subscribe to {topic}: not connected"
            )));
            return;
        }
        let frame = OutboundFrame::Subscribe {
            id: self.ids.next_id("subscribe"),
            topic: topic.to_string(),
            msg_type: msg_type.to_string(),
            throttle_rate: throttle_rate_ms,
        };
        self.send(frame);
    }

    pub fn unsubscribe(&mut self, topic: &str) {
        if !self.is_connected() {
            self.record(SessionError::Precondition(format!(
                "cannot unsubscribe from {topic}: not connected"
            )));
            return;
        }
        let frame = OutboundFrame::Unsubscribe {
            id: self.ids.next_id("unsubscribe"),
            topic: topic.to_string(),
        };
        self.send(frame);
    }

    /// Publish `payload` on `topic` and raise [`Notice::CommandSent`].
    /// Returns whether a frame was sent.
    pub fn publish(&mut self, topic: &str, msg_type: &str, payload: Value) -> bool {
        let sent = self.publish_frame(topic, msg_type, payload);
        if sent {
            self.notices.push(Notice::CommandSent {
                topic: topic.to_string(),
            });
        }
        sent
    }

    /// Publish without a notice. Velocity traffic goes through here; the
    /// emergency stop raises its own.
    fn publish_frame(&mut self, topic: &str, msg_type: &str, payload: Value) -> bool {
        if !self.is_connected() {
            self.record(SessionError::Precondition(NOT_CONNECTED.to_string()));
            return false;
        }
        let frame = OutboundFrame::Publish {
            id: self.ids.next_id("publish"),
            topic: topic.to_string(),
            msg: payload,
            msg_type: msg_type.to_string(),
        };
        self.send(frame)
    }

    pub fn send_velocity(&mut self, linear: f64, angular: f64) -> bool {
        let payload = match serde_json::to_value(Twist::planar(linear, angular)) {
            Ok(v) => v,
            Err(e) => {
                self.record(SessionError::Decode(e.to_string()));
                return false;
            }
        };
        let binding = self.config.velocity.clone();
        self.publish_frame(&binding.topic, &binding.msg_type, payload)
    }

    /// Send a zero twist and raise [`Notice::EmergencyStopIssued`].
    pub fn emergency_stop(&mut self) {
        warn!(endpoint = %self.endpoint, "emergency stop requested");
        if self.send_velocity(0.0, 0.0) {
            self.notices.push(Notice::EmergencyStopIssued);
        }
    }

    /// Publish a `std_msgs/String` command.
    pub fn send_text(&mut self, topic: &str, data: &str) -> bool {
        self.publish(topic, STRING_MSG_TYPE, json!({ "data": data }))
    }

    pub fn send_command(&mut self, command: OutboundCommand) -> bool {
        match command {
            OutboundCommand::Velocity { linear, angular } => self.send_velocity(linear, angular),
            OutboundCommand::Text { topic, data } => self.send_text(&topic, &data),
        }
    }

    /// Drive one step in `direction` at the configured sensitivity.
    pub fn drive(&mut self, direction: Direction) -> bool {
        let s = self.config.sensitivity;
        let (linear, angular) = match direction {
            Direction::Forward => (s.linear_step, 0.0),
            Direction::Backward => (-s.linear_step, 0.0),
            Direction::Left => (0.0, s.angular_step),
            Direction::Right => (0.0, -s.angular_step),
        };
        self.send_velocity(linear, angular)
    }

    fn send(&mut self, frame: OutboundFrame) -> bool {
        let text = match frame.encode() {
            Ok(t) => t,
            Err(e) => {
                self.record(e);
                return false;
            }
        };
        let Some(socket) = self.socket.as_mut() else {
            self.record(SessionError::Precondition(NOT_CONNECTED.to_string()));
            return false;
        };
        debug!(op = frame.op(), topic = frame.topic(), "sending frame");
        match socket.send_text(text) {
            Ok(()) => true,
            Err(e) => {
                self.record(e);
                false
            }
        }
    }

    // -----------------------------------------------------------------------
    // Inbound dispatch
    // -----------------------------------------------------------------------

    fn dispatch(&mut self, raw: &[u8]) {
        let frame = match InboundFrame::decode(raw) {
            Ok(f) => f,
            Err(e) => {
                self.record(e);
                return;
            }
        };

        match frame {
            InboundFrame::Publish { topic, msg } => self.apply_publish(&topic, &msg),
            InboundFrame::Status { id, level, msg } => {
                let level = level.unwrap_or_default();
                if level == "error" || level == "warning" {
                    debug!(?id, "bridge reported {level}");
                    self.record(SessionError::ProtocolStatus {
                        level,
                        message: msg.unwrap_or_default(),
                    });
                }
            }
            InboundFrame::Other => {}
        }
    }

    fn apply_publish(&mut self, topic: &str, msg: &Value) {
        if topic == self.config.battery.topic {
            match decode::battery_percent(msg) {
                Ok(pct) => self.snapshot.battery_percent = pct,
                Err(e) => self.record(e),
            }
        } else if topic == self.config.odometry.topic {
            match decode::pose_from_odometry(msg) {
                Ok(pose) => self.snapshot.pose = pose,
                Err(e) => self.record(e),
            }
        } else if topic == self.config.status.topic {
            self.snapshot.status = decode::status_text(msg);
        }
    }

    fn record(&mut self, err: SessionError) {
        warn!(endpoint = %self.endpoint, error = %err, "bridge session error");
        self.last_error = Some(err);
    }
}
