//! `teleop-types` – shared data model for the teleoperation client.
//!
//! Everything the presentation layer renders (connection state, telemetry,
//! last error, notices) and everything it can ask the robot to do
//! ([`OutboundCommand`]) lives here so that the bridge core and any UI can
//! agree on one vocabulary.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Status string shown before the status feed has delivered anything.
pub const STATUS_UNKNOWN: &str = "N/A";

/// Lifecycle of the single bridge socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    /// The transport reported an error; a close event normally follows.
    Error,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Error => write!(f, "error"),
        }
    }
}

/// Planar robot pose: metres, metres, radians.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose {
    pub x: f64,
    pub y: f64,
    pub theta: f64,
}

/// Latest known value of every subscribed feed.
///
/// Fields are overwritten in place; there is no history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    /// Battery charge in percent, one decimal place. `None` means unknown.
    pub battery_percent: Option<f64>,
    pub pose: Pose,
    pub status: String,
}

impl Default for TelemetrySnapshot {
    fn default() -> Self {
        Self {
            battery_percent: None,
            pose: Pose::default(),
            status: STATUS_UNKNOWN.to_string(),
        }
    }
}

/// `geometry_msgs/Vector3`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// `geometry_msgs/Twist` – independent linear and angular velocity vectors.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Twist {
    pub linear: Vector3,
    pub angular: Vector3,
}

impl Twist {
    /// Differential-drive twist: forward speed (m/s) and yaw rate (rad/s).
    pub fn planar(linear: f64, angular: f64) -> Self {
        Self {
            linear: Vector3 {
                x: linear,
                ..Vector3::default()
            },
            angular: Vector3 {
                z: angular,
                ..Vector3::default()
            },
        }
    }
}

/// Fire-and-forget command the operator can issue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutboundCommand {
    /// Published to the velocity topic as a [`Twist`].
    Velocity { linear: f64, angular: f64 },
    /// Published as `std_msgs/String` `{data}` to an arbitrary topic.
    Text { topic: String, data: String },
}

/// Signals the presentation layer may want to surface to the operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Notice {
    /// A zero-velocity command was sent in response to an emergency stop.
    EmergencyStopIssued,
    /// A publish frame left the client. No acknowledgement is implied.
    CommandSent { topic: String },
    /// `connect` was called while a connection was open or in flight.
    AlreadyConnected,
}

/// Everything that can go wrong in a session.
///
/// None of these are returned across the session boundary; they are
/// recorded as the session's last error and logged.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SessionError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("bridge {level}: {message}")]
    ProtocolStatus { level: String, message: String },

    #[error("{0}")]
    Precondition(String),

    #[error("config error: {0}")]
    Config(String),
}
