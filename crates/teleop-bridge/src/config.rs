//! Immutable topic bindings and teleop sensitivity for one session.

use serde::{Deserialize, Serialize};

/// Default server-side throttle hint for subscriptions, in milliseconds.
pub const DEFAULT_THROTTLE_RATE_MS: u32 = 200;

/// A topic name paired with its ROS message type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicBinding {
    pub topic: String,
    #[serde(rename = "type")]
    pub msg_type: String,
}

impl TopicBinding {
    pub fn new(topic: impl Into<String>, msg_type: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            msg_type: msg_type.into(),
        }
    }
}

/// Velocity magnitudes used by the directional drive commands.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Sensitivity {
    /// Forward/backward speed in m/s.
    pub linear_step: f64,
    /// Turn rate in rad/s.
    pub angular_step: f64,
}

impl Default for Sensitivity {
    fn default() -> Self {
        Self {
            linear_step: 0.2,
            angular_step: 0.5,
        }
    }
}

/// Everything a [`BridgeSession`][crate::session::BridgeSession] needs to
/// know about the robot's topics.
///
/// Passed by value into the session constructor; two sessions with different
/// bindings can coexist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub velocity: TopicBinding,
    pub battery: TopicBinding,
    pub odometry: TopicBinding,
    pub status: TopicBinding,
    /// Throttle hint attached to the automatic feed subscriptions.
    pub throttle_rate_ms: u32,
    pub sensitivity: Sensitivity,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            velocity: TopicBinding::new("/cmd_vel", "geometry_msgs/Twist"),
            battery: TopicBinding::new("/battery_status", "sensor_msgs/BatteryState"),
            odometry: TopicBinding::new("/odom", "nav_msgs/Odometry"),
            status: TopicBinding::new("/robot_status_app", "std_msgs/String"),
            throttle_rate_ms: DEFAULT_THROTTLE_RATE_MS,
            sensitivity: Sensitivity::default(),
        }
    }
}

impl BridgeConfig {
    /// The three feeds subscribed to as soon as the socket opens.
    pub fn feeds(&self) -> [&TopicBinding; 3] {
        [&self.battery, &self.odometry, &self.status]
    }
}
