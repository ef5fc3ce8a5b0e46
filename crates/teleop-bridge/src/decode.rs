//! Telemetry payload decoders.
//!
//! Each function takes the `msg` object of an inbound publish frame and
//! returns the snapshot value it carries. A payload that lacks the fields a
//! feed needs yields [`SessionError::Decode`]; the caller keeps the previous
//! value.

use serde_json::Value;
use teleop_types::{Pose, STATUS_UNKNOWN, SessionError};

/// Planar yaw (radians) of the orientation quaternion `(x, y, z, w)`.
///
/// Roll and pitch are ignored.
pub fn yaw_from_quaternion(x: f64, y: f64, z: f64, w: f64) -> f64 {
    let siny_cosp = 2.0 * (w * z + x * y);
    let cosy_cosp = 1.0 - 2.0 * (y * y + z * z);
    siny_cosp.atan2(cosy_cosp)
}

/// `sensor_msgs/BatteryState` → percent rounded to one decimal place.
///
/// The wire value is a fraction in `[0, 1]`. A JSON `null` (ROS serialises an
/// unmeasured `NaN` that way) decodes to `None`.
pub fn battery_percent(msg: &Value) -> Result<Option<f64>, SessionError> {
    match msg.get("percentage") {
        Some(Value::Null) => Ok(None),
        Some(v) => {
            let fraction = v.as_f64().ok_or_else(|| {
                SessionError::Decode(format!("battery percentage is not a number: {v}"))
            })?;
            Ok(Some((fraction * 100.0 * 10.0).round() / 10.0))
        }
        None => Err(SessionError::Decode(
            "battery message has no percentage".to_string(),
        )),
    }
}

/// `nav_msgs/Odometry` → planar pose.
///
/// `pose.pose.position.{x,y}` are required. Orientation components that are
/// absent or not numbers make the heading fall back to `0`.
pub fn pose_from_odometry(msg: &Value) -> Result<Pose, SessionError> {
    let pose = msg
        .get("pose")
        .and_then(|p| p.get("pose"))
        .ok_or_else(|| SessionError::Decode("odometry message has no pose.pose".to_string()))?;

    let position = pose
        .get("position")
        .ok_or_else(|| SessionError::Decode("odometry pose has no position".to_string()))?;
    let coord = |axis: &str| {
        position.get(axis).and_then(Value::as_f64).ok_or_else(|| {
            SessionError::Decode(format!("odometry position.{axis} is missing or not a number"))
        })
    };
    let x = coord("x")?;
    let y = coord("y")?;

    let theta = pose
        .get("orientation")
        .and_then(|o| {
            let q = |axis: &str| o.get(axis).and_then(Value::as_f64);
            Some(yaw_from_quaternion(q("x")?, q("y")?, q("z")?, q("w")?))
        })
        .unwrap_or(0.0);

    Ok(Pose { x, y, theta })
}

/// `std_msgs/String` → text, or the unknown sentinel when `data` is absent.
pub fn status_text(msg: &Value) -> String {
    match msg.get("data") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => STATUS_UNKNOWN.to_string(),
        Some(other) => other.to_string(),
    }
}
