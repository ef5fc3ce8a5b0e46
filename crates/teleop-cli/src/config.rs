//! Operator configuration – reads `~/.teleop/config.toml`.
//!
//! ```toml
//! endpoint = "ws://192.168.1.20:9090"
//!
//! [bridge]
//! throttle_rate_ms = 100
//!
//! [bridge.odometry]
//! topic = "/robot/odom"
//! type = "nav_msgs/Odometry"
//!
//! [bridge.sensitivity]
//! linear_step = 0.3
//! ```
//!
//! The file is only read; the client never writes settings back.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use teleop_bridge::BridgeConfig;
use teleop_types::SessionError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// rosbridge WebSocket URI used by `/connect` without an argument.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Topic bindings, throttle rate and drive sensitivity.
    #[serde(default)]
    pub bridge: BridgeConfig,
}

fn default_endpoint() -> String {
    "ws://localhost:9090".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            bridge: BridgeConfig::default(),
        }
    }
}

/// Return the path to `~/.teleop/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".teleop").join("config.toml")
}

/// Load the config, falling back to defaults when the file does not exist.
/// Environment overrides are applied either way.
pub fn load() -> Result<Config, SessionError> {
    let mut cfg = load_from(&config_path())?.unwrap_or_default();
    apply_env_overrides(&mut cfg);
    Ok(cfg)
}

/// Load the config from a specific path. `None` if the file is absent.
pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, SessionError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|e| {
        SessionError::Config(format!("failed to read {}: {e}", path.display()))
    })?;
    let cfg = toml::from_str(&raw).map_err(|e| {
        SessionError::Config(format!("failed to parse {}: {e}", path.display()))
    })?;
    Ok(Some(cfg))
}

/// Apply `TELEOP_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `TELEOP_ENDPOINT` | `endpoint` |
/// | `TELEOP_THROTTLE_MS` | `bridge.throttle_rate_ms` |
/// | `TELEOP_LINEAR_STEP` | `bridge.sensitivity.linear_step` |
/// | `TELEOP_ANGULAR_STEP` | `bridge.sensitivity.angular_step` |
///
/// Values that do not parse are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("TELEOP_ENDPOINT") {
        cfg.endpoint = v;
    }
    if let Ok(v) = std::env::var("TELEOP_THROTTLE_MS")
        && let Ok(ms) = v.parse::<u32>()
    {
        cfg.bridge.throttle_rate_ms = ms;
    }
    if let Ok(v) = std::env::var("TELEOP_LINEAR_STEP")
        && let Ok(step) = v.parse::<f64>()
    {
        cfg.bridge.sensitivity.linear_step = step;
    }
    if let Ok(v) = std::env::var("TELEOP_ANGULAR_STEP")
        && let Ok(step) = v.parse::<f64>()
    {
        cfg.bridge.sensitivity.angular_step = step;
    }
}
