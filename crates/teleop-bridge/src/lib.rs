//! `teleop-bridge` – rosbridge client for teleoperating a robot.
//!
//! Speaks the JSON-over-WebSocket rosbridge protocol: subscribes to battery,
//! odometry and status feeds, keeps their latest values, and publishes
//! velocity and text commands.
//!
//! # Modules
//!
//! - [`session`] – [`BridgeSession`], the connection state machine, wire
//!   encoding and inbound dispatch. Network-free: it talks to the outside
//!   world only through a [`Connector`] and [`TransportEvent`]s.
//! - [`protocol`] – typed rosbridge envelopes.
//! - [`decode`] – battery / odometry / status payload decoders.
//! - [`ids`] – injectable correlation-id sources.
//! - [`config`] – [`BridgeConfig`], the immutable topic bindings.
//! - [`transport`] – the socket seam.
//! - [`ws`] – tokio-tungstenite [`WsConnector`].
//! - [`driver`] – [`SessionDriver`], the single task that owns a session,
//!   and the [`SessionHandle`] a UI talks to.

pub mod config;
pub mod decode;
pub mod driver;
pub mod ids;
pub mod protocol;
pub mod session;
pub mod transport;
pub mod ws;

#[cfg(test)]
mod testing;

pub use config::{BridgeConfig, DEFAULT_THROTTLE_RATE_MS, Sensitivity, TopicBinding};
pub use driver::{SessionCommand, SessionDriver, SessionHandle, SessionView, spawn_ws_session};
pub use ids::{IdSource, SequentialIdSource, TimestampIdSource};
pub use session::{BridgeSession, Direction};
pub use transport::{Connector, Socket, SocketId, TransportEvent, TransportEventKind};
pub use ws::WsConnector;
