//! The seam between [`BridgeSession`][crate::session::BridgeSession] and a
//! real socket.
//!
//! A [`Connector`] opens sockets; a [`Socket`] sends text frames. Everything
//! the socket observes afterwards (open, message, error, close) comes back to
//! the session as a [`TransportEvent`] tagged with the [`SocketId`] it
//! belongs to, so events from a socket the session has already abandoned can
//! be told apart and dropped.

use std::fmt;

use teleop_types::SessionError;

/// Identity of one socket instance. Never reused within a connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SocketId(pub u64);

impl fmt::Display for SocketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "socket#{}", self.0)
    }
}

/// Lifecycle and data events produced by a socket.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEventKind {
    Open,
    /// One text frame, as raw bytes.
    Message(Vec<u8>),
    Error(String),
    /// Close code, when the peer sent one.
    Closed(Option<u16>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransportEvent {
    pub socket: SocketId,
    pub kind: TransportEventKind,
}

impl TransportEvent {
    pub fn new(socket: SocketId, kind: TransportEventKind) -> Self {
        Self { socket, kind }
    }
}

/// One live socket, exclusively owned by the session.
pub trait Socket {
    fn id(&self) -> SocketId;

    /// Queue one text frame. Ordering between calls is preserved.
    fn send_text(&mut self, frame: String) -> Result<(), SessionError>;

    /// Start closing. Safe to call more than once.
    fn close(&mut self);
}

/// Opens sockets to an endpoint.
pub trait Connector {
    type Socket: Socket;

    /// Construct a socket and start connecting.
    ///
    /// Must return without waiting for the handshake; the outcome arrives
    /// later as an `Open` or `Error` event. An `Err` here means the socket
    /// could not even be constructed (malformed URI, runtime refused).
    fn open(&mut self, endpoint: &str) -> Result<Self::Socket, SessionError>;
}
