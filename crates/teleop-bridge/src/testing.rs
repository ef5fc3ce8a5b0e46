//! In-memory [`Connector`] that records every frame instead of sending it.

use std::sync::{Arc, Mutex};

use serde_json::Value;
use teleop_types::SessionError;

use crate::transport::{Connector, Socket, SocketId};

#[derive(Default)]
struct Wire {
    opened: Vec<SocketId>,
    closed: Vec<SocketId>,
    sent: Vec<(SocketId, String)>,
    refuse: Option<String>,
}

#[derive(Clone, Default)]
pub(crate) struct FakeConnector {
    wire: Arc<Mutex<Wire>>,
}

impl FakeConnector {
    /// Make the next `open` fail with a transport error.
    pub fn refuse_next(&self, reason: &str) {
        self.wire.lock().unwrap().refuse = Some(reason.to_string());
    }

    /// Every frame sent so far, parsed as JSON.
    pub fn sent(&self) -> Vec<Value> {
        self.wire
            .lock()
            .unwrap()
            .sent
            .iter()
            .map(|(_, text)| serde_json::from_str(text).expect("sent frame is JSON"))
            .collect()
    }

    pub fn last_socket(&self) -> Option<SocketId> {
        self.wire.lock().unwrap().opened.last().copied()
    }

    pub fn opened_count(&self) -> usize {
        self.wire.lock().unwrap().opened.len()
    }

    pub fn live_sockets(&self) -> usize {
        let wire = self.wire.lock().unwrap();
        wire.opened.iter().filter(|id| !wire.closed.contains(id)).count()
    }
}

impl Connector for FakeConnector {
    type Socket = FakeSocket;

    fn open(&mut self, _endpoint: &str) -> Result<FakeSocket, SessionError> {
        let mut wire = self.wire.lock().unwrap();
        if let Some(reason) = wire.refuse.take() {
            return Err(SessionError::Transport(reason));
        }
        let id = SocketId(wire.opened.len() as u64 + 1);
        wire.opened.push(id);
        Ok(FakeSocket {
            id,
            wire: Arc::clone(&self.wire),
        })
    }
}

pub(crate) struct FakeSocket {
    id: SocketId,
    wire: Arc<Mutex<Wire>>,
}

impl Socket for FakeSocket {
    fn id(&self) -> SocketId {
        self.id
    }

    fn send_text(&mut self, frame: String) -> Result<(), SessionError> {
        let mut wire = self.wire.lock().unwrap();
        if wire.closed.contains(&self.id) {
            return Err(SessionError::Transport("socket closed".to_string()));
        }
        wire.sent.push((self.id, frame));
        Ok(())
    }

    fn close(&mut self) {
        let mut wire = self.wire.lock().unwrap();
        if !wire.closed.contains(&self.id) {
            wire.closed.push(self.id);
        }
    }
}
