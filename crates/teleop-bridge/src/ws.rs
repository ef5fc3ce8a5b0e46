//! tokio-tungstenite implementation of the transport seam.
//!
//! Each [`WsSocket`] is backed by one spawned task that owns the WebSocket
//! stream. The task reports lifecycle and text frames on a shared event
//! channel and drains an outbound queue, so sends from the session never
//! block and stay in FIFO order.

use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use teleop_types::SessionError;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tracing::{debug, warn};

use crate::transport::{Connector, Socket, SocketId, TransportEvent, TransportEventKind};

/// How long to wait for the peer to finish a close handshake it started.
const CLOSE_DRAIN: Duration = Duration::from_secs(1);

enum Outbound {
    Text(String),
    Close,
}

/// Opens rosbridge WebSockets on a Tokio runtime.
pub struct WsConnector {
    events: mpsc::UnboundedSender<TransportEvent>,
    runtime: Handle,
    next_id: u64,
}

impl WsConnector {
    /// Events from every socket this connector opens are sent to `events`.
    pub fn new(events: mpsc::UnboundedSender<TransportEvent>, runtime: Handle) -> Self {
        Self {
            events,
            runtime,
            next_id: 0,
        }
    }
}

impl Connector for WsConnector {
    type Socket = WsSocket;

    fn open(&mut self, endpoint: &str) -> Result<WsSocket, SessionError> {
        let request = endpoint
            .into_client_request()
            .map_err(|e| SessionError::Transport(format!("invalid endpoint {endpoint}: {e}")))?;
        match request.uri().scheme_str() {
            Some("ws") | Some("wss") => {}
            other => {
                return Err(SessionError::Transport(format!(
                    "invalid endpoint {endpoint}: unsupported scheme {other:?}"
                )));
            }
        }

        self.next_id += 1;
        let id = SocketId(self.next_id);
        let (tx, rx) = mpsc::unbounded_channel();
        self.runtime
            .spawn(run_socket(id, request, rx, self.events.clone()));

        Ok(WsSocket { id, outbound: tx })
    }
}

/// Handle to a socket task. Dropping it closes the socket.
pub struct WsSocket {
    id: SocketId,
    outbound: mpsc::UnboundedSender<Outbound>,
}

impl Socket for WsSocket {
    fn id(&self) -> SocketId {
        self.id
    }

    fn send_text(&mut self, frame: String) -> Result<(), SessionError> {
        self.outbound
            .send(Outbound::Text(frame))
            .map_err(|_| SessionError::Transport(format!("{} is no longer running", self.id)))
    }

    fn close(&mut self) {
        let _ = self.outbound.send(Outbound::Close);
    }
}

fn emit(events: &mpsc::UnboundedSender<TransportEvent>, id: SocketId, kind: TransportEventKind) {
    // The receiver is gone only when the driver has shut down.
    let _ = events.send(TransportEvent::new(id, kind));
}

async fn run_socket(
    id: SocketId,
    request: Request,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    events: mpsc::UnboundedSender<TransportEvent>,
) {
    debug!(socket = %id, uri = %request.uri(), "ws connecting");

    let stream = tokio::select! {
        result = connect_async(request) => match result {
            Ok((stream, _response)) => stream,
            Err(e) => {
                emit(&events, id, TransportEventKind::Error(e.to_string()));
                emit(&events, id, TransportEventKind::Closed(None));
                return;
            }
        },
        // Nothing is sent before `Open`, so anything here means the handle
        // was closed or dropped mid-handshake.
        _ = outbound.recv() => {
            debug!(socket = %id, "ws connect abandoned");
            emit(&events, id, TransportEventKind::Closed(None));
            return;
        }
    };

    emit(&events, id, TransportEventKind::Open);
    let (mut ws_tx, mut ws_rx) = stream.split();

    loop {
        tokio::select! {
            cmd = outbound.recv() => match cmd {
                Some(Outbound::Text(text)) => {
                    if let Err(e) = ws_tx.send(Message::Text(text.into())).await {
                        warn!(socket = %id, error = %e, "ws send failed");
                        emit(&events, id, TransportEventKind::Error(e.to_string()));
                        emit(&events, id, TransportEventKind::Closed(None));
                        return;
                    }
                }
                Some(Outbound::Close) | None => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    let _ = ws_tx.close().await;
                    emit(&events, id, TransportEventKind::Closed(None));
                    return;
                }
            },
            msg = ws_rx.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    emit(&events, id, TransportEventKind::Message(text.as_str().as_bytes().to_vec()));
                }
                Some(Ok(Message::Close(frame))) => {
                    let code = frame.map(|f| u16::from(f.code));
                    // Keep reading so the queued close reply is flushed and
                    // the handshake completes before the stream is dropped.
                    let _ = tokio::time::timeout(CLOSE_DRAIN, async {
                        while ws_rx.next().await.is_some() {}
                    })
                    .await;
                    emit(&events, id, TransportEventKind::Closed(code));
                    return;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    emit(&events, id, TransportEventKind::Error(e.to_string()));
                    emit(&events, id, TransportEventKind::Closed(None));
                    return;
                }
                None => {
                    emit(&events, id, TransportEventKind::Closed(None));
                    return;
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;
    use tokio_tungstenite::tungstenite::protocol::CloseFrame;
    use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

    async fn next_event(rx: &mut mpsc::UnboundedReceiver<TransportEvent>) -> TransportEvent {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("event within timeout")
            .expect("event channel open")
    }

    #[tokio::test]
    async fn rejects_malformed_endpoint() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut connector = WsConnector::new(tx, Handle::current());
        assert!(matches!(
            connector.open("not a uri at all"),
            Err(SessionError::Transport(_))
        ));
        assert!(matches!(
            connector.open("http://localhost:9090"),
            Err(SessionError::Transport(_))
        ));
    }

    #[tokio::test]
    async fn refused_connection_reports_error_then_close() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut connector = WsConnector::new(tx, Handle::current());
        let socket = connector.open(&format!("ws://{addr}")).unwrap();

        let first = next_event(&mut rx).await;
        assert_eq!(first.socket, socket.id());
        assert!(matches!(first.kind, TransportEventKind::Error(_)));
        let second = next_event(&mut rx).await;
        assert_eq!(second.kind, TransportEventKind::Closed(None));
    }

    #[tokio::test]
    async fn frames_flow_both_ways() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            let received = match ws.next().await {
                Some(Ok(Message::Text(t))) => t.as_str().to_string(),
                other => panic!("unexpected frame: {other:?}"),
            };
            ws.send(Message::Text(
                r#"{"op":"publish","topic":"/robot_status_app","msg":{"data":"ok"}}"#.into(),
            ))
            .await
            .unwrap();
            ws.send(Message::Close(Some(CloseFrame {
                code: CloseCode::Normal,
                reason: "bye".into(),
            })))
            .await
            .unwrap();
            let close_reply = ws.next().await;
            (received, close_reply)
        });

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut connector = WsConnector::new(tx, Handle::current());
        let mut socket = connector.open(&format!("ws://{addr}")).unwrap();

        assert_eq!(next_event(&mut rx).await.kind, TransportEventKind::Open);
        socket
            .send_text(r#"{"op":"unsubscribe","id":"u1","topic":"/odom"}"#.to_string())
            .unwrap();

        match next_event(&mut rx).await.kind {
            TransportEventKind::Message(raw) => {
                assert!(String::from_utf8(raw).unwrap().contains("robot_status_app"));
            }
            other => panic!("expected message, got {other:?}"),
        }
        assert_eq!(
            next_event(&mut rx).await.kind,
            TransportEventKind::Closed(Some(1000))
        );

        let (received, close_reply) = server.await.unwrap();
        assert_eq!(received, r#"{"op":"unsubscribe","id":"u1","topic":"/odom"}"#);
        assert!(
            matches!(close_reply, Some(Ok(Message::Close(_)))),
            "peer close was not answered: {close_reply:?}"
        );
    }
}
