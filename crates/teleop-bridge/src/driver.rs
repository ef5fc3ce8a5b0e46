//! Single-actor driver around [`BridgeSession`].
//!
//! One Tokio task owns the session and is the only code that touches it.
//! Operator commands (from any number of [`SessionHandle`] clones) and
//! transport events share one `select!` loop, so they are applied one at a
//! time in arrival order, and the session needs no locking.
//!
//! After every step the driver publishes a fresh [`SessionView`] on a
//! [`watch`] channel and forwards any [`Notice`]s on a [`broadcast`] channel
//! for the presentation layer.

use serde_json::Value;
use std::ops::ControlFlow;
use teleop_types::{ConnectionState, Notice, OutboundCommand, SessionError, TelemetrySnapshot};
use tokio::runtime::Handle;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::BridgeConfig;
use crate::ids::{IdSource, TimestampIdSource};
use crate::session::{BridgeSession, Direction};
use crate::transport::{Connector, TransportEvent};
use crate::ws::WsConnector;

const NOTICE_CAPACITY: usize = 64;

/// Requests a presentation layer can make of the session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionCommand {
    /// Connect to the given endpoint, or the current one when `None`.
    Connect(Option<String>),
    Disconnect,
    SetEndpoint(String),
    Subscribe {
        topic: String,
        msg_type: String,
        throttle_rate_ms: u32,
    },
    Unsubscribe(String),
    Publish {
        topic: String,
        msg_type: String,
        payload: Value,
    },
    Send(OutboundCommand),
    Drive(Direction),
    EmergencyStop,
    /// Disconnect and stop the driver task.
    Shutdown,
}

/// Everything a UI needs to render, copied out of the session.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SessionView {
    pub state: ConnectionState,
    pub snapshot: TelemetrySnapshot,
    pub last_error: Option<SessionError>,
    pub endpoint: String,
}

impl SessionView {
    fn of<C: Connector, I: IdSource>(session: &BridgeSession<C, I>) -> Self {
        Self {
            state: session.state(),
            snapshot: session.snapshot().clone(),
            last_error: session.last_error().cloned(),
            endpoint: session.endpoint().to_string(),
        }
    }
}

/// Cloneable front door to a running [`SessionDriver`].
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<SessionCommand>,
    view: watch::Receiver<SessionView>,
    notices: broadcast::Sender<Notice>,
}

impl SessionHandle {
    /// Queue a command. Dropped with a warning once the driver has stopped.
    pub fn send(&self, command: SessionCommand) {
        if self.commands.send(command).is_err() {
            warn!("session driver has stopped; command dropped");
        }
    }

    pub fn connect(&self, endpoint: Option<String>) {
        self.send(SessionCommand::Connect(endpoint));
    }

    pub fn disconnect(&self) {
        self.send(SessionCommand::Disconnect);
    }

    pub fn send_velocity(&self, linear: f64, angular: f64) {
        self.send(SessionCommand::Send(OutboundCommand::Velocity { linear, angular }));
    }

    pub fn emergency_stop(&self) {
        self.send(SessionCommand::EmergencyStop);
    }

    pub fn shutdown(&self) {
        self.send(SessionCommand::Shutdown);
    }

    /// The most recently published view.
    pub fn view(&self) -> SessionView {
        self.view.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<SessionView> {
        self.view.clone()
    }

    pub fn notices(&self) -> broadcast::Receiver<Notice> {
        self.notices.subscribe()
    }
}

pub struct SessionDriver<C: Connector, I: IdSource> {
    session: BridgeSession<C, I>,
    commands: mpsc::UnboundedReceiver<SessionCommand>,
    events: mpsc::UnboundedReceiver<TransportEvent>,
    view: watch::Sender<SessionView>,
    notices: broadcast::Sender<Notice>,
}

impl<C, I> SessionDriver<C, I>
where
    C: Connector + Send + 'static,
    C::Socket: Send,
    I: IdSource + Send + 'static,
{
    /// Wrap `session`; `events` must receive everything its connector emits.
    pub fn new(
        session: BridgeSession<C, I>,
        events: mpsc::UnboundedReceiver<TransportEvent>,
    ) -> (Self, SessionHandle) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (view_tx, view_rx) = watch::channel(SessionView::of(&session));
        let (notice_tx, _) = broadcast::channel(NOTICE_CAPACITY);

        let handle = SessionHandle {
            commands: cmd_tx,
            view: view_rx,
            notices: notice_tx.clone(),
        };
        let driver = Self {
            session,
            commands: cmd_rx,
            events,
            view: view_tx,
            notices: notice_tx,
        };
        (driver, handle)
    }

    /// Run until [`SessionCommand::Shutdown`] or every handle is dropped.
    pub async fn run(mut self) {
        info!(endpoint = %self.session.endpoint(), "session driver started");
        loop {
            tokio::select! {
                Some(event) = self.events.recv() => self.session.handle_event(event),
                cmd = self.commands.recv() => {
                    // Every handle gone means nobody can ask for anything else.
                    let cmd = cmd.unwrap_or(SessionCommand::Shutdown);
                    if self.apply(cmd).is_break() {
                        self.publish_view();
                        break;
                    }
                }
            }
            self.publish_view();
        }
        info!("session driver stopped");
    }

    fn apply(&mut self, cmd: SessionCommand) -> ControlFlow<()> {
        debug!(?cmd, "session command");
        let session = &mut self.session;
        match cmd {
            SessionCommand::Connect(endpoint) => {
                let endpoint = endpoint.unwrap_or_else(|| session.endpoint().to_string());
                session.connect(&endpoint);
            }
            SessionCommand::Disconnect => session.disconnect(),
            SessionCommand::SetEndpoint(endpoint) => {
                session.set_endpoint(endpoint);
            }
            SessionCommand::Subscribe {
                topic,
                msg_type,
                throttle_rate_ms,
            } => session.subscribe(&topic, &msg_type, throttle_rate_ms),
            SessionCommand::Unsubscribe(topic) => session.unsubscribe(&topic),
            SessionCommand::Publish {
                topic,
                msg_type,
                payload,
            } => {
                session.publish(&topic, &msg_type, payload);
            }
            SessionCommand::Send(command) => {
                session.send_command(command);
            }
            SessionCommand::Drive(direction) => {
                session.drive(direction);
            }
            SessionCommand::EmergencyStop => session.emergency_stop(),
            SessionCommand::Shutdown => {
                session.disconnect();
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    fn publish_view(&mut self) {
        let next = SessionView::of(&self.session);
        self.view.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
        for notice in self.session.take_notices() {
            // No receivers is fine: nobody is rendering notices right now.
            let _ = self.notices.send(notice);
        }
    }
}

/// Build a WebSocket-backed session and spawn its driver on `runtime`.
pub fn spawn_ws_session(
    config: BridgeConfig,
    endpoint: impl Into<String>,
    runtime: &Handle,
) -> (SessionHandle, JoinHandle<()>) {
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let connector = WsConnector::new(event_tx, runtime.clone());
    let session = BridgeSession::new(config, connector, TimestampIdSource, endpoint);
    let (driver, handle) = SessionDriver::new(session, event_rx);
    let task = runtime.spawn(driver.run());
    (handle, task)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::SequentialIdSource;
    use crate::testing::FakeConnector;
    use crate::transport::{SocketId, TransportEventKind};
    use futures_util::{SinkExt, StreamExt};
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;
    use tokio_tungstenite::tungstenite::Message;

    const TIMEOUT: Duration = Duration::from_secs(5);

    async fn wait_for(
        rx: &mut watch::Receiver<SessionView>,
        pred: impl FnMut(&SessionView) -> bool,
    ) -> SessionView {
        tokio::time::timeout(TIMEOUT, rx.wait_for(pred))
            .await
            .expect("view within timeout")
            .expect("driver alive")
            .clone()
    }

    fn fake_driver() -> (
        FakeConnector,
        mpsc::UnboundedSender<TransportEvent>,
        SessionHandle,
        JoinHandle<()>,
    ) {
        let connector = FakeConnector::default();
        let session = BridgeSession::new(
            BridgeConfig::default(),
            connector.clone(),
            SequentialIdSource::new(),
            "ws://robot:9090",
        );
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (driver, handle) = SessionDriver::new(session, event_rx);
        let task = tokio::spawn(driver.run());
        (connector, event_tx, handle, task)
    }

    async fn open(
        connector: &FakeConnector,
        events: &mpsc::UnboundedSender<TransportEvent>,
        handle: &SessionHandle,
    ) -> SocketId {
        let mut view = handle.watch();
        handle.connect(None);
        wait_for(&mut view, |v| v.state == ConnectionState::Connecting).await;
        let id = connector.last_socket().unwrap();
        events
            .send(TransportEvent::new(id, TransportEventKind::Open))
            .unwrap();
        wait_for(&mut view, |v| v.state == ConnectionState::Connected).await;
        id
    }

    #[tokio::test]
    async fn driver_applies_events_and_publishes_view() {
        let (connector, events, handle, _task) = fake_driver();
        let id = open(&connector, &events, &handle).await;
        assert_eq!(connector.sent().len(), 3);

        events
            .send(TransportEvent::new(
                id,
                TransportEventKind::Message(
                    br#"{"op":"publish","topic":"/battery_status","msg":{"percentage":0.42}}"#.to_vec(),
                ),
            ))
            .unwrap();
        let mut view = handle.watch();
        let v = wait_for(&mut view, |v| v.snapshot.battery_percent.is_some()).await;
        assert_eq!(v.snapshot.battery_percent, Some(42.0));
        assert_eq!(v.endpoint, "ws://robot:9090");
    }

    #[tokio::test]
    async fn emergency_stop_is_broadcast_as_notice() {
        let (connector, events, handle, _task) = fake_driver();
        open(&connector, &events, &handle).await;
        let mut notices = handle.notices();

        handle.send_velocity(0.2, 0.0);
        handle.emergency_stop();

        let mut seen = Vec::new();
        while !seen.contains(&Notice::EmergencyStopIssued) {
            seen.push(tokio::time::timeout(TIMEOUT, notices.recv()).await.unwrap().unwrap());
        }
        let publishes: Vec<Value> = connector
            .sent()
            .into_iter()
            .filter(|f| f["op"] == "publish")
            .collect();
        assert_eq!(publishes.len(), 2);
        assert_eq!(publishes[1]["msg"]["linear"]["x"], 0.0);
    }

    #[tokio::test]
    async fn publish_while_disconnected_surfaces_error() {
        let (connector, _events, handle, _task) = fake_driver();
        let mut view = handle.watch();
        handle.send(SessionCommand::Send(OutboundCommand::Text {
            topic: "/robot_cmd".to_string(),
            data: "dock".to_string(),
        }));
        let v = wait_for(&mut view, |v| v.last_error.is_some()).await;
        assert!(matches!(v.last_error, Some(SessionError::Precondition(_))));
        assert!(connector.sent().is_empty());
    }

    #[tokio::test]
    async fn shutdown_disconnects_and_stops() {
        let (connector, events, handle, task) = fake_driver();
        open(&connector, &events, &handle).await;
        handle.shutdown();
        tokio::time::timeout(TIMEOUT, task).await.unwrap().unwrap();
        assert_eq!(connector.live_sockets(), 0);
        assert_eq!(handle.view().state, ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn dropping_every_handle_disconnects_and_stops() {
        let (connector, events, handle, task) = fake_driver();
        open(&connector, &events, &handle).await;
        drop(handle);
        tokio::time::timeout(TIMEOUT, task).await.unwrap().unwrap();
        assert_eq!(connector.live_sockets(), 0);
    }

    #[tokio::test]
    async fn commands_after_shutdown_are_not_applied() {
        let (connector, events, handle, task) = fake_driver();
        open(&connector, &events, &handle).await;
        handle.shutdown();
        handle.connect(None);
        tokio::time::timeout(TIMEOUT, task).await.unwrap().unwrap();
        assert_eq!(connector.opened_count(), 1);
        assert_eq!(connector.live_sockets(), 0);
    }

    #[tokio::test]
    async fn end_to_end_over_websocket() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            let mut topics = Vec::new();
            while topics.len() < 3 {
                if let Some(Ok(Message::Text(t))) = ws.next().await {
                    let frame: Value = serde_json::from_str(t.as_str()).unwrap();
                    assert_eq!(frame["op"], "subscribe");
                    topics.push(frame["topic"].as_str().unwrap().to_string());
                }
            }
            ws.send(Message::Text(
                r#"{"op":"publish","topic":"/battery_status","msg":{"percentage":0.755}}"#.into(),
            ))
            .await
            .unwrap();
            // Wait for the velocity command.
            loop {
                if let Some(Ok(Message::Text(t))) = ws.next().await {
                    let frame: Value = serde_json::from_str(t.as_str()).unwrap();
                    if frame["op"] == "publish" {
                        return (topics, frame);
                    }
                }
            }
        });

        let (handle, _task) = spawn_ws_session(
            BridgeConfig::default(),
            format!("ws://{addr}"),
            &Handle::current(),
        );
        let mut view = handle.watch();
        handle.connect(None);
        let v = wait_for(&mut view, |v| v.snapshot.battery_percent.is_some()).await;
        assert_eq!(v.state, ConnectionState::Connected);
        assert!((v.snapshot.battery_percent.unwrap() - 75.5).abs() < 1e-9);

        handle.send_velocity(0.3, -0.1);
        let (topics, publish) = tokio::time::timeout(TIMEOUT, server).await.unwrap().unwrap();
        assert_eq!(topics, ["/battery_status", "/odom", "/robot_status_app"]);
        assert_eq!(publish["topic"], "/cmd_vel");
        assert_eq!(publish["msg"]["linear"]["x"], 0.3);
        assert_eq!(publish["msg"]["angular"]["z"], -0.1);
    }
}
