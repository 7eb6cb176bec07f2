use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures::stream::StreamExt;
use tokio::sync::broadcast;
use tokio::time::{interval, sleep_until, Instant};
use tracing::{debug, warn};

use crate::config::HeartbeatConfig;
use crate::event::RoomEvent;
use crate::websockets::session::RoomSession;

/// What the transport hands the run loop per poll
#[derive(Debug)]
pub enum SocketEvent {
    /// A text frame from the client
    Text(String),
    /// Inbound traffic that only proves the client is alive
    Pong,
    /// The client closed or the transport dropped
    Closed,
}

/// Simple WebSocket abstraction - all we care about is send/receive/ping
#[async_trait]
pub trait SocketWrapper: Send {
    /// Send a text message to the client
    async fn send_message(&mut self, message: String) -> Result<(), SocketError>;

    /// Send a liveness ping
    async fn send_ping(&mut self) -> Result<(), SocketError>;

    /// Receive the next event from the client
    async fn receive(&mut self) -> Result<SocketEvent, SocketError>;

    /// Close the connection
    async fn close(&mut self) -> Result<(), SocketError>;
}

#[derive(Debug)]
pub enum SocketError {
    SendFailed(String),
    ReceiveFailed(String),
}

/// Direct implementation on axum's WebSocket
#[async_trait]
impl SocketWrapper for WebSocket {
    async fn send_message(&mut self, message: String) -> Result<(), SocketError> {
        self.send(Message::Text(message))
            .await
            .map_err(|e| SocketError::SendFailed(e.to_string()))
    }

    async fn send_ping(&mut self) -> Result<(), SocketError> {
        self.send(Message::Ping(Vec::new()))
            .await
            .map_err(|e| SocketError::SendFailed(e.to_string()))
    }

    async fn receive(&mut self) -> Result<SocketEvent, SocketError> {
        match self.next().await {
            Some(Ok(Message::Text(text))) => Ok(SocketEvent::Text(text)),
            Some(Ok(Message::Close(_))) => Ok(SocketEvent::Closed),
            // Pongs, client pings and binary frames all count as liveness
            Some(Ok(_)) => Ok(SocketEvent::Pong),
            Some(Err(e)) => Err(SocketError::ReceiveFailed(e.to_string())),
            None => Ok(SocketEvent::Closed),
        }
    }

    async fn close(&mut self) -> Result<(), SocketError> {
        self.send(Message::Close(None))
            .await
            .map_err(|e| SocketError::SendFailed(e.to_string()))
    }
}

/// Connection represents a managed WebSocket connection bound to one room
/// session. It relays inbound frames into the room, writes room events
/// back out to the client, and enforces the heartbeat.
pub struct Connection {
    socket: Box<dyn SocketWrapper>,
    session: RoomSession,
    events: broadcast::Receiver<RoomEvent>,
    heartbeat: HeartbeatConfig,
}

impl Connection {
    pub fn new(
        socket: Box<dyn SocketWrapper>,
        session: RoomSession,
        events: broadcast::Receiver<RoomEvent>,
        heartbeat: HeartbeatConfig,
    ) -> Self {
        Self {
            socket,
            session,
            events,
            heartbeat,
        }
    }

    /// Run the connection until the client disconnects, the heartbeat
    /// lapses, or the transport errors. Whatever the exit path, the session
    /// leaves its room before this returns.
    pub async fn run(mut self) -> Result<(), SocketError> {
        let result = self.drive().await;

        let _ = self.socket.close().await;
        self.session.leave().await;

        result
    }

    async fn drive(&mut self) -> Result<(), SocketError> {
        let mut ping_timer = interval(self.heartbeat.ping_interval);
        // A connection is dropped once nothing has arrived for a full ping
        // round plus the grace period; inbound traffic pushes the deadline
        let liveness_window = self.heartbeat.ping_interval + self.heartbeat.ping_timeout;
        let mut deadline = Instant::now() + liveness_window;

        loop {
            tokio::select! {
                _ = ping_timer.tick() => {
                    self.socket.send_ping().await?;
                }

                // The drop lands exactly at the window, not at whatever
                // ping tick happens to come after it
                _ = sleep_until(deadline) => {
                    debug!(
                        connection_id = %self.session.connection_id(),
                        "Heartbeat lapsed, dropping connection"
                    );
                    break;
                }

                // Room events headed to this client - local emits and
                // fan-out mirrors alike
                event = self.events.recv() => {
                    match event {
                        Ok(event) => {
                            if let Some(frame) = self.session.frame_for(&event) {
                                self.socket.send_message(frame).await?;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(
                                connection_id = %self.session.connection_id(),
                                skipped,
                                "Event stream lagged, frames dropped"
                            );
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }

                // Inbound frames from the client
                received = self.socket.receive() => {
                    match received {
                        Ok(SocketEvent::Text(text)) => {
                            deadline = Instant::now() + liveness_window;
                            self.session.handle_frame(&text).await;
                        }
                        Ok(SocketEvent::Pong) => {
                            deadline = Instant::now() + liveness_window;
                        }
                        Ok(SocketEvent::Closed) => break,
                        Err(e) => return Err(e),
                    }
                }
            }
        }

        Ok(())
    }
}
