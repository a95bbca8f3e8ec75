//! Socket Mode transport over tokio-tungstenite

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use super::api::SlackApi;
use super::connection::{EventStream, Transport};
use super::events::{ack_frame, decode_frame, recover_envelope_id, SocketEvent};
use super::TransportError;

/// No frame at all (pings included) for this long ends the session.
const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(120);

pub struct SocketModeTransport {
    api: Arc<SlackApi>,
    idle_timeout: Duration,
}

impl SocketModeTransport {
    pub fn new(api: Arc<SlackApi>) -> Self {
        Self {
            api,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }
}

#[async_trait]
impl Transport for SocketModeTransport {
    async fn authenticate(&self) -> Result<(), TransportError> {
        let identity = self.api.auth_test().await?;
        log::debug!("auth.test ok (team={}, bot={})", identity.team, identity.user_id);
        Ok(())
    }

    async fn open_session(&self) -> Result<Box<dyn EventStream>, TransportError> {
        let url = self.api.open_connection().await?;
        let (socket, _response) = connect_async(url.as_str()).await?;
        log::info!("   ├─ WebSocket connected");
        Ok(Box::new(SocketModeStream {
            socket,
            idle_timeout: self.idle_timeout,
        }))
    }
}

struct SocketModeStream {
    socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
    idle_timeout: Duration,
}

#[async_trait]
impl EventStream for SocketModeStream {
    async fn next_event(&mut self) -> Result<Option<SocketEvent>, TransportError> {
        loop {
            let message = match timeout(self.idle_timeout, self.socket.next()).await {
                Err(_) => {
                    return Err(TransportError::Closed(format!(
                        "no frames for {}s",
                        self.idle_timeout.as_secs()
                    )));
                }
                Ok(None) => return Ok(None),
                Ok(Some(message)) => message?,
            };

            match message {
                Message::Text(text) => {
                    let frame = match decode_frame(&text) {
                        Ok(frame) => frame,
                        Err(e) => {
                            // Acked so it is not redelivered.
                            match recover_envelope_id(&text) {
                                Some(envelope_id) => {
                                    log::warn!(
                                        "⚠️  Undecodable Socket Mode envelope {}, acked and skipped: {}",
                                        envelope_id,
                                        e
                                    );
                                    self.socket
                                        .send(Message::Text(ack_frame(&envelope_id).into()))
                                        .await?;
                                }
                                None => log::warn!("⚠️  Undecodable Socket Mode frame: {}", e),
                            }
                            continue;
                        }
                    };
                    // Ack before hand-off.
                    if let Some(envelope_id) = &frame.envelope_id {
                        self.socket.send(Message::Text(ack_frame(envelope_id).into())).await?;
                    }
                    return Ok(Some(frame.event));
                }
                Message::Close(frame) => {
                    log::info!("WebSocket close frame: {:?}", frame);
                    return Ok(None);
                }
                // Pings are answered by tungstenite itself.
                _ => continue,
            }
        }
    }
}
