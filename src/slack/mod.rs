//! Slack connectivity: Web API client, Socket Mode transport and the
//! reconnecting connection manager.

pub mod api;
pub mod backoff;
pub mod connection;
pub mod events;
pub mod probe;
pub mod socket;

pub use api::{Notifier, SlackApi, UserDirectory, UserInfo};
pub use connection::{ConnectionManager, ConnectionPhase, ConnectionState, EventHandler};
pub use events::SocketEvent;

#[derive(Debug)]
pub enum TransportError {
    Http(reqwest::Error),
    Api(String),
    WebSocket(tokio_tungstenite::tungstenite::Error),
    Decode(serde_json::Error),
    Closed(String),
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportError::Http(e) => write!(f, "HTTP error: {}", e),
            TransportError::Api(msg) => write!(f, "Slack API error: {}", msg),
            TransportError::WebSocket(e) => write!(f, "WebSocket error: {}", e),
            TransportError::Decode(e) => write!(f, "Decode error: {}", e),
            TransportError::Closed(msg) => write!(f, "Connection closed: {}", msg),
        }
    }
}

impl std::error::Error for TransportError {}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        TransportError::Http(err)
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for TransportError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        TransportError::WebSocket(err)
    }
}

impl From<serde_json::Error> for TransportError {
    fn from(err: serde_json::Error) -> Self {
        TransportError::Decode(err)
    }
}
