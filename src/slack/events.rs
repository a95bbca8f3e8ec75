//! Socket Mode frame decoding
//!
//! Frames are decoded into a closed [`SocketEvent`]. Only channel messages are
//! handed on for processing; everything else has an explicit ignore arm.

use serde::Deserialize;

use crate::types::InboundMessage;

#[derive(Debug, Clone, PartialEq)]
pub enum SocketEvent {
    /// Session established upstream; the connection is live.
    Hello,
    /// Upstream asks us to reconnect (e.g. `refresh_requested`, `link_disabled`).
    Disconnect { reason: String },
    /// A user message delivered via the Events API.
    Message(InboundMessage),
    /// An Events API envelope we do not act on.
    Ignored { kind: String },
}

/// A decoded frame together with the envelope id that must be acknowledged.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedFrame {
    pub envelope_id: Option<String>,
    pub event: SocketEvent,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum RawFrame {
    Hello,
    Disconnect {
        #[serde(default)]
        reason: String,
    },
    EventsApi {
        #[serde(default)]
        envelope_id: Option<String>,
        payload: EventsApiPayload,
    },
    SlashCommands {
        #[serde(default)]
        envelope_id: Option<String>,
    },
    Interactive {
        #[serde(default)]
        envelope_id: Option<String>,
    },
    #[serde(other)]
    Unsupported,
}

#[derive(Debug, Deserialize)]
struct EventsApiPayload {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    event: Option<RawEvent>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum RawEvent {
    Message(RawMessage),
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    #[serde(default)]
    channel: String,
    #[serde(default)]
    user: String,
    #[serde(default)]
    subtype: Option<String>,
    #[serde(default)]
    text: String,
    #[serde(default)]
    ts: String,
}

/// Decode one text frame from the socket.
pub fn decode_frame(raw: &str) -> Result<DecodedFrame, serde_json::Error> {
    let frame: RawFrame = serde_json::from_str(raw)?;
    let decoded = match frame {
        RawFrame::Hello => DecodedFrame {
            envelope_id: None,
            event: SocketEvent::Hello,
        },
        RawFrame::Disconnect { reason } => DecodedFrame {
            envelope_id: None,
            event: SocketEvent::Disconnect { reason },
        },
        RawFrame::EventsApi {
            envelope_id,
            payload,
        } => {
            let event = match (payload.kind.as_str(), payload.event) {
                ("event_callback", Some(RawEvent::Message(msg))) => {
                    SocketEvent::Message(InboundMessage {
                        channel_id: msg.channel,
                        actor_id: msg.user,
                        subtype: msg.subtype.filter(|s| !s.is_empty()),
                        text: msg.text,
                        native_ts: msg.ts,
                        envelope_id: envelope_id.clone(),
                    })
                }
                ("event_callback", _) => SocketEvent::Ignored {
                    kind: "event_callback".to_string(),
                },
                (kind, _) => SocketEvent::Ignored {
                    kind: kind.to_string(),
                },
            };
            DecodedFrame { envelope_id, event }
        }
        RawFrame::SlashCommands { envelope_id } => DecodedFrame {
            envelope_id,
            event: SocketEvent::Ignored {
                kind: "slash_commands".to_string(),
            },
        },
        RawFrame::Interactive { envelope_id } => DecodedFrame {
            envelope_id,
            event: SocketEvent::Ignored {
                kind: "interactive".to_string(),
            },
        },
        RawFrame::Unsupported => DecodedFrame {
            envelope_id: None,
            event: SocketEvent::Ignored {
                kind: "unsupported".to_string(),
            },
        },
    };
    Ok(decoded)
}

/// Best-effort envelope id from a frame [`decode_frame`] rejected.
pub fn recover_envelope_id(raw: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(raw).ok()?;
    value
        .get("envelope_id")?
        .as_str()
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

/// Acknowledgement frame for an envelope.
pub fn ack_frame(envelope_id: &str) -> String {
    serde_json::json!({ "envelope_id": envelope_id }).to_string()
}
