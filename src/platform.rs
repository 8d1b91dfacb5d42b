//! Host-provided extension points.
//!
//! The engine performs no I/O of its own: framing and transport, correlation
//! id generation and the wall clock all come from the object injected at
//! construction time. Everything here must be non-blocking; the engine polls.

use crate::error::Error;
use crate::message::Message;
use log::info;
use std::time::{SystemTime, UNIX_EPOCH};

pub trait Platform {
    /// Serialize and transmit one message. `Ok` means the frame was fully
    /// handed to the transport; any error puts the message on the retry
    /// path.
    fn send(&mut self, msg: &Message) -> Result<(), Error>;

    /// Deserialize one pending inbound frame. Must return
    /// [`Error::NoMessage`] immediately when nothing is pending.
    fn recv(&mut self) -> Result<Message, Error>;

    /// Produce a fresh opaque correlation id. Ids longer than
    /// [`MESSAGE_ID_MAXLEN`](crate::message::MESSAGE_ID_MAXLEN) are truncated
    /// by the engine.
    fn generate_message_id(&mut self) -> String;

    /// Seconds of wall clock. All scheduling arithmetic uses this value.
    fn now(&self) -> u64;
}

/// Transportless backend: logs outbound frames in OCPP-J shape and never has
/// anything to receive. Useful for bring-up and demos before a real
/// WebSocket transport exists.
#[derive(Default)]
pub struct NullPlatform {
    next_id: u64,
}

impl NullPlatform {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Platform for NullPlatform {
    fn send(&mut self, msg: &Message) -> Result<(), Error> {
        info!("tx {}", frame_json(msg));
        Ok(())
    }

    fn recv(&mut self) -> Result<Message, Error> {
        Err(Error::NoMessage)
    }

    fn generate_message_id(&mut self) -> String {
        self.next_id += 1;
        format!("{:08x}", self.next_id)
    }

    fn now(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}

/// Renders a message as the OCPP-J array it would travel as.
pub fn frame_json(msg: &Message) -> String {
    let body = serde_json::to_value(&msg.payload)
        .ok()
        .and_then(|v| v.as_object().and_then(|o| o.values().next().cloned()).or(Some(v)))
        .unwrap_or(serde_json::Value::Null);
    let frame = match msg.role {
        crate::message::Role::Call => {
            serde_json::json!([2, msg.id, msg.kind.as_str(), body])
        }
        crate::message::Role::CallResult => serde_json::json!([3, msg.id, body]),
        crate::message::Role::CallError => serde_json::json!([4, msg.id, body]),
        _ => serde_json::json!([0, msg.id]),
    };
    frame.to_string()
}
