//! Wire frames
//!
//! Named events travel as JSON text frames. A frame sent with an `ack`
//! number asks the peer to answer with an acknowledgement frame carrying
//! the same number:
//!
//! ```text
//! -> {"event": "sync_all_game_events", "data": "game-1", "ack": 3}
//! <- {"ack": 3, "data": [ ...events... ]}
//! <- {"event": "game_event", "data": {...}}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Event names used by the game protocol
pub mod names {
    /// Join the room of a game
    pub const JOIN_GAME: &str = "join_game";
    /// Request the full ordered event log
    pub const SYNC_ALL_GAME_EVENTS: &str = "sync_all_game_events";
    /// One event, or a batch, in either direction
    pub const GAME_EVENT: &str = "game_event";
}

/// Acknowledgement number
pub type AckId = u64;

/// Frame sent to the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientFrame {
    pub event: String,
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ack: Option<AckId>,
}

impl ClientFrame {
    pub fn new(event: &str, data: Value, ack: Option<AckId>) -> Self {
        Self {
            event: event.to_string(),
            data,
            ack,
        }
    }

    /// Encode as frame text
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Frame received from the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServerFrame {
    /// Answer to a frame we sent with an ack number
    Ack {
        ack: AckId,
        #[serde(default)]
        data: Value,
    },
    /// A named event pushed by the server
    Event {
        event: String,
        #[serde(default)]
        data: Value,
    },
}

impl ServerFrame {
    /// Decode frame text
    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_client_frame_encoding() {
        let frame = ClientFrame::new(names::JOIN_GAME, json!("g1"), Some(7));
        let value: Value = serde_json::from_str(&frame.encode().unwrap()).unwrap();
        assert_eq!(value, json!({"event": "join_game", "data": "g1", "ack": 7}));

        let frame = ClientFrame::new(names::GAME_EVENT, json!({}), None);
        let value: Value = serde_json::from_str(&frame.encode().unwrap()).unwrap();
        assert!(value.get("ack").is_none());
    }

    #[test]
    fn test_decode_ack() {
        let frame = ServerFrame::decode(r#"{"ack": 3, "data": [1, 2]}"#).unwrap();
        assert_eq!(
            frame,
            ServerFrame::Ack {
                ack: 3,
                data: json!([1, 2])
            }
        );

        let frame = ServerFrame::decode(r#"{"ack": 4}"#).unwrap();
        assert_eq!(
            frame,
            ServerFrame::Ack {
                ack: 4,
                data: Value::Null
            }
        );
    }

    #[test]
    fn test_decode_event() {
        let frame =
            ServerFrame::decode(r#"{"event": "game_event", "data": {"id": "e1"}}"#).unwrap();
        assert_eq!(
            frame,
            ServerFrame::Event {
                event: "game_event".into(),
                data: json!({"id": "e1"})
            }
        );
    }

    #[test]
    fn test_decode_garbage() {
        assert!(ServerFrame::decode("not json").is_err());
        assert!(ServerFrame::decode(r#"{"foo": 1}"#).is_err());
    }
}
