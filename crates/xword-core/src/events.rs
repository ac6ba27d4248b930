//! Game event model
//!
//! Every change to a game travels as a small typed event:
//!
//! ```text
//! {"id": "<uuid>", "type": "updateCell", "timestamp": 1700000000000,
//!  "params": {"id": "<user>", "cell": {"r": 0, "c": 0}, "value": "A"}}
//! ```
//!
//! Decoding is per variant and dispatched on the `type` string. A malformed
//! event fails on its own; unknown types decode to
//! [`EventKind::Unrecognized`] and are ignored by the engine.
//!
//! Outbound events never carry a client timestamp. They ask the server to
//! stamp them so every participant agrees on ordering.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use uuid::Uuid;

use crate::grid::{Clues, Grid};
use crate::models::{ChatMessage, Coordinates};

/// Wire names of the event types
pub mod kinds {
    pub const UPDATE_CURSOR: &str = "updateCursor";
    pub const UPDATE_CELL: &str = "updateCell";
    pub const UPDATE_COLOR: &str = "updateColor";
    pub const UPDATE_DISPLAY_NAME: &str = "updateDisplayName";
    pub const ADD_PING: &str = "addPing";
    pub const CHECK: &str = "check";
    pub const REVEAL: &str = "reveal";
    pub const RESET: &str = "reset";
    pub const CHAT: &str = "chat";
    pub const CREATE: &str = "create";
}

/// Errors decoding a single event
#[derive(Error, Debug)]
pub enum DecodeError {
    /// The event envelope is not an object with a string `type`
    #[error("malformed event envelope: {0}")]
    Envelope(#[source] serde_json::Error),

    /// Params are missing or mistyped for the event type
    #[error("invalid params for '{kind}' event: {source}")]
    Params {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateCursor {
    #[serde(rename = "id")]
    pub user_id: String,
    pub cell: Coordinates,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateCell {
    #[serde(rename = "id")]
    pub user_id: String,
    pub cell: Coordinates,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pencil: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autocheck: Option<bool>,
}

impl UpdateCell {
    /// The entered value, `None` when the event clears the square
    pub fn entered_value(&self) -> Option<&str> {
        self.value.as_deref().filter(|v| !v.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateColor {
    #[serde(rename = "id")]
    pub user_id: String,
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateDisplayName {
    #[serde(rename = "id")]
    pub user_id: String,
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddPing {
    #[serde(rename = "id")]
    pub user_id: String,
    pub cell: Coordinates,
}

/// Target squares of a check, reveal or reset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scope {
    pub scope: Vec<Coordinates>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    pub sender_id: String,
    #[serde(default)]
    pub sender: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_message_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PuzzleInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PuzzleGame {
    /// Answer rows; `"."` or null marks a block
    pub solution: Vec<Vec<Option<String>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clues: Option<Clues>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<PuzzleInfo>,
}

/// Full puzzle payload carried by a `create` event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatePuzzle {
    pub pid: String,
    pub game: PuzzleGame,
}

impl CreatePuzzle {
    pub fn grid(&self) -> Grid {
        Grid::from_optional_rows(self.game.solution.clone())
    }

    pub fn clues(&self) -> Clues {
        self.game.clues.clone().unwrap_or_default()
    }
}

/// Typed payload of an event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    UpdateCursor(UpdateCursor),
    UpdateCell(UpdateCell),
    UpdateColor(UpdateColor),
    UpdateDisplayName(UpdateDisplayName),
    AddPing(AddPing),
    Check(Scope),
    Reveal(Scope),
    Reset(Scope),
    Chat(Chat),
    Create(CreatePuzzle),
    /// A type this client does not know; carried so it can be logged
    Unrecognized(String),
}

impl EventKind {
    /// Wire name of the type
    pub fn type_name(&self) -> &str {
        match self {
            EventKind::UpdateCursor(_) => kinds::UPDATE_CURSOR,
            EventKind::UpdateCell(_) => kinds::UPDATE_CELL,
            EventKind::UpdateColor(_) => kinds::UPDATE_COLOR,
            EventKind::UpdateDisplayName(_) => kinds::UPDATE_DISPLAY_NAME,
            EventKind::AddPing(_) => kinds::ADD_PING,
            EventKind::Check(_) => kinds::CHECK,
            EventKind::Reveal(_) => kinds::REVEAL,
            EventKind::Reset(_) => kinds::RESET,
            EventKind::Chat(_) => kinds::CHAT,
            EventKind::Create(_) => kinds::CREATE,
            EventKind::Unrecognized(name) => name,
        }
    }

    fn params(&self) -> Value {
        let encoded = match self {
            EventKind::UpdateCursor(p) => serde_json::to_value(p),
            EventKind::UpdateCell(p) => serde_json::to_value(p),
            EventKind::UpdateColor(p) => serde_json::to_value(p),
            EventKind::UpdateDisplayName(p) => serde_json::to_value(p),
            EventKind::AddPing(p) => serde_json::to_value(p),
            EventKind::Check(p) | EventKind::Reveal(p) | EventKind::Reset(p) => {
                serde_json::to_value(p)
            }
            EventKind::Chat(p) => serde_json::to_value(p),
            EventKind::Create(p) => serde_json::to_value(p),
            EventKind::Unrecognized(_) => Ok(Value::Null),
        };
        // Params are plain structs of strings and numbers
        encoded.unwrap_or(Value::Null)
    }
}

/// One event of the game log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameEvent {
    /// Client-generated uuid
    pub id: String,
    /// Server-assigned milliseconds; absent until stamped
    pub timestamp: Option<i64>,
    pub kind: EventKind,
}

#[derive(Deserialize)]
struct RawEvent {
    #[serde(default)]
    id: Option<String>,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    timestamp: Value,
    #[serde(default)]
    params: Value,
}

fn params<T: DeserializeOwned>(kind: &str, value: Value) -> Result<T, DecodeError> {
    serde_json::from_value(value).map_err(|source| DecodeError::Params {
        kind: kind.to_string(),
        source,
    })
}

impl GameEvent {
    /// New locally-authored event with a fresh id
    pub fn new(kind: EventKind) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: None,
            kind,
        }
    }

    /// Decode one event object
    pub fn decode(value: &Value) -> Result<Self, DecodeError> {
        let raw: RawEvent =
            serde_json::from_value(value.clone()).map_err(DecodeError::Envelope)?;
        let name = raw.kind.as_str();

        let kind = match name {
            kinds::UPDATE_CURSOR => EventKind::UpdateCursor(params(name, raw.params)?),
            kinds::UPDATE_CELL => EventKind::UpdateCell(params(name, raw.params)?),
            kinds::UPDATE_COLOR => EventKind::UpdateColor(params(name, raw.params)?),
            kinds::UPDATE_DISPLAY_NAME => {
                EventKind::UpdateDisplayName(params(name, raw.params)?)
            }
            kinds::ADD_PING => EventKind::AddPing(params(name, raw.params)?),
            kinds::CHECK => EventKind::Check(params(name, raw.params)?),
            kinds::REVEAL => EventKind::Reveal(params(name, raw.params)?),
            kinds::RESET => EventKind::Reset(params(name, raw.params)?),
            kinds::CHAT => EventKind::Chat(params(name, raw.params)?),
            kinds::CREATE => EventKind::Create(params(name, raw.params)?),
            other => EventKind::Unrecognized(other.to_string()),
        };

        Ok(Self {
            id: raw.id.unwrap_or_default(),
            // The server sentinel or anything non-numeric means "not stamped"
            timestamp: raw.timestamp.as_i64(),
            kind,
        })
    }

    /// Decode a batch payload: an array of events or a single event object
    pub fn decode_batch(payload: &Value) -> Vec<Result<Self, DecodeError>> {
        match payload {
            Value::Array(items) => items.iter().map(Self::decode).collect(),
            other => vec![Self::decode(other)],
        }
    }

    /// Event object as sent to the server, timestamp left for the server to fill
    pub fn to_wire(&self) -> Value {
        json!({
            "id": self.id,
            "type": self.kind.type_name(),
            "timestamp": {".sv": "timestamp"},
            "params": self.kind.params(),
        })
    }

    /// The `game_event` envelope for this event
    pub fn outbound(&self, game_id: &str) -> Value {
        json!({
            "event": self.to_wire(),
            "gameId": game_id,
        })
    }

    pub fn type_name(&self) -> &str {
        self.kind.type_name()
    }

    /// Identity used to decide which in-flight local event represents the
    /// user's intent for a target. `None` for types that are not deduplicated.
    pub fn dedup_key(&self) -> Option<String> {
        match &self.kind {
            EventKind::UpdateCell(p) => {
                Some(format!("{},{},{}", kinds::UPDATE_CELL, p.cell.r, p.cell.c))
            }
            EventKind::UpdateColor(_) => Some(kinds::UPDATE_COLOR.to_string()),
            EventKind::UpdateDisplayName(_) => Some(kinds::UPDATE_DISPLAY_NAME.to_string()),
            EventKind::AddPing(p) => Some(format!(
                "{},{},{},{}",
                kinds::ADD_PING,
                p.user_id,
                p.cell.r,
                p.cell.c
            )),
            _ => None,
        }
    }

    pub fn is_dedupable(&self) -> bool {
        self.dedup_key().is_some()
    }

    /// The user this event speaks for, if any
    pub fn user_id(&self) -> Option<&str> {
        match &self.kind {
            EventKind::UpdateCursor(p) => Some(&p.user_id),
            EventKind::UpdateCell(p) => Some(&p.user_id),
            EventKind::UpdateColor(p) => Some(&p.user_id),
            EventKind::UpdateDisplayName(p) => Some(&p.user_id),
            EventKind::AddPing(p) => Some(&p.user_id),
            EventKind::Chat(p) => Some(&p.sender_id),
            _ => None,
        }
    }

    /// Chat payload as an observer-facing message
    pub fn chat_message(&self) -> Option<ChatMessage> {
        match &self.kind {
            EventKind::Chat(chat) => Some(ChatMessage {
                sender_id: chat.sender_id.clone(),
                sender: chat.sender.clone(),
                text: chat.text.clone(),
                client_message_id: chat.client_message_id.clone(),
                timestamp: self.timestamp,
            }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_update_cell() {
        let value = json!({
            "id": "e1",
            "type": "updateCell",
            "timestamp": 1_700_000_000_000i64,
            "params": {"id": "u1", "cell": {"r": 1, "c": 2}, "value": "Q", "autocheck": true}
        });
        let event = GameEvent::decode(&value).unwrap();
        assert_eq!(event.id, "e1");
        assert_eq!(event.timestamp, Some(1_700_000_000_000));
        match event.kind {
            EventKind::UpdateCell(ref p) => {
                assert_eq!(p.user_id, "u1");
                assert_eq!(p.cell, Coordinates::new(1, 2));
                assert_eq!(p.entered_value(), Some("Q"));
                assert_eq!(p.autocheck, Some(true));
            }
            ref other => panic!("Expected updateCell, got {:?}", other),
        }
        assert_eq!(event.dedup_key().as_deref(), Some("updateCell,1,2"));
        assert_eq!(event.user_id(), Some("u1"));
    }

    #[test]
    fn test_decode_missing_params_fails() {
        let value = json!({"id": "e1", "type": "updateCell", "params": {"id": "u1"}});
        let err = GameEvent::decode(&value).unwrap_err();
        assert!(matches!(err, DecodeError::Params { ref kind, .. } if kind == "updateCell"));
    }

    #[test]
    fn test_decode_mistyped_envelope_fails() {
        let err = GameEvent::decode(&json!({"type": 7})).unwrap_err();
        assert!(matches!(err, DecodeError::Envelope(_)));
        assert!(GameEvent::decode(&json!("nope")).is_err());
    }

    #[test]
    fn test_unknown_type_is_unrecognized() {
        let event = GameEvent::decode(&json!({"id": "e9", "type": "startTimer"})).unwrap();
        assert_eq!(event.kind, EventKind::Unrecognized("startTimer".into()));
        assert!(!event.is_dedupable());
    }

    #[test]
    fn test_sentinel_timestamp_decodes_as_absent() {
        let value = json!({
            "id": "e1",
            "type": "check",
            "timestamp": {".sv": "timestamp"},
            "params": {"scope": [{"r": 0, "c": 0}]}
        });
        let event = GameEvent::decode(&value).unwrap();
        assert_eq!(event.timestamp, None);
    }

    #[test]
    fn test_decode_batch_keeps_going_past_bad_events() {
        let payload = json!([
            {"id": "a", "type": "reset", "params": {"scope": []}},
            {"id": "b", "type": "reset"},
            {"id": "c", "type": "updateColor", "params": {"id": "u1", "color": "hsl(1,2%,3%)"}}
        ]);
        let results = GameEvent::decode_batch(&payload);
        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
        assert!(results[2].is_ok());

        let single = GameEvent::decode_batch(&json!({"id": "d", "type": "reset", "params": {"scope": []}}));
        assert_eq!(single.len(), 1);
    }

    #[test]
    fn test_outbound_envelope() {
        let event = GameEvent::new(EventKind::UpdateDisplayName(UpdateDisplayName {
            user_id: "u1".into(),
            display_name: "Ada".into(),
        }));
        let wire = event.outbound("g1");
        assert_eq!(wire["gameId"], "g1");
        assert_eq!(wire["event"]["type"], "updateDisplayName");
        assert_eq!(wire["event"]["id"], event.id.as_str());
        assert_eq!(wire["event"]["timestamp"][".sv"], "timestamp");
        assert_eq!(wire["event"]["params"]["displayName"], "Ada");
        assert_eq!(wire["event"]["params"]["id"], "u1");

        let decoded = GameEvent::decode(&wire["event"]).unwrap();
        assert_eq!(decoded.kind, event.kind);
    }

    #[test]
    fn test_dedup_keys() {
        let ping = GameEvent::new(EventKind::AddPing(AddPing {
            user_id: "u1".into(),
            cell: Coordinates::new(2, 3),
        }));
        assert_eq!(ping.dedup_key().as_deref(), Some("addPing,u1,2,3"));

        let color = GameEvent::new(EventKind::UpdateColor(UpdateColor {
            user_id: "u1".into(),
            color: "hsl(0,0%,0%)".into(),
        }));
        assert_eq!(color.dedup_key().as_deref(), Some("updateColor"));

        let cursor = GameEvent::new(EventKind::UpdateCursor(UpdateCursor {
            user_id: "u1".into(),
            cell: Coordinates::new(0, 0),
            timestamp: None,
        }));
        assert!(cursor.dedup_key().is_none());
    }

    #[test]
    fn test_create_payload_builds_grid() {
        let value = json!({
            "id": "c1",
            "type": "create",
            "params": {
                "pid": "p1",
                "game": {
                    "solution": [["A", "B"], [".", "C"]],
                    "clues": {"across": [null, "First"], "down": []},
                    "info": {"title": "Mini"}
                }
            }
        });
        let event = GameEvent::decode(&value).unwrap();
        let EventKind::Create(create) = event.kind else {
            panic!("Expected create");
        };
        let grid = create.grid();
        assert_eq!(grid.rows(), 2);
        assert!(grid.cell(Coordinates::new(1, 0)).unwrap().is_block());
        assert_eq!(create.clues().across[1].as_deref(), Some("First"));
    }

    #[test]
    fn test_chat_message_carries_client_id() {
        let value = json!({
            "id": "m1",
            "type": "chat",
            "timestamp": 42,
            "params": {"senderId": "u2", "sender": "Bo", "text": "hello", "clientMessageId": "cm-1"}
        });
        let event = GameEvent::decode(&value).unwrap();
        let msg = event.chat_message().unwrap();
        assert_eq!(msg.client_message_id.as_deref(), Some("cm-1"));
        assert_eq!(msg.timestamp, Some(42));
        assert_eq!(event.user_id(), Some("u2"));
    }
}
