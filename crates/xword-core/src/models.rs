//! Participant models
//!
//! Coordinates, players, cursors and chat messages. Players and cursors are
//! keyed by user id and created lazily the first time a user is observed.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// A square of the grid, `{r, c}` on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Coordinates {
    pub r: usize,
    pub c: usize,
}

impl Coordinates {
    pub fn new(r: usize, c: usize) -> Self {
        Self { r, c }
    }
}

impl std::fmt::Display for Coordinates {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{},{}", self.r, self.c)
    }
}

/// A participant in the game
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub user_id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    /// HSL color string, e.g. `hsl(210,40%,60%)`
    #[serde(default)]
    pub color: Option<String>,
}

impl Player {
    /// Stub for a user seen before they announced themselves
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: None,
            color: None,
        }
    }

    /// A player is announced once both name and color have been set
    pub fn is_complete(&self) -> bool {
        self.display_name.as_deref().is_some_and(|n| !n.is_empty())
            && self.color.as_deref().is_some_and(|c| !c.is_empty())
    }

    /// Name to show, falling back to the user id
    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.user_id)
    }

    /// Stable per-user HSL color used until the player picks one
    pub fn default_color(user_id: &str) -> String {
        let hue = user_id
            .bytes()
            .fold(0u32, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u32))
            % 360;
        format!("hsl({},40%,60%)", hue)
    }
}

/// Where a player's selection currently sits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    pub player: Player,
    /// `None` until the first `updateCursor` from this player
    pub coordinates: Option<Coordinates>,
    pub timestamp: Option<i64>,
}

impl Cursor {
    pub fn new(player: Player) -> Self {
        Self {
            player,
            coordinates: None,
            timestamp: None,
        }
    }
}

/// A chat line as delivered to observers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub sender_id: String,
    pub sender: String,
    pub text: String,
    /// Id the display layer uses to drop the echo of an optimistic message
    #[serde(default)]
    pub client_message_id: Option<String>,
    #[serde(default)]
    pub timestamp: Option<i64>,
}

impl ChatMessage {
    /// Server timestamp as a date, when the event carried one
    pub fn sent_at(&self) -> Option<DateTime<Utc>> {
        self.timestamp
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_player_completeness() {
        let mut player = Player::new("u1");
        assert!(!player.is_complete());
        assert_eq!(player.label(), "u1");

        player.display_name = Some("Ada".to_string());
        assert!(!player.is_complete());

        player.color = Some("hsl(10,40%,60%)".to_string());
        assert!(player.is_complete());
        assert_eq!(player.label(), "Ada");

        player.display_name = Some(String::new());
        assert!(!player.is_complete());
    }

    #[test]
    fn test_default_color_is_stable() {
        let a = Player::default_color("user-a");
        assert_eq!(a, Player::default_color("user-a"));
        assert!(a.starts_with("hsl("));
    }

    #[test]
    fn test_chat_sent_at() {
        let msg = ChatMessage {
            sender_id: "u1".into(),
            sender: "Ada".into(),
            text: "hi".into(),
            client_message_id: None,
            timestamp: Some(1_700_000_000_000),
        };
        assert_eq!(msg.sent_at().unwrap().timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_coordinates_display() {
        assert_eq!(Coordinates::new(3, 4).to_string(), "3,4");
    }
}
