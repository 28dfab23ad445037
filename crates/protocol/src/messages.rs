//! JSON wire messages exchanged between a client and the arena server.

use serde::{Deserialize, Serialize};

use crate::Color;

/// Discrete action a client can request on its own player (spec §4.10).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActionKind {
    Split,
    DoubleSplit,
    TripleSplit,
    Split16,
    Split32,
    Feed,
    MacroFeed,
    Stop,
    Respawn,
}

/// `{dirX, dirY, cursorX, cursorY}` — movement input for one tick.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputPayload {
    pub dir_x: f32,
    pub dir_y: f32,
    pub cursor_x: f32,
    pub cursor_y: f32,
}

/// `{type: <action-name>}`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ActionPayload {
    #[serde(rename = "type")]
    pub kind: ActionKind,
}

/// Every inbound message a connection can send, tagged by `type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    Input { input: InputPayload },
    Action { action: ActionPayload },
    SetName { name: String },
    Ping { timestamp: f64 },
}

/// Echoed to the client once per connection with the values it needs to
/// interpret snapshots (map size, merge mode).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitConfig {
    pub map_width: f32,
    pub map_height: f32,
    pub instant_merge: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CellSnapshot {
    pub id: u32,
    pub x: f32,
    pub y: f32,
    pub mass: f32,
    pub owner_id: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSnapshot {
    pub id: u32,
    pub name: String,
    pub score: u32,
    pub color: Color,
    pub is_bot: bool,
    pub cells: Vec<CellSnapshot>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PelletSnapshot {
    pub id: u32,
    pub x: f32,
    pub y: f32,
    pub mass: f32,
    pub color: Color,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirusSnapshot {
    pub id: u32,
    pub x: f32,
    pub y: f32,
    pub mass: f32,
    pub color: Color,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedPelletSnapshot {
    pub id: u32,
    pub x: f32,
    pub y: f32,
    pub mass: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirusProjectileSnapshot {
    pub id: u32,
    pub x: f32,
    pub y: f32,
    pub mass: f32,
}

/// Every outbound message the server can send, tagged by `type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    Init {
        player_id: u32,
        config: InitConfig,
    },
    Pong {
        timestamp: f64,
    },
    Snapshot {
        timestamp: i64,
        players: Vec<PlayerSnapshot>,
        pellets: Vec<PelletSnapshot>,
        viruses: Vec<VirusSnapshot>,
        feed_pellets: Vec<FeedPelletSnapshot>,
        virus_projectiles: Vec<VirusProjectileSnapshot>,
    },
}

/// Round coordinates to one decimal and mass to the nearest integer — a
/// size optimization permitted by spec since clients re-interpolate.
#[inline]
pub fn round_coord(v: f32) -> f32 {
    (v * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_message_tag_round_trips() {
        let msg = ClientMessage::Input {
            input: InputPayload { dir_x: 1.0, dir_y: 0.0, cursor_x: 10.0, cursor_y: 20.0 },
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"input\""));
        let back: ClientMessage = serde_json::from_str(&json).unwrap();
        match back {
            ClientMessage::Input { input } => assert_eq!(input.cursor_y, 20.0),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn action_kind_uses_camel_case() {
        let payload = ActionPayload { kind: ActionKind::DoubleSplit };
        let json = serde_json::to_string(&payload).unwrap();
        assert_eq!(json, "{\"type\":\"doubleSplit\"}");
    }

    #[test]
    fn round_coord_rounds_to_one_decimal() {
        assert_eq!(round_coord(10.37), 10.4);
        assert_eq!(round_coord(-0.04), 0.0);
    }
}
