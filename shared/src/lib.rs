//! Wire contract shared by the tower-clash server and client.
//!
//! Every message travels as a length-prefixed JSON envelope of the form
//! `{"type": "...", "payload": {...}}`. The envelope is decoded once, at the
//! protocol boundary, into the strongly-typed [`Message`] enum; nothing past
//! the codec ever sees untyped JSON.

use serde::{Deserialize, Serialize};
use std::fmt;

pub mod codec;

pub use codec::{encode_frame, read_message, write_message, ProtocolError, MAX_FRAME_LEN};

pub const DEFAULT_PORT: u16 = 8080;

/// Winner value reported when a match ends without a winner.
pub const DRAW_SENTINEL: &str = "DRAW";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Message {
    LoginRequest(Credentials),
    LoginResponse(AuthResponse),
    RegisterRequest(Credentials),
    RegisterResponse(AuthResponse),

    DeployTroopCommand(DeployTroop),
    SkipTurnCommand(SkipTurn),

    GameStartNotification(GameStart),
    GameStateUpdate(GameStateUpdate),
    TurnNotification(TurnNotification),
    ActionResult(ActionResult),
    GameOverNotification(GameOver),
    ErrorNotification(ErrorNotification),
}

impl Message {
    /// Wire name of the message, as written into the envelope's `type` field.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::LoginRequest(_) => "LOGIN_REQUEST",
            Message::LoginResponse(_) => "LOGIN_RESPONSE",
            Message::RegisterRequest(_) => "REGISTER_REQUEST",
            Message::RegisterResponse(_) => "REGISTER_RESPONSE",
            Message::DeployTroopCommand(_) => "DEPLOY_TROOP_COMMAND",
            Message::SkipTurnCommand(_) => "SKIP_TURN_COMMAND",
            Message::GameStartNotification(_) => "GAME_START_NOTIFICATION",
            Message::GameStateUpdate(_) => "GAME_STATE_UPDATE",
            Message::TurnNotification(_) => "TURN_NOTIFICATION",
            Message::ActionResult(_) => "ACTION_RESULT",
            Message::GameOverNotification(_) => "GAME_OVER_NOTIFICATION",
            Message::ErrorNotification(_) => "ERROR_NOTIFICATION",
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Message::ErrorNotification(ErrorNotification {
            error_message: message.into(),
        })
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Credentials {
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeployTroop {
    pub troop_name: String,
    #[serde(rename = "targetTowerID")]
    pub target_tower_id: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct SkipTurn {}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GameStart {
    pub opponent_username: String,
    pub your_player_info: PlayerState,
    pub game_mode: GameMode,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GameStateUpdate {
    pub player_a: PlayerState,
    pub player_b: PlayerState,
    pub current_turn: String,
    pub can_continue_attacking: bool,
    #[serde(default)]
    pub last_action_log: String,
}

impl GameStateUpdate {
    pub fn player(&self, username: &str) -> Option<&PlayerState> {
        [&self.player_a, &self.player_b]
            .into_iter()
            .find(|p| p.username == username)
    }

    pub fn opponent_of(&self, username: &str) -> Option<&PlayerState> {
        [&self.player_a, &self.player_b]
            .into_iter()
            .find(|p| p.username != username)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TurnNotification {
    pub current_turn_username: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ActionResult {
    pub success: bool,
    pub action: String,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GameOver {
    /// Username of the winner, or [`DRAW_SENTINEL`].
    pub winner_username: String,
    pub reason: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ErrorNotification {
    pub error_message: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GameMode {
    Simple,
    Enhanced,
}

/// The three tower slots every player owns.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TowerType {
    #[serde(rename = "KING")]
    King,
    #[serde(rename = "GUARD1")]
    Guard1,
    #[serde(rename = "GUARD2")]
    Guard2,
}

impl TowerType {
    /// Slot order used for snapshots and display: front line first.
    pub const ALL: [TowerType; 3] = [TowerType::Guard1, TowerType::Guard2, TowerType::King];

    pub fn as_str(&self) -> &'static str {
        match self {
            TowerType::King => "KING",
            TowerType::Guard1 => "GUARD1",
            TowerType::Guard2 => "GUARD2",
        }
    }

    /// Builds the stable tower identifier `<owner>_<TYPE>`.
    pub fn tower_id(&self, owner: &str) -> String {
        format!("{}_{}", owner, self.as_str())
    }

    /// Guard Tower 2 and the King Tower sit behind Guard Tower 1.
    pub fn requires_guard1_down(&self) -> bool {
        matches!(self, TowerType::King | TowerType::Guard2)
    }
}

impl fmt::Display for TowerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TowerState {
    pub id: String,
    #[serde(rename = "type")]
    pub tower_type: TowerType,
    #[serde(rename = "currentHP")]
    pub current_hp: u32,
    #[serde(rename = "maxHP")]
    pub max_hp: u32,
    pub attack: u32,
    pub defense: u32,
    pub destroyed: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TroopState {
    pub name: String,
    #[serde(rename = "HP")]
    pub hp: u32,
    pub attack: u32,
    pub defense: u32,
    pub mana_cost: u32,
    #[serde(default)]
    pub special_only: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlayerState {
    pub username: String,
    pub towers: Vec<TowerState>,
    pub troops: Vec<TroopState>,
    pub level: u32,
    #[serde(rename = "currentEXP")]
    pub current_exp: u32,
    #[serde(rename = "requiredEXPForNextLevel")]
    pub required_exp_for_next_level: u32,
    pub current_mana: u32,
    pub max_mana: u32,
}

impl PlayerState {
    pub fn tower(&self, tower_type: TowerType) -> Option<&TowerState> {
        self.towers.iter().find(|t| t.tower_type == tower_type)
    }

    pub fn destroyed_towers(&self) -> usize {
        self.towers.iter().filter(|t| t.destroyed).count()
    }
}
