//! The client's own view of its connection and match.
//!
//! A [`ClientSession`] is owned by one connection's dispatch loop and is the
//! only place the client keeps game state. Server messages are folded into it
//! with [`ClientSession::apply`]; typed commands are turned into wire
//! messages with [`ClientSession::command_message`].

use crate::input::UserCommand;
use crate::rendering::{render_game_over, render_match};
use log::{debug, warn};
use shared::{
    Credentials, DeployTroop, GameOver, GameStateUpdate, Message, PlayerState, SkipTurn, TowerType,
};

#[derive(Debug, Default)]
pub struct ClientSession {
    username: Option<String>,
    pending_login: Option<String>,
    opponent: Option<String>,
    game: Option<GameStateUpdate>,
    game_over: Option<GameOver>,
}

impl ClientSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn opponent(&self) -> Option<&str> {
        self.opponent.as_deref()
    }

    pub fn game(&self) -> Option<&GameStateUpdate> {
        self.game.as_ref()
    }

    pub fn game_over(&self) -> Option<&GameOver> {
        self.game_over.as_ref()
    }

    /// True between game start and game over.
    pub fn in_match(&self) -> bool {
        self.opponent.is_some() && self.game_over.is_none()
    }

    pub fn me(&self) -> Option<&PlayerState> {
        self.game.as_ref()?.player(self.username.as_deref()?)
    }

    pub fn is_my_turn(&self) -> bool {
        match (&self.game, &self.username) {
            (Some(game), Some(me)) => self.in_match() && &game.current_turn == me,
            _ => false,
        }
    }

    /// Folds one server message into the view and returns the lines to show.
    pub fn apply(&mut self, message: Message) -> Vec<String> {
        match message {
            Message::LoginResponse(response) => {
                let pending = self.pending_login.take();
                if response.success {
                    self.username = response.player_id.or(pending);
                }
                vec![response.message]
            }
            Message::RegisterResponse(response) => vec![response.message],
            Message::ErrorNotification(error) => {
                // A failed login attempt is reported this way too.
                self.pending_login = None;
                vec![format!("! {}", error.error_message)]
            }
            Message::GameStartNotification(start) => {
                self.opponent = Some(start.opponent_username.clone());
                self.game = None;
                self.game_over = None;
                vec![format!(
                    "Match found! You are playing against {} ({:?} mode).",
                    start.opponent_username, start.game_mode
                )]
            }
            Message::GameStateUpdate(update) => {
                let mut lines = Vec::new();
                if !update.last_action_log.is_empty() {
                    lines.push(update.last_action_log.clone());
                }
                if let Some(me) = &self.username {
                    lines.push(render_match(&update, me));
                }
                self.game = Some(update);
                lines
            }
            Message::TurnNotification(turn) => {
                if self.username.as_deref() == Some(turn.current_turn_username.as_str()) {
                    vec!["It's your turn! Type 'help' for commands.".to_string()]
                } else {
                    vec![format!("Waiting for {}...", turn.current_turn_username)]
                }
            }
            Message::ActionResult(result) => {
                let status = if result.success { "ok" } else { "failed" };
                if result.success {
                    // The state update that follows carries the same text.
                    debug!("{}: {}", result.action, result.message);
                    vec![format!("[{}] {}", status, result.action)]
                } else {
                    vec![format!("[{}] {}: {}", status, result.action, result.message)]
                }
            }
            Message::GameOverNotification(over) => {
                let line = render_game_over(&over, self.username.as_deref().unwrap_or(""));
                self.game_over = Some(over);
                vec![line]
            }
            other => {
                warn!("Unexpected {} from server", other.kind());
                Vec::new()
            }
        }
    }

    /// Builds the wire message for a command.
    ///
    /// `Ok(None)` means the command is handled locally. Errors are shown to
    /// the user and nothing is sent.
    pub fn command_message(&mut self, command: &UserCommand) -> Result<Option<Message>, String> {
        match command {
            UserCommand::Login { username, password } => {
                if self.username.is_some() {
                    return Err("Already logged in.".to_string());
                }
                self.pending_login = Some(username.clone());
                Ok(Some(Message::LoginRequest(Credentials {
                    username: username.clone(),
                    password: password.clone(),
                })))
            }
            UserCommand::Register { username, password } => {
                Ok(Some(Message::RegisterRequest(Credentials {
                    username: username.clone(),
                    password: password.clone(),
                })))
            }
            UserCommand::Deploy { troop, target } => {
                self.require_turn()?;
                let troop_name = self.resolve_troop(troop)?;
                Ok(Some(Message::DeployTroopCommand(DeployTroop {
                    troop_name,
                    target_tower_id: self.resolve_target(target),
                })))
            }
            UserCommand::Skip => {
                self.require_turn()?;
                Ok(Some(Message::SkipTurnCommand(SkipTurn {})))
            }
            UserCommand::State | UserCommand::Help | UserCommand::Quit => Ok(None),
        }
    }

    /// Current board, if a match has started.
    pub fn render(&self) -> Option<String> {
        let game = self.game.as_ref()?;
        Some(render_match(game, self.username.as_deref()?))
    }

    fn require_turn(&self) -> Result<(), String> {
        if !self.in_match() {
            return Err("You are not in a match.".to_string());
        }
        if !self.is_my_turn() {
            return Err("It's not your turn.".to_string());
        }
        Ok(())
    }

    /// Accepts a 1-based hand position or a case-insensitive troop name.
    pub fn resolve_troop(&self, input: &str) -> Result<String, String> {
        let hand = self.me().map(|p| p.troops.as_slice()).unwrap_or(&[]);

        if let Ok(position) = input.parse::<usize>() {
            return position
                .checked_sub(1)
                .and_then(|i| hand.get(i))
                .map(|t| t.name.clone())
                .ok_or_else(|| format!("No troop at position {}.", position));
        }

        hand.iter()
            .find(|t| t.name.eq_ignore_ascii_case(input))
            .map(|t| t.name.clone())
            .ok_or_else(|| format!("You don't have a {} in hand.", input))
    }

    /// Expands `g1`, `g2` and `king` to the opponent's tower ids.
    pub fn resolve_target(&self, input: &str) -> String {
        let tower_type = match input.to_lowercase().as_str() {
            "g1" | "guard1" => Some(TowerType::Guard1),
            "g2" | "guard2" => Some(TowerType::Guard2),
            "k" | "king" => Some(TowerType::King),
            _ => None,
        };
        match (tower_type, &self.opponent) {
            (Some(t), Some(opponent)) => t.tower_id(opponent),
            _ => input.to_string(),
        }
    }
}
