use crate::player::Player;
use log::debug;
use shared::DRAW_SENTINEL;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Winner {
    Player(String),
    Draw,
}

impl Winner {
    /// Wire form: the winner's username or the draw sentinel.
    pub fn as_wire(&self) -> &str {
        match self {
            Winner::Player(name) => name,
            Winner::Draw => DRAW_SENTINEL,
        }
    }
}

/// Turn and outcome state of one match.
///
/// The turn is stored as an index into `players`, so it always names exactly
/// one participant.
#[derive(Debug, Clone)]
pub struct GameState {
    pub players: [Player; 2],
    current: usize,
    pub winner: Option<Winner>,
    pub last_destroyed_tower_id: Option<String>,
    pub can_continue_attacking: bool,
    pub last_action_log: String,
}

impl GameState {
    /// `first` moves first.
    pub fn new(first: Player, second: Player) -> Self {
        Self {
            players: [first, second],
            current: 0,
            winner: None,
            last_destroyed_tower_id: None,
            can_continue_attacking: false,
            last_action_log: String::new(),
        }
    }

    pub fn is_game_over(&self) -> bool {
        self.winner.is_some()
    }

    pub fn current_turn(&self) -> &str {
        &self.players[self.current].username
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn participant_index(&self, username: &str) -> Option<usize> {
        self.players.iter().position(|p| p.username == username)
    }

    pub fn player(&self, username: &str) -> Option<&Player> {
        self.players.iter().find(|p| p.username == username)
    }

    pub fn opponent_of(&self, username: &str) -> Option<&Player> {
        let idx = self.participant_index(username)?;
        Some(&self.players[1 - idx])
    }

    /// Mutable access to a participant and their opponent at once.
    pub fn actor_and_opponent_mut(&mut self, actor: usize) -> (&mut Player, &mut Player) {
        let (left, right) = self.players.split_at_mut(1);
        if actor == 0 {
            (&mut left[0], &mut right[0])
        } else {
            (&mut right[0], &mut left[0])
        }
    }

    /// Hands the turn to the other player.
    ///
    /// Clears any bonus turn and grants the incoming player `regen` mana,
    /// capped at their maximum. Returns the mana actually gained.
    pub fn switch_turn(&mut self, regen: u32) -> u32 {
        self.current = 1 - self.current;
        self.can_continue_attacking = false;
        let next = &mut self.players[self.current];
        let gained = next.gain_mana(regen);
        debug!(
            "Turn passes to {} (+{} mana, now {})",
            next.username, gained, next.current_mana
        );
        gained
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::fixtures;
    use crate::entity::Tower;
    use crate::store::Profile;
    use shared::TowerType;
    use std::sync::Arc;

    fn player(name: &str, mana: u32) -> Player {
        let catalog = fixtures::catalog();
        let towers = TowerType::ALL.map(|t| Tower::new(Arc::clone(catalog.tower(t)), name, 1));
        Player::new(&Profile::new(name, 100), towers, mana, 20)
    }

    #[test]
    fn test_first_player_starts() {
        let state = GameState::new(player("alice", 15), player("bob", 15));
        assert_eq!(state.current_turn(), "alice");
        assert!(!state.is_game_over());
        assert_eq!(state.participant_index("bob"), Some(1));
        assert_eq!(state.participant_index("carol"), None);
    }

    #[test]
    fn test_switch_turn_flips_and_regens_incoming_player() {
        let mut state = GameState::new(player("alice", 15), player("bob", 10));
        state.can_continue_attacking = true;

        let gained = state.switch_turn(5);

        assert_eq!(state.current_turn(), "bob");
        assert_eq!(gained, 5);
        assert_eq!(state.players[1].current_mana, 15);
        assert_eq!(state.players[0].current_mana, 15);
        assert!(!state.can_continue_attacking);
    }

    #[test]
    fn test_switch_turn_regen_capped() {
        let mut state = GameState::new(player("alice", 15), player("bob", 18));
        assert_eq!(state.switch_turn(5), 2);
        assert_eq!(state.players[1].current_mana, 20);

        state.switch_turn(5);
        assert_eq!(state.current_turn(), "alice");
        assert_eq!(state.players[0].current_mana, 20);
    }

    #[test]
    fn test_actor_and_opponent_mut() {
        let mut state = GameState::new(player("alice", 15), player("bob", 15));
        let (actor, opponent) = state.actor_and_opponent_mut(1);
        assert_eq!(actor.username, "bob");
        assert_eq!(opponent.username, "alice");
    }

    #[test]
    fn test_winner_wire_form() {
        assert_eq!(Winner::Player("alice".to_string()).as_wire(), "alice");
        assert_eq!(Winner::Draw.as_wire(), DRAW_SENTINEL);
    }
}
