//! The game session engine.
//!
//! A [`GameSession`] is the only thing allowed to mutate a match. It owns the
//! [`GameState`], applies every rule (turn order, mana, targeting, combat,
//! bonus turns, levelling) and settles EXP through the profile store. It is
//! not internally synchronized: the coordinator serializes calls into one
//! session.

use crate::catalog::{SpecCatalog, SpecialAbility, TroopSpec};
use crate::combat::resolve_damage_with_crit;
use crate::entity::{Tower, Troop};
use crate::game::{GameState, Winner};
use crate::player::Player;
use crate::rules::GameRules;
use crate::store::{Profile, ProfileStore};
use log::{error, info, warn};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use shared::{GameStateUpdate, PlayerState, TowerType};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Why a target tower was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetRejection {
    OwnTower,
    UnknownTower,
    AlreadyDestroyed,
    GuardTower1Standing,
}

impl fmt::Display for TargetRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            TargetRejection::OwnTower => "you cannot attack your own tower",
            TargetRejection::UnknownTower => "no such tower",
            TargetRejection::AlreadyDestroyed => "tower is already destroyed",
            TargetRejection::GuardTower1Standing => "Guard Tower 1 must be destroyed first",
        };
        f.write_str(reason)
    }
}

/// Rule violations. The display text is what the acting player sees.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GameError {
    #[error("Game is already over.")]
    GameOver,
    #[error("Invalid player username.")]
    UnknownPlayer,
    #[error("It's not your turn.")]
    NotYourTurn,
    #[error("Troop {0} not found in your hand.")]
    TroopNotInHand(String),
    #[error("Not enough mana to deploy {troop}. Requires {required}, you have {available}.")]
    InsufficientMana {
        troop: String,
        required: u32,
        available: u32,
    },
    #[error("Invalid target tower {tower_id}: {reason}.")]
    InvalidTarget {
        tower_id: String,
        reason: TargetRejection,
    },
}

/// Result of a successful action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionReport {
    pub message: String,
    pub tower_destroyed: bool,
    pub bonus_turn: bool,
    pub game_over: bool,
}

impl ActionReport {
    fn new(message: String) -> Self {
        Self {
            message,
            tower_destroyed: false,
            bonus_turn: false,
            game_over: false,
        }
    }
}

/// How a match is being brought to an end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchEnd {
    KingDestroyed { winner: String },
    Forfeit { leaver: String },
    TimeExpired,
}

/// What the canonical end-of-match step decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settlement {
    pub winner: Winner,
    pub reason: String,
    pub message: String,
}

pub struct GameSession {
    state: GameState,
    catalog: Arc<SpecCatalog>,
    rules: Arc<GameRules>,
    profiles: Arc<dyn ProfileStore>,
    rng: StdRng,
    settlement: Option<Settlement>,
}

impl GameSession {
    /// Starts a match. `first` takes the opening turn.
    ///
    /// Profiles are read from the store; a missing or unreadable profile
    /// starts the player at level 1 with no EXP.
    pub fn new(
        first: &str,
        second: &str,
        catalog: Arc<SpecCatalog>,
        rules: Arc<GameRules>,
        profiles: Arc<dyn ProfileStore>,
        mut rng: StdRng,
    ) -> Self {
        let player_a = build_player(first, &catalog, &rules, profiles.as_ref(), &mut rng);
        let player_b = build_player(second, &catalog, &rules, profiles.as_ref(), &mut rng);

        info!(
            "New match {} (lvl {}) vs {} (lvl {})",
            player_a.username, player_a.level, player_b.username, player_b.level
        );

        Self {
            state: GameState::new(player_a, player_b),
            catalog,
            rules,
            profiles,
            rng,
            settlement: None,
        }
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }

    pub fn rules(&self) -> &GameRules {
        &self.rules
    }

    pub fn settlement(&self) -> Option<&Settlement> {
        self.settlement.as_ref()
    }

    pub fn is_game_over(&self) -> bool {
        self.state.is_game_over()
    }

    /// Deploys `troop_name` from `username`'s hand against `target_tower_id`.
    ///
    /// Every check runs before anything is mutated, so a rejected deployment
    /// leaves the match exactly as it was.
    pub fn deploy_troop(
        &mut self,
        username: &str,
        troop_name: &str,
        target_tower_id: &str,
    ) -> Result<ActionReport, GameError> {
        let actor = self.acting_player(username)?;

        let troop_idx = self.state.players[actor]
            .find_troop(troop_name)
            .ok_or_else(|| GameError::TroopNotInHand(troop_name.to_string()))?;

        let spec = Arc::clone(&self.state.players[actor].hand[troop_idx].spec);
        if spec.is_special_only {
            return Ok(self.use_ability(actor, troop_idx, &spec));
        }

        let available = self.state.players[actor].current_mana;
        if available < spec.mana_cost {
            return Err(GameError::InsufficientMana {
                troop: troop_name.to_string(),
                required: spec.mana_cost,
                available,
            });
        }

        let target_type = self.validate_target(actor, target_tower_id)?;

        let player = &mut self.state.players[actor];
        player.current_mana -= spec.mana_cost;
        let attack = player.hand[troop_idx].current_atk;
        let was_bonus_turn = self.state.can_continue_attacking;

        let (attacker, opponent) = self.state.actor_and_opponent_mut(actor);
        let tower = opponent.tower_mut(target_type);
        let hit = resolve_damage_with_crit(
            &mut self.rng,
            attack,
            tower.current_def,
            self.rules.crit_chance_percent,
            self.rules.crit_multiplier,
        );
        let destroyed = tower.take_damage(hit.damage);
        let remaining_hp = tower.current_hp;
        let destroy_exp = tower.spec.destroy_exp;
        let attacker_name = attacker.username.clone();

        let crit = if hit.critical { " (CRITICAL HIT!)" } else { "" };
        let mut report = ActionReport::new(String::new());

        self.state.players[actor].hand.remove(troop_idx);
        self.replenish(actor);

        if !destroyed {
            report.message = format!(
                "{}'s {} dealt {} damage{} to {} (HP remaining: {}).",
                attacker_name, troop_name, hit.damage, crit, target_tower_id, remaining_hp
            );
            if was_bonus_turn {
                info!("{}'s bonus turn ends without a kill", attacker_name);
            }
            self.state.switch_turn(self.rules.mana_regen_per_turn);
            self.state.last_action_log = report.message.clone();
            return Ok(report);
        }

        report.tower_destroyed = true;
        self.state.last_destroyed_tower_id = Some(target_tower_id.to_string());
        let mut message = format!(
            "{}'s {} dealt {} damage{} to {} and destroyed it!",
            attacker_name, troop_name, hit.damage, crit, target_tower_id
        );
        if let Some(level_up) = self.award_exp(actor, destroy_exp) {
            message.push(' ');
            message.push_str(&level_up);
        }

        if target_type == TowerType::King {
            let settlement = self.end_match(MatchEnd::KingDestroyed {
                winner: attacker_name,
            });
            if let Some(settlement) = settlement {
                message.push(' ');
                message.push_str(&settlement.message);
            }
            report.game_over = true;
        } else {
            self.state.can_continue_attacking = true;
            report.bonus_turn = true;
            message.push_str(" You can attack again.");
        }

        info!("{}", message);
        report.message = message;
        self.state.last_action_log = report.message.clone();
        Ok(report)
    }

    /// Passes the turn, granting the skipper one and a half regular regens.
    pub fn skip_turn(&mut self, username: &str) -> Result<ActionReport, GameError> {
        let actor = self.acting_player(username)?;

        let bonus = self.rules.skip_mana_bonus();
        let gained = self.state.players[actor].gain_mana(bonus);
        let message = format!("{} skipped their turn and gained {} mana.", username, gained);
        info!("{}", message);

        self.state.switch_turn(self.rules.mana_regen_per_turn);
        self.state.last_action_log = message.clone();
        Ok(ActionReport::new(message))
    }

    /// The single place a match ends, whatever the trigger.
    ///
    /// Awards match EXP, runs level-up evaluation and persists both profiles.
    /// Returns `None` if the match was already over, so settlement happens
    /// at most once.
    pub fn end_match(&mut self, end: MatchEnd) -> Option<Settlement> {
        if self.state.is_game_over() {
            return None;
        }

        let (winner, reason) = match &end {
            MatchEnd::KingDestroyed { winner } => {
                (Winner::Player(winner.clone()), "King Tower destroyed".to_string())
            }
            MatchEnd::Forfeit { leaver } => {
                let winner = match self.state.opponent_of(leaver) {
                    Some(opponent) => opponent.username.clone(),
                    None => {
                        warn!("Forfeit by {} who is not in this match", leaver);
                        return None;
                    }
                };
                (Winner::Player(winner), format!("{} disconnected", leaver))
            }
            MatchEnd::TimeExpired => {
                // Score = enemy towers destroyed.
                let score_a = self.state.players[1].destroyed_towers();
                let score_b = self.state.players[0].destroyed_towers();
                let winner = if score_a > score_b {
                    Winner::Player(self.state.players[0].username.clone())
                } else if score_b > score_a {
                    Winner::Player(self.state.players[1].username.clone())
                } else {
                    Winner::Draw
                };
                (winner, "Time limit reached".to_string())
            }
        };

        self.state.winner = Some(winner.clone());
        self.state.can_continue_attacking = false;

        let mut message = match &winner {
            Winner::Player(name) => format!("Game Over! Winner: {}!", name),
            Winner::Draw => "The game is a DRAW!".to_string(),
        };

        let rewards = match &winner {
            Winner::Player(name) => self
                .state
                .players
                .iter()
                .map(|p| {
                    if &p.username == name {
                        self.rules.win_exp_reward
                    } else {
                        0
                    }
                })
                .collect::<Vec<_>>(),
            Winner::Draw => vec![self.rules.draw_exp_reward; 2],
        };
        for (idx, reward) in rewards.into_iter().enumerate() {
            if let Some(level_up) = self.award_exp(idx, reward) {
                message.push(' ');
                message.push_str(&level_up);
            }
        }

        info!(
            "Match {} vs {} over: winner {} ({})",
            self.state.players[0].username,
            self.state.players[1].username,
            winner.as_wire(),
            reason
        );

        let settlement = Settlement {
            winner,
            reason,
            message,
        };
        self.settlement = Some(settlement.clone());
        Some(settlement)
    }

    pub fn player_state(&self, username: &str) -> Option<PlayerState> {
        self.state.player(username).map(Player::snapshot)
    }

    pub fn state_update(&self) -> GameStateUpdate {
        GameStateUpdate {
            player_a: self.state.players[0].snapshot(),
            player_b: self.state.players[1].snapshot(),
            current_turn: self.state.current_turn().to_string(),
            can_continue_attacking: self.state.can_continue_attacking,
            last_action_log: self.state.last_action_log.clone(),
        }
    }

    /// Human-readable dump of the whole match.
    pub fn describe(&self) -> String {
        if let Some(winner) = &self.state.winner {
            return format!("Game Over! Winner: {}\n", winner.as_wire());
        }

        let mut out = format!("Current Turn: {}\n", self.state.current_turn());
        for player in &self.state.players {
            out.push_str(&format!(
                "\n{} (Lvl {}, EXP {}/{}, Mana {}/{}):\n",
                player.username,
                player.level,
                player.current_exp,
                player.required_exp,
                player.current_mana,
                player.max_mana
            ));
            for tower in &player.towers {
                out.push_str(&format!(
                    "  {}: HP={}/{}, ATK={}, DEF={}{}\n",
                    tower.id,
                    tower.current_hp,
                    tower.max_hp,
                    tower.current_atk,
                    tower.current_def,
                    if tower.destroyed { " [DESTROYED]" } else { "" }
                ));
            }
            for troop in &player.hand {
                out.push_str(&format!(
                    "    {}: HP={}, ATK={}, DEF={}, Mana={}\n",
                    troop.name(),
                    troop.current_hp,
                    troop.current_atk,
                    troop.current_def,
                    troop.spec.mana_cost
                ));
            }
        }
        out
    }

    fn acting_player(&self, username: &str) -> Result<usize, GameError> {
        if self.state.is_game_over() {
            return Err(GameError::GameOver);
        }
        let idx = self
            .state
            .participant_index(username)
            .ok_or(GameError::UnknownPlayer)?;
        // A bonus turn always belongs to the player whose turn it already is.
        if idx != self.state.current_index() {
            return Err(GameError::NotYourTurn);
        }
        Ok(idx)
    }

    fn validate_target(&self, actor: usize, tower_id: &str) -> Result<TowerType, GameError> {
        let reject = |reason| GameError::InvalidTarget {
            tower_id: tower_id.to_string(),
            reason,
        };

        if self.state.players[actor].tower_by_id(tower_id).is_some() {
            return Err(reject(TargetRejection::OwnTower));
        }

        let opponent = &self.state.players[1 - actor];
        let tower = opponent
            .tower_by_id(tower_id)
            .ok_or_else(|| reject(TargetRejection::UnknownTower))?;

        if tower.destroyed {
            return Err(reject(TargetRejection::AlreadyDestroyed));
        }
        if tower.tower_type().requires_guard1_down() && !opponent.tower(TowerType::Guard1).destroyed
        {
            return Err(reject(TargetRejection::GuardTower1Standing));
        }
        Ok(tower.tower_type())
    }

    fn use_ability(&mut self, actor: usize, troop_idx: usize, spec: &TroopSpec) -> ActionReport {
        let player = &mut self.state.players[actor];
        let message = match spec.special_ability {
            Some(SpecialAbility::HealLowestHpTower) => {
                heal_weakest_tower(player, &spec.name, self.rules.heal_amount)
            }
            None => format!("{} has no ability to use.", spec.name),
        };

        player.hand.remove(troop_idx);
        self.replenish(actor);

        // Using an ability always ends the turn, bonus or not.
        self.state.switch_turn(self.rules.mana_regen_per_turn);
        self.state.last_action_log = message.clone();
        info!("{}", message);
        ActionReport::new(message)
    }

    /// Adds one troop to the hand, preferring a regular spec not already held,
    /// then any spec not held. A hand holding every spec is left alone.
    fn replenish(&mut self, actor: usize) {
        let player = &mut self.state.players[actor];

        let mut candidates: Vec<&Arc<TroopSpec>> = self
            .catalog
            .regular_troops()
            .filter(|spec| !player.holds_spec(&spec.name))
            .collect();
        if candidates.is_empty() {
            candidates = self
                .catalog
                .troops()
                .iter()
                .filter(|spec| !player.holds_spec(&spec.name))
                .collect();
        }

        if let Some(spec) = candidates.choose(&mut self.rng) {
            let id = player.next_troop_id();
            player
                .hand
                .push(Troop::new(Arc::clone(spec), id, player.level));
        }
    }

    /// Adds EXP, levels up as far as it goes and persists the profile.
    fn award_exp(&mut self, idx: usize, amount: u32) -> Option<String> {
        let player = &mut self.state.players[idx];
        player.current_exp = player.current_exp.saturating_add(amount);
        let level_up = evaluate_level_up(player, &self.rules);
        persist(self.profiles.as_ref(), player);
        level_up
    }
}

/// Levels `player` up while their EXP covers the threshold.
///
/// Returns a message when at least one level was gained.
pub fn evaluate_level_up(player: &mut Player, rules: &GameRules) -> Option<String> {
    let start_level = player.level;
    while player.required_exp > 0 && player.current_exp >= player.required_exp {
        player.current_exp -= player.required_exp;
        player.level += 1;
        player.required_exp = rules.required_exp(player.level);
    }

    if player.level == start_level {
        return None;
    }
    let message = format!(
        "{} leveled up to Level {}! Next level at {} EXP.",
        player.username, player.level, player.required_exp
    );
    info!("{}", message);
    Some(message)
}

fn persist(store: &dyn ProfileStore, player: &Player) {
    if let Err(e) = store.save_profile(&player.profile()) {
        error!("Failed to save profile for {}: {}", player.username, e);
    }
}

fn load_profile(username: &str, rules: &GameRules, store: &dyn ProfileStore) -> Profile {
    let mut profile = match store.load_profile(username) {
        Ok(Some(profile)) => profile,
        Ok(None) => Profile::new(username, rules.required_exp(1)),
        Err(e) => {
            warn!(
                "Could not load profile for {}: {}. Starting from level 1.",
                username, e
            );
            Profile::new(username, rules.required_exp(1))
        }
    };
    profile.username = username.to_string();
    profile.level = profile.level.max(1);
    if profile.required_exp_for_next_level == 0 {
        profile.required_exp_for_next_level = rules.required_exp(profile.level);
    }
    profile
}

fn build_player(
    username: &str,
    catalog: &SpecCatalog,
    rules: &GameRules,
    store: &dyn ProfileStore,
    rng: &mut StdRng,
) -> Player {
    let profile = load_profile(username, rules, store);
    let towers = TowerType::ALL
        .map(|t| Tower::new(Arc::clone(catalog.tower(t)), username, profile.level));
    let mut player = Player::new(&profile, towers, rules.initial_mana, rules.max_mana);

    let regular: Vec<&Arc<TroopSpec>> = catalog.regular_troops().collect();
    let picks: Vec<Arc<TroopSpec>> = regular
        .choose_multiple(rng, rules.starting_hand_size)
        .map(|spec| Arc::clone(spec))
        .collect();
    for spec in picks.into_iter().chain(catalog.special_troops().cloned()) {
        let id = player.next_troop_id();
        player.hand.push(Troop::new(spec, id, player.level));
    }
    player
}

fn heal_weakest_tower(player: &mut Player, healer: &str, amount: u32) -> String {
    let weakest = player
        .towers
        .iter_mut()
        .filter(|t| !t.destroyed && t.current_hp < t.max_hp)
        .min_by(|a, b| a.hp_fraction().total_cmp(&b.hp_fraction()));

    match weakest {
        Some(tower) => {
            let before = tower.current_hp;
            let healed = tower.heal(amount);
            format!(
                "{} healed {} for {} HP ({} -> {}).",
                healer, tower.id, healed, before, tower.current_hp
            )
        }
        None => format!("{} found no damaged tower to heal.", healer),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::fixtures;
    use crate::store::MemoryStore;
    use rand::SeedableRng;

    fn quiet_rules() -> GameRules {
        GameRules {
            crit_chance_percent: 0,
            ..GameRules::default()
        }
    }

    fn session_with(store: Arc<MemoryStore>, rules: GameRules) -> GameSession {
        GameSession::new(
            "alice",
            "bob",
            Arc::new(fixtures::catalog()),
            Arc::new(rules),
            store,
            StdRng::seed_from_u64(99),
        )
    }

    fn session() -> GameSession {
        session_with(Arc::new(MemoryStore::new()), quiet_rules())
    }

    fn first_regular(session: &GameSession, username: &str) -> String {
        session
            .state()
            .player(username)
            .unwrap()
            .hand
            .iter()
            .find(|t| !t.spec.is_special_only)
            .unwrap()
            .name()
            .to_string()
    }

    /// Destroys bob's Guard Tower 1 with one of alice's troops.
    fn break_guard1(session: &mut GameSession) {
        let troop = first_regular(session, "alice");
        let report = session.deploy_troop("alice", &troop, "bob_GUARD1").unwrap();
        assert!(report.tower_destroyed);
    }

    #[test]
    fn test_session_setup() {
        let s = session();
        let state = s.state();
        assert_eq!(state.current_turn(), "alice");
        for player in &state.players {
            assert_eq!(player.level, 1);
            assert_eq!(player.current_mana, 15);
            assert_eq!(player.hand.len(), 4);
            assert_eq!(player.hand.iter().filter(|t| t.spec.is_special_only).count(), 1);
            assert!(player.towers.iter().all(|t| !t.destroyed));
        }
        assert_eq!(state.players[1].tower(TowerType::King).id, "bob_KING");
    }

    #[test]
    fn test_stored_profile_scales_towers() {
        let store = Arc::new(MemoryStore::new().with_profile(Profile {
            username: "bob".to_string(),
            level: 3,
            current_exp: 12,
            required_exp_for_next_level: 0,
        }));
        let s = session_with(store, quiet_rules());
        let bob = s.state().player("bob").unwrap();

        assert_eq!(bob.level, 3);
        assert_eq!(bob.current_exp, 12);
        assert_eq!(bob.required_exp, 121);
        assert_eq!(bob.tower(TowerType::Guard2).max_hp, 1200);
    }

    #[test]
    fn test_destroying_guard1_grants_bonus_turn() {
        let mut s = session();
        let troop = first_regular(&s, "alice");

        // 150 ATK against 50 DEF / 100 HP.
        let report = s.deploy_troop("alice", &troop, "bob_GUARD1").unwrap();

        assert!(report.tower_destroyed);
        assert!(report.bonus_turn);
        assert!(report.message.contains("You can attack again"));
        let state = s.state();
        let guard = state.players[1].tower(TowerType::Guard1);
        assert_eq!(guard.current_hp, 0);
        assert!(guard.destroyed);
        assert_eq!(state.current_turn(), "alice");
        assert!(state.can_continue_attacking);
        assert_eq!(state.last_destroyed_tower_id.as_deref(), Some("bob_GUARD1"));
    }

    #[test]
    fn test_tower_kill_awards_exp() {
        let mut s = session();
        break_guard1(&mut s);
        // Guard Tower 1 is worth 100 EXP, exactly one level.
        let alice = s.state().player("alice").unwrap();
        assert_eq!(alice.level, 2);
        assert_eq!(alice.current_exp, 0);
        assert_eq!(alice.required_exp, 110);
    }

    #[test]
    fn test_king_behind_guard1_is_invalid() {
        let mut s = session();
        let troop = first_regular(&s, "alice");
        let hand_before = s.state().players[0].hand.len();

        let err = s.deploy_troop("alice", &troop, "bob_KING").unwrap_err();

        assert_eq!(
            err,
            GameError::InvalidTarget {
                tower_id: "bob_KING".to_string(),
                reason: TargetRejection::GuardTower1Standing,
            }
        );
        let state = s.state();
        assert_eq!(state.players[1].tower(TowerType::King).current_hp, 2000);
        assert_eq!(state.players[0].current_mana, 15);
        assert_eq!(state.players[0].hand.len(), hand_before);
        assert_eq!(state.current_turn(), "alice");
    }

    #[test]
    fn test_guard2_behind_guard1_is_invalid() {
        let mut s = session();
        let troop = first_regular(&s, "alice");
        assert!(matches!(
            s.deploy_troop("alice", &troop, "bob_GUARD2"),
            Err(GameError::InvalidTarget {
                reason: TargetRejection::GuardTower1Standing,
                ..
            })
        ));
    }

    #[test]
    fn test_other_bad_targets() {
        let mut s = session();
        let troop = first_regular(&s, "alice");

        assert!(matches!(
            s.deploy_troop("alice", &troop, "alice_GUARD1"),
            Err(GameError::InvalidTarget { reason: TargetRejection::OwnTower, .. })
        ));
        assert!(matches!(
            s.deploy_troop("alice", &troop, "carol_GUARD1"),
            Err(GameError::InvalidTarget { reason: TargetRejection::UnknownTower, .. })
        ));

        break_guard1(&mut s);
        let troop = first_regular(&s, "alice");
        assert!(matches!(
            s.deploy_troop("alice", &troop, "bob_GUARD1"),
            Err(GameError::InvalidTarget { reason: TargetRejection::AlreadyDestroyed, .. })
        ));
    }

    #[test]
    fn test_insufficient_mana_changes_nothing() {
        let mut s = session();
        let troop = first_regular(&s, "alice");
        s.state.players[0].current_mana = 0;
        let hand_before: Vec<String> =
            s.state().players[0].hand.iter().map(|t| t.id.clone()).collect();

        let err = s.deploy_troop("alice", &troop, "bob_GUARD1").unwrap_err();

        assert!(matches!(err, GameError::InsufficientMana { available: 0, .. }));
        let alice = &s.state().players[0];
        assert_eq!(alice.current_mana, 0);
        let hand_after: Vec<String> = alice.hand.iter().map(|t| t.id.clone()).collect();
        assert_eq!(hand_before, hand_after);
        assert_eq!(s.state().current_turn(), "alice");
    }

    #[test]
    fn test_mana_is_checked_before_target() {
        let mut s = session();
        let troop = first_regular(&s, "alice");
        s.state.players[0].current_mana = 0;

        // Guard Tower 1 still stands, so the King would be refused too.
        let err = s.deploy_troop("alice", &troop, "bob_KING").unwrap_err();

        assert!(matches!(err, GameError::InsufficientMana { available: 0, .. }));
        let state = s.state();
        assert_eq!(state.players[0].current_mana, 0);
        assert_eq!(state.players[1].tower(TowerType::King).current_hp, 2000);
        assert_eq!(state.current_turn(), "alice");
    }

    #[test]
    fn test_mana_three_cannot_afford_cost_five() {
        let mut s = session();
        let rook = Arc::new(fixtures::troop("Rook", 150, 200, 5));
        s.state.players[0].hand = vec![Troop::new(rook, "alice_rook".to_string(), 1)];
        s.state.players[0].current_mana = 3;

        let err = s.deploy_troop("alice", "Rook", "bob_GUARD1").unwrap_err();

        assert_eq!(
            err.to_string(),
            "Not enough mana to deploy Rook. Requires 5, you have 3."
        );
        assert_eq!(s.state().players[0].current_mana, 3);
        assert_eq!(s.state().players[0].hand.len(), 1);
    }

    #[test]
    fn test_non_destroying_hit_switches_turn_once() {
        let mut s = session();
        break_guard1(&mut s);
        let troop = first_regular(&s, "alice");
        let cost = s.state().players[0].hand[s.state().players[0].find_troop(&troop).unwrap()]
            .spec
            .mana_cost;
        let mana_before = s.state().players[0].current_mana;
        let bob_mana_before = s.state().players[1].current_mana;

        // Bonus turn against Guard Tower 2 (1000 HP) does not chain.
        let report = s.deploy_troop("alice", &troop, "bob_GUARD2").unwrap();

        assert!(!report.tower_destroyed);
        assert!(!report.bonus_turn);
        let state = s.state();
        assert_eq!(state.current_turn(), "bob");
        assert!(!state.can_continue_attacking);
        assert_eq!(state.players[1].tower(TowerType::Guard2).current_hp, 900);
        assert_eq!(state.players[0].current_mana, mana_before - cost);
        assert_eq!(state.players[1].current_mana, (bob_mana_before + 5).min(20));
    }

    #[test]
    fn test_not_your_turn_and_unknown_player() {
        let mut s = session();
        let troop = first_regular(&s, "bob");
        assert_eq!(
            s.deploy_troop("bob", &troop, "alice_GUARD1").unwrap_err(),
            GameError::NotYourTurn
        );
        assert_eq!(s.skip_turn("bob").unwrap_err(), GameError::NotYourTurn);
        assert_eq!(s.skip_turn("mallory").unwrap_err(), GameError::UnknownPlayer);
    }

    #[test]
    fn test_opponent_cannot_act_during_bonus_turn() {
        let mut s = session();
        break_guard1(&mut s);
        let troop = first_regular(&s, "bob");
        assert_eq!(
            s.deploy_troop("bob", &troop, "alice_GUARD1").unwrap_err(),
            GameError::NotYourTurn
        );
    }

    #[test]
    fn test_troop_not_in_hand() {
        let mut s = session();
        assert_eq!(
            s.deploy_troop("alice", "Dragon", "bob_GUARD1").unwrap_err(),
            GameError::TroopNotInHand("Dragon".to_string())
        );
    }

    #[test]
    fn test_deploy_replaces_troop_with_unheld_spec() {
        let mut s = session();
        let troop = first_regular(&s, "alice");
        s.deploy_troop("alice", &troop, "bob_GUARD1").unwrap();

        let alice = &s.state().players[0];
        assert_eq!(alice.hand.len(), 4);
        let mut names: Vec<&str> = alice.hand.iter().map(|t| t.name()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), 4);
    }

    #[test]
    fn test_replenish_skipped_when_every_spec_held() {
        let mut s = session();
        let catalog = fixtures::catalog();
        let alice = &mut s.state.players[0];
        alice.hand = catalog
            .troops()
            .iter()
            .enumerate()
            .map(|(i, spec)| Troop::new(Arc::clone(spec), format!("t{}", i), 1))
            .collect();

        s.replenish(0);
        assert_eq!(s.state().players[0].hand.len(), 5);
    }

    #[test]
    fn test_replenish_falls_back_to_special() {
        let mut s = session();
        let catalog = fixtures::catalog();
        s.state.players[0].hand = catalog
            .regular_troops()
            .enumerate()
            .map(|(i, spec)| Troop::new(Arc::clone(spec), format!("t{}", i), 1))
            .collect();

        s.replenish(0);
        let alice = &s.state().players[0];
        assert_eq!(alice.hand.len(), 5);
        assert!(alice.hand.last().unwrap().spec.is_special_only);
    }

    #[test]
    fn test_skip_turn_grants_bonus_and_switches() {
        let mut s = session();
        s.state.players[0].current_mana = 5;
        let bob_mana = s.state().players[1].current_mana;

        let report = s.skip_turn("alice").unwrap();

        assert_eq!(report.message, "alice skipped their turn and gained 7 mana.");
        let state = s.state();
        assert_eq!(state.players[0].current_mana, 12);
        assert_eq!(state.players[1].current_mana, (bob_mana + 5).min(20));
        assert_eq!(state.current_turn(), "bob");
        assert_eq!(state.last_action_log, report.message);
    }

    #[test]
    fn test_skip_mana_is_capped() {
        let mut s = session();
        s.state.players[0].current_mana = 18;
        s.skip_turn("alice").unwrap();
        assert_eq!(s.state().players[0].current_mana, 20);
    }

    #[test]
    fn test_heal_targets_weakest_tower_and_ends_turn() {
        let mut s = session();
        {
            let alice = &mut s.state.players[0];
            alice.tower_mut(TowerType::King).take_damage(1000); // 50%
            alice.tower_mut(TowerType::Guard2).take_damage(100); // 90%
        }
        let mana_before = s.state().players[0].current_mana;

        let report = s.deploy_troop("alice", "Queen", "").unwrap();

        assert!(report.message.contains("alice_KING"));
        let state = s.state();
        assert_eq!(state.players[0].tower(TowerType::King).current_hp, 1300);
        assert_eq!(state.players[0].current_mana, mana_before);
        assert_eq!(state.current_turn(), "bob");
        // Queen consumed and replaced.
        assert_eq!(state.players[0].hand.len(), 4);
        assert!(!state.players[0].holds_spec("Queen"));
    }

    #[test]
    fn test_heal_never_exceeds_max_and_skips_destroyed() {
        let mut s = session();
        {
            let alice = &mut s.state.players[0];
            alice.tower_mut(TowerType::Guard1).take_damage(1000);
            alice.tower_mut(TowerType::Guard2).take_damage(50);
        }
        s.deploy_troop("alice", "Queen", "").unwrap();

        let alice = &s.state().players[0];
        assert_eq!(alice.tower(TowerType::Guard1).current_hp, 0);
        assert!(alice.tower(TowerType::Guard1).destroyed);
        assert_eq!(alice.tower(TowerType::Guard2).current_hp, 1000);
    }

    #[test]
    fn test_ability_during_bonus_turn_ends_turn() {
        let mut s = session();
        break_guard1(&mut s);
        assert!(s.state().can_continue_attacking);

        s.deploy_troop("alice", "Queen", "").unwrap();

        assert_eq!(s.state().current_turn(), "bob");
        assert!(!s.state().can_continue_attacking);
    }

    #[test]
    fn test_king_kill_ends_match_and_freezes_state() {
        let store = Arc::new(MemoryStore::new());
        let mut s = session_with(Arc::clone(&store), quiet_rules());
        break_guard1(&mut s);
        s.state.players[1].tower_mut(TowerType::King).current_hp = 1;
        let troop = first_regular(&s, "alice");

        let report = s.deploy_troop("alice", &troop, "bob_KING").unwrap();

        assert!(report.game_over);
        assert!(report.message.contains("Game Over! Winner: alice!"));
        let state = s.state();
        assert_eq!(state.winner, Some(Winner::Player("alice".to_string())));
        assert!(state.players[1].tower(TowerType::King).destroyed);
        assert_eq!(s.settlement().unwrap().reason, "King Tower destroyed");

        // Both profiles persisted during settlement.
        assert!(store.profile("alice").is_some());
        assert!(store.profile("bob").is_some());

        let troop = first_regular(&s, "alice");
        assert_eq!(
            s.deploy_troop("alice", &troop, "bob_GUARD2").unwrap_err(),
            GameError::GameOver
        );
        assert_eq!(s.skip_turn("alice").unwrap_err(), GameError::GameOver);
        assert!(s.end_match(MatchEnd::TimeExpired).is_none());
    }

    #[test]
    fn test_win_exp_settlement() {
        let store = Arc::new(MemoryStore::new());
        let mut s = session_with(Arc::clone(&store), quiet_rules());

        let settlement = s
            .end_match(MatchEnd::Forfeit {
                leaver: "bob".to_string(),
            })
            .unwrap();

        assert_eq!(settlement.winner, Winner::Player("alice".to_string()));
        assert_eq!(settlement.reason, "bob disconnected");
        assert_eq!(store.profile("alice").unwrap().current_exp, 30);
        assert_eq!(store.profile("bob").unwrap().current_exp, 0);
        assert_eq!(store.saved_profiles().len(), 2);
    }

    #[test]
    fn test_time_expiry_draw_awards_both() {
        let store = Arc::new(MemoryStore::new());
        let mut s = session_with(Arc::clone(&store), quiet_rules());

        let settlement = s.end_match(MatchEnd::TimeExpired).unwrap();

        assert_eq!(settlement.winner, Winner::Draw);
        assert_eq!(s.state().winner.as_ref().unwrap().as_wire(), "DRAW");
        assert_eq!(store.profile("alice").unwrap().current_exp, 10);
        assert_eq!(store.profile("bob").unwrap().current_exp, 10);
    }

    #[test]
    fn test_time_expiry_with_more_kills_wins() {
        let mut s = session();
        break_guard1(&mut s);
        let settlement = s.end_match(MatchEnd::TimeExpired).unwrap();
        assert_eq!(settlement.winner, Winner::Player("alice".to_string()));
    }

    #[test]
    fn test_persistence_failure_does_not_abort_match() {
        let store = Arc::new(MemoryStore::new());
        store.set_fail_saves(true);
        let mut s = session_with(Arc::clone(&store), quiet_rules());

        break_guard1(&mut s);

        assert_eq!(s.state().players[0].level, 2);
        assert!(store.saved_profiles().is_empty());
        assert_eq!(s.state().current_turn(), "alice");
    }

    #[test]
    fn test_level_up_exactly_at_threshold_once() {
        let mut s = session();
        let rules = GameRules::default();
        let alice = &mut s.state.players[0];
        alice.current_exp = 100;

        let msg = evaluate_level_up(alice, &rules);
        assert!(msg.is_some());
        assert_eq!(alice.level, 2);
        assert_eq!(alice.current_exp, 0);

        assert!(evaluate_level_up(alice, &rules).is_none());
        assert_eq!(alice.level, 2);
    }

    #[test]
    fn test_level_up_multiple_thresholds() {
        let mut s = session();
        let rules = GameRules::default();
        let alice = &mut s.state.players[0];
        alice.current_exp = 100 + 110 + 5;

        evaluate_level_up(alice, &rules);

        assert_eq!(alice.level, 3);
        assert_eq!(alice.current_exp, 5);
        assert_eq!(alice.required_exp, 121);
    }

    #[test]
    fn test_zero_threshold_does_not_loop() {
        let mut s = session();
        let rules = GameRules::default();
        let alice = &mut s.state.players[0];
        alice.required_exp = 0;
        alice.current_exp = 500;

        assert!(evaluate_level_up(alice, &rules).is_none());
        assert_eq!(alice.level, 1);
    }

    #[test]
    fn test_damage_property_over_many_hp_values() {
        for hp in [1u32, 50, 99, 100, 101, 250] {
            let mut s = session();
            s.state.players[1].tower_mut(TowerType::Guard1).current_hp = hp;
            let troop = first_regular(&s, "alice");

            s.deploy_troop("alice", &troop, "bob_GUARD1").unwrap();

            let guard = s.state().players[1].tower(TowerType::Guard1);
            assert_eq!(guard.current_hp, hp.saturating_sub(100));
            assert_eq!(guard.destroyed, guard.current_hp == 0);
        }
    }

    #[test]
    fn test_describe_mentions_every_tower() {
        let s = session();
        let text = s.describe();
        assert!(text.starts_with("Current Turn: alice"));
        for id in ["alice_KING", "alice_GUARD1", "bob_GUARD2"] {
            assert!(text.contains(id));
        }
    }

    #[test]
    fn test_state_update_snapshot() {
        let mut s = session();
        s.skip_turn("alice").unwrap();
        let update = s.state_update();
        assert_eq!(update.current_turn, "bob");
        assert_eq!(update.player_a.username, "alice");
        assert!(update.last_action_log.contains("skipped"));
        assert_eq!(s.player_state("bob").unwrap().towers.len(), 3);
    }
}
