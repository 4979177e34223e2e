//! Tunable game rules.
//!
//! Defaults match the enhanced rule set. A `rules.json` next to the spec
//! catalog may override any subset of fields.

use log::info;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GameRules {
    pub initial_mana: u32,
    pub mana_regen_per_turn: u32,
    pub max_mana: u32,
    pub crit_chance_percent: u32,
    pub crit_multiplier: f64,
    pub win_exp_reward: u32,
    pub draw_exp_reward: u32,
    pub heal_amount: u32,
    pub base_exp_for_level_up: u32,
    pub level_up_exp_growth: f64,
    pub starting_hand_size: usize,
    /// Match clock in seconds; 0 disables it.
    pub match_duration_secs: u64,
}

impl Default for GameRules {
    fn default() -> Self {
        Self {
            initial_mana: 15,
            mana_regen_per_turn: 5,
            max_mana: 20,
            crit_chance_percent: 20,
            crit_multiplier: 1.2,
            win_exp_reward: 30,
            draw_exp_reward: 10,
            heal_amount: 300,
            base_exp_for_level_up: 100,
            level_up_exp_growth: 1.1,
            starting_hand_size: 3,
            match_duration_secs: 180,
        }
    }
}

impl GameRules {
    /// Loads overrides from `path`, falling back to defaults when it is absent.
    pub fn load_or_default(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)?;
        let rules: GameRules = serde_json::from_str(&raw)?;
        info!("Loaded rule overrides from {}", path.display());
        Ok(rules)
    }

    /// Mana granted to a player who skips: one and a half regular regens.
    pub fn skip_mana_bonus(&self) -> u32 {
        self.mana_regen_per_turn + self.mana_regen_per_turn / 2
    }

    /// EXP needed to advance from `level` to `level + 1`.
    ///
    /// The base threshold is compounded by the growth factor once per level
    /// above 1, truncating at every step.
    pub fn required_exp(&self, level: u32) -> u32 {
        let mut exp = self.base_exp_for_level_up;
        for _ in 1..level {
            exp = (exp as f64 * self.level_up_exp_growth) as u32;
        }
        exp
    }
}
