//! Tower and troop instances built from catalog specs.

use crate::catalog::{TowerSpec, TroopSpec};
use shared::{TowerState, TowerType, TroopState};
use std::sync::Arc;

/// Stat multiplier for a given owner level: +10% per level above 1.
pub fn level_multiplier(level: u32) -> f64 {
    1.0 + 0.1 * (level.max(1) - 1) as f64
}

/// Scales a base stat by the owner's level, truncating to an integer.
pub fn scale_stat(base: u32, level: u32) -> u32 {
    (base as f64 * level_multiplier(level)) as u32
}

#[derive(Debug, Clone)]
pub struct Tower {
    pub spec: Arc<TowerSpec>,
    pub id: String,
    pub max_hp: u32,
    pub current_hp: u32,
    pub current_atk: u32,
    pub current_def: u32,
    pub destroyed: bool,
}

impl Tower {
    pub fn new(spec: Arc<TowerSpec>, owner: &str, owner_level: u32) -> Self {
        let max_hp = scale_stat(spec.base_hp, owner_level);
        Self {
            id: spec.tower_type.tower_id(owner),
            max_hp,
            current_hp: max_hp,
            current_atk: scale_stat(spec.base_atk, owner_level),
            current_def: scale_stat(spec.base_def, owner_level),
            destroyed: false,
            spec,
        }
    }

    pub fn tower_type(&self) -> TowerType {
        self.spec.tower_type
    }

    /// Applies damage, clamping at zero. Returns true if this hit destroyed it.
    pub fn take_damage(&mut self, damage: u32) -> bool {
        if self.destroyed {
            return false;
        }
        self.current_hp = self.current_hp.saturating_sub(damage);
        self.destroyed = self.current_hp == 0;
        self.destroyed
    }

    /// Restores up to `amount` HP without exceeding max. Returns HP gained.
    pub fn heal(&mut self, amount: u32) -> u32 {
        if self.destroyed {
            return 0;
        }
        let healed = amount.min(self.max_hp - self.current_hp);
        self.current_hp += healed;
        healed
    }

    pub fn hp_fraction(&self) -> f64 {
        if self.max_hp == 0 {
            return 0.0;
        }
        self.current_hp as f64 / self.max_hp as f64
    }

    pub fn snapshot(&self) -> TowerState {
        TowerState {
            id: self.id.clone(),
            tower_type: self.tower_type(),
            current_hp: self.current_hp,
            max_hp: self.max_hp,
            attack: self.current_atk,
            defense: self.current_def,
            destroyed: self.destroyed,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Troop {
    pub spec: Arc<TroopSpec>,
    pub id: String,
    pub current_hp: u32,
    pub current_atk: u32,
    pub current_def: u32,
}

impl Troop {
    /// `id` must be unique within the owning hand.
    pub fn new(spec: Arc<TroopSpec>, id: String, owner_level: u32) -> Self {
        Self {
            current_hp: scale_stat(spec.base_hp, owner_level),
            current_atk: scale_stat(spec.base_atk, owner_level),
            current_def: scale_stat(spec.base_def, owner_level),
            id,
            spec,
        }
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn snapshot(&self) -> TroopState {
        TroopState {
            name: self.spec.name.clone(),
            hp: self.current_hp,
            attack: self.current_atk,
            defense: self.current_def,
            mana_cost: self.spec.mana_cost,
            special_only: self.spec.is_special_only,
        }
    }
}
