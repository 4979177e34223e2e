//! A match participant: towers, hand, mana and progression.

use crate::entity::{Tower, Troop};
use crate::store::Profile;
use shared::{PlayerState, TowerType};

#[derive(Debug, Clone)]
pub struct Player {
    pub username: String,
    /// Indexed in [`TowerType::ALL`] order.
    pub towers: [Tower; 3],
    pub hand: Vec<Troop>,
    pub level: u32,
    pub current_exp: u32,
    pub required_exp: u32,
    pub current_mana: u32,
    pub max_mana: u32,
    next_troop_serial: u32,
}

impl Player {
    pub fn new(profile: &Profile, towers: [Tower; 3], mana: u32, max_mana: u32) -> Self {
        Self {
            username: profile.username.clone(),
            towers,
            hand: Vec::new(),
            level: profile.level,
            current_exp: profile.current_exp,
            required_exp: profile.required_exp_for_next_level,
            current_mana: mana.min(max_mana),
            max_mana,
            next_troop_serial: 0,
        }
    }

    pub fn tower(&self, tower_type: TowerType) -> &Tower {
        &self.towers[slot(tower_type)]
    }

    pub fn tower_mut(&mut self, tower_type: TowerType) -> &mut Tower {
        &mut self.towers[slot(tower_type)]
    }

    pub fn tower_by_id(&self, tower_id: &str) -> Option<&Tower> {
        self.towers.iter().find(|t| t.id == tower_id)
    }

    pub fn destroyed_towers(&self) -> usize {
        self.towers.iter().filter(|t| t.destroyed).count()
    }

    /// Hands out a troop id that is unique within this hand for the match.
    pub fn next_troop_id(&mut self) -> String {
        let id = format!("{}_troop_{}", self.username, self.next_troop_serial);
        self.next_troop_serial += 1;
        id
    }

    pub fn find_troop(&self, troop_name: &str) -> Option<usize> {
        self.hand.iter().position(|t| t.name() == troop_name)
    }

    pub fn holds_spec(&self, troop_name: &str) -> bool {
        self.find_troop(troop_name).is_some()
    }

    /// Adds mana up to the cap and returns how much was actually gained.
    pub fn gain_mana(&mut self, amount: u32) -> u32 {
        let before = self.current_mana;
        self.current_mana = self.current_mana.saturating_add(amount).min(self.max_mana);
        self.current_mana - before
    }

    pub fn profile(&self) -> Profile {
        Profile {
            username: self.username.clone(),
            level: self.level,
            current_exp: self.current_exp,
            required_exp_for_next_level: self.required_exp,
        }
    }

    pub fn snapshot(&self) -> PlayerState {
        PlayerState {
            username: self.username.clone(),
            towers: self.towers.iter().map(Tower::snapshot).collect(),
            troops: self.hand.iter().map(Troop::snapshot).collect(),
            level: self.level,
            current_exp: self.current_exp,
            required_exp_for_next_level: self.required_exp,
            current_mana: self.current_mana,
            max_mana: self.max_mana,
        }
    }
}

fn slot(tower_type: TowerType) -> usize {
    match tower_type {
        TowerType::Guard1 => 0,
        TowerType::Guard2 => 1,
        TowerType::King => 2,
    }
}
