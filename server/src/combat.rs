//! Damage resolution.

use rand::Rng;

/// Outcome of a single attack roll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hit {
    pub damage: u32,
    pub critical: bool,
}

/// Plain damage: whatever attack exceeds defense, never negative.
pub fn resolve_damage(attack: u32, defense: u32) -> u32 {
    attack.saturating_sub(defense)
}

/// Damage with a critical-hit roll.
///
/// With probability `crit_chance_percent / 100` the attack is multiplied by
/// `crit_multiplier` (and truncated) before defense is subtracted. The caller
/// owns the generator so a match draws from one long-lived stream instead of
/// reseeding per roll.
pub fn resolve_damage_with_crit<R: Rng + ?Sized>(
    rng: &mut R,
    attack: u32,
    defense: u32,
    crit_chance_percent: u32,
    crit_multiplier: f64,
) -> Hit {
    let critical = roll_critical(rng, crit_chance_percent);
    let effective_attack = if critical {
        (attack as f64 * crit_multiplier) as u32
    } else {
        attack
    };

    Hit {
        damage: resolve_damage(effective_attack, defense),
        critical,
    }
}

fn roll_critical<R: Rng + ?Sized>(rng: &mut R, chance_percent: u32) -> bool {
    if chance_percent == 0 {
        return false;
    }
    rng.gen_range(1..=100) <= chance_percent
}
