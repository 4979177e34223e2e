//! Text rendering of the client's view of a match

use shared::{GameOver, GameStateUpdate, PlayerState, TowerState, DRAW_SENTINEL};
use std::fmt::Write;

/// Renders the whole board from `me`'s point of view: opponent on top.
pub fn render_match(state: &GameStateUpdate, me: &str) -> String {
    let mut out = String::new();

    if let Some(opponent) = state.opponent_of(me) {
        out.push_str(&render_player(opponent, false));
    }
    out.push_str("  ----------------------------------------\n");
    if let Some(player) = state.player(me) {
        out.push_str(&render_player(player, true));
    }

    let turn = if state.current_turn == me {
        if state.can_continue_attacking {
            "Your turn (bonus attack!)".to_string()
        } else {
            "Your turn".to_string()
        }
    } else {
        format!("{}'s turn", state.current_turn)
    };
    let _ = writeln!(out, ">> {}", turn);
    out
}

/// One player's towers, and their hand when `show_hand` is set.
pub fn render_player(player: &PlayerState, show_hand: bool) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} | Lvl {} | EXP {}/{} | Mana {}/{}",
        player.username,
        player.level,
        player.current_exp,
        player.required_exp_for_next_level,
        player.current_mana,
        player.max_mana
    );
    for tower in &player.towers {
        let _ = writeln!(out, "  {}", render_tower(tower));
    }

    if show_hand {
        out.push_str("  Hand:\n");
        for (i, troop) in player.troops.iter().enumerate() {
            let detail = if troop.special_only {
                format!("special, {} mana", troop.mana_cost)
            } else {
                format!(
                    "ATK {} DEF {} HP {}, {} mana",
                    troop.attack, troop.defense, troop.hp, troop.mana_cost
                )
            };
            let _ = writeln!(out, "    {}. {} ({})", i + 1, troop.name, detail);
        }
    }
    out
}

pub fn render_tower(tower: &TowerState) -> String {
    if tower.destroyed {
        return format!("{:<8} [DESTROYED]", tower.tower_type.as_str());
    }
    format!(
        "{:<8} {} {:>5}/{:<5} DEF {}",
        tower.tower_type.as_str(),
        hp_bar(tower.current_hp, tower.max_hp, 20),
        tower.current_hp,
        tower.max_hp,
        tower.defense
    )
}

/// `[#####.....]` style bar, `width` cells wide.
pub fn hp_bar(current: u32, max: u32, width: usize) -> String {
    let filled = if max == 0 {
        0
    } else {
        ((current.min(max) as u64 * width as u64 + max as u64 - 1) / max as u64) as usize
    };
    format!("[{}{}]", "#".repeat(filled), ".".repeat(width - filled))
}

pub fn render_game_over(game_over: &GameOver, me: &str) -> String {
    let headline = if game_over.winner_username == DRAW_SENTINEL {
        "The match is a draw.".to_string()
    } else if game_over.winner_username == me {
        "You win!".to_string()
    } else {
        format!("{} wins.", game_over.winner_username)
    };
    format!("*** GAME OVER: {} ({}) ***", headline, game_over.reason)
}
