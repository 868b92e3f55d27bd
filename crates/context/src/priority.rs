//! Retention priority ranking.
//!
//! Fixed tiers: system turns always rank highest, turns carrying tool
//! results next, then user and assistant turns with a linear recency bonus
//! — the closer a turn sits to the end of history, the more of the bonus
//! it earns. Priority governs which turns survive compaction, never the
//! order they appear in.

use copperkite_core::turn::{Role, Turn};

/// Base score for system turns.
pub const SYSTEM_BASE: u32 = 90;

/// Base score for turns carrying tool results. Sits above the maximum
/// user score (`USER_BASE + RECENCY_BONUS_MAX`) so the tiers never cross.
pub const TOOL_RESULT_BASE: u32 = 85;

/// Base score for user turns.
pub const USER_BASE: u32 = 50;

/// Base score for assistant turns.
pub const ASSISTANT_BASE: u32 = 40;

/// Maximum recency bonus for user/assistant turns.
pub const RECENCY_BONUS_MAX: u32 = 30;

/// Score a turn's retention priority given its position in history.
///
/// `position` is 0-based; `total` is the history length.
pub fn turn_priority(turn: &Turn, position: usize, total: usize) -> u32 {
    if turn.role == Role::System {
        return SYSTEM_BASE;
    }
    if turn.carries_tool_result() {
        return TOOL_RESULT_BASE;
    }
    let base = match turn.role {
        Role::User => USER_BASE,
        // Tool role without a payload never occurs in practice; rank it
        // with results rather than prose.
        Role::Tool => return TOOL_RESULT_BASE,
        _ => ASSISTANT_BASE,
    };
    base + recency_bonus(position, total)
}

fn recency_bonus(position: usize, total: usize) -> u32 {
    if total <= 1 {
        return RECENCY_BONUS_MAX;
    }
    let fraction = position as f64 / (total - 1) as f64;
    (RECENCY_BONUS_MAX as f64 * fraction).round() as u32
}
