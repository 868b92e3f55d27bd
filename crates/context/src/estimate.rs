//! Turn size estimation in abstract budget units.
//!
//! Uses character-count heuristics with a per-category multiplier: plain
//! prose costs fewer units per character than structured payloads, which
//! tokenize densely. Structured payloads are serialized before measuring.
//! The approximation is deliberately coarse — compaction decisions don't
//! need tokenizer-exact counts.

use copperkite_core::turn::Turn;

/// Units per character of plain prose.
const PROSE_UNITS_PER_CHAR: f64 = 0.25;

/// Units per character of a serialized tool-call request.
const STRUCTURED_UNITS_PER_CHAR: f64 = 0.30;

/// Units per character of a serialized tool-result payload.
const TOOL_RESULT_UNITS_PER_CHAR: f64 = 0.35;

/// Fixed cost per turn for role markers and wire-format delimiters.
const TURN_OVERHEAD_UNITS: usize = 4;

fn scaled(chars: usize, rate: f64) -> usize {
    (chars as f64 * rate).ceil() as usize
}

/// Estimate the size of one turn.
pub fn turn_units(turn: &Turn) -> usize {
    let mut units = TURN_OVERHEAD_UNITS;

    if let Some(result) = &turn.tool_result {
        units += scaled(result.payload.to_string().len(), TOOL_RESULT_UNITS_PER_CHAR);
    } else {
        units += scaled(turn.content.len(), PROSE_UNITS_PER_CHAR);
    }

    for call in &turn.tool_calls {
        let serialized = serde_json::to_string(call).unwrap_or_default();
        units += scaled(serialized.len(), STRUCTURED_UNITS_PER_CHAR);
    }

    units
}

/// Estimate the total size of a slice of turns.
pub fn turns_units(turns: &[Turn]) -> usize {
    turns.iter().map(turn_units).sum()
}
