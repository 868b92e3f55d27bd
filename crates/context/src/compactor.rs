//! The context compactor.
//!
//! Given a turn history and a unit budget, decides which turns to keep
//! verbatim and replaces the rest with a single synthesized summary turn.
//! Priority governs *inclusion* only; the surviving turns are always
//! returned in their original chronological order so the model reads a
//! causally coherent history.
//!
//! Compaction triggers once total size exceeds `trigger_ratio` of the
//! budget, and the selection budget is held *below* the trigger point so
//! that compacting an already-compacted history is a no-op.
//!
//! Turns are never rewritten — the compactor only selects, annotates
//! derived size/priority data, and synthesizes replacement summaries.
//! Instances hold no per-conversation state; concurrent compactions on
//! different conversations are independent.

use std::sync::Arc;
use tracing::{debug, warn};

use copperkite_core::summarize::Summarizer;
use copperkite_core::turn::Turn;

use crate::estimate::{turn_units, turns_units};
use crate::priority::turn_priority;

/// Share of the selection budget reserved for the synthesized summary.
const SUMMARY_RESERVE_DIVISOR: usize = 8;

/// What a compaction pass did.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CompactionOutcome {
    /// The surviving history, chronological, summary first if one exists
    pub turns: Vec<Turn>,
    /// Whether anything was dropped or replaced
    pub compacted: bool,
    /// Whether a synthesized summary turn was inserted
    pub summarized: bool,
    pub turns_before: usize,
    pub units_before: usize,
    pub units_after: usize,
}

/// Selects which turns survive into the next model request.
pub struct ContextCompactor {
    summarizer: Arc<dyn Summarizer>,
    trigger_ratio: f32,
    summary_chunk: usize,
}

impl ContextCompactor {
    /// Create a compactor with the given summarization boundary.
    pub fn new(summarizer: Arc<dyn Summarizer>) -> Self {
        Self {
            summarizer,
            trigger_ratio: 0.8,
            summary_chunk: 20,
        }
    }

    /// Set the budget fraction at which compaction triggers.
    pub fn with_trigger_ratio(mut self, ratio: f32) -> Self {
        self.trigger_ratio = ratio;
        self
    }

    /// Set how many dropped turns are summarized per request chunk.
    pub fn with_summary_chunk(mut self, chunk: usize) -> Self {
        self.summary_chunk = chunk;
        self
    }

    /// Compact `turns` to fit within `target_units`.
    ///
    /// Below the trigger point the input is returned unchanged. Above it,
    /// turns are ranked, the highest-priority set that fits is kept (in
    /// chronological order), and the dropped remainder is condensed into a
    /// single summary turn inserted before the oldest survivor. If the
    /// summarization request fails, the dropped turns are simply truncated
    /// away, oldest first.
    pub async fn compact(&self, turns: Vec<Turn>, target_units: usize) -> CompactionOutcome {
        let turns_before = turns.len();
        let units_before = turns_units(&turns);
        let trigger_units = (target_units as f64 * self.trigger_ratio as f64) as usize;

        if units_before <= trigger_units {
            return CompactionOutcome {
                turns,
                compacted: false,
                summarized: false,
                turns_before,
                units_before,
                units_after: units_before,
            };
        }

        // Annotate every turn with its derived size and priority.
        let total = turns.len();
        let mut annotated: Vec<Turn> = turns;
        for (position, turn) in annotated.iter_mut().enumerate() {
            let units = turn_units(turn);
            let priority = turn_priority(turn, position, total);
            turn.annotate(units, priority);
        }

        // Keep room for the summary inside the post-compaction target so a
        // second pass lands under the trigger and returns its input as-is.
        let reserve = (trigger_units / SUMMARY_RESERVE_DIVISOR).max(1);
        let select_budget = trigger_units.saturating_sub(reserve);

        // Greedy selection in descending priority order. The sort is
        // stable, so equal-priority turns keep chronological precedence.
        let mut by_priority: Vec<usize> = (0..annotated.len()).collect();
        by_priority.sort_by_key(|&i| std::cmp::Reverse(annotated[i].priority.unwrap_or(0)));

        let mut accepted = vec![false; annotated.len()];
        let mut used = 0usize;
        for &i in &by_priority {
            let units = annotated[i].units.unwrap_or(0);
            if used + units <= select_budget {
                accepted[i] = true;
                used += units;
            }
        }

        let (kept, dropped): (Vec<Turn>, Vec<Turn>) = {
            let mut kept = Vec::new();
            let mut dropped = Vec::new();
            for (i, turn) in annotated.into_iter().enumerate() {
                if accepted[i] {
                    kept.push(turn);
                } else {
                    dropped.push(turn);
                }
            }
            (kept, dropped)
        };

        if dropped.is_empty() {
            let units_after = turns_units(&kept);
            return CompactionOutcome {
                turns: kept,
                compacted: false,
                summarized: false,
                turns_before,
                units_before,
                units_after,
            };
        }

        debug!(
            kept = kept.len(),
            dropped = dropped.len(),
            units_before,
            "Compaction triggered"
        );

        match self.summarize_dropped(&dropped, reserve).await {
            Ok(summary) => {
                let mut result = Vec::with_capacity(kept.len() + 1);
                result.push(summary);
                result.extend(kept);
                let units_after = turns_units(&result);
                CompactionOutcome {
                    turns: result,
                    compacted: true,
                    summarized: true,
                    turns_before,
                    units_before,
                    units_after,
                }
            }
            Err(e) => {
                warn!(error = %e, "Summarization failed, falling back to truncation");
                let result = truncate_oldest(kept, dropped, trigger_units);
                let units_after = turns_units(&result);
                CompactionOutcome {
                    turns: result,
                    compacted: true,
                    summarized: false,
                    turns_before,
                    units_before,
                    units_after,
                }
            }
        }
    }

    /// Summarize the dropped turns in chunks, tool-result-bearing chunks
    /// first so they get the larger share of the summary budget, then fold
    /// the chunk summaries into one replacement turn.
    async fn summarize_dropped(
        &self,
        dropped: &[Turn],
        max_units: usize,
    ) -> Result<Turn, copperkite_core::error::SummarizeError> {
        let chunks: Vec<&[Turn]> = dropped.chunks(self.summary_chunk).collect();

        // Weight: chunks containing tool results are summarized first and
        // get a double share of the unit budget.
        let mut order: Vec<usize> = (0..chunks.len()).collect();
        order.sort_by_key(|&i| !chunks[i].iter().any(|t| t.carries_tool_result()));

        let weights: Vec<usize> = chunks
            .iter()
            .map(|c| {
                if c.iter().any(|t| t.carries_tool_result()) {
                    2
                } else {
                    1
                }
            })
            .collect();
        let total_weight: usize = weights.iter().sum::<usize>().max(1);

        let mut pieces: Vec<(usize, String)> = Vec::with_capacity(chunks.len());
        for &i in &order {
            let chunk_budget = (max_units * weights[i] / total_weight).max(1);
            let piece = self.summarizer.summarize(chunks[i], chunk_budget).await?;
            pieces.push((i, piece.content));
        }
        // Chunk summaries read in chronological order regardless of the
        // order they were requested in.
        pieces.sort_by_key(|(i, _)| *i);

        let body = pieces
            .into_iter()
            .map(|(_, text)| text)
            .collect::<Vec<_>>()
            .join("\n");
        Ok(Turn::system(format!(
            "[Summary of {} earlier turns]\n{}",
            dropped.len(),
            body
        )))
    }
}

/// Plain truncation fallback: without a summary, the safest degraded
/// history is simply the most recent turns that fit. Priority selection is
/// abandoned — the full chronology is rebuilt and cut from the front.
fn truncate_oldest(kept: Vec<Turn>, dropped: Vec<Turn>, budget: usize) -> Vec<Turn> {
    let mut all: Vec<Turn> = kept.into_iter().chain(dropped).collect();
    all.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));

    let mut start = 0;
    while start < all.len() && turns_units(&all[start..]) > budget {
        start += 1;
    }
    all.split_off(start)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use copperkite_core::error::SummarizeError;

    /// Summarizer that produces a short fixed-size summary.
    struct StubSummarizer;

    #[async_trait]
    impl Summarizer for StubSummarizer {
        async fn summarize(
            &self,
            turns: &[Turn],
            _max_units: usize,
        ) -> Result<Turn, SummarizeError> {
            Ok(Turn::system(format!("({} turns condensed)", turns.len())))
        }
    }

    /// Summarizer that always fails.
    struct BrokenSummarizer;

    #[async_trait]
    impl Summarizer for BrokenSummarizer {
        async fn summarize(&self, _: &[Turn], _: usize) -> Result<Turn, SummarizeError> {
            Err(SummarizeError::Failed("model unavailable".into()))
        }
    }

    fn compactor() -> ContextCompactor {
        ContextCompactor::new(Arc::new(StubSummarizer))
    }

    /// A history alternating user/assistant turns of roughly `unit_each`
    /// units apiece.
    fn history(count: usize, unit_each: usize) -> Vec<Turn> {
        // 0.25 units/char → chars = 4 * units (minus overhead)
        let chars = (unit_each.saturating_sub(4)) * 4;
        (0..count)
            .map(|i| {
                if i % 2 == 0 {
                    Turn::user(format!("{i:<width$}", width = chars))
                } else {
                    Turn::assistant(format!("{i:<width$}", width = chars))
                }
            })
            .collect()
    }

    #[tokio::test]
    async fn under_trigger_is_untouched() {
        let turns = history(4, 100); // ~400 units
        let ids: Vec<String> = turns.iter().map(|t| t.id.clone()).collect();

        let outcome = compactor().compact(turns, 1000).await;
        assert!(!outcome.compacted);
        assert!(!outcome.summarized);
        let out_ids: Vec<String> = outcome.turns.iter().map(|t| t.id.clone()).collect();
        assert_eq!(out_ids, ids);
    }

    #[tokio::test]
    async fn over_budget_history_is_cut_to_fit() {
        // ~120,000 units of history against an 80,000 budget
        let turns = history(120, 1000);
        assert!(turns_units(&turns) > 100_000);

        let outcome = compactor().compact(turns, 80_000).await;
        assert!(outcome.compacted);
        assert!(outcome.summarized);
        assert!(outcome.units_after <= 80_000);
        assert!(turns_units(&outcome.turns) <= 80_000);

        // The summary sits before the oldest retained original turn
        assert!(outcome.turns[0].content.starts_with("[Summary of"));
    }

    #[tokio::test]
    async fn survivors_keep_chronological_order() {
        let turns = history(60, 1000);
        let order: Vec<String> = turns.iter().map(|t| t.id.clone()).collect();

        let outcome = compactor().compact(turns, 20_000).await;
        let survivors: Vec<String> = outcome
            .turns
            .iter()
            .filter(|t| !t.content.starts_with("[Summary of"))
            .map(|t| t.id.clone())
            .collect();

        // Every survivor appears in the original relative order
        let mut last = 0;
        for id in &survivors {
            let pos = order.iter().position(|o| o == id).unwrap();
            assert!(pos >= last, "survivor order must be chronological");
            last = pos;
        }
    }

    #[tokio::test]
    async fn compaction_is_idempotent() {
        let turns = history(60, 1000);
        let first = compactor().compact(turns, 20_000).await;
        assert!(first.compacted);

        let survivors: Vec<String> = first.turns.iter().map(|t| t.id.clone()).collect();
        let second = compactor().compact(first.turns, 20_000).await;
        assert!(!second.compacted);
        let again: Vec<String> = second.turns.iter().map(|t| t.id.clone()).collect();
        assert_eq!(survivors, again);
    }

    #[tokio::test]
    async fn tool_results_survive_over_older_prose() {
        let mut turns = history(40, 1000);
        // Insert a tool-result turn early in history
        let result = Turn::tool_result("call_1", serde_json::json!({"rows": 3}), false);
        let result_id = result.id.clone();
        turns.insert(2, result);

        let outcome = compactor().compact(turns, 12_000).await;
        assert!(
            outcome.turns.iter().any(|t| t.id == result_id),
            "tool result should be retained despite its age"
        );
    }

    #[tokio::test]
    async fn system_turns_always_survive() {
        let mut turns = vec![Turn::system("You are a helpful assistant.")];
        let system_id = turns[0].id.clone();
        turns.extend(history(60, 1000));

        let outcome = compactor().compact(turns, 20_000).await;
        assert!(outcome.turns.iter().any(|t| t.id == system_id));
    }

    #[tokio::test]
    async fn summarizer_failure_falls_back_to_truncation() {
        let compactor = ContextCompactor::new(Arc::new(BrokenSummarizer));
        let turns = history(60, 1000);
        let newest_id = turns.last().unwrap().id.clone();

        let outcome = compactor.compact(turns, 20_000).await;
        assert!(outcome.compacted);
        assert!(!outcome.summarized);
        assert!(outcome.units_after <= 20_000);
        // No synthesized summary in the degraded output
        assert!(!outcome.turns.iter().any(|t| t.content.starts_with("[Summary of")));
        // The newest turn survives truncation
        assert_eq!(outcome.turns.last().unwrap().id, newest_id);
    }

    #[tokio::test]
    async fn deterministic_for_fixed_input() {
        let turns = history(50, 800);
        let a = compactor().compact(turns.clone(), 15_000).await;
        let b = compactor().compact(turns, 15_000).await;
        let ids = |o: &CompactionOutcome| {
            o.turns
                .iter()
                .filter(|t| !t.content.starts_with("[Summary of"))
                .map(|t| t.id.clone())
                .collect::<Vec<_>>()
        };
        assert_eq!(ids(&a), ids(&b));
        assert_eq!(a.units_after, b.units_after);
    }
}
