//! Summarization boundary.
//!
//! When compaction drops turns, a replacement summary turn is synthesized
//! by a secondary model request. That request lives behind this trait; the
//! implementation must not call back into the orchestration pipeline.

use async_trait::async_trait;

use crate::error::SummarizeError;
use crate::turn::Turn;

/// The summarization boundary used by the context compactor.
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Condense the given turns into a single replacement turn of at most
    /// `max_units` estimated budget units.
    async fn summarize(
        &self,
        turns: &[Turn],
        max_units: usize,
    ) -> std::result::Result<Turn, SummarizeError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct HeadlineSummarizer;

    #[async_trait]
    impl Summarizer for HeadlineSummarizer {
        async fn summarize(
            &self,
            turns: &[Turn],
            _max_units: usize,
        ) -> std::result::Result<Turn, SummarizeError> {
            Ok(Turn::system(format!("{} earlier turns", turns.len())))
        }
    }

    #[tokio::test]
    async fn summarizer_produces_single_turn() {
        let turns = vec![Turn::user("a"), Turn::assistant("b")];
        let summary = HeadlineSummarizer.summarize(&turns, 100).await.unwrap();
        assert!(summary.content.contains("2 earlier turns"));
    }
}
