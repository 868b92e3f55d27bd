//! # Copperkite Context
//!
//! Keeps the growing tool-result history under the model's input ceiling.
//! Three pieces, leaves first: the budget estimator (turn size in abstract
//! units), the priority ranker (retention score per turn), and the
//! compactor (which turns survive, which are replaced by a synthesized
//! summary).

pub mod compactor;
pub mod estimate;
pub mod priority;

pub use compactor::{CompactionOutcome, ContextCompactor};
pub use estimate::{turn_units, turns_units};
pub use priority::turn_priority;
