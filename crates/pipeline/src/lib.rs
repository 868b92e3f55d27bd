//! # Copperkite Pipeline
//!
//! The unit of work for one conversational round: tool call records with an
//! explicit lifecycle, heuristic dependency inference between them, and the
//! execution pipeline that runs ready records against an injected executor
//! and folds results back into conversational context.

pub mod deps;
pub mod pipeline;
pub mod record;

pub use deps::infer_dependencies;
pub use pipeline::{PipelineMetrics, ToolPipeline};
pub use record::{CallRecord, CallStatus};
