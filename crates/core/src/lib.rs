//! # Copperkite Core
//!
//! Domain types, traits, and error definitions for the copperkite
//! tool-orchestration runtime. This crate defines the model that all other
//! crates implement against: conversation turns, the model-provider and
//! tool-executor boundaries, and the event bus used for progress reporting.
//!
//! ## Design Philosophy
//!
//! Every external collaborator (model provider, tool back end, summarizer,
//! session store) is defined as a trait here. Implementations live in their
//! respective crates or in the embedding application. This enables:
//! - Swapping implementations via configuration
//! - Easy testing with mock/stub implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod error;
pub mod event;
pub mod executor;
pub mod model;
pub mod summarize;
pub mod turn;

// Re-export key types at crate root for ergonomics
pub use error::{Error, ExecutorError, ModelError, PipelineError, Result, SummarizeError};
pub use event::{AgentEvent, EventBus};
pub use executor::ToolExecutor;
pub use model::{BlockPayload, ModelClient, ModelRequest, ModelResponse, StreamEvent, ToolDefinition};
pub use summarize::Summarizer;
pub use turn::{Role, ToolCallRequest, ToolResultPayload, Turn};
