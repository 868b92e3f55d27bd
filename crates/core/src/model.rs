//! Model provider boundary.
//!
//! A `ModelClient` knows how to send a conversation to a language model and
//! get a response back: either an incremental event stream, or a complete
//! non-streamed response. The coordinator consumes the stream for
//! responsiveness and falls back to `complete()` when a streamed tool call
//! needs its structured record recovered.
//!
//! Streamed output arrives as content blocks with three event kinds:
//! block-start, block-delta, block-stop. A block carrying a `name` is a
//! tool call whose input arrives as partial JSON fragments; a block without
//! one is plain answer text.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::turn::{ToolCallRequest, Turn};

/// A fragment delivered inside a block-delta event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BlockPayload {
    /// Plain answer text
    Text { text: String },

    /// A fragment of a tool call's JSON input
    InputFragment { partial_json: String },
}

/// One event in the model's incremental response stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// A new content block begins. `name` is present for tool-call blocks.
    BlockStart {
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },

    /// A fragment of a block's content arrived
    BlockDelta { id: String, delta: BlockPayload },

    /// The block's content is now complete
    BlockStop { id: String },
}

/// A tool definition sent to the model so it knows what it can call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The tool name
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}

/// Configuration for a model request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelRequest {
    /// The model to use
    pub model: String,

    /// The conversation context, oldest first
    pub turns: Vec<Turn>,

    /// Temperature (0.0 = deterministic, 1.0 = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Available tools the model can call
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
}

fn default_temperature() -> f32 {
    0.7
}

/// A complete (non-streamed) model response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelResponse {
    /// The generated answer text
    pub text: String,

    /// Tool calls requested by the model, with fully-parsed inputs
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRequest>,

    /// Which model actually responded
    pub model: String,
}

/// The model provider boundary.
///
/// The coordinator calls `stream()` or `complete()` without knowing which
/// back end is in use. Transport, authentication, and retry policy all live
/// behind this trait.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// A human-readable name for this client.
    fn name(&self) -> &str;

    /// Send a request and receive an incremental event stream.
    async fn stream(
        &self,
        request: ModelRequest,
    ) -> std::result::Result<
        tokio::sync::mpsc::Receiver<std::result::Result<StreamEvent, ModelError>>,
        ModelError,
    >;

    /// Send a request and receive the complete structured response.
    ///
    /// Used to recover a tool call's full record when its streamed input
    /// fragments did not reassemble into valid JSON.
    async fn complete(
        &self,
        request: ModelRequest,
    ) -> std::result::Result<ModelResponse, ModelError>;
}
