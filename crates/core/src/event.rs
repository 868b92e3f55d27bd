//! Agent progress events — the UI/observability boundary.
//!
//! Every record state transition and every coordinator phase transition is
//! published here, synchronously with the transition so intermediate state
//! is never lost. Delivery is fire-and-forget over a broadcast channel:
//! `publish` never blocks the pipeline, and no subscribers is fine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// All progress events emitted during a round.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// A tool call was registered with the pipeline
    CallRegistered {
        call_id: String,
        name: String,
        dependencies: Vec<String>,
        timestamp: DateTime<Utc>,
    },

    /// A tool call entered the executing state
    CallStarted {
        call_id: String,
        name: String,
        timestamp: DateTime<Utc>,
    },

    /// A tool call completed successfully
    CallCompleted {
        call_id: String,
        name: String,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// A tool call terminated in the error state
    CallFailed {
        call_id: String,
        name: String,
        error: String,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// A fragment of plain answer text arrived from the model stream.
    /// Forwarded immediately for responsiveness, before the round ends.
    TextDelta { content: String },

    /// A fragment of a tool call's streamed input arrived
    InputDelta { call_id: String, fragment: String },

    /// A new phase (send context → parse → execute) began
    PhaseStarted {
        phase: u32,
        timestamp: DateTime<Utc>,
    },

    /// A phase finished executing its runnable records
    PhaseFinished {
        phase: u32,
        calls_executed: usize,
        timestamp: DateTime<Utc>,
    },

    /// The compactor replaced part of the history
    ContextCompacted {
        turns_before: usize,
        turns_after: usize,
        units_before: usize,
        units_after: usize,
        summarized: bool,
        timestamp: DateTime<Utc>,
    },

    /// The round reached a terminal state
    RoundFinished {
        phases: u32,
        stop_reason: String,
        timestamp: DateTime<Utc>,
    },
}

impl AgentEvent {
    /// Wire-level event name for this event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::CallRegistered { .. } => "call_registered",
            Self::CallStarted { .. } => "call_started",
            Self::CallCompleted { .. } => "call_completed",
            Self::CallFailed { .. } => "call_failed",
            Self::TextDelta { .. } => "text_delta",
            Self::InputDelta { .. } => "input_delta",
            Self::PhaseStarted { .. } => "phase_started",
            Self::PhaseFinished { .. } => "phase_finished",
            Self::ContextCompacted { .. } => "context_compacted",
            Self::RoundFinished { .. } => "round_finished",
        }
    }
}

/// A broadcast-based bus for agent progress events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub. Components
/// subscribe to receive all events and filter for what they care about.
pub struct EventBus {
    sender: broadcast::Sender<Arc<AgentEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: AgentEvent) {
        // Ignore send errors (no subscribers = that's fine)
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<AgentEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
