//! Conversation turn domain types.
//!
//! A `Turn` is one message in conversational history: something the user,
//! the model, or a tool produced. Turns are append-only value objects —
//! content is never rewritten after creation. The only post-creation
//! mutation allowed is attaching derived size/priority annotations, which
//! the compactor uses for retention decisions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The role of a turn's author in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user
    User,
    /// The model
    Assistant,
    /// System instructions (identity, rules, synthesized summaries)
    System,
    /// Tool execution result
    Tool,
}

/// A tool invocation requested by the model, attached to an assistant turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Unique call ID (matches the model's block id)
    pub id: String,

    /// Name of the tool capability to invoke
    pub name: String,

    /// Arguments as a structured JSON value
    pub input: serde_json::Value,
}

/// The payload of a tool-result turn, tagged with the originating call id
/// so the model can correlate it with its own request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResultPayload {
    /// Which tool call this result answers
    pub call_id: String,

    /// The result (or error description) as a JSON value
    pub payload: serde_json::Value,

    /// Whether the call terminated in the error state
    #[serde(default)]
    pub is_error: bool,
}

/// A single turn in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    /// Unique turn ID
    pub id: String,

    /// Who produced this turn
    pub role: Role,

    /// The text content
    pub content: String,

    /// Tool calls requested by the assistant (if any)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRequest>,

    /// If this is a tool result, the structured payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_result: Option<ToolResultPayload>,

    /// Timestamp
    pub timestamp: DateTime<Utc>,

    /// Cached size in budget units (derived, attached by the compactor)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub units: Option<usize>,

    /// Cached retention priority (derived, attached by the compactor)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<u32>,
}

impl Turn {
    /// Create a new user turn.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create a new assistant turn.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Create an assistant turn that carries tool call requests.
    pub fn assistant_with_calls(
        content: impl Into<String>,
        tool_calls: Vec<ToolCallRequest>,
    ) -> Self {
        let mut turn = Self::new(Role::Assistant, content);
        turn.tool_calls = tool_calls;
        turn
    }

    /// Create a new system turn.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Create a tool-result turn for the given call.
    pub fn tool_result(
        call_id: impl Into<String>,
        payload: serde_json::Value,
        is_error: bool,
    ) -> Self {
        let payload = ToolResultPayload {
            call_id: call_id.into(),
            payload,
            is_error,
        };
        let mut turn = Self::new(Role::Tool, payload.payload.to_string());
        turn.tool_result = Some(payload);
        turn
    }

    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_result: None,
            timestamp: Utc::now(),
            units: None,
            priority: None,
        }
    }

    /// Whether this turn carries a tool result.
    pub fn carries_tool_result(&self) -> bool {
        self.tool_result.is_some()
    }

    /// Attach derived size/priority annotations. Content is unaffected.
    pub fn annotate(&mut self, units: usize, priority: u32) {
        self.units = Some(units);
        self.priority = Some(priority);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_user_turn() {
        let turn = Turn::user("Hello, agent!");
        assert_eq!(turn.role, Role::User);
        assert_eq!(turn.content, "Hello, agent!");
        assert!(turn.tool_calls.is_empty());
        assert!(!turn.carries_tool_result());
    }

    #[test]
    fn tool_result_turn_tags_call_id() {
        let turn = Turn::tool_result("call_1", serde_json::json!({"temp": 21}), false);
        assert_eq!(turn.role, Role::Tool);
        let result = turn.tool_result.as_ref().unwrap();
        assert_eq!(result.call_id, "call_1");
        assert!(!result.is_error);
        assert!(turn.content.contains("21"));
    }

    #[test]
    fn annotate_attaches_derived_data_only() {
        let mut turn = Turn::assistant("answer");
        turn.annotate(12, 55);
        assert_eq!(turn.units, Some(12));
        assert_eq!(turn.priority, Some(55));
        assert_eq!(turn.content, "answer");
    }

    #[test]
    fn turn_serialization_roundtrip() {
        let turn = Turn::assistant_with_calls(
            "Looking that up.",
            vec![ToolCallRequest {
                id: "call_1".into(),
                name: "weather_lookup".into(),
                input: serde_json::json!({"city": "Oslo"}),
            }],
        );
        let json = serde_json::to_string(&turn).unwrap();
        let back: Turn = serde_json::from_str(&json).unwrap();
        assert_eq!(back.tool_calls.len(), 1);
        assert_eq!(back.tool_calls[0].name, "weather_lookup");
        assert_eq!(back.role, Role::Assistant);
    }

    #[test]
    fn derived_fields_skipped_when_absent() {
        let turn = Turn::user("hi");
        let json = serde_json::to_string(&turn).unwrap();
        assert!(!json.contains("units"));
        assert!(!json.contains("priority"));
        assert!(!json.contains("tool_result"));
    }
}
