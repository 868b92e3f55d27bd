//! Tool call records and their lifecycle.
//!
//! A `CallRecord` is one requested external invocation. Its status only
//! moves forward: `pending → executing → {completed | error}`. Terminal
//! states are final — no transition is reversible, and an attempted illegal
//! transition is a caller bug surfaced as `InvalidTransition`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Instant;

use copperkite_core::error::PipelineError;

/// The lifecycle state of a tool call record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallStatus {
    /// Registered, waiting on dependencies
    Pending,
    /// Handed to the executor
    Executing,
    /// Executor resolved successfully (terminal)
    Completed,
    /// Executor raised an error (terminal)
    Error,
}

impl CallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Executing => "executing",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }

    /// Whether this state admits no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }
}

impl std::fmt::Display for CallStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One requested external invocation within a conversational round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallRecord {
    /// Opaque identifier, unique within the round
    pub id: String,

    /// Which tool capability to invoke
    pub name: String,

    /// Structured arguments. Immutable once the call enters execution.
    pub input: serde_json::Value,

    /// Ids of records this call's input appears to reference
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub dependencies: BTreeSet<String>,

    /// Lifecycle state
    pub status: CallStatus,

    /// Present only when `status` is `completed`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,

    /// Present only when `status` is `error`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Wall-clock duration of the executing state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_time_ms: Option<u64>,

    #[serde(skip)]
    started_at: Option<Instant>,
}

impl CallRecord {
    /// Create a new record in the `pending` state.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        input: serde_json::Value,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            input,
            dependencies: BTreeSet::new(),
            status: CallStatus::Pending,
            result: None,
            error: None,
            execution_time_ms: None,
            started_at: None,
        }
    }

    /// Transition `pending → executing`.
    pub fn begin_execution(&mut self) -> Result<(), PipelineError> {
        if self.status != CallStatus::Pending {
            return Err(self.invalid_transition("executing"));
        }
        self.status = CallStatus::Executing;
        self.started_at = Some(Instant::now());
        Ok(())
    }

    /// Transition `executing → completed`, recording the result and the
    /// execution duration.
    pub fn complete(&mut self, result: serde_json::Value) -> Result<(), PipelineError> {
        if self.status != CallStatus::Executing {
            return Err(self.invalid_transition("completed"));
        }
        self.status = CallStatus::Completed;
        self.result = Some(result);
        self.execution_time_ms = Some(self.elapsed_ms());
        Ok(())
    }

    /// Transition `executing → error`, recording the error and the
    /// execution duration.
    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), PipelineError> {
        if self.status != CallStatus::Executing {
            return Err(self.invalid_transition("error"));
        }
        self.status = CallStatus::Error;
        self.error = Some(error.into());
        self.execution_time_ms = Some(self.elapsed_ms());
        Ok(())
    }

    /// Whether this record is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    fn elapsed_ms(&self) -> u64 {
        self.started_at
            .map(|s| s.elapsed().as_millis() as u64)
            .unwrap_or(0)
    }

    fn invalid_transition(&self, attempted: &str) -> PipelineError {
        PipelineError::InvalidTransition {
            call_id: self.id.clone(),
            from: self.status.as_str().into(),
            attempted: attempted.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> CallRecord {
        CallRecord::new("call_1", "weather_lookup", serde_json::json!({"city": "Oslo"}))
    }

    #[test]
    fn happy_path_forward_only() {
        let mut rec = record();
        assert_eq!(rec.status, CallStatus::Pending);

        rec.begin_execution().unwrap();
        assert_eq!(rec.status, CallStatus::Executing);

        rec.complete(serde_json::json!({"temp": 4})).unwrap();
        assert_eq!(rec.status, CallStatus::Completed);
        assert!(rec.result.is_some());
        assert!(rec.error.is_none());
        assert!(rec.execution_time_ms.is_some());
    }

    #[test]
    fn fail_records_error_and_duration() {
        let mut rec = record();
        rec.begin_execution().unwrap();
        rec.fail("upstream 503").unwrap();
        assert_eq!(rec.status, CallStatus::Error);
        assert_eq!(rec.error.as_deref(), Some("upstream 503"));
        assert!(rec.result.is_none());
        assert!(rec.execution_time_ms.is_some());
    }

    #[test]
    fn cannot_complete_from_pending() {
        let mut rec = record();
        let err = rec.complete(serde_json::json!(null)).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidTransition { .. }));
        assert_eq!(rec.status, CallStatus::Pending);
    }

    #[test]
    fn cannot_begin_twice() {
        let mut rec = record();
        rec.begin_execution().unwrap();
        assert!(rec.begin_execution().is_err());
    }

    #[test]
    fn terminal_states_are_final() {
        let mut rec = record();
        rec.begin_execution().unwrap();
        rec.complete(serde_json::json!(1)).unwrap();

        assert!(rec.begin_execution().is_err());
        assert!(rec.complete(serde_json::json!(2)).is_err());
        assert!(rec.fail("late").is_err());
        // Original result untouched
        assert_eq!(rec.result, Some(serde_json::json!(1)));
    }

    #[test]
    fn no_transition_out_of_error() {
        let mut rec = record();
        rec.begin_execution().unwrap();
        rec.fail("boom").unwrap();
        assert!(rec.complete(serde_json::json!(null)).is_err());
        assert!(rec.begin_execution().is_err());
    }

    /// Property-style sweep: from every reachable state, only the legal
    /// transition succeeds and illegal ones leave the record unchanged.
    #[test]
    fn only_forward_transitions_reachable() {
        let transitions: [fn(&mut CallRecord) -> Result<(), PipelineError>; 3] = [
            |r| r.begin_execution(),
            |r| r.complete(serde_json::json!(null)),
            |r| r.fail("x"),
        ];

        // Try every transition pair; count how many two-step sequences work.
        for (i, first) in transitions.iter().enumerate() {
            for second in &transitions {
                let mut rec = record();
                let first_ok = first(&mut rec).is_ok();
                // Only begin_execution is legal from pending
                assert_eq!(first_ok, i == 0);
                let status_after_first = rec.status;
                let second_ok = second(&mut rec).is_ok();
                if !second_ok {
                    assert_eq!(rec.status, status_after_first);
                }
                // Once terminal, nothing succeeds
                if status_after_first.is_terminal() {
                    assert!(!second_ok);
                }
            }
        }
    }
}
