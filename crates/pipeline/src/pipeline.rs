//! The execution pipeline for one conversational round.
//!
//! Owns the set of tool call records requested during the round, applies
//! dependency inference as calls are registered, selects runnable records
//! (FIFO among those whose dependencies are all completed), and runs them
//! against an injected executor. Executor failures are caught per record
//! and converted to the `error` state — they never abort the pipeline, and
//! no retry is attempted here.
//!
//! Dependents of a failed call remain `pending` indefinitely: the pipeline
//! does not propagate a cancelled-due-to-failed-dependency state. Such
//! records are observable via [`ToolPipeline::stalled`] and the metrics
//! snapshot, and `is_complete()` stays false while any exist.

use chrono::Utc;
use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, warn};

use copperkite_core::error::{ExecutorError, PipelineError};
use copperkite_core::event::{AgentEvent, EventBus};
use copperkite_core::executor::ToolExecutor;
use copperkite_core::turn::Turn;

use crate::deps::infer_dependencies;
use crate::record::{CallRecord, CallStatus};

/// Read-only counts and timings over the pipeline's records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineMetrics {
    pub total: usize,
    pub pending: usize,
    pub executing: usize,
    pub completed: usize,
    pub errored: usize,
    /// Pending records that can never run because a dependency failed
    pub stalled: usize,
    pub total_execution_ms: u64,
    pub mean_execution_ms: Option<f64>,
}

/// The per-round execution pipeline.
///
/// Created per user turn, discarded once the round's final answer is
/// produced. Records are owned exclusively by this instance and are never
/// shared across rounds.
pub struct ToolPipeline {
    records: Vec<CallRecord>,
    bus: Arc<EventBus>,
    phase: u32,
    phase_ceiling: u32,
}

impl ToolPipeline {
    /// Create an empty pipeline bounded by `phase_ceiling` phases.
    pub fn new(bus: Arc<EventBus>, phase_ceiling: u32) -> Self {
        Self {
            records: Vec::new(),
            bus,
            phase: 0,
            phase_ceiling,
        }
    }

    // ── Registration ──────────────────────────────────────────────────────

    /// Register a call, inferring its dependencies against the records
    /// already in the pipeline. Ordering of registration matters: later
    /// records are never considered as dependencies of earlier ones.
    pub fn add_call(
        &mut self,
        id: impl Into<String>,
        name: impl Into<String>,
        input: serde_json::Value,
    ) -> Result<&CallRecord, PipelineError> {
        let prior: Vec<(String, usize)> = self
            .records
            .iter()
            .enumerate()
            .map(|(i, r)| (r.id.clone(), i))
            .collect();
        let dependencies = infer_dependencies(&input, &prior);
        self.register(id.into(), name.into(), input, dependencies)
    }

    /// Register a call with an explicitly declared dependency set,
    /// bypassing the textual heuristic. A dependency naming an id that is
    /// never registered keeps the record pending forever.
    pub fn add_call_with_deps(
        &mut self,
        id: impl Into<String>,
        name: impl Into<String>,
        input: serde_json::Value,
        dependencies: BTreeSet<String>,
    ) -> Result<&CallRecord, PipelineError> {
        self.register(id.into(), name.into(), input, dependencies)
    }

    fn register(
        &mut self,
        id: String,
        name: String,
        input: serde_json::Value,
        dependencies: BTreeSet<String>,
    ) -> Result<&CallRecord, PipelineError> {
        if self.records.iter().any(|r| r.id == id) {
            return Err(PipelineError::DuplicateCall(id));
        }

        debug!(call_id = %id, tool = %name, deps = dependencies.len(), "Registered tool call");
        self.bus.publish(AgentEvent::CallRegistered {
            call_id: id.clone(),
            name: name.clone(),
            dependencies: dependencies.iter().cloned().collect(),
            timestamp: Utc::now(),
        });

        let mut record = CallRecord::new(id, name, input);
        record.dependencies = dependencies;
        let idx = self.records.len();
        self.records.push(record);
        Ok(&self.records[idx])
    }

    // ── Selection ─────────────────────────────────────────────────────────

    fn dependency_completed(&self, dep: &str) -> bool {
        self.records
            .iter()
            .any(|r| r.id == dep && r.status == CallStatus::Completed)
    }

    fn runnable_indices(&self) -> Vec<usize> {
        self.records
            .iter()
            .enumerate()
            .filter(|(_, r)| {
                r.status == CallStatus::Pending
                    && r.dependencies.iter().all(|d| self.dependency_completed(d))
            })
            .map(|(i, _)| i)
            .collect()
    }

    /// The first pending record whose dependencies are all completed.
    /// Selection is registration order — FIFO among eligible records.
    pub fn next_runnable(&self) -> Option<&CallRecord> {
        self.runnable_indices()
            .first()
            .map(|&i| &self.records[i])
    }

    // ── Execution ─────────────────────────────────────────────────────────

    /// Run the next runnable record to a terminal state. Returns the
    /// updated record, or `None` if nothing was runnable.
    pub async fn run_next(
        &mut self,
        executor: &dyn ToolExecutor,
    ) -> Result<Option<&CallRecord>, PipelineError> {
        let Some(idx) = self.runnable_indices().first().copied() else {
            return Ok(None);
        };

        self.begin(idx)?;
        let name = self.records[idx].name.clone();
        let input = self.records[idx].input.clone();
        let outcome = executor.execute(&name, &input).await;
        self.finish(idx, outcome)?;
        Ok(Some(&self.records[idx]))
    }

    /// Drain all currently-runnable work, including dependency chains that
    /// unlock as upstream records complete. Mutually independent records
    /// are dispatched to the executor concurrently; terminal transitions
    /// are applied (and published) as each invocation resolves.
    ///
    /// Returns the number of records driven to a terminal state.
    pub async fn run_phase(
        &mut self,
        executor: &dyn ToolExecutor,
    ) -> Result<usize, PipelineError> {
        let mut executed = 0;

        loop {
            let batch = self.runnable_indices();
            if batch.is_empty() {
                break;
            }

            for &idx in &batch {
                self.begin(idx)?;
            }

            let mut in_flight: FuturesUnordered<_> = batch
                .iter()
                .map(|&idx| {
                    let name = self.records[idx].name.clone();
                    let input = self.records[idx].input.clone();
                    async move { (idx, executor.execute(&name, &input).await) }
                })
                .collect();

            while let Some((idx, outcome)) = in_flight.next().await {
                self.finish(idx, outcome)?;
                executed += 1;
            }
        }

        Ok(executed)
    }

    fn begin(&mut self, idx: usize) -> Result<(), PipelineError> {
        let record = &mut self.records[idx];
        record.begin_execution()?;
        self.bus.publish(AgentEvent::CallStarted {
            call_id: record.id.clone(),
            name: record.name.clone(),
            timestamp: Utc::now(),
        });
        Ok(())
    }

    fn finish(
        &mut self,
        idx: usize,
        outcome: Result<serde_json::Value, ExecutorError>,
    ) -> Result<(), PipelineError> {
        let record = &mut self.records[idx];
        match outcome {
            Ok(result) => {
                record.complete(result)?;
                self.bus.publish(AgentEvent::CallCompleted {
                    call_id: record.id.clone(),
                    name: record.name.clone(),
                    duration_ms: record.execution_time_ms.unwrap_or(0),
                    timestamp: Utc::now(),
                });
            }
            Err(e) => {
                warn!(call_id = %record.id, tool = %record.name, error = %e, "Tool call failed");
                record.fail(e.to_string())?;
                self.bus.publish(AgentEvent::CallFailed {
                    call_id: record.id.clone(),
                    name: record.name.clone(),
                    error: record.error.clone().unwrap_or_default(),
                    duration_ms: record.execution_time_ms.unwrap_or(0),
                    timestamp: Utc::now(),
                });
            }
        }
        Ok(())
    }

    // ── Inspection ────────────────────────────────────────────────────────

    /// True iff every record is in a terminal state. Stalled dependents of
    /// a failed call keep this false for the rest of the round.
    pub fn is_complete(&self) -> bool {
        self.records.iter().all(|r| r.is_terminal())
    }

    /// Pending records that can never run: a dependency ended in `error`,
    /// names no registered record, or is itself stalled.
    pub fn stalled(&self) -> Vec<&CallRecord> {
        let mut stalled_ids: BTreeSet<&str> = BTreeSet::new();
        loop {
            let mut grew = false;
            for record in &self.records {
                if record.status != CallStatus::Pending || stalled_ids.contains(record.id.as_str())
                {
                    continue;
                }
                let doomed = record.dependencies.iter().any(|dep| {
                    stalled_ids.contains(dep.as_str())
                        || match self.records.iter().find(|r| &r.id == dep) {
                            Some(r) => r.status == CallStatus::Error,
                            None => true,
                        }
                });
                if doomed {
                    stalled_ids.insert(&record.id);
                    grew = true;
                }
            }
            if !grew {
                break;
            }
        }
        self.records
            .iter()
            .filter(|r| stalled_ids.contains(r.id.as_str()))
            .collect()
    }

    /// Get a record by id.
    pub fn get(&self, id: &str) -> Option<&CallRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    /// All records in registration order.
    pub fn records(&self) -> &[CallRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    // ── Phases ────────────────────────────────────────────────────────────

    /// The number of phases run so far this round.
    pub fn phase(&self) -> u32 {
        self.phase
    }

    pub fn phase_ceiling(&self) -> u32 {
        self.phase_ceiling
    }

    /// Advance the phase counter. Returns `false` once the ceiling is
    /// reached — the caller must terminate the round.
    pub fn advance_phase(&mut self) -> bool {
        if self.phase >= self.phase_ceiling {
            return false;
        }
        self.phase += 1;
        true
    }

    // ── Context assembly ──────────────────────────────────────────────────

    /// One tool-result turn per terminal record, in registration order,
    /// tagged with the record id so the model can correlate it with its
    /// own request. Error records produce an error payload.
    pub fn context_turns(&self) -> Vec<Turn> {
        self.records
            .iter()
            .filter_map(|r| match r.status {
                CallStatus::Completed => Some(Turn::tool_result(
                    r.id.clone(),
                    r.result.clone().unwrap_or(serde_json::Value::Null),
                    false,
                )),
                CallStatus::Error => Some(Turn::tool_result(
                    r.id.clone(),
                    serde_json::json!({
                        "error": r.error.clone().unwrap_or_default(),
                        "tool": r.name,
                    }),
                    true,
                )),
                _ => None,
            })
            .collect()
    }

    /// Counts by status plus total and mean execution time.
    pub fn metrics(&self) -> PipelineMetrics {
        let count = |s: CallStatus| self.records.iter().filter(|r| r.status == s).count();
        let durations: Vec<u64> = self
            .records
            .iter()
            .filter_map(|r| r.execution_time_ms)
            .collect();
        let total_execution_ms: u64 = durations.iter().sum();
        let mean_execution_ms = if durations.is_empty() {
            None
        } else {
            Some(total_execution_ms as f64 / durations.len() as f64)
        };

        PipelineMetrics {
            total: self.records.len(),
            pending: count(CallStatus::Pending),
            executing: count(CallStatus::Executing),
            completed: count(CallStatus::Completed),
            errored: count(CallStatus::Error),
            stalled: self.stalled().len(),
            total_execution_ms,
            mean_execution_ms,
        }
    }
}
