//! The orchestration coordinator.
//!
//! Drives one user turn to its final answer over bounded phases:
//!
//! ```text
//! AwaitingModel → ParsingStream → ExecutingTools → AwaitingModel → …
//!                      │                                  │
//!                      └── zero tool calls ── Terminal ───┘ ceiling reached
//! ```
//!
//! Each phase compacts the context, streams a model request, parses tool
//! call fragments into the pipeline, drains runnable work (dependency
//! chains unlock within the phase), and folds new tool results back into
//! history. The phase ceiling is the only defense against a model that
//! requests tools indefinitely.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use copperkite_config::AgentConfig;
use copperkite_context::compactor::ContextCompactor;
use copperkite_core::error::{Error, PipelineError};
use copperkite_core::event::{AgentEvent, EventBus};
use copperkite_core::executor::ToolExecutor;
use copperkite_core::model::{ModelClient, ModelRequest, ToolDefinition};
use copperkite_core::summarize::Summarizer;
use copperkite_core::turn::{ToolCallRequest, Turn};
use copperkite_pipeline::{PipelineMetrics, ToolPipeline};

use crate::collector::{CollectedStream, StreamCollector};

/// Why a round reached its terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The model produced a final answer without further tool requests
    Answered,
    /// The phase ceiling forced termination with a partial answer
    PhaseCeiling,
    /// Both the streamed and non-streamed model requests failed
    ProviderFailure,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Answered => "answered",
            Self::PhaseCeiling => "phase_ceiling",
            Self::ProviderFailure => "provider_failure",
        }
    }
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The terminal result of one round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundOutcome {
    pub answer: String,
    pub stop_reason: StopReason,
    pub phases: u32,
    pub metrics: PipelineMetrics,
}

/// Orchestrates one conversational round at a time.
pub struct Coordinator {
    model: Arc<dyn ModelClient>,
    executor: Arc<dyn ToolExecutor>,
    compactor: ContextCompactor,
    bus: Arc<EventBus>,
    model_name: String,
    temperature: f32,
    max_tokens: Option<u32>,
    tools: Vec<ToolDefinition>,
    phase_ceiling: u32,
    budget_units: usize,
}

impl Coordinator {
    /// Create a coordinator with default settings.
    pub fn new(
        model: Arc<dyn ModelClient>,
        executor: Arc<dyn ToolExecutor>,
        summarizer: Arc<dyn Summarizer>,
        bus: Arc<EventBus>,
    ) -> Self {
        Self {
            model,
            executor,
            compactor: ContextCompactor::new(summarizer),
            bus,
            model_name: "kite-large".into(),
            temperature: 0.7,
            max_tokens: None,
            tools: Vec::new(),
            phase_ceiling: 10,
            budget_units: 80_000,
        }
    }

    /// Create a coordinator from loaded configuration.
    pub fn from_config(
        config: &AgentConfig,
        model: Arc<dyn ModelClient>,
        executor: Arc<dyn ToolExecutor>,
        summarizer: Arc<dyn Summarizer>,
        bus: Arc<EventBus>,
    ) -> Self {
        let compactor = ContextCompactor::new(summarizer)
            .with_trigger_ratio(config.context.trigger_ratio)
            .with_summary_chunk(config.context.summary_chunk);
        Self {
            model,
            executor,
            compactor,
            bus,
            model_name: config.model.clone(),
            temperature: config.temperature,
            max_tokens: None,
            tools: Vec::new(),
            phase_ceiling: config.phase_ceiling,
            budget_units: config.context.budget_units,
        }
    }

    /// Set the tool definitions advertised to the model.
    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    /// Set the maximum number of phases per round.
    pub fn with_phase_ceiling(mut self, ceiling: u32) -> Self {
        self.phase_ceiling = ceiling;
        self
    }

    /// Set the context unit budget.
    pub fn with_budget_units(mut self, units: usize) -> Self {
        self.budget_units = units;
        self
    }

    /// Set the default max tokens per model response.
    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    /// The event bus progress is published on.
    pub fn bus(&self) -> Arc<EventBus> {
        self.bus.clone()
    }

    /// Drive one user turn to completion.
    ///
    /// `history` is the surviving context from prior rounds; it is extended
    /// with this round's turns (and rewritten by compaction) in place.
    pub async fn run_round(
        &self,
        history: &mut Vec<Turn>,
        user_text: &str,
    ) -> Result<RoundOutcome, Error> {
        info!(turns = history.len(), "Processing round");
        history.push(Turn::user(user_text));

        let mut pipeline = ToolPipeline::new(self.bus.clone(), self.phase_ceiling);
        let collector = StreamCollector::new(self.bus.clone());
        let mut folded: HashSet<String> = HashSet::new();
        let mut answer = String::new();

        loop {
            if !pipeline.advance_phase() {
                warn!(
                    ceiling = self.phase_ceiling,
                    "Phase ceiling reached, terminating with partial answer"
                );
                if answer.is_empty() {
                    answer = "I ran out of tool phases before finishing. \
                              Please narrow the question and try again."
                        .into();
                }
                history.push(Turn::assistant(answer.clone()));
                return Ok(self.finish(StopReason::PhaseCeiling, answer, &pipeline));
            }
            let phase = pipeline.phase();
            self.bus.publish(AgentEvent::PhaseStarted {
                phase,
                timestamp: Utc::now(),
            });

            // ── Compact context under the unit budget ──────────────────────
            let compaction = self
                .compactor
                .compact(std::mem::take(history), self.budget_units)
                .await;
            if compaction.compacted {
                self.bus.publish(AgentEvent::ContextCompacted {
                    turns_before: compaction.turns_before,
                    turns_after: compaction.turns.len(),
                    units_before: compaction.units_before,
                    units_after: compaction.units_after,
                    summarized: compaction.summarized,
                    timestamp: Utc::now(),
                });
            }
            *history = compaction.turns;

            // ── AwaitingModel → ParsingStream ──────────────────────────────
            let collected = match self.parse_stream(&collector, history).await {
                Ok(collected) => collected,
                Err(e) => {
                    warn!(error = %e, "Model unreachable on both paths, degrading");
                    if answer.is_empty() {
                        answer = "The model back end is currently unreachable, \
                                  so I couldn't finish this request."
                            .into();
                    }
                    history.push(Turn::assistant(answer.clone()));
                    return Ok(self.finish(StopReason::ProviderFailure, answer, &pipeline));
                }
            };

            let (phase_text, calls) = self.resolve_calls(collected, history).await?;
            if !phase_text.is_empty() {
                answer = phase_text.clone();
            }

            // Zero tool calls — the accumulated text is the final answer.
            if calls.is_empty() {
                history.push(Turn::assistant(answer.clone()));
                return Ok(self.finish(StopReason::Answered, answer, &pipeline));
            }

            debug!(phase, calls = calls.len(), "Model requested tools");
            history.push(Turn::assistant_with_calls(phase_text, calls.clone()));
            for call in calls {
                match pipeline.add_call(call.id.clone(), call.name, call.input) {
                    Ok(_) => {}
                    Err(PipelineError::DuplicateCall(id)) => {
                        warn!(call_id = %id, "Model reused a call id, skipping duplicate");
                    }
                    Err(e) => return Err(e.into()),
                }
            }

            // ── ExecutingTools ─────────────────────────────────────────────
            let executed = pipeline.run_phase(self.executor.as_ref()).await?;
            self.bus.publish(AgentEvent::PhaseFinished {
                phase,
                calls_executed: executed,
                timestamp: Utc::now(),
            });

            // ── Fold newly terminal results into next-round context ────────
            for turn in pipeline.context_turns() {
                let call_id = turn
                    .tool_result
                    .as_ref()
                    .map(|r| r.call_id.clone())
                    .unwrap_or_default();
                if folded.insert(call_id) {
                    history.push(turn);
                }
            }
        }
    }

    fn request(&self, history: &[Turn]) -> ModelRequest {
        ModelRequest {
            model: self.model_name.clone(),
            turns: history.to_vec(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            tools: self.tools.clone(),
        }
    }

    /// Stream the model response; if the stream cannot be opened or dies
    /// mid-parse, recover the whole response with a non-streamed request.
    async fn parse_stream(
        &self,
        collector: &StreamCollector,
        history: &[Turn],
    ) -> Result<CollectedStream, Error> {
        match self.model.stream(self.request(history)).await {
            Ok(rx) => match collector.collect(rx).await {
                Ok(collected) => Ok(collected),
                Err(e) => {
                    warn!(error = %e, "Stream died mid-parse, recovering via complete()");
                    self.collect_via_complete(history).await
                }
            },
            Err(e) => {
                warn!(error = %e, "Could not open stream, recovering via complete()");
                self.collect_via_complete(history).await
            }
        }
    }

    async fn collect_via_complete(&self, history: &[Turn]) -> Result<CollectedStream, Error> {
        let response = self.model.complete(self.request(history)).await?;
        if !response.text.is_empty() {
            self.bus.publish(AgentEvent::TextDelta {
                content: response.text.clone(),
            });
        }
        Ok(CollectedStream {
            text: response.text,
            calls: response.tool_calls,
            malformed: Vec::new(),
        })
    }

    /// Repair malformed streamed tool inputs from a non-streamed request.
    /// Calls that cannot be matched in the recovery response are dropped.
    async fn resolve_calls(
        &self,
        collected: CollectedStream,
        history: &[Turn],
    ) -> Result<(String, Vec<ToolCallRequest>), Error> {
        let CollectedStream {
            text,
            mut calls,
            malformed,
        } = collected;
        if malformed.is_empty() {
            return Ok((text, calls));
        }

        debug!(
            count = malformed.len(),
            "Recovering malformed tool inputs via complete()"
        );
        let response = match self.model.complete(self.request(history)).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, dropped = malformed.len(),
                    "Recovery request failed, dropping malformed calls");
                return Ok((text, calls));
            }
        };
        for bad in malformed {
            let repaired = response
                .tool_calls
                .iter()
                .find(|c| c.id == bad.id)
                .or_else(|| response.tool_calls.iter().find(|c| c.name == bad.name));
            match repaired {
                Some(full) => calls.push(ToolCallRequest {
                    id: bad.id,
                    name: bad.name,
                    input: full.input.clone(),
                }),
                None => warn!(
                    call_id = %bad.id,
                    tool = %bad.name,
                    "Could not recover tool input, dropping call"
                ),
            }
        }
        Ok((text, calls))
    }

    fn finish(
        &self,
        stop_reason: StopReason,
        answer: String,
        pipeline: &ToolPipeline,
    ) -> RoundOutcome {
        self.bus.publish(AgentEvent::RoundFinished {
            phases: pipeline.phase(),
            stop_reason: stop_reason.as_str().into(),
            timestamp: Utc::now(),
        });
        RoundOutcome {
            answer,
            stop_reason,
            phases: pipeline.phase(),
            metrics: pipeline.metrics(),
        }
    }
}
