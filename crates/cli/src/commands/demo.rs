//! `copperkite demo` — a full multi-phase round against scripted
//! collaborators.
//!
//! The model client replays a canned two-phase exchange (request two lookups
//! — the second depending on the first — then synthesize an answer) and the
//! executor serves mock lookup data, so the whole orchestration pipeline
//! runs end to end without network access.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::info;

use copperkite_agent::{AssistantService, Coordinator};
use copperkite_config::AgentConfig;
use copperkite_core::error::{ExecutorError, ModelError, SummarizeError};
use copperkite_core::event::EventBus;
use copperkite_core::executor::ToolExecutor;
use copperkite_core::model::{
    BlockPayload, ModelClient, ModelRequest, ModelResponse, StreamEvent, ToolDefinition,
};
use copperkite_core::summarize::Summarizer;
use copperkite_core::turn::Turn;
use copperkite_session::InMemorySessionStore;

pub async fn run(message: Option<String>) -> Result<()> {
    let config = AgentConfig::load()?;
    let question =
        message.unwrap_or_else(|| "How is the air in Oslo given today's weather?".into());

    let bus = Arc::new(EventBus::new(256));
    let mut events = bus.subscribe();
    let printer = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event.event_type() {
                "text_delta" | "input_delta" => {} // too chatty for the demo
                kind => println!("  [{kind}] {}", serde_json::to_string(&*event).unwrap_or_default()),
            }
        }
    });

    let coordinator = Coordinator::from_config(
        &config,
        Arc::new(DemoModel::new()),
        Arc::new(DemoExecutor),
        Arc::new(FirstLineSummarizer),
        bus,
    )
    .with_tools(demo_tool_definitions());

    let service = AssistantService::new(
        coordinator,
        Arc::new(InMemorySessionStore::new()),
        Duration::from_secs(config.session.ttl_secs),
    );

    info!(question = %question, "Starting demo round");
    let outcome = service.handle_message("demo", &question).await?;
    printer.abort();

    println!();
    println!("answer: {}", outcome.answer);
    println!(
        "stop_reason: {} after {} phase(s)",
        outcome.stop_reason, outcome.phases
    );
    println!(
        "tools: {} completed, {} errored, mean {:.0} ms",
        outcome.metrics.completed,
        outcome.metrics.errored,
        outcome.metrics.mean_execution_ms.unwrap_or(0.0)
    );
    Ok(())
}

fn demo_tool_definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: "weather_lookup".into(),
            description: "Current weather conditions for a city".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "city": { "type": "string" }
                },
                "required": ["city"]
            }),
        },
        ToolDefinition {
            name: "air_quality".into(),
            description: "Air quality index for a city, optionally adjusted for weather".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "city": { "type": "string" },
                    "weather_ref": { "type": "string" }
                },
                "required": ["city"]
            }),
        },
    ]
}

/// Replays a two-phase scripted exchange.
struct DemoModel {
    scripts: Mutex<VecDeque<Vec<StreamEvent>>>,
}

impl DemoModel {
    fn new() -> Self {
        let phase1 = vec![
            text_block("blk_0", "Let me check the weather and air quality."),
            tool_block("call_weather", "weather_lookup", r#"{"city":"Oslo"}"#),
            // References call_weather's id — inferred as a dependency
            tool_block(
                "call_air",
                "air_quality",
                r#"{"city":"Oslo","weather_ref":"call_weather"}"#,
            ),
        ]
        .concat();
        let phase2 = text_block(
            "blk_1",
            "Oslo is 4°C and clear with an AQI of 22, so the air is very good today.",
        );
        Self {
            scripts: Mutex::new(VecDeque::from([phase1, phase2])),
        }
    }
}

fn text_block(id: &str, text: &str) -> Vec<StreamEvent> {
    vec![
        StreamEvent::BlockStart {
            id: id.into(),
            name: None,
        },
        StreamEvent::BlockDelta {
            id: id.into(),
            delta: BlockPayload::Text { text: text.into() },
        },
        StreamEvent::BlockStop { id: id.into() },
    ]
}

fn tool_block(id: &str, name: &str, input: &str) -> Vec<StreamEvent> {
    // Split the input to exercise fragment reassembly
    let (head, tail) = input.split_at(input.len() / 2);
    vec![
        StreamEvent::BlockStart {
            id: id.into(),
            name: Some(name.into()),
        },
        StreamEvent::BlockDelta {
            id: id.into(),
            delta: BlockPayload::InputFragment {
                partial_json: head.into(),
            },
        },
        StreamEvent::BlockDelta {
            id: id.into(),
            delta: BlockPayload::InputFragment {
                partial_json: tail.into(),
            },
        },
        StreamEvent::BlockStop { id: id.into() },
    ]
}

#[async_trait]
impl ModelClient for DemoModel {
    fn name(&self) -> &str {
        "demo"
    }

    async fn stream(
        &self,
        _request: ModelRequest,
    ) -> Result<mpsc::Receiver<Result<StreamEvent, ModelError>>, ModelError> {
        let script = self
            .scripts
            .lock()
            .map_err(|_| ModelError::RequestFailed("script lock poisoned".into()))?
            .pop_front()
            .ok_or_else(|| ModelError::RequestFailed("demo script exhausted".into()))?;
        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(async move {
            for event in script {
                if tx.send(Ok(event)).await.is_err() {
                    break;
                }
            }
        });
        Ok(rx)
    }

    async fn complete(&self, _request: ModelRequest) -> Result<ModelResponse, ModelError> {
        Err(ModelError::RequestFailed(
            "demo model only supports streaming".into(),
        ))
    }
}

/// Serves mock lookup data so the round needs no network access.
struct DemoExecutor;

#[async_trait]
impl ToolExecutor for DemoExecutor {
    async fn execute(
        &self,
        name: &str,
        input: &serde_json::Value,
    ) -> Result<serde_json::Value, ExecutorError> {
        let city = input["city"].as_str().unwrap_or("unknown");
        match name {
            "weather_lookup" => Ok(serde_json::json!({
                "city": city,
                "temperature_c": 4,
                "conditions": "clear",
                "wind_kph": 11,
            })),
            "air_quality" => Ok(serde_json::json!({
                "city": city,
                "aqi": 22,
                "rating": "good",
            })),
            other => Err(ExecutorError::NotFound(other.into())),
        }
    }
}

/// Keeps the first line of each turn — good enough for a demo summary.
struct FirstLineSummarizer;

#[async_trait]
impl Summarizer for FirstLineSummarizer {
    async fn summarize(&self, turns: &[Turn], _: usize) -> Result<Turn, SummarizeError> {
        let lines: Vec<&str> = turns
            .iter()
            .filter_map(|t| t.content.lines().next())
            .collect();
        Ok(Turn::system(lines.join(" / ")))
    }
}
