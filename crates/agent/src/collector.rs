//! Incremental stream parsing.
//!
//! Consumes the model's event stream and reassembles it into answer text
//! plus finished tool call requests. Text fragments and input fragments are
//! forwarded to the event bus the moment they arrive — UI responsiveness
//! never waits for a block to finish.
//!
//! A tool call whose input fragments fail to reassemble into valid JSON is
//! reported as malformed rather than dropped; the coordinator recovers the
//! full record with a non-streamed request.

use tokio::sync::mpsc::Receiver;
use tracing::{debug, warn};

use copperkite_core::error::ModelError;
use copperkite_core::event::{AgentEvent, EventBus};
use copperkite_core::model::{BlockPayload, StreamEvent};
use copperkite_core::turn::ToolCallRequest;
use std::sync::Arc;

/// A tool call block whose streamed input did not parse.
#[derive(Debug, Clone)]
pub struct MalformedCall {
    pub id: String,
    pub name: String,
    pub raw: String,
}

/// Everything reassembled from one model response stream.
#[derive(Debug, Clone, Default)]
pub struct CollectedStream {
    /// Accumulated plain answer text
    pub text: String,
    /// Tool calls with fully parsed inputs, in stream order
    pub calls: Vec<ToolCallRequest>,
    /// Tool calls needing structured-record recovery
    pub malformed: Vec<MalformedCall>,
}

struct PartialBlock {
    id: String,
    /// Present for tool-call blocks, absent for text blocks
    name: Option<String>,
    input_buf: String,
}

/// Reassembles block events into a [`CollectedStream`].
pub struct StreamCollector {
    bus: Arc<EventBus>,
}

impl StreamCollector {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self { bus }
    }

    /// Drain the stream to completion.
    ///
    /// A transport error mid-stream aborts collection — partial state is
    /// discarded and the caller falls back to a non-streamed request.
    pub async fn collect(
        &self,
        mut rx: Receiver<Result<StreamEvent, ModelError>>,
    ) -> Result<CollectedStream, ModelError> {
        let mut text = String::new();
        let mut open: Vec<PartialBlock> = Vec::new();
        let mut calls: Vec<ToolCallRequest> = Vec::new();
        let mut malformed: Vec<MalformedCall> = Vec::new();

        while let Some(event) = rx.recv().await {
            match event? {
                StreamEvent::BlockStart { id, name } => {
                    if open.iter().any(|b| b.id == id) {
                        warn!(block = %id, "Duplicate block start, ignoring");
                        continue;
                    }
                    open.push(PartialBlock {
                        id,
                        name,
                        input_buf: String::new(),
                    });
                }

                StreamEvent::BlockDelta { id, delta } => match delta {
                    BlockPayload::Text { text: fragment } => {
                        text.push_str(&fragment);
                        self.bus.publish(AgentEvent::TextDelta { content: fragment });
                    }
                    BlockPayload::InputFragment { partial_json } => {
                        match open.iter_mut().find(|b| b.id == id) {
                            Some(block) => {
                                block.input_buf.push_str(&partial_json);
                                self.bus.publish(AgentEvent::InputDelta {
                                    call_id: id,
                                    fragment: partial_json,
                                });
                            }
                            None => warn!(block = %id, "Input fragment for unknown block"),
                        }
                    }
                },

                StreamEvent::BlockStop { id } => {
                    let Some(pos) = open.iter().position(|b| b.id == id) else {
                        warn!(block = %id, "Block stop for unknown block");
                        continue;
                    };
                    let block = open.remove(pos);
                    let Some(name) = block.name else {
                        continue; // text block — content already accumulated
                    };

                    let raw = block.input_buf.trim();
                    if raw.is_empty() {
                        calls.push(ToolCallRequest {
                            id: block.id,
                            name,
                            input: serde_json::json!({}),
                        });
                        continue;
                    }
                    match serde_json::from_str(raw) {
                        Ok(input) => calls.push(ToolCallRequest {
                            id: block.id,
                            name,
                            input,
                        }),
                        Err(e) => {
                            warn!(block = %block.id, tool = %name, error = %e,
                                "Streamed tool input did not parse, marking for recovery");
                            malformed.push(MalformedCall {
                                id: block.id,
                                name,
                                raw: raw.to_string(),
                            });
                        }
                    }
                }
            }
        }

        if !open.is_empty() {
            warn!(unclosed = open.len(), "Stream ended with unclosed blocks");
        }
        debug!(
            chars = text.len(),
            calls = calls.len(),
            malformed = malformed.len(),
            "Stream collected"
        );

        Ok(CollectedStream {
            text,
            calls,
            malformed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn start(id: &str, name: Option<&str>) -> StreamEvent {
        StreamEvent::BlockStart {
            id: id.into(),
            name: name.map(Into::into),
        }
    }

    fn text_delta(id: &str, text: &str) -> StreamEvent {
        StreamEvent::BlockDelta {
            id: id.into(),
            delta: BlockPayload::Text { text: text.into() },
        }
    }

    fn input_delta(id: &str, json: &str) -> StreamEvent {
        StreamEvent::BlockDelta {
            id: id.into(),
            delta: BlockPayload::InputFragment {
                partial_json: json.into(),
            },
        }
    }

    fn stop(id: &str) -> StreamEvent {
        StreamEvent::BlockStop { id: id.into() }
    }

    async fn collect(events: Vec<StreamEvent>) -> CollectedStream {
        let (tx, rx) = mpsc::channel(64);
        for e in events {
            tx.send(Ok(e)).await.unwrap();
        }
        drop(tx);
        StreamCollector::new(Arc::new(EventBus::default()))
            .collect(rx)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn plain_text_stream() {
        let collected = collect(vec![
            start("blk_0", None),
            text_delta("blk_0", "Hello, "),
            text_delta("blk_0", "world."),
            stop("blk_0"),
        ])
        .await;

        assert_eq!(collected.text, "Hello, world.");
        assert!(collected.calls.is_empty());
        assert!(collected.malformed.is_empty());
    }

    #[tokio::test]
    async fn tool_call_input_reassembled_across_fragments() {
        let collected = collect(vec![
            start("call_1", Some("weather_lookup")),
            input_delta("call_1", r#"{"ci"#),
            input_delta("call_1", r#"ty":"Os"#),
            input_delta("call_1", r#"lo"}"#),
            stop("call_1"),
        ])
        .await;

        assert_eq!(collected.calls.len(), 1);
        let call = &collected.calls[0];
        assert_eq!(call.name, "weather_lookup");
        assert_eq!(call.input["city"], "Oslo");
    }

    #[tokio::test]
    async fn interleaved_blocks_keep_separate_buffers() {
        let collected = collect(vec![
            start("blk_0", None),
            start("call_1", Some("alpha")),
            start("call_2", Some("beta")),
            text_delta("blk_0", "Working on it."),
            input_delta("call_1", r#"{"a":1}"#),
            input_delta("call_2", r#"{"b":"#),
            input_delta("call_2", r#"2}"#),
            stop("call_2"),
            stop("call_1"),
            stop("blk_0"),
        ])
        .await;

        assert_eq!(collected.text, "Working on it.");
        assert_eq!(collected.calls.len(), 2);
        // Stream order of block-stop determines call order
        assert_eq!(collected.calls[0].name, "beta");
        assert_eq!(collected.calls[1].name, "alpha");
        assert_eq!(collected.calls[0].input["b"], 2);
    }

    #[tokio::test]
    async fn empty_input_becomes_empty_object() {
        let collected = collect(vec![start("call_1", Some("ping")), stop("call_1")]).await;
        assert_eq!(collected.calls[0].input, serde_json::json!({}));
    }

    #[tokio::test]
    async fn malformed_input_flagged_for_recovery() {
        let collected = collect(vec![
            start("call_1", Some("weather_lookup")),
            input_delta("call_1", r#"{"city": "Os"#), // never closed
            stop("call_1"),
        ])
        .await;

        assert!(collected.calls.is_empty());
        assert_eq!(collected.malformed.len(), 1);
        assert_eq!(collected.malformed[0].name, "weather_lookup");
    }

    #[tokio::test]
    async fn deltas_forwarded_immediately() {
        let bus = Arc::new(EventBus::new(64));
        let mut events_rx = bus.subscribe();

        let (tx, rx) = mpsc::channel(16);
        tx.send(Ok(start("blk_0", None))).await.unwrap();
        tx.send(Ok(text_delta("blk_0", "Hi"))).await.unwrap();
        tx.send(Ok(start("call_1", Some("alpha")))).await.unwrap();
        tx.send(Ok(input_delta("call_1", "{}"))).await.unwrap();
        tx.send(Ok(stop("call_1"))).await.unwrap();
        tx.send(Ok(stop("blk_0"))).await.unwrap();
        drop(tx);

        StreamCollector::new(bus.clone()).collect(rx).await.unwrap();

        let mut kinds = vec![];
        while let Ok(event) = events_rx.try_recv() {
            kinds.push(event.event_type());
        }
        assert_eq!(kinds, vec!["text_delta", "input_delta"]);
    }

    #[tokio::test]
    async fn stream_error_aborts_collection() {
        let (tx, rx) = mpsc::channel(16);
        tx.send(Ok(start("blk_0", None))).await.unwrap();
        tx.send(Err(ModelError::StreamInterrupted("connection reset".into())))
            .await
            .unwrap();
        drop(tx);

        let err = StreamCollector::new(Arc::new(EventBus::default()))
            .collect(rx)
            .await
            .unwrap_err();
        assert!(matches!(err, ModelError::StreamInterrupted(_)));
    }
}
