//! # Copperkite Agent
//!
//! The orchestration coordinator: sends context to the model, incrementally
//! parses streamed tool-call fragments into pipeline records, drives
//! execution phases, and terminates when the model stops requesting tools
//! or the phase ceiling is reached. The `AssistantService` wraps one
//! coordinator per conversation over a session store.

pub mod collector;
pub mod coordinator;
pub mod service;

pub use collector::{CollectedStream, MalformedCall, StreamCollector};
pub use coordinator::{Coordinator, RoundOutcome, StopReason};
pub use service::AssistantService;
