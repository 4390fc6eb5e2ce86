//! # MedQuery Core
//!
//! Domain types, traits, and error definitions for the MedQuery medication
//! query engine. This crate has **zero framework dependencies** — it defines
//! the domain model that every other crate implements against.
//!
//! ## Design Philosophy
//!
//! Every collaborator (language model, knowledge lookup, tool) is defined as a
//! trait here. Implementations live in their respective crates. This enables:
//! - Swapping implementations via configuration
//! - Easy testing with mock/stub implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod error;
pub mod event;
pub mod knowledge;
pub mod message;
pub mod provider;
pub mod query;
pub mod response;
pub mod tool;
pub mod trace;

// Re-export key types at crate root for ergonomics
pub use error::{Error, Result};
pub use event::{DomainEvent, EventBus};
pub use knowledge::{DrugMatch, DrugRecord, KnowledgeBase, KnowledgeStats};
pub use message::{Conversation, Message, MessageToolCall, Role};
pub use provider::{Provider, ProviderRequest, ProviderResponse, ToolDefinition, Usage};
pub use query::Query;
pub use response::{Candidate, Note, Response, RouteDecision, RoutePath, ToolCallRecord};
pub use tool::{CONFIRMED_DRUGS_KEY, Tool, ToolCall, ToolKind, ToolOutput, ToolRegistry};
pub use trace::{
    ConfidenceLevel, Entities, EntityKind, Intent, ReasoningStep, ToolDecision, Trace, TraceDigest,
};
