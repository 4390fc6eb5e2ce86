//! Query routing, caching and explainable reasoning for MedQuery.
//!
//! A query is answered by the first of:
//!
//! 1. the **response cache**, keyed by the query fingerprint
//! 2. the **fast path**, which pattern-matches simple lookups and answers
//!    them from the knowledge base without the model
//! 3. the **agent loop**, which lets the model call tools for a bounded
//!    number of round-trips
//!
//! Every answer carries a [`Trace`](medquery_core::Trace) explaining the
//! intent, entities, steps, tool decisions and confidence behind it.

pub mod agent_loop;
pub mod bootstrap;
pub mod cache;
pub mod confidence;
pub mod emitter;
pub mod fast_path;
pub mod intent;
pub mod router;
pub mod trace_builder;

#[cfg(test)]
mod test_helpers;

pub use agent_loop::{AgentLoop, AgentOutcome, Termination};
pub use bootstrap::{build_registry, build_router, build_router_with, load_knowledge};
pub use cache::{CACHE_TTL, CacheCounters, ResponseCache};
pub use confidence::{Confidence, ResolutionSignals};
pub use emitter::{FrameSequence, ResponseFrame, collect_answer, spawn_frames};
pub use fast_path::{FastPathClassifier, FastPathOutcome, FastPattern, FastResolution};
pub use router::{FastLookup, QueryRouter, RouterStats};
pub use trace_builder::TraceBuilder;
