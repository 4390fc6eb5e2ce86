//! Language model provider implementations for MedQuery.
//!
//! All providers implement the `medquery_core::Provider` trait.
//! `router::build_from_config` selects the provider from configuration.

pub mod openai_compat;
pub mod router;

pub use openai_compat::OpenAiCompatProvider;
pub use router::build_from_config;
