//! monshin-llm
//!
//! LLM provider abstraction for the Monshin questionnaire service.
//!
//! The [`provider::LlmProvider`] trait is the capability contract; built-in
//! [`ollama`] and [`openai`] providers implement it over HTTP, and external
//! crates may register their own through [`registry::register_provider_plugin`].
//! The [`gateway::LlmGateway`] is the only entry point the application uses:
//! it serializes generation per session, tracks connectivity, and falls back
//! to deterministic [`stub`] output when the remote side fails.

pub mod error;
pub mod gateway;
pub mod meta;
pub mod ollama;
pub mod openai;
pub mod provider;
pub mod registry;
pub mod stub;
