//! Knowledge-base answer service
//!
//! Turns a question into an embedding, retrieves the closest passages from
//! one or more vector collections, re-ranks them globally and answers either
//! through a hosted language model or a deterministic snippet formatter.
//! Every dependency may be missing; questions still get an answer.

pub mod api;
pub mod app_state;
pub mod config;
pub mod embedder;
pub mod llm;
pub mod pipeline;
pub mod retrieval;
pub mod store;
pub mod synthesis;
pub mod types;
