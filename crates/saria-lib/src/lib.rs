//! saria-lib — Assistant relay engine.
//!
//! Single-flight job coordination, token-bucket admission, broadcast event
//! fanout, collaborator clients, and the HTTP API. Depends on saria-core
//! for pure types and text processing.

pub mod hub;
pub mod job;
pub mod limiter;
pub mod llm;
pub mod relay;
pub mod server;
pub mod speech;

// Re-export saria-core for convenience
pub use saria_core;
