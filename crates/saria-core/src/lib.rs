//! saria-core — Pure types, errors, and text processing.
//!
//! No async runtime, no I/O, no platform dependencies.

pub mod error;
pub mod text_prep;
pub mod types;
