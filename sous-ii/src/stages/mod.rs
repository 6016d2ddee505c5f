//! Pipeline stage implementations
//!
//! Each stage is an isolated unit the orchestrator composes: recognition
//! and quantity parsing run concurrently on the raw text, canonicalization
//! and dish inference run concurrently afterwards, and validation closes
//! the run. Stages share no mutable state.

pub mod canonicalizer;
pub mod inference;
pub mod quantity;
pub mod recognizer;
pub mod validator;
