//! # Sous Common Library
//!
//! Shared code for Sous services including:
//! - Event types (PipelineEvent enum) and EventBus
//! - Configuration loading
//! - Error types
//! - Text normalization utilities

pub mod config;
pub mod error;
pub mod events;
pub mod text;

pub use error::{Error, Result};
