//! Error taxonomy for the ingredient pipeline
//!
//! Stage failures are split from run-fatal failures: the recognizer, quantity
//! parser, and dish inference degrade to empty output when they fail, while
//! input validation, configuration validation, and the canonicalizer abort
//! the run. The public boundary never sees either type directly; fatal errors
//! surface as the `error` field of a `ProcessingResult`.

use thiserror::Error;

/// Errors surfaced by individual pipeline stages
#[derive(Debug, Error)]
pub enum StageError {
    /// Stage backend not available (resource offline, model missing)
    #[error("stage unavailable: {0}")]
    Unavailable(String),

    /// Stage exceeded its configured deadline
    #[error("stage timed out after {ms}ms")]
    Timeout {
        /// Configured deadline in milliseconds
        ms: u64,
    },

    /// Internal stage failure
    #[error("internal stage error: {0}")]
    Internal(String),
}

/// Fatal pipeline errors
///
/// Recognition, quantity parsing, and dish inference degrade instead of
/// failing the run; only canonicalization and validation failures reach this
/// type, since every surviving entity depends on those two stages.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Input rejected before any stage ran
    #[error("invalid input: {0}")]
    Input(String),

    /// Configuration rejected before any run started
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// A required stage failed
    #[error("stage '{stage}' failed: {source}")]
    Stage {
        /// Stage name
        stage: &'static str,
        /// Underlying stage failure
        #[source]
        source: StageError,
    },

    /// Run cancelled by the caller
    #[error("run cancelled")]
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = PipelineError::Input("text is empty".to_string());
        assert_eq!(err.to_string(), "invalid input: text is empty");

        let err = PipelineError::Stage {
            stage: "canonicalization",
            source: StageError::Timeout { ms: 2000 },
        };
        assert_eq!(
            err.to_string(),
            "stage 'canonicalization' failed: stage timed out after 2000ms"
        );

        assert_eq!(PipelineError::Cancelled.to_string(), "run cancelled");
    }
}
