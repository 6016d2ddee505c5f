//! Event types for the Sous event system
//!
//! Provides shared event definitions and EventBus for Sous services.
//! The ingredient pipeline emits these per run so external collectors
//! (dashboards, analytics aggregation) can observe runs without being
//! coupled to the pipeline itself.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Sous pipeline event types
///
/// Events are broadcast via EventBus and can be serialized for external
/// transmission. All events use this central enum for type safety and
/// exhaustive matching.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PipelineEvent {
    /// Analysis run started
    ///
    /// Triggers:
    /// - Collectors: open a run record
    RunStarted {
        /// Run UUID
        run_id: Uuid,
        /// Input text length in bytes
        text_len: usize,
        /// Whether a dish description accompanied the text
        has_dish_description: bool,
        /// When the run started
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Pipeline stage began executing
    StageStarted {
        /// Run UUID
        run_id: Uuid,
        /// Stage name ("recognition", "quantity_parsing", ...)
        stage: String,
        /// When the stage started
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Pipeline stage finished (successfully or degraded)
    ///
    /// Triggers:
    /// - Collectors: record per-stage timing
    StageCompleted {
        /// Run UUID
        run_id: Uuid,
        /// Stage name
        stage: String,
        /// Stage wall-clock time in milliseconds
        elapsed_ms: u64,
        /// Whether the stage degraded to empty output after a failure
        degraded: bool,
        /// When the stage completed
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Analysis run completed successfully
    ///
    /// Triggers:
    /// - Collectors: close the run record, fold into aggregates
    RunCompleted {
        /// Run UUID
        run_id: Uuid,
        /// Number of surviving entities
        entity_count: usize,
        /// Aggregate confidence over surviving entities
        confidence: f64,
        /// Total run time in seconds
        processing_time: f64,
        /// When the run completed
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Analysis run failed with a fatal error
    ///
    /// Triggers:
    /// - Collectors: record the failure and its classification
    RunFailed {
        /// Run UUID
        run_id: Uuid,
        /// Error message
        error: String,
        /// When the run failed
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Analysis run cancelled by the caller
    RunCancelled {
        /// Run UUID
        run_id: Uuid,
        /// When the run was cancelled
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl PipelineEvent {
    /// Get event type as string for filtering
    pub fn event_type(&self) -> &str {
        match self {
            PipelineEvent::RunStarted { .. } => "RunStarted",
            PipelineEvent::StageStarted { .. } => "StageStarted",
            PipelineEvent::StageCompleted { .. } => "StageCompleted",
            PipelineEvent::RunCompleted { .. } => "RunCompleted",
            PipelineEvent::RunFailed { .. } => "RunFailed",
            PipelineEvent::RunCancelled { .. } => "RunCancelled",
        }
    }

    /// Run UUID this event belongs to
    pub fn run_id(&self) -> Uuid {
        match self {
            PipelineEvent::RunStarted { run_id, .. }
            | PipelineEvent::StageStarted { run_id, .. }
            | PipelineEvent::StageCompleted { run_id, .. }
            | PipelineEvent::RunCompleted { run_id, .. }
            | PipelineEvent::RunFailed { run_id, .. }
            | PipelineEvent::RunCancelled { run_id, .. } => *run_id,
        }
    }
}

/// Central event distribution bus for pipeline events
///
/// The EventBus uses tokio::broadcast internally, providing:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Automatic cleanup when subscribers drop
/// - Lagged message detection for slow subscribers
///
/// # Examples
///
/// ```
/// use sous_common::events::{EventBus, PipelineEvent};
/// use std::sync::Arc;
/// use uuid::Uuid;
///
/// let event_bus = Arc::new(EventBus::new(100));
///
/// // Subscribe to events
/// let mut rx = event_bus.subscribe();
///
/// // Emit an event
/// event_bus.emit_lossy(PipelineEvent::RunStarted {
///     run_id: Uuid::new_v4(),
///     text_len: 42,
///     has_dish_description: false,
///     timestamp: chrono::Utc::now(),
/// });
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PipelineEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Arguments
    ///
    /// * `capacity` - Number of events to buffer before dropping old events
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Returns a receiver that will receive all events emitted after
    /// subscription. Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: PipelineEvent,
    ) -> Result<usize, broadcast::error::SendError<PipelineEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    ///
    /// The pipeline uses this exclusively: the metrics feed must never
    /// block or fail a run when nothing is collecting.
    pub fn emit_lossy(&self, event: PipelineEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    ///
    /// Useful for debugging and monitoring
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
