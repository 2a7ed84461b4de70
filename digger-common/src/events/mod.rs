//! Event types for the Crate Digger event system
//!
//! Provides shared event definitions and the EventBus used by the analyzer
//! core and its SSE endpoint.

// Sub-modules (supporting types)
mod analysis_types;
mod capture_types;

pub use analysis_types::{AnalysisStage, Settlement};
pub use capture_types::{RecordingState, StopReason};

use crate::song::{AnalysisSession, IdentifiedTrack};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Crate Digger event types
///
/// Events are broadcast via EventBus and serialized for SSE transmission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DiggerEvent {
    /// Microphone acquired, capture running
    ///
    /// Triggers:
    /// - SSE: Switch capture button to "stop"
    RecordingStarted {
        recording_id: Uuid,
        timestamp: DateTime<Utc>,
    },

    /// Capture halted and payload finalized
    RecordingStopped {
        recording_id: Uuid,
        /// Manual stop or safety timer
        reason: StopReason,
        /// Time between capture start and release of the microphone
        elapsed_ms: u64,
        /// Size of the finalized payload in bytes
        payload_bytes: usize,
        timestamp: DateTime<Utc>,
    },

    /// Microphone could not be acquired
    CaptureFailed {
        /// Human-readable failure ("permission denied", "device unavailable: ...")
        error: String,
        timestamp: DateTime<Utc>,
    },

    /// Analysis run started for a finished recording
    AnalysisStarted {
        run_id: Uuid,
        timestamp: DateTime<Utc>,
    },

    /// Pipeline moved between stages
    AnalysisStageChanged {
        run_id: Uuid,
        old_stage: AnalysisStage,
        new_stage: AnalysisStage,
        timestamp: DateTime<Utc>,
    },

    /// Logical checkpoint reached (50 after identify, 100 when settled)
    AnalysisCheckpoint {
        run_id: Uuid,
        percent: u8,
        timestamp: DateTime<Utc>,
    },

    /// Cosmetic progress value changed
    ///
    /// Emitted by the progress ticker every 50ms while analyzing.
    AnalysisProgress {
        percent: u8,
        timestamp: DateTime<Utc>,
    },

    /// Track published to the shared song state
    TrackIdentified {
        run_id: Uuid,
        track: IdentifiedTrack,
        timestamp: DateTime<Utc>,
    },

    /// Analysis run finished
    ///
    /// Triggers:
    /// - SSE: Hide progress bar, re-enable capture button
    AnalysisSettled {
        run_id: Uuid,
        settlement: Settlement,
        /// Failure description for `Partial` / `Failed`
        error: Option<String>,
        timestamp: DateTime<Utc>,
    },

    /// A newer recording replaced this run before it settled
    AnalysisSuperseded {
        run_id: Uuid,
        timestamp: DateTime<Utc>,
    },

    /// Shared song state changed (cleared, track set or samples set)
    SongStateChanged {
        session: AnalysisSession,
        timestamp: DateTime<Utc>,
    },
}

impl DiggerEvent {
    /// Event type name, used as the SSE `event:` field
    pub fn event_type(&self) -> &str {
        match self {
            DiggerEvent::RecordingStarted { .. } => "RecordingStarted",
            DiggerEvent::RecordingStopped { .. } => "RecordingStopped",
            DiggerEvent::CaptureFailed { .. } => "CaptureFailed",
            DiggerEvent::AnalysisStarted { .. } => "AnalysisStarted",
            DiggerEvent::AnalysisStageChanged { .. } => "AnalysisStageChanged",
            DiggerEvent::AnalysisCheckpoint { .. } => "AnalysisCheckpoint",
            DiggerEvent::AnalysisProgress { .. } => "AnalysisProgress",
            DiggerEvent::TrackIdentified { .. } => "TrackIdentified",
            DiggerEvent::AnalysisSettled { .. } => "AnalysisSettled",
            DiggerEvent::AnalysisSuperseded { .. } => "AnalysisSuperseded",
            DiggerEvent::SongStateChanged { .. } => "SongStateChanged",
        }
    }
}

/// Central event distribution bus
///
/// Thin wrapper over `tokio::sync::broadcast`. Cloning the bus shares the
/// same channel.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<DiggerEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Arguments
    ///
    /// * `capacity` - Number of events to buffer before lagging receivers drop old events
    ///
    /// # Examples
    ///
    /// ```
    /// use digger_common::events::EventBus;
    ///
    /// let event_bus = EventBus::new(100);
    /// assert_eq!(event_bus.capacity(), 100);
    /// ```
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<DiggerEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: DiggerEvent,
    ) -> Result<usize, broadcast::error::SendError<DiggerEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: DiggerEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
