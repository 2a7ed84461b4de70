//! Capture-related type definitions
//!
//! Supporting types for the recording controller lifecycle.

use serde::{Deserialize, Serialize};

/// Recording controller state
///
/// `Idle → Recording → Stopping → Idle`. The microphone is held only while
/// `Recording` or `Stopping`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RecordingState {
    /// No capture in progress, microphone released
    #[default]
    Idle,
    /// Capturing audio chunks
    Recording,
    /// Capture halted, payload being finalized
    Stopping,
}

impl std::fmt::Display for RecordingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordingState::Idle => write!(f, "idle"),
            RecordingState::Recording => write!(f, "recording"),
            RecordingState::Stopping => write!(f, "stopping"),
        }
    }
}

/// Why a recording ended
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Explicit stop from the user (toggle)
    Manual,
    /// The safety timer hit the recording cap
    SafetyTimer,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopReason::Manual => write!(f, "manual"),
            StopReason::SafetyTimer => write!(f, "safety_timer"),
        }
    }
}
