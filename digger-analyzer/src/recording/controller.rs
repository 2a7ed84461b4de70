//! Recording controller
//!
//! Owns the capture lifecycle for one UI session:
//!
//! ```text
//! Idle --start()--> Recording --stop() / safety timer--> Stopping --> Idle
//! ```
//!
//! The safety timer caps every recording at [`MAX_RECORDING_DURATION`].
//! Manual stop and timer race; whichever takes the controller lock first
//! finalizes the recording and the other finds the controller no longer
//! `Recording` and does nothing. The completion callback therefore runs at
//! most once per recording.

use super::payload::AudioPayload;
use super::source::{AudioChunk, CaptureError, CaptureFormat, CaptureHandle, RecordingSource};
use chrono::Utc;
use digger_common::events::{DiggerEvent, EventBus, RecordingState, StopReason};
use std::sync::{Arc, RwLock, Weak};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Hard cap on a single recording
pub const MAX_RECORDING_DURATION: Duration = Duration::from_millis(5000);

/// Lead time of the safety timer before the cap
///
/// Covers timer wakeup latency plus releasing the device, so a safety stop
/// is back to `Idle` within [`MAX_RECORDING_DURATION`] on a real clock.
pub const SAFETY_STOP_MARGIN: Duration = Duration::from_millis(100);

/// Recording controller errors
#[derive(Debug, Error)]
pub enum RecordingError {
    #[error(transparent)]
    Capture(#[from] CaptureError),

    /// `start()` while a recording is running or being finalized
    #[error("Recording already in progress (state: {0})")]
    NotIdle(RecordingState),

    #[error("Failed to finalize recording: {0}")]
    Finalize(String),
}

/// A finished recording handed to the completion callback
#[derive(Debug, Clone)]
pub struct CompletedRecording {
    pub recording_id: Uuid,
    pub payload: Arc<AudioPayload>,
    pub reason: StopReason,
    /// From successful start to release of the device
    pub elapsed: Duration,
}

/// Invoked once per finished recording
pub type CompletionCallback = Arc<dyn Fn(CompletedRecording) + Send + Sync>;

struct ActiveCapture {
    recording_id: Uuid,
    handle: CaptureHandle,
    started_at: Instant,
    safety_timer: Option<JoinHandle<()>>,
}

struct ControllerInner {
    state: RecordingState,
    active: Option<ActiveCapture>,
}

struct ControllerShared {
    source: Arc<dyn RecordingSource>,
    inner: Mutex<ControllerInner>,
    state_tx: watch::Sender<RecordingState>,
    callback: RwLock<Option<CompletionCallback>>,
    event_bus: EventBus,
}

/// Microphone capture with a safety auto-stop
///
/// Cloning yields another handle to the same controller.
#[derive(Clone)]
pub struct RecordingController {
    shared: Arc<ControllerShared>,
}

impl RecordingController {
    pub fn new(source: Arc<dyn RecordingSource>, event_bus: EventBus) -> Self {
        let (state_tx, _) = watch::channel(RecordingState::Idle);
        Self {
            shared: Arc::new(ControllerShared {
                source,
                inner: Mutex::new(ControllerInner {
                    state: RecordingState::Idle,
                    active: None,
                }),
                state_tx,
                callback: RwLock::new(None),
                event_bus,
            }),
        }
    }

    /// Register the receiver of finished recordings (replaces any previous one)
    pub fn set_completion_callback(&self, callback: CompletionCallback) {
        match self.shared.callback.write() {
            Ok(mut slot) => *slot = Some(callback),
            Err(poisoned) => *poisoned.into_inner() = Some(callback),
        }
    }

    /// Current state
    pub fn state(&self) -> RecordingState {
        *self.shared.state_tx.borrow()
    }

    pub fn is_recording(&self) -> bool {
        self.state() == RecordingState::Recording
    }

    /// Watch state changes
    pub fn subscribe_state(&self) -> watch::Receiver<RecordingState> {
        self.shared.state_tx.subscribe()
    }

    /// Acquire the microphone and start buffering
    ///
    /// Returns the new recording id. On failure the controller stays `Idle`
    /// and the error is returned to the caller; nothing is retried.
    pub async fn start(&self) -> Result<Uuid, RecordingError> {
        let mut inner = self.shared.inner.lock().await;

        if inner.state != RecordingState::Idle {
            warn!(state = %inner.state, "Ignoring start request: recording not idle");
            return Err(RecordingError::NotIdle(inner.state));
        }

        let handle = match self.shared.source.start().await {
            Ok(handle) => handle,
            Err(e) => {
                warn!(error = %e, "Error starting recording");
                self.shared.event_bus.emit_lossy(DiggerEvent::CaptureFailed {
                    error: e.to_string(),
                    timestamp: Utc::now(),
                });
                return Err(e.into());
            }
        };

        let recording_id = Uuid::new_v4();
        let started_at = Instant::now();
        let safety_timer = self.arm_safety_timer(recording_id, started_at);

        info!(
            recording_id = %recording_id,
            sample_rate = handle.format.sample_rate,
            channels = handle.format.channels,
            "Recording started"
        );

        inner.active = Some(ActiveCapture {
            recording_id,
            handle,
            started_at,
            safety_timer: Some(safety_timer),
        });
        self.set_state(&mut inner, RecordingState::Recording);

        self.shared.event_bus.emit_lossy(DiggerEvent::RecordingStarted {
            recording_id,
            timestamp: Utc::now(),
        });

        Ok(recording_id)
    }

    /// Stop the current recording
    ///
    /// No-op (returns `Ok(None)`) unless `Recording`.
    pub async fn stop(&self) -> Result<Option<CompletedRecording>, RecordingError> {
        self.finish(None, StopReason::Manual).await
    }

    fn arm_safety_timer(&self, recording_id: Uuid, started_at: Instant) -> JoinHandle<()> {
        let weak: Weak<ControllerShared> = Arc::downgrade(&self.shared);
        tokio::spawn(async move {
            tokio::time::sleep_until(started_at + MAX_RECORDING_DURATION - SAFETY_STOP_MARGIN)
                .await;

            let Some(shared) = weak.upgrade() else {
                return;
            };
            let controller = RecordingController { shared };

            debug!(recording_id = %recording_id, "Safety timer fired");
            if let Err(e) = controller
                .finish(Some(recording_id), StopReason::SafetyTimer)
                .await
            {
                error!(recording_id = %recording_id, error = %e, "Safety stop failed");
            }
        })
    }

    async fn finish(
        &self,
        expected: Option<Uuid>,
        reason: StopReason,
    ) -> Result<Option<CompletedRecording>, RecordingError> {
        let completed = {
            let mut inner = self.shared.inner.lock().await;

            if inner.state != RecordingState::Recording {
                debug!(state = %inner.state, reason = %reason, "Stop ignored: not recording");
                return Ok(None);
            }

            // A timer from an earlier recording must not stop this one
            let current_id = inner.active.as_ref().map(|a| a.recording_id);
            if expected.is_some() && expected != current_id {
                debug!(reason = %reason, "Stop ignored: stale safety timer");
                return Ok(None);
            }

            let Some(mut active) = inner.active.take() else {
                return Ok(None);
            };
            self.set_state(&mut inner, RecordingState::Stopping);

            if let Some(timer) = active.safety_timer.take() {
                // The timer task itself is the caller on the SafetyTimer path
                if reason == StopReason::Manual {
                    timer.abort();
                }
            }

            let (format, chunks) = active.handle.release();
            let elapsed = active.started_at.elapsed();
            let chunks = cap_to_max_duration(format, chunks);
            let payload = AudioPayload::from_chunks(format, &chunks);

            self.set_state(&mut inner, RecordingState::Idle);

            match payload {
                Ok(payload) => CompletedRecording {
                    recording_id: active.recording_id,
                    payload: Arc::new(payload),
                    reason,
                    elapsed,
                },
                Err(e) => {
                    error!(recording_id = %active.recording_id, error = %e, "Failed to finalize recording");
                    return Err(RecordingError::Finalize(e.to_string()));
                }
            }
        };

        info!(
            recording_id = %completed.recording_id,
            reason = %completed.reason,
            elapsed_ms = completed.elapsed.as_millis() as u64,
            bytes = completed.payload.len(),
            "Recording stopped"
        );

        self.shared.event_bus.emit_lossy(DiggerEvent::RecordingStopped {
            recording_id: completed.recording_id,
            reason: completed.reason,
            elapsed_ms: completed.elapsed.as_millis() as u64,
            payload_bytes: completed.payload.len(),
            timestamp: Utc::now(),
        });

        let callback = match self.shared.callback.read() {
            Ok(slot) => slot.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        match callback {
            Some(callback) => callback(completed.clone()),
            None => warn!("No completion callback registered, recording dropped"),
        }

        Ok(Some(completed))
    }

    fn set_state(&self, inner: &mut ControllerInner, state: RecordingState) {
        inner.state = state;
        self.shared.state_tx.send_replace(state);
    }
}

/// Drop audio captured past the recording cap
///
/// Timer wakeups land a little after the deadline on a real clock; the
/// payload itself never exceeds the cap.
fn cap_to_max_duration(format: CaptureFormat, chunks: Vec<AudioChunk>) -> Vec<AudioChunk> {
    let max_samples = (format.sample_rate as u128 * format.channels as u128
        * MAX_RECORDING_DURATION.as_millis()
        / 1000) as usize;

    let mut remaining = max_samples;
    let mut capped = Vec::with_capacity(chunks.len());
    for mut chunk in chunks {
        if remaining == 0 {
            break;
        }
        if chunk.len() > remaining {
            chunk.truncate(remaining);
        }
        remaining -= chunk.len();
        capped.push(chunk);
    }
    capped
}
