//! Two-stage analysis pipeline
//!
//! ```text
//! NotStarted → Identifying → Identified → LookingUpSamples → Settled(Success | Partial)
//!                   └──────────────→ Settled(Failed)
//! ```
//!
//! The identified track is published before the sample lookup begins, so
//! views show it even when the lookup fails. Every write into the song
//! state carries the run's [`RunToken`]; once a newer run has started the
//! old one stops at its next step and publishes nothing.

use crate::recording::AudioPayload;
use crate::services::{AnalysisService, ServiceError};
use crate::state::{RunToken, SongContext, SongStateError};
use chrono::{DateTime, Utc};
use digger_common::events::{AnalysisStage, DiggerEvent, EventBus, Settlement};
use digger_common::{AnalysisSession, IdentifiedTrack};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

/// Logical checkpoint once the track is identified
pub const IDENTIFIED_CHECKPOINT: u8 = 50;

/// Logical checkpoint once the run is settled
pub const SETTLED_CHECKPOINT: u8 = 100;

/// Failure of one pipeline step
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AnalysisError {
    /// Step 1 failed; nothing was published
    #[error("Identification failed: {message}")]
    IdentificationFailed {
        /// HTTP status, when the service answered
        status: Option<u16>,
        message: String,
    },

    /// Step 2 failed; the track stays published without samples
    #[error("Sample lookup failed: {message}")]
    SampleLookupFailed { status: Option<u16>, message: String },
}

impl AnalysisError {
    fn identification(err: &ServiceError) -> Self {
        AnalysisError::IdentificationFailed {
            status: err.status(),
            message: err.to_string(),
        }
    }

    fn sample_lookup(err: &ServiceError) -> Self {
        AnalysisError::SampleLookupFailed {
            status: err.status(),
            message: err.to_string(),
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            AnalysisError::IdentificationFailed { status, .. }
            | AnalysisError::SampleLookupFailed { status, .. } => *status,
        }
    }
}

/// Recorded stage change
#[derive(Debug, Clone, Serialize)]
pub struct StageTransition {
    pub run_id: Uuid,
    pub old_stage: AnalysisStage,
    pub new_stage: AnalysisStage,
    pub transitioned_at: DateTime<Utc>,
}

/// In-memory state of one analysis run
#[derive(Debug, Clone)]
pub struct AnalysisRun {
    pub run_id: Uuid,
    pub stage: AnalysisStage,
    /// Highest logical checkpoint reached
    pub checkpoint: u8,
    pub transitions: Vec<StageTransition>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl AnalysisRun {
    pub fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            stage: AnalysisStage::NotStarted,
            checkpoint: 0,
            transitions: Vec::new(),
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    /// Move to `new_stage` and record the transition
    pub fn transition_to(&mut self, new_stage: AnalysisStage) -> StageTransition {
        let transition = StageTransition {
            run_id: self.run_id,
            old_stage: self.stage,
            new_stage,
            transitioned_at: Utc::now(),
        };
        self.stage = new_stage;

        if new_stage.is_settled() {
            self.ended_at = Some(transition.transitioned_at);
        }

        self.transitions.push(transition.clone());
        transition
    }

    /// Checkpoints never move backwards
    pub fn reach_checkpoint(&mut self, percent: u8) -> bool {
        if percent > self.checkpoint {
            self.checkpoint = percent;
            true
        } else {
            false
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.stage.is_settled()
    }
}

/// Result of [`AnalysisPipeline::analyze`]
#[derive(Debug, Clone)]
pub struct AnalysisReport {
    pub run_id: Uuid,
    /// `None` when the run was superseded before settling
    pub settlement: Option<Settlement>,
    /// What this run produced (published only if not superseded)
    pub session: AnalysisSession,
    pub error: Option<AnalysisError>,
    pub checkpoint: u8,
    pub transitions: Vec<StageTransition>,
    pub superseded: bool,
}

/// Identify → sample lookup orchestration
#[derive(Clone)]
pub struct AnalysisPipeline {
    service: Arc<dyn AnalysisService>,
    songs: SongContext,
    event_bus: EventBus,
}

impl AnalysisPipeline {
    pub fn new(service: Arc<dyn AnalysisService>, songs: SongContext, event_bus: EventBus) -> Self {
        Self {
            service,
            songs,
            event_bus,
        }
    }

    /// Run both steps for one payload
    ///
    /// Never fails: service errors settle the run and are carried in the
    /// report.
    pub async fn analyze(&self, token: RunToken, payload: Arc<AudioPayload>) -> AnalysisReport {
        let mut run = AnalysisRun::new(token.run_id);
        let mut produced = AnalysisSession::empty();

        info!(run_id = %run.run_id, bytes = payload.len(), "Analysis started");
        self.event_bus.emit_lossy(DiggerEvent::AnalysisStarted {
            run_id: run.run_id,
            timestamp: Utc::now(),
        });

        // Step 1: identify
        self.transition(&mut run, AnalysisStage::Identifying);
        let track = match self.service.identify(&payload).await {
            Ok(track) => track,
            Err(e) => {
                warn!(run_id = %run.run_id, error = %e, "Error identifying song");
                let error = AnalysisError::identification(&e);
                return self.settle(run, token, produced, Settlement::Failed, Some(error));
            }
        };

        self.transition(&mut run, AnalysisStage::Identified);
        self.checkpoint(&mut run, IDENTIFIED_CHECKPOINT);
        produced.track = Some(track.clone());

        if !self.publish_track(&token, &track) {
            return self.supersede(run, produced);
        }

        // Step 2: sample lookup
        self.transition(&mut run, AnalysisStage::LookingUpSamples);
        match self.service.lookup_samples(&track.title, &track.artist).await {
            Ok(samples) => {
                produced.samples = samples.clone();
                if !self.current(self.songs.publish_samples(&token, samples)) {
                    return self.supersede(run, produced);
                }
                self.settle(run, token, produced, Settlement::Success, None)
            }
            Err(e) => {
                warn!(run_id = %run.run_id, error = %e, "Error scraping samples");
                let error = AnalysisError::sample_lookup(&e);
                self.settle(run, token, produced, Settlement::Partial, Some(error))
            }
        }
    }

    fn publish_track(&self, token: &RunToken, track: &IdentifiedTrack) -> bool {
        let published = self.current(self.songs.publish_track(token, track.clone()));
        if published {
            self.event_bus.emit_lossy(DiggerEvent::TrackIdentified {
                run_id: token.run_id,
                track: track.clone(),
                timestamp: Utc::now(),
            });
        }
        published
    }

    /// Interpret a guarded write; anything but a successful write means
    /// this run no longer owns the song state
    fn current(&self, written: Result<bool, SongStateError>) -> bool {
        match written {
            Ok(written) => written,
            Err(e) => {
                warn!(error = %e, "Song state rejected analysis result");
                false
            }
        }
    }

    fn transition(&self, run: &mut AnalysisRun, stage: AnalysisStage) {
        let transition = run.transition_to(stage);
        self.event_bus.emit_lossy(DiggerEvent::AnalysisStageChanged {
            run_id: transition.run_id,
            old_stage: transition.old_stage,
            new_stage: transition.new_stage,
            timestamp: transition.transitioned_at,
        });
    }

    fn checkpoint(&self, run: &mut AnalysisRun, percent: u8) {
        if run.reach_checkpoint(percent) {
            self.event_bus.emit_lossy(DiggerEvent::AnalysisCheckpoint {
                run_id: run.run_id,
                percent,
                timestamp: Utc::now(),
            });
        }
    }

    fn settle(
        &self,
        mut run: AnalysisRun,
        token: RunToken,
        produced: AnalysisSession,
        settlement: Settlement,
        error: Option<AnalysisError>,
    ) -> AnalysisReport {
        // A failed run that was already superseded must not be reported as the current result
        if !matches!(self.songs.is_current(&token), Ok(true)) {
            return self.supersede(run, produced);
        }

        self.transition(&mut run, AnalysisStage::Settled(settlement));
        self.checkpoint(&mut run, SETTLED_CHECKPOINT);

        info!(
            run_id = %run.run_id,
            settlement = %settlement,
            samples = produced.samples.len(),
            "Analysis settled"
        );
        self.event_bus.emit_lossy(DiggerEvent::AnalysisSettled {
            run_id: run.run_id,
            settlement,
            error: error.as_ref().map(|e| e.to_string()),
            timestamp: Utc::now(),
        });

        AnalysisReport {
            run_id: run.run_id,
            settlement: Some(settlement),
            session: produced,
            error,
            checkpoint: run.checkpoint,
            transitions: run.transitions,
            superseded: false,
        }
    }

    fn supersede(&self, run: AnalysisRun, produced: AnalysisSession) -> AnalysisReport {
        info!(run_id = %run.run_id, stage = %run.stage, "Analysis superseded by a newer recording");
        self.event_bus.emit_lossy(DiggerEvent::AnalysisSuperseded {
            run_id: run.run_id,
            timestamp: Utc::now(),
        });

        AnalysisReport {
            run_id: run.run_id,
            settlement: None,
            session: produced,
            error: None,
            checkpoint: run.checkpoint,
            transitions: run.transitions,
            superseded: true,
        }
    }
}
