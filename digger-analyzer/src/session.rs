//! Analyzer session
//!
//! Ties the recording controller, the analysis pipeline and the progress
//! ticker together behind one capture trigger:
//!
//! - `toggle()` while recording stops the capture; the finished recording
//!   is analyzed in the background.
//! - `toggle()` otherwise clears the song state, supersedes any in-flight
//!   analysis and starts a new recording.
//!
//! `analyzing` is true from the moment a recording is handed over until its
//! run settles or is superseded. The ticker runs exactly while `analyzing`
//! is true, and the displayed percent drops back to 0 when it turns false.

use crate::recording::{CompletedRecording, RecordingController, RecordingError};
use crate::state::{RunToken, SongContext, SongStateError};
use crate::workflow::{AnalysisPipeline, AnalysisReport, ProgressTicker, TickerGuard};
use digger_common::events::RecordingState;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Session errors
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Recording(#[from] RecordingError),

    #[error(transparent)]
    SongState(#[from] SongStateError),
}

/// What views need to render the capture trigger and progress bar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AnalyzerStatus {
    pub recording_state: RecordingState,
    pub analyzing: bool,
    /// Displayed (cosmetic) percent
    pub percent: u8,
    /// Capture trigger is disabled while analyzing
    pub capture_enabled: bool,
}

/// Result of [`AnalyzerSession::toggle`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ToggleOutcome {
    Started { recording_id: Uuid, run_id: Uuid },
    /// `recording_id` is `None` when the recording had already stopped
    Stopped { recording_id: Option<Uuid> },
}

struct ActiveRun {
    token: RunToken,
    ticker: TickerGuard,
}

#[derive(Default)]
struct RunSlot {
    /// Token reserved for the recording in progress
    pending: Option<(Uuid, RunToken)>,
    active: Option<ActiveRun>,
    last_report: Option<AnalysisReport>,
}

struct SessionShared {
    controller: RecordingController,
    pipeline: AnalysisPipeline,
    songs: SongContext,
    ticker: ProgressTicker,
    runs: Mutex<RunSlot>,
    /// Serializes toggles
    toggle_lock: tokio::sync::Mutex<()>,
    status_tx: watch::Sender<AnalyzerStatus>,
}

impl SessionShared {
    fn lock_runs(&self) -> MutexGuard<'_, RunSlot> {
        match self.runs.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn status(&self) -> AnalyzerStatus {
        let analyzing = self.lock_runs().active.is_some();
        AnalyzerStatus {
            recording_state: self.controller.state(),
            analyzing,
            percent: self.ticker.percent(),
            capture_enabled: !analyzing,
        }
    }

    fn refresh(&self) {
        let status = self.status();
        self.status_tx.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
    }

    /// Completion callback body; runs synchronously inside the controller's stop
    fn on_recording_complete(self: &Arc<Self>, completed: CompletedRecording) {
        let token = {
            let mut runs = self.lock_runs();
            match runs.pending.take() {
                Some((recording_id, token)) if recording_id == completed.recording_id => token,
                other => {
                    runs.pending = other;
                    warn!(
                        recording_id = %completed.recording_id,
                        "Discarding recording that finished after a newer capture started"
                    );
                    return;
                }
            }
        };

        let ticker = self.ticker.start();
        {
            let mut runs = self.lock_runs();
            if let Some(previous) = runs.active.take() {
                debug!(run_id = %previous.token.run_id, "Replacing active run");
            }
            runs.active = Some(ActiveRun { token, ticker });
        }
        self.refresh();

        info!(
            run_id = %token.run_id,
            recording_id = %completed.recording_id,
            reason = %completed.reason,
            "Handing recording to analysis"
        );

        let shared = self.clone();
        tokio::spawn(async move {
            let pipeline = shared.pipeline.clone();
            let payload = completed.payload.clone();
            let report = tokio::spawn(async move { pipeline.analyze(token, payload).await }).await;
            match report {
                Ok(report) => shared.finish_run(token, Some(report)),
                Err(e) => {
                    error!(run_id = %token.run_id, error = %e, "Analysis task failed");
                    shared.finish_run(token, None);
                }
            }
        });
    }

    /// Leave the analyzing state if `token`'s run is still the active one
    fn finish_run(&self, token: RunToken, report: Option<AnalysisReport>) {
        {
            let mut runs = self.lock_runs();
            let is_active = runs
                .active
                .as_ref()
                .map(|active| active.token == token)
                .unwrap_or(false);
            if is_active {
                if let Some(active) = runs.active.take() {
                    active.ticker.stop();
                    self.ticker.reset();
                }
            }
            if let Some(report) = report.filter(|r| !r.superseded) {
                runs.last_report = Some(report);
            }
        }
        self.refresh();
    }

    /// Stop tracking the in-flight run; its results are already fenced off by the song state
    fn supersede_active(&self) {
        let previous = self.lock_runs().active.take();
        if let Some(previous) = previous {
            info!(run_id = %previous.token.run_id, "Superseding in-flight analysis");
            previous.ticker.stop();
            self.ticker.reset();
        }
    }
}

/// Capture trigger plus background analysis
#[derive(Clone)]
pub struct AnalyzerSession {
    shared: Arc<SessionShared>,
}

impl AnalyzerSession {
    pub fn new(
        controller: RecordingController,
        pipeline: AnalysisPipeline,
        songs: SongContext,
        ticker: ProgressTicker,
    ) -> Self {
        let initial = AnalyzerStatus {
            recording_state: controller.state(),
            analyzing: false,
            percent: ticker.percent(),
            capture_enabled: true,
        };
        let (status_tx, _) = watch::channel(initial);

        let shared = Arc::new(SessionShared {
            controller,
            pipeline,
            songs,
            ticker,
            runs: Mutex::new(RunSlot::default()),
            toggle_lock: tokio::sync::Mutex::new(()),
            status_tx,
        });

        let weak: Weak<SessionShared> = Arc::downgrade(&shared);
        shared
            .controller
            .set_completion_callback(Arc::new(move |completed: CompletedRecording| {
                if let Some(shared) = weak.upgrade() {
                    shared.on_recording_complete(completed);
                }
            }));

        spawn_status_forwarder(&shared);

        Self { shared }
    }

    /// The capture trigger
    pub async fn toggle(&self) -> Result<ToggleOutcome, SessionError> {
        let _toggle = self.shared.toggle_lock.lock().await;

        if self.shared.controller.is_recording() {
            let stopped = self.shared.controller.stop().await?;
            self.shared.refresh();
            return Ok(ToggleOutcome::Stopped {
                recording_id: stopped.map(|c| c.recording_id),
            });
        }

        let run_id = Uuid::new_v4();
        let token = self.shared.songs.begin_run(run_id)?;
        self.shared.supersede_active();
        self.shared.lock_runs().pending = None;
        self.shared.refresh();

        let recording_id = self.shared.controller.start().await?;
        self.shared.lock_runs().pending = Some((recording_id, token));
        self.shared.refresh();

        Ok(ToggleOutcome::Started {
            recording_id,
            run_id,
        })
    }

    pub fn status(&self) -> AnalyzerStatus {
        self.shared.status()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<AnalyzerStatus> {
        self.shared.status_tx.subscribe()
    }

    pub fn is_analyzing(&self) -> bool {
        self.shared.lock_runs().active.is_some()
    }

    /// Report of the most recent run that settled without being superseded
    pub fn last_report(&self) -> Option<AnalysisReport> {
        self.shared.lock_runs().last_report.clone()
    }

    pub fn songs(&self) -> &SongContext {
        &self.shared.songs
    }

    pub fn controller(&self) -> &RecordingController {
        &self.shared.controller
    }

    /// Wait until no analysis is in flight
    pub async fn wait_settled(&self) -> Option<AnalysisReport> {
        let mut rx = self.shared.status_tx.subscribe();
        if rx.wait_for(|status| !status.analyzing).await.is_err() {
            warn!("Status channel closed while waiting for analysis");
        }
        self.last_report()
    }
}

/// Mirror recording state and ticker changes into the status channel
fn spawn_status_forwarder(shared: &Arc<SessionShared>) {
    let weak = Arc::downgrade(shared);
    let mut state_rx = shared.controller.subscribe_state();
    let mut percent_rx = shared.ticker.subscribe();

    tokio::spawn(async move {
        loop {
            tokio::select! {
                changed = state_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                changed = percent_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
            match weak.upgrade() {
                Some(shared) => shared.refresh(),
                None => break,
            }
        }
        debug!("Status forwarder stopped");
    });
}
