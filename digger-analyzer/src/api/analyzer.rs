//! Analyzer view API
//!
//! GET /analyzer, POST /analyzer/toggle

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use digger_common::events::Settlement;
use digger_common::{IdentifiedTrack, Sample};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::{
    error::ApiResult,
    session::{AnalyzerStatus, ToggleOutcome},
    AppState,
};

/// Outcome of the most recent settled run
#[derive(Debug, Serialize)]
pub struct LastRunSummary {
    pub run_id: Uuid,
    pub settlement: Option<Settlement>,
    /// Logical checkpoint (50 / 100), separate from the displayed percent
    pub checkpoint: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// GET /analyzer response
#[derive(Debug, Serialize)]
pub struct AnalyzerViewResponse {
    pub status: AnalyzerStatus,
    pub song: Option<IdentifiedTrack>,
    pub samples: Vec<Sample>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_run: Option<LastRunSummary>,
}

/// POST /analyzer/toggle response
#[derive(Debug, Serialize)]
pub struct ToggleResponse {
    #[serde(flatten)]
    pub outcome: ToggleOutcome,
    pub status: AnalyzerStatus,
}

/// GET /analyzer
pub async fn analyzer_view(State(state): State<AppState>) -> ApiResult<Json<AnalyzerViewResponse>> {
    let session = state.session.songs().snapshot()?;
    let last_run = state.session.last_report().map(|report| LastRunSummary {
        run_id: report.run_id,
        settlement: report.settlement,
        checkpoint: report.checkpoint,
        error: report.error.map(|e| e.to_string()),
    });

    Ok(Json(AnalyzerViewResponse {
        status: state.session.status(),
        song: session.track,
        samples: session.samples,
        last_run,
    }))
}

/// POST /analyzer/toggle
///
/// Starts a recording, or stops the running one.
pub async fn toggle_capture(State(state): State<AppState>) -> ApiResult<Json<ToggleResponse>> {
    let outcome = state.session.toggle().await?;
    info!(outcome = ?outcome, "Capture toggled");

    Ok(Json(ToggleResponse {
        outcome,
        status: state.session.status(),
    }))
}

/// Build analyzer routes
pub fn analyzer_routes() -> Router<AppState> {
    Router::new()
        .route("/analyzer", get(analyzer_view))
        .route("/analyzer/toggle", post(toggle_capture))
}
