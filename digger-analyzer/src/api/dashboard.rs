//! Dashboard view API
//!
//! GET /dashboard: the analyzed song and its samples.

use axum::{extract::State, routing::get, Json, Router};
use digger_common::{IdentifiedTrack, Sample};
use serde::Serialize;

use crate::{
    error::{ApiError, ApiResult},
    AppState,
};

/// GET /dashboard response
#[derive(Debug, Serialize)]
pub struct DashboardResponse {
    pub song: IdentifiedTrack,
    pub samples: Vec<Sample>,
}

/// GET /dashboard
pub async fn dashboard_view(State(state): State<AppState>) -> ApiResult<Json<DashboardResponse>> {
    let session = state.session.songs().snapshot()?;

    match session.track {
        Some(song) => Ok(Json(DashboardResponse {
            song,
            samples: session.samples,
        })),
        None => Err(ApiError::NotFound("No song data available".to_string())),
    }
}

/// Build dashboard routes
pub fn dashboard_routes() -> Router<AppState> {
    Router::new().route("/dashboard", get(dashboard_view))
}
