//! digger-analyzer library interface
//!
//! Records a short clip from the microphone, identifies the track, looks up
//! the samples it uses and publishes the result to the shared song state.
//! Exposes public APIs for integration testing.

pub mod api;
pub mod config;
pub mod error;
pub mod recording;
pub mod services;
pub mod session;
pub mod state;
pub mod workflow;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use digger_common::events::EventBus;
use recording::{RecordingController, RecordingSource};
use services::AnalysisService;
use session::AnalyzerSession;
use state::SongProvider;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use workflow::{AnalysisPipeline, ProgressTicker};

/// Event bus buffer; the ticker alone emits 20 events per second
pub const EVENT_BUS_CAPACITY: usize = 256;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Capture trigger and analysis orchestration
    pub session: AnalyzerSession,
    /// Owner of the shared song state; handles die with it
    pub songs: Arc<SongProvider>,
    /// Event bus for SSE broadcasting
    pub event_bus: EventBus,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    /// Wire the analyzer core around a recording source and an analysis service
    pub fn new(
        source: Arc<dyn RecordingSource>,
        service: Arc<dyn AnalysisService>,
        event_bus: EventBus,
    ) -> Self {
        let songs = Arc::new(SongProvider::new(event_bus.clone()));
        let controller = RecordingController::new(source, event_bus.clone());
        let pipeline = AnalysisPipeline::new(service, songs.context(), event_bus.clone());
        let ticker = ProgressTicker::new(event_bus.clone());
        let session = AnalyzerSession::new(controller, pipeline, songs.context(), ticker);

        Self {
            session,
            songs,
            event_bus,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    Router::new()
        .merge(api::analyzer_routes())
        .merge(api::dashboard_routes())
        .merge(api::health_routes())
        .route("/events", get(api::event_stream))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
