//! Analysis workflow
//!
//! - [`pipeline`]: identify → sample lookup state machine
//! - [`progress_ticker`]: cosmetic percent shown while a run is in flight

pub mod pipeline;
pub mod progress_ticker;

pub use pipeline::{
    AnalysisError, AnalysisPipeline, AnalysisReport, AnalysisRun, StageTransition,
    IDENTIFIED_CHECKPOINT, SETTLED_CHECKPOINT,
};
pub use progress_ticker::{ProgressTicker, TickerGuard, MAX_PERCENT, TICK_INTERVAL};
