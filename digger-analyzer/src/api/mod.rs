//! HTTP API handlers for digger-analyzer
//!
//! Views consume the analyzer core over REST + SSE.

pub mod analyzer;
pub mod dashboard;
pub mod health;
pub mod sse;

pub use analyzer::analyzer_routes;
pub use dashboard::dashboard_routes;
pub use health::health_routes;
pub use sse::event_stream;
