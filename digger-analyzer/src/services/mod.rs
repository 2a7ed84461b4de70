//! Remote collaborators of the analysis pipeline

pub mod analysis_service;
pub mod sample_api_client;

pub use analysis_service::{AnalysisService, ServiceError};
pub use sample_api_client::SampleApiClient;
