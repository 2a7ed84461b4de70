//! Analysis-related type definitions
//!
//! Stages of the two-step identify → sample lookup run.

use serde::{Deserialize, Serialize};

/// How an analysis run ended
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Settlement {
    /// Track identified and samples retrieved (possibly zero samples)
    Success,
    /// Track identified, sample lookup failed
    Partial,
    /// Identification failed, nothing published
    Failed,
}

impl std::fmt::Display for Settlement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Settlement::Success => write!(f, "success"),
            Settlement::Partial => write!(f, "partial"),
            Settlement::Failed => write!(f, "failed"),
        }
    }
}

/// Analysis pipeline stage
///
/// `NotStarted → Identifying → Identified → LookingUpSamples → Settled`,
/// with `Identifying → Settled(Failed)` as the early exit.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStage {
    NotStarted,
    Identifying,
    Identified,
    LookingUpSamples,
    Settled(Settlement),
}

impl AnalysisStage {
    pub fn is_settled(&self) -> bool {
        matches!(self, AnalysisStage::Settled(_))
    }
}

impl std::fmt::Display for AnalysisStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnalysisStage::NotStarted => write!(f, "not_started"),
            AnalysisStage::Identifying => write!(f, "identifying"),
            AnalysisStage::Identified => write!(f, "identified"),
            AnalysisStage::LookingUpSamples => write!(f, "looking_up_samples"),
            AnalysisStage::Settled(outcome) => write!(f, "settled({})", outcome),
        }
    }
}
