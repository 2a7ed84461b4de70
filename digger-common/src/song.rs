//! Song data model shared by the analyzer and its views
//!
//! An [`AnalysisSession`] pairs one [`IdentifiedTrack`] with the ordered
//! [`Sample`] sequence found for it. Values are replaced wholesale, never
//! edited in place.

use serde::{Deserialize, Serialize};

/// Track returned by a successful identify call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifiedTrack {
    /// Track title
    pub title: String,
    /// Performing artist
    pub artist: String,
    /// Cover art location, if the identification service knows one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artwork_url: Option<String>,
}

impl IdentifiedTrack {
    pub fn new(
        title: impl Into<String>,
        artist: impl Into<String>,
        artwork_url: Option<String>,
    ) -> Self {
        Self {
            title: title.into(),
            artist: artist.into(),
            artwork_url,
        }
    }
}

/// A recording sampled by the identified track
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    pub title: String,
    pub artist: String,
    /// Release year as reported by the lookup service (free-form)
    pub year: String,
}

impl Sample {
    pub fn new(title: impl Into<String>, artist: impl Into<String>, year: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            artist: artist.into(),
            year: year.into(),
        }
    }
}

/// The current analysis result as seen by every view
///
/// Invariant: `samples` is non-empty only when `track` is `Some`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisSession {
    pub track: Option<IdentifiedTrack>,
    pub samples: Vec<Sample>,
}

impl AnalysisSession {
    /// Session with nothing analyzed yet
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.track.is_none() && self.samples.is_empty()
    }

    /// Check the track/samples pairing invariant
    pub fn is_consistent(&self) -> bool {
        self.track.is_some() || self.samples.is_empty()
    }
}
