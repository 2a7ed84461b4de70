//! # Crate Digger Common Library
//!
//! Shared code for the Crate Digger services:
//! - Song data model (identified track, samples, analysis session)
//! - Event types (DiggerEvent enum) and the EventBus
//! - Configuration loading
//! - Error type

pub mod config;
pub mod error;
pub mod events;
pub mod song;

pub use error::{Error, Result};
pub use song::{AnalysisSession, IdentifiedTrack, Sample};
