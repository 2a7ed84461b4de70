//! Audio capture
//!
//! - [`source`]: the recording source seam and capture handle
//! - [`controller`]: capture lifecycle with the safety auto-stop
//! - [`payload`]: WAV finalization of buffered chunks
//! - `microphone`: cpal-backed source (feature `microphone`)

pub mod controller;
#[cfg(feature = "microphone")]
pub mod microphone;
pub mod payload;
pub mod source;

pub use controller::{
    CompletedRecording, CompletionCallback, RecordingController, RecordingError,
    MAX_RECORDING_DURATION, SAFETY_STOP_MARGIN,
};
#[cfg(feature = "microphone")]
pub use microphone::MicrophoneSource;
pub use payload::AudioPayload;
pub use source::{
    AudioChunk, CaptureError, CaptureFormat, CaptureHandle, CaptureTracks, RecordingSource,
    UnavailableSource,
};
