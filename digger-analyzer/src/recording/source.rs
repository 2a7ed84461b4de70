//! Recording source abstraction
//!
//! A [`RecordingSource`] hands out exclusive access to a capture device. The
//! returned [`CaptureHandle`] streams PCM chunks until its tracks are stopped.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

/// Interleaved signed 16-bit PCM, in arrival order
pub type AudioChunk = Vec<i16>;

/// Capture acquisition errors
///
/// Both are terminal for the attempt: nothing is retried, the user must
/// trigger capture again.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CaptureError {
    /// The platform refused microphone access
    #[error("Microphone permission denied")]
    PermissionDenied,

    /// No usable capture device
    #[error("Capture device unavailable: {0}")]
    DeviceUnavailable(String),
}

/// Sample layout of a capture stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureFormat {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of interleaved channels
    pub channels: u16,
}

/// Hardware side of an acquired capture
pub trait CaptureTracks: Send {
    /// Stop every underlying hardware track
    ///
    /// Once this returns the device is released and no further chunks are
    /// sent. Must tolerate being called more than once.
    fn stop_all(&mut self);
}

/// Live capture returned by [`RecordingSource::start`]
pub struct CaptureHandle {
    pub format: CaptureFormat,
    /// Chunks in arrival order
    pub chunks: mpsc::UnboundedReceiver<AudioChunk>,
    pub tracks: Box<dyn CaptureTracks>,
}

impl CaptureHandle {
    pub fn new(
        format: CaptureFormat,
        chunks: mpsc::UnboundedReceiver<AudioChunk>,
        tracks: Box<dyn CaptureTracks>,
    ) -> Self {
        Self {
            format,
            chunks,
            tracks,
        }
    }

    /// Release the hardware and collect every chunk received so far
    ///
    /// Empty chunks are skipped.
    pub fn release(mut self) -> (CaptureFormat, Vec<AudioChunk>) {
        self.tracks.stop_all();

        let mut collected = Vec::new();
        while let Ok(chunk) = self.chunks.try_recv() {
            if !chunk.is_empty() {
                collected.push(chunk);
            }
        }

        (self.format, collected)
    }
}

/// Microphone-like capture device
#[async_trait]
pub trait RecordingSource: Send + Sync {
    /// Request access to the device and begin capturing
    ///
    /// # Errors
    /// `PermissionDenied` or `DeviceUnavailable`
    async fn start(&self) -> Result<CaptureHandle, CaptureError>;
}

/// Source used when the binary is built without capture support
pub struct UnavailableSource {
    reason: String,
}

impl UnavailableSource {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl RecordingSource for UnavailableSource {
    async fn start(&self) -> Result<CaptureHandle, CaptureError> {
        Err(CaptureError::DeviceUnavailable(self.reason.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingTracks(Arc<AtomicUsize>);

    impl CaptureTracks for CountingTracks {
        fn stop_all(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_release_stops_tracks_and_keeps_order() {
        let stops = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = CaptureHandle::new(
            CaptureFormat {
                sample_rate: 8000,
                channels: 1,
            },
            rx,
            Box::new(CountingTracks(stops.clone())),
        );

        tx.send(vec![1, 2]).unwrap();
        tx.send(Vec::new()).unwrap();
        tx.send(vec![3]).unwrap();

        let (format, chunks) = handle.release();
        assert_eq!(format.sample_rate, 8000);
        assert_eq!(chunks, vec![vec![1, 2], vec![3]]);
        assert_eq!(stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unavailable_source_reports_device_unavailable() {
        let source = UnavailableSource::new("built without microphone support");
        match source.start().await {
            Err(CaptureError::DeviceUnavailable(reason)) => {
                assert!(reason.contains("microphone"))
            }
            _ => panic!("expected DeviceUnavailable"),
        }
    }
}
