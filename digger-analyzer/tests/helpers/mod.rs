//! Test Helper Utilities
//!
//! Shared fakes for testing digger-analyzer without a microphone or a
//! running analysis service.

#![allow(dead_code)]

use async_trait::async_trait;
use digger_analyzer::recording::{
    AudioChunk, AudioPayload, CaptureError, CaptureFormat, CaptureHandle, CaptureTracks,
    RecordingSource,
};
use digger_analyzer::services::{AnalysisService, ServiceError};
use digger_analyzer::AppState;
use digger_common::events::EventBus;
use digger_common::{IdentifiedTrack, Sample};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot};

/// 8 kHz mono, 100 ms per pre-filled chunk
pub const TEST_FORMAT: CaptureFormat = CaptureFormat {
    sample_rate: 8000,
    channels: 1,
};

pub fn shook_ones() -> IdentifiedTrack {
    IdentifiedTrack::new(
        "Shook Ones Pt II",
        "Mobb Deep",
        Some("https://img.example/shook-ones.jpg".to_string()),
    )
}

pub fn top_billin() -> Sample {
    Sample::new("Top Billin'", "Audio Two", "1988")
}

struct FakeTracks {
    releases: Arc<AtomicUsize>,
}

impl CaptureTracks for FakeTracks {
    fn stop_all(&mut self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}

/// Recording source with scripted failures and observable release
#[derive(Default)]
pub struct FakeSource {
    failure: Mutex<Option<CaptureError>>,
    starts: AtomicUsize,
    releases: Arc<AtomicUsize>,
    senders: Mutex<Vec<mpsc::UnboundedSender<AudioChunk>>>,
}

impl FakeSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing(error: CaptureError) -> Arc<Self> {
        let source = Self::default();
        *source.failure.lock().unwrap() = Some(error);
        Arc::new(source)
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    /// Push a chunk into the most recent capture
    pub fn push_chunk(&self, chunk: AudioChunk) {
        if let Some(tx) = self.senders.lock().unwrap().last() {
            let _ = tx.send(chunk);
        }
    }
}

#[async_trait]
impl RecordingSource for FakeSource {
    async fn start(&self) -> Result<CaptureHandle, CaptureError> {
        if let Some(error) = self.failure.lock().unwrap().clone() {
            return Err(error);
        }
        self.starts.fetch_add(1, Ordering::SeqCst);

        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(vec![0i16; 800]).unwrap();
        self.senders.lock().unwrap().push(tx);

        Ok(CaptureHandle::new(
            TEST_FORMAT,
            rx,
            Box::new(FakeTracks {
                releases: self.releases.clone(),
            }),
        ))
    }
}

/// Analysis service with scripted responses
///
/// Responses are consumed in call order; when a queue runs dry the default
/// (Shook Ones / Top Billin') is returned. A queued gate holds the matching
/// identify or lookup call until released.
pub struct FakeService {
    identify_results: Mutex<VecDeque<Result<IdentifiedTrack, ServiceError>>>,
    lookup_results: Mutex<VecDeque<Result<Vec<Sample>, ServiceError>>>,
    identify_gates: Mutex<VecDeque<Option<oneshot::Receiver<()>>>>,
    lookup_gates: Mutex<VecDeque<Option<oneshot::Receiver<()>>>>,
    identify_calls: AtomicUsize,
    lookup_calls: Mutex<Vec<(String, String)>>,
}

impl FakeService {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            identify_results: Mutex::new(VecDeque::new()),
            lookup_results: Mutex::new(VecDeque::new()),
            identify_gates: Mutex::new(VecDeque::new()),
            lookup_gates: Mutex::new(VecDeque::new()),
            identify_calls: AtomicUsize::new(0),
            lookup_calls: Mutex::new(Vec::new()),
        })
    }

    pub fn queue_identify(&self, result: Result<IdentifiedTrack, ServiceError>) {
        self.identify_results.lock().unwrap().push_back(result);
    }

    pub fn queue_lookup(&self, result: Result<Vec<Sample>, ServiceError>) {
        self.lookup_results.lock().unwrap().push_back(result);
    }

    /// Hold the next identify call until the returned sender fires
    pub fn gate_next_identify(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.identify_gates.lock().unwrap().push_back(Some(rx));
        tx
    }

    /// Let the next identify call through immediately
    pub fn pass_next_identify(&self) {
        self.identify_gates.lock().unwrap().push_back(None);
    }

    /// Hold the next sample lookup until the returned sender fires
    pub fn gate_next_lookup(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.lookup_gates.lock().unwrap().push_back(Some(rx));
        tx
    }

    /// Let the next sample lookup through immediately
    pub fn pass_next_lookup(&self) {
        self.lookup_gates.lock().unwrap().push_back(None);
    }

    pub fn identify_calls(&self) -> usize {
        self.identify_calls.load(Ordering::SeqCst)
    }

    pub fn lookup_calls(&self) -> Vec<(String, String)> {
        self.lookup_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl AnalysisService for FakeService {
    async fn identify(&self, payload: &AudioPayload) -> Result<IdentifiedTrack, ServiceError> {
        self.identify_calls.fetch_add(1, Ordering::SeqCst);
        assert_eq!(payload.file_name(), "recorded_audio.wav");

        let gate = self.identify_gates.lock().unwrap().pop_front().flatten();
        if let Some(gate) = gate {
            let _ = gate.await;
        }

        self.identify_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(shook_ones()))
    }

    async fn lookup_samples(&self, title: &str, artist: &str) -> Result<Vec<Sample>, ServiceError> {
        self.lookup_calls
            .lock()
            .unwrap()
            .push((title.to_string(), artist.to_string()));

        let gate = self.lookup_gates.lock().unwrap().pop_front().flatten();
        if let Some(gate) = gate {
            let _ = gate.await;
        }

        self.lookup_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(vec![top_billin()]))
    }
}

/// App state over fakes
pub fn test_state(source: Arc<FakeSource>, service: Arc<FakeService>) -> AppState {
    AppState::new(source, service, EventBus::new(1024))
}
