//! Integration tests for the analyzer session
//!
//! Capture → identify → sample lookup through the public session API, with
//! a fake recording source and a fake analysis service.

mod helpers;

use digger_analyzer::recording::{CaptureError, RecordingError, MAX_RECORDING_DURATION};
use digger_analyzer::services::ServiceError;
use digger_analyzer::session::{SessionError, ToggleOutcome};
use digger_analyzer::workflow::{AnalysisError, MAX_PERCENT, SETTLED_CHECKPOINT};
use digger_common::events::{DiggerEvent, RecordingState, Settlement, StopReason};
use digger_common::{IdentifiedTrack, Sample};
use helpers::{shook_ones, test_state, top_billin, FakeService, FakeSource};
use std::time::Duration;
use tokio::sync::broadcast;

async fn advance(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

fn drain(rx: &mut broadcast::Receiver<DiggerEvent>) -> Vec<DiggerEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// TC-S-001: Identified track with one sample
#[tokio::test(start_paused = true)]
async fn test_shook_ones_scenario() {
    let source = FakeSource::new();
    let service = FakeService::new();
    let state = test_state(source.clone(), service.clone());
    let session = &state.session;

    let started = session.toggle().await.unwrap();
    assert!(matches!(started, ToggleOutcome::Started { .. }));
    assert_eq!(session.status().recording_state, RecordingState::Recording);

    advance(1000).await;
    let stopped = session.toggle().await.unwrap();
    assert!(matches!(
        stopped,
        ToggleOutcome::Stopped {
            recording_id: Some(_)
        }
    ));

    let report = session.wait_settled().await.expect("run settles");
    assert_eq!(report.settlement, Some(Settlement::Success));
    assert_eq!(report.checkpoint, SETTLED_CHECKPOINT);
    assert!(report.error.is_none());

    let songs = session.songs().snapshot().unwrap();
    assert_eq!(songs.track, Some(shook_ones()));
    assert_eq!(songs.samples, vec![top_billin()]);

    let status = session.status();
    assert!(!status.analyzing);
    assert!(status.capture_enabled);
    assert_eq!(status.recording_state, RecordingState::Idle);

    assert_eq!(
        service.lookup_calls(),
        vec![("Shook Ones Pt II".to_string(), "Mobb Deep".to_string())]
    );
    assert_eq!(source.releases(), 1);
}

/// TC-S-002: Identification failure leaves nothing published
#[tokio::test(start_paused = true)]
async fn test_identify_server_error_settles_failed() {
    let source = FakeSource::new();
    let service = FakeService::new();
    service.queue_identify(Err(ServiceError::Status(
        500,
        "Internal Server Error".to_string(),
    )));
    let state = test_state(source, service.clone());
    let session = &state.session;

    session.toggle().await.unwrap();
    session.toggle().await.unwrap();
    let report = session.wait_settled().await.unwrap();

    assert_eq!(report.settlement, Some(Settlement::Failed));
    assert!(matches!(
        report.error,
        Some(AnalysisError::IdentificationFailed {
            status: Some(500),
            ..
        })
    ));
    assert_eq!(report.checkpoint, SETTLED_CHECKPOINT);

    assert!(session.songs().analyzed_song().unwrap().is_none());
    assert!(session.songs().samples().unwrap().is_empty());
    assert!(!session.status().analyzing);
    assert!(session.status().capture_enabled);
    assert!(service.lookup_calls().is_empty());
}

/// TC-S-003: Lookup failure keeps the track (partial success)
#[tokio::test(start_paused = true)]
async fn test_lookup_failure_keeps_track() {
    let service = FakeService::new();
    service.queue_lookup(Err(ServiceError::Network("connection refused".to_string())));
    let state = test_state(FakeSource::new(), service);
    let session = &state.session;

    session.toggle().await.unwrap();
    session.toggle().await.unwrap();
    let report = session.wait_settled().await.unwrap();

    assert_eq!(report.settlement, Some(Settlement::Partial));
    assert!(matches!(
        report.error,
        Some(AnalysisError::SampleLookupFailed { status: None, .. })
    ));
    assert_eq!(session.songs().analyzed_song().unwrap(), Some(shook_ones()));
    assert!(session.songs().samples().unwrap().is_empty());
    assert!(!session.status().analyzing);
}

/// TC-S-004: Empty sample list is still a success
#[tokio::test(start_paused = true)]
async fn test_empty_samples_is_success() {
    let service = FakeService::new();
    service.queue_lookup(Ok(Vec::new()));
    let state = test_state(FakeSource::new(), service);

    state.session.toggle().await.unwrap();
    state.session.toggle().await.unwrap();
    let report = state.session.wait_settled().await.unwrap();

    assert_eq!(report.settlement, Some(Settlement::Success));
    assert!(state.session.songs().analyzed_song().unwrap().is_some());
    assert!(state.session.songs().samples().unwrap().is_empty());
}

/// TC-S-005: A new recording clears the previous result before capture
#[tokio::test(start_paused = true)]
async fn test_new_recording_clears_previous_result() {
    let state = test_state(FakeSource::new(), FakeService::new());
    let session = &state.session;

    session.toggle().await.unwrap();
    session.toggle().await.unwrap();
    session.wait_settled().await.unwrap();
    assert!(!session.songs().snapshot().unwrap().is_empty());

    session.toggle().await.unwrap();
    assert_eq!(session.status().recording_state, RecordingState::Recording);
    assert!(session.songs().snapshot().unwrap().is_empty());
}

/// TC-S-006: Superseded run never writes
#[tokio::test(start_paused = true)]
async fn test_superseded_run_results_never_land() {
    let service = FakeService::new();
    let first_gate = service.gate_next_identify();
    service.queue_identify(Ok(shook_ones()));
    service.pass_next_identify();
    service.queue_identify(Ok(IdentifiedTrack::new("Eric B. Is President", "Eric B. & Rakim", None)));
    service.queue_lookup(Ok(Vec::new()));

    let state = test_state(FakeSource::new(), service.clone());
    let session = &state.session;
    let mut events = state.event_bus.subscribe();

    // First recording, analysis held inside identify
    session.toggle().await.unwrap();
    session.toggle().await.unwrap();
    advance(200).await;
    assert!(session.status().analyzing);
    assert!(!session.status().capture_enabled);

    // Second recording supersedes it
    session.toggle().await.unwrap();
    assert!(!session.status().analyzing);

    first_gate.send(()).unwrap();
    advance(200).await;
    assert!(session.songs().snapshot().unwrap().is_empty());
    assert!(session.last_report().is_none());

    session.toggle().await.unwrap();
    let report = session.wait_settled().await.unwrap();
    assert!(!report.superseded);
    assert_eq!(
        session.songs().analyzed_song().unwrap().map(|t| t.title),
        Some("Eric B. Is President".to_string())
    );
    assert_eq!(service.identify_calls(), 2);
    // Only the second run reached the lookup
    assert_eq!(service.lookup_calls().len(), 1);

    let superseded = drain(&mut events)
        .into_iter()
        .filter(|e| matches!(e, DiggerEvent::AnalysisSuperseded { .. }))
        .count();
    assert_eq!(superseded, 1);
}

/// TC-S-007: Safety timer stops the capture and hands it to analysis
#[tokio::test(start_paused = true)]
async fn test_safety_timer_triggers_analysis() {
    let source = FakeSource::new();
    let service = FakeService::new();
    let state = test_state(source.clone(), service.clone());
    let mut events = state.event_bus.subscribe();

    state.session.toggle().await.unwrap();
    advance(6000).await;

    assert_eq!(state.session.status().recording_state, RecordingState::Idle);
    assert_eq!(source.releases(), 1);

    let report = state.session.wait_settled().await.unwrap();
    assert_eq!(report.settlement, Some(Settlement::Success));
    assert_eq!(service.identify_calls(), 1);

    let stops: Vec<(StopReason, u64)> = drain(&mut events)
        .into_iter()
        .filter_map(|e| match e {
            DiggerEvent::RecordingStopped {
                reason, elapsed_ms, ..
            } => Some((reason, elapsed_ms)),
            _ => None,
        })
        .collect();
    assert_eq!(stops.len(), 1);
    assert_eq!(stops[0].0, StopReason::SafetyTimer);
    assert!(stops[0].1 <= MAX_RECORDING_DURATION.as_millis() as u64);
}

/// TC-S-008: Payload never holds more than the cap
#[tokio::test(start_paused = true)]
async fn test_payload_capped_at_five_seconds() {
    let source = FakeSource::new();
    let state = test_state(source.clone(), FakeService::new());
    let controller = state.session.controller().clone();

    state.session.toggle().await.unwrap();
    // 10 s of 8 kHz mono on top of the pre-filled 100 ms
    for _ in 0..10 {
        source.push_chunk(vec![1i16; 8000]);
    }
    let completed = controller.stop().await.unwrap().unwrap();

    assert_eq!(completed.payload.sample_count, 5 * 8000);
    assert_eq!(
        completed.payload.audio_duration(),
        Duration::from_millis(5000)
    );
}

/// TC-S-009: Double stop finalizes once
#[tokio::test(start_paused = true)]
async fn test_double_stop_delivers_once() {
    let source = FakeSource::new();
    let service = FakeService::new();
    let state = test_state(source.clone(), service.clone());
    let controller = state.session.controller().clone();

    state.session.toggle().await.unwrap();
    let first = controller.stop().await.unwrap();
    let second = controller.stop().await.unwrap();
    assert!(first.is_some());
    assert!(second.is_none());

    state.session.wait_settled().await.unwrap();
    advance(6000).await;
    assert_eq!(service.identify_calls(), 1);
    assert_eq!(source.releases(), 1);
}

/// TC-S-010: Permission denied leaves the session idle
#[tokio::test]
async fn test_permission_denied_keeps_idle() {
    let service = FakeService::new();
    let state = test_state(
        FakeSource::failing(CaptureError::PermissionDenied),
        service.clone(),
    );

    let err = state.session.toggle().await.unwrap_err();
    assert!(matches!(
        err,
        SessionError::Recording(RecordingError::Capture(CaptureError::PermissionDenied))
    ));

    let status = state.session.status();
    assert_eq!(status.recording_state, RecordingState::Idle);
    assert!(!status.analyzing);
    assert!(status.capture_enabled);
    assert_eq!(service.identify_calls(), 0);
}

/// TC-S-011: Displayed progress is monotonic, capped and reset per run
#[tokio::test(start_paused = true)]
async fn test_progress_monotonic_and_reset() {
    let service = FakeService::new();
    let gate = service.gate_next_identify();
    let state = test_state(FakeSource::new(), service.clone());
    let session = &state.session;
    let mut events = state.event_bus.subscribe();

    session.toggle().await.unwrap();
    session.toggle().await.unwrap();
    advance(1025).await;
    assert_eq!(session.status().percent, 20);

    // Run keeps going past the ticker ceiling
    advance(6000).await;
    assert_eq!(session.status().percent, MAX_PERCENT);
    gate.send(()).unwrap();
    session.wait_settled().await.unwrap();

    // Back to zero once the run is over
    assert_eq!(session.status().percent, 0);
    advance(500).await;
    assert_eq!(session.status().percent, 0);

    let percents: Vec<u8> = drain(&mut events)
        .into_iter()
        .take_while(|e| !matches!(e, DiggerEvent::AnalysisSettled { .. }))
        .filter_map(|e| match e {
            DiggerEvent::AnalysisProgress { percent, .. } => Some(percent),
            _ => None,
        })
        .collect();
    assert_eq!(percents.first(), Some(&0));
    assert!(percents.windows(2).all(|w| w[0] <= w[1]));
    assert!(percents.iter().all(|p| *p <= MAX_PERCENT));

    // Next run starts again from zero
    service.gate_next_identify();
    session.toggle().await.unwrap();
    session.toggle().await.unwrap();
    assert_eq!(session.status().percent, 0);
}

/// TC-S-012: Run superseded while waiting on its sample lookup never writes samples
#[tokio::test(start_paused = true)]
async fn test_superseded_during_lookup_never_lands() {
    let service = FakeService::new();
    let first_lookup = service.gate_next_lookup();
    service.pass_next_lookup();
    service.queue_identify(Ok(shook_ones()));
    service.queue_identify(Ok(IdentifiedTrack::new("Eric B. Is President", "Eric B. & Rakim", None)));
    service.queue_lookup(Ok(vec![top_billin()]));
    service.queue_lookup(Ok(vec![Sample::new("Funky President", "James Brown", "1974")]));

    let state = test_state(FakeSource::new(), service.clone());
    let session = &state.session;
    let mut events = state.event_bus.subscribe();

    // First run publishes its track, then waits on the lookup
    session.toggle().await.unwrap();
    session.toggle().await.unwrap();
    advance(200).await;
    assert_eq!(session.songs().analyzed_song().unwrap(), Some(shook_ones()));
    assert_eq!(service.lookup_calls().len(), 1);
    assert!(session.status().analyzing);
    assert!(session.status().percent > 0);

    // Second recording supersedes it
    session.toggle().await.unwrap();
    assert!(!session.status().analyzing);
    assert_eq!(session.status().percent, 0);
    assert!(session.songs().snapshot().unwrap().is_empty());

    first_lookup.send(()).unwrap();
    advance(200).await;
    assert!(session.songs().snapshot().unwrap().is_empty());
    assert!(session.last_report().is_none());

    let superseded = drain(&mut events)
        .into_iter()
        .filter(|e| matches!(e, DiggerEvent::AnalysisSuperseded { .. }))
        .count();
    assert_eq!(superseded, 1);

    session.toggle().await.unwrap();
    let report = session.wait_settled().await.unwrap();
    assert!(!report.superseded);
    assert_eq!(report.settlement, Some(Settlement::Success));

    let songs = session.songs().snapshot().unwrap();
    assert_eq!(
        songs.track.map(|t| t.title),
        Some("Eric B. Is President".to_string())
    );
    assert_eq!(
        songs.samples,
        vec![Sample::new("Funky President", "James Brown", "1974")]
    );
    assert_eq!(service.lookup_calls().len(), 2);
}
