//! Shared song state
//!
//! A [`SongProvider`] owns the current [`AnalysisSession`] and hands out
//! [`SongContext`] handles to everything that reads or writes it. A handle
//! outlives nothing: once the provider is dropped every operation on it
//! fails with [`SongStateError::ContextMissing`]. Inside
//! [`SongProvider::scope`] the handle is also reachable through
//! [`SongContext::current`].
//!
//! Analysis runs write through a [`RunToken`]. Starting a new run bumps the
//! generation, so writes carrying an older token are dropped.

use chrono::Utc;
use digger_common::events::{DiggerEvent, EventBus};
use digger_common::{AnalysisSession, IdentifiedTrack, Sample};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use thiserror::Error;
use tokio::sync::watch;
use tracing::debug;
use uuid::Uuid;

/// Shared song state errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SongStateError {
    /// Used outside a live provider
    #[error("Song state accessed outside of its provider")]
    ContextMissing,

    /// Samples can only be published for an identified track
    #[error("Cannot set samples while no track is analyzed")]
    SamplesWithoutTrack,
}

/// Write permission of one analysis run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunToken {
    pub run_id: Uuid,
    generation: u64,
}

impl RunToken {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

tokio::task_local! {
    static CURRENT_SONGS: SongContext;
}

struct SongStore {
    /// Run generation; held while writing so token checks and writes are atomic
    generation: Mutex<u64>,
    session_tx: watch::Sender<AnalysisSession>,
    event_bus: EventBus,
}

impl SongStore {
    fn lock_generation(&self) -> MutexGuard<'_, u64> {
        match self.generation.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Replace the session and notify watchers and the event bus
    fn replace(&self, session: AnalysisSession) {
        self.session_tx.send_replace(session.clone());
        self.event_bus.emit_lossy(DiggerEvent::SongStateChanged {
            session,
            timestamp: Utc::now(),
        });
    }
}

/// Owner of the shared song state
pub struct SongProvider {
    store: Arc<SongStore>,
}

impl SongProvider {
    pub fn new(event_bus: EventBus) -> Self {
        let (session_tx, _) = watch::channel(AnalysisSession::empty());
        Self {
            store: Arc::new(SongStore {
                generation: Mutex::new(0),
                session_tx,
                event_bus,
            }),
        }
    }

    /// Handle valid for as long as this provider lives
    pub fn context(&self) -> SongContext {
        SongContext {
            store: Arc::downgrade(&self.store),
        }
    }

    /// Run `fut` with this provider's context available via [`SongContext::current`]
    pub async fn scope<F>(&self, fut: F) -> F::Output
    where
        F: Future,
    {
        CURRENT_SONGS.scope(self.context(), fut).await
    }
}

/// Handle onto the shared song state
#[derive(Clone)]
pub struct SongContext {
    store: Weak<SongStore>,
}

impl std::fmt::Debug for SongContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SongContext")
            .field("live", &(self.store.strong_count() > 0))
            .finish()
    }
}

impl SongContext {
    /// Context of the enclosing [`SongProvider::scope`]
    pub fn current() -> Result<SongContext, SongStateError> {
        CURRENT_SONGS
            .try_with(|ctx| ctx.clone())
            .map_err(|_| SongStateError::ContextMissing)
    }

    fn store(&self) -> Result<Arc<SongStore>, SongStateError> {
        self.store.upgrade().ok_or(SongStateError::ContextMissing)
    }

    pub fn snapshot(&self) -> Result<AnalysisSession, SongStateError> {
        Ok(self.store()?.session_tx.borrow().clone())
    }

    pub fn analyzed_song(&self) -> Result<Option<IdentifiedTrack>, SongStateError> {
        Ok(self.store()?.session_tx.borrow().track.clone())
    }

    pub fn samples(&self) -> Result<Vec<Sample>, SongStateError> {
        Ok(self.store()?.session_tx.borrow().samples.clone())
    }

    /// Watch every change of the session
    pub fn subscribe(&self) -> Result<watch::Receiver<AnalysisSession>, SongStateError> {
        Ok(self.store()?.session_tx.subscribe())
    }

    /// Replace (or clear) the analyzed track
    ///
    /// Samples belong to the previous track and are cleared with it.
    pub fn set_analyzed_song(&self, track: Option<IdentifiedTrack>) -> Result<(), SongStateError> {
        let store = self.store()?;
        let _generation = store.lock_generation();
        store.replace(AnalysisSession {
            track,
            samples: Vec::new(),
        });
        Ok(())
    }

    /// Replace the sample sequence of the current track
    pub fn set_samples(&self, samples: Vec<Sample>) -> Result<(), SongStateError> {
        let store = self.store()?;
        let _generation = store.lock_generation();
        let track = store.session_tx.borrow().track.clone();
        if track.is_none() && !samples.is_empty() {
            return Err(SongStateError::SamplesWithoutTrack);
        }
        store.replace(AnalysisSession { track, samples });
        Ok(())
    }

    /// Drop track and samples
    pub fn clear(&self) -> Result<(), SongStateError> {
        self.set_analyzed_song(None)
    }

    /// Clear the session and invalidate every earlier run token
    pub fn begin_run(&self, run_id: Uuid) -> Result<RunToken, SongStateError> {
        let store = self.store()?;
        let mut generation = store.lock_generation();
        *generation += 1;
        store.replace(AnalysisSession::empty());
        debug!(run_id = %run_id, generation = *generation, "Song state reset for new run");
        Ok(RunToken {
            run_id,
            generation: *generation,
        })
    }

    pub fn is_current(&self, token: &RunToken) -> Result<bool, SongStateError> {
        let store = self.store()?;
        let generation = store.lock_generation();
        Ok(*generation == token.generation)
    }

    /// Publish the identified track for `token`'s run
    ///
    /// Returns `Ok(false)` without writing when the run was superseded.
    pub fn publish_track(
        &self,
        token: &RunToken,
        track: IdentifiedTrack,
    ) -> Result<bool, SongStateError> {
        let store = self.store()?;
        let generation = store.lock_generation();
        if *generation != token.generation {
            return Ok(false);
        }
        store.replace(AnalysisSession {
            track: Some(track),
            samples: Vec::new(),
        });
        Ok(true)
    }

    /// Publish the samples for `token`'s run
    ///
    /// Returns `Ok(false)` without writing when the run was superseded.
    pub fn publish_samples(
        &self,
        token: &RunToken,
        samples: Vec<Sample>,
    ) -> Result<bool, SongStateError> {
        let store = self.store()?;
        let generation = store.lock_generation();
        if *generation != token.generation {
            return Ok(false);
        }
        let track = store.session_tx.borrow().track.clone();
        if track.is_none() && !samples.is_empty() {
            return Err(SongStateError::SamplesWithoutTrack);
        }
        store.replace(AnalysisSession { track, samples });
        Ok(true)
    }
}
