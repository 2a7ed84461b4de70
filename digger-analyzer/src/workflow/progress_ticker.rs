//! Cosmetic progress ticker
//!
//! Advances the displayed percent by one every [`TICK_INTERVAL`] while an
//! analysis runs and freezes at [`MAX_PERCENT`]. The value is not tied to
//! real pipeline progress and goes back to 0 once the run is over.

use chrono::Utc;
use digger_common::events::{DiggerEvent, EventBus};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::debug;

/// Time between two increments
pub const TICK_INTERVAL: Duration = Duration::from_millis(50);

/// Ceiling of the displayed percent
pub const MAX_PERCENT: u8 = 100;

struct TickerShared {
    /// Bumped on every start; a task only writes while its epoch is current
    epoch: Mutex<u64>,
    percent_tx: watch::Sender<u8>,
    event_bus: EventBus,
}

impl TickerShared {
    fn lock_epoch(&self) -> MutexGuard<'_, u64> {
        match self.epoch.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn publish(&self, percent: u8) {
        self.percent_tx.send_replace(percent);
        self.event_bus.emit_lossy(DiggerEvent::AnalysisProgress {
            percent,
            timestamp: Utc::now(),
        });
    }
}

/// Displayed progress source
#[derive(Clone)]
pub struct ProgressTicker {
    shared: Arc<TickerShared>,
}

impl ProgressTicker {
    pub fn new(event_bus: EventBus) -> Self {
        let (percent_tx, _) = watch::channel(0);
        Self {
            shared: Arc::new(TickerShared {
                epoch: Mutex::new(0),
                percent_tx,
                event_bus,
            }),
        }
    }

    /// Current displayed percent
    pub fn percent(&self) -> u8 {
        *self.shared.percent_tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<u8> {
        self.shared.percent_tx.subscribe()
    }

    /// Silence any ticking task and show 0
    pub fn reset(&self) {
        let mut epoch = self.shared.lock_epoch();
        *epoch += 1;
        if *self.shared.percent_tx.borrow() != 0 {
            self.shared.publish(0);
        }
    }

    /// Reset to 0 and start ticking
    ///
    /// Ticking stops when the returned guard is stopped or dropped. Starting
    /// again silences any earlier ticking task.
    pub fn start(&self) -> TickerGuard {
        let epoch = {
            let mut epoch = self.shared.lock_epoch();
            *epoch += 1;
            self.shared.publish(0);
            *epoch
        };

        let shared = self.shared.clone();
        let task = tokio::spawn(async move {
            let mut interval = interval_at(Instant::now() + TICK_INTERVAL, TICK_INTERVAL);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                interval.tick().await;

                let current = shared.lock_epoch();
                if *current != epoch {
                    return;
                }
                let percent = *shared.percent_tx.borrow();
                if percent >= MAX_PERCENT {
                    debug!("Progress ticker reached {}", MAX_PERCENT);
                    return;
                }
                shared.publish(percent + 1);
            }
        });

        TickerGuard {
            shared: self.shared.clone(),
            epoch,
            task: Some(task),
        }
    }
}

/// Owned handle of one ticking run
pub struct TickerGuard {
    shared: Arc<TickerShared>,
    epoch: u64,
    task: Option<JoinHandle<()>>,
}

impl TickerGuard {
    /// Stop ticking; the displayed value stays where it is
    pub fn stop(mut self) {
        self.cancel();
    }

    fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            let mut epoch = self.shared.lock_epoch();
            if *epoch == self.epoch {
                // Silences a tick already past its await point
                *epoch += 1;
            }
        }
    }
}

impl Drop for TickerGuard {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn advance(ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_one_per_interval() {
        let ticker = ProgressTicker::new(EventBus::new(256));
        let _guard = ticker.start();

        assert_eq!(ticker.percent(), 0);
        advance(1025).await;
        assert_eq!(ticker.percent(), 20);
    }

    #[tokio::test(start_paused = true)]
    async fn test_freezes_at_max() {
        let ticker = ProgressTicker::new(EventBus::new(256));
        let _guard = ticker.start();

        advance(10_000).await;
        assert_eq!(ticker.percent(), MAX_PERCENT);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_freezes_value_and_restart_resets() {
        let ticker = ProgressTicker::new(EventBus::new(256));
        let guard = ticker.start();
        advance(525).await;
        guard.stop();

        let frozen = ticker.percent();
        assert_eq!(frozen, 10);
        advance(1000).await;
        assert_eq!(ticker.percent(), frozen);

        let _guard = ticker.start();
        assert_eq!(ticker.percent(), 0);
        advance(125).await;
        assert_eq!(ticker.percent(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_after_stop_shows_zero() {
        let ticker = ProgressTicker::new(EventBus::new(256));
        let guard = ticker.start();
        advance(525).await;
        guard.stop();
        assert_eq!(ticker.percent(), 10);

        ticker.reset();
        assert_eq!(ticker.percent(), 0);
        advance(1000).await;
        assert_eq!(ticker.percent(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_silences_running_task() {
        let ticker = ProgressTicker::new(EventBus::new(256));
        let _guard = ticker.start();
        advance(525).await;

        ticker.reset();
        advance(1000).await;
        assert_eq!(ticker.percent(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_guard_cancels_task() {
        let ticker = ProgressTicker::new(EventBus::new(256));
        {
            let _guard = ticker.start();
            advance(200).await;
        }
        let value = ticker.percent();
        advance(1000).await;
        assert_eq!(ticker.percent(), value);
    }
}
