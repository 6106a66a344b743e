// Copyright 2025 Chris Custine
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Repeating telemetry fetch.
//!
//! The poller runs in a background task and fetches on a fixed period. The
//! URL is read from the [`ConfigStore`] every cycle; when none is configured
//! the cycle is skipped and [`PollStatus::Unconfigured`] is reported.
//!
//! Each fetch runs in its own task, so a slow response never delays the next
//! tick. Snapshots are delivered in completion order, which makes overlapping
//! cycles resolve last-completed-wins. Failed fetches produce an empty
//! snapshot and are retried only on the next regular tick.
//!
//! [`PollerHandle::refresh`] requests an extra fetch, honored only when the
//! last completed result is older than the staleness window.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::source::TelemetrySource;
use super::{Snapshot, TelemetryError};
use crate::collaborators::{ConfigStore, TrackHistory};

/// Default time between scheduled fetches.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Default age after which a result is refetched on demand.
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(5);

/// Poller configuration.
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Period of the repeating fetch.
    pub poll_interval: Duration,
    /// Results younger than this satisfy [`PollerHandle::refresh`].
    pub stale_after: Duration,
    /// Snapshot channel capacity.
    pub buffer_size: usize,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            stale_after: DEFAULT_STALE_AFTER,
            buffer_size: 16,
        }
    }
}

/// Health of the telemetry feed.
#[derive(Debug, Clone, PartialEq)]
pub enum PollStatus {
    /// Configured, nothing received yet.
    Waiting,
    /// No telemetry URL configured; polling is idle.
    Unconfigured,
    /// Last cycle succeeded.
    Live {
        aircraft: usize,
        updated_at: DateTime<Utc>,
    },
    /// Last cycle failed and produced an empty snapshot.
    Degraded(TelemetryError),
    /// Poller shut down.
    Stopped,
}

/// Telemetry poller, configured but not yet running.
pub struct Poller<S> {
    config: PollerConfig,
    source: Arc<S>,
    store: Arc<dyn ConfigStore>,
    history: Option<Arc<dyn TrackHistory>>,
}

impl<S> fmt::Debug for Poller<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Poller")
            .field("config", &self.config)
            .field("history", &self.history.is_some())
            .finish_non_exhaustive()
    }
}

impl<S: TelemetrySource + 'static> Poller<S> {
    #[must_use]
    pub fn new(config: PollerConfig, source: Arc<S>, store: Arc<dyn ConfigStore>) -> Self {
        Self {
            config,
            source,
            store,
            history: None,
        }
    }

    /// Forward every successful batch to a track history store.
    #[must_use]
    pub fn with_history(mut self, history: Arc<dyn TrackHistory>) -> Self {
        self.history = Some(history);
        self
    }

    /// Start polling on the current tokio runtime.
    #[must_use]
    pub fn spawn(self) -> PollerHandle {
        let (snapshot_tx, snapshot_rx) = mpsc::channel(self.config.buffer_size.max(1));
        let (status_tx, status_rx) = watch::channel(PollStatus::Waiting);
        let (refresh_tx, refresh_rx) = mpsc::unbounded_channel();
        let cancel_token = CancellationToken::new();

        let task = PollTask {
            config: self.config,
            source: self.source,
            store: self.store,
            history: self.history,
            snapshot_tx,
            status_tx,
            cancel_token: cancel_token.clone(),
            sequence: 0,
            in_flight: 0,
            last_completed: None,
        };
        tokio::spawn(task.run(refresh_rx));

        PollerHandle {
            snapshot_rx,
            status_rx,
            control: PollerControl {
                refresh_tx,
                cancel_token,
            },
        }
    }
}

/// Cloneable refresh/shutdown control for a running poller.
#[derive(Debug, Clone)]
pub struct PollerControl {
    refresh_tx: mpsc::UnboundedSender<()>,
    cancel_token: CancellationToken,
}

impl PollerControl {
    /// Ask for fresh data; ignored while the last result is still fresh.
    pub fn refresh(&self) {
        let _ = self.refresh_tx.send(());
    }

    /// Stop the timer and abandon in-flight fetches.
    pub fn shutdown(&self) {
        self.cancel_token.cancel();
    }

    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}

/// Handle to a running poller. Dropping it stops the poller.
pub struct PollerHandle {
    snapshot_rx: mpsc::Receiver<Snapshot>,
    status_rx: watch::Receiver<PollStatus>,
    control: PollerControl,
}

impl fmt::Debug for PollerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PollerHandle")
            .field("control", &self.control)
            .finish_non_exhaustive()
    }
}

impl PollerHandle {
    /// Next completed snapshot. `None` once the poller has stopped.
    pub async fn recv(&mut self) -> Option<Snapshot> {
        self.snapshot_rx.recv().await
    }

    /// Next completed snapshot, if one is ready.
    pub fn try_recv(&mut self) -> Option<Snapshot> {
        self.snapshot_rx.try_recv().ok()
    }

    /// Watch the feed status.
    #[must_use]
    pub fn status(&self) -> watch::Receiver<PollStatus> {
        self.status_rx.clone()
    }

    #[must_use]
    pub fn control(&self) -> PollerControl {
        self.control.clone()
    }

    pub fn refresh(&self) {
        self.control.refresh();
    }

    pub fn shutdown(&self) {
        self.control.shutdown();
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.control.shutdown();
    }
}

struct PollTask<S> {
    config: PollerConfig,
    source: Arc<S>,
    store: Arc<dyn ConfigStore>,
    history: Option<Arc<dyn TrackHistory>>,
    snapshot_tx: mpsc::Sender<Snapshot>,
    status_tx: watch::Sender<PollStatus>,
    cancel_token: CancellationToken,
    sequence: u64,
    in_flight: usize,
    last_completed: Option<Instant>,
}

impl<S: TelemetrySource + 'static> PollTask<S> {
    async fn run(mut self, mut refresh_rx: mpsc::UnboundedReceiver<()>) {
        info!(
            "Telemetry poller started (every {}s, stale after {}s)",
            self.config.poll_interval.as_secs(),
            self.config.stale_after.as_secs()
        );

        let (done_tx, mut done_rx) = mpsc::unbounded_channel::<Snapshot>();
        let mut interval = tokio::time::interval(self.config.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let cancel_token = self.cancel_token.clone();

        loop {
            tokio::select! {
                () = cancel_token.cancelled() => break,

                _ = interval.tick() => self.issue(&done_tx),

                Some(()) = refresh_rx.recv() => {
                    if self.is_stale() && self.in_flight == 0 {
                        self.issue(&done_tx);
                    } else {
                        debug!("Refresh skipped, last result still fresh");
                    }
                }

                Some(snapshot) = done_rx.recv() => {
                    if !self.complete(snapshot).await {
                        break;
                    }
                }
            }
        }

        self.cancel_token.cancel();
        self.status_tx.send_replace(PollStatus::Stopped);
        info!("Telemetry poller stopped");
    }

    fn is_stale(&self) -> bool {
        self.last_completed
            .map_or(true, |at| at.elapsed() >= self.config.stale_after)
    }

    /// Start one fetch in its own task.
    fn issue(&mut self, done_tx: &mpsc::UnboundedSender<Snapshot>) {
        let Some(url) = self.store.get() else {
            debug!("No telemetry URL configured, skipping cycle");
            self.status_tx.send_replace(PollStatus::Unconfigured);
            return;
        };

        self.sequence += 1;
        self.in_flight += 1;
        let sequence = self.sequence;
        let source = Arc::clone(&self.source);
        let cancel_token = self.cancel_token.clone();
        let done_tx = done_tx.clone();

        debug!("Issuing telemetry fetch #{sequence}");
        tokio::spawn(async move {
            let result = tokio::select! {
                result = source.fetch(&url) => result,
                () = cancel_token.cancelled() => return,
            };

            let snapshot = match result {
                Ok(aircraft) => Snapshot {
                    sequence,
                    completed_at: Instant::now().into_std(),
                    aircraft,
                    error: None,
                },
                Err(e) => {
                    warn!("Telemetry fetch #{sequence} failed: {e}");
                    Snapshot {
                        sequence,
                        completed_at: Instant::now().into_std(),
                        aircraft: Vec::new(),
                        error: Some(e),
                    }
                }
            };
            let _ = done_tx.send(snapshot);
        });
    }

    /// Publish a completed snapshot. Returns `false` when nobody is listening.
    async fn complete(&mut self, snapshot: Snapshot) -> bool {
        self.in_flight = self.in_flight.saturating_sub(1);
        self.last_completed = Some(Instant::now());

        let status = match &snapshot.error {
            Some(e) => PollStatus::Degraded(e.clone()),
            None => PollStatus::Live {
                aircraft: snapshot.aircraft.len(),
                updated_at: Utc::now(),
            },
        };
        self.status_tx.send_replace(status);

        if let Some(history) = &self.history {
            if !snapshot.aircraft.is_empty() {
                history.append(&snapshot.aircraft, Utc::now());
            }
        }

        // A stalled consumer must not hold off shutdown
        let cancel_token = self.cancel_token.clone();
        tokio::select! {
            () = cancel_token.cancelled() => false,
            sent = self.snapshot_tx.send(snapshot) => {
                if sent.is_err() {
                    debug!("Snapshot receiver dropped, stopping poller");
                }
                sent.is_ok()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{MemoryConfigStore, MemoryTrackHistory};
    use crate::telemetry::{Category, NormalizedAircraft};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    const URL: &str = "https://example.com/api/states/all";

    fn aircraft(id: &str) -> NormalizedAircraft {
        NormalizedAircraft {
            id: id.to_string(),
            callsign: id.to_string(),
            latitude: 40.0,
            longitude: -75.0,
            altitude: 0.0,
            velocity: 0.0,
            heading: 0.0,
            category: Category::Commercial,
            on_ground: false,
            last_contact: 0,
            origin_country: "USA".to_string(),
        }
    }

    type Step = (Duration, Result<Vec<NormalizedAircraft>, TelemetryError>);

    /// Fake source replaying a script of (delay, result) steps.
    struct ScriptedSource {
        steps: Mutex<Vec<Step>>,
        calls: AtomicUsize,
    }

    impl ScriptedSource {
        fn new(steps: Vec<Step>) -> Arc<Self> {
            Arc::new(Self {
                steps: Mutex::new(steps),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl TelemetrySource for ScriptedSource {
        async fn fetch(&self, url: &str) -> Result<Vec<NormalizedAircraft>, TelemetryError> {
            assert_eq!(url, URL);
            let index = self.calls.fetch_add(1, Ordering::SeqCst);
            let (delay, result) = {
                let steps = self.steps.lock().unwrap();
                steps
                    .get(index)
                    .cloned()
                    .unwrap_or((Duration::ZERO, Ok(Vec::new())))
            };
            tokio::time::sleep(delay).await;
            result
        }
    }

    fn store(url: Option<&str>) -> Arc<MemoryConfigStore> {
        Arc::new(MemoryConfigStore::new(url.map(str::to_string)))
    }

    fn config(poll_secs: u64) -> PollerConfig {
        PollerConfig {
            poll_interval: Duration::from_secs(poll_secs),
            ..Default::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_tick_fetches_immediately() {
        let source = ScriptedSource::new(vec![(Duration::ZERO, Ok(vec![aircraft("a")]))]);
        let mut handle = Poller::new(config(10), Arc::clone(&source), store(Some(URL))).spawn();

        let snapshot = handle.recv().await.unwrap();
        assert_eq!(snapshot.sequence, 1);
        assert_eq!(snapshot.aircraft.len(), 1);
        assert!(snapshot.error.is_none());
        assert!(matches!(
            *handle.status().borrow(),
            PollStatus::Live { aircraft: 1, .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_polls_on_fixed_period() {
        let source = ScriptedSource::new(Vec::new());
        let mut handle = Poller::new(config(10), Arc::clone(&source), store(Some(URL))).spawn();

        for expected in 1..=3 {
            let snapshot = handle.recv().await.unwrap();
            assert_eq!(snapshot.sequence, expected);
        }
        assert_eq!(source.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_cycles_last_completed_wins() {
        // Fetch #1 is slower than the period, fetch #2 overtakes it
        let source = ScriptedSource::new(vec![
            (Duration::from_secs(15), Ok(vec![aircraft("first")])),
            (Duration::from_secs(1), Ok(vec![aircraft("second")])),
        ]);
        let mut handle = Poller::new(config(10), Arc::clone(&source), store(Some(URL))).spawn();

        let a = handle.recv().await.unwrap();
        let b = handle.recv().await.unwrap();
        assert_eq!(a.sequence, 2);
        assert_eq!(a.aircraft[0].id, "second");
        assert_eq!(b.sequence, 1);
        assert_eq!(b.aircraft[0].id, "first");
        assert!(b.completed_at > a.completed_at);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_fetch_yields_empty_snapshot() {
        let source = ScriptedSource::new(vec![
            (Duration::ZERO, Err(TelemetryError::Status(503))),
            (Duration::ZERO, Ok(vec![aircraft("a")])),
        ]);
        let mut handle = Poller::new(config(10), Arc::clone(&source), store(Some(URL))).spawn();

        let failed = handle.recv().await.unwrap();
        assert!(failed.aircraft.is_empty());
        assert_eq!(failed.error, Some(TelemetryError::Status(503)));
        assert_eq!(
            *handle.status().borrow(),
            PollStatus::Degraded(TelemetryError::Status(503))
        );

        // Recovery happens on the next regular tick, not sooner
        let start = Instant::now();
        let recovered = handle.recv().await.unwrap();
        assert_eq!(recovered.aircraft.len(), 1);
        assert!(start.elapsed() >= Duration::from_secs(9));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unconfigured_skips_cycle() {
        let source = ScriptedSource::new(Vec::new());
        let store = store(None);
        let handle = Poller::new(
            config(10),
            Arc::clone(&source),
            Arc::clone(&store) as Arc<dyn ConfigStore>,
        )
        .spawn();

        tokio::time::sleep(Duration::from_secs(25)).await;
        assert_eq!(source.calls(), 0);
        assert_eq!(*handle.status().borrow(), PollStatus::Unconfigured);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_respects_staleness_window() {
        let source = ScriptedSource::new(Vec::new());
        let store = store(None);
        let mut handle = Poller::new(
            config(3600),
            Arc::clone(&source),
            Arc::clone(&store) as Arc<dyn ConfigStore>,
        )
        .spawn();

        // Configure after the first (skipped) tick, then ask for data
        tokio::time::sleep(Duration::from_millis(10)).await;
        store.set(URL.to_string());
        handle.refresh();
        assert_eq!(handle.recv().await.unwrap().sequence, 1);

        // Fresh result: refresh is ignored
        handle.refresh();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(source.calls(), 1);
        assert!(handle.try_recv().is_none());

        // Past the window: refresh fetches again
        tokio::time::sleep(Duration::from_secs(5)).await;
        handle.refresh();
        assert_eq!(handle.recv().await.unwrap().sequence, 2);
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_timer() {
        let source = ScriptedSource::new(vec![(Duration::from_secs(30), Ok(Vec::new()))]);
        let mut handle = Poller::new(config(10), Arc::clone(&source), store(Some(URL))).spawn();
        let mut status = handle.status();

        tokio::time::sleep(Duration::from_secs(1)).await;
        handle.shutdown();

        assert!(handle.recv().await.is_none());
        status
            .wait_for(|s| *s == PollStatus::Stopped)
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_with_stalled_consumer() {
        let source = ScriptedSource::new(Vec::new());
        let config = PollerConfig {
            poll_interval: Duration::from_secs(10),
            buffer_size: 1,
            ..Default::default()
        };
        let mut handle = Poller::new(config, Arc::clone(&source), store(Some(URL))).spawn();
        let mut status = handle.status();

        // Nothing is read: the first snapshot fills the buffer, the second waits
        tokio::time::sleep(Duration::from_secs(15)).await;
        assert_eq!(source.calls(), 2);

        handle.shutdown();
        tokio::time::timeout(
            Duration::from_secs(1),
            status.wait_for(|s| *s == PollStatus::Stopped),
        )
        .await
        .expect("poller should stop while the consumer is stalled")
        .unwrap();

        assert_eq!(handle.recv().await.unwrap().sequence, 1);
        assert!(handle.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_history_receives_batches() {
        let source = ScriptedSource::new(vec![(Duration::ZERO, Ok(vec![aircraft("a")]))]);
        let history = Arc::new(MemoryTrackHistory::default());
        let mut handle = Poller::new(config(10), Arc::clone(&source), store(Some(URL)))
            .with_history(Arc::clone(&history) as Arc<dyn TrackHistory>)
            .spawn();

        let _ = handle.recv().await.unwrap();
        assert_eq!(history.get("a").unwrap().len(), 1);
    }
}
