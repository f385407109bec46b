//! Fixed-interval status polling.

use std::collections::HashSet;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use cadence_core::constants::{DEFAULT_POLL_INTERVAL, DEFAULT_REQUEST_TIMEOUT};
use cadence_settings::PollerSettings;
use futures::Stream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, warn};

use crate::errors::{ApiError, Result};
use crate::types::{AnalysisRecord, AnalysisStatus};

/// Buffered poll events before the poll loop waits for the consumer.
const EVENT_BUFFER: usize = 16;

/// Floor for the poll interval. `tokio::time::interval` rejects zero.
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Anything that can report the status of a resource.
#[async_trait]
pub trait StatusSource: Send + Sync + 'static {
    /// Fetch the current status of `id`.
    async fn fetch_status(&self, id: &str) -> Result<AnalysisRecord>;
}

/// How a poll runs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PollOptions {
    /// Fixed time between fetch starts.
    pub interval: Duration,
    /// Statuses that end the poll.
    pub terminal: HashSet<AnalysisStatus>,
    /// End the poll on the first fetch error instead of retrying on schedule.
    pub stop_on_error: bool,
    /// Upper bound on a single fetch.
    pub fetch_timeout: Duration,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            terminal: [
                AnalysisStatus::Ready,
                AnalysisStatus::Completed,
                AnalysisStatus::Failed,
            ]
            .into_iter()
            .collect(),
            stop_on_error: false,
            fetch_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl PollOptions {
    /// Options from the `poller` settings section.
    ///
    /// Unrecognized status names are dropped with a warning. If none are
    /// left, the default terminal set applies.
    pub fn from_settings(settings: &PollerSettings) -> Self {
        let defaults = Self::default();
        let terminal: HashSet<AnalysisStatus> = settings
            .terminal_states
            .iter()
            .filter_map(|name| match AnalysisStatus::parse(name) {
                AnalysisStatus::Unknown => {
                    warn!(status = %name, "ignoring unknown terminal status");
                    None
                }
                status => Some(status),
            })
            .collect();
        if terminal.is_empty() {
            warn!("no usable terminal statuses, using defaults");
            return Self {
                interval: settings.interval(),
                ..defaults
            };
        }
        Self {
            interval: settings.interval(),
            terminal,
            ..defaults
        }
    }

    /// Replace the terminal set.
    #[must_use]
    pub fn with_terminal(mut self, statuses: impl IntoIterator<Item = AnalysisStatus>) -> Self {
        self.terminal = statuses.into_iter().collect();
        self
    }

    /// Replace the interval. Values below 1 ms poll every 1 ms.
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Treat the first fetch error as final.
    #[must_use]
    pub fn stop_on_error(mut self, stop: bool) -> Self {
        self.stop_on_error = stop;
        self
    }

    /// Whether `status` ends the poll.
    pub fn is_terminal(&self, status: AnalysisStatus) -> bool {
        status != AnalysisStatus::Unknown && self.terminal.contains(&status)
    }
}

/// One poll observation.
#[derive(Debug)]
pub enum PollEvent {
    /// A fetch succeeded.
    Status(AnalysisRecord),
    /// A fetch failed.
    Error(ApiError),
}

/// Starts polls against a [`StatusSource`].
#[derive(Clone)]
pub struct StatusPoller {
    source: Arc<dyn StatusSource>,
    options: PollOptions,
}

impl StatusPoller {
    /// Create a poller.
    pub fn new(source: Arc<dyn StatusSource>, options: PollOptions) -> Self {
        Self { source, options }
    }

    /// Poll options.
    pub fn options(&self) -> &PollOptions {
        &self.options
    }

    /// Start polling `id`: one fetch now, then one per interval until a
    /// terminal status, a final error, or the subscription is dropped.
    pub fn poll(&self, id: impl Into<String>) -> PollSubscription {
        let id = id.into();
        let cancel = CancellationToken::new();
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let task = tokio::spawn(run_poll(
            self.source.clone(),
            self.options.clone(),
            id.clone(),
            tx,
            cancel.clone(),
        ));
        PollSubscription {
            id,
            rx,
            cancel: cancel.clone(),
            _guard: cancel.drop_guard(),
            task,
        }
    }
}

impl std::fmt::Debug for StatusPoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusPoller")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// A running poll. Dropping it stops the poll.
pub struct PollSubscription {
    id: String,
    rx: mpsc::Receiver<PollEvent>,
    cancel: CancellationToken,
    _guard: DropGuard,
    task: JoinHandle<()>,
}

impl PollSubscription {
    /// Resource being polled.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Next observation, or `None` once the poll has ended.
    pub async fn next_event(&mut self) -> Option<PollEvent> {
        self.rx.recv().await
    }

    /// Stop polling. Already-delivered events stay readable.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether the poll loop has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Drain the poll and return the last status seen.
    pub async fn last_status(mut self) -> Option<AnalysisRecord> {
        let mut last = None;
        while let Some(event) = self.rx.recv().await {
            if let PollEvent::Status(record) = event {
                last = Some(record);
            }
        }
        last
    }
}

impl Stream for PollSubscription {
    type Item = PollEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl std::fmt::Debug for PollSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollSubscription")
            .field("id", &self.id)
            .field("finished", &self.task.is_finished())
            .finish_non_exhaustive()
    }
}

async fn run_poll(
    source: Arc<dyn StatusSource>,
    options: PollOptions,
    id: String,
    tx: mpsc::Sender<PollEvent>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(options.interval.max(MIN_POLL_INTERVAL));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut fetches = 0u32;

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        fetches += 1;
        let fetch = tokio::time::timeout(options.fetch_timeout, source.fetch_status(&id));
        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            result = fetch => result.unwrap_or(Err(ApiError::Timeout)),
        };

        match result {
            Ok(record) => {
                let status = record.status;
                let terminal = options.is_terminal(status);
                debug!(resource_id = %id, fetch = fetches, status = %status, "poll status");
                if tx.send(PollEvent::Status(record)).await.is_err() {
                    break;
                }
                if terminal {
                    info!(resource_id = %id, status = %status, fetches, "poll reached terminal status");
                    break;
                }
            }
            Err(e) => {
                warn!(resource_id = %id, fetch = fetches, error = %e, "poll fetch failed");
                if tx.send(PollEvent::Error(e)).await.is_err() || options.stop_on_error {
                    break;
                }
            }
        }
    }
    debug!(resource_id = %id, fetches, "poll stopped");
}
