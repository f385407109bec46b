//! Per-session connection workers with bounded fixed-delay reconnects.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use cadence_core::SessionKey;
use cadence_core::constants::{
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_MAX_RECONNECT_ATTEMPTS, DEFAULT_RECONNECT_DELAY,
};
use cadence_settings::RealtimeSettings;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::state::{ChannelEvent, ConnectionState};
use super::transport::{Connector, Transport, TransportEvent};
use crate::errors::{RealtimeError, Result};
use crate::frame::OutboundFrame;

/// Timing of the connection workers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChannelConfig {
    /// Fixed wait between an unexpected close and the next attempt.
    pub reconnect_delay: Duration,
    /// Reconnects allowed before the worker gives up.
    pub max_reconnect_attempts: u32,
    /// Upper bound on one connect attempt.
    pub connect_timeout: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl From<&RealtimeSettings> for ChannelConfig {
    fn from(settings: &RealtimeSettings) -> Self {
        Self {
            reconnect_delay: settings.reconnect_delay(),
            max_reconnect_attempts: settings.max_reconnect_attempts,
            connect_timeout: settings.connect_timeout(),
        }
    }
}

struct Entry {
    generation: u64,
    state: ConnectionState,
    attempts: u32,
    running: bool,
    cancel: CancellationToken,
    outbound: mpsc::UnboundedSender<String>,
    task: Option<JoinHandle<()>>,
}

struct Shared {
    connector: Arc<dyn Connector>,
    config: ChannelConfig,
    entries: Mutex<HashMap<SessionKey, Entry>>,
    events: mpsc::UnboundedSender<ChannelEvent>,
    next_generation: Mutex<u64>,
}

impl Shared {
    /// Apply `state` if the worker still owns the key. Returns `false` once
    /// the key was closed or reopened by a newer worker.
    fn transition(&self, key: &SessionKey, generation: u64, state: ConnectionState) -> bool {
        let mut entries = self.entries.lock();
        let Some(entry) = entries.get_mut(key).filter(|e| e.generation == generation) else {
            return false;
        };
        if entry.state != state {
            debug!(session_key = %key, from = %entry.state, to = %state, "state transition");
            entry.state = state;
            self.emit(ChannelEvent::StateChanged {
                key: key.clone(),
                state,
            });
        }
        true
    }

    fn opened(&self, key: &SessionKey, generation: u64) -> bool {
        let mut entries = self.entries.lock();
        let Some(entry) = entries.get_mut(key).filter(|e| e.generation == generation) else {
            return false;
        };
        entry.attempts = 0;
        if entry.state != ConnectionState::Connected {
            entry.state = ConnectionState::Connected;
            self.emit(ChannelEvent::StateChanged {
                key: key.clone(),
                state: ConnectionState::Connected,
            });
        }
        true
    }

    fn frame(&self, key: &SessionKey, generation: u64, text: String) -> bool {
        let entries = self.entries.lock();
        if !entries.get(key).is_some_and(|e| e.generation == generation) {
            return false;
        }
        self.emit(ChannelEvent::Frame {
            key: key.clone(),
            text,
        });
        true
    }

    /// Count the next reconnect, or `None` when the budget is spent.
    fn next_attempt(&self, key: &SessionKey, generation: u64) -> Option<u32> {
        let mut entries = self.entries.lock();
        let entry = entries.get_mut(key).filter(|e| e.generation == generation)?;
        if entry.attempts >= self.config.max_reconnect_attempts {
            return None;
        }
        entry.attempts += 1;
        Some(entry.attempts)
    }

    fn finished(&self, key: &SessionKey, generation: u64) {
        if let Some(entry) = self
            .entries
            .lock()
            .get_mut(key)
            .filter(|e| e.generation == generation)
        {
            entry.running = false;
        }
    }

    fn emit(&self, event: ChannelEvent) {
        // A dropped receiver means nobody is listening any more.
        let _ = self.events.send(event);
    }
}

/// Owns one connection worker per session key.
///
/// Each worker connects, pumps frames onto the shared [`ChannelEvent`]
/// queue, and after an unexpected close waits a fixed delay and reconnects,
/// up to a bounded number of attempts. State transitions and frames are
/// published while holding the entry lock, and [`close`](Self::close)
/// removes the entry under that same lock, so nothing for a key is
/// published after `close` returns.
#[derive(Clone)]
pub struct ConnectionManager {
    shared: Arc<Shared>,
}

impl ConnectionManager {
    /// Create a manager and the receiving end of its event queue.
    pub fn new(
        connector: Arc<dyn Connector>,
        config: ChannelConfig,
    ) -> (Self, mpsc::UnboundedReceiver<ChannelEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            connector,
            config,
            entries: Mutex::new(HashMap::new()),
            events,
            next_generation: Mutex::new(0),
        });
        (Self { shared }, rx)
    }

    /// Worker timing.
    pub fn config(&self) -> ChannelConfig {
        self.shared.config
    }

    /// Start a connection worker for `key`.
    ///
    /// No-op while a worker for the key is alive. After a worker gave up,
    /// this starts a fresh one with the attempt counter at zero.
    pub fn open(&self, key: &SessionKey) {
        let mut entries = self.shared.entries.lock();
        if entries.get(key).is_some_and(|e| e.running) {
            debug!(session_key = %key, "channel already open");
            return;
        }

        let generation = {
            let mut next = self.shared.next_generation.lock();
            *next += 1;
            *next
        };
        let cancel = CancellationToken::new();
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_worker(
            self.shared.clone(),
            key.clone(),
            generation,
            cancel.clone(),
            outbound_rx,
        ));
        let previous = entries.insert(
            key.clone(),
            Entry {
                generation,
                state: ConnectionState::Connecting,
                attempts: 0,
                running: true,
                cancel,
                outbound,
                task: Some(task),
            },
        );
        if previous.is_none_or(|p| p.state != ConnectionState::Connecting) {
            self.shared.emit(ChannelEvent::StateChanged {
                key: key.clone(),
                state: ConnectionState::Connecting,
            });
        }
        info!(session_key = %key, "channel opened");
    }

    /// Close the channel for `key` and cancel any pending reconnect.
    pub fn close(&self, key: &SessionKey) {
        let _ = self.close_entry(key);
    }

    fn close_entry(&self, key: &SessionKey) -> Option<JoinHandle<()>> {
        let mut entries = self.shared.entries.lock();
        let mut entry = entries.remove(key)?;
        entry.cancel.cancel();
        if entry.state != ConnectionState::Disconnected {
            self.shared.emit(ChannelEvent::StateChanged {
                key: key.clone(),
                state: ConnectionState::Disconnected,
            });
        }
        info!(session_key = %key, "channel closed");
        entry.task.take()
    }

    /// Queue an outbound frame on the live transport for `key`.
    pub fn send(&self, key: &SessionKey, frame: &OutboundFrame) -> Result<()> {
        self.send_text(key, frame.to_text()?)
    }

    /// Queue raw text on the live transport for `key`.
    pub fn send_text(&self, key: &SessionKey, text: String) -> Result<()> {
        let entries = self.shared.entries.lock();
        let entry = entries
            .get(key)
            .filter(|e| e.running)
            .ok_or_else(|| RealtimeError::NotOpen(key.clone()))?;
        if entry.state != ConnectionState::Connected {
            return Err(RealtimeError::NotConnected(key.clone()));
        }
        entry
            .outbound
            .send(text)
            .map_err(|_| RealtimeError::NotOpen(key.clone()))
    }

    /// Current state of `key`. Unknown keys are disconnected.
    pub fn state(&self, key: &SessionKey) -> ConnectionState {
        self.shared
            .entries
            .lock()
            .get(key)
            .map_or(ConnectionState::Disconnected, |e| e.state)
    }

    /// Reconnects counted since the last successful open.
    pub fn reconnect_attempts(&self, key: &SessionKey) -> u32 {
        self.shared.entries.lock().get(key).map_or(0, |e| e.attempts)
    }

    /// Whether a worker for `key` is alive.
    pub fn is_open(&self, key: &SessionKey) -> bool {
        self.shared.entries.lock().get(key).is_some_and(|e| e.running)
    }

    /// Keys with an entry, live or exhausted.
    pub fn keys(&self) -> Vec<SessionKey> {
        self.shared.entries.lock().keys().cloned().collect()
    }

    /// Close every channel and wait up to `grace` for the workers to exit.
    pub async fn shutdown(&self, grace: Duration) {
        let keys = self.keys();
        let handles: Vec<_> = keys.iter().filter_map(|k| self.close_entry(k)).collect();
        if handles.is_empty() {
            return;
        }
        let count = handles.len();
        if tokio::time::timeout(grace, futures::future::join_all(handles))
            .await
            .is_err()
        {
            warn!(workers = count, "connection workers did not exit in time");
        }
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("config", &self.shared.config)
            .field("channels", &self.shared.entries.lock().len())
            .finish_non_exhaustive()
    }
}

async fn run_worker(
    shared: Arc<Shared>,
    key: SessionKey,
    generation: u64,
    cancel: CancellationToken,
    mut outbound: mpsc::UnboundedReceiver<String>,
) {
    let timeout = shared.config.connect_timeout;
    loop {
        if !shared.transition(&key, generation, ConnectionState::Connecting) {
            break;
        }

        let attempt = tokio::time::timeout(timeout, shared.connector.connect(&key));
        let result = tokio::select! {
            () = cancel.cancelled() => break,
            result = attempt => result,
        };

        match result {
            Ok(Ok(mut transport)) => {
                if !shared.opened(&key, generation) {
                    transport.close().await;
                    break;
                }
                debug!(session_key = %key, "transport open");
                if pump(&shared, &key, generation, &cancel, transport.as_mut(), &mut outbound).await {
                    transport.close().await;
                    break;
                }
            }
            Ok(Err(e)) => {
                warn!(session_key = %key, error = %e, "connect failed");
                let _ = shared.transition(&key, generation, ConnectionState::Error);
            }
            Err(_) => {
                warn!(session_key = %key, timeout_ms = timeout.as_millis(), "connect timed out");
                let _ = shared.transition(&key, generation, ConnectionState::Error);
            }
        }

        if !shared.transition(&key, generation, ConnectionState::Disconnected) {
            break;
        }
        let Some(attempt) = shared.next_attempt(&key, generation) else {
            warn!(
                session_key = %key,
                max_attempts = shared.config.max_reconnect_attempts,
                "reconnect attempts exhausted"
            );
            break;
        };
        debug!(
            session_key = %key,
            attempt,
            delay_ms = shared.config.reconnect_delay.as_millis(),
            "scheduling reconnect"
        );
        tokio::select! {
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(shared.config.reconnect_delay) => {}
        }
    }
    shared.finished(&key, generation);
}

/// Pump one open transport. Returns `true` when the worker was cancelled
/// and `false` when the transport closed on its own.
async fn pump(
    shared: &Shared,
    key: &SessionKey,
    generation: u64,
    cancel: &CancellationToken,
    transport: &mut dyn Transport,
    outbound: &mut mpsc::UnboundedReceiver<String>,
) -> bool {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return true,
            event = transport.recv() => match event {
                TransportEvent::Message(text) => {
                    if !shared.frame(key, generation, text) {
                        return true;
                    }
                }
                TransportEvent::Error(e) => {
                    warn!(session_key = %key, error = %e, "transport error");
                    if !shared.transition(key, generation, ConnectionState::Error) {
                        return true;
                    }
                }
                TransportEvent::Closed => {
                    debug!(session_key = %key, "transport closed");
                    return false;
                }
            },
            Some(text) = outbound.recv() => {
                if let Err(e) = transport.send(text).await {
                    warn!(session_key = %key, error = %e, "send failed");
                    let _ = shared.transition(key, generation, ConnectionState::Error);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scripted transport: yields its events, then stays open (pending)
    /// unless the script ends with `Closed`.
    struct ScriptedTransport {
        events: VecDeque<TransportEvent>,
        sent: Arc<Mutex<Vec<String>>>,
        closed: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn recv(&mut self) -> TransportEvent {
            match self.events.pop_front() {
                Some(event) => event,
                None => futures::future::pending().await,
            }
        }

        async fn send(&mut self, text: String) -> Result<()> {
            self.sent.lock().push(text);
            Ok(())
        }

        async fn close(&mut self) {
            let _ = self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    enum Script {
        Refuse,
        Hang,
        Open(Vec<TransportEvent>),
    }

    #[derive(Default)]
    struct MockConnector {
        scripts: Mutex<VecDeque<Script>>,
        calls: AtomicUsize,
        sent: Arc<Mutex<Vec<String>>>,
        closed: Arc<AtomicUsize>,
    }

    impl MockConnector {
        fn with(scripts: Vec<Script>) -> Arc<Self> {
            Arc::new(Self {
                scripts: Mutex::new(scripts.into()),
                ..Self::default()
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Connector for MockConnector {
        async fn connect(&self, _key: &SessionKey) -> Result<Box<dyn Transport>> {
            let _ = self.calls.fetch_add(1, Ordering::SeqCst);
            let script = self.scripts.lock().pop_front().unwrap_or(Script::Refuse);
            match script {
                Script::Refuse => Err(RealtimeError::Closed),
                Script::Hang => futures::future::pending().await,
                Script::Open(events) => Ok(Box::new(ScriptedTransport {
                    events: events.into(),
                    sent: self.sent.clone(),
                    closed: self.closed.clone(),
                })),
            }
        }
    }

    fn key() -> SessionKey {
        SessionKey::from("room_1")
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<ChannelEvent>) -> Vec<ChannelEvent> {
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            out.push(event);
        }
        out
    }

    fn states(events: &[ChannelEvent]) -> Vec<ConnectionState> {
        events
            .iter()
            .filter_map(|e| match e {
                ChannelEvent::StateChanged { state, .. } => Some(*state),
                ChannelEvent::Frame { .. } => None,
            })
            .collect()
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn open_connects_and_forwards_frames() {
        let connector = MockConnector::with(vec![Script::Open(vec![TransportEvent::Message(
            "{\"type\":\"x\"}".into(),
        )])]);
        let (manager, mut rx) = ConnectionManager::new(connector.clone(), ChannelConfig::default());

        manager.open(&key());
        settle().await;

        assert_eq!(manager.state(&key()), ConnectionState::Connected);
        let events = drain(&mut rx);
        assert_eq!(
            states(&events),
            vec![ConnectionState::Connecting, ConnectionState::Connected]
        );
        assert!(events.contains(&ChannelEvent::Frame {
            key: key(),
            text: "{\"type\":\"x\"}".into()
        }));
    }

    #[tokio::test(start_paused = true)]
    async fn open_twice_keeps_one_transport() {
        let connector = MockConnector::with(vec![Script::Open(vec![]), Script::Open(vec![])]);
        let (manager, _rx) = ConnectionManager::new(connector.clone(), ChannelConfig::default());

        manager.open(&key());
        manager.open(&key());
        settle().await;
        manager.open(&key());
        settle().await;

        assert_eq!(connector.calls(), 1);
        assert_eq!(manager.keys().len(), 1);
        assert!(manager.is_open(&key()));
    }

    #[tokio::test(start_paused = true)]
    async fn never_opening_transport_exhausts_reconnects() {
        let connector = MockConnector::with(vec![]);
        let (manager, mut rx) = ConnectionManager::new(connector.clone(), ChannelConfig::default());
        let (logs, _guard) = cadence_core::logging::capture_logs();

        manager.open(&key());
        tokio::time::sleep(Duration::from_secs(60)).await;

        // One initial attempt plus five reconnects.
        assert_eq!(connector.calls(), 6);
        let exhausted: Vec<_> = logs
            .events()
            .into_iter()
            .filter(|e| e.message == "reconnect attempts exhausted")
            .collect();
        assert_eq!(exhausted.len(), 1);
        assert_eq!(exhausted[0].level, tracing::Level::WARN);
        assert_eq!(exhausted[0].field("max_attempts"), Some("5"));
        assert_eq!(manager.reconnect_attempts(&key()), 5);
        assert_eq!(manager.state(&key()), ConnectionState::Disconnected);
        assert!(!manager.is_open(&key()));

        let states = states(&drain(&mut rx));
        assert_eq!(states.last(), Some(&ConnectionState::Disconnected));
        let errors = states.iter().filter(|s| **s == ConnectionState::Error).count();
        assert_eq!(errors, 6);
    }

    #[tokio::test(start_paused = true)]
    async fn open_after_exhaustion_starts_fresh_worker() {
        let connector = MockConnector::with(vec![]);
        let config = ChannelConfig {
            max_reconnect_attempts: 1,
            ..ChannelConfig::default()
        };
        let (manager, _rx) = ConnectionManager::new(connector.clone(), config);

        manager.open(&key());
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(connector.calls(), 2);
        assert!(!manager.is_open(&key()));

        manager.open(&key());
        assert_eq!(manager.reconnect_attempts(&key()), 0);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(connector.calls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_fires_after_fixed_delay_and_resets_counter() {
        let connector = MockConnector::with(vec![
            Script::Open(vec![TransportEvent::Closed]),
            Script::Open(vec![]),
        ]);
        let (manager, _rx) = ConnectionManager::new(connector.clone(), ChannelConfig::default());

        manager.open(&key());
        settle().await;
        assert_eq!(connector.calls(), 1);
        assert_eq!(manager.state(&key()), ConnectionState::Disconnected);
        assert_eq!(manager.reconnect_attempts(&key()), 1);

        tokio::time::sleep(Duration::from_millis(2900)).await;
        assert_eq!(connector.calls(), 1);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(connector.calls(), 2);
        assert_eq!(manager.state(&key()), ConnectionState::Connected);
        assert_eq!(manager.reconnect_attempts(&key()), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn close_cancels_scheduled_reconnect() {
        let connector = MockConnector::with(vec![
            Script::Open(vec![TransportEvent::Closed]),
            Script::Open(vec![]),
        ]);
        let (manager, mut rx) = ConnectionManager::new(connector.clone(), ChannelConfig::default());

        manager.open(&key());
        settle().await;
        tokio::time::sleep(Duration::from_millis(500)).await;
        manager.close(&key());
        let _ = drain(&mut rx);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(connector.calls(), 1);
        assert_eq!(manager.state(&key()), ConnectionState::Disconnected);
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn close_while_connected_closes_transport() {
        let connector = MockConnector::with(vec![Script::Open(vec![])]);
        let (manager, mut rx) = ConnectionManager::new(connector.clone(), ChannelConfig::default());

        manager.open(&key());
        settle().await;
        manager.close(&key());
        assert_eq!(
            states(&drain(&mut rx)).last(),
            Some(&ConnectionState::Disconnected)
        );
        settle().await;
        assert_eq!(connector.closed.load(Ordering::SeqCst), 1);
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn error_alone_does_not_reconnect() {
        let connector = MockConnector::with(vec![Script::Open(vec![TransportEvent::Error(
            "boom".into(),
        )])]);
        let (manager, _rx) = ConnectionManager::new(connector.clone(), ChannelConfig::default());

        manager.open(&key());
        settle().await;
        assert_eq!(manager.state(&key()), ConnectionState::Error);
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(connector.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn connect_timeout_counts_as_failure() {
        let connector = MockConnector::with(vec![Script::Hang, Script::Open(vec![])]);
        let (manager, _rx) = ConnectionManager::new(connector.clone(), ChannelConfig::default());

        manager.open(&key());
        tokio::time::sleep(Duration::from_millis(9_900)).await;
        assert_eq!(manager.state(&key()), ConnectionState::Connecting);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(manager.state(&key()), ConnectionState::Disconnected);

        tokio::time::sleep(Duration::from_millis(3_000)).await;
        assert_eq!(connector.calls(), 2);
        assert_eq!(manager.state(&key()), ConnectionState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn send_reaches_transport() {
        let connector = MockConnector::with(vec![Script::Open(vec![])]);
        let (manager, _rx) = ConnectionManager::new(connector.clone(), ChannelConfig::default());

        assert!(matches!(
            manager.send(&key(), &OutboundFrame::UserMessage { content: "hi".into() }),
            Err(RealtimeError::NotOpen(_))
        ));

        manager.open(&key());
        assert!(matches!(
            manager.send_text(&key(), "early".into()),
            Err(RealtimeError::NotConnected(_))
        ));
        settle().await;

        manager
            .send(&key(), &OutboundFrame::UserMessage { content: "hi".into() })
            .unwrap();
        settle().await;
        let sent = connector.sent.lock().clone();
        assert_eq!(sent, vec![r#"{"type":"user_message","content":"hi"}"#.to_owned()]);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_closes_every_key() {
        let connector = MockConnector::with(vec![Script::Open(vec![]), Script::Open(vec![])]);
        let (manager, _rx) = ConnectionManager::new(connector.clone(), ChannelConfig::default());
        let other = SessionKey::from("conv_2");

        manager.open(&key());
        manager.open(&other);
        settle().await;
        manager.shutdown(Duration::from_secs(1)).await;

        assert!(manager.keys().is_empty());
        assert_eq!(manager.state(&other), ConnectionState::Disconnected);
        assert_eq!(connector.closed.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn config_from_settings() {
        let settings = RealtimeSettings {
            reconnect_delay_ms: 500,
            max_reconnect_attempts: 2,
            connect_timeout_ms: 1500,
            ..RealtimeSettings::default()
        };
        let config = ChannelConfig::from(&settings);
        assert_eq!(config.reconnect_delay, Duration::from_millis(500));
        assert_eq!(config.max_reconnect_attempts, 2);
        assert_eq!(config.connect_timeout, Duration::from_millis(1500));
    }
}
