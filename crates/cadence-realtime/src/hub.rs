//! Channel hub: connects routed frames to per-session views and the
//! notification sink.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use cadence_core::{MessageId, NotificationId, SessionKey};
use cadence_notify::{NewNotification, NotificationSink};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::connection::{ChannelConfig, ChannelEvent, ConnectionManager, ConnectionState, Connector};
use crate::errors::Result;
use crate::frame::{
    AnalysisComplete, AnalysisError, AnalysisProgress, AssistantDelta, AssistantDone, ErrorFrame,
    OutboundFrame, RoomMessage, SessionEnded, UserJoined, UserLeft,
};
use crate::router::{FrameHandler, MessageRouter};
use crate::transcript::Transcript;

/// Buffered [`HubEvent`]s per subscriber before the slowest one lags.
const EVENT_CAPACITY: usize = 256;

/// Final result of the analysis tracked by a session.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum AnalysisOutcome {
    /// The backend finished the analysis.
    Completed {
        /// Short summary.
        summary: Option<String>,
        /// Overall score.
        score: Option<f64>,
    },
    /// The backend gave up.
    Failed {
        /// Reason.
        message: String,
    },
}

/// Everything a screen shows for one session key.
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    /// Connection state as last published.
    pub state: ConnectionState,
    /// Practice-chat transcript.
    pub transcript: Transcript,
    /// Analysis progress, `0..=100`.
    pub progress: Option<f64>,
    /// Current analysis stage.
    pub stage: Option<String>,
    /// Final analysis result.
    pub analysis: Option<AnalysisOutcome>,
    /// Room participants by user ID, with display names.
    pub participants: BTreeMap<String, Option<String>>,
    /// Room messages in arrival order.
    pub messages: Vec<RoomMessage>,
    /// Error slot shown to the user.
    pub error: Option<String>,
    /// Set once the room session ended.
    pub ended: Option<SessionEnded>,
}

/// Fan-out notification of a view change.
#[derive(Clone, Debug, PartialEq)]
pub enum HubEvent {
    /// Connection state changed.
    StateChanged {
        /// Session.
        key: SessionKey,
        /// New state.
        state: ConnectionState,
    },
    /// Analysis progress moved.
    Progress {
        /// Session.
        key: SessionKey,
        /// Percentage, `0..=100`.
        progress: f64,
        /// Pipeline stage.
        stage: Option<String>,
    },
    /// Analysis completed and a notification was posted.
    AnalysisComplete {
        /// Session.
        key: SessionKey,
        /// Posted (or already present) notification.
        notification_id: NotificationId,
    },
    /// Analysis failed.
    AnalysisFailed {
        /// Session.
        key: SessionKey,
        /// Reason.
        message: String,
    },
    /// A transcript message was added or extended.
    TranscriptUpdated {
        /// Session.
        key: SessionKey,
        /// Message that changed.
        message_id: MessageId,
        /// Whether it is still streaming.
        streaming: bool,
    },
    /// The chat backend reported an error.
    ChatError {
        /// Session.
        key: SessionKey,
        /// Reason.
        message: String,
    },
    /// A participant joined.
    ParticipantJoined {
        /// Session.
        key: SessionKey,
        /// Participant.
        user_id: String,
    },
    /// A participant left.
    ParticipantLeft {
        /// Session.
        key: SessionKey,
        /// Participant.
        user_id: String,
    },
    /// A room message arrived.
    RoomMessage {
        /// Session.
        key: SessionKey,
        /// Message.
        message: RoomMessage,
    },
    /// The room session ended.
    SessionEnded {
        /// Session.
        key: SessionKey,
        /// Reason.
        reason: Option<String>,
    },
}

impl HubEvent {
    /// Session the event belongs to.
    pub fn key(&self) -> &SessionKey {
        match self {
            Self::StateChanged { key, .. }
            | Self::Progress { key, .. }
            | Self::AnalysisComplete { key, .. }
            | Self::AnalysisFailed { key, .. }
            | Self::TranscriptUpdated { key, .. }
            | Self::ChatError { key, .. }
            | Self::ParticipantJoined { key, .. }
            | Self::ParticipantLeft { key, .. }
            | Self::RoomMessage { key, .. }
            | Self::SessionEnded { key, .. } => key,
        }
    }
}

/// Owns the connection manager, the router, and the session views.
///
/// A single receive loop applies [`ChannelEvent`]s in arrival order, so
/// views and [`HubEvent`]s always reflect frames in the order the
/// transport delivered them.
pub struct ChannelHub {
    manager: ConnectionManager,
    router: MessageRouter,
    sink: Arc<NotificationSink>,
    views: Mutex<HashMap<SessionKey, SessionView>>,
    events: broadcast::Sender<HubEvent>,
}

impl ChannelHub {
    /// Build a hub without starting its receive loop.
    ///
    /// Pass the returned receiver to [`run`](Self::run).
    pub fn new(
        connector: Arc<dyn Connector>,
        config: ChannelConfig,
        sink: Arc<NotificationSink>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<ChannelEvent>) {
        let (manager, rx) = ConnectionManager::new(connector, config);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let hub = Arc::new(Self {
            manager,
            router: MessageRouter::new(),
            sink,
            views: Mutex::new(HashMap::new()),
            events,
        });
        (hub, rx)
    }

    /// Build a hub and spawn its receive loop.
    pub fn start(
        connector: Arc<dyn Connector>,
        config: ChannelConfig,
        sink: Arc<NotificationSink>,
        cancel: CancellationToken,
    ) -> (Arc<Self>, JoinHandle<()>) {
        let (hub, rx) = Self::new(connector, config, sink);
        let task = tokio::spawn(hub.clone().run(rx, cancel));
        (hub, task)
    }

    /// Receive loop. Runs until `cancel` fires or the manager is dropped.
    pub async fn run(self: Arc<Self>, mut rx: mpsc::UnboundedReceiver<ChannelEvent>, cancel: CancellationToken) {
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                event = rx.recv() => match event {
                    Some(event) => self.handle(event),
                    None => break,
                },
            }
        }
        debug!("channel hub receive loop stopped");
    }

    /// Open the channel for `key`, creating its view.
    pub fn open(&self, key: &SessionKey) {
        let _ = self.views.lock().entry(key.clone()).or_default();
        self.manager.open(key);
    }

    /// Close the channel for `key`. The view is kept.
    pub fn close(&self, key: &SessionKey) {
        self.manager.close(key);
        if let Some(view) = self.views.lock().get_mut(key) {
            view.state = ConnectionState::Disconnected;
        }
    }

    /// Drop the view for `key`, closing its channel first.
    pub fn forget(&self, key: &SessionKey) {
        self.manager.close(key);
        let _ = self.views.lock().remove(key);
    }

    /// Echo a user turn into the transcript and send it as `user_message`.
    ///
    /// On failure the turn stays in the transcript and the error slot is set.
    pub fn send_user_message(&self, key: &SessionKey, content: &str) -> Result<MessageId> {
        let message_id = {
            let mut views = self.views.lock();
            views.entry(key.clone()).or_default().transcript.push_user(content)
        };
        self.publish(HubEvent::TranscriptUpdated {
            key: key.clone(),
            message_id: message_id.clone(),
            streaming: false,
        });

        let frame = OutboundFrame::UserMessage {
            content: content.to_owned(),
        };
        if let Err(e) = self.manager.send(key, &frame) {
            warn!(session_key = %key, error = %e, "failed to send user message");
            if let Some(view) = self.views.lock().get_mut(key) {
                view.error = Some(e.to_string());
            }
            return Err(e);
        }
        Ok(message_id)
    }

    /// Snapshot of the view for `key`.
    pub fn view(&self, key: &SessionKey) -> Option<SessionView> {
        self.views.lock().get(key).cloned()
    }

    /// Clear the error slot for `key`.
    pub fn dismiss_error(&self, key: &SessionKey) {
        if let Some(view) = self.views.lock().get_mut(key) {
            view.error = None;
        }
    }

    /// Subscribe to view changes.
    pub fn subscribe(&self) -> broadcast::Receiver<HubEvent> {
        self.events.subscribe()
    }

    /// Connection manager.
    pub fn manager(&self) -> &ConnectionManager {
        &self.manager
    }

    /// Frame router, for its counters.
    pub fn router(&self) -> &MessageRouter {
        &self.router
    }

    /// Shared notification sink.
    pub fn sink(&self) -> &Arc<NotificationSink> {
        &self.sink
    }

    /// Close every channel.
    pub async fn shutdown(&self, grace: Duration) {
        info!("shutting down channel hub");
        self.manager.shutdown(grace).await;
        for view in self.views.lock().values_mut() {
            view.state = ConnectionState::Disconnected;
        }
    }

    /// Apply one channel event. Events for keys without a view, such as
    /// ones queued before [`forget`](Self::forget), are dropped.
    fn handle(&self, event: ChannelEvent) {
        let published = {
            let mut views = self.views.lock();
            let Some(view) = views.get_mut(event.key()) else {
                debug!(session_key = %event.key(), "dropping event for forgotten channel");
                return;
            };
            match event {
                ChannelEvent::StateChanged { key, state } => {
                    view.state = state;
                    vec![HubEvent::StateChanged { key, state }]
                }
                ChannelEvent::Frame { key, text } => {
                    let mut update = ViewUpdate {
                        key: &key,
                        view,
                        sink: &self.sink,
                        events: Vec::new(),
                    };
                    let _ = self.router.route(&key, &text, &mut update);
                    update.events
                }
            }
        };
        for event in published {
            self.publish(event);
        }
    }

    fn publish(&self, event: HubEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

impl std::fmt::Debug for ChannelHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelHub")
            .field("manager", &self.manager)
            .field("views", &self.views.lock().len())
            .finish_non_exhaustive()
    }
}

/// Applies one routed frame to a view.
struct ViewUpdate<'a> {
    key: &'a SessionKey,
    view: &'a mut SessionView,
    sink: &'a NotificationSink,
    events: Vec<HubEvent>,
}

impl FrameHandler for ViewUpdate<'_> {
    fn on_assistant_delta(&mut self, frame: &AssistantDelta) {
        let message_id = self.view.transcript.apply_delta(&frame.content);
        self.events.push(HubEvent::TranscriptUpdated {
            key: self.key.clone(),
            message_id,
            streaming: true,
        });
    }

    fn on_assistant_done(&mut self, frame: &AssistantDone) {
        if let Some(message_id) = self.view.transcript.finish(frame.content.as_deref()) {
            self.events.push(HubEvent::TranscriptUpdated {
                key: self.key.clone(),
                message_id,
                streaming: false,
            });
        }
    }

    fn on_error(&mut self, frame: &ErrorFrame) {
        let _ = self.view.transcript.interrupt();
        self.view.error = Some(frame.message.clone());
        self.events.push(HubEvent::ChatError {
            key: self.key.clone(),
            message: frame.message.clone(),
        });
    }

    fn on_analysis_progress(&mut self, frame: &AnalysisProgress) {
        let progress = frame.progress.clamp(0.0, 100.0);
        self.view.progress = Some(progress);
        if frame.stage.is_some() {
            self.view.stage.clone_from(&frame.stage);
        }
        self.events.push(HubEvent::Progress {
            key: self.key.clone(),
            progress,
            stage: frame.stage.clone(),
        });
    }

    fn on_analysis_complete(&mut self, frame: &AnalysisComplete) {
        self.view.progress = Some(100.0);
        self.view.analysis = Some(AnalysisOutcome::Completed {
            summary: frame.summary.clone(),
            score: frame.score,
        });

        let conversation = frame
            .conversation_id
            .as_deref()
            .map_or_else(|| self.key.clone(), SessionKey::from);
        let body = frame
            .summary
            .clone()
            .unwrap_or_else(|| "Your conversation analysis is ready.".to_owned());
        let notification_id = self.sink.add_for_conversation(
            NewNotification::success("Analysis complete", body)
                .with_link(format!("/conversations/{conversation}"))
                .for_conversation(conversation),
        );
        info!(session_key = %self.key, notification_id = %notification_id, "analysis complete");
        self.events.push(HubEvent::AnalysisComplete {
            key: self.key.clone(),
            notification_id,
        });
    }

    fn on_analysis_error(&mut self, frame: &AnalysisError) {
        self.view.analysis = Some(AnalysisOutcome::Failed {
            message: frame.message.clone(),
        });
        self.view.error = Some(frame.message.clone());
        let _ = self.sink.add_for_conversation(
            NewNotification::error("Analysis failed", frame.message.clone())
                .for_conversation(self.key.clone()),
        );
        warn!(session_key = %self.key, reason = %frame.message, "analysis failed");
        self.events.push(HubEvent::AnalysisFailed {
            key: self.key.clone(),
            message: frame.message.clone(),
        });
    }

    fn on_user_joined(&mut self, frame: &UserJoined) {
        let _ = self
            .view
            .participants
            .insert(frame.user_id.clone(), frame.name.clone());
        self.events.push(HubEvent::ParticipantJoined {
            key: self.key.clone(),
            user_id: frame.user_id.clone(),
        });
    }

    fn on_user_left(&mut self, frame: &UserLeft) {
        let _ = self.view.participants.remove(&frame.user_id);
        self.events.push(HubEvent::ParticipantLeft {
            key: self.key.clone(),
            user_id: frame.user_id.clone(),
        });
    }

    fn on_message(&mut self, frame: &RoomMessage) {
        self.view.messages.push(frame.clone());
        self.events.push(HubEvent::RoomMessage {
            key: self.key.clone(),
            message: frame.clone(),
        });
    }

    fn on_session_ended(&mut self, frame: &SessionEnded) {
        self.view.ended = Some(frame.clone());
        let body = frame
            .reason
            .clone()
            .unwrap_or_else(|| "The session has ended.".to_owned());
        let _ = self.sink.add(
            NewNotification::info("Session ended", body).for_conversation(self.key.clone()),
        );
        self.events.push(HubEvent::SessionEnded {
            key: self.key.clone(),
            reason: frame.reason.clone(),
        });
    }
}
