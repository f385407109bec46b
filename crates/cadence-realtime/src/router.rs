//! Frame parsing and dispatch.

use std::sync::atomic::{AtomicU64, Ordering};

use cadence_core::SessionKey;
use tracing::{debug, warn};

use crate::frame::{
    AnalysisComplete, AnalysisError, AnalysisProgress, AssistantDelta, AssistantDone, ErrorFrame,
    InboundFrame, RoomMessage, SessionEnded, UserJoined, UserLeft,
};

/// Receives routed frames. Every method defaults to a no-op, so a handler
/// only implements the frame types its screen cares about.
#[allow(unused_variables)]
pub trait FrameHandler {
    /// `assistant_delta`
    fn on_assistant_delta(&mut self, frame: &AssistantDelta) {}
    /// `assistant_done`
    fn on_assistant_done(&mut self, frame: &AssistantDone) {}
    /// `error`
    fn on_error(&mut self, frame: &ErrorFrame) {}
    /// `analysis_progress`
    fn on_analysis_progress(&mut self, frame: &AnalysisProgress) {}
    /// `analysis_complete`
    fn on_analysis_complete(&mut self, frame: &AnalysisComplete) {}
    /// `analysis_error`
    fn on_analysis_error(&mut self, frame: &AnalysisError) {}
    /// `user_joined`
    fn on_user_joined(&mut self, frame: &UserJoined) {}
    /// `user_left`
    fn on_user_left(&mut self, frame: &UserLeft) {}
    /// `message`
    fn on_message(&mut self, frame: &RoomMessage) {}
    /// `session_ended`
    fn on_session_ended(&mut self, frame: &SessionEnded) {}
}

/// What [`MessageRouter::route`] did with a raw frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Parsed and handed to the handler.
    Dispatched(&'static str),
    /// Parsed, but the `type` is not one this client handles.
    Ignored,
    /// Not valid JSON or not a frame.
    Malformed,
}

/// Parses raw text frames and dispatches them to a [`FrameHandler`].
///
/// Routing never fails. Malformed input is logged and counted, and the
/// receive loop carries on with the next frame.
#[derive(Debug, Default)]
pub struct MessageRouter {
    dispatched: AtomicU64,
    ignored: AtomicU64,
    malformed: AtomicU64,
}

impl MessageRouter {
    /// Create a router with zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `raw` and call the matching handler method.
    pub fn route(&self, key: &SessionKey, raw: &str, handler: &mut dyn FrameHandler) -> RouteOutcome {
        let frame = match serde_json::from_str::<InboundFrame>(raw) {
            Ok(frame) => frame,
            Err(e) => {
                let _ = self.malformed.fetch_add(1, Ordering::Relaxed);
                warn!(session_key = %key, error = %e, len = raw.len(), "discarding malformed frame");
                return RouteOutcome::Malformed;
            }
        };
        self.dispatch(key, &frame, handler)
    }

    /// Dispatch an already-parsed frame.
    pub fn dispatch(
        &self,
        key: &SessionKey,
        frame: &InboundFrame,
        handler: &mut dyn FrameHandler,
    ) -> RouteOutcome {
        match frame {
            InboundFrame::AssistantDelta(f) => handler.on_assistant_delta(f),
            InboundFrame::AssistantDone(f) => handler.on_assistant_done(f),
            InboundFrame::Error(f) => handler.on_error(f),
            InboundFrame::AnalysisProgress(f) => handler.on_analysis_progress(f),
            InboundFrame::AnalysisComplete(f) => handler.on_analysis_complete(f),
            InboundFrame::AnalysisError(f) => handler.on_analysis_error(f),
            InboundFrame::UserJoined(f) => handler.on_user_joined(f),
            InboundFrame::UserLeft(f) => handler.on_user_left(f),
            InboundFrame::Message(f) => handler.on_message(f),
            InboundFrame::SessionEnded(f) => handler.on_session_ended(f),
            InboundFrame::Unknown => {
                let _ = self.ignored.fetch_add(1, Ordering::Relaxed);
                debug!(session_key = %key, "ignoring frame of unknown type");
                return RouteOutcome::Ignored;
            }
        }
        let _ = self.dispatched.fetch_add(1, Ordering::Relaxed);
        debug!(session_key = %key, frame_type = frame.kind(), "frame dispatched");
        RouteOutcome::Dispatched(frame.kind())
    }

    /// Frames handed to a handler so far.
    pub fn dispatched_count(&self) -> u64 {
        self.dispatched.load(Ordering::Relaxed)
    }

    /// Frames of unknown type so far.
    pub fn ignored_count(&self) -> u64 {
        self.ignored.load(Ordering::Relaxed)
    }

    /// Frames that failed to parse so far.
    pub fn malformed_count(&self) -> u64 {
        self.malformed.load(Ordering::Relaxed)
    }
}
