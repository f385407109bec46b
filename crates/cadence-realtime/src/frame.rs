//! Wire frames carried by the real-time channel.
//!
//! Inbound frames are JSON objects tagged by `type`. Payload fields are
//! camelCase. Unrecognized types decode to [`InboundFrame::Unknown`] so a
//! newer backend never breaks an older client.

use serde::{Deserialize, Serialize};

/// A frame received from the backend.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundFrame {
    /// A chunk of a streaming assistant reply.
    AssistantDelta(AssistantDelta),
    /// End of a streaming assistant reply.
    AssistantDone(AssistantDone),
    /// The chat backend reported an error.
    Error(ErrorFrame),
    /// Analysis progress update.
    AnalysisProgress(AnalysisProgress),
    /// Analysis finished successfully.
    AnalysisComplete(AnalysisComplete),
    /// Analysis failed.
    AnalysisError(AnalysisError),
    /// A participant joined the room.
    UserJoined(UserJoined),
    /// A participant left the room.
    UserLeft(UserLeft),
    /// A room message.
    Message(RoomMessage),
    /// The room session ended.
    SessionEnded(SessionEnded),
    /// Any `type` this client does not know.
    #[serde(other)]
    Unknown,
}

impl InboundFrame {
    /// The wire `type` of the frame, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AssistantDelta(_) => "assistant_delta",
            Self::AssistantDone(_) => "assistant_done",
            Self::Error(_) => "error",
            Self::AnalysisProgress(_) => "analysis_progress",
            Self::AnalysisComplete(_) => "analysis_complete",
            Self::AnalysisError(_) => "analysis_error",
            Self::UserJoined(_) => "user_joined",
            Self::UserLeft(_) => "user_left",
            Self::Message(_) => "message",
            Self::SessionEnded(_) => "session_ended",
            Self::Unknown => "unknown",
        }
    }
}

/// Payload of `assistant_delta`.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssistantDelta {
    /// Text to append.
    #[serde(alias = "delta")]
    pub content: String,
}

/// Payload of `assistant_done`.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssistantDone {
    /// Backend ID of the finished message.
    #[serde(default)]
    pub message_id: Option<String>,
    /// Full reply text, sent by backends that do not stream.
    #[serde(default)]
    pub content: Option<String>,
}

/// Payload of `error`.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorFrame {
    /// Human-readable message.
    #[serde(default = "default_error_message")]
    pub message: String,
    /// Backend error code.
    #[serde(default)]
    pub code: Option<String>,
}

fn default_error_message() -> String {
    "Unknown error".to_owned()
}

/// Payload of `analysis_progress`.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisProgress {
    /// Percentage complete. Clamped to `0..=100` by consumers.
    pub progress: f64,
    /// Name of the current pipeline stage.
    #[serde(default)]
    pub stage: Option<String>,
}

/// Payload of `analysis_complete`.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisComplete {
    /// Conversation the analysis belongs to. Defaults to the session key.
    #[serde(default)]
    pub conversation_id: Option<String>,
    /// Short summary of the result.
    #[serde(default)]
    pub summary: Option<String>,
    /// Overall score.
    #[serde(default)]
    pub score: Option<f64>,
}

/// Payload of `analysis_error`.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisError {
    /// Human-readable message.
    #[serde(default = "default_error_message")]
    pub message: String,
}

/// Payload of `user_joined`.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserJoined {
    /// Participant ID.
    pub user_id: String,
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
}

/// Payload of `user_left`.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserLeft {
    /// Participant ID.
    pub user_id: String,
}

/// Payload of `message`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomMessage {
    /// Backend message ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Sender, absent for system messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Message text.
    pub content: String,
}

/// Payload of `session_ended`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionEnded {
    /// Why the session ended.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// A frame sent to the backend.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundFrame {
    /// A user chat turn.
    UserMessage {
        /// Message text.
        content: String,
    },
}

impl OutboundFrame {
    /// Encode as a JSON text frame.
    pub fn to_text(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn parse(raw: &str) -> InboundFrame {
        serde_json::from_str(raw).unwrap()
    }

    #[test]
    fn delta_accepts_alias() {
        assert_matches!(
            parse(r#"{"type":"assistant_delta","content":"Hel"}"#),
            InboundFrame::AssistantDelta(AssistantDelta { content }) if content == "Hel"
        );
        assert_matches!(
            parse(r#"{"type":"assistant_delta","delta":"lo"}"#),
            InboundFrame::AssistantDelta(AssistantDelta { content }) if content == "lo"
        );
    }

    #[test]
    fn done_fields_are_optional() {
        assert_eq!(
            parse(r#"{"type":"assistant_done"}"#),
            InboundFrame::AssistantDone(AssistantDone::default())
        );
        assert_matches!(
            parse(r#"{"type":"assistant_done","messageId":"m1","content":"Hi"}"#),
            InboundFrame::AssistantDone(AssistantDone { message_id: Some(id), content: Some(c) })
                if id == "m1" && c == "Hi"
        );
    }

    #[test]
    fn analysis_frames() {
        assert_matches!(
            parse(r#"{"type":"analysis_progress","progress":40}"#),
            InboundFrame::AnalysisProgress(AnalysisProgress { progress, stage: None })
                if (progress - 40.0).abs() < f64::EPSILON
        );
        assert_eq!(
            parse(r#"{"type":"analysis_complete"}"#),
            InboundFrame::AnalysisComplete(AnalysisComplete::default())
        );
        assert_matches!(
            parse(r#"{"type":"analysis_complete","conversationId":"conv_1","score":8.5}"#),
            InboundFrame::AnalysisComplete(AnalysisComplete { conversation_id: Some(id), score: Some(_), .. })
                if id == "conv_1"
        );
        assert_matches!(
            parse(r#"{"type":"analysis_error","message":"bad audio"}"#),
            InboundFrame::AnalysisError(AnalysisError { message }) if message == "bad audio"
        );
    }

    #[test]
    fn room_frames() {
        assert_matches!(
            parse(r#"{"type":"user_joined","userId":"u1","name":"Ana"}"#),
            InboundFrame::UserJoined(UserJoined { user_id, name: Some(_) }) if user_id == "u1"
        );
        assert_matches!(
            parse(r#"{"type":"user_left","userId":"u1"}"#),
            InboundFrame::UserLeft(UserLeft { user_id }) if user_id == "u1"
        );
        assert_matches!(
            parse(r#"{"type":"message","userId":"u2","content":"hey"}"#),
            InboundFrame::Message(RoomMessage { content, .. }) if content == "hey"
        );
        assert_eq!(
            parse(r#"{"type":"session_ended"}"#),
            InboundFrame::SessionEnded(SessionEnded::default())
        );
    }

    #[test]
    fn error_without_message_gets_default() {
        assert_matches!(
            parse(r#"{"type":"error"}"#),
            InboundFrame::Error(ErrorFrame { message, code: None }) if message == "Unknown error"
        );
    }

    #[test]
    fn unknown_type_is_not_an_error() {
        assert_eq!(parse(r#"{"type":"typing","userId":"u1"}"#), InboundFrame::Unknown);
        assert_eq!(InboundFrame::Unknown.kind(), "unknown");
    }

    #[test]
    fn missing_type_is_an_error() {
        assert!(serde_json::from_str::<InboundFrame>(r#"{"content":"x"}"#).is_err());
    }

    #[test]
    fn outbound_user_message() {
        let text = OutboundFrame::UserMessage {
            content: "hello".into(),
        }
        .to_text()
        .unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["type"], "user_message");
        assert_eq!(value["content"], "hello");
    }
}
