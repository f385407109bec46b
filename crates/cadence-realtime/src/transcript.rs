//! Practice-chat transcript built from streamed assistant frames.

use cadence_core::MessageId;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Author of a chat message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    /// The local user.
    User,
    /// The AI practice partner.
    Assistant,
    /// Client-generated notices.
    System,
}

/// One chat turn.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Client-assigned ID.
    pub id: MessageId,
    /// Author.
    pub role: ChatRole,
    /// Text so far.
    pub content: String,
    /// Whether more deltas may still arrive.
    pub streaming: bool,
    /// When the turn started.
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    fn new(role: ChatRole, content: String, streaming: bool) -> Self {
        Self {
            id: MessageId::generate(),
            role,
            content,
            streaming,
            created_at: Utc::now(),
        }
    }
}

/// Ordered chat history for one session.
#[derive(Clone, Debug, Default, Serialize)]
pub struct Transcript {
    messages: Vec<ChatMessage>,
}

impl Transcript {
    /// Empty transcript.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a user turn.
    pub fn push_user(&mut self, content: impl Into<String>) -> MessageId {
        self.push(ChatMessage::new(ChatRole::User, content.into(), false))
    }

    /// Append a system notice.
    pub fn push_system(&mut self, content: impl Into<String>) -> MessageId {
        self.push(ChatMessage::new(ChatRole::System, content.into(), false))
    }

    /// Apply an `assistant_delta`.
    ///
    /// Extends the last message if it is an assistant turn still streaming.
    /// Otherwise starts a new streaming assistant turn.
    pub fn apply_delta(&mut self, content: &str) -> MessageId {
        if let Some(last) = self.streaming_assistant_mut() {
            last.content.push_str(content);
            return last.id.clone();
        }
        self.push(ChatMessage::new(ChatRole::Assistant, content.to_owned(), true))
    }

    /// Apply an `assistant_done`.
    ///
    /// Ends the streaming turn. When nothing was streaming and `content` is
    /// present, appends it as a complete assistant turn. Returns the ID of
    /// the message that was finished or added.
    pub fn finish(&mut self, content: Option<&str>) -> Option<MessageId> {
        if let Some(last) = self.streaming_assistant_mut() {
            last.streaming = false;
            return Some(last.id.clone());
        }
        let content = content.filter(|c| !c.is_empty())?;
        Some(self.push(ChatMessage::new(ChatRole::Assistant, content.to_owned(), false)))
    }

    /// End any streaming turn without adding content. Used when the chat
    /// backend reports an error mid-reply.
    pub fn interrupt(&mut self) -> bool {
        match self.streaming_assistant_mut() {
            Some(last) => {
                last.streaming = false;
                true
            }
            None => false,
        }
    }

    /// Whether an assistant turn is still streaming.
    pub fn is_streaming(&self) -> bool {
        self.messages
            .last()
            .is_some_and(|m| m.role == ChatRole::Assistant && m.streaming)
    }

    /// All messages in order.
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Most recent message.
    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    /// Number of messages.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether there are no messages.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    fn streaming_assistant_mut(&mut self) -> Option<&mut ChatMessage> {
        self.messages
            .last_mut()
            .filter(|m| m.role == ChatRole::Assistant && m.streaming)
    }

    fn push(&mut self, message: ChatMessage) -> MessageId {
        let id = message.id.clone();
        self.messages.push(message);
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deltas_then_done_make_one_message() {
        let mut t = Transcript::new();
        let a = t.apply_delta("Hel");
        let b = t.apply_delta("lo, ");
        let c = t.apply_delta("world");
        assert_eq!(a, b);
        assert_eq!(b, c);
        assert!(t.is_streaming());

        let done = t.finish(None);
        assert_eq!(done, Some(a));
        assert_eq!(t.len(), 1);
        let msg = t.last().unwrap();
        assert_eq!(msg.content, "Hello, world");
        assert_eq!(msg.role, ChatRole::Assistant);
        assert!(!msg.streaming);
    }

    #[test]
    fn delta_after_user_turn_starts_new_message() {
        let mut t = Transcript::new();
        let _ = t.apply_delta("first");
        let _ = t.finish(None);
        let _ = t.push_user("question");
        let _ = t.apply_delta("second");
        assert_eq!(t.len(), 3);
        assert_eq!(t.messages()[2].content, "second");
    }

    #[test]
    fn delta_after_done_starts_new_message() {
        let mut t = Transcript::new();
        let _ = t.apply_delta("one");
        let _ = t.finish(None);
        let _ = t.apply_delta("two");
        assert_eq!(t.len(), 2);
        assert_eq!(t.messages()[0].content, "one");
        assert_eq!(t.messages()[1].content, "two");
    }

    #[test]
    fn done_with_content_when_not_streaming() {
        let mut t = Transcript::new();
        let id = t.finish(Some("Full reply"));
        assert!(id.is_some());
        assert_eq!(t.len(), 1);
        assert_eq!(t.last().unwrap().content, "Full reply");
        assert!(!t.is_streaming());
    }

    #[test]
    fn done_does_not_duplicate_streamed_content() {
        let mut t = Transcript::new();
        let _ = t.apply_delta("Hi");
        let _ = t.finish(Some("Hi"));
        assert_eq!(t.len(), 1);
        assert_eq!(t.last().unwrap().content, "Hi");
    }

    #[test]
    fn done_without_anything_is_noop() {
        let mut t = Transcript::new();
        assert!(t.finish(None).is_none());
        assert!(t.finish(Some("")).is_none());
        assert!(t.is_empty());
    }

    #[test]
    fn interrupt_ends_stream() {
        let mut t = Transcript::new();
        assert!(!t.interrupt());
        let _ = t.apply_delta("partial");
        assert!(t.interrupt());
        assert!(!t.is_streaming());
        let _ = t.apply_delta("next");
        assert_eq!(t.len(), 2);
    }

    #[test]
    fn system_messages_do_not_stream() {
        let mut t = Transcript::new();
        let _ = t.push_system("Connected");
        let _ = t.apply_delta("x");
        assert_eq!(t.len(), 2);
        assert_eq!(t.messages()[0].role, ChatRole::System);
    }
}
