//! Conversation events and replies exchanged between channel adapters,
//! the dispatcher, and reply generation.

use std::{
    fmt,
    str::FromStr,
    time::{SystemTime, UNIX_EPOCH},
};

use {
    serde::{Deserialize, Serialize},
    uuid::Uuid,
};

use crate::error::Error;

/// Milliseconds since the Unix epoch.
#[must_use]
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

// ── Identifiers ─────────────────────────────────────────────────────────────

/// Opaque key of one logical conversation: a direct chat, one user's thread
/// inside a group, or a whole group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(String);

impl ConversationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConversationId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ConversationId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Unique identifier of a single inbound event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Uuid);

impl EventId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ── Event ───────────────────────────────────────────────────────────────────

/// Admission priority. Administrative commands jump the conversation queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    #[default]
    Normal,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Voice,
    Video,
    File,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Image => "image",
            Self::Voice => "voice",
            Self::Video => "video",
            Self::File => "file",
        };
        f.write_str(s)
    }
}

/// System event kind of an incoming friend request.
pub const ACCEPT_FRIEND: &str = "accept_friend";

/// What an inbound event carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    Text {
        content: String,
    },
    /// Reference to media the adapter has already stored (path or URL).
    Media {
        kind: MediaKind,
        reference: String,
    },
    /// Request to generate an image from a text prompt.
    ImageCreate {
        prompt: String,
    },
    /// Administrative command, e.g. `#reset` or `#model gpt-4o`.
    Command {
        name: String,
        #[serde(default)]
        args: Vec<String>,
    },
    /// Platform notification (friend request, member joined, ...).
    System {
        kind: String,
        #[serde(default)]
        detail: String,
    },
}

impl EventPayload {
    pub fn text(content: impl Into<String>) -> Self {
        Self::Text {
            content: content.into(),
        }
    }

    pub fn command(name: impl Into<String>, args: Vec<String>) -> Self {
        Self::Command {
            name: name.into(),
            args,
        }
    }

    #[must_use]
    pub fn priority(&self) -> Priority {
        match self {
            Self::Command { .. } => Priority::High,
            _ => Priority::Normal,
        }
    }

    /// Reason this payload cannot be dispatched, if any.
    pub fn defect(&self) -> Option<&'static str> {
        match self {
            Self::Text { content } if content.trim().is_empty() => Some("empty text"),
            Self::Media { reference, .. } if reference.trim().is_empty() => {
                Some("empty media reference")
            },
            Self::ImageCreate { prompt } if prompt.trim().is_empty() => Some("empty image prompt"),
            Self::Command { name, .. } if name.trim().is_empty() => Some("empty command name"),
            Self::System { kind, .. } if kind.trim().is_empty() => Some("empty system event kind"),
            _ => None,
        }
    }
}

/// Where an event came from and where its reply goes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventOrigin {
    /// Channel identifier (e.g. "wechat", "telegram", "console").
    pub channel_type: String,
    /// Chat or peer the reply is sent to.
    pub receiver: String,
    pub sender_id: String,
    pub sender_name: Option<String>,
    pub is_group: bool,
    pub group_name: Option<String>,
    /// Set on text events produced by transcribing a voice message.
    #[serde(default)]
    pub derived_from_voice: bool,
    /// Reply kind the sender should get back, when the channel asks for one.
    /// Generators may ignore it.
    #[serde(default)]
    pub desired_reply: Option<ReplyKind>,
}

/// One immutable unit of inbound work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub conversation_id: ConversationId,
    pub payload: EventPayload,
    pub origin: EventOrigin,
    pub received_at_ms: u64,
    pub priority: Priority,
}

impl Event {
    /// Build an event; priority follows from the payload.
    pub fn new(
        conversation_id: impl Into<ConversationId>,
        payload: EventPayload,
        origin: EventOrigin,
    ) -> Self {
        let priority = payload.priority();
        Self {
            id: EventId::new(),
            conversation_id: conversation_id.into(),
            payload,
            origin,
            received_at_ms: now_ms(),
            priority,
        }
    }

    /// Derive a follow-up event for the same conversation, e.g. the text
    /// transcribed from a voice message. The follow-up is always normal
    /// priority and never replaces `self`.
    #[must_use]
    pub fn derive(&self, payload: EventPayload) -> Self {
        let mut origin = self.origin.clone();
        if matches!(
            self.payload,
            EventPayload::Media {
                kind: MediaKind::Voice,
                ..
            }
        ) {
            origin.derived_from_voice = true;
        }
        Self {
            id: EventId::new(),
            conversation_id: self.conversation_id.clone(),
            payload,
            origin,
            received_at_ms: now_ms(),
            priority: Priority::Normal,
        }
    }

    pub fn is_priority(&self) -> bool {
        self.priority == Priority::High
    }
}

// ── Reply ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyKind {
    Text,
    Error,
    Info,
    Image,
    ImageUrl,
    Voice,
    File,
    Video,
    VideoUrl,
    /// Verdict on a friend request; content is `true` or `false`.
    AcceptFriend,
}

impl ReplyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Error => "error",
            Self::Info => "info",
            Self::Image => "image",
            Self::ImageUrl => "image_url",
            Self::Voice => "voice",
            Self::File => "file",
            Self::Video => "video",
            Self::VideoUrl => "video_url",
            Self::AcceptFriend => "accept_friend",
        }
    }

    pub fn is_media(&self) -> bool {
        !matches!(
            self,
            Self::Text | Self::Error | Self::Info | Self::AcceptFriend
        )
    }
}

impl fmt::Display for ReplyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReplyKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "text" => Self::Text,
            "error" => Self::Error,
            "info" => Self::Info,
            "image" => Self::Image,
            "image_url" => Self::ImageUrl,
            "voice" => Self::Voice,
            "file" => Self::File,
            "video" => Self::Video,
            "video_url" => Self::VideoUrl,
            "accept_friend" => Self::AcceptFriend,
            _ => return Err(Error::parse("reply kind", s)),
        })
    }
}

/// Outbound reply produced for an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    pub kind: ReplyKind,
    /// Text body, or a path/URL for media kinds.
    pub content: String,
}

impl Reply {
    pub fn new(kind: ReplyKind, content: impl Into<String>) -> Self {
        Self {
            kind,
            content: content.into(),
        }
    }

    pub fn text(content: impl Into<String>) -> Self {
        Self::new(ReplyKind::Text, content)
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self::new(ReplyKind::Error, content)
    }

    pub fn info(content: impl Into<String>) -> Self {
        Self::new(ReplyKind::Info, content)
    }

    pub fn is_empty(&self) -> bool {
        self.content.trim().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origin() -> EventOrigin {
        EventOrigin {
            channel_type: "console".into(),
            receiver: "alice".into(),
            sender_id: "alice".into(),
            ..Default::default()
        }
    }

    #[test]
    fn commands_are_priority() {
        let ev = Event::new("c1", EventPayload::command("reset", vec![]), origin());
        assert!(ev.is_priority());

        let ev = Event::new("c1", EventPayload::text("hello"), origin());
        assert_eq!(ev.priority, Priority::Normal);
    }

    #[test]
    fn derive_keeps_conversation_and_marks_voice() {
        let voice = Event::new(
            "c1",
            EventPayload::Media {
                kind: MediaKind::Voice,
                reference: "/tmp/a.silk".into(),
            },
            origin(),
        );
        let text = voice.derive(EventPayload::text("transcribed"));
        assert_eq!(text.conversation_id, voice.conversation_id);
        assert_ne!(text.id, voice.id);
        assert!(text.origin.derived_from_voice);
        assert!(!voice.origin.derived_from_voice);
    }

    #[test]
    fn derived_events_are_never_priority() {
        let cmd = Event::new("c1", EventPayload::command("reset", vec![]), origin());
        let follow = cmd.derive(EventPayload::command("again", vec![]));
        assert_eq!(follow.priority, Priority::Normal);
    }

    #[test]
    fn payload_defects() {
        assert_eq!(EventPayload::text("  ").defect(), Some("empty text"));
        assert_eq!(EventPayload::command("", vec![]).defect(), Some("empty command name"));
        assert_eq!(
            EventPayload::ImageCreate { prompt: " ".into() }.defect(),
            Some("empty image prompt")
        );
        assert!(EventPayload::text("hi").defect().is_none());
    }

    #[test]
    fn reply_kind_parses() {
        assert_eq!("IMAGE_URL".parse::<ReplyKind>().unwrap(), ReplyKind::ImageUrl);
        assert!("sticker".parse::<ReplyKind>().is_err());
        assert!(ReplyKind::Voice.is_media());
        assert!(!ReplyKind::Info.is_media());
        assert_eq!(
            "accept_friend".parse::<ReplyKind>().unwrap(),
            ReplyKind::AcceptFriend
        );
        assert!(!ReplyKind::AcceptFriend.is_media());
    }

    #[test]
    fn event_id_serializes_as_uuid_string() {
        let ev = Event::new("c1", EventPayload::text("hi"), origin());
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["id"], ev.id.to_string());
        let back: Event = serde_json::from_value(json).unwrap();
        assert_eq!(back.id, ev.id);
    }

    #[test]
    fn payload_serializes_tagged() {
        let json = serde_json::to_value(EventPayload::text("hi")).unwrap();
        assert_eq!(json["type"], "text");
        assert_eq!(json["content"], "hi");
    }
}
