use {
    async_trait::async_trait,
    parley_common::types::{
        ConversationId, Event, EventId, EventOrigin, EventPayload, Priority, Reply,
    },
    serde::Serialize,
};

use crate::Result;

// ── Pipeline inputs ─────────────────────────────────────────────────────────

/// Structured request handed to the reply generator, decoded from an event.
#[derive(Debug, Clone, Serialize)]
pub struct ReplyRequest {
    pub event_id: EventId,
    pub conversation_id: ConversationId,
    pub payload: EventPayload,
    pub origin: EventOrigin,
    pub priority: Priority,
    pub received_at_ms: u64,
}

impl From<&Event> for ReplyRequest {
    fn from(event: &Event) -> Self {
        Self {
            event_id: event.id,
            conversation_id: event.conversation_id.clone(),
            payload: event.payload.clone(),
            origin: event.origin.clone(),
            priority: event.priority,
            received_at_ms: event.received_at_ms,
        }
    }
}

/// Where a reply goes and who it answers; shared by decoration and sending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplyContext {
    pub event_id: EventId,
    pub conversation_id: ConversationId,
    pub channel_type: String,
    /// Chat/peer ID to send the reply to.
    pub receiver: String,
    pub sender_id: String,
    pub sender_name: Option<String>,
    pub is_group: bool,
}

impl From<&Event> for ReplyContext {
    fn from(event: &Event) -> Self {
        Self {
            event_id: event.id,
            conversation_id: event.conversation_id.clone(),
            channel_type: event.origin.channel_type.clone(),
            receiver: event.origin.receiver.clone(),
            sender_id: event.origin.sender_id.clone(),
            sender_name: event.origin.sender_name.clone(),
            is_group: event.origin.is_group,
        }
    }
}

/// What the reply generator decided to do with a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Generated {
    /// Send this reply.
    Reply(Reply),
    /// Nothing to send (e.g. a stored image awaiting a follow-up question).
    NoReply,
    /// Dispatch a new event for the same conversation, e.g. text transcribed
    /// from a voice message.
    Redispatch(EventPayload),
}

// ── Collaborators ───────────────────────────────────────────────────────────

/// Decides what to reply. May be slow; its own timeouts and retries are its
/// business, the dispatcher reports a failure and moves on.
#[async_trait]
pub trait ReplyGenerator: Send + Sync {
    async fn generate(&self, request: &ReplyRequest) -> Result<Generated>;
}

/// Pure transform applied to a reply before sending. Must not block on I/O.
pub trait ReplyDecorator: Send + Sync {
    fn decorate(&self, context: &ReplyContext, reply: Reply) -> Result<Reply>;
}

/// Delivers a reply to the remote transport.
#[async_trait]
pub trait ReplySender: Send + Sync {
    async fn send(&self, reply: &Reply, context: &ReplyContext) -> Result<()>;
}

/// Decorator that returns replies unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughDecorator;

impl ReplyDecorator for PassthroughDecorator {
    fn decorate(&self, _context: &ReplyContext, reply: Reply) -> Result<Reply> {
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_follows_origin() {
        let event = Event::new(
            "alice@@room",
            EventPayload::text("hi"),
            EventOrigin {
                channel_type: "wechat".into(),
                receiver: "room".into(),
                sender_id: "alice".into(),
                sender_name: Some("Alice".into()),
                is_group: true,
                ..Default::default()
            },
        );
        let ctx = ReplyContext::from(&event);
        assert_eq!(ctx.receiver, "room");
        assert_eq!(ctx.conversation_id.as_str(), "alice@@room");
        assert!(ctx.is_group);

        let req = ReplyRequest::from(&event);
        assert_eq!(req.event_id, event.id);
        assert_eq!(req.payload, EventPayload::text("hi"));
    }
}
