//! Turning raw platform messages into dispatcher events.
//!
//! Transport adapters call [`compose`] with whatever they parsed off the
//! wire. It decides which conversation the message belongs to, whether it
//! should trigger the bot at all, and whether it is an administrative
//! command (a priority event).

use {
    parley_common::types::{
        ACCEPT_FRIEND, Event, EventOrigin, EventPayload, MediaKind, Reply, ReplyKind,
    },
    parley_config::{SessionConfig, schema::ALL_GROUP},
    serde::{Deserialize, Serialize},
    tracing::debug,
};

#[cfg(feature = "metrics")]
use parley_metrics::{channels as ch_metrics, counter, labels};

use crate::gating::{
    check_contain, check_prefix, is_listed, strip_leading_mentions, strip_mention_of,
};

/// The bot's own identity on a transport, used to drop self-authored
/// messages and strip mentions of the bot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BotIdentity {
    pub user_id: String,
    pub name: String,
    /// Group-specific display name, when it differs from `name`.
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundGroup {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundContent {
    Text { text: String },
    Media { kind: MediaKind, reference: String },
    System { kind: String, detail: String },
}

/// A platform message as parsed by a transport adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub channel_type: String,
    pub sender_id: String,
    pub sender_name: Option<String>,
    /// Set when the message was posted in a group.
    pub group: Option<InboundGroup>,
    /// Whether the bot was @-mentioned.
    #[serde(default)]
    pub is_at: bool,
    /// Names mentioned in the message.
    #[serde(default)]
    pub at_list: Vec<String>,
    pub content: InboundContent,
    /// Text produced by transcribing a voice message.
    #[serde(default)]
    pub from_voice: bool,
}

/// Build a dispatcher event from an inbound message, or `None` when the
/// routing rules say the bot must not react to it.
pub fn compose(msg: &InboundMessage, cfg: &SessionConfig, bot: &BotIdentity) -> Option<Event> {
    #[cfg(feature = "metrics")]
    counter!(ch_metrics::MESSAGES_RECEIVED_TOTAL, labels::CHANNEL => msg.channel_type.clone())
        .increment(1);

    let event = compose_inner(msg, cfg, bot);

    #[cfg(feature = "metrics")]
    {
        if event.is_none() {
            counter!(ch_metrics::MESSAGES_IGNORED_TOTAL, labels::CHANNEL => msg.channel_type.clone())
                .increment(1);
        }
    }

    event
}

/// Verdict on a friend request: accepted only when the greeting equals one
/// of `accept_friend_commands`.
pub fn friend_request_reply(greeting: &str, cfg: &SessionConfig) -> Reply {
    let accepted = cfg
        .accept_friend_commands
        .iter()
        .any(|c| c == greeting.trim());
    debug!(accepted, "friend request verdict");
    Reply::new(ReplyKind::AcceptFriend, accepted.to_string())
}

fn compose_inner(msg: &InboundMessage, cfg: &SessionConfig, bot: &BotIdentity) -> Option<Event> {
    // Friend requests skip every routing rule.
    if let InboundContent::System { kind, detail } = &msg.content {
        if kind == ACCEPT_FRIEND {
            debug!(sender = %msg.sender_id, "friend request");
            let payload = EventPayload::System {
                kind: kind.clone(),
                detail: detail.clone(),
            };
            let origin = origin(msg, msg.sender_id.clone(), None);
            return Some(Event::new(msg.sender_id.clone(), payload, origin));
        }
    }

    let from_self = !bot.user_id.is_empty() && msg.sender_id == bot.user_id;

    let (conversation_id, receiver) = match &msg.group {
        Some(group) => {
            if !group_admitted(&group.name, cfg) {
                debug!(group = %group.name, "group not in whitelist, ignoring");
                return None;
            }
            if from_self {
                debug!(group = %group.name, "ignoring own message in group");
                return None;
            }
            let shared = cfg
                .group_chat_in_one_session
                .iter()
                .any(|g| g == &group.name || g == ALL_GROUP);
            let conversation_id = if shared {
                group.id.clone()
            } else {
                format!("{}@@{}", msg.sender_id, group.id)
            };
            (conversation_id, group.id.clone())
        },
        None => {
            if from_self && !cfg.trigger_by_self {
                debug!("ignoring own direct message");
                return None;
            }
            (msg.sender_id.clone(), msg.sender_id.clone())
        },
    };

    let (payload, wants_voice) = match &msg.content {
        InboundContent::Text { text } => {
            (text_payload(msg, text, cfg, bot)?, cfg.always_reply_voice)
        },
        InboundContent::Media { kind, reference } => (
            EventPayload::Media {
                kind: *kind,
                reference: reference.clone(),
            },
            *kind == MediaKind::Voice && cfg.voice_reply_voice,
        ),
        InboundContent::System { kind, detail } => (
            EventPayload::System {
                kind: kind.clone(),
                detail: detail.clone(),
            },
            false,
        ),
    };

    let desired_reply = wants_voice.then_some(ReplyKind::Voice);
    Some(Event::new(
        conversation_id,
        payload,
        origin(msg, receiver, desired_reply),
    ))
}

fn origin(
    msg: &InboundMessage,
    receiver: String,
    desired_reply: Option<ReplyKind>,
) -> EventOrigin {
    EventOrigin {
        channel_type: msg.channel_type.clone(),
        receiver,
        sender_id: msg.sender_id.clone(),
        sender_name: msg.sender_name.clone(),
        is_group: msg.group.is_some(),
        group_name: msg.group.as_ref().map(|g| g.name.clone()),
        derived_from_voice: msg.from_voice,
        desired_reply,
    }
}

fn group_admitted(name: &str, cfg: &SessionConfig) -> bool {
    cfg.group_name_white_list
        .iter()
        .any(|g| g == name || g == ALL_GROUP)
        || check_contain(name, &cfg.group_name_keyword_white_list)
}

fn text_payload(
    msg: &InboundMessage,
    text: &str,
    cfg: &SessionConfig,
    bot: &BotIdentity,
) -> Option<EventPayload> {
    if let Some(name) = msg
        .sender_name
        .as_deref()
        .filter(|n| is_listed(n, &cfg.nick_name_black_list))
    {
        debug!(sender = %name, "sender nickname is blacklisted, ignoring");
        return None;
    }

    let content = if msg.group.is_some() {
        group_text(msg, text, cfg, bot)?
    } else if let Some(prefix) = check_prefix(text, &cfg.single_chat_prefix) {
        text.replacen(prefix, "", 1)
    } else if msg.from_voice {
        // Transcribed voice does not need the trigger prefix.
        text.to_string()
    } else {
        debug!("direct message without trigger prefix, ignoring");
        return None;
    };

    let content = content.trim();
    if content.is_empty() {
        return None;
    }

    if let Some(command) = command_payload(content, &cfg.command_prefix) {
        return Some(command);
    }
    if let Some(prefix) = check_prefix(content, &cfg.image_create_prefix) {
        let prompt = content.replacen(prefix, "", 1).trim().to_string();
        if !prompt.is_empty() {
            return Some(EventPayload::ImageCreate { prompt });
        }
    }
    Some(EventPayload::text(content))
}

fn group_text(
    msg: &InboundMessage,
    text: &str,
    cfg: &SessionConfig,
    bot: &BotIdentity,
) -> Option<String> {
    let mut content = text.to_string();
    let mut triggered = false;

    if let Some(prefix) = check_prefix(text, &cfg.group_chat_prefix) {
        triggered = true;
        content = content.replacen(prefix, "", 1).trim().to_string();
    }
    if check_contain(text, &cfg.group_chat_keyword) {
        triggered = true;
    }

    if msg.is_at {
        if !cfg.group_at_off {
            triggered = true;
        }
        content = strip_mention_of(&content, &bot.name);
        for name in &msg.at_list {
            content = strip_mention_of(&content, name);
        }
        if let Some(display) = &bot.display_name {
            content = strip_mention_of(&content, display);
        }
        content = strip_leading_mentions(&content).to_string();
    }

    if !triggered {
        debug!("group message matched no trigger, ignoring");
        return None;
    }
    Some(content)
}

/// Parse `#name arg1 arg2` into a command payload.
fn command_payload(content: &str, prefix: &str) -> Option<EventPayload> {
    if prefix.is_empty() {
        return None;
    }
    let body = content.strip_prefix(prefix)?;
    let mut parts = body.split_whitespace();
    let name = parts.next()?;
    Some(EventPayload::command(name, parts.map(str::to_string).collect()))
}
