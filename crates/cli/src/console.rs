//! Line-oriented console channel driving the dispatcher end to end.
//!
//! Each stdin line is `conversation> text`, `user@group> text`, or plain
//! `text` for the default conversation. `!cancel <id>` and `!cancel-all`
//! are handled locally, `!friend <greeting>` sends a friend request. Replies
//! are echoed back on stdout.

use std::{sync::Arc, time::Duration};

use {
    anyhow::Result,
    async_trait::async_trait,
    parley_channels::{
        BotIdentity, ConfigDecorator, Generated, InboundContent, InboundGroup, InboundMessage,
        ReplyContext, ReplyGenerator, ReplyRequest, ReplySender, SenderRegistry, compose,
        friend_request_reply,
    },
    parley_common::types::{ACCEPT_FRIEND, ConversationId, EventPayload, Reply},
    parley_config::{ParleyConfig, SessionConfig},
    parley_dispatch::{Dispatcher, Pipeline},
    tokio::io::{AsyncBufReadExt, BufReader},
    tracing::{debug, info, warn},
};

pub const CHANNEL: &str = "console";
const DEFAULT_CONVERSATION: &str = "console";
const BOT_NAME: &str = "parley";

/// One parsed console line.
#[derive(Debug, PartialEq, Eq)]
pub enum ConsoleLine {
    Empty,
    Cancel(ConversationId),
    CancelAll,
    FriendRequest(String),
    Message {
        sender: String,
        group: Option<String>,
        text: String,
    },
}

pub fn parse_line(line: &str) -> ConsoleLine {
    let line = line.trim();
    if line.is_empty() {
        return ConsoleLine::Empty;
    }
    if line == "!cancel-all" {
        return ConsoleLine::CancelAll;
    }
    if let Some(greeting) = line.strip_prefix("!friend ") {
        return ConsoleLine::FriendRequest(greeting.trim().to_string());
    }
    if let Some(rest) = line.strip_prefix("!cancel") {
        if rest.is_empty() || rest.starts_with(char::is_whitespace) {
            let id = rest.trim();
            let id = if id.is_empty() {
                DEFAULT_CONVERSATION
            } else {
                id
            };
            return ConsoleLine::Cancel(id.into());
        }
    }

    let (target, text) = match line.split_once("> ") {
        Some((target, text)) if !target.is_empty() && !target.contains(' ') => {
            (target, text.trim())
        },
        _ => (DEFAULT_CONVERSATION, line),
    };
    let (sender, group) = match target.split_once('@') {
        Some((sender, group)) if !sender.is_empty() && !group.is_empty() => {
            (sender, Some(group.to_string()))
        },
        _ => (target, None),
    };
    ConsoleLine::Message {
        sender: sender.to_string(),
        group,
        text: text.to_string(),
    }
}

fn friend_request(greeting: String) -> InboundMessage {
    InboundMessage {
        channel_type: CHANNEL.into(),
        sender_id: DEFAULT_CONVERSATION.into(),
        sender_name: None,
        group: None,
        is_at: false,
        at_list: Vec::new(),
        content: InboundContent::System {
            kind: ACCEPT_FRIEND.into(),
            detail: greeting,
        },
        from_voice: false,
    }
}

fn inbound(sender: String, group: Option<String>, text: String) -> InboundMessage {
    let is_at = text.contains(&format!("@{BOT_NAME}"));
    InboundMessage {
        channel_type: CHANNEL.into(),
        sender_name: Some(sender.clone()),
        sender_id: sender,
        group: group.map(|id| InboundGroup {
            name: id.clone(),
            id,
        }),
        is_at,
        at_list: Vec::new(),
        content: InboundContent::Text { text },
        from_voice: false,
    }
}

/// Replies with whatever it was sent. Commands get an info reply.
#[derive(Default)]
pub struct EchoGenerator {
    session: SessionConfig,
}

impl EchoGenerator {
    pub fn new(session: SessionConfig) -> Self {
        Self { session }
    }
}

#[async_trait]
impl ReplyGenerator for EchoGenerator {
    async fn generate(&self, request: &ReplyRequest) -> parley_channels::Result<Generated> {
        Ok(match &request.payload {
            EventPayload::Text { content } => Generated::Reply(Reply::text(content.clone())),
            EventPayload::Command { name, args } if name == "sleep" => {
                let secs = args.first().and_then(|s| s.parse().ok()).unwrap_or(1);
                tokio::time::sleep(Duration::from_secs(secs)).await;
                Generated::Reply(Reply::info(format!("slept {secs}s")))
            },
            EventPayload::Command { name, args } => {
                Generated::Reply(Reply::info(format!("command {name} {}", args.join(" "))))
            },
            EventPayload::ImageCreate { prompt } => {
                Generated::Reply(Reply::info(format!("would draw: {prompt}")))
            },
            EventPayload::Media { kind, reference } => {
                Generated::Reply(Reply::info(format!("received {kind}: {reference}")))
            },
            EventPayload::System { kind, detail } if kind == ACCEPT_FRIEND => {
                Generated::Reply(friend_request_reply(detail, &self.session))
            },
            EventPayload::System { .. } => Generated::NoReply,
        })
    }
}

/// Prints replies on stdout.
pub struct StdoutSender;

#[async_trait]
impl ReplySender for StdoutSender {
    async fn send(&self, reply: &Reply, context: &ReplyContext) -> parley_channels::Result<()> {
        println!("[{}] {}", context.receiver, reply.content);
        Ok(())
    }
}

pub fn build_dispatcher(config: &ParleyConfig) -> parley_dispatch::Result<Dispatcher> {
    let mut senders = SenderRegistry::new();
    senders.register(CHANNEL, Arc::new(StdoutSender));
    let pipeline = Pipeline::new(
        Arc::new(EchoGenerator::new(config.session.clone())),
        Arc::new(ConfigDecorator::new(config.reply.clone())),
        Arc::new(senders),
    );
    Dispatcher::new(&config.dispatch, pipeline)
}

fn submit(
    dispatcher: &Dispatcher,
    msg: &InboundMessage,
    session: &SessionConfig,
    bot: &BotIdentity,
) {
    let Some(event) = compose(msg, session, bot) else {
        debug!("console message ignored by routing rules");
        return;
    };
    let conversation_id = event.conversation_id.clone();
    if let Err(e) = dispatcher.submit(&conversation_id, event) {
        warn!(conversation_id = %conversation_id, error = %e, "console message rejected");
    }
}

pub async fn run(config: ParleyConfig) -> Result<()> {
    let dispatcher = build_dispatcher(&config)?;
    dispatcher.start();
    let bot = BotIdentity {
        user_id: BOT_NAME.into(),
        name: BOT_NAME.into(),
        display_name: None,
    };

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match parse_line(&line) {
            ConsoleLine::Empty => {},
            ConsoleLine::Cancel(id) => {
                let report = dispatcher.cancel_session(&id);
                eprintln!(
                    "cancelled {id}: {} queued discarded, {} pending cancelled",
                    report.discarded_events, report.cancelled_handles
                );
            },
            ConsoleLine::CancelAll => {
                let report = dispatcher.cancel_all();
                eprintln!(
                    "cancelled all: {} queued discarded, {} pending cancelled",
                    report.discarded_events, report.cancelled_handles
                );
            },
            ConsoleLine::FriendRequest(greeting) => {
                submit(&dispatcher, &friend_request(greeting), &config.session, &bot);
            },
            ConsoleLine::Message {
                sender,
                group,
                text,
            } => {
                submit(&dispatcher, &inbound(sender, group, text), &config.session, &bot);
            },
        }
    }

    info!("stdin closed, draining conversations");
    let poll = config.dispatch.tick_interval();
    tokio::select! {
        () = async {
            while dispatcher.live_conversations() > 0 {
                tokio::time::sleep(poll).await;
            }
        } => {},
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted, cancelling outstanding work");
        },
    }
    dispatcher.shutdown().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use {super::*, parley_common::types::EventOrigin};

    fn message(sender: &str, group: Option<&str>, text: &str) -> ConsoleLine {
        ConsoleLine::Message {
            sender: sender.into(),
            group: group.map(str::to_string),
            text: text.into(),
        }
    }

    #[test]
    fn parses_targets() {
        assert_eq!(parse_line("hello"), message("console", None, "hello"));
        assert_eq!(parse_line("bob> hi there"), message("bob", None, "hi there"));
        assert_eq!(
            parse_line("alice@room> @parley hi"),
            message("alice", Some("room"), "@parley hi")
        );
        // A space before '>' means it is just text.
        assert_eq!(parse_line("a b> c"), message("console", None, "a b> c"));
    }

    #[test]
    fn parses_cancel_commands() {
        assert_eq!(parse_line("   "), ConsoleLine::Empty);
        assert_eq!(parse_line("!cancel-all"), ConsoleLine::CancelAll);
        assert_eq!(parse_line("!cancel bob"), ConsoleLine::Cancel("bob".into()));
        assert_eq!(parse_line("!cancel"), ConsoleLine::Cancel("console".into()));
        assert_eq!(
            parse_line("!cancelled"),
            message("console", None, "!cancelled")
        );
    }

    #[test]
    fn group_lines_compose_into_group_events() {
        let ConsoleLine::Message {
            sender,
            group,
            text,
        } = parse_line("alice@room> @parley hi")
        else {
            panic!("expected a message");
        };
        let msg = inbound(sender, group, text);
        assert!(msg.is_at);
        assert_eq!(msg.group.as_ref().map(|g| g.id.as_str()), Some("room"));
    }

    #[tokio::test]
    async fn echo_replies() {
        let request = |payload| {
            ReplyRequest::from(&parley_common::types::Event::new(
                "c1",
                payload,
                EventOrigin::default(),
            ))
        };
        let out = EchoGenerator::default()
            .generate(&request(EventPayload::text("hi")))
            .await
            .unwrap();
        assert_eq!(out, Generated::Reply(Reply::text("hi")));

        let out = EchoGenerator::default()
            .generate(&request(EventPayload::command("help", vec!["me".into()])))
            .await
            .unwrap();
        assert_eq!(out, Generated::Reply(Reply::info("command help me")));

        let out = EchoGenerator::default()
            .generate(&request(EventPayload::System {
                kind: "joined".into(),
                detail: String::new(),
            }))
            .await
            .unwrap();
        assert_eq!(out, Generated::NoReply);

        let out = EchoGenerator::default()
            .generate(&request(EventPayload::ImageCreate {
                prompt: "a fox".into(),
            }))
            .await
            .unwrap();
        assert_eq!(out, Generated::Reply(Reply::info("would draw: a fox")));
    }

    #[tokio::test]
    async fn friend_requests_get_a_verdict() {
        let session = SessionConfig {
            accept_friend_commands: vec!["hello parley".into()],
            ..Default::default()
        };
        let bot = BotIdentity::default();
        let ConsoleLine::FriendRequest(greeting) = parse_line("!friend hello parley") else {
            panic!("expected a friend request");
        };
        let event = compose(&friend_request(greeting), &session, &bot).unwrap();

        let out = EchoGenerator::new(session)
            .generate(&ReplyRequest::from(&event))
            .await
            .unwrap();
        assert_eq!(
            out,
            Generated::Reply(Reply::new(
                parley_common::types::ReplyKind::AcceptFriend,
                "true"
            ))
        );
    }

    #[test]
    fn dispatcher_builds_from_defaults() {
        assert!(build_dispatcher(&ParleyConfig::default()).is_ok());
    }
}
