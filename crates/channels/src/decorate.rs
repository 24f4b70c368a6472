use std::collections::HashSet;

use {
    parley_common::types::{Reply, ReplyKind},
    parley_config::ReplyConfig,
    tracing::warn,
};

use crate::{
    Result,
    plugin::{ReplyContext, ReplyDecorator},
};

/// Config-driven reply decoration: @-mentions and prefixes/suffixes on text,
/// a tag on error and info replies, and downgrading of reply kinds the
/// transport cannot deliver.
#[derive(Debug, Clone)]
pub struct ConfigDecorator {
    config: ReplyConfig,
    unsupported: HashSet<ReplyKind>,
}

impl ConfigDecorator {
    pub fn new(config: ReplyConfig) -> Self {
        let unsupported = config
            .unsupported_kinds
            .iter()
            .filter_map(|kind| match kind.parse() {
                Ok(kind) => Some(kind),
                Err(e) => {
                    warn!(error = %e, "ignoring unknown entry in reply.unsupported_kinds");
                    None
                },
            })
            .collect();
        Self {
            config,
            unsupported,
        }
    }

    fn decorate_text(&self, context: &ReplyContext, content: &str) -> String {
        let cfg = &self.config;
        if context.is_group {
            let body = if cfg.no_need_at {
                content.to_string()
            } else {
                let name = context
                    .sender_name
                    .as_deref()
                    .filter(|n| !n.is_empty())
                    .unwrap_or(&context.sender_id);
                format!("@{name}\n{}", content.trim())
            };
            format!(
                "{}{body}{}",
                cfg.group_chat_reply_prefix, cfg.group_chat_reply_suffix
            )
        } else {
            format!(
                "{}{content}{}",
                cfg.single_chat_reply_prefix, cfg.single_chat_reply_suffix
            )
        }
    }
}

impl ReplyDecorator for ConfigDecorator {
    fn decorate(&self, context: &ReplyContext, reply: Reply) -> Result<Reply> {
        let reply = if self.unsupported.contains(&reply.kind) {
            warn!(
                conversation_id = %context.conversation_id,
                kind = %reply.kind,
                "reply kind not supported by channel"
            );
            Reply::error(format!("unsupported reply kind: {}", reply.kind))
        } else {
            reply
        };

        let content = match reply.kind {
            ReplyKind::Text => self.decorate_text(context, &reply.content),
            ReplyKind::Error | ReplyKind::Info => format!(
                "[{}]\n{}",
                reply.kind.as_str().to_ascii_uppercase(),
                reply.content
            ),
            _ => return Ok(reply),
        };
        Ok(Reply::new(reply.kind, content))
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        parley_common::types::{Event, EventOrigin, EventPayload},
    };

    fn context(is_group: bool) -> ReplyContext {
        ReplyContext::from(&Event::new(
            "c1",
            EventPayload::text("hi"),
            EventOrigin {
                channel_type: "wechat".into(),
                receiver: "room".into(),
                sender_id: "alice".into(),
                sender_name: Some("Alice".into()),
                is_group,
                ..Default::default()
            },
        ))
    }

    fn decorator() -> ConfigDecorator {
        ConfigDecorator::new(ReplyConfig {
            single_chat_reply_prefix: "[bot] ".into(),
            group_chat_reply_suffix: " ~".into(),
            unsupported_kinds: vec!["voice".into(), "bogus".into()],
            ..Default::default()
        })
    }

    #[test]
    fn direct_text_gets_single_prefix() {
        let out = decorator()
            .decorate(&context(false), Reply::text("hello"))
            .unwrap();
        assert_eq!(out, Reply::text("[bot] hello"));
    }

    #[test]
    fn group_text_mentions_sender() {
        let out = decorator()
            .decorate(&context(true), Reply::text(" hello "))
            .unwrap();
        assert_eq!(out.content, "@Alice\nhello ~");
    }

    #[test]
    fn group_text_without_mention() {
        let deco = ConfigDecorator::new(ReplyConfig {
            no_need_at: true,
            ..Default::default()
        });
        let out = deco.decorate(&context(true), Reply::text("hello")).unwrap();
        assert_eq!(out.content, "hello");
    }

    #[test]
    fn error_and_info_are_tagged() {
        let out = decorator()
            .decorate(&context(false), Reply::error("boom"))
            .unwrap();
        assert_eq!(out.content, "[ERROR]\nboom");
        let out = decorator()
            .decorate(&context(false), Reply::info("fyi"))
            .unwrap();
        assert_eq!(out.content, "[INFO]\nfyi");
    }

    #[test]
    fn unsupported_kind_becomes_error() {
        let out = decorator()
            .decorate(&context(false), Reply::new(ReplyKind::Voice, "/tmp/a.mp3"))
            .unwrap();
        assert_eq!(out.kind, ReplyKind::Error);
        assert_eq!(out.content, "[ERROR]\nunsupported reply kind: voice");
    }

    #[test]
    fn media_passes_through() {
        let reply = Reply::new(ReplyKind::ImageUrl, "https://example.com/cat.png");
        let out = decorator().decorate(&context(true), reply.clone()).unwrap();
        assert_eq!(out, reply);
    }
}
