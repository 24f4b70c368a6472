/// Config schema types (dispatch, session routing, reply decoration, metrics).
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Group name that matches every group in whitelist-style lists.
pub const ALL_GROUP: &str = "ALL_GROUP";

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ParleyConfig {
    pub dispatch: DispatchConfig,
    pub session: SessionConfig,
    pub reply: ReplyConfig,
    pub metrics: MetricsConfig,
}

/// Dispatcher concurrency and retry settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Maximum events of one conversation executing at once. Default 4.
    pub concurrency_in_session: usize,
    /// Period of the dispatch loop in milliseconds. Default 200.
    pub tick_interval_ms: u64,
    /// Number of execution pool workers. Default 8.
    pub pool_workers: usize,
    /// Extra send attempts after the first failure. Default 2.
    pub send_max_retries: u32,
    /// Delay before the first send retry; doubles on each further retry. Default 3000.
    pub send_backoff_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            concurrency_in_session: 4,
            tick_interval_ms: 200,
            pool_workers: 8,
            send_max_retries: 2,
            send_backoff_ms: 3_000,
        }
    }
}

impl DispatchConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn send_backoff(&self) -> Duration {
        Duration::from_millis(self.send_backoff_ms)
    }
}

/// How inbound platform messages map onto conversations, and which ones
/// trigger the bot at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Prefixes that trigger a reply in direct chats. `[""]` means any text.
    pub single_chat_prefix: Vec<String>,
    /// Prefixes that trigger a reply in groups.
    pub group_chat_prefix: Vec<String>,
    /// Keywords that trigger a reply in groups when contained anywhere.
    pub group_chat_keyword: Vec<String>,
    /// Groups the bot answers in. [`ALL_GROUP`] admits every group.
    pub group_name_white_list: Vec<String>,
    /// Groups whose name contains one of these keywords are admitted too.
    pub group_name_keyword_white_list: Vec<String>,
    /// Groups whose members share one conversation. [`ALL_GROUP`] applies to all.
    pub group_chat_in_one_session: Vec<String>,
    /// Sender nicknames that are ignored (glob `*` supported).
    pub nick_name_black_list: Vec<String>,
    /// When true, an @-mention alone does not trigger a group reply.
    pub group_at_off: bool,
    /// Text starting with this prefix is an administrative command.
    pub command_prefix: String,
    /// Whether the bot's own direct messages are dispatched.
    pub trigger_by_self: bool,
    /// Text starting with one of these prefixes asks for a generated image.
    pub image_create_prefix: Vec<String>,
    /// Ask for voice replies to every text message.
    pub always_reply_voice: bool,
    /// Ask for voice replies to voice messages.
    pub voice_reply_voice: bool,
    /// Friend requests whose greeting equals one of these are accepted.
    pub accept_friend_commands: Vec<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            single_chat_prefix: vec![String::new()],
            group_chat_prefix: vec!["@bot".into()],
            group_chat_keyword: Vec::new(),
            group_name_white_list: Vec::new(),
            group_name_keyword_white_list: Vec::new(),
            group_chat_in_one_session: Vec::new(),
            nick_name_black_list: Vec::new(),
            group_at_off: false,
            command_prefix: "#".into(),
            trigger_by_self: true,
            image_create_prefix: Vec::new(),
            always_reply_voice: false,
            voice_reply_voice: false,
            accept_friend_commands: Vec::new(),
        }
    }
}

/// Reply decoration applied before sending.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplyConfig {
    pub single_chat_reply_prefix: String,
    pub single_chat_reply_suffix: String,
    pub group_chat_reply_prefix: String,
    pub group_chat_reply_suffix: String,
    /// Skip the `@sender` line on group text replies.
    pub no_need_at: bool,
    /// Reply kinds the transport cannot deliver (e.g. `["voice", "video"]`).
    pub unsupported_kinds: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
}
