use std::{collections::HashMap, sync::Arc};

use {async_trait::async_trait, parley_common::types::Reply, tracing::debug};

use crate::{
    Error, Result,
    plugin::{ReplyContext, ReplySender},
};

/// Routes outbound replies to the sender registered for the event's channel
/// type, so one dispatcher can serve several transports.
#[derive(Default, Clone)]
pub struct SenderRegistry {
    senders: HashMap<String, Arc<dyn ReplySender>>,
}

impl SenderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, channel_type: impl Into<String>, sender: Arc<dyn ReplySender>) {
        let channel_type = channel_type.into();
        debug!(channel_type = %channel_type, "registered reply sender");
        self.senders.insert(channel_type, sender);
    }

    pub fn get(&self, channel_type: &str) -> Option<&Arc<dyn ReplySender>> {
        self.senders.get(channel_type)
    }

    pub fn list(&self) -> Vec<&str> {
        self.senders.keys().map(String::as_str).collect()
    }
}

#[async_trait]
impl ReplySender for SenderRegistry {
    async fn send(&self, reply: &Reply, context: &ReplyContext) -> Result<()> {
        let sender = self.get(&context.channel_type).ok_or_else(|| {
            Error::unsupported(format!("no sender for channel {}", context.channel_type))
        })?;
        sender.send(reply, context).await
    }
}
