//! Handling pipeline for one event: decode, generate, decorate, send.

use std::{sync::Arc, time::Duration};

use {
    parley_channels::{
        Generated, ReplyContext, ReplyDecorator, ReplyGenerator, ReplyRequest, ReplySender,
    },
    parley_common::types::{Event, Reply},
    parley_config::DispatchConfig,
    tracing::{debug, warn},
};

#[cfg(feature = "metrics")]
use parley_metrics::{counter, dispatch as dispatch_metrics};

use crate::error::{Error, Result};

/// Retry schedule for the send step: `base`, `2 * base`, `4 * base`, ...
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&DispatchConfig::default())
    }
}

impl From<&DispatchConfig> for RetryPolicy {
    fn from(config: &DispatchConfig) -> Self {
        Self {
            max_retries: config.send_max_retries,
            base_backoff: config.send_backoff(),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (zero-based).
    #[must_use]
    pub fn backoff(&self, retry: u32) -> Duration {
        self.base_backoff
            .saturating_mul(2u32.saturating_pow(retry.min(16)))
    }
}

/// How a pipeline run ended when it did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Reply delivered after `attempts` send calls.
    Sent { attempts: u32 },
    /// The generator had nothing to say.
    NoReply,
    /// The generator produced a follow-up event to dispatch.
    Redispatch(Event),
}

/// The collaborators an event is handed to, in order.
#[derive(Clone)]
pub struct Pipeline {
    generator: Arc<dyn ReplyGenerator>,
    decorator: Arc<dyn ReplyDecorator>,
    sender: Arc<dyn ReplySender>,
    retry: RetryPolicy,
}

impl Pipeline {
    pub fn new(
        generator: Arc<dyn ReplyGenerator>,
        decorator: Arc<dyn ReplyDecorator>,
        sender: Arc<dyn ReplySender>,
    ) -> Self {
        Self {
            generator,
            decorator,
            sender,
            retry: RetryPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn retry(&self) -> RetryPolicy {
        self.retry
    }

    pub async fn run(&self, event: &Event) -> Result<Outcome> {
        let request = ReplyRequest::from(event);
        let generated = self
            .generator
            .generate(&request)
            .await
            .map_err(|e| Error::pipeline("generate", e))?;

        let reply = match generated {
            Generated::Reply(reply) if !reply.is_empty() => reply,
            Generated::Reply(_) | Generated::NoReply => {
                debug!(event_id = %event.id, "generator produced no reply");
                return Ok(Outcome::NoReply);
            },
            Generated::Redispatch(payload) => {
                return Ok(Outcome::Redispatch(event.derive(payload)));
            },
        };

        let context = ReplyContext::from(event);
        let reply = self
            .decorator
            .decorate(&context, reply)
            .map_err(|e| Error::pipeline("decorate", e))?;

        let attempts = self.send_with_retry(&reply, &context).await?;
        Ok(Outcome::Sent { attempts })
    }

    /// Only the send step is retried; generation already happened and its
    /// side effects must not be repeated.
    async fn send_with_retry(&self, reply: &Reply, context: &ReplyContext) -> Result<u32> {
        let max_retries = self.retry.max_retries;
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            let err = match self.sender.send(reply, context).await {
                Ok(()) => return Ok(attempts),
                Err(err) => err,
            };

            let retries = attempts - 1;
            if !err.is_retryable() || retries >= max_retries {
                warn!(
                    conversation_id = %context.conversation_id,
                    event_id = %context.event_id,
                    attempts,
                    retryable = err.is_retryable(),
                    error = %err,
                    "reply send failed"
                );
                #[cfg(feature = "metrics")]
                counter!(dispatch_metrics::SEND_FAILURES_TOTAL).increment(1);
                return Err(Error::Send {
                    attempts,
                    source: err,
                });
            }

            let wait = self.retry.backoff(retries);
            warn!(
                conversation_id = %context.conversation_id,
                event_id = %context.event_id,
                attempt = attempts,
                max_retries,
                backoff_ms = wait.as_millis() as u64,
                error = %err,
                "reply send failed, waiting before retry"
            );
            #[cfg(feature = "metrics")]
            counter!(dispatch_metrics::SEND_RETRIES_TOTAL).increment(1);
            tokio::time::sleep(wait).await;
        }
    }
}
