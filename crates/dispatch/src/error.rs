use parley_common::types::ConversationId;

/// Crate-wide result type for dispatcher operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Failures surfaced by the dispatcher.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed input, rejected at submission and never queued.
    #[error("invalid event: {reason}")]
    InvalidEvent { reason: String },

    /// A gate slot was released without a matching acquire.
    #[error(
        "gate accounting violated for conversation {conversation_id}: release without acquire (capacity {capacity})"
    )]
    GateAccounting {
        conversation_id: ConversationId,
        capacity: usize,
    },

    /// Reply generation or decoration failed.
    #[error("pipeline failed at {stage}: {source}")]
    Pipeline {
        stage: &'static str,
        #[source]
        source: parley_channels::Error,
    },

    /// Delivery failed after all retries.
    #[error("send failed after {attempts} attempt(s): {source}")]
    Send {
        attempts: u32,
        #[source]
        source: parley_channels::Error,
    },

    #[error("invalid dispatch config: {message}")]
    InvalidConfig { message: String },

    #[error("execution pool is closed")]
    PoolClosed,
}

impl Error {
    #[must_use]
    pub fn invalid_event(reason: impl Into<String>) -> Self {
        Self::InvalidEvent {
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn gate_accounting(conversation_id: ConversationId, capacity: usize) -> Self {
        Self::GateAccounting {
            conversation_id,
            capacity,
        }
    }

    #[must_use]
    pub fn pipeline(stage: &'static str, source: parley_channels::Error) -> Self {
        Self::Pipeline { stage, source }
    }

    #[must_use]
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Label used for metrics and logs.
    #[must_use]
    pub fn stage(&self) -> &'static str {
        match self {
            Self::InvalidEvent { .. } => "submit",
            Self::GateAccounting { .. } => "gate",
            Self::Pipeline { stage, .. } => stage,
            Self::Send { .. } => "send",
            Self::InvalidConfig { .. } => "config",
            Self::PoolClosed => "pool",
        }
    }
}
