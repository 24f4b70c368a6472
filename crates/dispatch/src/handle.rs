//! Handle state machine for one submitted execution.
//!
//! ```text
//! Pending ──start──▶ Running ──finish──▶ Completed | Failed
//!    │
//!    └──cancel──▶ Cancelled
//! ```
//!
//! Cancelling a `Running` handle is a no-op: work that already started is
//! never interrupted.

use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use {
    parley_common::types::{ConversationId, EventId},
    tokio::sync::watch,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandleState {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl HandleState {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for HandleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

struct HandleInner {
    event_id: EventId,
    conversation_id: ConversationId,
    state: watch::Sender<HandleState>,
    /// Whether the gate slot admitted with this handle is still held.
    holds_slot: AtomicBool,
}

/// Cancellable reference to one event's execution. Cheap to clone; all
/// clones observe the same state.
#[derive(Clone)]
pub struct Handle {
    inner: Arc<HandleInner>,
}

impl Handle {
    pub(crate) fn new(event_id: EventId, conversation_id: ConversationId) -> Self {
        let (state, _) = watch::channel(HandleState::Pending);
        Self {
            inner: Arc::new(HandleInner {
                event_id,
                conversation_id,
                state,
                holds_slot: AtomicBool::new(true),
            }),
        }
    }

    pub fn event_id(&self) -> EventId {
        self.inner.event_id
    }

    pub fn conversation_id(&self) -> &ConversationId {
        &self.inner.conversation_id
    }

    pub fn state(&self) -> HandleState {
        *self.inner.state.borrow()
    }

    /// Move `from` to `to` atomically; returns whether the move happened.
    fn transition(&self, from: HandleState, to: HandleState) -> bool {
        self.inner.state.send_if_modified(|state| {
            if *state == from {
                *state = to;
                true
            } else {
                false
            }
        })
    }

    /// Prevent a pending handle from ever running. Returns `false` when the
    /// handle already started or finished.
    pub fn cancel(&self) -> bool {
        self.transition(HandleState::Pending, HandleState::Cancelled)
    }

    pub(crate) fn try_start(&self) -> bool {
        self.transition(HandleState::Pending, HandleState::Running)
    }

    pub(crate) fn finish(&self, ok: bool) {
        let to = if ok {
            HandleState::Completed
        } else {
            HandleState::Failed
        };
        self.transition(HandleState::Running, to);
    }

    /// Claim the gate slot this handle was admitted with. Only the first
    /// caller gets `true`; it owns the single release.
    pub(crate) fn take_slot(&self) -> bool {
        self.inner.holds_slot.swap(false, Ordering::AcqRel)
    }

    /// Wait until the handle reaches a terminal state and return it.
    pub async fn wait(&self) -> HandleState {
        let mut rx = self.inner.state.subscribe();
        match rx.wait_for(|state| state.is_terminal()).await {
            Ok(state) => *state,
            // The sender lives in `self`, so the channel cannot close here.
            Err(_) => self.state(),
        }
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("event_id", &self.inner.event_id)
            .field("conversation_id", &self.inner.conversation_id)
            .field("state", &self.state())
            .finish()
    }
}
