//! Conversation registry: live per-conversation state keyed by id.
//!
//! Each entry is only touched through a shard guard of the map, so per-entry
//! reads, updates and the idle check before removal are exclusive with
//! respect to concurrent enqueues. Nothing here awaits while a guard is held.

use std::collections::HashMap;

use {
    dashmap::{DashMap, mapref::one::RefMut},
    parley_common::types::{ConversationId, Event, EventId},
};

use crate::{error::Result, gate::ConcurrencyGate, handle::Handle, queue::AdmissionQueue};

/// Queue, gate, and in-flight handles of one conversation.
#[derive(Debug)]
pub struct ConversationState {
    pub queue: AdmissionQueue,
    pub gate: ConcurrencyGate,
    pub in_flight: HashMap<EventId, Handle>,
}

impl ConversationState {
    pub fn new(conversation_id: ConversationId, capacity: usize) -> Self {
        Self {
            queue: AdmissionQueue::new(),
            gate: ConcurrencyGate::new(conversation_id, capacity),
            in_flight: HashMap::new(),
        }
    }

    /// Forget `handle` and give its gate slot back.
    pub fn release(&mut self, handle: &Handle) -> Result<()> {
        self.in_flight.remove(&handle.event_id());
        self.gate.release()
    }

    /// Nothing queued, nothing executing, and every gate slot free.
    pub fn is_idle(&self) -> bool {
        self.queue.is_empty() && self.gate.is_fully_idle() && self.in_flight.is_empty()
    }
}

pub struct ConversationRegistry {
    conversations: DashMap<ConversationId, ConversationState>,
    capacity: usize,
}

impl ConversationRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            conversations: DashMap::new(),
            capacity,
        }
    }

    /// Existing state for `id`, or a fresh one stored atomically.
    pub fn get_or_create(
        &self,
        conversation_id: &ConversationId,
    ) -> RefMut<'_, ConversationId, ConversationState> {
        self.conversations
            .entry(conversation_id.clone())
            .or_insert_with(|| ConversationState::new(conversation_id.clone(), self.capacity))
    }

    /// Queue `event` under its conversation, creating the entry if it was
    /// never seen or has just been reaped. Returns the new queue depth.
    pub fn enqueue(&self, event: Event) -> usize {
        let mut state = self.get_or_create(&event.conversation_id);
        state.queue.enqueue(event);
        state.queue.len()
    }

    /// Run `f` with exclusive access to an existing entry.
    pub fn with_state<R>(
        &self,
        conversation_id: &ConversationId,
        f: impl FnOnce(&mut ConversationState) -> R,
    ) -> Option<R> {
        self.conversations
            .get_mut(conversation_id)
            .map(|mut state| f(&mut state))
    }

    /// Remove the entry if, and only if, it is idle. The check and the
    /// removal happen under the same guard.
    pub fn remove_if_idle(&self, conversation_id: &ConversationId) -> bool {
        self.conversations
            .remove_if(conversation_id, |_, state| state.is_idle())
            .is_some()
    }

    /// Snapshot of live conversation ids.
    pub fn ids(&self) -> Vec<ConversationId> {
        self.conversations.iter().map(|e| e.key().clone()).collect()
    }

    pub fn contains(&self, conversation_id: &ConversationId) -> bool {
        self.conversations.contains_key(conversation_id)
    }

    pub fn len(&self) -> usize {
        self.conversations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
