//! Ordered admission queue of one conversation.

use std::collections::VecDeque;

use parley_common::types::{Event, Priority};

/// Double-ended event queue: normal events join the tail, priority events
/// jump to the head. Dequeue always takes the head.
#[derive(Debug, Default)]
pub struct AdmissionQueue {
    events: VecDeque<Event>,
}

impl AdmissionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, event: Event) {
        match event.priority {
            Priority::High => self.events.push_front(event),
            Priority::Normal => self.events.push_back(event),
        }
    }

    pub fn dequeue_front(&mut self) -> Option<Event> {
        self.events.pop_front()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Empty the queue, returning the discarded events in dequeue order.
    pub fn drain(&mut self) -> Vec<Event> {
        self.events.drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        parley_common::types::{EventOrigin, EventPayload},
    };

    fn text(content: &str) -> Event {
        Event::new("c1", EventPayload::text(content), EventOrigin::default())
    }

    fn command(name: &str) -> Event {
        Event::new("c1", EventPayload::command(name, vec![]), EventOrigin::default())
    }

    fn label(event: &Event) -> String {
        match &event.payload {
            EventPayload::Text { content } => content.clone(),
            EventPayload::Command { name, .. } => format!("#{name}"),
            other => format!("{other:?}"),
        }
    }

    fn drain_labels(queue: &mut AdmissionQueue) -> Vec<String> {
        std::iter::from_fn(|| queue.dequeue_front())
            .map(|e| label(&e))
            .collect()
    }

    #[test]
    fn normal_events_are_fifo() {
        let mut queue = AdmissionQueue::new();
        for s in ["a", "b", "c"] {
            queue.enqueue(text(s));
        }
        assert_eq!(queue.len(), 3);
        assert_eq!(drain_labels(&mut queue), vec!["a", "b", "c"]);
        assert!(queue.dequeue_front().is_none());
    }

    #[test]
    fn priority_jumps_ahead_most_recent_first() {
        let mut queue = AdmissionQueue::new();
        queue.enqueue(text("a"));
        queue.enqueue(command("reset"));
        queue.enqueue(text("b"));
        queue.enqueue(command("model"));
        assert_eq!(drain_labels(&mut queue), vec!["#model", "#reset", "a", "b"]);
    }

    #[test]
    fn priority_after_partial_dequeue() {
        let mut queue = AdmissionQueue::new();
        queue.enqueue(text("a"));
        queue.enqueue(text("b"));
        assert_eq!(queue.dequeue_front().map(|e| label(&e)).as_deref(), Some("a"));
        queue.enqueue(command("stop"));
        assert_eq!(drain_labels(&mut queue), vec!["#stop", "b"]);
    }

    #[test]
    fn drain_empties_in_order() {
        let mut queue = AdmissionQueue::new();
        queue.enqueue(text("a"));
        queue.enqueue(command("x"));
        let drained: Vec<String> = queue.drain().iter().map(label).collect();
        assert_eq!(drained, vec!["#x", "a"]);
        assert!(queue.is_empty());
        assert!(queue.drain().is_empty());
    }
}
