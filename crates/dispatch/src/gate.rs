//! Per-conversation concurrency gate.

use parley_common::types::ConversationId;

use crate::error::{Error, Result};

/// Bounded counting gate: at most `capacity` events of one conversation may
/// be executing at once. Acquire never blocks.
#[derive(Debug)]
pub struct ConcurrencyGate {
    conversation_id: ConversationId,
    capacity: usize,
    in_use: usize,
}

impl ConcurrencyGate {
    pub fn new(conversation_id: ConversationId, capacity: usize) -> Self {
        Self {
            conversation_id,
            capacity,
            in_use: 0,
        }
    }

    /// Take a slot if one is free. State is unchanged on failure.
    pub fn try_acquire(&mut self) -> bool {
        if self.in_use < self.capacity {
            self.in_use += 1;
            true
        } else {
            false
        }
    }

    /// Return a slot taken by [`try_acquire`](Self::try_acquire).
    ///
    /// A release with no slot taken is an accounting bug; it is reported and
    /// the counter is left untouched.
    pub fn release(&mut self) -> Result<()> {
        if self.in_use == 0 {
            return Err(Error::gate_accounting(
                self.conversation_id.clone(),
                self.capacity,
            ));
        }
        self.in_use -= 1;
        Ok(())
    }

    pub fn is_fully_idle(&self) -> bool {
        self.in_use == 0
    }

    pub fn in_use(&self) -> usize {
        self.in_use
    }

    pub fn available(&self) -> usize {
        self.capacity - self.in_use
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_up_to_capacity() {
        let mut gate = ConcurrencyGate::new("c1".into(), 2);
        assert!(gate.try_acquire());
        assert!(gate.try_acquire());
        assert!(!gate.try_acquire());
        assert_eq!(gate.in_use(), 2);
        assert_eq!(gate.available(), 0);

        gate.release().unwrap();
        assert!(gate.try_acquire());
    }

    #[test]
    fn idle_after_balanced_release() {
        let mut gate = ConcurrencyGate::new("c1".into(), 4);
        assert!(gate.is_fully_idle());
        assert!(gate.try_acquire());
        assert!(!gate.is_fully_idle());
        gate.release().unwrap();
        assert!(gate.is_fully_idle());
    }

    #[test]
    fn unmatched_release_is_an_error() {
        let mut gate = ConcurrencyGate::new("c1".into(), 1);
        let err = gate.release().unwrap_err();
        assert!(matches!(err, Error::GateAccounting { capacity: 1, .. }));
        // Accounting stays intact afterwards.
        assert!(gate.try_acquire());
        assert!(!gate.try_acquire());
    }
}
