//! Correlated async command queue
//!
//! Vendor-specific commands carry no transaction id. Completions are matched
//! to requests purely by issue order, so each manager keeps a bounded FIFO of
//! what it has sent and checks the sub-opcode of every completion against the
//! head of that FIFO.

use std::collections::VecDeque;

use log::{debug, warn};

use crate::error::{BtmError, BtmResult};

/// One outstanding command awaiting its completion event
pub struct PendingOp<T> {
    /// Sub-opcode (or action) the completion must echo back
    pub sub_opcode: u8,
    /// Caller supplied reference, handed back on completion
    pub ref_value: u32,
    /// Manager specific data, usually the caller's completion callback
    pub payload: T,
}

/// Bounded FIFO of [`PendingOp`]s
pub struct CorrelatedQueue<T> {
    name: &'static str,
    capacity: usize,
    ops: VecDeque<PendingOp<T>>,
}

impl<T> CorrelatedQueue<T> {
    pub fn new(name: &'static str, capacity: usize) -> Self {
        Self { name, capacity, ops: VecDeque::with_capacity(capacity) }
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.ops.len() >= self.capacity
    }

    /// Check there is room before the command is put on the wire
    pub fn reserve(&self) -> BtmResult<()> {
        self.reserve_many(1)
    }

    /// Room for a chain of `count` commands issued back to back
    pub fn reserve_many(&self, count: usize) -> BtmResult<()> {
        if self.ops.len() + count > self.capacity {
            warn!("{} queue full ({} pending)", self.name, self.ops.len());
            Err(BtmError::NoResources)
        } else {
            Ok(())
        }
    }

    /// Record a command that has just been issued
    pub fn enqueue(&mut self, sub_opcode: u8, ref_value: u32, payload: T) -> BtmResult<()> {
        self.reserve()?;
        debug!("{} enqueue sub_opcode {:#04x} ref {}", self.name, sub_opcode, ref_value);
        self.ops.push_back(PendingOp { sub_opcode, ref_value, payload });
        Ok(())
    }

    /// Sub-opcode at the head of the queue
    pub fn peek_sub_opcode(&self) -> Option<u8> {
        self.ops.front().map(|op| op.sub_opcode)
    }

    /// Pop the oldest entry for a completion carrying `sub_opcode`
    ///
    /// The head is always consumed. On a mismatch it comes back as
    /// `Err(Some(op))` so the manager can fail it; `Err(None)` means nothing
    /// was pending. Either way the completion itself is dropped.
    pub fn dequeue(&mut self, sub_opcode: u8) -> Result<PendingOp<T>, Option<PendingOp<T>>> {
        let Some(op) = self.ops.pop_front() else {
            warn!("{} completion {:#04x} with nothing pending", self.name, sub_opcode);
            return Err(None);
        };

        if op.sub_opcode != sub_opcode {
            warn!(
                "{} completion sub_opcode mismatch: expected {:#04x}, got {:#04x}",
                self.name, op.sub_opcode, sub_opcode
            );
            return Err(Some(op));
        }

        Ok(op)
    }

    /// Drop the head for a completion that could not be parsed
    pub fn discard_head(&mut self) -> Option<PendingOp<T>> {
        let op = self.ops.pop_front()?;
        warn!("{} discarding sub_opcode {:#04x} ref {}", self.name, op.sub_opcode, op.ref_value);
        Some(op)
    }

    /// Drop everything, returning the discarded entries
    pub fn drain(&mut self) -> Vec<PendingOp<T>> {
        self.ops.drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order() {
        let mut queue = CorrelatedQueue::new("test", 5);
        queue.enqueue(1, 10, "a").unwrap();
        queue.enqueue(1, 11, "b").unwrap();
        queue.enqueue(2, 12, "c").unwrap();

        assert_eq!(queue.dequeue(1).ok().unwrap().payload, "a");
        assert_eq!(queue.dequeue(1).ok().unwrap().payload, "b");
        let last = queue.dequeue(2).ok().unwrap();
        assert_eq!(last.ref_value, 12);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_capacity() {
        let mut queue = CorrelatedQueue::new("test", 2);
        queue.enqueue(1, 0, ()).unwrap();
        queue.enqueue(1, 0, ()).unwrap();

        assert_eq!(queue.enqueue(1, 0, ()), Err(BtmError::NoResources));
        assert_eq!(queue.len(), 2);

        assert!(queue.dequeue(1).is_ok());
        assert!(queue.reserve_many(1).is_ok());
        assert_eq!(queue.reserve_many(2), Err(BtmError::NoResources));
    }

    #[test]
    fn test_mismatch_discards_head() {
        let mut queue = CorrelatedQueue::new("test", 4);
        queue.enqueue(1, 7, "first").unwrap();
        queue.enqueue(2, 0, "second").unwrap();

        // Completion for the wrong sub-opcode drops the head and hands it back
        let discarded = queue.dequeue(2).err().flatten().unwrap();
        assert_eq!(discarded.payload, "first");
        assert_eq!(discarded.ref_value, 7);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.dequeue(2).ok().unwrap().payload, "second");

        // Nothing pending
        assert!(matches!(queue.dequeue(2), Err(None)));
    }

    #[test]
    fn test_discard_head() {
        let mut queue = CorrelatedQueue::new("test", 4);
        assert!(queue.discard_head().is_none());

        queue.enqueue(1, 1, "a").unwrap();
        queue.enqueue(1, 2, "b").unwrap();
        assert_eq!(queue.discard_head().unwrap().ref_value, 1);
        assert_eq!(queue.peek_sub_opcode(), Some(1));
        assert_eq!(queue.dequeue(1).ok().unwrap().payload, "b");
        assert!(queue.is_empty());
    }
}
