// Copyright 2020 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Event slots and the two sorted event timelines (ping, timeout).
//!
//! Instead of the pointer-rich doubly linked list the original uses (one
//! pair of pre-allocated `struct event` per host), we keep one flat arena
//! per queue and address slots by index. Each host owns a fixed range of
//! `event_storage_count` slots; a ping index maps onto a slot via
//! `ping_index % event_storage_count`, which is exactly how the original
//! guarantees that a slot is never reused while still live (see
//! `EventStorageCount` sizing in `engine.rs`).

use crate::clock::TimeNs;

pub type SlotId = usize;

#[derive(Debug, Clone, Copy)]
struct Slot {
    host_idx: usize,
    ping_index: u64,
    due_ns: TimeNs,
    live: bool,
    prev: Option<SlotId>,
    next: Option<SlotId>,
}

impl Slot {
    fn empty() -> Self {
        Self {
            host_idx: 0,
            ping_index: 0,
            due_ns: 0,
            live: false,
            prev: None,
            next: None,
        }
    }
}

/// One outstanding event: "send a ping" or "give up waiting for a reply".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    pub slot: SlotId,
    pub host_idx: usize,
    pub ping_index: u64,
    pub due_ns: TimeNs,
}

/// An ordered sequence of events, sorted ascending by `due_ns`, backed by
/// an arena of pre-allocated slots (one per host per
/// `event_storage_count`).
#[derive(Debug)]
pub struct EventQueue {
    slots: Vec<Slot>,
    head: Option<SlotId>,
    tail: Option<SlotId>,
}

impl EventQueue {
    /// `total_slots` = `num_hosts * event_storage_count`.
    pub fn new(total_slots: usize) -> Self {
        Self {
            slots: vec![Slot::empty(); total_slots],
            head: None,
            tail: None,
        }
    }

    fn event_at(&self, id: SlotId) -> Event {
        let s = &self.slots[id];
        Event {
            slot: id,
            host_idx: s.host_idx,
            ping_index: s.ping_index,
            due_ns: s.due_ns,
        }
    }

    /// True iff the slot addressed by `id` is currently linked into this
    /// queue. Used by the reply correlator to cancel a timeout by direct
    /// slot address (§4.5 step 7 in the spec).
    pub fn is_live(&self, id: SlotId) -> bool {
        self.slots[id].live
    }

    /// Place a new event for `(host_idx, ping_index)` due at `due_ns`,
    /// keeping the queue sorted ascending. Ties are resolved in insertion
    /// order. Scans from the tail since new events are usually later than
    /// everything already queued.
    pub fn enqueue(&mut self, slot_id: SlotId, host_idx: usize, ping_index: u64, due_ns: TimeNs) {
        debug_assert!(!self.slots[slot_id].live, "slot reused while still live");
        self.slots[slot_id] = Slot {
            host_idx,
            ping_index,
            due_ns,
            live: true,
            prev: None,
            next: None,
        };

        let mut cursor = self.tail;
        while let Some(c) = cursor {
            if self.slots[c].due_ns <= due_ns {
                break;
            }
            cursor = self.slots[c].prev;
        }

        match cursor {
            None => {
                // Queue was empty, or every existing event is later than
                // this one: insert at the head.
                let old_head = self.head;
                self.slots[slot_id].next = old_head;
                if let Some(h) = old_head {
                    self.slots[h].prev = Some(slot_id);
                }
                self.head = Some(slot_id);
                if self.tail.is_none() {
                    self.tail = Some(slot_id);
                }
            }
            Some(c) => {
                let old_next = self.slots[c].next;
                self.slots[slot_id].prev = Some(c);
                self.slots[slot_id].next = old_next;
                self.slots[c].next = Some(slot_id);
                match old_next {
                    Some(n) => self.slots[n].prev = Some(slot_id),
                    None => self.tail = Some(slot_id),
                }
            }
        }
    }

    /// Peek at the head without removing it.
    pub fn peek_first(&self) -> Option<Event> {
        self.head.map(|h| self.event_at(h))
    }

    /// Remove and return the head, or `None` if empty.
    pub fn pop_first(&mut self) -> Option<Event> {
        let head = self.head?;
        let ev = self.event_at(head);
        self.unlink(head);
        Some(ev)
    }

    /// Unlink whatever event sits at `slot_id`, wherever it sits in the
    /// queue. A no-op if the slot is not currently live (already popped or
    /// never enqueued).
    pub fn remove(&mut self, slot_id: SlotId) {
        if !self.slots[slot_id].live {
            return;
        }
        self.unlink(slot_id);
    }

    fn unlink(&mut self, slot_id: SlotId) {
        let prev = self.slots[slot_id].prev;
        let next = self.slots[slot_id].next;
        match prev {
            Some(p) => self.slots[p].next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.slots[n].prev = prev,
            None => self.tail = prev,
        }
        self.slots[slot_id].live = false;
        self.slots[slot_id].prev = None;
        self.slots[slot_id].next = None;
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    #[cfg(test)]
    fn iter_due(&self) -> Vec<TimeNs> {
        let mut out = vec![];
        let mut cursor = self.head;
        while let Some(c) = cursor {
            out.push(self.slots[c].due_ns);
            cursor = self.slots[c].next;
        }
        out
    }
}

/// Maps `(host_idx, ping_index)` onto a stable slot id for a queue, given
/// the global `event_storage_count`.
pub fn slot_for(host_idx: usize, ping_index: u64, event_storage_count: usize) -> SlotId {
    host_idx * event_storage_count + (ping_index as usize % event_storage_count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enqueue_keeps_sorted_order() {
        let mut q = EventQueue::new(4);
        q.enqueue(0, 0, 0, 30);
        q.enqueue(1, 0, 1, 10);
        q.enqueue(2, 0, 2, 20);
        assert_eq!(q.iter_due(), vec![10, 20, 30]);
    }

    #[test]
    fn ties_resolved_in_insertion_order() {
        let mut q = EventQueue::new(4);
        q.enqueue(0, 0, 0, 10);
        q.enqueue(1, 0, 1, 10);
        let a = q.pop_first().unwrap();
        let b = q.pop_first().unwrap();
        assert_eq!(a.slot, 0);
        assert_eq!(b.slot, 1);
    }

    #[test]
    fn pop_first_removes_head() {
        let mut q = EventQueue::new(4);
        q.enqueue(0, 0, 0, 10);
        q.enqueue(1, 0, 1, 20);
        let ev = q.pop_first().unwrap();
        assert_eq!(ev.due_ns, 10);
        assert_eq!(q.iter_due(), vec![20]);
    }

    #[test]
    fn remove_arbitrary_unlinks_middle() {
        let mut q = EventQueue::new(4);
        q.enqueue(0, 0, 0, 10);
        q.enqueue(1, 0, 1, 20);
        q.enqueue(2, 0, 2, 30);
        q.remove(1);
        assert_eq!(q.iter_due(), vec![10, 30]);
        assert!(!q.is_live(1));
    }

    #[test]
    fn remove_is_noop_if_not_live() {
        let mut q = EventQueue::new(4);
        q.enqueue(0, 0, 0, 10);
        q.remove(2); // never enqueued
        assert_eq!(q.iter_due(), vec![10]);
    }

    #[test]
    fn slot_reuse_across_trials() {
        assert_eq!(slot_for(2, 5, 3), 2 * 3 + (5 % 3));
    }

    #[test]
    fn empty_queue_pop_is_none() {
        let mut q = EventQueue::new(1);
        assert!(q.pop_first().is_none());
        assert!(q.is_empty());
    }
}
