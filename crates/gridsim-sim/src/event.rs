//! Time-ordered queue of platform events.
//!
//! Binding completions are computed by the platform model on the fly; the
//! queue only holds what the model cannot predict: host power changes
//! (scripted or injected) and the periodic fault check.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use gridsim_types::HostId;
use serde::{Deserialize, Serialize};

/// Identifier of a scheduled event, unique within one queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EventId(u64);

impl EventId {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_raw(self) -> u64 {
        self.0
    }
}

/// What happens when an event fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    /// The host is powered off; its bindings fail and its actors die.
    HostOff(HostId),
    /// The host is powered back on.
    HostOn(HostId),
    /// Let the fault injector decide which hosts go down.
    FaultCheck,
}

/// An event scheduled at a simulated time.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub time: f64,
    pub kind: EventKind,
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Event {}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Event {
    /// Earlier time first; events scheduled for the same time fire in
    /// scheduling order.
    fn cmp(&self, other: &Self) -> Ordering {
        self.time
            .total_cmp(&other.time)
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// Priority queue of scheduled events.
#[derive(Debug, Default)]
pub struct EventQueue {
    heap: BinaryHeap<Reverse<Event>>,
    next_id: u64,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules `kind` at `time`.
    pub fn schedule(&mut self, time: f64, kind: EventKind) -> EventId {
        let id = EventId(self.next_id);
        self.next_id += 1;
        self.heap.push(Reverse(Event { id, time, kind }));
        id
    }

    /// Removes and returns the earliest event.
    pub fn pop(&mut self) -> Option<Event> {
        self.heap.pop().map(|Reverse(event)| event)
    }

    /// Time of the earliest event, if any.
    pub fn next_time(&self) -> Option<f64> {
        self.heap.peek().map(|Reverse(event)| event.time)
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn clear(&mut self) {
        self.heap.clear();
    }
}
