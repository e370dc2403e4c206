//! Simulation events and the time-ordered event queue.
//!
//! Events own their payloads. The queue is a min-heap keyed on
//! (firing time, insertion sequence): equal-time events pop in the order
//! they were scheduled, which makes runs deterministic for identical
//! inputs.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Simulation time in cycles.
pub type SimTime = u64;

/// One 4-byte memory access on behalf of a warp. Created when the request
/// is scheduled, consumed when its event fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryTransaction {
    pub address: u32,
    pub data: u32,
    pub is_write: bool,
    /// Access width in bytes; always 4 in this model
    pub size: u32,
    pub warp_id: u32,
    pub thread_mask: u32,
}

impl MemoryTransaction {
    pub fn read(address: u32, warp_id: u32, thread_mask: u32) -> Self {
        MemoryTransaction {
            address,
            data: 0,
            is_write: false,
            size: 4,
            warp_id,
            thread_mask,
        }
    }

    pub fn write(address: u32, data: u32, warp_id: u32, thread_mask: u32) -> Self {
        MemoryTransaction {
            address,
            data,
            is_write: true,
            size: 4,
            warp_id,
            thread_mask,
        }
    }
}

/// Everything that can happen in the simulated machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    MemoryRequest(MemoryTransaction),
    MemoryResponse(MemoryTransaction),
    InstructionFetch { warp_id: u32 },
    WarpComplete { warp_id: u32 },
    SimulationEnd,
}

impl Event {
    /// Integer tag used in trace dumps.
    pub fn tag(&self) -> u32 {
        match self {
            Event::MemoryRequest(_) => 0,
            Event::MemoryResponse(_) => 1,
            Event::InstructionFetch { .. } => 2,
            Event::WarpComplete { .. } => 3,
            Event::SimulationEnd => 4,
        }
    }

    pub fn warp_id(&self) -> Option<u32> {
        match self {
            Event::MemoryRequest(txn) | Event::MemoryResponse(txn) => Some(txn.warp_id),
            Event::InstructionFetch { warp_id } | Event::WarpComplete { warp_id } => {
                Some(*warp_id)
            }
            Event::SimulationEnd => None,
        }
    }
}

/// An event bound to its firing time and insertion sequence number.
#[derive(Debug, Clone)]
pub struct ScheduledEvent {
    pub time: SimTime,
    seq: u64,
    pub event: Event,
}

impl PartialEq for ScheduledEvent {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.seq == other.seq
    }
}

impl Eq for ScheduledEvent {}

impl PartialOrd for ScheduledEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed on both keys: BinaryHeap is a max-heap, we want the
        // earliest time first and FIFO among equals.
        other
            .time
            .cmp(&self.time)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Min-heap of scheduled events with stable FIFO ordering at equal times.
#[derive(Debug, Default)]
pub struct EventQueue {
    heap: BinaryHeap<ScheduledEvent>,
    next_seq: u64,
}

impl EventQueue {
    pub fn new() -> Self {
        EventQueue {
            heap: BinaryHeap::with_capacity(1024),
            next_seq: 0,
        }
    }

    pub fn push(&mut self, time: SimTime, event: Event) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(ScheduledEvent { time, seq, event });
    }

    pub fn pop(&mut self) -> Option<ScheduledEvent> {
        self.heap.pop()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Drop all pending events and restart the sequence counter.
    pub fn clear(&mut self) {
        self.heap.clear();
        self.next_seq = 0;
    }
}
