//! Bounded trace of dispatched events, CSV export, and a post-run
//! read-after-write consistency check.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use crate::event::{Event, SimTime};

/// Maximum recorded events; later events are silently not traced.
pub const TRACE_RESERVE_SIZE: usize = 10_000;

/// One dispatched event, flattened for export. Fields not applicable to
/// the event kind stay zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceEntry {
    pub time: SimTime,
    /// Integer event tag (see [`Event::tag`])
    pub event_tag: u32,
    pub warp_id: u32,
    pub address: u32,
    pub data: u32,
}

/// Bounded ring of trace entries, filled during the run and exported after.
#[derive(Debug, Default)]
pub struct TraceRecorder {
    entries: Vec<TraceEntry>,
}

impl TraceRecorder {
    pub fn new() -> Self {
        TraceRecorder {
            entries: Vec::with_capacity(TRACE_RESERVE_SIZE),
        }
    }

    pub fn record(&mut self, time: SimTime, event: &Event) {
        if self.entries.len() >= TRACE_RESERVE_SIZE {
            return;
        }
        let mut entry = TraceEntry {
            time,
            event_tag: event.tag(),
            warp_id: 0,
            address: 0,
            data: 0,
        };
        match event {
            Event::MemoryRequest(txn) | Event::MemoryResponse(txn) => {
                entry.warp_id = txn.warp_id;
                entry.address = txn.address;
                entry.data = txn.data;
            }
            Event::InstructionFetch { warp_id } | Event::WarpComplete { warp_id } => {
                entry.warp_id = *warp_id;
            }
            Event::SimulationEnd => {}
        }
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[TraceEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Write the trace as CSV: `Time,Event,WarpID,Address,Data` with the
    /// event as its integer tag and address/data in bare hex.
    pub fn dump_csv(&self, path: &Path) -> io::Result<()> {
        let mut out = BufWriter::new(File::create(path)?);
        writeln!(out, "Time,Event,WarpID,Address,Data")?;
        for e in &self.entries {
            writeln!(
                out,
                "{},{},{},{:x},{:x}",
                e.time, e.event_tag, e.warp_id, e.address, e.data
            )?;
        }
        out.flush()
    }

    /// Check read-after-write ordering over the recorded memory events:
    /// every response must carry the data of the most recent request to
    /// the same address. Violations are programming errors.
    pub fn verify_memory_consistency(&self) {
        // tag 0 = request, tag 1 = response
        let requests: Vec<&TraceEntry> =
            self.entries.iter().filter(|e| e.event_tag == 0).collect();
        for response in self.entries.iter().filter(|e| e.event_tag == 1) {
            let last_request = requests
                .iter()
                .rev()
                .find(|r| r.address == response.address && r.time < response.time);
            if let Some(request) = last_request {
                assert_eq!(
                    response.data, request.data,
                    "memory read must reflect most recent write"
                );
            }
        }
    }
}
