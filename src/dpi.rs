//! Status-coded boundary surface for driving the simulator from an RTL
//! testbench.
//!
//! Every operation returns one of six fixed status codes and never panics
//! across the boundary; callers hold an explicit [`SimulatorHandle`]
//! instead of going through process-wide state. The handle owns the
//! engine, which in turn owns the memory model.

use crate::cache::CacheStats;
use crate::config::SimConfig;
use crate::engine::SimulationEngine;
use crate::event::MemoryTransaction;
use crate::warp::WarpState;

/// Boundary status codes. The taxonomy is fixed; all internal failures
/// map to one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum Status {
    Success = 0,
    InvalidAddress = -1,
    InvalidWarp = -2,
    InvalidThread = -3,
    MemoryError = -4,
    SimulationError = -5,
}

/// One decoded instruction crossing the boundary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InstructionRecord {
    pub pc: u32,
    pub instruction: u32,
    pub warp_id: u32,
    pub thread_mask: u32,
}

/// Warp state as seen across the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WarpSnapshot {
    pub pc: u32,
    pub thread_mask: u32,
    pub active: bool,
    pub last_active_cycle: u64,
}

/// Engine counters exported to the testbench. Stall accounting is out of
/// scope; `stall_cycles` is always 0.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PerformanceCounters {
    pub instructions_executed: u64,
    pub memory_requests: u64,
    pub cache_hits: u64,
    pub stall_cycles: u64,
}

/// Explicit handle threaded through every boundary call.
pub struct SimulatorHandle {
    engine: Option<SimulationEngine>,
}

impl SimulatorHandle {
    /// Build and initialize a simulator. Configuration mistakes report
    /// `SimulationError`; nothing is left half-built.
    pub fn initialize(config: SimConfig) -> Result<SimulatorHandle, Status> {
        let mut engine =
            SimulationEngine::new(config).map_err(|_| Status::SimulationError)?;
        engine.initialize();
        Ok(SimulatorHandle {
            engine: Some(engine),
        })
    }

    /// Tear down the simulator. Idempotent: later calls do nothing, and
    /// every other operation on a cleaned-up handle reports
    /// `SimulationError`.
    pub fn cleanup(&mut self) {
        self.engine = None;
    }

    fn engine(&self) -> Result<&SimulationEngine, Status> {
        self.engine.as_ref().ok_or(Status::SimulationError)
    }

    fn engine_mut(&mut self) -> Result<&mut SimulationEngine, Status> {
        self.engine.as_mut().ok_or(Status::SimulationError)
    }

    /// Validate and submit one memory transaction. Reads schedule a
    /// response event at the access's completion cycle.
    pub fn process_memory_request(&mut self, txn: &MemoryTransaction) -> Status {
        let engine = match self.engine_mut() {
            Ok(engine) => engine,
            Err(status) => return status,
        };
        if txn.address % 4 != 0 {
            return Status::InvalidAddress;
        }
        if txn.warp_id >= engine.config().num_warps {
            return Status::InvalidWarp;
        }
        engine.process_memory_request(txn);
        Status::Success
    }

    /// Drain pending events, then pop the oldest delivered read response.
    /// An empty queue reports `MemoryError` with data 0.
    pub fn get_memory_response(&mut self) -> (Status, u32) {
        let engine = match self.engine_mut() {
            Ok(engine) => engine,
            Err(status) => return (status, 0),
        };
        engine.run();
        match engine.pop_response() {
            Some((_warp_id, data)) => (Status::Success, data),
            None => (Status::MemoryError, 0),
        }
    }

    /// Dispatch a completed instruction to the engine's decode hook.
    pub fn process_instruction(&mut self, record: &InstructionRecord) -> Status {
        let engine = match self.engine_mut() {
            Ok(engine) => engine,
            Err(status) => return status,
        };
        if record.warp_id >= engine.config().num_warps {
            return Status::InvalidWarp;
        }
        if record.pc % 4 != 0 {
            return Status::InvalidAddress;
        }
        engine.instruction_complete(record.warp_id, record.pc, record.instruction);
        Status::Success
    }

    /// The instruction the given warp would fetch next: its current pc,
    /// the word at that address (cache probe falling back to main
    /// memory), and its thread mask.
    pub fn get_next_instruction(&self, warp_id: u32) -> (Status, InstructionRecord) {
        let engine = match self.engine() {
            Ok(engine) => engine,
            Err(status) => return (status, InstructionRecord::default()),
        };
        let warp = match engine.warp(warp_id) {
            Some(warp) => warp,
            None => return (Status::InvalidWarp, InstructionRecord::default()),
        };
        let instruction = engine
            .memory()
            .lookup_cache(warp.pc)
            .unwrap_or_else(|| engine.memory().main_memory().read_word(warp.pc));
        (
            Status::Success,
            InstructionRecord {
                pc: warp.pc,
                instruction,
                warp_id,
                thread_mask: warp.thread_mask,
            },
        )
    }

    /// Overwrite one warp's state. Only pc alignment is validated;
    /// mask/active combinations are the caller's responsibility.
    pub fn update_warp_state(&mut self, warp_id: u32, state: &WarpSnapshot) -> Status {
        let engine = match self.engine_mut() {
            Ok(engine) => engine,
            Err(status) => return status,
        };
        if warp_id >= engine.config().num_warps {
            return Status::InvalidWarp;
        }
        if state.pc % 4 != 0 {
            return Status::InvalidAddress;
        }
        engine.set_warp_state(
            warp_id,
            WarpState {
                pc: state.pc,
                thread_mask: state.thread_mask,
                active: state.active,
                last_active: state.last_active_cycle,
            },
        );
        Status::Success
    }

    pub fn get_warp_state(&self, warp_id: u32) -> (Status, Option<WarpSnapshot>) {
        let engine = match self.engine() {
            Ok(engine) => engine,
            Err(status) => return (status, None),
        };
        match engine.warp(warp_id) {
            Some(warp) => (
                Status::Success,
                Some(WarpSnapshot {
                    pc: warp.pc,
                    thread_mask: warp.thread_mask,
                    active: warp.active,
                    last_active_cycle: warp.last_active,
                }),
            ),
            None => (Status::InvalidWarp, None),
        }
    }

    pub fn get_cache_stats(&self) -> (Status, CacheStats) {
        match self.engine() {
            Ok(engine) => (Status::Success, engine.memory().stats()),
            Err(status) => (status, CacheStats::default()),
        }
    }

    pub fn get_performance_counters(&self) -> (Status, PerformanceCounters) {
        match self.engine() {
            Ok(engine) => {
                let stats = engine.get_statistics();
                (
                    Status::Success,
                    PerformanceCounters {
                        instructions_executed: stats.instructions_executed,
                        memory_requests: stats.memory_requests,
                        cache_hits: stats.cache_hits,
                        stall_cycles: 0,
                    },
                )
            }
            Err(status) => (status, PerformanceCounters::default()),
        }
    }

    /// Human-readable engine and cache reports. No-op after cleanup.
    pub fn print_statistics(&self) {
        if let Ok(engine) = self.engine() {
            engine.print_statistics();
            engine.memory().print_cache_state();
        }
    }

    /// Run the engine's event loop to completion or ceiling.
    pub fn run(&mut self) -> Status {
        match self.engine_mut() {
            Ok(engine) => {
                engine.run();
                Status::Success
            }
            Err(status) => status,
        }
    }

    /// Borrow the underlying engine (for embedding beyond the C-style
    /// surface).
    pub fn engine_ref(&self) -> Option<&SimulationEngine> {
        self.engine.as_ref()
    }

    pub fn engine_ref_mut(&mut self) -> Option<&mut SimulationEngine> {
        self.engine.as_mut()
    }
}
