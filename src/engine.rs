//! Discrete-event simulation engine.
//!
//! The engine owns the event queue, the warp table, the trace, and the
//! memory model for the simulator's lifetime. All state mutation happens
//! on one logical agent, the event loop: pop the earliest event, advance
//! `current_time` to its firing time, dispatch, and let handlers schedule
//! follow-up events. Runs are deterministic for identical inputs because
//! equal-time events dispatch in insertion order.

use std::collections::VecDeque;
use std::io;
use std::path::Path;

use crate::config::{ConfigError, SimConfig};
use crate::event::{Event, EventQueue, MemoryTransaction, SimTime};
use crate::isa::{InstructionClassifier, InstructionKind, RiscvClassifier};
use crate::memory::MemoryModel;
use crate::metrics::{self, LiveMetrics};
use crate::trace::TraceRecorder;
use crate::warp::{self, WarpState};

/// Hard ceiling on simulated time; a liveness safeguard, not an error.
pub const MAX_SIMULATION_CYCLES: SimTime = 1_000_000;

/// Cycle granularity of periodic statistics sampling.
const STATS_SAMPLE_INTERVAL: SimTime = 1000;

/// Aggregate performance counters. `ipc` and `cache_hit_rate` are derived
/// at finalization and stay 0.0 until then.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SimStats {
    pub total_cycles: u64,
    pub instructions_executed: u64,
    pub memory_requests: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub ipc: f64,
    pub cache_hit_rate: f64,
}

/// Observer invoked when a memory response is delivered.
pub type ResponseHook = Box<dyn FnMut(&MemoryTransaction)>;
/// Observer invoked for every completed instruction: (warp, pc, word).
pub type InstructionHook = Box<dyn FnMut(u32, u32, u32)>;

pub struct SimulationEngine {
    config: SimConfig,
    stats: SimStats,
    running: bool,
    current_time: SimTime,
    events: EventQueue,
    memory: MemoryModel,
    warps: Vec<WarpState>,
    trace: TraceRecorder,
    /// Delivered read responses, oldest first: (warp id, data word)
    responses: VecDeque<(u32, u32)>,
    classifier: Box<dyn InstructionClassifier>,
    /// When false, fetch uses the naive fixed-delay path and skips decode
    decode_enabled: bool,
    response_hook: Option<ResponseHook>,
    instruction_hook: Option<InstructionHook>,
    /// Write a live metrics snapshot at every statistics sample
    live_metrics: bool,
}

impl SimulationEngine {
    /// Build an engine for `config`. Geometry mistakes are caught here and
    /// reported as [`ConfigError`]; nothing is partially constructed.
    pub fn new(config: SimConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let memory = MemoryModel::new(config.cache());
        let warps = (0..config.num_warps).map(|_| WarpState::new()).collect();
        Ok(SimulationEngine {
            memory,
            warps,
            stats: SimStats::default(),
            running: false,
            current_time: 0,
            events: EventQueue::new(),
            trace: TraceRecorder::new(),
            responses: VecDeque::new(),
            classifier: Box::new(RiscvClassifier),
            decode_enabled: false,
            response_hook: None,
            instruction_hook: None,
            live_metrics: false,
            config,
        })
    }

    /// Reset to a clean start: zero the clock and statistics, drain the
    /// event queue, clear the trace, re-initialize the memory model, and
    /// seed one fetch per warp at time 0. Idempotent.
    pub fn initialize(&mut self) {
        self.current_time = 0;
        self.stats = SimStats::default();
        self.events.clear();
        self.trace.clear();
        self.responses.clear();
        self.memory.initialize();
        for warp in &mut self.warps {
            *warp = WarpState::new();
        }
        for warp_id in 0..self.config.num_warps {
            self.events.push(0, Event::InstructionFetch { warp_id });
        }
    }

    /// Drive the event loop until a termination condition fires: an
    /// external `stop`, an empty queue, every warp inactive, or the
    /// [`MAX_SIMULATION_CYCLES`] ceiling.
    pub fn run(&mut self) {
        self.running = true;

        while self.running {
            let Some(scheduled) = self.events.pop() else {
                break;
            };
            // Time is monotone non-decreasing across dispatches
            debug_assert!(scheduled.time >= self.current_time);
            self.current_time = scheduled.time;

            self.trace.record(scheduled.time, &scheduled.event);
            self.dispatch(scheduled.event);

            if self.current_time % STATS_SAMPLE_INTERVAL == 0 {
                self.update_statistics();
            }

            if self.current_time >= MAX_SIMULATION_CYCLES || warp::all_inactive(&self.warps) {
                self.running = false;
            }
        }

        self.running = false;
        self.finalize_metrics();
    }

    /// External stop request: pending events stay queued but are not
    /// executed; derived metrics are finalized.
    pub fn stop(&mut self) {
        self.running = false;
        self.finalize_metrics();
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Push an event `delay` cycles from now.
    pub fn schedule_event(&mut self, delay: SimTime, event: Event) {
        self.events.push(self.current_time + delay, event);
    }

    fn dispatch(&mut self, event: Event) {
        match event {
            Event::MemoryRequest(txn) => self.process_memory_request(&txn),
            Event::MemoryResponse(txn) => self.process_memory_response(&txn),
            Event::InstructionFetch { warp_id } => self.process_instruction_fetch(warp_id),
            Event::WarpComplete { warp_id } => self.process_warp_complete(warp_id),
            Event::SimulationEnd => self.running = false,
        }
    }

    /// Route one transaction through the memory model. Reads get a
    /// response event at the model's completion cycle. Also the boundary
    /// entry point, so transactions may arrive outside event dispatch.
    pub fn process_memory_request(&mut self, txn: &MemoryTransaction) {
        let warp_idx = txn.warp_id as usize;
        assert!(warp_idx < self.warps.len(), "warp id out of range");

        self.stats.memory_requests += 1;
        let completion = self
            .memory
            .process_request(txn.address, txn.data, txn.is_write);

        if !txn.is_write {
            // Completion is absolute model time; clamp if it lags the
            // engine clock.
            let delay = completion.saturating_sub(self.current_time);
            self.schedule_event(delay, Event::MemoryResponse(txn.clone()));
        }

        self.warps[warp_idx].last_active = self.current_time;
    }

    fn process_memory_response(&mut self, txn: &MemoryTransaction) {
        // Resolve the word now that the fill has landed
        let mut delivered = txn.clone();
        delivered.data = self.memory.lookup_cache(txn.address).unwrap_or(txn.data);

        self.responses.push_back((delivered.warp_id, delivered.data));
        if let Some(hook) = self.response_hook.as_mut() {
            hook(&delivered);
        }

        self.schedule_event(1, Event::InstructionFetch { warp_id: txn.warp_id });
    }

    fn process_instruction_fetch(&mut self, warp_id: u32) {
        let warp_idx = warp_id as usize;
        assert!(warp_idx < self.warps.len(), "warp id out of range");
        if !self.warps[warp_idx].active {
            return;
        }

        let pc = self.warps[warp_idx].pc;
        let instruction = self.memory.read_instruction(pc);
        self.stats.instructions_executed += 1;

        if let Some(hook) = self.instruction_hook.as_mut() {
            hook(warp_id, pc, instruction);
        }

        if self.decode_enabled {
            self.instruction_complete(warp_id, pc, instruction);
        } else {
            // Naive path: fixed issue delay, no decode
            self.warps[warp_idx].pc = pc + 4;
            self.schedule_event(4, Event::InstructionFetch { warp_id });
        }
    }

    /// Completion hook: advance the warp past `pc` and schedule what the
    /// instruction class requires. A branch pays 3 cycles to the next
    /// fetch, an exit completes the warp, anything else refetches after 1.
    pub fn instruction_complete(&mut self, warp_id: u32, pc: u32, instruction: u32) {
        let warp_idx = warp_id as usize;
        assert!(warp_idx < self.warps.len(), "warp id out of range");
        debug_assert!(pc % 4 == 0, "pc must be 4-byte aligned");

        let warp = &mut self.warps[warp_idx];
        warp.pc = pc + 4;
        warp.last_active = self.current_time;

        match self.classifier.classify(instruction) {
            InstructionKind::Exit => {
                self.schedule_event(1, Event::WarpComplete { warp_id });
            }
            InstructionKind::Branch => {
                self.schedule_event(3, Event::InstructionFetch { warp_id });
            }
            InstructionKind::Other => {
                self.schedule_event(1, Event::InstructionFetch { warp_id });
            }
        }
    }

    fn process_warp_complete(&mut self, warp_id: u32) {
        let warp_idx = warp_id as usize;
        assert!(warp_idx < self.warps.len(), "warp id out of range");
        self.warps[warp_idx].retire();

        if warp::all_inactive(&self.warps) {
            self.schedule_event(1, Event::SimulationEnd);
        }
    }

    /// Schedule a memory request on behalf of an external collaborator,
    /// one cycle from now. The reentrant path for hooks and the boundary.
    pub fn submit_memory_request(&mut self, txn: MemoryTransaction) {
        self.schedule_event(1, Event::MemoryRequest(txn));
    }

    /// Pop the oldest delivered read response: (warp id, data word).
    pub fn pop_response(&mut self) -> Option<(u32, u32)> {
        self.responses.pop_front()
    }

    fn update_statistics(&mut self) {
        self.stats.total_cycles = self.current_time;
        let (hits, misses) = self.memory.get_cache_stats();
        self.stats.cache_hits = hits;
        self.stats.cache_misses = misses;

        if self.live_metrics {
            metrics::write_metrics(&self.live_snapshot());
        }
    }

    fn finalize_metrics(&mut self) {
        self.update_statistics();
        self.stats.ipc = if self.stats.total_cycles == 0 {
            0.0
        } else {
            self.stats.instructions_executed as f64 / self.stats.total_cycles as f64
        };
        let accesses = self.stats.cache_hits + self.stats.cache_misses;
        self.stats.cache_hit_rate = if accesses == 0 {
            0.0
        } else {
            self.stats.cache_hits as f64 / accesses as f64
        };

        if self.live_metrics {
            metrics::write_metrics(&self.live_snapshot());
        }
    }

    pub fn get_statistics(&self) -> SimStats {
        self.stats
    }

    pub fn print_statistics(&self) {
        println!("\nSimulation Statistics:");
        println!("=====================");
        println!("Total Cycles: {}", self.stats.total_cycles);
        println!("Instructions Executed: {}", self.stats.instructions_executed);
        println!("IPC: {:.2}", self.stats.ipc);
        println!("Memory Requests: {}", self.stats.memory_requests);
        println!("Cache Hit Rate: {:.2}%", self.stats.cache_hit_rate * 100.0);
    }

    /// Export the trace as CSV to `path`.
    pub fn dump_trace(&self, path: &Path) -> io::Result<()> {
        self.trace.dump_csv(path)
    }

    pub fn trace(&self) -> &TraceRecorder {
        &self.trace
    }

    pub fn verify_memory_consistency(&self) {
        self.trace.verify_memory_consistency();
    }

    pub fn current_time(&self) -> SimTime {
        self.current_time
    }

    pub fn pending_events(&self) -> usize {
        self.events.len()
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn memory(&self) -> &MemoryModel {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut MemoryModel {
        &mut self.memory
    }

    pub fn warps(&self) -> &[WarpState] {
        &self.warps
    }

    pub fn warp(&self, warp_id: u32) -> Option<&WarpState> {
        self.warps.get(warp_id as usize)
    }

    /// Overwrite one warp's state. Boundary collaborators may set any
    /// mask/active combination; only pc alignment is their contract.
    pub fn set_warp_state(&mut self, warp_id: u32, state: WarpState) {
        let warp_idx = warp_id as usize;
        assert!(warp_idx < self.warps.len(), "warp id out of range");
        self.warps[warp_idx] = state;
    }

    /// Classify fetched instructions instead of the naive fixed-delay path.
    pub fn enable_decode(&mut self) {
        self.decode_enabled = true;
    }

    /// Swap the instruction classifier (default: RISC-V).
    pub fn set_classifier(&mut self, classifier: Box<dyn InstructionClassifier>) {
        self.classifier = classifier;
    }

    pub fn set_response_hook(&mut self, hook: ResponseHook) {
        self.response_hook = Some(hook);
    }

    pub fn set_instruction_hook(&mut self, hook: InstructionHook) {
        self.instruction_hook = Some(hook);
    }

    /// Publish a [`LiveMetrics`] snapshot at every statistics sample.
    pub fn enable_live_metrics(&mut self) {
        self.live_metrics = true;
    }

    fn live_snapshot(&self) -> LiveMetrics {
        LiveMetrics {
            status: if self.running { "running" } else { "complete" }.to_string(),
            cycle: self.current_time,
            instructions_executed: self.stats.instructions_executed,
            memory_requests: self.stats.memory_requests,
            cache_hits: self.stats.cache_hits,
            cache_misses: self.stats.cache_misses,
            ipc: self.stats.ipc,
            cache_hit_rate: self.stats.cache_hit_rate,
            num_warps: self.config.num_warps,
            warp_active: self.warps.iter().map(|w| w.active).collect(),
            warp_pcs: self.warps.iter().map(|w| w.pc).collect(),
            events_pending: self.events.len(),
            timestamp_ms: metrics::now_ms(),
        }
    }

    /// Assert the engine's structural invariants.
    pub fn check_simulation_state(&self) {
        for warp in &self.warps {
            assert!(warp.pc % 4 == 0, "pc must be aligned to 4 bytes");
            if warp.active {
                assert!(warp.thread_mask != 0, "active warp must have a nonzero thread mask");
            }
        }
        assert!(
            !self.running || !self.events.is_empty(),
            "event queue cannot be empty while running"
        );
        self.memory.verify_state();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::warp::FULL_MASK;

    fn engine(num_warps: u32) -> SimulationEngine {
        let config = SimConfig {
            num_warps,
            cache_size: 1024,
            cache_line_size: 64,
            memory_latency: 10,
            ..SimConfig::default()
        };
        let mut e = SimulationEngine::new(config).expect("valid test config");
        e.initialize();
        e
    }

    #[test]
    fn bad_geometry_is_rejected_at_construction() {
        let config = SimConfig {
            cache_line_size: 48,
            ..SimConfig::default()
        };
        assert!(SimulationEngine::new(config).is_err());
    }

    #[test]
    fn naive_fetch_runs_to_ceiling() {
        // The naive path never exits, so the cycle ceiling must stop it
        let mut e = engine(1);
        e.run();
        let stats = e.get_statistics();
        assert!(stats.instructions_executed > 0);
        assert!(stats.total_cycles >= MAX_SIMULATION_CYCLES);
        assert!(!e.is_running());
        // Naive path: one instruction per 4 cycles once warmed up
        assert!(e.warps()[0].pc > 0);
        e.check_simulation_state();
    }

    #[test]
    fn memory_request_schedules_response_for_reads() {
        let mut e = engine(1);
        let txn = MemoryTransaction::read(0x40, 0, FULL_MASK);
        e.process_memory_request(&txn);
        assert_eq!(e.get_statistics().memory_requests, 1);
        // The response event is pending alongside the seeded fetch
        assert!(e.pending_events() >= 2);
    }

    #[test]
    fn writes_do_not_schedule_responses() {
        let mut e = engine(1);
        let before = e.pending_events();
        let txn = MemoryTransaction::write(0x40, 1, 0, FULL_MASK);
        e.process_memory_request(&txn);
        assert_eq!(e.pending_events(), before);
    }

    #[test]
    fn response_carries_cached_word() {
        let mut e = engine(1);
        e.enable_decode();
        // A short straight-line program keeps the warp alive past the
        // response time (miss completes at cycle 14), then exits.
        for i in 0..15 {
            e.memory_mut().main_memory_mut().write_word(4 * i, 0x0000_0013);
        }
        e.memory_mut().main_memory_mut().write_word(60, 0x0000_0073);
        e.memory_mut().main_memory_mut().write_word(0x80, 0x1234);

        let txn = MemoryTransaction::read(0x80, 0, FULL_MASK);
        e.process_memory_request(&txn);
        e.run();

        let (warp_id, data) = e.pop_response().expect("one response delivered");
        assert_eq!(warp_id, 0);
        assert_eq!(data, 0x1234);
    }

    #[test]
    fn exit_instruction_retires_warp_and_ends_run() {
        let mut e = engine(1);
        e.enable_decode();
        // ecall at pc 0 -> warp completes, then SimulationEnd
        e.memory_mut().main_memory_mut().write_word(0, 0x0000_0073);
        e.run();
        assert!(!e.warps()[0].active);
        let stats = e.get_statistics();
        assert_eq!(stats.instructions_executed, 1);
        assert!(stats.total_cycles < MAX_SIMULATION_CYCLES);
    }

    #[test]
    fn branch_schedules_fetch_with_penalty() {
        let mut e = engine(1);
        e.enable_decode();
        // Branch at pc 0, exit at pc 4: the post-branch fetch must fire
        // at t=3, not t=1.
        e.memory_mut().main_memory_mut().write_word(0, 0x0000_0063);
        e.memory_mut().main_memory_mut().write_word(4, 0x0000_0073);
        e.run();

        let fetch_times: Vec<u64> = e
            .trace()
            .entries()
            .iter()
            .filter(|t| t.event_tag == 2)
            .map(|t| t.time)
            .collect();
        assert_eq!(fetch_times, vec![0, 3]);
        assert!(!e.warps()[0].active);
    }

    #[test]
    fn all_warps_inactive_terminates_promptly() {
        let mut e = engine(2);
        e.enable_decode();
        // Both warps fetch an exit instruction at pc 0
        e.memory_mut().main_memory_mut().write_word(0, 0x0000_0073);
        e.run();
        assert!(e.warps().iter().all(|w| !w.active));
        assert!(!e.is_running());
        // Both completions dispatched; the loop ends as soon as the last
        // warp retires, within two events of the final completion.
        let tags: Vec<u32> = e.trace().entries().iter().map(|t| t.event_tag).collect();
        assert_eq!(tags.iter().filter(|&&t| t == 3).count(), 2);
        assert!(e.current_time() <= 2);
    }

    #[test]
    fn inactive_warp_fetches_are_dropped() {
        let mut e = engine(1);
        let mut state = e.warps()[0].clone();
        state.active = false;
        state.thread_mask = 0;
        e.set_warp_state(0, state);
        e.run();
        assert_eq!(e.get_statistics().instructions_executed, 0);
    }

    #[test]
    fn derived_rates_guard_zero_denominators() {
        let config = SimConfig {
            cache_size: 1024,
            cache_line_size: 64,
            ..SimConfig::default()
        };
        let mut e = SimulationEngine::new(config).unwrap();
        // No initialize: queue empty, nothing runs
        e.run();
        let stats = e.get_statistics();
        assert_eq!(stats.ipc, 0.0);
        assert_eq!(stats.cache_hit_rate, 0.0);
    }

    #[test]
    fn initialize_is_idempotent() {
        let mut e = engine(2);
        e.enable_decode();
        e.memory_mut().main_memory_mut().write_word(0, 0x0000_0073);
        e.run();
        e.initialize();
        let once = (
            e.current_time(),
            e.pending_events(),
            e.get_statistics(),
            e.warps().to_vec(),
        );
        e.initialize();
        let twice = (
            e.current_time(),
            e.pending_events(),
            e.get_statistics(),
            e.warps().to_vec(),
        );
        assert_eq!(once, twice);
    }

    #[test]
    fn stop_finalizes_without_draining_events() {
        let mut e = engine(2);
        let pending = e.pending_events();
        e.stop();
        assert!(!e.is_running());
        // Pending events are kept, not executed
        assert_eq!(e.pending_events(), pending);
        assert_eq!(e.get_statistics().ipc, 0.0);
    }

    #[test]
    fn submitted_requests_enter_the_queue() {
        let mut e = engine(1);
        let before = e.pending_events();
        e.submit_memory_request(MemoryTransaction::write(0x40, 5, 0, FULL_MASK));
        assert_eq!(e.pending_events(), before + 1);
        // Not processed until dispatch
        assert_eq!(e.get_statistics().memory_requests, 0);
    }

    #[test]
    fn instruction_hook_observes_fetches() {
        use std::cell::RefCell;
        use std::rc::Rc;
        let mut e = engine(1);
        e.enable_decode();
        e.memory_mut().main_memory_mut().write_word(0, 0x0000_0073);
        let seen: Rc<RefCell<Vec<(u32, u32, u32)>>> = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        e.set_instruction_hook(Box::new(move |w, pc, insn| {
            sink.borrow_mut().push((w, pc, insn));
        }));
        e.run();
        assert_eq!(seen.borrow().as_slice(), &[(0, 0, 0x0000_0073)]);
    }
}
