//! End-to-end scenarios driving the public simulator API.

use warpsim::cache::CacheStats;
use warpsim::config::{CacheConfig, SimConfig};
use warpsim::engine::{SimulationEngine, MAX_SIMULATION_CYCLES};
use warpsim::event::MemoryTransaction;
use warpsim::loader::ProgramLoader;
use warpsim::memory::MemoryModel;
use warpsim::warp::FULL_MASK;

fn sim_config(num_warps: u32, cache_size: u32, line_size: u32, latency: u32) -> SimConfig {
    SimConfig {
        num_warps,
        threads_per_warp: 32,
        cache_size,
        cache_line_size: line_size,
        memory_latency: latency,
        trace_file: None,
    }
}

fn cache_config(total: u32, line: u32, ways: u32, latency: u32) -> CacheConfig {
    CacheConfig {
        total_size: total,
        line_size: line,
        associativity: ways,
        num_banks: 8,
        memory_latency: latency,
    }
}

/// Build an engine running `body_words` straight-line instructions
/// followed by an exit, starting at address 0.
fn engine_with_program(config: SimConfig, body_words: u32) -> SimulationEngine {
    let mut engine = SimulationEngine::new(config).expect("valid config");
    engine.initialize();
    engine.enable_decode();
    {
        let mut loader = ProgramLoader::new(engine.memory_mut());
        loader.load_words((0..body_words).map(|_| 0x0000_0013u32));
        loader.load_words([0x0000_0073u32]);
    }
    engine
}

#[test]
fn single_warp_linear_fetch() {
    let mut engine = engine_with_program(sim_config(1, 1024, 64, 100), 512);
    engine.run();

    let stats = engine.get_statistics();
    assert!(stats.instructions_executed > 0);
    assert_eq!(stats.instructions_executed, 513);
    // 513 words starting at 0 span 33 lines of 64 bytes
    assert!(stats.cache_misses >= 1);
    assert_eq!(stats.cache_misses, 33);
    assert!(stats.total_cycles < MAX_SIMULATION_CYCLES);
    engine.check_simulation_state();
}

#[test]
fn sequential_reads_hit_within_lines() {
    // Data-side locality: one miss fills a 16-word line, the next 15
    // word reads hit.
    let config = sim_config(1, 1024, 64, 100);
    let mut engine = SimulationEngine::new(config).expect("valid config");
    engine.initialize();
    for i in 0..64u32 {
        let txn = MemoryTransaction::read(0x1000 + 4 * i, 0, FULL_MASK);
        engine.process_memory_request(&txn);
    }
    let stats = engine.memory().stats();
    assert_eq!(stats.misses, 4);
    assert_eq!(stats.hits, 60);
    assert_eq!(stats.hits, stats.misses * 15);
}

#[test]
fn lru_eviction_order() {
    // Two ways, one set: three distinct tags force an LRU eviction.
    let mut model = MemoryModel::new(cache_config(128, 64, 2, 10));
    model.process_request(0x00, 0, false);
    model.process_request(0x40, 0, false);
    model.process_request(0x80, 0, false);

    assert_eq!(model.lookup_cache(0x00), None, "first tag must be evicted");
    assert!(model.lookup_cache(0x40).is_some());
    assert!(model.lookup_cache(0x80).is_some());

    // Re-accessing the first tag misses once and evicts the second tag
    let CacheStats { misses: before, .. } = model.stats();
    model.process_request(0x00, 0, false);
    let stats = model.stats();
    assert_eq!(stats.misses, before + 1);
    assert_eq!(model.lookup_cache(0x40), None);
    assert!(model.lookup_cache(0x80).is_some());
}

#[test]
fn writeback_to_main_memory() {
    // Direct-mapped, one set: a dirty line is written back on eviction.
    let mut model = MemoryModel::new(cache_config(64, 64, 1, 10));
    model.process_request(0x00, 0xDEAD, true);
    model.process_request(0x40, 0, false);

    assert_eq!(model.main_memory().read_word(0), 0xDEAD);
    assert_eq!(model.stats().evictions, 1);
    model.verify_state();
}

#[test]
fn branch_penalty_delays_next_fetch() {
    let config = sim_config(1, 1024, 64, 100);
    let mut engine = SimulationEngine::new(config).expect("valid config");
    engine.initialize();
    engine.enable_decode();
    {
        let mut loader = ProgramLoader::new(engine.memory_mut());
        // branch, then exit
        loader.load_words([0x0000_0063u32, 0x0000_0073]);
    }
    engine.run();

    let fetch_times: Vec<u64> = engine
        .trace()
        .entries()
        .iter()
        .filter(|e| e.event_tag == 2)
        .map(|e| e.time)
        .collect();
    // The post-branch fetch fires at t + 3, not t + 1
    assert_eq!(fetch_times, vec![0, 3]);
}

#[test]
fn exit_retires_warp_and_terminates() {
    let mut engine = engine_with_program(sim_config(1, 1024, 64, 100), 0);
    engine.run();

    assert!(!engine.warps()[0].active);
    assert!(!engine.is_running());
    // One fetch, one completion: the run ends almost immediately
    assert!(engine.current_time() <= 2);
    assert_eq!(engine.get_statistics().instructions_executed, 1);
}

#[test]
fn identical_runs_are_byte_identical() {
    let run_once = |tag: &str| {
        let config = sim_config(4, 4096, 64, 50);
        let mut engine = SimulationEngine::new(config).expect("valid config");
        engine.initialize();
        engine.enable_decode();
        {
            let mut loader = ProgramLoader::new(engine.memory_mut());
            loader.load_words((0..40).map(|i| {
                if i == 20 {
                    0x0000_0063u32 // branch mid-stream
                } else {
                    0x0000_0013
                }
            }));
            loader.load_words([0x0000_0073u32]);
        }
        let txn = MemoryTransaction::read(0x2000, 1, FULL_MASK);
        engine.process_memory_request(&txn);
        engine.run();

        let path = std::env::temp_dir().join(format!("warpsim_determinism_{}.csv", tag));
        engine.dump_trace(&path).expect("trace written");
        let text = std::fs::read_to_string(&path).expect("trace readable");
        let _ = std::fs::remove_file(&path);
        (text, engine.get_statistics())
    };

    let (trace_a, stats_a) = run_once("a");
    let (trace_b, stats_b) = run_once("b");
    assert_eq!(trace_a, trace_b);
    assert_eq!(stats_a, stats_b);
    assert!(!trace_a.is_empty());
}

#[test]
fn initialize_resets_for_an_equivalent_rerun() {
    let mut engine = engine_with_program(sim_config(2, 1024, 64, 10), 16);
    engine.run();
    let first = engine.get_statistics();

    engine.initialize();
    engine.enable_decode();
    {
        let mut loader = ProgramLoader::new(engine.memory_mut());
        loader.load_words((0..16).map(|_| 0x0000_0013u32));
        loader.load_words([0x0000_0073u32]);
    }
    engine.run();
    assert_eq!(engine.get_statistics(), first);
}
