use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use warpsim::config::SimConfig;
use warpsim::engine::SimulationEngine;
use warpsim::loader::ProgramLoader;

#[derive(Parser, Debug)]
#[command(about = "Cycle-level simulator for a SIMT (warp-based) GPU pipeline")]
struct Args {
    /// Number of warps
    #[arg(long, default_value_t = 4)]
    num_warps: u32,

    /// Threads per warp
    #[arg(long, default_value_t = 32)]
    threads_per_warp: u32,

    /// Total cache size in bytes
    #[arg(long, default_value_t = 16384)]
    cache_size: u32,

    /// Cache line size in bytes (power of two)
    #[arg(long, default_value_t = 64)]
    cache_line_size: u32,

    /// DRAM access latency in cycles
    #[arg(long, default_value_t = 100)]
    memory_latency: u32,

    /// Load a little-endian binary program
    #[arg(long)]
    binary: Option<PathBuf>,

    /// Load a two-pass assembly program (label: defs, @label refs)
    #[arg(long)]
    assembly: Option<PathBuf>,

    /// Classify fetched instructions (branch penalty, exit on system ops)
    #[arg(long, default_value_t = false)]
    decode: bool,

    /// Write the event trace as CSV after the run
    #[arg(long)]
    trace_file: Option<PathBuf>,

    /// Publish live metrics snapshots for the viz binary
    #[arg(long, default_value_t = false)]
    live: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let config = SimConfig {
        num_warps: args.num_warps,
        threads_per_warp: args.threads_per_warp,
        cache_size: args.cache_size,
        cache_line_size: args.cache_line_size,
        memory_latency: args.memory_latency,
        trace_file: args.trace_file.clone(),
    };

    let mut engine = match SimulationEngine::new(config) {
        Ok(engine) => engine,
        Err(err) => {
            eprintln!("[warpsim] configuration error: {}", err);
            return ExitCode::FAILURE;
        }
    };
    engine.initialize();

    if args.decode {
        engine.enable_decode();
    }
    if args.live {
        engine.enable_live_metrics();
    }

    if let Some(path) = &args.binary {
        let mut loader = ProgramLoader::new(engine.memory_mut());
        match loader.load_binary(path) {
            Ok(start) => println!(
                "[warpsim] loaded binary '{}' at 0x{:x}",
                path.display(),
                start
            ),
            Err(err) => {
                eprintln!("[warpsim] load error: {}", err);
                return ExitCode::FAILURE;
            }
        }
    }

    if let Some(path) = &args.assembly {
        let mut loader = ProgramLoader::new(engine.memory_mut());
        match loader.load_assembly(path) {
            Ok(start) => println!(
                "[warpsim] loaded assembly '{}' at 0x{:x}",
                path.display(),
                start
            ),
            Err(err) => {
                eprintln!("[warpsim] load error: {}", err);
                return ExitCode::FAILURE;
            }
        }
    }

    // Without a program, run a built-in demo: every warp walks a few
    // cache lines of straight-line instructions and exits. Decode is
    // required for the exit to take effect.
    if args.binary.is_none() && args.assembly.is_none() {
        let memory = engine.memory_mut().main_memory_mut();
        for i in 0..256u32 {
            memory.write_word(4 * i, 0x0000_0013);
        }
        memory.write_word(4 * 256, 0x0000_0073);
        engine.enable_decode();
        println!("[warpsim] no program given; running built-in demo (257 instructions/warp)");
    }

    println!(
        "[warpsim] starting: {} warps, {}B cache ({}B lines), {} cycle memory latency",
        args.num_warps, args.cache_size, args.cache_line_size, args.memory_latency,
    );

    engine.run();

    engine.check_simulation_state();
    engine.verify_memory_consistency();

    engine.print_statistics();
    engine.memory().print_cache_state();

    if let Some(path) = &args.trace_file {
        match engine.dump_trace(path) {
            Ok(()) => println!(
                "\n[warpsim] trace written to '{}' ({} events)",
                path.display(),
                engine.trace().len()
            ),
            Err(err) => {
                eprintln!("[warpsim] could not write trace: {}", err);
                return ExitCode::FAILURE;
            }
        }
    }

    ExitCode::SUCCESS
}
