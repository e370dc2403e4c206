//! Simulator configuration: warp count, cache geometry, memory timing.
//!
//! Associativity and bank count are fixed at hardware-like defaults; the
//! tunable knobs are the warp count, total cache size, line size, and DRAM
//! latency. Geometry derived from these (set count, bit widths) must come
//! out as powers of two, which `validate` checks up front.

use std::path::PathBuf;

use thiserror::Error;

/// Ways per cache set.
pub const ASSOCIATIVITY: u32 = 8;
/// Independent memory banks, interleaved at word granularity.
pub const NUM_BANKS: u32 = 8;

/// Top-level simulation configuration.
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Number of warps driven by the engine
    pub num_warps: u32,
    /// Threads per warp (width of the thread mask)
    pub threads_per_warp: u32,
    /// Total cache size in bytes
    pub cache_size: u32,
    /// Cache line size in bytes (power of two)
    pub cache_line_size: u32,
    /// DRAM access latency in cycles
    pub memory_latency: u32,
    /// Optional CSV trace output path
    pub trace_file: Option<PathBuf>,
}

impl Default for SimConfig {
    fn default() -> Self {
        SimConfig {
            num_warps: 4,
            threads_per_warp: 32,
            cache_size: 16 * 1024,
            cache_line_size: 64,
            memory_latency: 100,
            trace_file: None,
        }
    }
}

/// Cache geometry and timing, derived from [`SimConfig`].
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Total cache size in bytes
    pub total_size: u32,
    /// Line size in bytes
    pub line_size: u32,
    /// Ways per set
    pub associativity: u32,
    /// Memory bank count
    pub num_banks: u32,
    /// DRAM access latency in cycles
    pub memory_latency: u32,
}

impl CacheConfig {
    pub fn num_sets(&self) -> u32 {
        self.total_size / (self.line_size * self.associativity)
    }

    /// 32-bit words held by one line.
    pub fn words_per_line(&self) -> usize {
        (self.line_size / 4) as usize
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.line_size.is_power_of_two() {
            return Err(ConfigError::LineSizeNotPowerOfTwo {
                line_size: self.line_size,
            });
        }
        let num_sets = self.num_sets();
        if num_sets == 0 || !num_sets.is_power_of_two() {
            return Err(ConfigError::BadSetCount {
                total_size: self.total_size,
                line_size: self.line_size,
                associativity: self.associativity,
                num_sets,
            });
        }
        Ok(())
    }
}

impl SimConfig {
    /// Derive the cache geometry from this configuration.
    pub fn cache(&self) -> CacheConfig {
        CacheConfig {
            total_size: self.cache_size,
            line_size: self.cache_line_size,
            associativity: ASSOCIATIVITY,
            num_banks: NUM_BANKS,
            memory_latency: self.memory_latency,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_warps == 0 {
            return Err(ConfigError::NoWarps);
        }
        self.cache().validate()
    }
}

/// Configuration mistakes caught at initialization.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cache line size {line_size} is not a power of two")]
    LineSizeNotPowerOfTwo { line_size: u32 },

    #[error(
        "cache geometry {total_size}B / ({line_size}B x {associativity} ways) \
         yields {num_sets} sets; set count must be a nonzero power of two"
    )]
    BadSetCount {
        total_size: u32,
        line_size: u32,
        associativity: u32,
        num_sets: u32,
    },

    #[error("simulation requires at least one warp")]
    NoWarps,
}
