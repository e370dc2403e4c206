//! Cache storage: address decomposition, lines, sets, statistics.
//!
//! An address splits as tag | set index | line offset, with widths derived
//! from log2(line_size) and log2(num_sets). Banks interleave at word
//! granularity: bank = (address / 4) mod num_banks.

use crate::config::CacheConfig;

/// Precomputed bit widths for splitting a 32-bit byte address.
#[derive(Debug, Clone, Copy)]
pub struct AddressLayout {
    /// log2(line_size)
    pub offset_bits: u32,
    /// log2(num_sets)
    pub set_bits: u32,
    pub num_banks: u32,
}

impl AddressLayout {
    pub fn new(config: &CacheConfig) -> Self {
        let num_sets = config.num_sets();
        debug_assert!(config.line_size.is_power_of_two());
        debug_assert!(num_sets.is_power_of_two() && num_sets > 0);
        AddressLayout {
            offset_bits: config.line_size.trailing_zeros(),
            set_bits: num_sets.trailing_zeros(),
            num_banks: config.num_banks,
        }
    }

    /// Byte offset within the line.
    pub fn offset(&self, address: u32) -> u32 {
        address & ((1 << self.offset_bits) - 1)
    }

    pub fn set_index(&self, address: u32) -> u32 {
        (address >> self.offset_bits) & ((1 << self.set_bits) - 1)
    }

    pub fn tag(&self, address: u32) -> u32 {
        address >> (self.offset_bits + self.set_bits)
    }

    pub fn bank(&self, address: u32) -> u32 {
        (address >> 2) % self.num_banks
    }

    /// Base byte address of the line containing `address`.
    pub fn line_base(&self, address: u32) -> u32 {
        address & !((1u32 << self.offset_bits) - 1)
    }

    /// Reconstruct a resident line's base byte address from its tag and set
    /// index. Used when writing a victim back to main memory.
    pub fn base_of(&self, tag: u32, set_index: u32) -> u32 {
        (tag << (self.offset_bits + self.set_bits)) | (set_index << self.offset_bits)
    }
}

/// One cache line. Invariant: `!valid` implies `!dirty`.
#[derive(Debug, Clone)]
pub struct CacheLine {
    pub tag: u32,
    /// line_size/4 words
    pub data: Vec<u32>,
    pub valid: bool,
    pub dirty: bool,
    /// Engine cycle of the last hit or fill; encodes LRU order
    pub last_access: u64,
}

impl CacheLine {
    pub fn new(words_per_line: usize) -> Self {
        CacheLine {
            tag: 0,
            data: vec![0; words_per_line],
            valid: false,
            dirty: false,
            last_access: 0,
        }
    }

    /// Return the line to its post-initialize state.
    pub fn reset(&mut self) {
        self.tag = 0;
        self.data.fill(0);
        self.valid = false;
        self.dirty = false;
        self.last_access = 0;
    }
}

/// One set: `associativity` ways with no ordering beyond `last_access`.
#[derive(Debug)]
pub struct CacheSet {
    pub ways: Vec<CacheLine>,
}

impl CacheSet {
    pub fn new(associativity: u32, words_per_line: usize) -> Self {
        CacheSet {
            ways: (0..associativity)
                .map(|_| CacheLine::new(words_per_line))
                .collect(),
        }
    }

    /// Index of the valid way holding `tag`, if resident.
    pub fn find(&self, tag: u32) -> Option<usize> {
        self.ways
            .iter()
            .position(|way| way.valid && way.tag == tag)
    }
}

/// Monotone access counters. Invariant: hits + misses == reads + writes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub reads: u64,
    pub writes: u64,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub bank_conflicts: u64,
}

impl CacheStats {
    /// Hit fraction over all accesses; 0.0 before any access.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
