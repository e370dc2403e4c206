//! Memory subsystem: flat main memory behind a set-associative write-back,
//! write-allocate cache with LRU replacement.
//!
//! Every access is a 4-byte word. The model keeps its own access clock:
//! each request advances it by that access's latency and the resulting
//! cycle is returned as the completion time, which the engine uses to
//! schedule the response event.

use std::collections::HashMap;

use crate::cache::{AddressLayout, CacheSet, CacheStats};
use crate::config::CacheConfig;

/// Bounded access-history ring used for post-run debugging.
const MAX_HISTORY_SIZE: usize = 1000;

/// Sparse 32-bit word store keyed by byte address.
/// Unwritten words read as zero; the store never eagerly allocates.
#[derive(Debug, Default)]
pub struct MainMemory {
    words: HashMap<u32, u32>,
}

impl MainMemory {
    pub fn new() -> Self {
        MainMemory::default()
    }

    pub fn read_word(&self, address: u32) -> u32 {
        self.words.get(&address).copied().unwrap_or(0)
    }

    pub fn write_word(&mut self, address: u32, data: u32) {
        self.words.insert(address, data);
    }

    pub fn clear(&mut self) {
        self.words.clear();
    }

    /// Number of words ever written.
    pub fn population(&self) -> usize {
        self.words.len()
    }
}

/// One recorded access, oldest-first up to [`MAX_HISTORY_SIZE`].
#[derive(Debug, Clone, Copy)]
pub struct AccessRecord {
    pub address: u32,
    pub data: u32,
    pub is_write: bool,
    pub cycle: u64,
}

/// The cache-fronted memory model.
pub struct MemoryModel {
    config: CacheConfig,
    layout: AddressLayout,
    sets: Vec<CacheSet>,
    memory: MainMemory,
    stats: CacheStats,
    current_cycle: u64,
    history: Vec<AccessRecord>,
}

impl MemoryModel {
    /// Geometry must already be validated (see [`CacheConfig::validate`]).
    pub fn new(config: CacheConfig) -> Self {
        let layout = AddressLayout::new(&config);
        let num_sets = config.num_sets();
        let words = config.words_per_line();
        MemoryModel {
            layout,
            sets: (0..num_sets)
                .map(|_| CacheSet::new(config.associativity, words))
                .collect(),
            memory: MainMemory::new(),
            stats: CacheStats::default(),
            current_cycle: 0,
            history: Vec::with_capacity(MAX_HISTORY_SIZE),
            config,
        }
    }

    /// Clear all cache lines, main memory, statistics, and the access clock.
    /// Idempotent: a second call leaves the model unchanged.
    pub fn initialize(&mut self) {
        for set in &mut self.sets {
            for way in &mut set.ways {
                way.reset();
            }
        }
        self.memory.clear();
        self.stats = CacheStats::default();
        self.current_cycle = 0;
        self.history.clear();
    }

    /// Perform one 4-byte access and return the cycle at which it completes.
    ///
    /// Misalignment is a precondition violation, not a runtime error.
    pub fn process_request(&mut self, address: u32, data: u32, is_write: bool) -> u64 {
        assert!(address % 4 == 0, "memory access must be 4-byte aligned");

        if self.history.len() < MAX_HISTORY_SIZE {
            self.history.push(AccessRecord {
                address,
                data,
                is_write,
                cycle: self.current_cycle,
            });
        }

        if is_write {
            self.stats.writes += 1;
        } else {
            self.stats.reads += 1;
        }

        let physical = self.translate(address);
        let set_index = self.layout.set_index(physical) as usize;
        let tag = self.layout.tag(physical);
        let word = (self.layout.offset(physical) / 4) as usize;

        let latency = match self.sets[set_index].find(tag) {
            Some(way) => {
                self.stats.hits += 1;
                let cycle = self.current_cycle;
                let line = &mut self.sets[set_index].ways[way];
                if is_write {
                    line.data[word] = data;
                    line.dirty = true;
                }
                line.last_access = cycle;
                1 + self.bank_conflict_penalty(physical)
            }
            None => {
                self.stats.misses += 1;
                let victim_way = self.select_victim(set_index);

                let victim_dirty = {
                    let victim = &self.sets[set_index].ways[victim_way];
                    victim.valid && victim.dirty
                };
                if victim_dirty {
                    self.writeback(set_index, victim_way);
                    self.stats.evictions += 1;
                }

                // Fill from the line's base address
                let base = self.layout.line_base(physical);
                let fill: Vec<u32> = (0..self.config.words_per_line())
                    .map(|i| self.memory.read_word(base + 4 * i as u32))
                    .collect();

                let cycle = self.current_cycle;
                let line = &mut self.sets[set_index].ways[victim_way];
                line.data = fill;
                line.tag = tag;
                line.valid = true;
                line.dirty = is_write;
                line.last_access = cycle;
                if is_write {
                    line.data[word] = data;
                }

                // memory latency + fill transfer at 16 bytes/cycle
                self.config.memory_latency
                    + self.config.line_size / 16
                    + self.bank_conflict_penalty(physical)
            }
        };

        self.coherence_sweep(physical);

        self.current_cycle += u64::from(latency);
        self.current_cycle
    }

    /// Non-mutating probe: the cached word at `address`, without touching
    /// LRU state or counters.
    pub fn lookup_cache(&self, address: u32) -> Option<u32> {
        let set_index = self.layout.set_index(address) as usize;
        let tag = self.layout.tag(address);
        let word = (self.layout.offset(address) / 4) as usize;
        self.sets[set_index]
            .find(tag)
            .map(|way| self.sets[set_index].ways[way].data[word])
    }

    /// Fetch an instruction word; fills the line on a miss and retries.
    pub fn read_instruction(&mut self, address: u32) -> u32 {
        match self.lookup_cache(address) {
            Some(word) => word,
            None => {
                self.process_request(address, 0, false);
                self.lookup_cache(address).unwrap_or(0)
            }
        }
    }

    /// Update a resident line in place; falls back to a full write request
    /// when the address is not cached.
    pub fn update_cache(&mut self, address: u32, data: u32) {
        let set_index = self.layout.set_index(address) as usize;
        let tag = self.layout.tag(address);
        let word = (self.layout.offset(address) / 4) as usize;
        match self.sets[set_index].find(tag) {
            Some(way) => {
                let cycle = self.current_cycle;
                let line = &mut self.sets[set_index].ways[way];
                line.data[word] = data;
                line.dirty = true;
                line.last_access = cycle;
            }
            None => {
                self.process_request(address, data, true);
            }
        }
    }

    /// Write back (if dirty) and drop the line holding `address`.
    pub fn invalidate_line(&mut self, address: u32) {
        let set_index = self.layout.set_index(address) as usize;
        let tag = self.layout.tag(address);
        if let Some(way) = self.sets[set_index].find(tag) {
            self.writeback_if_dirty(set_index, way);
            let line = &mut self.sets[set_index].ways[way];
            line.valid = false;
            line.dirty = false;
        }
    }

    /// Explicitly evict one way, writing back dirty data and counting the
    /// eviction. Out-of-range indices are programming errors.
    pub fn evict_line(&mut self, set_index: usize, way: usize) {
        assert!(set_index < self.sets.len(), "invalid set index");
        assert!(
            way < self.config.associativity as usize,
            "invalid way index"
        );
        self.writeback_if_dirty(set_index, way);
        let line = &mut self.sets[set_index].ways[way];
        line.valid = false;
        line.dirty = false;
        self.stats.evictions += 1;
    }

    fn writeback_if_dirty(&mut self, set_index: usize, way: usize) {
        if self.sets[set_index].ways[way].valid && self.sets[set_index].ways[way].dirty {
            self.writeback(set_index, way);
        }
    }

    fn writeback(&mut self, set_index: usize, way: usize) {
        let base = self
            .layout
            .base_of(self.sets[set_index].ways[way].tag, set_index as u32);
        for i in 0..self.sets[set_index].ways[way].data.len() {
            let word = self.sets[set_index].ways[way].data[i];
            self.memory.write_word(base + 4 * i as u32, word);
        }
    }

    /// Victim choice: any invalid way (lowest index), else the smallest
    /// `last_access`, ties to the lowest index. Deterministic under equal
    /// timestamps.
    fn select_victim(&self, set_index: usize) -> usize {
        let ways = &self.sets[set_index].ways;
        if let Some(way) = ways.iter().position(|w| !w.valid) {
            return way;
        }
        let mut lru_way = 0;
        let mut lru_time = ways[0].last_access;
        for (i, way) in ways.iter().enumerate().skip(1) {
            if way.last_access < lru_time {
                lru_way = i;
                lru_time = way.last_access;
            }
        }
        lru_way
    }

    /// Extra cycles due to bank contention. The current policy charges
    /// nothing; every access still routes through here so a windowed
    /// same-bank model can be substituted without touching callers.
    fn bank_conflict_penalty(&self, address: u32) -> u32 {
        let _bank = self.layout.bank(address);
        0
    }

    /// Invalidation hook fired after every access. A single-cache simulator
    /// has no peers to notify, so nothing happens here; a MESI/MOESI
    /// protocol would act at this point. Must not touch main memory.
    fn coherence_sweep(&mut self, _address: u32) {}

    /// Identity mapping; a virtual-memory scheme would translate here.
    fn translate(&self, address: u32) -> u32 {
        address
    }

    pub fn get_cache_stats(&self) -> (u64, u64) {
        (self.stats.hits, self.stats.misses)
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn layout(&self) -> &AddressLayout {
        &self.layout
    }

    /// The model's internal access clock.
    pub fn cycle(&self) -> u64 {
        self.current_cycle
    }

    pub fn history(&self) -> &[AccessRecord] {
        &self.history
    }

    pub fn main_memory(&self) -> &MainMemory {
        &self.memory
    }

    pub fn main_memory_mut(&mut self) -> &mut MainMemory {
        &mut self.memory
    }

    /// Assert every structural invariant of the cache and its counters.
    pub fn verify_state(&self) {
        assert!(self.config.total_size > 0, "cache size must be positive");
        assert!(self.config.line_size > 0, "line size must be positive");
        assert!(
            self.config.associativity > 0,
            "associativity must be positive"
        );
        assert!(self.config.num_banks > 0, "bank count must be positive");

        assert_eq!(
            self.sets.len(),
            self.config.num_sets() as usize,
            "incorrect number of cache sets"
        );
        for set in &self.sets {
            assert_eq!(
                set.ways.len(),
                self.config.associativity as usize,
                "incorrect number of ways"
            );
            for way in &set.ways {
                assert_eq!(
                    way.data.len(),
                    self.config.words_per_line(),
                    "incorrect line word count"
                );
                if !way.valid {
                    assert!(!way.dirty, "invalid line cannot be dirty");
                }
            }
        }

        assert!(self.history.len() <= MAX_HISTORY_SIZE, "history overflow");
        assert_eq!(
            self.stats.hits + self.stats.misses,
            self.stats.reads + self.stats.writes,
            "hit/miss totals must match access totals"
        );
    }

    /// Human-readable configuration, counters, and a dump of the first
    /// few sets.
    pub fn print_cache_state(&self) {
        println!("\nCache State:");
        println!("============");
        println!("Configuration:");
        println!("  Size: {} bytes", self.config.total_size);
        println!("  Line Size: {} bytes", self.config.line_size);
        println!("  Associativity: {}-way", self.config.associativity);
        println!("  Number of Banks: {}", self.config.num_banks);
        println!();
        println!("Statistics:");
        println!("  Reads: {}", self.stats.reads);
        println!("  Writes: {}", self.stats.writes);
        println!("  Hits: {}", self.stats.hits);
        println!("  Misses: {}", self.stats.misses);
        println!("  Evictions: {}", self.stats.evictions);
        println!("  Bank Conflicts: {}", self.stats.bank_conflicts);
        println!("  Hit Rate: {:.2}%", self.stats.hit_rate() * 100.0);
        println!();
        println!("Cache Line State (first 4 sets):");
        for (i, set) in self.sets.iter().take(4).enumerate() {
            println!("Set {}:", i);
            for (j, way) in set.ways.iter().enumerate() {
                if way.valid {
                    println!(
                        "  Way {}: Valid, Tag: 0x{:x}, Dirty: {}, Last Access: {}",
                        j,
                        way.tag,
                        if way.dirty { "Yes" } else { "No" },
                        way.last_access
                    );
                } else {
                    println!("  Way {}: Invalid", j);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(total_size: u32, line_size: u32, associativity: u32, latency: u32) -> MemoryModel {
        let config = CacheConfig {
            total_size,
            line_size,
            associativity,
            num_banks: 8,
            memory_latency: latency,
        };
        config.validate().expect("test geometry must be valid");
        MemoryModel::new(config)
    }

    #[test]
    fn write_then_read_same_residency() {
        let mut m = model(1024, 64, 2, 100);
        m.process_request(0x100, 0xDEAD_BEEF, true);
        assert_eq!(m.lookup_cache(0x100), Some(0xDEAD_BEEF));
        m.process_request(0x100, 0, false);
        let (hits, misses) = m.get_cache_stats();
        assert_eq!((hits, misses), (1, 1));
    }

    #[test]
    fn address_zero_is_valid() {
        let mut m = model(1024, 64, 2, 100);
        let done = m.process_request(0, 0, false);
        assert!(done > 0);
        assert_eq!(m.lookup_cache(0), Some(0));
    }

    #[test]
    #[should_panic(expected = "aligned")]
    fn misaligned_access_panics() {
        let mut m = model(1024, 64, 2, 100);
        m.process_request(0x102, 0, false);
    }

    #[test]
    fn hit_and_miss_latencies() {
        let mut m = model(1024, 64, 2, 100);
        // Miss: 100 + 64/16 = 104 cycles
        let t1 = m.process_request(0x40, 0, false);
        assert_eq!(t1, 104);
        // Hit: 1 cycle
        let t2 = m.process_request(0x44, 0, false);
        assert_eq!(t2, 105);
    }

    #[test]
    fn lru_evicts_oldest_tag() {
        // 1 set, 2 ways, 64B lines
        let mut m = model(128, 64, 2, 10);
        m.process_request(0x00, 0, false);
        m.process_request(0x40, 0, false);
        // Third distinct tag evicts the first-inserted
        m.process_request(0x80, 0, false);
        assert_eq!(m.lookup_cache(0x00), None);
        assert!(m.lookup_cache(0x40).is_some());
        assert!(m.lookup_cache(0x80).is_some());
        // Re-access of the first tag misses and evicts the second
        m.process_request(0x00, 0, false);
        assert_eq!(m.lookup_cache(0x40), None);
        assert_eq!(m.stats().misses, 4);
    }

    #[test]
    fn invalid_way_preferred_over_lru() {
        let mut m = model(128, 64, 2, 10);
        m.process_request(0x00, 0, false);
        // Way 1 is still invalid; the second tag must land there, not evict
        m.process_request(0x40, 0, false);
        assert!(m.lookup_cache(0x00).is_some());
        assert!(m.lookup_cache(0x40).is_some());
        assert_eq!(m.stats().evictions, 0);
    }

    #[test]
    fn dirty_eviction_writes_back() {
        // Direct-mapped single set
        let mut m = model(64, 64, 1, 10);
        m.process_request(0x00, 0xDEAD, true);
        assert_eq!(m.main_memory().read_word(0), 0);
        // Conflict evicts the dirty line
        m.process_request(0x40, 0, false);
        assert_eq!(m.main_memory().read_word(0), 0xDEAD);
        assert_eq!(m.stats().evictions, 1);
        // A fresh read of the written address sees the written value
        m.process_request(0x00, 0, false);
        assert_eq!(m.lookup_cache(0x00), Some(0xDEAD));
    }

    #[test]
    fn clean_eviction_is_not_counted() {
        let mut m = model(64, 64, 1, 10);
        m.process_request(0x00, 0, false);
        m.process_request(0x40, 0, false);
        assert_eq!(m.stats().evictions, 0);
    }

    #[test]
    fn miss_fill_loads_whole_line() {
        let mut m = model(1024, 64, 2, 100);
        for i in 0..16 {
            m.main_memory_mut().write_word(0x80 + 4 * i, i + 1);
        }
        m.process_request(0x80, 0, false);
        for i in 0..16 {
            assert_eq!(m.lookup_cache(0x80 + 4 * i), Some(i + 1));
        }
    }

    #[test]
    fn lookup_does_not_touch_lru() {
        let mut m = model(128, 64, 2, 10);
        m.process_request(0x00, 0, false);
        // Advance the clock so the next fill gets a later timestamp
        m.process_request(0x40, 0, false);
        // Probing the older line must not refresh it...
        assert!(m.lookup_cache(0x00).is_some());
        // ...so the next conflicting fill still evicts it
        m.process_request(0x80, 0, false);
        assert_eq!(m.lookup_cache(0x00), None);
    }

    #[test]
    fn read_instruction_fills_on_miss() {
        let mut m = model(1024, 64, 2, 100);
        m.main_memory_mut().write_word(0x200, 0x0000_0073);
        assert_eq!(m.lookup_cache(0x200), None);
        assert_eq!(m.read_instruction(0x200), 0x0000_0073);
        assert_eq!(m.lookup_cache(0x200), Some(0x0000_0073));
    }

    #[test]
    fn update_cache_dirties_resident_line() {
        let mut m = model(1024, 64, 2, 100);
        m.process_request(0x40, 0, false);
        let accesses_before = m.stats().reads + m.stats().writes;
        m.update_cache(0x44, 99);
        // In-place update, no new access counted
        assert_eq!(m.stats().reads + m.stats().writes, accesses_before);
        assert_eq!(m.lookup_cache(0x44), Some(99));
    }

    #[test]
    fn invalidate_line_writes_back_dirty_data() {
        let mut m = model(1024, 64, 2, 100);
        m.process_request(0x40, 0xCAFE, true);
        m.invalidate_line(0x40);
        assert_eq!(m.lookup_cache(0x40), None);
        assert_eq!(m.main_memory().read_word(0x40), 0xCAFE);
        m.verify_state();
    }

    #[test]
    fn initialize_is_idempotent() {
        let mut m = model(1024, 64, 2, 100);
        m.process_request(0x40, 7, true);
        m.initialize();
        let once = (m.stats(), m.cycle(), m.main_memory().population());
        m.initialize();
        assert_eq!(once, (m.stats(), m.cycle(), m.main_memory().population()));
        assert_eq!(m.lookup_cache(0x40), None);
        m.verify_state();
    }

    #[test]
    fn stats_identity_holds() {
        let mut m = model(1024, 64, 2, 100);
        for i in 0..32 {
            m.process_request(i * 4, i, i % 3 == 0);
        }
        let s = m.stats();
        assert_eq!(s.hits + s.misses, s.reads + s.writes);
        m.verify_state();
    }

    #[test]
    fn cold_fill_then_conflict_evicts_first_inserted() {
        // Associativity 4, 1 set: fill with 4 distinct tags, all miss
        let mut m = model(256, 64, 4, 10);
        for t in 0..4u32 {
            m.process_request(t * 0x40, 0, false);
        }
        assert_eq!(m.stats().misses, 4);
        assert_eq!(m.stats().hits, 0);
        // The 5th distinct tag evicts tag 0, not any later one
        m.process_request(4 * 0x40, 0, false);
        assert_eq!(m.lookup_cache(0), None);
        for t in 1..5u32 {
            assert!(m.lookup_cache(t * 0x40).is_some(), "tag {} missing", t);
        }
    }
}
