//! Live metrics for the TUI visualizer.
//!
//! The engine writes a JSON snapshot to METRICS_PATH at every statistics
//! sample when live metrics are enabled. The viz binary polls this file
//! and re-renders the dashboard. Writes are atomic (write to .tmp then
//! rename) to avoid torn reads.

use serde::{Deserialize, Serialize};

pub const METRICS_PATH: &str = "/tmp/warpsim_live.json";

#[derive(Serialize, Deserialize, Default, Clone, Debug)]
pub struct LiveMetrics {
    /// "idle" | "running" | "complete"
    pub status: String,
    /// Current simulation time in cycles
    pub cycle: u64,
    pub instructions_executed: u64,
    pub memory_requests: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    /// Instructions per cycle; 0.0 until finalized
    pub ipc: f64,
    /// Cache hit fraction [0.0, 1.0]; 0.0 until finalized
    pub cache_hit_rate: f64,
    pub num_warps: u32,
    /// Active flag per warp — index = warp id
    pub warp_active: Vec<bool>,
    /// Program counter per warp — index = warp id
    pub warp_pcs: Vec<u32>,
    /// Events still queued in the engine
    pub events_pending: usize,
    /// Unix timestamp in ms when this snapshot was written
    pub timestamp_ms: u64,
}

/// Atomically write metrics to METRICS_PATH.
/// Uses a .tmp intermediate file + rename to avoid torn reads by the viz.
pub fn write_metrics(metrics: &LiveMetrics) {
    if let Ok(json) = serde_json::to_string(metrics) {
        let tmp = format!("{}.tmp", METRICS_PATH);
        if std::fs::write(&tmp, &json).is_ok() {
            let _ = std::fs::rename(&tmp, METRICS_PATH);
        }
    }
}

/// Read the latest metrics snapshot. Returns None if the file doesn't exist
/// or can't be parsed (e.g. no simulation has run yet).
pub fn read_metrics() -> Option<LiveMetrics> {
    let data = std::fs::read_to_string(METRICS_PATH).ok()?;
    serde_json::from_str(&data).ok()
}

/// Returns current Unix time in milliseconds.
pub fn now_ms() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
