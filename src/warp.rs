//! Warp state tracking.
//! A warp is a group of threads executing in SIMD lockstep; each warp has
//! one program counter and an active-thread mask.

/// Thread mask with every lane participating.
pub const FULL_MASK: u32 = 0xFFFF_FFFF;

/// Per-warp execution state. A warp starts active and transitions to
/// inactive exactly once, on completion; there is no resurrection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarpState {
    /// Program counter; always 4-byte aligned
    pub pc: u32,
    /// Bit i set means thread i participates in the current instruction
    pub thread_mask: u32,
    pub active: bool,
    /// Engine cycle at which this warp last made progress
    pub last_active: u64,
}

impl WarpState {
    pub fn new() -> Self {
        WarpState {
            pc: 0,
            thread_mask: FULL_MASK,
            active: true,
            last_active: 0,
        }
    }

    /// Mark the warp finished. Terminal: callers never re-activate.
    pub fn retire(&mut self) {
        self.active = false;
    }
}

impl Default for WarpState {
    fn default() -> Self {
        WarpState::new()
    }
}

/// True when every warp has retired.
pub fn all_inactive(warps: &[WarpState]) -> bool {
    warps.iter().all(|w| !w.active)
}
