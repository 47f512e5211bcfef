use std::sync::Arc;

use log::info;
use parking_lot::RwLock;

/// Receives progress from long running lighting passes. Stepping never
/// affects results; `cancelled` is polled between solver iterations.
pub trait ProgressSink {
    fn restart(&self);
    fn step(&self);
    fn current(&self) -> u32;
    fn total(&self) -> u32;

    /// Called once per outer iteration.
    fn pulse(&self) {}

    fn cancelled(&self) -> bool {
        false
    }
}

/// Sink that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn restart(&self) {}

    fn step(&self) {}

    fn current(&self) -> u32 {
        0
    }

    fn total(&self) -> u32 {
        0
    }
}

#[derive(Debug, Default)]
struct MeterState {
    current: u32,
    total: u32,
    pulses: u64,
    logged_tenths: u32,
    cancelled: bool,
}

/// Shared progress meter. Clones observe and drive the same state, so one
/// clone can be handed to the solver while another cancels it.
#[derive(Debug, Default)]
pub struct ProgressMeter {
    state: Arc<RwLock<MeterState>>,
}

impl Clone for ProgressMeter {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl ProgressMeter {
    pub fn new(total: u32) -> Self {
        Self {
            state: Arc::new(RwLock::new(MeterState {
                total: total.max(1),
                ..MeterState::default()
            })),
        }
    }

    /// Asks the run using this meter to stop at the next iteration.
    pub fn cancel(&self) {
        self.state.write().cancelled = true;
    }

    pub fn pulses(&self) -> u64 {
        self.state.read().pulses
    }

    pub fn is_complete(&self) -> bool {
        let state = self.state.read();
        state.current >= state.total
    }
}

impl ProgressSink for ProgressMeter {
    fn restart(&self) {
        let mut state = self.state.write();
        state.current = 0;
        state.logged_tenths = 0;
    }

    fn step(&self) {
        let mut state = self.state.write();
        if state.current >= state.total {
            return;
        }
        state.current += 1;
        let tenths = state.current * 10 / state.total;
        if tenths > state.logged_tenths {
            state.logged_tenths = tenths;
            info!("{}%", tenths * 10);
        }
    }

    fn current(&self) -> u32 {
        self.state.read().current
    }

    fn total(&self) -> u32 {
        self.state.read().total
    }

    fn pulse(&self) {
        self.state.write().pulses += 1;
    }

    fn cancelled(&self) -> bool {
        self.state.read().cancelled
    }
}
