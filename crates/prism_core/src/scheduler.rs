//! Drives a [`Simulation`] from a [`TimeState`]: zero or more fixed ticks
//! per rendered frame, followed by the lag offset the renderer interpolates
//! with.

use std::ops::ControlFlow;

use crate::time::TimeState;

/// Per-tick game state. `tick_index` is the number of ticks completed before
/// this one, so the first tick sees 0.
pub trait Simulation {
    fn tick(&mut self, tick_index: u64) -> ControlFlow<()>;
}

impl<F> Simulation for F
where
    F: FnMut(u64) -> ControlFlow<()>,
{
    fn tick(&mut self, tick_index: u64) -> ControlFlow<()> {
        self(tick_index)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameSteps {
    pub ticks: u32,
    pub lag_offset: f32,
    /// A tick asked the loop to stop (e.g. quit requested).
    pub stopped: bool,
}

/// Runs every tick the accumulator allows and computes the lag offset.
///
/// Call after `TimeState::begin_frame` (or `advance`).
pub fn run_fixed_steps<S: Simulation + ?Sized>(time: &mut TimeState, sim: &mut S) -> FrameSteps {
    let mut stopped = false;
    while time.should_step() {
        if sim.tick(time.tick_count - 1).is_break() {
            stopped = true;
            break;
        }
    }
    time.end_frame();
    FrameSteps {
        ticks: time.ticks_this_frame,
        lag_offset: time.lag_offset,
        stopped,
    }
}
