//! Named timing regions.
//!
//! Each region accumulates elapsed time per sample. Once a second the mean
//! per sample is published and the accumulator starts over, so the overlay
//! always shows a whole-second average instead of a jittery last value.

use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Region {
    Simulation,
    Render,
    Present,
}

impl Region {
    pub const ALL: &'static [Region] = &[Region::Simulation, Region::Render, Region::Present];

    pub fn label(self) -> &'static str {
        match self {
            Self::Simulation => "simulation",
            Self::Render => "render",
            Self::Present => "present",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone, Copy)]
struct RegionAccum {
    total_ns: u64,
    samples: u32,
    published_ns: Option<u64>,
}

/// Guard returned by [`PerfRegions::begin`].
#[must_use = "pass the timer to PerfRegions::end"]
pub struct RegionTimer {
    region: Region,
    start: Instant,
}

pub struct PerfRegions {
    regions: [RegionAccum; 3],
    window: Duration,
    window_start: Instant,
}

impl PerfRegions {
    pub fn new() -> Self {
        Self::with_window(Duration::from_secs(1), Instant::now())
    }

    pub fn with_window(window: Duration, now: Instant) -> Self {
        Self {
            regions: [RegionAccum {
                total_ns: 0,
                samples: 0,
                published_ns: None,
            }; 3],
            window,
            window_start: now,
        }
    }

    pub fn begin(&self, region: Region) -> RegionTimer {
        RegionTimer {
            region,
            start: Instant::now(),
        }
    }

    pub fn end(&mut self, timer: RegionTimer) {
        let now = Instant::now();
        self.record(timer.region, now.duration_since(timer.start), now);
    }

    /// Adds one sample and publishes averages if the window has elapsed.
    pub fn record(&mut self, region: Region, elapsed: Duration, now: Instant) {
        let accum = &mut self.regions[region.index()];
        accum.total_ns += elapsed.as_nanos() as u64;
        accum.samples += 1;

        if now.duration_since(self.window_start) >= self.window {
            for accum in &mut self.regions {
                if accum.samples > 0 {
                    accum.published_ns = Some(accum.total_ns / u64::from(accum.samples));
                }
                accum.total_ns = 0;
                accum.samples = 0;
            }
            self.window_start = now;
        }
    }

    /// Mean nanoseconds per sample over the last completed window.
    pub fn average_ns(&self, region: Region) -> Option<u64> {
        self.regions[region.index()].published_ns
    }
}

impl Default for PerfRegions {
    fn default() -> Self {
        Self::new()
    }
}
