//! Fixed-timestep clock.
//!
//! Wall-clock frame time is converted to whole microseconds and added to an
//! integer accumulator. Ticks are drained from the accumulator in exact
//! `tick_us` units, so the number of ticks that have run after a given amount
//! of simulated time never depends on how that time was split into frames.

use std::time::Instant;

const FPS_SAMPLE_COUNT: usize = 60;

/// Largest lag offset handed to the renderer. Keeps the value inside `[0, 1)`.
const MAX_LAG_OFFSET: f32 = 1.0 - f32::EPSILON;

pub struct TimeState {
    pub tick_us: u64,
    /// Frame deltas above this are clamped before accumulation.
    pub max_frame_us: u64,
    /// Ticks allowed in one frame before the remaining backlog is dropped.
    pub max_ticks_per_frame: u32,
    accumulator_us: u64,
    pub total_time_us: u64,
    pub tick_count: u64,
    pub frame_count: u64,
    pub ticks_this_frame: u32,
    pub real_dt: f64,
    last_instant: Instant,
    pub lag_offset: f32,

    fps_samples: [f64; FPS_SAMPLE_COUNT],
    fps_sample_index: usize,
    pub smoothed_fps: f64,
    pub smoothed_frame_time_ms: f64,
}

impl TimeState {
    pub fn new(tick_rate_hz: u32, max_frame_seconds: f64) -> Self {
        assert!(tick_rate_hz > 0, "tick rate must be positive");
        let tick_us = (1_000_000 + u64::from(tick_rate_hz) / 2) / u64::from(tick_rate_hz);
        let tick_secs = tick_us as f64 / 1_000_000.0;
        Self {
            tick_us,
            max_frame_us: (max_frame_seconds * 1_000_000.0).round() as u64,
            max_ticks_per_frame: 16,
            accumulator_us: 0,
            total_time_us: 0,
            tick_count: 0,
            frame_count: 0,
            ticks_this_frame: 0,
            real_dt: 0.0,
            last_instant: Instant::now(),
            lag_offset: 0.0,
            fps_samples: [tick_secs; FPS_SAMPLE_COUNT],
            fps_sample_index: 0,
            smoothed_fps: 1.0 / tick_secs,
            smoothed_frame_time_ms: tick_secs * 1000.0,
        }
    }

    pub fn tick_seconds(&self) -> f64 {
        self.tick_us as f64 / 1_000_000.0
    }

    /// Measures the wall-clock time since the previous call and feeds it to
    /// [`TimeState::advance`].
    pub fn begin_frame(&mut self) {
        let now = Instant::now();
        let real_dt = now.duration_since(self.last_instant).as_secs_f64();
        self.last_instant = now;
        self.advance(real_dt);
    }

    /// Accumulates `real_dt` seconds of frame time. Exposed separately from
    /// `begin_frame` so callers can drive the clock with synthetic deltas.
    pub fn advance(&mut self, real_dt: f64) {
        let mut frame_us = (real_dt.max(0.0) * 1_000_000.0).round() as u64;

        // Spiral-of-death cap
        if frame_us > self.max_frame_us {
            log::warn!(
                "Frame took {:.1}ms, capping accumulator to {:.1}ms",
                frame_us as f64 / 1000.0,
                self.max_frame_us as f64 / 1000.0
            );
            frame_us = self.max_frame_us;
        }

        self.real_dt = frame_us as f64 / 1_000_000.0;
        self.accumulator_us += frame_us;
        self.ticks_this_frame = 0;
        self.frame_count += 1;

        self.fps_samples[self.fps_sample_index] = self.real_dt;
        self.fps_sample_index = (self.fps_sample_index + 1) % FPS_SAMPLE_COUNT;
        let avg_dt: f64 = self.fps_samples.iter().sum::<f64>() / FPS_SAMPLE_COUNT as f64;
        self.smoothed_frame_time_ms = avg_dt * 1000.0;
        self.smoothed_fps = if avg_dt > 0.0 { 1.0 / avg_dt } else { 0.0 };
    }

    /// Consumes one tick from the accumulator when enough time has built up.
    pub fn should_step(&mut self) -> bool {
        if self.accumulator_us < self.tick_us {
            return false;
        }
        if self.ticks_this_frame >= self.max_ticks_per_frame {
            let dropped = self.accumulator_us / self.tick_us;
            log::warn!("Dropping {dropped} pending ticks after {} ticks this frame", self.ticks_this_frame);
            self.accumulator_us %= self.tick_us;
            return false;
        }
        self.accumulator_us -= self.tick_us;
        self.total_time_us += self.tick_us;
        self.tick_count += 1;
        self.ticks_this_frame += 1;
        true
    }

    pub fn end_frame(&mut self) {
        let lag = self.accumulator_us as f64 / self.tick_us as f64;
        self.lag_offset = (lag as f32).clamp(0.0, MAX_LAG_OFFSET);
    }

    pub fn accumulator_us(&self) -> u64 {
        self.accumulator_us
    }
}

impl Default for TimeState {
    fn default() -> Self {
        Self::new(60, 0.25)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(time: &mut TimeState) -> u32 {
        let mut n = 0;
        while time.should_step() {
            n += 1;
        }
        time.end_frame();
        n
    }

    #[test]
    fn test_tick_duration_rounds_to_microseconds() {
        assert_eq!(TimeState::new(60, 0.25).tick_us, 16_667);
        assert_eq!(TimeState::new(100, 0.25).tick_us, 10_000);
    }

    #[test]
    fn test_no_tick_until_full_duration_accumulated() {
        let mut time = TimeState::new(100, 0.25);
        time.advance(0.009);
        assert_eq!(drain(&mut time), 0);
        time.advance(0.001);
        assert_eq!(drain(&mut time), 1);
        assert_eq!(time.tick_count, 1);
    }

    #[test]
    fn test_lag_offset_is_remaining_fraction() {
        let mut time = TimeState::new(100, 0.25);
        time.advance(0.025);
        assert_eq!(drain(&mut time), 2);
        assert!((time.lag_offset - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_lag_offset_stays_below_one() {
        let mut time = TimeState::new(60, 0.25);
        for _ in 0..500 {
            time.advance(0.0071);
            drain(&mut time);
            assert!(time.lag_offset >= 0.0 && time.lag_offset < 1.0);
        }
    }

    #[test]
    fn test_large_frame_is_clamped() {
        let mut time = TimeState::new(100, 0.25);
        time.advance(5.0);
        assert!((time.real_dt - 0.25).abs() < 1e-9);
        time.max_ticks_per_frame = 100;
        assert_eq!(drain(&mut time), 25);
    }

    #[test]
    fn test_tick_cap_drops_backlog() {
        let mut time = TimeState::new(100, 1.0);
        time.max_ticks_per_frame = 4;
        time.advance(0.105);
        assert_eq!(drain(&mut time), 4);
        assert_eq!(time.accumulator_us(), 5_000);
        assert!((time.lag_offset - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_tick_count_independent_of_frame_split() {
        let mut fast = TimeState::new(60, 0.25);
        let mut slow = TimeState::new(60, 0.25);
        // One simulated second either way, split into 1ms or 50ms frames.
        for _ in 0..1000 {
            fast.advance(0.001);
            drain(&mut fast);
        }
        for _ in 0..20 {
            slow.advance(0.05);
            drain(&mut slow);
        }
        assert_eq!(fast.tick_count, slow.tick_count);
        assert_eq!(fast.accumulator_us(), slow.accumulator_us());
    }

    #[test]
    fn test_negative_delta_is_ignored() {
        let mut time = TimeState::new(60, 0.25);
        time.advance(-1.0);
        assert_eq!(time.accumulator_us(), 0);
        assert_eq!(time.frame_count, 1);
    }

    #[test]
    fn test_smoothed_fps_tracks_frame_time() {
        let mut time = TimeState::new(60, 0.25);
        for _ in 0..FPS_SAMPLE_COUNT {
            time.advance(0.01);
        }
        assert!((time.smoothed_fps - 100.0).abs() < 1e-6);
        assert!((time.smoothed_frame_time_ms - 10.0).abs() < 1e-6);
    }
}
