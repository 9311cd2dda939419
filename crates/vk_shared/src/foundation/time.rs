//! Frame timing utilities

use std::time::{Duration, Instant};

/// Frame timer driven once per iteration of the sample loop
pub struct Timer {
    start: Instant,
    last_tick: Instant,
    delta: Duration,
    frame_count: u64,
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

impl Timer {
    /// Create a timer starting now
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            start: now,
            last_tick: now,
            delta: Duration::ZERO,
            frame_count: 0,
        }
    }

    /// Advance to the next frame and return the elapsed time since the previous tick
    pub fn tick(&mut self) -> Duration {
        self.tick_at(Instant::now())
    }

    fn tick_at(&mut self, now: Instant) -> Duration {
        self.delta = now.saturating_duration_since(self.last_tick);
        self.last_tick = now;
        self.frame_count += 1;
        self.delta
    }

    /// Time between the last two ticks
    pub fn delta(&self) -> Duration {
        self.delta
    }

    /// Time between the last two ticks in seconds
    pub fn delta_secs(&self) -> f32 {
        self.delta.as_secs_f32()
    }

    /// Seconds since the timer was created
    pub fn total_secs(&self) -> f32 {
        self.last_tick.duration_since(self.start).as_secs_f32()
    }

    /// Number of ticks so far
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Average frames per second since creation
    pub fn average_fps(&self) -> f32 {
        let total = self.total_secs();
        if total > 0.0 {
            self.frame_count as f32 / total
        } else {
            0.0
        }
    }

    /// Instantaneous frames per second from the last delta
    pub fn current_fps(&self) -> f32 {
        let dt = self.delta_secs();
        if dt > 0.0 {
            1.0 / dt
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_tracks_delta_and_count() {
        let mut timer = Timer::new();
        let base = timer.last_tick;

        let dt = timer.tick_at(base + Duration::from_millis(16));
        assert_eq!(dt, Duration::from_millis(16));
        assert_eq!(timer.frame_count(), 1);

        timer.tick_at(base + Duration::from_millis(48));
        assert_eq!(timer.delta(), Duration::from_millis(32));
        assert_eq!(timer.frame_count(), 2);
    }

    #[test]
    fn test_fps_without_ticks_is_zero() {
        let timer = Timer::new();
        assert_eq!(timer.current_fps(), 0.0);
        assert_eq!(timer.average_fps(), 0.0);
    }

    #[test]
    fn test_current_fps() {
        let mut timer = Timer::new();
        let base = timer.last_tick;
        timer.tick_at(base + Duration::from_millis(20));
        assert!((timer.current_fps() - 50.0).abs() < 1e-3);
    }

    #[test]
    fn test_backwards_clock_saturates() {
        let mut timer = Timer::new();
        let base = timer.last_tick;
        timer.tick_at(base + Duration::from_millis(10));
        let dt = timer.tick_at(base);
        assert_eq!(dt, Duration::ZERO);
    }
}
