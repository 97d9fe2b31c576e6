//! Cooperative per-frame tick driver.
//!
//! The host (window event loop) calls [`FrameScheduler::begin_tick`] from its redraw
//! signal and [`FrameScheduler::end_tick`] once the frame is submitted. The scheduler
//! never spawns anything itself; `stop` is a flag the next tick observes.

use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SchedulerState {
    #[default]
    Stopped,
    Running,
}

/// One discrete frame handed to the renderer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameTick {
    pub index: u64,
    /// Time since the previous tick. Zero on the first tick after `start`.
    pub delta: Duration,
}

impl FrameTick {
    pub fn delta_seconds(&self) -> f32 {
        self.delta.as_secs_f32()
    }
}

#[derive(Clone, Debug, Default)]
pub struct FrameStats {
    pub frame_count: u64,
    pub last_frame: Duration,
    /// Exponential moving average of the frame time, in milliseconds.
    pub smoothed_frame_ms: f32,
}

impl FrameStats {
    const SMOOTHING: f32 = 0.1;

    fn record(&mut self, frame_time: Duration) {
        let ms = frame_time.as_secs_f32() * 1000.0;
        self.smoothed_frame_ms = if self.frame_count == 0 {
            ms
        } else {
            self.smoothed_frame_ms + (ms - self.smoothed_frame_ms) * Self::SMOOTHING
        };
        self.last_frame = frame_time;
        self.frame_count += 1;
    }

    pub fn fps(&self) -> f32 {
        if self.smoothed_frame_ms > 0.0 {
            1000.0 / self.smoothed_frame_ms
        } else {
            0.0
        }
    }
}

#[derive(Debug, Default)]
pub struct FrameScheduler {
    state: SchedulerState,
    previous: Option<Instant>,
    in_tick: bool,
    next_index: u64,
    stats: FrameStats,
}

impl FrameScheduler {
    const STATS_LOG_INTERVAL: u64 = 300;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == SchedulerState::Running
    }

    pub fn stats(&self) -> &FrameStats {
        &self.stats
    }

    /// Arms the loop. The next tick reports zero elapsed time.
    pub fn start(&mut self) {
        if self.is_running() {
            return;
        }
        log::debug!("frame scheduler started");
        self.state = SchedulerState::Running;
        self.previous = None;
    }

    /// Re-arms a stopped loop without resetting the frame clock, so the next tick's
    /// delta spans the pause. Used around reconfiguration.
    pub fn resume(&mut self) {
        if self.is_running() {
            return;
        }
        log::debug!("frame scheduler resumed");
        self.state = SchedulerState::Running;
    }

    /// Disarms the loop. A tick already in progress finishes; no further tick begins.
    pub fn stop(&mut self) {
        if self.state == SchedulerState::Stopped {
            return;
        }
        log::debug!("frame scheduler stopped after {} frames", self.stats.frame_count);
        self.state = SchedulerState::Stopped;
    }

    /// Stops the loop after an unrecoverable frame error.
    pub fn halt(&mut self, reason: &dyn std::fmt::Display) {
        log::error!("halting frame loop: {reason}");
        self.in_tick = false;
        self.stop();
    }

    /// Opens a tick. Returns `None` while stopped or when the previous tick has not ended.
    pub fn begin_tick(&mut self, now: Instant) -> Option<FrameTick> {
        if !self.is_running() || self.in_tick {
            return None;
        }

        let delta = match self.previous {
            Some(previous) => now.saturating_duration_since(previous),
            None => Duration::ZERO,
        };
        self.previous = Some(now);
        self.in_tick = true;

        let tick = FrameTick {
            index: self.next_index,
            delta,
        };
        self.next_index += 1;
        Some(tick)
    }

    /// Closes the current tick and records how long the frame's CPU work took.
    pub fn end_tick(&mut self, frame_time: Duration) {
        if !self.in_tick {
            return;
        }
        self.in_tick = false;
        self.stats.record(frame_time);

        if self.stats.frame_count % Self::STATS_LOG_INTERVAL == 0 {
            log::debug!(
                "frame {}: {:.2} ms avg ({:.1} fps)",
                self.stats.frame_count,
                self.stats.smoothed_frame_ms,
                self.stats.fps()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_tick_has_zero_delta() {
        let mut scheduler = FrameScheduler::new();
        let t0 = Instant::now();
        assert!(scheduler.begin_tick(t0).is_none());

        scheduler.start();
        let tick = scheduler.begin_tick(t0).unwrap();
        assert_eq!(tick.delta, Duration::ZERO);
        assert_eq!(tick.index, 0);
        scheduler.end_tick(Duration::from_millis(2));

        let tick = scheduler.begin_tick(t0 + Duration::from_millis(16)).unwrap();
        assert_eq!(tick.delta, Duration::from_millis(16));
        assert_eq!(tick.index, 1);
    }

    #[test]
    fn ticks_never_overlap() {
        let mut scheduler = FrameScheduler::new();
        scheduler.start();
        let t0 = Instant::now();
        assert!(scheduler.begin_tick(t0).is_some());
        assert!(scheduler.begin_tick(t0 + Duration::from_millis(1)).is_none());
        scheduler.end_tick(Duration::from_millis(1));
        assert!(scheduler.begin_tick(t0 + Duration::from_millis(2)).is_some());
    }

    #[test]
    fn restart_resets_elapsed_time() {
        let mut scheduler = FrameScheduler::new();
        let t0 = Instant::now();
        scheduler.start();
        scheduler.begin_tick(t0);
        scheduler.end_tick(Duration::from_millis(1));

        scheduler.stop();
        assert_eq!(scheduler.state(), SchedulerState::Stopped);
        assert!(scheduler.begin_tick(t0 + Duration::from_secs(1)).is_none());

        scheduler.start();
        let tick = scheduler.begin_tick(t0 + Duration::from_secs(5)).unwrap();
        assert_eq!(tick.delta, Duration::ZERO);
    }

    #[test]
    fn resume_keeps_time_flowing_across_a_pause() {
        let mut scheduler = FrameScheduler::new();
        let t0 = Instant::now();
        scheduler.start();
        scheduler.begin_tick(t0);
        scheduler.end_tick(Duration::from_millis(1));

        scheduler.stop();
        scheduler.resume();
        let tick = scheduler.begin_tick(t0 + Duration::from_millis(40)).unwrap();
        assert_eq!(tick.delta, Duration::from_millis(40));
        assert_eq!(tick.index, 1);
    }

    #[test]
    fn resume_before_any_tick_still_starts_at_zero() {
        let mut scheduler = FrameScheduler::new();
        scheduler.resume();
        let tick = scheduler.begin_tick(Instant::now()).unwrap();
        assert_eq!(tick.delta, Duration::ZERO);
    }

    #[test]
    fn halt_stops_mid_tick() {
        let mut scheduler = FrameScheduler::new();
        scheduler.start();
        scheduler.begin_tick(Instant::now());
        scheduler.halt(&"texture allocation failed");
        assert!(!scheduler.is_running());
        assert!(scheduler.begin_tick(Instant::now()).is_none());
    }

    #[test]
    fn stats_smooth_frame_times() {
        let mut scheduler = FrameScheduler::new();
        scheduler.start();
        let t0 = Instant::now();
        for i in 0..4 {
            scheduler.begin_tick(t0 + Duration::from_millis(i * 10));
            scheduler.end_tick(Duration::from_millis(10));
        }
        let stats = scheduler.stats();
        assert_eq!(stats.frame_count, 4);
        assert!((stats.smoothed_frame_ms - 10.0).abs() < 1e-3);
        assert!((stats.fps() - 100.0).abs() < 0.1);
    }
}
