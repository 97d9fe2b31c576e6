use std::time::Duration;

/// Animation clock advanced once per tick by the frame scheduler.
#[derive(Debug, Default, Clone)]
pub struct Time {
    elapsed: Duration,
    delta: Duration,
}

impl Time {
    /// Called by the frame loop once per tick
    pub fn advance(&mut self, delta: Duration) {
        self.delta = delta;
        self.elapsed += delta;
    }

    /// Returns time in seconds since last frame (e.g., 0.016 for 60fps)
    pub fn delta_seconds(&self) -> f32 {
        self.delta.as_secs_f32()
    }

    /// Returns total animated time
    pub fn elapsed_seconds(&self) -> f32 {
        self.elapsed.as_secs_f32()
    }
}

/// Drives light motion. Freezing it stops lights without touching the camera clock.
#[derive(Debug, Default, Clone)]
pub struct LightClock {
    seconds: f32,
    frozen: bool,
}

impl LightClock {
    pub fn advance(&mut self, delta_seconds: f32) {
        if !self.frozen {
            self.seconds += delta_seconds;
        }
    }

    pub fn seconds(&self) -> f32 {
        self.seconds
    }

    pub fn set_frozen(&mut self, frozen: bool) {
        self.frozen = frozen;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_accumulates_deltas() {
        let mut time = Time::default();
        time.advance(Duration::from_millis(16));
        time.advance(Duration::from_millis(16));

        assert!((time.delta_seconds() - 0.016).abs() < 1e-6);
        assert!((time.elapsed_seconds() - 0.032).abs() < 1e-6);
    }

    #[test]
    fn frozen_light_clock_holds_still() {
        let mut clock = LightClock::default();
        clock.advance(0.5);
        clock.set_frozen(true);
        for _ in 0..10 {
            clock.advance(0.016);
        }
        assert_eq!(clock.seconds(), 0.5);

        clock.set_frozen(false);
        clock.advance(0.5);
        assert_eq!(clock.seconds(), 1.0);
    }
}
