use std::time::Instant;

/// Wall-clock stopwatch for the collector phases. A disabled timer never
/// reads the clock and always reports zero.
pub struct Timer {
    active: bool,
    timestamp: Option<Instant>,
}

impl Timer {
    pub fn new(active: bool) -> Timer {
        let timestamp = if active { Some(Instant::now()) } else { None };

        Timer { active, timestamp }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Returns the milliseconds since the last call (or creation) and
    /// restarts the timer.
    pub fn stop(&mut self) -> f32 {
        if let Some(timestamp) = self.timestamp {
            let now = Instant::now();
            let duration = now.duration_since(timestamp);
            self.timestamp = Some(now);
            duration.as_secs_f32() * 1000.0f32
        } else {
            0.0f32
        }
    }
}
