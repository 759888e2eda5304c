use std::time::Duration;

/// Fixed-timestep accumulator: wall-clock frame deltas go in, a whole
/// number of simulation ticks comes out, with the remainder carried into
/// the next frame.
pub struct FixedTimestep {
    step: Duration,
    accumulated: Duration,
}

impl FixedTimestep {
    /// 144 Hz simulation rate.
    pub const TICK_RATE: u32 = 144;

    pub fn new() -> Self {
        Self {
            step: Duration::from_secs(1) / Self::TICK_RATE,
            accumulated: Duration::ZERO,
        }
    }

    /// Feeds one frame's elapsed time and returns how many fixed ticks to
    /// run.
    pub fn advance(&mut self, frame_time: Duration) -> u32 {
        self.accumulated += frame_time;

        let mut ticks = 0;
        while self.accumulated >= self.step {
            self.accumulated -= self.step;
            ticks += 1;
        }
        ticks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step() -> Duration {
        Duration::from_secs(1) / FixedTimestep::TICK_RATE
    }

    #[test]
    fn short_frames_accumulate_before_ticking() {
        let mut timestep = FixedTimestep::new();
        let half = step() / 2;

        assert_eq!(timestep.advance(half), 0);
        assert_eq!(timestep.advance(half), 1);
    }

    #[test]
    fn long_frames_yield_multiple_ticks() {
        let mut timestep = FixedTimestep::new();
        assert_eq!(timestep.advance(step() * 3), 3);
    }

    #[test]
    fn remainder_carries_across_frames() {
        let mut timestep = FixedTimestep::new();
        let ticks = timestep.advance(step() + step() / 2);
        assert_eq!(ticks, 1);
        // The leftover half step completes with another half.
        assert_eq!(timestep.advance(step() / 2), 1);
    }
}
