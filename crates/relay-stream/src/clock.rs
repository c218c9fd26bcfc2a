//! Presentation timestamps for pushed frames.

use std::time::Instant;

/// Timing attached to a pushed frame, in 100ns units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameTiming {
    /// Presentation timestamp since the pipe started.
    pub pts_100ns: u64,

    /// Nominal frame duration from the configured frame rate.
    pub duration_100ns: u64,

    /// Zero-based index of the frame in the stream.
    pub sequence: u64,
}

impl FrameTiming {
    /// Get the presentation timestamp in milliseconds.
    pub fn pts_ms(&self) -> u64 {
        self.pts_100ns / 10_000
    }
}

/// Wall-clock based timestamp source that never goes backwards.
#[derive(Debug, Clone)]
pub struct PresentationClock {
    start: Instant,
    duration_100ns: u64,
    last_pts_100ns: u64,
    sequence: u64,
}

impl PresentationClock {
    /// Start a clock for a stream at `fps` frames per second.
    pub fn new(fps: u32) -> Self {
        Self::starting_at(Instant::now(), fps)
    }

    /// Start a clock at a given instant.
    pub fn starting_at(start: Instant, fps: u32) -> Self {
        Self {
            start,
            duration_100ns: 10_000_000 / u64::from(fps.max(1)),
            last_pts_100ns: 0,
            sequence: 0,
        }
    }

    /// Timing for a frame pushed now.
    pub fn next(&mut self) -> FrameTiming {
        self.next_at(Instant::now())
    }

    /// Timing for a frame pushed at `now`.
    pub fn next_at(&mut self, now: Instant) -> FrameTiming {
        let elapsed = now.saturating_duration_since(self.start);
        let pts_100ns = ((elapsed.as_nanos() / 100) as u64).max(self.last_pts_100ns);
        self.last_pts_100ns = pts_100ns;

        let timing = FrameTiming {
            pts_100ns,
            duration_100ns: self.duration_100ns,
            sequence: self.sequence,
        };
        self.sequence += 1;
        timing
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_duration_from_fps() {
        let mut clock = PresentationClock::new(24);
        assert_eq!(clock.next().duration_100ns, 416_666);

        let mut clock = PresentationClock::new(0);
        assert_eq!(clock.next().duration_100ns, 10_000_000);
    }

    #[test]
    fn test_pts_tracks_elapsed_time() {
        let start = Instant::now();
        let mut clock = PresentationClock::starting_at(start, 30);

        let t = clock.next_at(start + Duration::from_millis(40));
        assert_eq!(t.pts_100ns, 400_000);
        assert_eq!(t.pts_ms(), 40);
        assert_eq!(t.sequence, 0);
    }

    #[test]
    fn test_pts_never_decreases() {
        let start = Instant::now();
        let mut clock = PresentationClock::starting_at(start, 30);

        let later = clock.next_at(start + Duration::from_millis(100));
        let earlier = clock.next_at(start + Duration::from_millis(10));
        let before_start =
            clock.next_at(start.checked_sub(Duration::from_millis(5)).unwrap_or(start));

        assert_eq!(earlier.pts_100ns, later.pts_100ns);
        assert_eq!(before_start.pts_100ns, later.pts_100ns);
        assert_eq!(before_start.sequence, 2);
    }

    #[test]
    fn test_successive_wall_clock_stamps_are_non_decreasing() {
        let mut clock = PresentationClock::new(60);
        let mut last = 0;
        for _ in 0..1000 {
            let t = clock.next();
            assert!(t.pts_100ns >= last);
            last = t.pts_100ns;
        }
    }
}
