use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Monotonic clock shared by the tick side and the command side.
#[derive(Debug, Clone, Copy)]
pub struct TimeBase {
    start: Instant,
}

impl TimeBase {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Microseconds since the controller started.
    pub fn now_us(&self) -> u64 {
        self.start.elapsed().as_micros() as u64
    }

    /// Wall-clock microseconds, only used to stamp audit entries.
    pub fn unix_us(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_micros() as u64
    }
}

impl Default for TimeBase {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixed callback frequency of a periodic tick source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickRate {
    hz: u32,
}

impl TickRate {
    /// Returns `None` for a zero frequency.
    pub const fn new(hz: u32) -> Option<Self> {
        if hz == 0 {
            None
        } else {
            Some(Self { hz })
        }
    }

    pub fn hz(&self) -> u32 {
        self.hz
    }

    pub fn period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.hz as f64)
    }

    /// Converts a per-second rate into the amount applied on each tick.
    pub fn per_tick(&self, per_second: f64) -> f64 {
        per_second / self.hz as f64
    }
}

/// Paces a periodic loop and counts ticks that started late.
pub struct Ticker {
    period: Duration,
    next: Instant,
    missed: u64,
}

impl Ticker {
    pub fn new(rate: TickRate) -> Self {
        let period = rate.period();
        Self {
            period,
            next: Instant::now() + period,
            missed: 0,
        }
    }

    /// Sleeps until the next tick is due. Returns `false` when the tick is late.
    pub fn wait_next(&mut self) -> bool {
        let now = Instant::now();
        let on_time = if now < self.next {
            std::thread::sleep(self.next - now);
            true
        } else {
            self.missed += 1;
            // More than a full period behind: resync instead of bursting.
            if now.duration_since(self.next) > self.period {
                self.next = now;
            }
            false
        };
        self.next += self.period;
        on_time
    }

    pub fn missed(&self) -> u64 {
        self.missed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_rate_is_rejected() {
        assert!(TickRate::new(0).is_none());
    }

    #[test]
    fn ten_hz_period_and_per_tick() {
        let rate = TickRate::new(10).unwrap();
        assert_eq!(rate.period(), Duration::from_millis(100));
        assert_eq!(rate.per_tick(100.0), 10.0);
    }

    #[test]
    fn ticker_paces_to_the_period() {
        let mut ticker = Ticker::new(TickRate::new(100).unwrap());
        let start = Instant::now();
        for _ in 0..3 {
            ticker.wait_next();
        }
        assert!(start.elapsed() >= Duration::from_millis(25));
    }
}
