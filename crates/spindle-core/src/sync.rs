use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};

/// How the duty is chosen on a tick. Manual always wins over the ramp.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum OutputMode {
    #[default]
    Automatic,
    Manual { duty: f64 },
}

impl OutputMode {
    pub fn is_manual(&self) -> bool {
        matches!(self, OutputMode::Manual { .. })
    }
}

/// What the command side wants; read once per tick.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ControlRequest {
    pub on: bool,
    pub target_rpm: f64,
    pub mode: OutputMode,
}

impl ControlRequest {
    pub fn effective_target(&self) -> f64 {
        if self.on {
            self.target_rpm
        } else {
            0.0
        }
    }
}

/// What the last tick produced.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SpindleSnapshot {
    pub timestamp_us: u64,
    pub tick_count: u64,
    pub ticks_missed: u64,
    pub on: bool,
    pub mode: OutputMode,
    pub effective_target_rpm: f64,
    pub current_rpm: f64,
    pub current_duty: f64,
    pub output_level: f64,
}

/// Holds the latest published value. A write replaces the whole value under
/// the lock, so a reader never sees fields from two different publishes.
struct LatestValue<T: Copy> {
    value: RwLock<T>,
}

impl<T: Copy> LatestValue<T> {
    fn new(initial: T) -> Self {
        Self {
            value: RwLock::new(initial),
        }
    }

    fn write(&self, value: T) {
        // A poisoned lock still holds a whole value; writes are plain copies.
        *self.value.write().unwrap_or_else(PoisonError::into_inner) = value;
    }

    fn read(&self) -> T {
        *self.value.read().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Shared state between the update tick and the command context.
///
/// `ControlRequest` is written only by the controller, `SpindleSnapshot`
/// only by the tick; each side publishes a whole value per update and any
/// number of threads may read either one.
pub struct SpindleExchange {
    request: LatestValue<ControlRequest>,
    snapshot: LatestValue<SpindleSnapshot>,
    waiting: AtomicBool,
}

impl SpindleExchange {
    pub fn new(initial: ControlRequest) -> Self {
        Self {
            request: LatestValue::new(initial),
            snapshot: LatestValue::new(SpindleSnapshot {
                on: initial.on,
                mode: initial.mode,
                ..SpindleSnapshot::default()
            }),
            waiting: AtomicBool::new(false),
        }
    }

    /// Called by the controller after every state change
    pub fn submit_request(&self, request: ControlRequest) {
        self.request.write(request);
    }

    /// Called by the update tick
    pub fn read_request(&self) -> ControlRequest {
        self.request.read()
    }

    /// Called by the update tick every cycle
    pub fn publish_snapshot(&self, snapshot: SpindleSnapshot) {
        self.snapshot.write(snapshot);
    }

    pub fn read_snapshot(&self) -> SpindleSnapshot {
        self.snapshot.read()
    }

    pub fn set_waiting(&self, waiting: bool) {
        self.waiting.store(waiting, Ordering::Release);
    }

    pub fn is_waiting(&self) -> bool {
        self.waiting.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latest_publish_wins() {
        let exchange = SpindleExchange::new(ControlRequest::default());
        for rpm in [100.0, 200.0, 300.0, 400.0] {
            exchange.publish_snapshot(SpindleSnapshot {
                current_rpm: rpm,
                ..SpindleSnapshot::default()
            });
        }
        assert_eq!(exchange.read_snapshot().current_rpm, 400.0);
    }

    #[test]
    fn initial_request_is_visible() {
        let exchange = SpindleExchange::new(ControlRequest {
            on: false,
            target_rpm: 5000.0,
            mode: OutputMode::Automatic,
        });
        assert_eq!(exchange.read_request().target_rpm, 5000.0);
        assert_eq!(exchange.read_request().effective_target(), 0.0);
        assert_eq!(exchange.read_snapshot().current_rpm, 0.0);
    }

    #[test]
    fn concurrent_readers_never_see_mixed_snapshots() {
        use std::sync::Arc;
        use std::thread;

        let exchange = Arc::new(SpindleExchange::new(ControlRequest::default()));
        let done = Arc::new(AtomicBool::new(false));

        let writer = {
            let exchange = Arc::clone(&exchange);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                for i in 1..=200_000u64 {
                    let v = i as f64;
                    exchange.publish_snapshot(SpindleSnapshot {
                        timestamp_us: i,
                        tick_count: i,
                        ticks_missed: i,
                        on: i % 2 == 0,
                        mode: OutputMode::Automatic,
                        effective_target_rpm: v,
                        current_rpm: v,
                        current_duty: v,
                        output_level: v,
                    });
                }
                done.store(true, Ordering::Release);
            })
        };

        let readers: Vec<_> = (0..2)
            .map(|_| {
                let exchange = Arc::clone(&exchange);
                let done = Arc::clone(&done);
                thread::spawn(move || {
                    let mut last_tick = 0;
                    while !done.load(Ordering::Acquire) {
                        let s = exchange.read_snapshot();
                        let v = s.tick_count as f64;
                        assert_eq!(s.timestamp_us, s.tick_count);
                        assert_eq!(s.ticks_missed, s.tick_count);
                        assert_eq!(s.effective_target_rpm, v);
                        assert_eq!(s.current_rpm, v);
                        assert_eq!(s.current_duty, v);
                        assert_eq!(s.output_level, v);
                        if s.tick_count > 0 {
                            assert_eq!(s.on, s.tick_count % 2 == 0);
                        }
                        assert!(s.tick_count >= last_tick, "snapshots went backwards");
                        last_tick = s.tick_count;
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
        assert_eq!(exchange.read_snapshot().tick_count, 200_000);
    }
}
