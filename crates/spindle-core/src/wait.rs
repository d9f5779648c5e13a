use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Global emergency-stop flag. Clones share the same flag.
#[derive(Debug, Clone, Default)]
pub struct HaltSignal {
    halted: Arc<AtomicBool>,
}

impl HaltSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.halted.store(true, Ordering::Release);
    }

    pub fn clear(&self) {
        self.halted.store(false, Ordering::Release);
    }

    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::Acquire)
    }
}

/// Work pumped by a blocking wait on every loop iteration.
pub trait IdleHook {
    fn on_idle(&mut self);
}

/// Idle hook for a thread with nothing else to do: sleeps for `interval`.
#[derive(Debug, Clone, Copy)]
pub struct SleepIdle {
    pub interval: Duration,
}

impl Default for SleepIdle {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(5),
        }
    }
}

impl IdleHook for SleepIdle {
    fn on_idle(&mut self) {
        std::thread::sleep(self.interval);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitOutcome {
    Reached,
    Halted,
    TimedOut,
}

impl WaitOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            WaitOutcome::Reached => "reached",
            WaitOutcome::Halted => "halted",
            WaitOutcome::TimedOut => "timed_out",
        }
    }
}

/// When a speed wait counts as done.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WaitPolicy {
    pub threshold_rpm: f64,
    /// `None` waits until the speed is reached or a halt arrives.
    pub timeout: Option<Duration>,
}

impl WaitPolicy {
    pub fn is_reached(&self, current_rpm: f64, target_rpm: f64) -> bool {
        (current_rpm - target_rpm).abs() < self.threshold_rpm
    }
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            threshold_rpm: 200.0,
            timeout: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn halt_is_shared_between_clones() {
        let halt = HaltSignal::new();
        let observer = halt.clone();
        halt.trigger();
        assert!(observer.is_halted());
        observer.clear();
        assert!(!halt.is_halted());
    }

    #[test]
    fn threshold_is_exclusive() {
        let policy = WaitPolicy::default();
        assert!(policy.is_reached(4801.0, 5000.0));
        assert!(!policy.is_reached(4800.0, 5000.0));
    }
}
