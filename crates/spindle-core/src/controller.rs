use crate::ramp::RampConfig;
use crate::report::{SettingsReport, SpeedReport};
use crate::sync::{ControlRequest, OutputMode, SpindleExchange};
use crate::wait::{HaltSignal, IdleHook, WaitOutcome, WaitPolicy};
use log::{info, warn};
use std::sync::Arc;
use std::time::Instant;

/// Command side of the spindle.
///
/// All mutations go through a local copy of the [`ControlRequest`] that is
/// republished as a whole, so the update tick never sees a half-applied
/// command. Speed changes block the caller until the tick reports the
/// spindle within the wait threshold, a halt arrives, or the optional
/// timeout elapses.
pub struct SpindleController {
    exchange: Arc<SpindleExchange>,
    halt: HaltSignal,
    ramp: RampConfig,
    wait: WaitPolicy,
    request: ControlRequest,
}

impl SpindleController {
    pub fn new(
        exchange: Arc<SpindleExchange>,
        halt: HaltSignal,
        ramp: RampConfig,
        wait: WaitPolicy,
    ) -> Self {
        let request = exchange.read_request();
        Self {
            exchange,
            halt,
            ramp,
            wait,
            request,
        }
    }

    fn publish(&self) {
        self.exchange.submit_request(self.request);
    }

    /// Takes effect on the next tick.
    pub fn turn_on(&mut self) {
        self.request.on = true;
        self.publish();
        info!("ESC spindle: on");
    }

    /// Stops the spindle and waits for it to spin down.
    pub fn turn_off<I: IdleHook + ?Sized>(&mut self, idle: &mut I) -> WaitOutcome {
        self.request.on = false;
        info!("ESC spindle: off");
        self.set_speed(0.0, idle)
    }

    /// Halt handler: stop without waiting.
    pub fn on_halt(&mut self) {
        if self.request.on || self.request.mode.is_manual() {
            warn!("ESC spindle: halted, turning off");
        }
        self.request.on = false;
        self.request.target_rpm = 0.0;
        self.request.mode = OutputMode::Automatic;
        self.publish();
    }

    /// Drives `duty` (percent) straight to the output, bypassing the ramp.
    ///
    /// The value is not clamped; keeping it inside the servo band is up to
    /// the caller.
    pub fn set_manual_pwm(&mut self, duty: f64) {
        self.request.mode = OutputMode::Manual { duty };
        self.publish();
        info!("ESC spindle: manual duty {:.3}", duty);
    }

    pub fn disable_manual_override(&mut self) {
        if self.request.mode.is_manual() {
            info!("ESC spindle: manual override cleared");
        }
        self.request.mode = OutputMode::Automatic;
        self.publish();
    }

    /// Sets the target and blocks until it is reached.
    ///
    /// `idle` runs on every iteration so the caller's context keeps serving
    /// other work. The halt flag is checked before anything else, so a
    /// spindle that is already halted returns without waiting.
    pub fn set_speed<I: IdleHook + ?Sized>(&mut self, rpm: f64, idle: &mut I) -> WaitOutcome {
        self.request.mode = OutputMode::Automatic;
        self.request.target_rpm = rpm;
        self.publish();

        self.exchange.set_waiting(true);
        info!("ESC spindle: waiting for spindle to reach {:.0} rpm", rpm);

        let started = Instant::now();
        let outcome = loop {
            if self.halt.is_halted() {
                break WaitOutcome::Halted;
            }
            let current = self.exchange.read_snapshot().current_rpm;
            if self.wait.is_reached(current, rpm) {
                break WaitOutcome::Reached;
            }
            if let Some(timeout) = self.wait.timeout {
                if started.elapsed() >= timeout {
                    break WaitOutcome::TimedOut;
                }
            }
            idle.on_idle();
        };

        self.exchange.set_waiting(false);
        match outcome {
            WaitOutcome::Reached => info!("ESC spindle: speed reached"),
            WaitOutcome::Halted => warn!("ESC spindle: wait aborted by halt"),
            WaitOutcome::TimedOut => warn!(
                "ESC spindle: gave up waiting for {:.0} rpm at {:.0} rpm",
                rpm,
                self.exchange.read_snapshot().current_rpm
            ),
        }
        outcome
    }

    pub fn report_speed(&self) -> SpeedReport {
        SpeedReport::capture(&self.exchange)
    }

    pub fn report_settings(&self) -> SettingsReport {
        SettingsReport::new(&self.ramp, &self.wait, self.request.mode)
    }

    pub fn is_on(&self) -> bool {
        self.request.on
    }

    pub fn target_rpm(&self) -> f64 {
        self.request.target_rpm
    }

    pub fn mode(&self) -> OutputMode {
        self.request.mode
    }

    pub fn halt_signal(&self) -> &HaltSignal {
        &self.halt
    }

    pub fn exchange(&self) -> &Arc<SpindleExchange> {
        &self.exchange
    }
}
