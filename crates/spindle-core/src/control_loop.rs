use crate::clock::{TickRate, Ticker, TimeBase};
use crate::pwm::PwmOutput;
use crate::ramp::{RampConfig, DUTY_OFF};
use crate::sync::{OutputMode, SpindleExchange, SpindleSnapshot};
use log::{debug, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Clone, Default, Debug)]
pub struct TickStats {
    pub ticks_executed: u64,
    pub ticks_missed: u64,
    pub manual_ticks: u64,
}

/// Update-tick side of the spindle. Sole writer of the output and of the
/// published speed and duty.
pub struct SpindleLoop<P: PwmOutput> {
    pwm: P,
    ramp: RampConfig,
    exchange: Arc<SpindleExchange>,
    timebase: TimeBase,
    current_rpm: f64,
    current_duty: f64,
    output_level: f64,
    manual_applied: Option<f64>,
    stats: TickStats,
}

impl<P: PwmOutput> SpindleLoop<P> {
    /// Programs the period and drives the output to its off level.
    pub fn new(mut pwm: P, mut ramp: RampConfig, exchange: Arc<SpindleExchange>, timebase: TimeBase) -> Self {
        if pwm.is_inverting() != ramp.output_inverted {
            warn!(
                "ESC spindle: output inversion differs from configuration, using pin setting (inverting = {})",
                pwm.is_inverting()
            );
            ramp.output_inverted = pwm.is_inverting();
        }
        pwm.set_period_us(ramp.pwm_period_us);
        let output_level = ramp.output_level(DUTY_OFF);
        pwm.write(output_level);

        Self {
            pwm,
            ramp,
            exchange,
            timebase,
            current_rpm: 0.0,
            current_duty: DUTY_OFF,
            output_level,
            manual_applied: None,
            stats: TickStats::default(),
        }
    }

    pub fn on_tick(&mut self) {
        let request = self.exchange.read_request();

        match request.mode {
            OutputMode::Manual { duty } => {
                self.stats.manual_ticks += 1;
                // Written once per new value; the ramp is not consulted.
                if self.manual_applied != Some(duty) {
                    if !self.ramp.duty.in_band(duty) && duty != DUTY_OFF {
                        warn!(
                            "ESC spindle: manual duty {:.3} is outside {:.1}..{:.1}",
                            duty, self.ramp.duty.min_duty, self.ramp.duty.max_duty
                        );
                    }
                    self.output_level = self.ramp.output_level(duty);
                    self.pwm.write(self.output_level);
                    self.current_duty = duty;
                    self.manual_applied = Some(duty);
                    debug!("ESC spindle: manual duty {:.3} applied", duty);
                }
            }
            OutputMode::Automatic => {
                self.manual_applied = None;
                let step = self
                    .ramp
                    .step(self.current_rpm, request.target_rpm, request.on);
                self.current_rpm = step.rpm;
                self.current_duty = step.duty;
                self.output_level = step.level;
                self.pwm.write(step.level);
            }
        }

        self.stats.ticks_executed += 1;
        self.exchange.publish_snapshot(SpindleSnapshot {
            timestamp_us: self.timebase.now_us(),
            tick_count: self.stats.ticks_executed,
            ticks_missed: self.stats.ticks_missed,
            on: request.on,
            mode: request.mode,
            effective_target_rpm: request.effective_target(),
            current_rpm: self.current_rpm,
            current_duty: self.current_duty,
            output_level: self.output_level,
        });
    }

    /// Runs `on_tick` at `rate` until `stop` is set, then drives the output off.
    pub fn run(&mut self, rate: TickRate, stop: &AtomicBool) {
        let mut ticker = Ticker::new(rate);
        while !stop.load(Ordering::Relaxed) {
            ticker.wait_next();
            self.stats.ticks_missed = ticker.missed();
            self.on_tick();
        }
        self.force_off();
    }

    fn force_off(&mut self) {
        self.output_level = self.ramp.output_level(DUTY_OFF);
        self.pwm.write(self.output_level);
        self.current_duty = DUTY_OFF;
    }

    pub fn current_rpm(&self) -> f64 {
        self.current_rpm
    }

    pub fn current_duty(&self) -> f64 {
        self.current_duty
    }

    pub fn pwm(&self) -> &P {
        &self.pwm
    }

    pub fn stats(&self) -> &TickStats {
        &self.stats
    }
}
