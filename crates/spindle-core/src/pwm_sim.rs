use crate::pwm::{OutputStats, PinSpec, PwmOutput};

/// Servo-style ESC input: 1 ms pulse is idle, 2 ms is full throttle.
const PULSE_IDLE_US: f64 = 1_000.0;
const PULSE_FULL_US: f64 = 2_000.0;

/// Simulated ESC on a PWM pin, used for host runs and tests.
#[derive(Debug, Clone)]
pub struct SimulatedEsc {
    inverting: bool,
    period_us: u32,
    level: f64,
    writes: u64,
}

impl SimulatedEsc {
    pub fn new(pin: PinSpec) -> Self {
        Self {
            inverting: pin.is_inverting(),
            period_us: 20_000,
            level: 0.0,
            writes: 0,
        }
    }

    /// Level as seen on the signal line, after undoing pin inversion.
    pub fn signal_fraction(&self) -> f64 {
        if self.inverting {
            1.0 - self.level
        } else {
            self.level
        }
    }

    pub fn pulse_width_us(&self) -> f64 {
        self.signal_fraction() * self.period_us as f64
    }

    /// Throttle the ESC decodes from the pulse, `None` when the pulse is outside the servo window.
    pub fn throttle(&self) -> Option<f64> {
        let pulse = self.pulse_width_us();
        if !(PULSE_IDLE_US..=PULSE_FULL_US).contains(&pulse) {
            return None;
        }
        Some((pulse - PULSE_IDLE_US) / (PULSE_FULL_US - PULSE_IDLE_US))
    }
}

impl Default for SimulatedEsc {
    fn default() -> Self {
        Self::new(PinSpec::Gpio {
            port: 2,
            pin: 5,
            inverting: false,
        })
    }
}

impl PwmOutput for SimulatedEsc {
    fn write(&mut self, fraction: f64) {
        self.level = fraction;
        self.writes += 1;
    }

    fn set_period_us(&mut self, period_us: u32) {
        self.period_us = period_us;
    }

    fn is_inverting(&self) -> bool {
        self.inverting
    }

    fn stats(&self) -> OutputStats {
        OutputStats {
            writes: self.writes,
            last_level: self.level,
            period_us: self.period_us,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn servo_band_maps_to_throttle() {
        let mut esc = SimulatedEsc::default();
        esc.set_period_us(20_000);
        esc.write(0.075);
        let throttle = esc.throttle().unwrap();
        assert!((throttle - 0.5).abs() < 1e-9);
        assert_eq!(esc.stats().writes, 1);
    }

    #[test]
    fn zero_pulse_is_outside_servo_window() {
        let mut esc = SimulatedEsc::default();
        esc.write(0.0);
        assert_eq!(esc.throttle(), None);
    }

    #[test]
    fn inverting_pin_is_undone_on_the_signal_line() {
        let mut esc = SimulatedEsc::new("2.4!".parse().unwrap());
        esc.write(1.0 - 0.1);
        assert!((esc.pulse_width_us() - 2_000.0).abs() < 1e-6);
    }
}
