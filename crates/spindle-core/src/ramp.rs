//! Speed ramp engine.
//!
//! One call to [`RampConfig::step`] per update tick moves the current speed
//! toward the effective target and maps the result onto an ESC duty cycle.
//! The function is pure: same inputs, same outputs.

use crate::clock::TickRate;
use serde::Serialize;

/// Duty written when the spindle is stopped.
pub const DUTY_OFF: f64 = 0.0;

/// Convergence law between current and target speed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum RampPolicy {
    /// Fixed RPM change per tick.
    Linear { step_rpm: f64 },
    /// First-order low pass, `0 < decay <= 1`.
    Smoothing { decay: f64 },
}

impl RampPolicy {
    /// Next speed for one tick. Never crosses `target`.
    pub fn next_rpm(&self, current: f64, target: f64) -> f64 {
        match *self {
            RampPolicy::Linear { step_rpm } => {
                if current < target {
                    (current + step_rpm).min(target)
                } else if current > target {
                    (current - step_rpm).max(target)
                } else {
                    current
                }
            }
            RampPolicy::Smoothing { decay } => {
                let next = current + decay * (target - current);
                if current <= target {
                    next.min(target)
                } else {
                    next.max(target)
                }
            }
        }
    }
}

/// Per-tick blend factor of the smoothing policy for time constant `tau_s`.
pub fn smoothing_decay(tau_s: f64, rate: TickRate) -> f64 {
    let f = rate.hz() as f64;
    if tau_s * f < 1.0 {
        1.0
    } else {
        1.0 / (f * tau_s)
    }
}

/// Affine RPM to duty map with the servo band clamp.
///
/// Duty is in percent of the PWM period; 5..10 % of 20 ms is the
/// 1..2 ms servo pulse an ESC expects.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DutyMap {
    pub scale_a: f64,
    pub scale_b: f64,
    pub min_duty: f64,
    pub max_duty: f64,
}

impl DutyMap {
    pub fn duty_for(&self, rpm: f64) -> f64 {
        // An exact stop must not leak `scale_b` onto the line.
        if rpm == 0.0 {
            return DUTY_OFF;
        }
        let raw = self.scale_a * rpm + self.scale_b;
        if raw.is_nan() {
            return DUTY_OFF;
        }
        raw.clamp(self.min_duty, self.max_duty)
    }

    pub fn in_band(&self, duty: f64) -> bool {
        (self.min_duty..=self.max_duty).contains(&duty)
    }
}

impl Default for DutyMap {
    fn default() -> Self {
        Self {
            scale_a: 1.0,
            scale_b: 1.0,
            min_duty: 5.0,
            max_duty: 10.0,
        }
    }
}

/// Percent duty to the 0..1 fraction the PWM peripheral takes.
pub fn normalize(duty_percent: f64) -> f64 {
    duty_percent / 100.0
}

pub fn apply_inversion(fraction: f64) -> f64 {
    1.0 - fraction
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RampConfig {
    pub policy: RampPolicy,
    pub duty: DutyMap,
    pub pwm_period_us: u32,
    pub output_inverted: bool,
}

/// Result of one ramp tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RampStep {
    pub rpm: f64,
    /// Duty in percent, after force-off and clamp.
    pub duty: f64,
    /// Fraction to write to the pin, inversion applied.
    pub level: f64,
}

impl RampConfig {
    pub fn step(&self, current_rpm: f64, target_rpm: f64, on: bool) -> RampStep {
        let effective_target = if on { target_rpm } else { 0.0 };
        let rpm = self.policy.next_rpm(current_rpm, effective_target);
        let duty = self.duty.duty_for(rpm);
        RampStep {
            rpm,
            duty,
            level: self.output_level(duty),
        }
    }

    /// Pin level for a percent duty on this output.
    pub fn output_level(&self, duty: f64) -> f64 {
        let fraction = normalize(duty);
        if self.output_inverted {
            apply_inversion(fraction)
        } else {
            fraction
        }
    }
}

impl Default for RampConfig {
    fn default() -> Self {
        Self {
            policy: RampPolicy::Linear { step_rpm: 10.0 },
            duty: DutyMap::default(),
            pwm_period_us: 20_000,
            output_inverted: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linear(step_rpm: f64) -> RampConfig {
        RampConfig {
            policy: RampPolicy::Linear { step_rpm },
            ..RampConfig::default()
        }
    }

    #[test]
    fn ramps_up_to_target_in_500_ticks() {
        let config = linear(10.0);
        let mut rpm = 0.0;
        let mut last = None;
        for _ in 0..500 {
            let step = config.step(rpm, 5000.0, true);
            rpm = step.rpm;
            last = Some(step);
        }
        assert_eq!(rpm, 5000.0);
        assert_eq!(last.unwrap().duty, 5001.0f64.clamp(5.0, 10.0));
    }

    #[test]
    fn spindle_off_ramps_down_in_30_ticks() {
        let config = linear(100.0);
        let mut rpm = 3000.0;
        let mut ticks = 0;
        let mut last = None;
        while rpm != 0.0 {
            let step = config.step(rpm, 5000.0, false);
            rpm = step.rpm;
            last = Some(step);
            ticks += 1;
        }
        assert_eq!(ticks, 30);
        assert_eq!(last.unwrap().duty, DUTY_OFF);
    }

    #[test]
    fn equal_speed_is_unchanged() {
        let step = linear(10.0).step(1200.0, 1200.0, true);
        assert_eq!(step.rpm, 1200.0);
    }

    #[test]
    fn smoothing_decay_from_time_constant() {
        let rate = TickRate::new(10).unwrap();
        assert_eq!(smoothing_decay(0.05, rate), 1.0);
        assert_eq!(smoothing_decay(0.0, rate), 1.0);
        assert!((smoothing_decay(0.5, rate) - 0.2).abs() < 1e-12);
    }

    #[test]
    fn decay_of_one_jumps_to_target() {
        let policy = RampPolicy::Smoothing { decay: 1.0 };
        assert_eq!(policy.next_rpm(0.0, 4000.0), 4000.0);
    }

    #[test]
    fn zero_speed_forces_off_even_with_offset() {
        let map = DutyMap {
            scale_b: 7.0,
            ..DutyMap::default()
        };
        assert_eq!(map.duty_for(0.0), DUTY_OFF);
        assert_eq!(map.duty_for(-0.0), DUTY_OFF);
    }

    #[test]
    fn inverted_output_level() {
        let config = RampConfig {
            output_inverted: true,
            ..RampConfig::default()
        };
        assert_eq!(config.output_level(DUTY_OFF), 1.0);
        assert!((config.output_level(10.0) - 0.9).abs() < 1e-12);
    }

    #[test]
    fn nan_speed_is_off() {
        assert_eq!(DutyMap::default().duty_for(f64::NAN), DUTY_OFF);
    }
}
