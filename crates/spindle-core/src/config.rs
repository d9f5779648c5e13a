//! Spindle configuration as loaded from disk, and its validated form.

use crate::clock::TickRate;
use crate::pwm::PinSpec;
use crate::ramp::{smoothing_decay, DutyMap, RampConfig, RampPolicy};
use crate::wait::WaitPolicy;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("spindle PWM pin must be a hardware PWM pin (P1.18-1.26, P2.0-2.5, P3.25-3.26), got {0}")]
    NoHardwarePwm(String),

    #[error("invalid pin description: {0}")]
    InvalidPin(String),

    #[error("{name} must be greater than zero")]
    Zero { name: &'static str },

    #[error("{name} must be finite and non-negative, got {value}")]
    InvalidValue { name: &'static str, value: f64 },

    #[error("duty band is empty: duty_min {min} must be below duty_max {max}")]
    InvalidDutyBand { min: f64, max: f64 },

    #[error("unknown ramp mode '{0}' (expected linear or smoothing)")]
    UnknownRampMode(String),

    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RampMode {
    #[default]
    Linear,
    Smoothing,
}

impl FromStr for RampMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "linear" => Ok(RampMode::Linear),
            "smoothing" => Ok(RampMode::Smoothing),
            other => Err(ConfigError::UnknownRampMode(other.to_string())),
        }
    }
}

/// Raw spindle settings. Every key is optional.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SpindleConfig {
    pub pwm_pin: String,
    pub pwm_period_ms: u32,
    /// Low-pass time constant in seconds, smoothing mode only.
    pub control_smoothing: f64,
    pub pwm_scale_a: f64,
    pub pwm_scale_b: f64,
    pub rpm_default: f64,
    /// RPM per second, linear mode only.
    pub rpm_ramp: f64,
    pub ramp_mode: RampMode,
    pub update_hz: u32,
    pub report_hz: u32,
    pub wait_threshold_rpm: f64,
    pub wait_timeout_ms: Option<u64>,
    pub duty_min: f64,
    pub duty_max: f64,
}

impl Default for SpindleConfig {
    fn default() -> Self {
        Self {
            pwm_pin: "nc".to_string(),
            pwm_period_ms: 20,
            control_smoothing: 0.1,
            pwm_scale_a: 1.0,
            pwm_scale_b: 1.0,
            rpm_default: 5000.0,
            rpm_ramp: 100.0,
            ramp_mode: RampMode::Linear,
            update_hz: 10,
            report_hz: 1,
            wait_threshold_rpm: 200.0,
            wait_timeout_ms: None,
            duty_min: 5.0,
            duty_max: 10.0,
        }
    }
}

/// Validated configuration the controller is built from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedConfig {
    pub pin: PinSpec,
    pub ramp: RampConfig,
    pub update_rate: TickRate,
    pub report_rate: TickRate,
    pub wait: WaitPolicy,
    pub rpm_default: f64,
}

fn non_negative(name: &'static str, value: f64) -> Result<f64, ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(ConfigError::InvalidValue { name, value })
    }
}

fn finite(name: &'static str, value: f64) -> Result<f64, ConfigError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ConfigError::InvalidValue { name, value })
    }
}

impl SpindleConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn resolve(&self) -> Result<ResolvedConfig, ConfigError> {
        let pin = self.pwm_pin.parse::<PinSpec>()?.hardware_pwm()?;

        if self.pwm_period_ms == 0 {
            return Err(ConfigError::Zero {
                name: "pwm_period_ms",
            });
        }
        let update_rate = TickRate::new(self.update_hz).ok_or(ConfigError::Zero { name: "update_hz" })?;
        let report_rate = TickRate::new(self.report_hz).ok_or(ConfigError::Zero { name: "report_hz" })?;

        let policy = match self.ramp_mode {
            RampMode::Linear => {
                let rpm_ramp = non_negative("rpm_ramp", self.rpm_ramp)?;
                if rpm_ramp == 0.0 {
                    return Err(ConfigError::Zero { name: "rpm_ramp" });
                }
                RampPolicy::Linear {
                    step_rpm: update_rate.per_tick(rpm_ramp),
                }
            }
            RampMode::Smoothing => {
                let tau = non_negative("control_smoothing", self.control_smoothing)?;
                RampPolicy::Smoothing {
                    decay: smoothing_decay(tau, update_rate),
                }
            }
        };

        let min = finite("duty_min", self.duty_min)?;
        let max = finite("duty_max", self.duty_max)?;
        if min >= max {
            return Err(ConfigError::InvalidDutyBand { min, max });
        }

        let ramp = RampConfig {
            policy,
            duty: DutyMap {
                scale_a: finite("pwm_scale_a", self.pwm_scale_a)?,
                scale_b: finite("pwm_scale_b", self.pwm_scale_b)?,
                min_duty: min,
                max_duty: max,
            },
            pwm_period_us: self.pwm_period_ms.saturating_mul(1000),
            output_inverted: pin.is_inverting(),
        };

        // The reached check is strict, so a zero threshold never completes a wait.
        let threshold_rpm = non_negative("wait_threshold_rpm", self.wait_threshold_rpm)?;
        if threshold_rpm == 0.0 {
            return Err(ConfigError::Zero {
                name: "wait_threshold_rpm",
            });
        }

        Ok(ResolvedConfig {
            pin,
            ramp,
            update_rate,
            report_rate,
            wait: WaitPolicy {
                threshold_rpm,
                timeout: self.wait_timeout_ms.map(Duration::from_millis),
            },
            rpm_default: non_negative("rpm_default", self.rpm_default)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_pin(pin: &str) -> SpindleConfig {
        SpindleConfig {
            pwm_pin: pin.to_string(),
            ..SpindleConfig::default()
        }
    }

    #[test]
    fn defaults_resolve_on_a_pwm_pin() {
        let resolved = with_pin("2.5").resolve().unwrap();
        assert_eq!(resolved.ramp.policy, RampPolicy::Linear { step_rpm: 10.0 });
        assert_eq!(resolved.ramp.pwm_period_us, 20_000);
        assert_eq!(resolved.wait.threshold_rpm, 200.0);
        assert_eq!(resolved.wait.timeout, None);
        assert_eq!(resolved.rpm_default, 5000.0);
        assert!(!resolved.ramp.output_inverted);
    }

    #[test]
    fn default_pin_is_refused() {
        let err = SpindleConfig::default().resolve().unwrap_err();
        assert!(matches!(err, ConfigError::NoHardwarePwm(_)));
    }

    #[test]
    fn inverting_pin_carries_into_ramp() {
        let resolved = with_pin("2.3!").resolve().unwrap();
        assert!(resolved.ramp.output_inverted);
    }

    #[test]
    fn smoothing_mode_derives_decay() {
        let config = SpindleConfig {
            ramp_mode: RampMode::Smoothing,
            control_smoothing: 0.5,
            ..with_pin("2.5")
        };
        let resolved = config.resolve().unwrap();
        match resolved.ramp.policy {
            RampPolicy::Smoothing { decay } => assert!((decay - 0.2).abs() < 1e-12),
            other => panic!("expected smoothing, got {:?}", other),
        }
    }

    #[test]
    fn parses_partial_json() {
        let config = SpindleConfig::from_json_str(
            r#"{"pwm_pin":"2.4","rpm_ramp":2000,"ramp_mode":"smoothing","wait_timeout_ms":1500}"#,
        )
        .unwrap();
        assert_eq!(config.pwm_pin, "2.4");
        assert_eq!(config.ramp_mode, RampMode::Smoothing);
        assert_eq!(config.wait_timeout_ms, Some(1500));
        assert_eq!(config.pwm_period_ms, 20);
    }

    #[test]
    fn rejects_bad_values() {
        let zero_ramp = SpindleConfig {
            rpm_ramp: 0.0,
            ..with_pin("2.5")
        };
        assert!(matches!(
            zero_ramp.resolve(),
            Err(ConfigError::Zero { name: "rpm_ramp" })
        ));

        let band = SpindleConfig {
            duty_min: 10.0,
            duty_max: 5.0,
            ..with_pin("2.5")
        };
        assert!(matches!(
            band.resolve(),
            Err(ConfigError::InvalidDutyBand { .. })
        ));

        let no_ticks = SpindleConfig {
            update_hz: 0,
            ..with_pin("2.5")
        };
        assert!(matches!(
            no_ticks.resolve(),
            Err(ConfigError::Zero { name: "update_hz" })
        ));

        let zero_threshold = SpindleConfig {
            wait_threshold_rpm: 0.0,
            ..with_pin("2.5")
        };
        assert!(matches!(
            zero_threshold.resolve(),
            Err(ConfigError::Zero {
                name: "wait_threshold_rpm"
            })
        ));

        let tight = SpindleConfig {
            wait_threshold_rpm: 0.5,
            ..with_pin("2.5")
        };
        let wait = tight.resolve().unwrap().wait;
        assert!(wait.is_reached(1000.0, 1000.0));
        assert!(!wait.is_reached(1000.0, 999.0));
    }

    #[test]
    fn ramp_mode_from_str() {
        assert_eq!("Smoothing".parse::<RampMode>().unwrap(), RampMode::Smoothing);
        assert!("pid".parse::<RampMode>().is_err());
    }
}
