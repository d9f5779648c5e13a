use crate::ramp::{RampConfig, RampPolicy};
use crate::sync::{OutputMode, SpindleExchange};
use crate::wait::WaitPolicy;
use serde::Serialize;
use std::fmt;

/// Current speed as seen by observers of the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SpeedReport {
    pub on: bool,
    pub manual: bool,
    pub waiting: bool,
    pub target_rpm: f64,
    pub current_rpm: f64,
    pub duty: f64,
    pub tick_count: u64,
}

impl SpeedReport {
    pub fn capture(exchange: &SpindleExchange) -> Self {
        let request = exchange.read_request();
        let snapshot = exchange.read_snapshot();
        Self {
            on: request.on,
            manual: request.mode.is_manual(),
            waiting: exchange.is_waiting(),
            target_rpm: request.target_rpm,
            current_rpm: snapshot.current_rpm,
            duty: snapshot.current_duty,
            tick_count: snapshot.tick_count,
        }
    }

    /// Single-line JSON form for tooling.
    pub fn machine_line(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

impl fmt::Display for SpeedReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ESC spindle: target speed {:.0} rpm, current speed {:.0} rpm [PWM = {:.3}]",
            self.target_rpm, self.current_rpm, self.duty
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SettingsReport {
    pub scale_a: f64,
    pub scale_b: f64,
    pub period_ms: f64,
    pub duty_min: f64,
    pub duty_max: f64,
    pub inverted: bool,
    #[serde(flatten)]
    pub policy: RampPolicy,
    pub wait_threshold_rpm: f64,
    pub wait_timeout_ms: Option<u64>,
    #[serde(flatten)]
    pub mode: OutputMode,
}

impl SettingsReport {
    pub fn new(ramp: &RampConfig, wait: &WaitPolicy, mode: OutputMode) -> Self {
        Self {
            scale_a: ramp.duty.scale_a,
            scale_b: ramp.duty.scale_b,
            period_ms: ramp.pwm_period_us as f64 / 1000.0,
            duty_min: ramp.duty.min_duty,
            duty_max: ramp.duty.max_duty,
            inverted: ramp.output_inverted,
            policy: ramp.policy,
            wait_threshold_rpm: wait.threshold_rpm,
            wait_timeout_ms: wait.timeout.map(|t| t.as_millis() as u64),
            mode,
        }
    }
}

impl fmt::Display for SettingsReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ESC spindle: scale_a: {:.6} scale_b: {:.6} period: {:.2}",
            self.scale_a, self.scale_b, self.period_ms
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::{ControlRequest, SpindleSnapshot};

    #[test]
    fn speed_report_lines() {
        let exchange = SpindleExchange::new(ControlRequest {
            on: true,
            target_rpm: 5000.0,
            mode: OutputMode::Automatic,
        });
        exchange.publish_snapshot(SpindleSnapshot {
            current_rpm: 1234.0,
            current_duty: 10.0,
            ..SpindleSnapshot::default()
        });
        let report = SpeedReport::capture(&exchange);

        assert_eq!(
            report.to_string(),
            "ESC spindle: target speed 5000 rpm, current speed 1234 rpm [PWM = 10.000]"
        );
        let json: serde_json::Value = serde_json::from_str(&report.machine_line()).unwrap();
        assert_eq!(json["current_rpm"], 1234.0);
        assert_eq!(json["on"], true);
    }

    #[test]
    fn settings_report_flattens_policy() {
        let report = SettingsReport::new(
            &RampConfig::default(),
            &WaitPolicy::default(),
            OutputMode::Manual { duty: 7.5 },
        );
        assert_eq!(
            report.to_string(),
            "ESC spindle: scale_a: 1.000000 scale_b: 1.000000 period: 20.00"
        );
        let json = serde_json::to_value(report).unwrap();
        assert_eq!(json["policy"], "linear");
        assert_eq!(json["step_rpm"], 10.0);
        assert_eq!(json["mode"], "manual");
        assert_eq!(json["duty"], 7.5);
    }
}
