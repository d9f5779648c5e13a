use serde::{Deserialize, Serialize};
use spindle_core::{SettingsReport, SpeedReport};
use thiserror::Error;

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct ProtocolVersion {
    pub major: u8,
    pub minor: u8,
}

impl ProtocolVersion {
    pub const fn v1() -> Self {
        Self { major: 1, minor: 0 }
    }
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed command: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("rpm must be finite and non-negative, got {0}")]
    InvalidSpeed(f64),

    #[error("duty must be finite and non-negative, got {0}")]
    InvalidDuty(f64),
}

fn enabled() -> bool {
    true
}

/// One line of the command stream.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SpindleCommand {
    /// Spindle on; with `rpm`, also set the speed and wait for it.
    On {
        #[serde(default)]
        rpm: Option<f64>,
    },
    Off,
    SetSpeed {
        rpm: f64,
    },
    /// Calibration override; `enable: false` hands control back to the ramp.
    ManualPwm {
        #[serde(default)]
        duty: f64,
        #[serde(default = "enabled")]
        enable: bool,
    },
    Report,
    Settings,
    Halt,
    ClearHalt,
}

impl SpindleCommand {
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let command: SpindleCommand = serde_json::from_str(line)?;
        command.validate()?;
        Ok(command)
    }

    fn validate(&self) -> Result<(), ProtocolError> {
        let check_rpm = |rpm: f64| {
            if rpm.is_finite() && rpm >= 0.0 {
                Ok(())
            } else {
                Err(ProtocolError::InvalidSpeed(rpm))
            }
        };
        match self {
            SpindleCommand::On { rpm: Some(rpm) } | SpindleCommand::SetSpeed { rpm } => {
                check_rpm(*rpm)
            }
            SpindleCommand::ManualPwm { duty, enable: true } => {
                if duty.is_finite() && *duty >= 0.0 {
                    Ok(())
                } else {
                    Err(ProtocolError::InvalidDuty(*duty))
                }
            }
            _ => Ok(()),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SpindleCommand::On { .. } => "on",
            SpindleCommand::Off => "off",
            SpindleCommand::SetSpeed { .. } => "set_speed",
            SpindleCommand::ManualPwm { .. } => "manual_pwm",
            SpindleCommand::Report => "report",
            SpindleCommand::Settings => "settings",
            SpindleCommand::Halt => "halt",
            SpindleCommand::ClearHalt => "clear_halt",
        }
    }

    /// Commands that move the spindle; refused while halted.
    pub fn drives_spindle(&self) -> bool {
        matches!(
            self,
            SpindleCommand::On { .. }
                | SpindleCommand::SetSpeed { .. }
                | SpindleCommand::ManualPwm { enable: true, .. }
        )
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseMsg {
    Ack {
        protocol_version: ProtocolVersion,
        command: &'static str,
        outcome: &'static str,
    },
    Speed(SpeedReport),
    Settings(SettingsReport),
    Error {
        protocol_version: ProtocolVersion,
        message: String,
    },
}

impl ResponseMsg {
    pub fn ack(command: &'static str, outcome: &'static str) -> Self {
        ResponseMsg::Ack {
            protocol_version: ProtocolVersion::v1(),
            command,
            outcome,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ResponseMsg::Error {
            protocol_version: ProtocolVersion::v1(),
            message: message.into(),
        }
    }

    pub fn to_line(&self) -> String {
        let mut line = serde_json::to_string(self)
            .unwrap_or_else(|e| format!(r#"{{"type":"error","message":"{}"}}"#, e));
        line.push('\n');
        line
    }
}
