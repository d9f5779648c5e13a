use crate::config::ConfigError;
use std::fmt;
use std::str::FromStr;

#[derive(Clone, Copy, Default, Debug, PartialEq)]
pub struct OutputStats {
    pub writes: u64,
    pub last_level: f64,
    pub period_us: u32,
}

/// PWM-capable output pin driving the ESC signal line.
pub trait PwmOutput: Send {
    /// Writes a duty fraction in `0.0..=1.0`, already inverted if the pin requires it.
    fn write(&mut self, fraction: f64);
    fn set_period_us(&mut self, period_us: u32);
    fn is_inverting(&self) -> bool;
    fn stats(&self) -> OutputStats;
}

/// Hardware PWM1 outputs of the LPC17xx, as (port, pin).
const HARDWARE_PWM_PINS: &[(u8, u8)] = &[
    (1, 18),
    (1, 20),
    (1, 21),
    (1, 23),
    (1, 24),
    (1, 26),
    (2, 0),
    (2, 1),
    (2, 2),
    (2, 3),
    (2, 4),
    (2, 5),
    (3, 25),
    (3, 26),
];

/// Pin description from configuration, e.g. `2.5`, `P2.5!` or `nc`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinSpec {
    NotConnected,
    Gpio { port: u8, pin: u8, inverting: bool },
}

impl PinSpec {
    pub fn is_inverting(&self) -> bool {
        matches!(self, PinSpec::Gpio { inverting: true, .. })
    }

    pub fn supports_hardware_pwm(&self) -> bool {
        match self {
            PinSpec::NotConnected => false,
            PinSpec::Gpio { port, pin, .. } => HARDWARE_PWM_PINS.contains(&(*port, *pin)),
        }
    }

    /// Resolves the pin for spindle output. Only hardware PWM pins qualify.
    pub fn hardware_pwm(self) -> Result<Self, ConfigError> {
        if self.supports_hardware_pwm() {
            Ok(self)
        } else {
            Err(ConfigError::NoHardwarePwm(self.to_string()))
        }
    }
}

impl FromStr for PinSpec {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        if raw.is_empty() || raw.eq_ignore_ascii_case("nc") {
            return Ok(PinSpec::NotConnected);
        }

        let body = raw
            .strip_prefix('P')
            .or_else(|| raw.strip_prefix('p'))
            .unwrap_or(raw);
        let split = body
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(body.len());
        let (numbers, modifiers) = body.split_at(split);

        // o = open drain, ^/v/- = pull config, @ = repeater; only inversion matters here.
        if let Some(bad) = modifiers.chars().find(|c| !"!o^v-@".contains(*c)) {
            return Err(ConfigError::InvalidPin(format!("{raw}: unknown modifier '{bad}'")));
        }

        let (port, pin) = numbers
            .split_once('.')
            .ok_or_else(|| ConfigError::InvalidPin(raw.to_string()))?;
        let port = port
            .parse::<u8>()
            .map_err(|_| ConfigError::InvalidPin(raw.to_string()))?;
        let pin = pin
            .parse::<u8>()
            .map_err(|_| ConfigError::InvalidPin(raw.to_string()))?;
        if port > 4 || pin > 31 {
            return Err(ConfigError::InvalidPin(raw.to_string()));
        }

        Ok(PinSpec::Gpio {
            port,
            pin,
            inverting: modifiers.contains('!'),
        })
    }
}

impl fmt::Display for PinSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PinSpec::NotConnected => write!(f, "nc"),
            PinSpec::Gpio {
                port,
                pin,
                inverting,
            } => write!(f, "{port}.{pin}{}", if *inverting { "!" } else { "" }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_and_inverted_pins() {
        assert_eq!(
            "2.5".parse::<PinSpec>().unwrap(),
            PinSpec::Gpio {
                port: 2,
                pin: 5,
                inverting: false
            }
        );
        let inverted: PinSpec = "P1.23!".parse().unwrap();
        assert!(inverted.is_inverting());
        assert!(inverted.supports_hardware_pwm());
    }

    #[test]
    fn nc_is_not_connected() {
        assert_eq!("nc".parse::<PinSpec>().unwrap(), PinSpec::NotConnected);
        assert!(matches!(
            PinSpec::NotConnected.hardware_pwm(),
            Err(ConfigError::NoHardwarePwm(_))
        ));
    }

    #[test]
    fn gpio_without_pwm_is_rejected() {
        let pin: PinSpec = "0.4".parse().unwrap();
        assert!(matches!(pin.hardware_pwm(), Err(ConfigError::NoHardwarePwm(_))));
    }

    #[test]
    fn garbage_is_an_invalid_pin() {
        assert!(matches!(
            "2.x".parse::<PinSpec>(),
            Err(ConfigError::InvalidPin(_))
        ));
        assert!(matches!(
            "25".parse::<PinSpec>(),
            Err(ConfigError::InvalidPin(_))
        ));
    }
}
