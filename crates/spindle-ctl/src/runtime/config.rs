use spindle_core::{ConfigError, RampMode, SpindleConfig};
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub show_help: bool,
    pub config_path: Option<PathBuf>,
    pub pwm_pin: Option<String>,
    pub rpm_ramp: Option<f64>,
    pub ramp_mode: Option<String>,
    pub wait_timeout_ms: Option<u64>,
    pub run_seconds: Option<u64>,
    pub bind_addr: String,
    pub bridge_enabled: bool,
    pub json_logs: bool,
    pub log_dir: Option<PathBuf>,
    pub metrics_addr: Option<String>,
    pub audit_path: Option<PathBuf>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            show_help: false,
            config_path: None,
            pwm_pin: None,
            rpm_ramp: None,
            ramp_mode: None,
            wait_timeout_ms: None,
            run_seconds: None,
            bind_addr: "127.0.0.1:7000".to_string(),
            bridge_enabled: true,
            json_logs: false,
            log_dir: None,
            metrics_addr: None,
            audit_path: None,
        }
    }
}

impl RuntimeConfig {
    pub fn from_env() -> Self {
        let args: Vec<String> = std::env::args().collect();
        Self::from_args(&args)
    }

    pub fn from_args(args: &[String]) -> Self {
        let mut cfg = RuntimeConfig::default();
        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--config" => {
                    if i + 1 < args.len() {
                        cfg.config_path = Some(PathBuf::from(&args[i + 1]));
                        i += 1;
                    }
                }
                "--pwm-pin" => {
                    if i + 1 < args.len() {
                        cfg.pwm_pin = Some(args[i + 1].clone());
                        i += 1;
                    }
                }
                "--rpm-ramp" => {
                    if i + 1 < args.len() {
                        cfg.rpm_ramp = args[i + 1].parse::<f64>().ok();
                        i += 1;
                    }
                }
                "--ramp-mode" => {
                    if i + 1 < args.len() {
                        cfg.ramp_mode = Some(args[i + 1].clone());
                        i += 1;
                    }
                }
                "--wait-timeout-ms" => {
                    if i + 1 < args.len() {
                        cfg.wait_timeout_ms = args[i + 1].parse::<u64>().ok();
                        i += 1;
                    }
                }
                "--run-seconds" => {
                    if i + 1 < args.len() {
                        cfg.run_seconds = args[i + 1].parse::<u64>().ok();
                        i += 1;
                    }
                }
                "--bind" => {
                    if i + 1 < args.len() {
                        cfg.bind_addr = args[i + 1].clone();
                        i += 1;
                    }
                }
                "--no-bridge" => {
                    cfg.bridge_enabled = false;
                }
                "--json-logs" => {
                    cfg.json_logs = true;
                }
                "--log-dir" => {
                    if i + 1 < args.len() {
                        cfg.log_dir = Some(PathBuf::from(&args[i + 1]));
                        i += 1;
                    }
                }
                "--metrics-addr" => {
                    if i + 1 < args.len() {
                        cfg.metrics_addr = Some(args[i + 1].clone());
                        i += 1;
                    }
                }
                "--audit-log" => {
                    if i + 1 < args.len() {
                        cfg.audit_path = Some(PathBuf::from(&args[i + 1]));
                        i += 1;
                    }
                }
                "--help" | "-h" => {
                    cfg.show_help = true;
                    break;
                }
                _ => {}
            }
            i += 1;
        }
        cfg
    }

    /// Loads the spindle settings file, if any, and applies the command
    /// line overrides on top.
    pub fn spindle_config(&self) -> Result<SpindleConfig, ConfigError> {
        let mut spindle = match &self.config_path {
            Some(path) => SpindleConfig::from_file(path)?,
            None => SpindleConfig::default(),
        };
        if let Some(pin) = &self.pwm_pin {
            spindle.pwm_pin = pin.clone();
        }
        if let Some(rpm_ramp) = self.rpm_ramp {
            spindle.rpm_ramp = rpm_ramp;
        }
        if let Some(mode) = &self.ramp_mode {
            spindle.ramp_mode = mode.parse::<RampMode>()?;
        }
        if let Some(timeout) = self.wait_timeout_ms {
            spindle.wait_timeout_ms = Some(timeout);
        }
        Ok(spindle)
    }

    pub fn print_help() {
        println!(
            r#"spindle-ctl - Open-loop ESC spindle speed controller

USAGE:
    spindle-ctl [OPTIONS]

OPTIONS:
    --config <PATH>          Spindle settings file (JSON)
    --pwm-pin <PIN>          PWM output pin, e.g. 2.5 or 2.5! for inverted [default: nc]
    --rpm-ramp <RPM/S>       Linear ramp rate [default: 100]
    --ramp-mode <MODE>       Ramp policy (linear|smoothing) [default: linear]
    --wait-timeout-ms <MS>   Give up waiting for speed after this long [default: never]
    --bind <ADDR>            Command bridge TCP bind address [default: 127.0.0.1:7000]
    --no-bridge              Disable the command bridge
    --run-seconds <SECS>     Run for a fixed duration then exit
    --json-logs              Output logs in JSON format (for log aggregation)
    --log-dir <PATH>         Also write JSON logs to a daily rolling file in PATH
    --metrics-addr <ADDR>    Enable Prometheus metrics server on address (e.g., 0.0.0.0:9090)
    --audit-log <PATH>       Enable audit logging to specified JSONL file
    -h, --help               Print this help message

ENVIRONMENT VARIABLES:
    RUST_LOG                 Set log filter (e.g., RUST_LOG=debug,spindle_core=trace)

EXAMPLES:
    # Spindle on P2.5 with metrics
    spindle-ctl --pwm-pin 2.5 --metrics-addr 0.0.0.0:9090

    # Settings from file, audited
    spindle-ctl --config spindle.json --audit-log /var/log/spindle/audit.jsonl

    # Short test run
    spindle-ctl --pwm-pin 2.5 --run-seconds 10 --no-bridge
"#
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("spindle-ctl")
            .chain(list.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn parses_flags() {
        let cfg = RuntimeConfig::from_args(&args(&[
            "--pwm-pin",
            "2.5!",
            "--rpm-ramp",
            "250",
            "--bind",
            "127.0.0.1:7100",
            "--no-bridge",
            "--run-seconds",
            "3",
        ]));
        assert_eq!(cfg.pwm_pin.as_deref(), Some("2.5!"));
        assert_eq!(cfg.rpm_ramp, Some(250.0));
        assert_eq!(cfg.bind_addr, "127.0.0.1:7100");
        assert!(!cfg.bridge_enabled);
        assert_eq!(cfg.run_seconds, Some(3));
        assert!(!cfg.show_help);
    }

    #[test]
    fn help_stops_parsing() {
        let cfg = RuntimeConfig::from_args(&args(&["-h", "--no-bridge"]));
        assert!(cfg.show_help);
        assert!(cfg.bridge_enabled);
    }

    #[test]
    fn overrides_apply_over_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"pwm_pin": "1.18", "rpm_ramp": 50, "rpm_default": 8000}}"#).unwrap();

        let cfg = RuntimeConfig::from_args(&args(&[
            "--config",
            file.path().to_str().unwrap(),
            "--rpm-ramp",
            "400",
            "--ramp-mode",
            "smoothing",
        ]));
        let spindle = cfg.spindle_config().unwrap();
        assert_eq!(spindle.pwm_pin, "1.18");
        assert_eq!(spindle.rpm_ramp, 400.0);
        assert_eq!(spindle.rpm_default, 8000.0);
        assert_eq!(spindle.ramp_mode, RampMode::Smoothing);
    }

    #[test]
    fn unknown_ramp_mode_is_a_config_error() {
        let cfg = RuntimeConfig::from_args(&args(&["--ramp-mode", "s-curve"]));
        assert!(matches!(
            cfg.spindle_config(),
            Err(ConfigError::UnknownRampMode(_))
        ));
    }
}
