use crate::infra::audit::{AuditEventType, AuditJournal, AuditLogger};
use crate::runtime::config::RuntimeConfig;
use crate::runtime::logging::init_tracing;
use crate::runtime::telemetry;
use spindle_core::{
    ControlRequest, HaltSignal, OutputMode, PwmOutput, ResolvedConfig, SimulatedEsc,
    SpindleController, SpindleExchange, SpindleLoop, TickStats, TimeBase,
};
use spindle_io::bridge::{run_bridge, BridgeConfig, CommandJournal};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Exit status for a configuration the controller refuses to start with.
const EXIT_CONFIG: u8 = 2;

pub fn run_from_args() -> ExitCode {
    let config = RuntimeConfig::from_env();
    if config.show_help {
        RuntimeConfig::print_help();
        return ExitCode::SUCCESS;
    }
    run(config)
}

pub fn run(config: RuntimeConfig) -> ExitCode {
    let _log_guard = init_tracing(config.json_logs, config.log_dir.as_deref());

    telemetry::init();

    let timebase = TimeBase::new();

    let audit_logger = match init_audit_logger(config.audit_path.as_ref()) {
        Ok(logger) => logger,
        Err(e) => {
            error!(error = %e, "Audit logging requested but failed to initialize");
            return ExitCode::FAILURE;
        }
    };
    let audit = |event_type: AuditEventType, details: serde_json::Value| {
        if let Some(logger) = &audit_logger {
            if let Err(e) = logger.log_event(timebase.now_us(), timebase.unix_us(), event_type, details)
            {
                warn!(error = %e, "Failed to write audit entry");
            }
        }
    };

    let resolved = match config.spindle_config().and_then(|spindle| spindle.resolve()) {
        Ok(resolved) => resolved,
        Err(e) => {
            error!(error = %e, "Spindle configuration rejected");
            audit(
                AuditEventType::ConfigRejected,
                serde_json::json!({ "error": e.to_string() }),
            );
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    let metrics_enabled = config.metrics_addr.is_some();
    let _metrics_handle = telemetry::start_metrics_server(&config.metrics_addr);

    audit(
        AuditEventType::SystemStart,
        serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "pwm_pin": resolved.pin.to_string(),
            "bridge_enabled": config.bridge_enabled,
            "metrics_enabled": metrics_enabled,
        }),
    );

    let exchange = Arc::new(SpindleExchange::new(ControlRequest {
        on: false,
        target_rpm: resolved.rpm_default,
        mode: OutputMode::Automatic,
    }));
    let halt = HaltSignal::new();
    let stop = Arc::new(AtomicBool::new(false));

    let tick_handle = start_update_tick(&resolved, Arc::clone(&exchange), timebase, Arc::clone(&stop));
    let metrics_updater = telemetry::start_metrics_updater(Arc::clone(&exchange), Arc::clone(&stop));
    let reporter = telemetry::start_progress_reporter(
        Arc::clone(&exchange),
        resolved.report_rate,
        Arc::clone(&stop),
    );

    let bridge_handle = if config.bridge_enabled {
        let controller = SpindleController::new(
            Arc::clone(&exchange),
            halt.clone(),
            resolved.ramp,
            resolved.wait,
        );
        let journal = audit_logger.as_ref().map(|logger| {
            Arc::new(AuditJournal::new(Arc::clone(logger), timebase)) as Arc<dyn CommandJournal>
        });
        let bridge_config = BridgeConfig {
            bind_addr: config.bind_addr.clone(),
            ..BridgeConfig::default()
        };
        let stop_bridge = Arc::clone(&stop);
        info!(addr = %bridge_config.bind_addr, "Starting command bridge");
        Some(thread::spawn(move || {
            run_bridge(controller, bridge_config, stop_bridge, journal);
        }))
    } else {
        info!("Command bridge disabled");
        None
    };

    info!("Spindle controller running");

    if let Some(seconds) = config.run_seconds {
        info!(seconds, "Running for limited duration");
        thread::sleep(Duration::from_secs(seconds));
        // Releases a bridge command blocked on a speed wait.
        halt.trigger();
        stop.store(true, Ordering::Relaxed);
    }

    let stats = match tick_handle.join() {
        Ok(stats) => stats,
        Err(_) => {
            error!("Update tick thread panicked");
            TickStats::default()
        }
    };
    if let Some(handle) = bridge_handle {
        let _ = handle.join();
    }
    let _ = metrics_updater.join();
    let _ = reporter.join();

    info!(
        ticks_executed = stats.ticks_executed,
        ticks_missed = stats.ticks_missed,
        manual_ticks = stats.manual_ticks,
        "Run complete"
    );
    audit(
        AuditEventType::SystemShutdown,
        serde_json::json!({
            "ticks_executed": stats.ticks_executed,
            "ticks_missed": stats.ticks_missed,
        }),
    );
    ExitCode::SUCCESS
}

fn start_update_tick(
    resolved: &ResolvedConfig,
    exchange: Arc<SpindleExchange>,
    timebase: TimeBase,
    stop: Arc<AtomicBool>,
) -> thread::JoinHandle<TickStats> {
    let pin = resolved.pin;
    let ramp = resolved.ramp;
    let rate = resolved.update_rate;

    info!(
        pin = %pin,
        update_hz = rate.hz(),
        period_us = ramp.pwm_period_us,
        policy = ?ramp.policy,
        "Starting spindle update tick"
    );

    thread::spawn(move || {
        let esc = SimulatedEsc::new(pin);
        let mut spindle = SpindleLoop::new(esc, ramp, exchange, timebase);
        spindle.run(rate, &stop);
        debug!(writes = spindle.pwm().stats().writes, "PWM output released");
        spindle.stats().clone()
    })
}

fn init_audit_logger(audit_path: Option<&PathBuf>) -> std::io::Result<Option<Arc<AuditLogger>>> {
    audit_path
        .map(|path| -> std::io::Result<Arc<AuditLogger>> {
            let logger = AuditLogger::new(path)?;
            info!(path = %path.display(), "Audit logging enabled");
            Ok(Arc::new(logger))
        })
        .transpose()
}
