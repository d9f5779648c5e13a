use spindle_core::{SpeedReport, SpindleExchange, TickRate, Ticker};
use spindle_io::metrics::{init_metrics, serve_metrics, update_from_exchange};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info};

pub fn init() {
    init_metrics();
}

pub fn start_metrics_server(addr: &Option<String>) -> Option<thread::JoinHandle<()>> {
    addr.as_ref().map(|addr| {
        info!(addr = %addr, "Starting metrics server");
        serve_metrics(addr.clone())
    })
}

pub fn start_metrics_updater(
    exchange: Arc<SpindleExchange>,
    stop: Arc<AtomicBool>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let mut last_tick_count = 0u64;
        let mut last_missed = 0u64;
        while !stop.load(Ordering::Relaxed) {
            (last_tick_count, last_missed) =
                update_from_exchange(&exchange, last_tick_count, last_missed);
            thread::sleep(Duration::from_millis(200));
        }
    })
}

/// The speed line for the report tick, present only while a command waits
/// for the spindle to reach its target.
pub fn progress_report(exchange: &SpindleExchange) -> Option<SpeedReport> {
    exchange
        .is_waiting()
        .then(|| SpeedReport::capture(exchange))
}

/// Report tick: logs the spindle speed while a command waits for it.
pub fn start_progress_reporter(
    exchange: Arc<SpindleExchange>,
    rate: TickRate,
    stop: Arc<AtomicBool>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        run_progress_reporter(&exchange, rate, &stop, |report| {
            info!("{}", report);
            debug!(report = %report.machine_line(), "Speed report");
        })
    })
}

fn run_progress_reporter(
    exchange: &SpindleExchange,
    rate: TickRate,
    stop: &AtomicBool,
    mut emit: impl FnMut(&SpeedReport),
) {
    let mut ticker = Ticker::new(rate);
    while !stop.load(Ordering::Relaxed) {
        ticker.wait_next();
        if let Some(report) = progress_report(exchange) {
            emit(&report);
        }
    }
}
