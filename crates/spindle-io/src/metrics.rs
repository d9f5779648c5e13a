//! Prometheus metrics for the spindle controller.
//!
//! Gauges mirror the last published tick; counters track waits and
//! commands seen by the bridge.

use prometheus::{Encoder, Gauge, IntCounter, Registry, TextEncoder};
use spindle_core::{tags, SpindleExchange};
use std::sync::LazyLock;
use std::thread;
use tiny_http::{Header, Response, Server};

/// Global metrics registry
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

fn gauge(name: &str, help: &str) -> Gauge {
    let gauge = Gauge::new(name, help).expect("valid gauge definition");
    REGISTRY
        .register(Box::new(gauge.clone()))
        .expect("gauge registered once");
    gauge
}

fn tag_gauge(tag: tags::Tag) -> Gauge {
    gauge(tag.metric, tag.help)
}

fn counter(name: &str, help: &str) -> IntCounter {
    let counter = IntCounter::new(name, help).expect("valid counter definition");
    REGISTRY
        .register(Box::new(counter.clone()))
        .expect("counter registered once");
    counter
}

// ============================================================================
// Update Tick Metrics
// ============================================================================

pub static TICKS_EXECUTED: LazyLock<IntCounter> =
    LazyLock::new(|| counter("spindle_ticks_executed_total", "Update ticks executed"));

pub static TICKS_MISSED: LazyLock<IntCounter> = LazyLock::new(|| {
    counter(
        "spindle_ticks_missed_total",
        "Update ticks that started after their deadline",
    )
});

// ============================================================================
// Spindle State Metrics
// ============================================================================

pub static CURRENT_RPM: LazyLock<Gauge> = LazyLock::new(|| tag_gauge(tags::CURRENT_RPM));

pub static TARGET_RPM: LazyLock<Gauge> = LazyLock::new(|| tag_gauge(tags::TARGET_RPM));

pub static DUTY: LazyLock<Gauge> = LazyLock::new(|| tag_gauge(tags::DUTY));

pub static OUTPUT_LEVEL: LazyLock<Gauge> = LazyLock::new(|| tag_gauge(tags::OUTPUT_LEVEL));

pub static SPINDLE_ON: LazyLock<Gauge> = LazyLock::new(|| tag_gauge(tags::SPINDLE_ON));

pub static MANUAL_OVERRIDE: LazyLock<Gauge> = LazyLock::new(|| tag_gauge(tags::MANUAL_OVERRIDE));

pub static WAITING: LazyLock<Gauge> = LazyLock::new(|| tag_gauge(tags::WAITING));

// ============================================================================
// Command Metrics
// ============================================================================

pub static WAITS_REACHED: LazyLock<IntCounter> =
    LazyLock::new(|| counter("spindle_waits_reached_total", "Speed waits that reached target"));

pub static WAITS_HALTED: LazyLock<IntCounter> =
    LazyLock::new(|| counter("spindle_waits_halted_total", "Speed waits aborted by halt"));

pub static WAITS_TIMED_OUT: LazyLock<IntCounter> =
    LazyLock::new(|| counter("spindle_waits_timed_out_total", "Speed waits that timed out"));

pub static HALTS: LazyLock<IntCounter> =
    LazyLock::new(|| counter("spindle_halts_total", "Halt requests received"));

pub static COMMANDS_REJECTED: LazyLock<IntCounter> = LazyLock::new(|| {
    counter(
        "spindle_commands_rejected_total",
        "Command lines refused (malformed, invalid or halted)",
    )
});

/// Bridge client connection status (1 = connected, 0 = disconnected)
pub static BRIDGE_CONNECTED: LazyLock<Gauge> = LazyLock::new(|| {
    gauge(
        "spindle_bridge_connected",
        "Command bridge client connection status (1=connected, 0=disconnected)",
    )
});

/// Copies the exchange into the gauges and advances the tick counters.
/// Returns the tick count seen, to pass back in on the next call.
pub fn update_from_exchange(exchange: &SpindleExchange, last_tick_count: u64, last_missed: u64) -> (u64, u64) {
    let snapshot = exchange.read_snapshot();
    let request = exchange.read_request();

    CURRENT_RPM.set(snapshot.current_rpm);
    TARGET_RPM.set(request.target_rpm);
    DUTY.set(snapshot.current_duty);
    OUTPUT_LEVEL.set(snapshot.output_level);
    SPINDLE_ON.set(if request.on { 1.0 } else { 0.0 });
    MANUAL_OVERRIDE.set(if request.mode.is_manual() { 1.0 } else { 0.0 });
    WAITING.set(if exchange.is_waiting() { 1.0 } else { 0.0 });

    if snapshot.tick_count > last_tick_count {
        TICKS_EXECUTED.inc_by(snapshot.tick_count - last_tick_count);
    }
    if snapshot.ticks_missed > last_missed {
        TICKS_MISSED.inc_by(snapshot.ticks_missed - last_missed);
    }
    (
        snapshot.tick_count.max(last_tick_count),
        snapshot.ticks_missed.max(last_missed),
    )
}

// ============================================================================
// Metrics HTTP Server
// ============================================================================

/// Start the metrics HTTP server on the given address.
/// Returns a join handle for the server thread.
pub fn serve_metrics(bind_addr: String) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let server = match Server::http(&bind_addr) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!("Failed to start metrics server on {}: {}", bind_addr, e);
                return;
            }
        };

        tracing::info!("Metrics server listening on http://{}/metrics", bind_addr);

        for request in server.incoming_requests() {
            match request.url() {
                "/metrics" => {
                    let encoder = TextEncoder::new();
                    let metric_families = REGISTRY.gather();
                    let mut buffer = Vec::new();

                    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
                        tracing::warn!("Failed to encode metrics: {}", e);
                        let _ = request.respond(
                            Response::from_string("Internal Server Error").with_status_code(500),
                        );
                        continue;
                    }

                    let mut response = Response::from_data(buffer);
                    if let Ok(header) = Header::from_bytes(
                        &b"Content-Type"[..],
                        &b"text/plain; version=0.0.4"[..],
                    ) {
                        response = response.with_header(header);
                    }
                    let _ = request.respond(response);
                }
                "/health" => {
                    let _ = request.respond(Response::from_string("OK"));
                }
                "/ready" => {
                    // Ready once the update tick has run
                    if TICKS_EXECUTED.get() > 0 {
                        let _ = request.respond(Response::from_string("Ready"));
                    } else {
                        let _ = request
                            .respond(Response::from_string("Not Ready").with_status_code(503));
                    }
                }
                _ => {
                    let _ =
                        request.respond(Response::from_string("Not Found").with_status_code(404));
                }
            }
        }
    })
}

/// Initialize all metrics (forces lazy initialization)
pub fn init_metrics() {
    let _ = TICKS_EXECUTED.get();
    let _ = TICKS_MISSED.get();
    let _ = CURRENT_RPM.get();
    let _ = TARGET_RPM.get();
    let _ = DUTY.get();
    let _ = OUTPUT_LEVEL.get();
    let _ = SPINDLE_ON.get();
    let _ = MANUAL_OVERRIDE.get();
    let _ = WAITING.get();
    let _ = WAITS_REACHED.get();
    let _ = WAITS_HALTED.get();
    let _ = WAITS_TIMED_OUT.get();
    let _ = HALTS.get();
    let _ = COMMANDS_REJECTED.get();
    let _ = BRIDGE_CONNECTED.get();
}

#[cfg(test)]
mod tests {
    use super::*;
    use spindle_core::{ControlRequest, OutputMode, SpindleSnapshot};

    #[test]
    fn exchange_updates_gauges_and_counters() {
        init_metrics();
        let exchange = SpindleExchange::new(ControlRequest {
            on: true,
            target_rpm: 4000.0,
            mode: OutputMode::Automatic,
        });
        exchange.publish_snapshot(SpindleSnapshot {
            tick_count: 7,
            current_rpm: 70.0,
            current_duty: 10.0,
            ..SpindleSnapshot::default()
        });

        let before = TICKS_EXECUTED.get();
        let (ticks, missed) = update_from_exchange(&exchange, 0, 0);

        assert_eq!(ticks, 7);
        assert_eq!(missed, 0);
        assert_eq!(TICKS_EXECUTED.get() - before, 7);
        assert_eq!(TARGET_RPM.get(), 4000.0);
        assert_eq!(SPINDLE_ON.get(), 1.0);
    }

    #[test]
    fn snapshot_gauges_follow_tags() {
        init_metrics();
        let families = REGISTRY.gather();
        for tag in tags::ALL {
            let family = families
                .iter()
                .find(|family| family.get_name() == tag.metric)
                .unwrap_or_else(|| panic!("{} not registered", tag.metric));
            assert_eq!(family.get_help(), tag.help);
        }
    }
}
