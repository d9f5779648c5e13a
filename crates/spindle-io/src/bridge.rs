use crate::metrics::{
    BRIDGE_CONNECTED, COMMANDS_REJECTED, HALTS, WAITS_HALTED, WAITS_REACHED, WAITS_TIMED_OUT,
};
use crate::protocol::{ResponseMsg, SpindleCommand};
use spindle_core::{
    HaltSignal, IdleHook, SettingsReport, SleepIdle, SpeedReport, SpindleController, WaitOutcome,
};
use std::collections::VecDeque;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, instrument, warn, Span};

pub struct BridgeConfig {
    pub bind_addr: String,
    /// Sleep between polls while a command waits for speed.
    pub idle_interval: Duration,
    pub write_timeout: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:7000".to_string(),
            idle_interval: Duration::from_millis(5),
            write_timeout: Duration::from_secs(1),
        }
    }
}

/// Result of one command, as answered to the client.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutcome {
    Done,
    Wait(WaitOutcome),
    Speed(SpeedReport),
    Settings(SettingsReport),
    Rejected(String),
}

impl CommandOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            CommandOutcome::Done => "done",
            CommandOutcome::Wait(wait) => wait.as_str(),
            CommandOutcome::Speed(_) => "speed",
            CommandOutcome::Settings(_) => "settings",
            CommandOutcome::Rejected(_) => "rejected",
        }
    }

    pub fn response(&self, command: &'static str) -> ResponseMsg {
        match self {
            CommandOutcome::Speed(report) => ResponseMsg::Speed(*report),
            CommandOutcome::Settings(report) => ResponseMsg::Settings(*report),
            CommandOutcome::Rejected(reason) => ResponseMsg::error(reason.clone()),
            other => ResponseMsg::ack(command, other.label()),
        }
    }
}

/// Receives every executed command, e.g. for an audit trail.
pub trait CommandJournal: Send + Sync {
    fn record(&self, command: &SpindleCommand, outcome: &CommandOutcome);
}

/// Runs one command against the controller. Speed commands block in
/// `idle` until the wait finishes.
pub fn dispatch<I: IdleHook + ?Sized>(
    controller: &mut SpindleController,
    command: &SpindleCommand,
    idle: &mut I,
) -> CommandOutcome {
    let halt = controller.halt_signal().clone();
    if halt.is_halted() && command.drives_spindle() {
        COMMANDS_REJECTED.inc();
        return CommandOutcome::Rejected("spindle is halted; send clear_halt first".to_string());
    }

    let outcome = match command {
        SpindleCommand::On { rpm } => {
            controller.turn_on();
            match rpm {
                Some(rpm) => CommandOutcome::Wait(controller.set_speed(*rpm, idle)),
                None => CommandOutcome::Done,
            }
        }
        SpindleCommand::Off => CommandOutcome::Wait(controller.turn_off(idle)),
        SpindleCommand::SetSpeed { rpm } => CommandOutcome::Wait(controller.set_speed(*rpm, idle)),
        SpindleCommand::ManualPwm { duty, enable: true } => {
            controller.set_manual_pwm(*duty);
            CommandOutcome::Done
        }
        SpindleCommand::ManualPwm { enable: false, .. } => {
            controller.disable_manual_override();
            CommandOutcome::Done
        }
        SpindleCommand::Report => CommandOutcome::Speed(controller.report_speed()),
        SpindleCommand::Settings => CommandOutcome::Settings(controller.report_settings()),
        SpindleCommand::Halt => {
            if !halt.is_halted() {
                HALTS.inc();
            }
            halt.trigger();
            controller.on_halt();
            CommandOutcome::Done
        }
        SpindleCommand::ClearHalt => {
            if halt.is_halted() {
                info!("Halt cleared");
            }
            halt.clear();
            CommandOutcome::Done
        }
    };

    if let CommandOutcome::Wait(wait) = outcome {
        match wait {
            WaitOutcome::Reached => WAITS_REACHED.inc(),
            WaitOutcome::Halted => {
                WAITS_HALTED.inc();
                controller.on_halt();
            }
            WaitOutcome::TimedOut => WAITS_TIMED_OUT.inc(),
        }
    }
    outcome
}

/// Longest command line accepted, newline excluded.
pub const MAX_LINE_BYTES: usize = 4096;
/// Lines queued behind a blocking command before new ones are dropped.
pub const MAX_PENDING_LINES: usize = 64;

/// One queued entry from the client.
#[derive(Debug, Clone, PartialEq)]
pub enum QueuedLine {
    Command(String),
    /// A line over `MAX_LINE_BYTES`; its bytes are discarded.
    TooLong,
}

/// Splits received bytes into command lines with bounded memory.
///
/// A partial line stops growing at `MAX_LINE_BYTES`: the rest of it is
/// skipped up to the next newline and it is queued once as `TooLong`.
/// When `MAX_PENDING_LINES` entries are waiting, further lines are dropped,
/// except that one halt line may always be queued.
#[derive(Debug, Default)]
pub struct LineBuffer {
    partial: Vec<u8>,
    discarding: bool,
    pending: VecDeque<QueuedLine>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, bytes: &[u8]) {
        let mut rest = bytes;
        while !rest.is_empty() {
            match rest.iter().position(|b| *b == b'\n') {
                Some(pos) => {
                    self.extend_partial(&rest[..pos]);
                    self.finish_line();
                    rest = &rest[pos + 1..];
                }
                None => {
                    self.extend_partial(rest);
                    rest = &[];
                }
            }
        }
    }

    pub fn pop(&mut self) -> Option<QueuedLine> {
        self.pending.pop_front()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn has_halt(&self) -> bool {
        self.pending
            .iter()
            .any(|line| matches!(line, QueuedLine::Command(text) if is_halt_line(text)))
    }

    fn extend_partial(&mut self, bytes: &[u8]) {
        if self.discarding {
            return;
        }
        if self.partial.len() + bytes.len() > MAX_LINE_BYTES {
            self.partial.clear();
            self.discarding = true;
        } else {
            self.partial.extend_from_slice(bytes);
        }
    }

    fn finish_line(&mut self) {
        if std::mem::take(&mut self.discarding) {
            warn!(max_bytes = MAX_LINE_BYTES, "Command line too long, discarded");
            self.enqueue(QueuedLine::TooLong);
            return;
        }
        let line = std::mem::take(&mut self.partial);
        match std::str::from_utf8(&line) {
            Ok(text) => {
                let trimmed = text.trim();
                if !trimmed.is_empty() {
                    self.enqueue(QueuedLine::Command(trimmed.to_string()));
                }
            }
            Err(_) => warn!("Dropping non UTF-8 command line"),
        }
    }

    fn enqueue(&mut self, line: QueuedLine) {
        let admits_halt = matches!(&line, QueuedLine::Command(text) if is_halt_line(text))
            && !self.has_halt();
        if self.pending.len() >= MAX_PENDING_LINES && !admits_halt {
            warn!(queued = self.pending.len(), "Command queue full, dropping line");
            COMMANDS_REJECTED.inc();
            return;
        }
        self.pending.push_back(line);
    }
}

struct Session {
    stream: TcpStream,
    lines: LineBuffer,
    closed: bool,
}

impl Session {
    fn new(stream: TcpStream) -> std::io::Result<Self> {
        stream.set_nonblocking(true)?;
        Ok(Self {
            stream,
            lines: LineBuffer::new(),
            closed: false,
        })
    }

    /// Reads whatever is available and queues complete lines.
    fn pump(&mut self) {
        let mut temp = [0u8; 1024];
        loop {
            match self.stream.read(&mut temp) {
                Ok(0) => {
                    self.closed = true;
                    break;
                }
                Ok(n) => self.lines.feed(&temp[..n]),
                Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(err) if err.kind() == std::io::ErrorKind::Interrupted => {}
                Err(err) => {
                    warn!(error = %err, "Bridge read error");
                    self.closed = true;
                    break;
                }
            }
        }
    }

    fn send(&mut self, msg: &ResponseMsg, timeout: Duration) {
        let line = msg.to_line();
        let mut bytes = line.as_bytes();
        let deadline = Instant::now() + timeout;
        while !bytes.is_empty() {
            match self.stream.write(bytes) {
                Ok(0) => {
                    self.closed = true;
                    return;
                }
                Ok(n) => bytes = &bytes[n..],
                Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                    if Instant::now() >= deadline {
                        warn!("Bridge client not reading, dropping connection");
                        self.closed = true;
                        return;
                    }
                    thread::sleep(Duration::from_millis(1));
                }
                Err(err) if err.kind() == std::io::ErrorKind::Interrupted => {}
                Err(err) => {
                    warn!(error = %err, "Bridge write error");
                    self.closed = true;
                    return;
                }
            }
        }
    }
}

fn is_halt_line(line: &str) -> bool {
    matches!(SpindleCommand::parse(line), Ok(SpindleCommand::Halt))
}

/// Keeps the connection serviced while a command blocks. A queued halt
/// line raises the halt signal at once; every line, halt included, is
/// answered in order once the running command returns.
struct SessionIdle<'a> {
    session: &'a mut Session,
    halt: HaltSignal,
    sleep: SleepIdle,
}

impl IdleHook for SessionIdle<'_> {
    fn on_idle(&mut self) {
        self.sleep.on_idle();
        self.session.pump();

        // The halt line stays queued so it still gets its own response.
        if !self.halt.is_halted() && self.session.lines.has_halt() {
            warn!("Halt received while waiting for spindle speed");
            HALTS.inc();
            self.halt.trigger();
        }
    }
}

#[instrument(skip_all, fields(command))]
fn handle_line(
    controller: &mut SpindleController,
    line: &str,
    session: &mut Session,
    idle_interval: Duration,
    journal: Option<&dyn CommandJournal>,
) -> ResponseMsg {
    let command = match SpindleCommand::parse(line) {
        Ok(command) => command,
        Err(e) => {
            warn!(error = %e, "Rejected command line");
            COMMANDS_REJECTED.inc();
            return ResponseMsg::error(e.to_string());
        }
    };
    Span::current().record("command", command.name());
    debug!(?command, "Command received");

    let mut idle = SessionIdle {
        session,
        halt: controller.halt_signal().clone(),
        sleep: SleepIdle {
            interval: idle_interval,
        },
    };
    let outcome = dispatch(controller, &command, &mut idle);
    if let Some(journal) = journal {
        journal.record(&command, &outcome);
    }
    outcome.response(command.name())
}

/// Serves one command client at a time until `stop` is set.
pub fn run_bridge(
    mut controller: SpindleController,
    config: BridgeConfig,
    stop: Arc<AtomicBool>,
    journal: Option<Arc<dyn CommandJournal>>,
) {
    let listener = match TcpListener::bind(&config.bind_addr) {
        Ok(listener) => listener,
        Err(e) => {
            error!(addr = %config.bind_addr, error = %e, "Failed to bind command bridge");
            return;
        }
    };
    if let Err(e) = listener.set_nonblocking(true) {
        error!(error = %e, "Failed to set bridge listener nonblocking");
        return;
    }

    info!(addr = %config.bind_addr, "Command bridge listening");

    let mut session: Option<Session> = None;

    while !stop.load(Ordering::Relaxed) {
        if session.is_none() {
            match listener.accept() {
                Ok((stream, addr)) => match Session::new(stream) {
                    Ok(s) => {
                        info!(client_addr = %addr, "Bridge client connected");
                        BRIDGE_CONNECTED.set(1.0);
                        session = Some(s);
                    }
                    Err(e) => warn!(error = %e, "Failed to configure client socket"),
                },
                Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {}
                Err(err) => warn!("Bridge accept error: {}", err),
            }
        }

        if let Some(active) = session.as_mut() {
            active.pump();
            while let Some(queued) = active.lines.pop() {
                let response = match queued {
                    QueuedLine::Command(line) => handle_line(
                        &mut controller,
                        &line,
                        active,
                        config.idle_interval,
                        journal.as_deref(),
                    ),
                    QueuedLine::TooLong => {
                        COMMANDS_REJECTED.inc();
                        ResponseMsg::error(format!(
                            "command line exceeds {} bytes",
                            MAX_LINE_BYTES
                        ))
                    }
                };
                active.send(&response, config.write_timeout);
            }
            if active.closed {
                info!("Bridge client disconnected");
                BRIDGE_CONNECTED.set(0.0);
                session = None;
            }
        }

        thread::sleep(Duration::from_millis(5));
    }
}
