//! alarmd - interactive alarm dispatcher
//!
//! Reads commands at an `alarm>` prompt and prints notifications as
//! alarms are assigned and fired.
//!
//! # Usage
//!
//! ```bash
//! # Start with defaults
//! alarmd
//!
//! # Two workers per type, start workers automatically, JSON output
//! alarmd --workers-per-type 2 --auto-start --json
//!
//! # Use a specific config file
//! ALARMD_CONFIG=./alarmd.toml alarmd
//!
//! # Enable debug logging (stderr)
//! RUST_LOG=alarmd=debug alarmd
//! ```
//!
//! # Commands
//!
//! ```text
//! alarm> 5 MessageType(1) stand up
//! alarm> Create_Thread: MessageType(1)
//! alarm> Terminate_Thread: MessageType(1)
//! alarm> List
//! ```

use std::env;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::thread;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use alarm_core::AlarmEvent;
use alarm_protocol::{parse_command, render_alarm_list, render_event, render_event_json};
use alarmd::config::{EngineConfig, CONFIG_ENV};
use alarmd::{spawn_engine, AlarmEngine, CommandOutcome};

const PROMPT: &str = "alarm> ";

/// Lines buffered between the stdin reader thread and the prompt loop.
const INPUT_BUFFER: usize = 16;

/// Interactive alarm dispatcher
#[derive(Parser, Debug)]
#[command(name = "alarmd", version, about)]
struct Args {
    /// TOML config file (default: $ALARMD_CONFIG, then the user config dir)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print events as JSON lines
    #[arg(long)]
    json: bool,

    /// Only print fired alarms and terminations
    #[arg(short, long)]
    quiet: bool,

    /// Override the idle rescan interval (milliseconds)
    #[arg(long)]
    idle_ms: Option<u64>,

    /// Override the maximum number of workers per message type
    #[arg(long)]
    workers_per_type: Option<usize>,

    /// Start a worker automatically when a type is first scheduled
    #[arg(long)]
    auto_start: bool,
}

/// How events are written to stdout.
#[derive(Debug, Clone, Copy)]
struct Output {
    json: bool,
    quiet: bool,
}

impl Output {
    fn shows(&self, event: &AlarmEvent) -> bool {
        !self.quiet
            || matches!(
                event,
                AlarmEvent::Fired { .. } | AlarmEvent::TypeTerminated { .. }
            )
    }

    fn print_event(&self, out: &mut impl Write, event: &AlarmEvent) -> Result<()> {
        if !self.shows(event) {
            return Ok(());
        }
        let line = if self.json {
            render_event_json(event).context("Failed to serialize event")?
        } else {
            render_event(event)
        };
        writeln!(out, "{line}")?;
        out.flush()?;
        Ok(())
    }

    fn prompt(&self, out: &mut impl Write) -> Result<()> {
        if self.json {
            return Ok(());
        }
        write!(out, "{PROMPT}")?;
        out.flush()?;
        Ok(())
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    init_logging()?;

    let config = load_config(&args)?;
    let output = Output {
        json: args.json,
        quiet: args.quiet,
    };
    run(config, output)
}

fn init_logging() -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::new("alarmd=warn,alarm_core=warn,alarm_protocol=warn"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {e}"))
}

/// Resolves the config file and applies command-line overrides.
fn load_config(args: &Args) -> Result<EngineConfig> {
    let explicit = args
        .config
        .clone()
        .or_else(|| env::var_os(CONFIG_ENV).map(PathBuf::from));

    let mut config = EngineConfig::load(explicit.as_deref()).context("Failed to load config")?;

    if let Some(idle_ms) = args.idle_ms {
        config.idle_interval_ms = idle_ms;
    }
    if let Some(workers) = args.workers_per_type {
        config.max_workers_per_type = workers;
    }
    if args.auto_start {
        config.auto_start_workers = true;
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// Runs the prompt loop (async entry point).
#[tokio::main]
async fn run(config: EngineConfig, output: Output) -> Result<()> {
    info!(version = env!("CARGO_PKG_VERSION"), "alarmd starting");

    let engine = spawn_engine(config);
    let mut events = engine.subscribe();

    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            error!(error = %e, "Error waiting for shutdown signal");
        }
        shutdown_token.cancel();
    });

    let mut lines = spawn_stdin_reader()?;
    let mut stdout = io::stdout();

    // Output failures end the loop so the workers are still stopped below.
    if let Err(e) = output.prompt(&mut stdout) {
        error!(error = %e, "Failed to write prompt");
        cancel_token.cancel();
    }
    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => {
                info!("Shutdown signal received");
                break;
            }
            line = lines.recv() => {
                let Some(line) = line else {
                    debug!("End of input");
                    break;
                };
                let written = handle_line(&engine, &line, &mut stdout)
                    .and_then(|()| output.prompt(&mut stdout));
                if let Err(e) = written {
                    error!(error = %e, "Failed to write output, stopping");
                    break;
                }
            }
            event = events.recv() => match event {
                Ok(event) => {
                    if let Err(e) = output.print_event(&mut stdout, &event) {
                        error!(error = %e, "Failed to write event, stopping");
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event output fell behind, events dropped");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    engine.shutdown();

    let pending = engine.pending_count();
    if pending > 0 {
        warn!(pending, "Exiting with alarms still pending");
    }
    info!("alarmd stopped");
    Ok(())
}

/// Parses one prompt line and applies it.
///
/// Events carry the visible results of most commands; only listings and
/// refusals are printed here. Fails only if stdout cannot be written.
fn handle_line(engine: &AlarmEngine, line: &str, out: &mut impl Write) -> Result<()> {
    if line.trim().is_empty() {
        return Ok(());
    }

    let command = match parse_command(line) {
        Ok(command) => command,
        Err(e) => {
            eprintln!("Bad command: {e}");
            return Ok(());
        }
    };
    debug!(%command, "Applying command");

    match engine.apply(command) {
        Ok(CommandOutcome::Listing(alarms)) => {
            writeln!(out, "{}", render_alarm_list(&alarms, Utc::now()))?;
        }
        Ok(CommandOutcome::WorkerStarted {
            message_type,
            worker_id: None,
        }) => {
            writeln!(
                out,
                "Message type ({message_type}) already has its maximum number of workers"
            )?;
        }
        Ok(_) => {}
        Err(e) => {
            error!(error = %e, "Command failed");
            eprintln!("Error: {e}");
        }
    }
    Ok(())
}

/// Reads stdin on a dedicated thread so a blocked read never holds up
/// runtime shutdown. The channel closes at end of input.
fn spawn_stdin_reader() -> Result<mpsc::Receiver<String>> {
    let (tx, rx) = mpsc::channel(INPUT_BUFFER);

    thread::Builder::new()
        .name("stdin-reader".to_string())
        .spawn(move || {
            let stdin = io::stdin();
            for line in stdin.lock().lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        warn!(error = %e, "Failed to read stdin");
                        break;
                    }
                };
                if tx.blocking_send(line).is_err() {
                    break;
                }
            }
        })
        .context("Failed to spawn stdin reader")?;

    Ok(rx)
}

/// Waits for a shutdown signal (SIGTERM or SIGINT).
async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use alarm_core::{AlarmId, MessageType, WorkerId};

    /// A writer whose reader has gone away.
    struct ClosedPipe;

    impl Write for ClosedPipe {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::Error::from(io::ErrorKind::BrokenPipe))
        }

        fn flush(&mut self) -> io::Result<()> {
            Err(io::Error::from(io::ErrorKind::BrokenPipe))
        }
    }

    fn fired() -> AlarmEvent {
        AlarmEvent::Fired {
            alarm_id: AlarmId::new(1),
            message_type: MessageType::new(1),
            worker_id: WorkerId::new(1),
            seconds: 5,
            message: "hello".to_string(),
        }
    }

    fn engine() -> AlarmEngine {
        spawn_engine(EngineConfig {
            idle_interval_ms: 10,
            ..EngineConfig::default()
        })
    }

    #[test]
    fn test_print_event_writes_notification_line() {
        let output = Output {
            json: false,
            quiet: true,
        };
        let mut buf = Vec::new();
        output.print_event(&mut buf, &fired()).unwrap();
        output.prompt(&mut buf).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "(5) hello\nalarm> ");
    }

    #[test]
    fn test_quiet_output_skips_lifecycle_events() {
        let output = Output {
            json: false,
            quiet: true,
        };
        let exited = AlarmEvent::WorkerExited {
            worker_id: WorkerId::new(1),
            message_type: MessageType::new(1),
        };
        let mut buf = Vec::new();
        output.print_event(&mut buf, &exited).unwrap();
        assert!(buf.is_empty());
    }

    #[test]
    fn test_output_errors_are_reported_not_panicked() {
        let output = Output {
            json: false,
            quiet: false,
        };
        assert!(output.print_event(&mut ClosedPipe, &fired()).is_err());
        assert!(output.prompt(&mut ClosedPipe).is_err());

        let engine = engine();
        assert!(handle_line(&engine, "List", &mut ClosedPipe).is_err());
        engine.shutdown();
    }

    #[test]
    fn test_bad_command_is_not_an_output_error() {
        let engine = engine();
        let mut buf = Vec::new();
        handle_line(&engine, "Bogus input", &mut buf).unwrap();
        handle_line(&engine, "   ", &mut buf).unwrap();
        assert!(buf.is_empty());
        assert_eq!(engine.pending_count(), 0);
    }

    #[test]
    fn test_list_command_prints_pending_alarms() {
        let engine = engine();
        let mut buf = Vec::new();
        handle_line(&engine, "30 MessageType(2) later", &mut buf).unwrap();
        handle_line(&engine, "List", &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.starts_with("[list: 1 pending]"), "{text}");
        engine.shutdown();
    }
}
