use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::{Args, Subcommand};
use eyetribe_session::{Endpoint, Session, SessionConfig, SessionError};

use crate::exit::{session_error, CliError, CliResult, INTERNAL, USAGE};
use crate::output::{FramePrinter, OutputFormat};

pub mod info;
pub mod pull;
pub mod stream;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Connect and print what the tracker reports about itself.
    Info(InfoArgs),
    /// Request frames one at a time (pull mode).
    Pull(PullArgs),
    /// Print frames as the tracker streams them (push mode).
    Stream(StreamArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, target: &TargetArgs, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Info(args) => info::run(args, target, format),
        Command::Pull(args) => pull::run(args, target, format),
        Command::Stream(args) => stream::run(args, target, format),
        Command::Version(args) => version::run(args),
    }
}

/// Where the tracker lives and how long to wait for it.
#[derive(Args, Debug)]
pub struct TargetArgs {
    /// Tracker server host.
    #[arg(long, env = "EYETRIBE_HOST", default_value = "localhost", global = true)]
    pub host: String,
    /// Tracker server port.
    #[arg(long, env = "EYETRIBE_PORT", default_value_t = Endpoint::DEFAULT_PORT, global = true)]
    pub port: u16,
    /// Bound on connecting and on every reply or frame (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s", global = true)]
    pub timeout: String,
}

impl TargetArgs {
    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(self.host.clone(), self.port)
    }

    pub fn config(&self) -> CliResult<SessionConfig> {
        let timeout = parse_duration(&self.timeout)?;
        Ok(SessionConfig {
            connect_timeout: timeout,
            ..SessionConfig::default()
        }
        .with_handshake_timeout(timeout)
        .with_request_timeout(timeout)
        .with_frame_timeout(timeout))
    }

    /// Connect a session shared with the Ctrl-C handler.
    pub fn connect(&self, config: SessionConfig) -> CliResult<Arc<Session>> {
        let session = Session::with_config(self.endpoint(), config);
        session
            .connect()
            .map_err(|err| session_error("connect failed", err))?;
        Ok(Arc::new(session))
    }
}

#[derive(Args, Debug, Default)]
pub struct InfoArgs {}

#[derive(Args, Debug)]
pub struct PullArgs {
    /// Exit after N frames.
    #[arg(long, short = 'n')]
    pub count: Option<usize>,
    /// Pause between requests (e.g. 33ms).
    #[arg(long)]
    pub interval: Option<String>,
}

#[derive(Args, Debug)]
pub struct StreamArgs {
    /// Exit after N frames.
    #[arg(long, short = 'n')]
    pub count: Option<usize>,
    /// Report dT relative to the first streamed frame.
    #[arg(long)]
    pub rebase_time: bool,
    /// Keep at most N unread frames, dropping the oldest.
    #[arg(long, value_name = "N")]
    pub queue_capacity: Option<usize>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Ctrl-C clears the returned flag and closes the session, which wakes a
/// blocked `next()`.
pub fn install_stop_handler(session: &Arc<Session>) -> CliResult<Arc<AtomicBool>> {
    let running = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&running);
    let session = Arc::clone(session);
    ctrlc::set_handler(move || {
        flag.store(false, Ordering::SeqCst);
        session.close();
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))?;
    Ok(running)
}

/// Print frames until `count` is reached or the user interrupts.
pub fn print_frames(
    session: &Session,
    running: &AtomicBool,
    count: Option<usize>,
    pause: Option<Duration>,
    format: OutputFormat,
) -> CliResult<usize> {
    let mut printer = FramePrinter::new(format);
    let mut printed = 0usize;

    let outcome = loop {
        if !running.load(Ordering::SeqCst) || count.is_some_and(|count| printed >= count) {
            break Ok(printed);
        }

        match session.next() {
            Ok(frame) => {
                printer.print(&frame);
                printed = printed.saturating_add(1);
            }
            Err(SessionError::ConnectionClosed) if !running.load(Ordering::SeqCst) => {
                break Ok(printed);
            }
            Err(err) => break Err(session_error("receive failed", err)),
        }

        if let Some(pause) = pause {
            thread::sleep(pause);
        }
    };

    printer.finish();
    outcome
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_seconds() {
        assert_eq!(parse_duration("5s").unwrap(), Duration::from_secs(5));
        assert_eq!(parse_duration("2").unwrap(), Duration::from_secs(2));
    }

    #[test]
    fn parse_duration_millis() {
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
    }

    #[test]
    fn parse_duration_invalid() {
        assert_eq!(parse_duration("0s").unwrap_err().code, USAGE);
        assert_eq!(parse_duration("fast").unwrap_err().code, USAGE);
        assert_eq!(parse_duration("").unwrap_err().code, USAGE);
    }

    #[test]
    fn target_config_applies_timeout_everywhere() {
        let target = TargetArgs {
            host: "tracker.local".to_string(),
            port: 6556,
            timeout: "750ms".to_string(),
        };
        let config = target.config().unwrap();
        assert_eq!(config.connect_timeout, Duration::from_millis(750));
        assert_eq!(config.request_timeout, Duration::from_millis(750));
        assert_eq!(config.frame_timeout, Duration::from_millis(750));
        assert_eq!(target.endpoint().to_string(), "tracker.local:6556");
    }
}
