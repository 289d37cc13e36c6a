use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chanmux_frame::HEADER_SIZE;
use chanmux_mux::{Multiplex, MuxConfig};
use chanmux_transport::{IpcStream, PollRead, UnixDomainSocket};
use clap::{Args, Subcommand};
use tracing::info;

use crate::exit::{
    io_error, mux_error, transport_error, CliError, CliResult, FAILURE, INTERNAL, USAGE,
};
use crate::output::OutputFormat;

pub mod chatter;
pub mod echo;
pub mod listen;
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Read frames and print each channel's data as it arrives.
    Listen(ListenArgs),
    /// Send a single frame.
    Send(SendArgs),
    /// Send a greeting on each channel in turn.
    Chatter(ChatterArgs),
    /// Accept one connection and send every channel's data back on the same channel.
    Echo(EchoArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Listen(args) => listen::run(args, format),
        Command::Send(args) => send::run(args),
        Command::Chatter(args) => chatter::run(args),
        Command::Echo(args) => echo::run(args),
        Command::Version(args) => version::run(args),
    }
}

/// Buffer and frame limits shared by commands that build a multiplexer.
#[derive(Args, Debug)]
pub struct MuxArgs {
    /// Initial buffer capacity for each enabled channel, in bytes.
    #[arg(long, value_name = "BYTES")]
    pub initial_capacity: Option<usize>,
    /// Largest frame payload accepted or sent, in bytes.
    #[arg(long, value_name = "BYTES")]
    pub max_payload: Option<usize>,
}

impl MuxArgs {
    pub fn config(&self) -> MuxConfig {
        let mut config = MuxConfig::default();
        if let Some(capacity) = self.initial_capacity {
            config = config.with_default_capacity(capacity);
        }
        if let Some(max) = self.max_payload {
            config = config.with_max_payload_size(max);
        }
        config
    }
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Bind this Unix socket and read from the first connection instead of stdin.
    #[arg(long, value_name = "PATH")]
    pub socket: Option<PathBuf>,
    /// Channels to enable (comma-separated). Default: all 256.
    #[arg(long, value_delimiter = ',')]
    pub channels: Option<Vec<u8>>,
    /// How long each select waits for a frame (e.g. 2s, 500ms).
    #[arg(long, default_value = "2s")]
    pub timeout: String,
    /// Exit after printing N channel updates.
    #[arg(long)]
    pub count: Option<usize>,
    #[command(flatten)]
    pub mux: MuxArgs,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Connect to this Unix socket instead of writing to stdout.
    #[arg(long, value_name = "PATH")]
    pub socket: Option<PathBuf>,
    /// Channel to send on.
    #[arg(long, short = 'c')]
    pub channel: u8,
    /// JSON payload.
    #[arg(long, conflicts_with_all = ["data", "file"])]
    pub json: Option<String>,
    /// Raw string payload.
    #[arg(long, conflicts_with_all = ["json", "file"])]
    pub data: Option<String>,
    /// Read payload from file.
    #[arg(long, conflicts_with_all = ["json", "data"])]
    pub file: Option<PathBuf>,
    /// Largest payload allowed, in bytes.
    #[arg(long, value_name = "BYTES")]
    pub max_payload: Option<usize>,
}

#[derive(Args, Debug)]
pub struct ChatterArgs {
    /// Connect to this Unix socket instead of writing to stdout.
    #[arg(long, value_name = "PATH")]
    pub socket: Option<PathBuf>,
    /// Channels to rotate through (comma-separated). Default: all 256.
    #[arg(long, value_delimiter = ',')]
    pub channels: Option<Vec<u8>>,
    /// Pause between messages (e.g. 1s, 250ms).
    #[arg(long, default_value = "1s")]
    pub interval: String,
    /// Stop after N messages. Default: run until interrupted.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct EchoArgs {
    /// Unix socket to bind.
    #[arg(long, value_name = "PATH")]
    pub socket: PathBuf,
    /// Channels to echo (comma-separated). Default: all 256.
    #[arg(long, value_delimiter = ',')]
    pub channels: Option<Vec<u8>>,
    #[command(flatten)]
    pub mux: MuxArgs,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Stream a consumer reads from: the first connection on `socket`, or stdin.
///
/// The returned listener must outlive the session; dropping it removes the
/// socket file.
pub fn open_incoming(socket: Option<&Path>) -> CliResult<(IpcStream, Option<UnixDomainSocket>)> {
    match socket {
        Some(path) => {
            let listener =
                UnixDomainSocket::bind(path).map_err(|err| transport_error("bind failed", err))?;
            info!(path = %path.display(), "waiting for a connection");
            let stream = listener
                .accept()
                .map_err(|err| transport_error("accept failed", err))?;
            Ok((stream, Some(listener)))
        }
        None => {
            let stream =
                IpcStream::stdin().map_err(|err| transport_error("cannot open stdin", err))?;
            Ok((stream, None))
        }
    }
}

/// Stream a producer writes to: a connection to `socket`, or stdout.
pub fn open_outgoing(socket: Option<&Path>) -> CliResult<IpcStream> {
    match socket {
        Some(path) => {
            UnixDomainSocket::connect(path).map_err(|err| transport_error("connect failed", err))
        }
        None => IpcStream::stdout().map_err(|err| transport_error("cannot open stdout", err)),
    }
}

/// Channel ids to enable, or `None` for the full range.
pub fn channel_list(channels: Option<&[u8]>) -> CliResult<Option<&[u8]>> {
    match channels {
        Some([]) => Err(CliError::new(USAGE, "--channels must name at least one channel")),
        other => Ok(other),
    }
}

/// Enable `channels`, or every channel when `None`.
pub fn enable_channels<S: PollRead + Write>(
    mux: &Multiplex<S>,
    channels: Option<&[u8]>,
) -> CliResult<()> {
    match channels {
        Some(list) => list
            .iter()
            .try_for_each(|&id| mux.enable(id, None))
            .map_err(|err| mux_error("enable failed", err)),
        None => mux
            .enable_range(0, u8::MAX, None)
            .map_err(|err| mux_error("enable failed", err)),
    }
}

/// Fail unless a single-write send put the whole frame on the stream.
///
/// A partial frame cannot be resumed, so every later frame would be misread.
pub fn ensure_whole_frame(channel: u8, payload_len: usize, written: usize) -> CliResult<()> {
    let frame_len = HEADER_SIZE + payload_len;
    if written < frame_len {
        return Err(CliError::new(
            FAILURE,
            format!("short write on channel {channel}: {written} of {frame_len} bytes"),
        ));
    }
    Ok(())
}

pub fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}

pub fn read_file(path: &Path) -> CliResult<Vec<u8>> {
    std::fs::read(path).map_err(|err| io_error(&format!("failed reading {}", path.display()), err))
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
