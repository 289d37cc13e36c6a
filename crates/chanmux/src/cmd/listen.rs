use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chanmux_mux::{Multiplex, MuxError};
use tracing::{debug, info, warn};

use crate::cmd::{
    channel_list, enable_channels, install_ctrlc_handler, open_incoming, parse_duration,
    ListenArgs,
};
use crate::exit::{mux_error, CliResult, SUCCESS};
use crate::output::{print_channel, OutputFormat};

pub fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let channels = channel_list(args.channels.as_deref())?;

    let (stream, _listener) = open_incoming(args.socket.as_deref())?;
    let mux = Multiplex::with_config(stream, args.mux.config());
    enable_channels(&mux, channels)?;

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let mut printed = 0usize;

    while running.load(Ordering::SeqCst) {
        if args.count.is_some_and(|count| printed >= count) {
            break;
        }

        let channel = match mux.select(timeout) {
            Ok(channel) => channel,
            Err(MuxError::Timeout) => continue,
            Err(MuxError::Ignored { channel }) => {
                debug!(channel, "dropped frame for channel not being listened to");
                continue;
            }
            Err(err @ MuxError::ResourceExhausted { .. }) => {
                warn!(error = %err, "frame dropped");
                continue;
            }
            Err(MuxError::Closed) => {
                info!("stream closed");
                break;
            }
            Err(err) => return Err(mux_error("select failed", err)),
        };

        if let Some(view) = mux.peek(channel) {
            print_channel(channel, &view, format);
        }
        mux.clear(channel);
        printed = printed.saturating_add(1);
    }

    Ok(SUCCESS)
}
