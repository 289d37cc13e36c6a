use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chanmux_mux::{Multiplex, MuxError};
use tracing::{debug, info, warn};

use crate::cmd::{
    channel_list, enable_channels, ensure_whole_frame, install_ctrlc_handler, open_incoming,
    EchoArgs,
};
use crate::exit::{mux_error, CliResult, SUCCESS};

/// How often the loop wakes up to notice Ctrl-C.
const POLL_INTERVAL: Duration = Duration::from_millis(500);

pub fn run(args: EchoArgs) -> CliResult<i32> {
    let channels = channel_list(args.channels.as_deref())?;

    let (stream, _listener) = open_incoming(Some(args.socket.as_path()))?;
    let mux = Multiplex::with_config(stream, args.mux.config());
    enable_channels(&mux, channels)?;

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    while running.load(Ordering::SeqCst) {
        let channel = match mux.select(POLL_INTERVAL) {
            Ok(channel) => channel,
            Err(MuxError::Timeout) => continue,
            Err(MuxError::Ignored { channel }) => {
                debug!(channel, "not echoing channel");
                continue;
            }
            Err(err @ MuxError::ResourceExhausted { .. }) => {
                warn!(error = %err, "frame dropped");
                continue;
            }
            Err(MuxError::Closed) => {
                info!("peer closed the stream");
                break;
            }
            Err(err) => return Err(mux_error("select failed", err)),
        };

        let Some(data) = mux.snapshot(channel) else {
            continue;
        };
        mux.clear(channel);

        let written = mux
            .send(channel, &data)
            .map_err(|err| mux_error("echo failed", err))?;
        ensure_whole_frame(channel, data.len(), written)?;
        debug!(channel, size = data.len(), "echoed");
    }

    Ok(SUCCESS)
}
