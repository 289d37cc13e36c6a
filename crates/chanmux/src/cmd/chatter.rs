use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use chanmux_mux::{Multiplex, MuxError};
use tracing::{debug, info};

use crate::cmd::{
    channel_list, ensure_whole_frame, install_ctrlc_handler, open_outgoing, parse_duration,
    ChatterArgs,
};
use crate::exit::{mux_error, CliResult, SUCCESS};

pub fn run(args: ChatterArgs) -> CliResult<i32> {
    let interval = parse_duration(&args.interval)?;
    let channels: Vec<u8> = match channel_list(args.channels.as_deref())? {
        Some(list) => list.to_vec(),
        None => (0..=u8::MAX).collect(),
    };

    let mux = Multiplex::new(open_outgoing(args.socket.as_deref())?);

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    for (sent, channel) in channels.iter().copied().cycle().enumerate() {
        if args.count.is_some_and(|count| sent >= count) {
            break;
        }
        if sent > 0 {
            thread::sleep(interval);
        }
        if !running.load(Ordering::SeqCst) {
            break;
        }

        let text = greeting(channel);
        match mux.send_str(channel, &text) {
            Ok(written) => {
                ensure_whole_frame(channel, text.len(), written)?;
                debug!(channel, written, "sent greeting");
            }
            Err(MuxError::Closed) => {
                info!("peer closed the stream");
                break;
            }
            Err(err) => return Err(mux_error("send failed", err)),
        }
    }

    Ok(SUCCESS)
}

fn greeting(channel: u8) -> String {
    format!("Hello on Channel {channel}.")
}
