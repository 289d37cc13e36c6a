use chanmux_frame::{FrameConfig, FrameWriter};
use tracing::debug;

use crate::cmd::{open_outgoing, read_file, SendArgs};
use crate::exit::{frame_error, CliError, CliResult, SUCCESS, USAGE};

pub fn run(args: SendArgs) -> CliResult<i32> {
    let payload = resolve_payload(&args)?;

    let mut config = FrameConfig::default();
    if let Some(max) = args.max_payload {
        config.max_payload_size = max;
    }

    let stream = open_outgoing(args.socket.as_deref())?;
    let mut writer = FrameWriter::with_config(stream, config);
    writer
        .send_all(args.channel, &payload)
        .map_err(|err| frame_error("send failed", err))?;

    debug!(channel = args.channel, size = payload.len(), "frame sent");
    Ok(SUCCESS)
}

fn resolve_payload(args: &SendArgs) -> CliResult<Vec<u8>> {
    if let Some(json) = &args.json {
        serde_json::from_str::<serde_json::Value>(json)
            .map_err(|err| CliError::new(USAGE, format!("--json is not valid JSON: {err}")))?;
        return Ok(json.as_bytes().to_vec());
    }
    if let Some(data) = &args.data {
        return Ok(data.as_bytes().to_vec());
    }
    if let Some(path) = &args.file {
        return read_file(path);
    }
    Ok(Vec::new())
}
