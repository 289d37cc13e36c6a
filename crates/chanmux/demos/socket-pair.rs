//! Two threads talking over one socket pair on several channels.
//!
//! Run with: `cargo run -p chanmux --example socket-pair`

use std::os::unix::net::UnixStream;
use std::thread;
use std::time::Duration;

use chanmux::{Multiplex, MuxError};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (left, right) = UnixStream::pair()?;

    let producer = thread::spawn(move || -> Result<(), MuxError> {
        let mux = Multiplex::new(left);
        for (i, channel) in [3u8, 17, 3, 255, 42].into_iter().enumerate() {
            mux.send_str(channel, &format!("Hello on Channel {channel}. (#{i})"))?;
            thread::sleep(Duration::from_millis(50));
        }
        Ok(())
    });

    let mux = Multiplex::new(right);
    mux.enable_range(0, 255, None)?;

    loop {
        match mux.select(Duration::from_secs(2)) {
            Ok(channel) => {
                let data = mux.snapshot(channel).unwrap_or_default();
                println!("[channel:{channel:03}] {}", String::from_utf8_lossy(&data));
                mux.clear(channel);
            }
            Err(MuxError::Timeout) => continue,
            Err(MuxError::Closed) => break,
            Err(err) => return Err(err.into()),
        }
    }

    producer.join().map_err(|_| "producer panicked")??;
    Ok(())
}
