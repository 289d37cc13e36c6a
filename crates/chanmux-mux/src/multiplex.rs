use std::io::{ErrorKind, Write};
use std::ops::Deref;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use chanmux_frame::{write_frame_once, FrameError, FrameReader, MAX_CHANNELS};
use chanmux_transport::PollRead;
use tracing::{debug, trace, warn};

use crate::buffer::{AllocError, ChannelBuffer};
use crate::config::MuxConfig;
use crate::error::{MuxError, Result};

/// Many logical channels over one framed, bidirectional byte stream.
///
/// All state (the stream, the 256-slot channel table and the partial-frame
/// read buffer) sits behind one mutex. Every method holds it for its whole
/// duration, including the blocking read inside [`select`](Self::select)
/// and [`receive`](Self::receive): while one thread waits for a frame, every
/// other caller waits for the lock. In exchange, concurrent selectors each
/// see a disjoint frame and no buffer is ever observed mid-update.
pub struct Multiplex<S> {
    inner: Mutex<Inner<S>>,
}

struct Inner<S> {
    reader: FrameReader<S>,
    /// Encode buffer for outgoing frames.
    scratch: BytesMut,
    channels: [Option<ChannelBuffer>; MAX_CHANNELS],
    config: MuxConfig,
    /// Set once reading hit EOF, an I/O error or a malformed frame.
    closed: bool,
}

impl<S: PollRead + Write> Multiplex<S> {
    /// Create a multiplexer over `stream` with default configuration.
    /// All channels start disabled.
    pub fn new(stream: S) -> Self {
        Self::with_config(stream, MuxConfig::default())
    }

    /// Create a multiplexer with explicit configuration.
    pub fn with_config(stream: S, config: MuxConfig) -> Self {
        Self {
            inner: Mutex::new(Inner {
                reader: FrameReader::with_config(stream, config.frame.clone()),
                scratch: BytesMut::new(),
                channels: std::array::from_fn(|_| None),
                config,
                closed: false,
            }),
        }
    }

    /// Enable channel `id` with a buffer of `initial_capacity` bytes
    /// (`None` or zero selects the configured default).
    ///
    /// Enabling an already enabled channel is a no-op and keeps its data.
    pub fn enable(&self, id: u8, initial_capacity: Option<usize>) -> Result<()> {
        self.lock().enable(id, initial_capacity)
    }

    /// Enable every channel in `lo..=hi`. Empty when `lo > hi`.
    ///
    /// Stops at the first allocation failure; channels enabled before it
    /// stay enabled.
    pub fn enable_range(&self, lo: u8, hi: u8, initial_capacity: Option<usize>) -> Result<()> {
        let mut inner = self.lock();
        for id in lo..=hi {
            inner.enable(id, initial_capacity)?;
        }
        Ok(())
    }

    /// Disable channel `id`, releasing its buffer and any unread data.
    /// Frames that arrive for it afterwards are discarded.
    pub fn disable(&self, id: u8) {
        if self.lock().channels[id as usize].take().is_some() {
            debug!(channel = id, "disabled channel");
        }
    }

    pub fn is_enabled(&self, id: u8) -> bool {
        self.lock().channels[id as usize].is_some()
    }

    /// Encode and write one frame with a single `write` call.
    ///
    /// Returns the byte count that write reported, which can be short of
    /// the frame size; nothing is retried here. Sending does not require
    /// the channel to be enabled locally.
    pub fn send(&self, id: u8, payload: &[u8]) -> Result<usize> {
        let mut guard = self.lock();
        let inner = &mut *guard;
        let max = inner.config.frame.max_payload_size;

        let written = write_frame_once(
            inner.reader.get_mut(),
            &mut inner.scratch,
            id,
            payload,
            max,
        )
        .map_err(write_failure)?;

        trace!(channel = id, size = payload.len(), written, "sent frame");
        Ok(written)
    }

    /// [`send`](Self::send) the UTF-8 bytes of `text`.
    pub fn send_str(&self, id: u8, text: &str) -> Result<usize> {
        self.send(id, text.as_bytes())
    }

    /// Report a channel with new data, reading at most one frame to find one.
    ///
    /// Channels whose buffered data no `select` has reported yet are served
    /// first, lowest id first, without any I/O. Otherwise one frame is read,
    /// waiting at most `timeout` in total, and appended to its channel.
    ///
    /// Returns [`MuxError::Ignored`] for a frame addressed to a disabled
    /// channel (the frame is dropped, the stream stays framed),
    /// [`MuxError::Timeout`] when the wait ran out and [`MuxError::Closed`]
    /// once the stream has ended.
    pub fn select(&self, timeout: Duration) -> Result<u8> {
        self.lock().select(timeout).map(|selected| selected.channel)
    }

    /// Receive up to `dst.len()` bytes on channel `id`.
    ///
    /// Already buffered data is returned without I/O. Otherwise this runs
    /// [`select`](Self::select); if the data that arrived belongs to another
    /// channel, it stays buffered (and will be reported by the next
    /// `select`) and the call returns [`MuxError::Ignored`]. Data that
    /// another channel already had buffered is reported once and not kept
    /// fresh, so retrying `receive` goes on to read the stream.
    pub fn receive(&self, timeout: Duration, id: u8, dst: &mut [u8]) -> Result<usize> {
        let mut inner = self.lock();

        if let Some(buf) = inner.channels[id as usize].as_mut() {
            if !buf.is_empty() {
                return Ok(buf.read(dst));
            }
        }

        let selected = inner.select(timeout)?;
        if selected.channel != id {
            if selected.from_stream {
                if let Some(other) = inner.channels[selected.channel as usize].as_mut() {
                    other.mark_fresh(selected.fresh);
                }
            }
            return Err(MuxError::Ignored {
                channel: selected.channel,
            });
        }

        inner.buffer_mut(id).map(|buf| buf.read(dst))
    }

    /// Drain up to `dst.len()` buffered bytes from channel `id` (no I/O).
    pub fn read(&self, id: u8, dst: &mut [u8]) -> Result<usize> {
        self.lock().buffer_mut(id).map(|buf| buf.read(dst))
    }

    /// Copy up to `dst.len()` buffered bytes without consuming them.
    pub fn copy(&self, id: u8, dst: &mut [u8]) -> Result<usize> {
        self.copy_at(id, 0, dst)
    }

    /// Like [`copy`](Self::copy), starting `offset` bytes into the unread data.
    pub fn copy_at(&self, id: u8, offset: usize, dst: &mut [u8]) -> Result<usize> {
        self.lock().buffer_mut(id).map(|buf| buf.copy_to(offset, dst))
    }

    /// Append `bytes` to channel `id`'s buffer as if they had arrived in a
    /// frame; the stream is not touched.
    pub fn write(&self, id: u8, bytes: &[u8]) -> Result<()> {
        let mut inner = self.lock();
        let buf = inner.buffer_mut(id)?;
        buf.append(bytes).map_err(|err| exhausted(id, err))
    }

    /// Discard channel `id`'s unread data and freshness, keeping the allocation.
    pub fn clear(&self, id: u8) {
        if let Some(buf) = self.lock().channels[id as usize].as_mut() {
            buf.clear();
        }
    }

    /// Mark channel `id`'s data as seen without consuming it.
    pub fn ignore(&self, id: u8) {
        if let Some(buf) = self.lock().channels[id as usize].as_mut() {
            buf.take_fresh();
        }
    }

    /// Unread byte count, or `None` if the channel is disabled.
    pub fn length(&self, id: u8) -> Option<usize> {
        self.lock().channels[id as usize]
            .as_ref()
            .map(ChannelBuffer::len)
    }

    /// Size of the latest append not yet reported by `select` (0 if none or
    /// if the channel is disabled).
    ///
    /// This is not the size of what the last `select` delivered: reporting a
    /// channel clears its count, so right after a `select` that read a frame
    /// for `id` this returns 0. Use [`length`](Self::length) for the buffered
    /// amount.
    pub fn last_received(&self, id: u8) -> usize {
        self.lock().channels[id as usize]
            .as_ref()
            .map_or(0, ChannelBuffer::freshness)
    }

    /// Allocated buffer size, or `None` if the channel is disabled.
    pub fn capacity(&self, id: u8) -> Option<usize> {
        self.lock().channels[id as usize]
            .as_ref()
            .map(ChannelBuffer::capacity)
    }

    /// Borrow channel `id`'s unread bytes.
    ///
    /// The view holds the instance lock until dropped; every other operation
    /// on this instance (from any thread) blocks meanwhile.
    pub fn peek(&self, id: u8) -> Option<ChannelView<'_, S>> {
        let guard = self.lock();
        guard.channels[id as usize].as_ref()?;
        Some(ChannelView { guard, id })
    }

    /// Owned copy of channel `id`'s unread bytes.
    pub fn snapshot(&self, id: u8) -> Option<Bytes> {
        self.lock().channels[id as usize]
            .as_ref()
            .map(|buf| Bytes::copy_from_slice(buf.unread()))
    }

    /// Consume the multiplexer and return the stream.
    ///
    /// Buffered channel data and any partially read frame are dropped.
    pub fn into_inner(self) -> S {
        self.inner
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
            .reader
            .into_inner()
    }

    /// Buffers are only mutated by methods that cannot panic half-way, so a
    /// poisoned lock still guards consistent state.
    fn lock(&self) -> MutexGuard<'_, Inner<S>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<S: PollRead + Write> Inner<S> {
    fn enable(&mut self, id: u8, initial_capacity: Option<usize>) -> Result<()> {
        let slot = &mut self.channels[id as usize];
        if slot.is_some() {
            return Ok(());
        }

        let capacity = match initial_capacity {
            Some(capacity) if capacity > 0 => capacity,
            _ => self.config.default_capacity,
        };
        let buf = ChannelBuffer::with_capacity(capacity).map_err(|err| exhausted(id, err))?;
        *slot = Some(buf);

        debug!(channel = id, capacity, "enabled channel");
        Ok(())
    }

    fn buffer_mut(&mut self, id: u8) -> Result<&mut ChannelBuffer> {
        self.channels[id as usize]
            .as_mut()
            .ok_or(MuxError::Disabled(id))
    }

    fn select(&mut self, timeout: Duration) -> Result<Selected> {
        if let Some((channel, fresh)) = self.take_fresh() {
            return Ok(Selected {
                channel,
                fresh,
                from_stream: false,
            });
        }

        if self.closed {
            return Err(MuxError::Closed);
        }

        let frame = match self.reader.read_frame(timeout) {
            Ok(frame) => frame,
            Err(FrameError::Timeout) => return Err(MuxError::Timeout),
            Err(err) => {
                self.closed = true;
                return Err(read_failure(err));
            }
        };

        let channel = frame.channel;
        let Some(buf) = self.channels[channel as usize].as_mut() else {
            debug!(
                channel,
                size = frame.payload.len(),
                "discarding frame for disabled channel"
            );
            return Err(MuxError::Ignored { channel });
        };

        if let Err(err) = buf.append(&frame.payload) {
            warn!(
                channel,
                size = frame.payload.len(),
                "dropping frame: channel buffer allocation failed"
            );
            return Err(exhausted(channel, err));
        }

        // This call reports the frame, so it is no longer fresh for the next selector.
        let fresh = buf.take_fresh();
        trace!(channel, size = fresh, "selected channel from stream");
        Ok(Selected {
            channel,
            fresh,
            from_stream: true,
        })
    }

    /// Lowest enabled channel holding data no `select` has reported yet.
    fn take_fresh(&mut self) -> Option<(u8, usize)> {
        self.channels
            .iter_mut()
            .enumerate()
            .find_map(|(id, slot)| {
                let buf = slot.as_mut()?;
                buf.has_fresh().then(|| (id as u8, buf.take_fresh()))
            })
    }
}

/// Outcome of one internal select.
struct Selected {
    channel: u8,
    /// Fresh bytes the selection cleared.
    fresh: usize,
    /// The data came from a frame read by this call, not from the buffers.
    from_stream: bool,
}

/// Read-only view of a channel's unread bytes; holds the instance lock.
pub struct ChannelView<'a, S> {
    guard: MutexGuard<'a, Inner<S>>,
    id: u8,
}

impl<S> ChannelView<'_, S> {
    /// Channel this view belongs to.
    pub fn channel(&self) -> u8 {
        self.id
    }
}

impl<S> Deref for ChannelView<'_, S> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.guard.channels[self.id as usize]
            .as_ref()
            .map_or(&[][..], ChannelBuffer::unread)
    }
}

fn exhausted(channel: u8, err: AllocError) -> MuxError {
    MuxError::ResourceExhausted {
        channel,
        requested: err.requested,
    }
}

fn read_failure(err: FrameError) -> MuxError {
    match err {
        FrameError::ConnectionClosed => {
            debug!("stream reached end of data");
            MuxError::Closed
        }
        FrameError::Io(err) => {
            debug!(error = %err, "stream read failed");
            MuxError::Closed
        }
        other => {
            warn!(error = %other, "malformed frame header; stream can no longer be read");
            MuxError::Frame(other)
        }
    }
}

fn write_failure(err: FrameError) -> MuxError {
    match err {
        FrameError::Io(io)
            if matches!(
                io.kind(),
                ErrorKind::BrokenPipe
                    | ErrorKind::ConnectionReset
                    | ErrorKind::ConnectionAborted
                    | ErrorKind::NotConnected
            ) =>
        {
            MuxError::Closed
        }
        other => MuxError::from(other),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::io::Write;
    use std::os::unix::net::UnixStream;
    use std::sync::{Arc, Barrier};
    use std::thread;

    use bytes::BufMut;
    use chanmux_frame::encode_frame;
    use proptest::prelude::*;

    use super::*;

    const WAIT: Duration = Duration::from_secs(2);
    const SHORT: Duration = Duration::from_millis(20);

    fn pair() -> (Multiplex<UnixStream>, Multiplex<UnixStream>) {
        let (left, right) = UnixStream::pair().unwrap();
        (Multiplex::new(left), Multiplex::new(right))
    }

    fn read_all(mux: &Multiplex<UnixStream>, id: u8) -> Vec<u8> {
        let mut out = vec![0u8; mux.length(id).unwrap()];
        let n = mux.read(id, &mut out).unwrap();
        out.truncate(n);
        out
    }

    #[test]
    fn send_select_read_roundtrip() {
        let (producer, consumer) = pair();
        consumer.enable(5, None).unwrap();

        let written = producer.send(5, b"hello").unwrap();
        assert_eq!(written, 5 + 5);

        assert_eq!(consumer.select(WAIT).unwrap(), 5);
        assert_eq!(consumer.length(5), Some(5));
        assert_eq!(read_all(&consumer, 5), b"hello");
        assert_eq!(consumer.length(5), Some(0));
    }

    #[test]
    fn wire_bytes_match_frame_layout() {
        let (left, mut right) = UnixStream::pair().unwrap();
        let mux = Multiplex::new(left);
        mux.send_str(200, "hi").unwrap();

        let mut wire = [0u8; 7];
        std::io::Read::read_exact(&mut right, &mut wire).unwrap();
        assert_eq!(wire, [0, 0, 0, 3, 200, b'h', b'i']);
    }

    #[test]
    fn disabled_channel_frames_are_discarded_without_desync() {
        let (producer, consumer) = pair();
        consumer.enable(2, None).unwrap();

        producer.send(9, b"nobody listens").unwrap();
        producer.send(2, b"for two").unwrap();

        assert!(matches!(
            consumer.select(WAIT),
            Err(MuxError::Ignored { channel: 9 })
        ));
        assert_eq!(consumer.select(WAIT).unwrap(), 2);
        assert_eq!(read_all(&consumer, 2), b"for two");
    }

    #[test]
    fn disable_releases_buffer_and_discards_later_frames() {
        let (producer, consumer) = pair();
        consumer.enable(1, None).unwrap();
        consumer.write(1, b"pending").unwrap();

        consumer.disable(1);
        assert!(!consumer.is_enabled(1));
        assert_eq!(consumer.length(1), None);
        assert_eq!(consumer.last_received(1), 0);

        producer.send(1, b"late").unwrap();
        assert!(matches!(
            consumer.select(WAIT),
            Err(MuxError::Ignored { channel: 1 })
        ));

        consumer.disable(1);
    }

    #[test]
    fn enable_is_idempotent_and_keeps_data() {
        let (_producer, consumer) = pair();
        consumer.enable(4, Some(8)).unwrap();
        consumer.write(4, b"abc").unwrap();

        consumer.enable(4, Some(1024)).unwrap();
        assert_eq!(consumer.capacity(4), Some(8));
        assert_eq!(consumer.length(4), Some(3));
    }

    #[test]
    fn enable_uses_configured_default_capacity() {
        let (left, _right) = UnixStream::pair().unwrap();
        let mux = Multiplex::with_config(left, MuxConfig::default().with_default_capacity(32));

        mux.enable(0, None).unwrap();
        mux.enable(1, Some(0)).unwrap();
        mux.enable(2, Some(64)).unwrap();

        assert_eq!(mux.capacity(0), Some(32));
        assert_eq!(mux.capacity(1), Some(32));
        assert_eq!(mux.capacity(2), Some(64));
        assert_eq!(mux.capacity(3), None);
    }

    #[test]
    fn enable_range_is_inclusive_and_empty_when_reversed() {
        let (_producer, consumer) = pair();

        consumer.enable_range(10, 12, None).unwrap();
        assert!(!consumer.is_enabled(9));
        assert!((10..=12).all(|id| consumer.is_enabled(id)));
        assert!(!consumer.is_enabled(13));

        consumer.enable_range(50, 40, None).unwrap();
        assert!(!consumer.is_enabled(45));

        consumer.enable_range(0, 255, Some(1)).unwrap();
        assert!(consumer.is_enabled(255));
    }

    #[test]
    fn enable_reports_allocation_failure() {
        let (_producer, consumer) = pair();
        let err = consumer.enable(3, Some(usize::MAX)).unwrap_err();
        assert!(matches!(
            err,
            MuxError::ResourceExhausted { channel: 3, requested } if requested == usize::MAX
        ));
        assert!(!consumer.is_enabled(3));
    }

    #[test]
    fn growth_keeps_unread_bytes() {
        let (producer, consumer) = pair();
        consumer.enable(1, Some(4)).unwrap();

        producer.send(1, b"abc").unwrap();
        assert_eq!(consumer.select(WAIT).unwrap(), 1);

        let big = vec![b'z'; 100];
        producer.send(1, &big).unwrap();
        assert_eq!(consumer.select(WAIT).unwrap(), 1);

        assert_eq!(consumer.length(1), Some(103));
        assert!(consumer.capacity(1).unwrap() >= 103);

        let mut expected = b"abc".to_vec();
        expected.extend_from_slice(&big);
        assert_eq!(read_all(&consumer, 1), expected);
    }

    #[test]
    fn drained_channel_shrinks_to_initial_capacity() {
        let (_producer, consumer) = pair();
        consumer.enable(7, Some(16)).unwrap();

        consumer.write(7, &[1u8; 100]).unwrap();
        assert_eq!(consumer.capacity(7), Some(128));

        let mut sink = [0u8; 100];
        assert_eq!(consumer.read(7, &mut sink).unwrap(), 100);

        consumer.write(7, b"tiny").unwrap();
        assert_eq!(consumer.capacity(7), Some(16));
        assert_eq!(consumer.snapshot(7).unwrap().as_ref(), b"tiny");
    }

    #[test]
    fn buffered_fresh_channels_reported_lowest_id_first_once_each() {
        let (_producer, consumer) = pair();
        consumer.enable(0, None).unwrap();
        consumer.enable(1, None).unwrap();

        consumer.write(1, b"b").unwrap();
        consumer.write(0, b"a").unwrap();

        assert_eq!(consumer.select(SHORT).unwrap(), 0);
        assert_eq!(consumer.select(SHORT).unwrap(), 1);
        assert!(matches!(consumer.select(SHORT), Err(MuxError::Timeout)));

        assert_eq!(consumer.length(0), Some(1));
        assert_eq!(consumer.length(1), Some(1));
    }

    #[test]
    fn ignore_hides_data_from_select_but_keeps_it() {
        let (_producer, consumer) = pair();
        consumer.enable(3, None).unwrap();
        consumer.write(3, b"seen").unwrap();
        assert_eq!(consumer.last_received(3), 4);

        consumer.ignore(3);
        assert_eq!(consumer.last_received(3), 0);
        assert!(matches!(consumer.select(SHORT), Err(MuxError::Timeout)));
        assert_eq!(consumer.length(3), Some(4));
    }

    #[test]
    fn receive_for_other_channel_returns_ignored_then_buffered_data() {
        let (producer, consumer) = pair();
        consumer.enable(3, None).unwrap();
        consumer.enable(4, None).unwrap();

        producer.send(4, b"four").unwrap();

        let mut dst = [0u8; 16];
        assert!(matches!(
            consumer.receive(WAIT, 3, &mut dst),
            Err(MuxError::Ignored { channel: 4 })
        ));

        // Served from the buffer: the producer sends nothing more.
        let n = consumer.receive(SHORT, 4, &mut dst).unwrap();
        assert_eq!(&dst[..n], b"four");
    }

    #[test]
    fn mismatched_receive_leaves_data_fresh_for_select() {
        let (producer, consumer) = pair();
        consumer.enable(3, None).unwrap();
        consumer.enable(4, None).unwrap();

        producer.send(4, b"four").unwrap();

        let mut dst = [0u8; 16];
        assert!(consumer.receive(WAIT, 3, &mut dst).is_err());
        assert_eq!(consumer.last_received(4), 4);
        assert_eq!(consumer.select(SHORT).unwrap(), 4);
        assert_eq!(consumer.last_received(4), 0);
    }

    #[test]
    fn retried_receive_reaches_frame_queued_behind_other_channel() {
        let (producer, consumer) = pair();
        consumer.enable(3, None).unwrap();
        consumer.enable(4, None).unwrap();

        producer.send(4, b"four").unwrap();
        producer.send(3, b"three").unwrap();

        let mut dst = [0u8; 16];
        let mut ignored = Vec::new();
        let n = loop {
            match consumer.receive(WAIT, 3, &mut dst) {
                Ok(n) => break n,
                Err(MuxError::Ignored { channel }) if ignored.len() < 4 => ignored.push(channel),
                Err(err) => panic!("receive on 3 never succeeded: {err} after {ignored:?}"),
            }
        };

        assert_eq!(&dst[..n], b"three");
        assert_eq!(ignored, vec![4, 4]);
        assert_eq!(consumer.length(4), Some(4));
        assert!(matches!(consumer.select(SHORT), Err(MuxError::Timeout)));
    }

    #[test]
    fn last_received_is_zero_after_select_from_stream() {
        let (producer, consumer) = pair();
        consumer.enable(2, None).unwrap();

        producer.send(2, b"abc").unwrap();
        assert_eq!(consumer.select(WAIT).unwrap(), 2);
        assert_eq!(consumer.last_received(2), 0);
        assert_eq!(consumer.length(2), Some(3));
    }

    #[test]
    fn receive_matching_frame_and_partial_reads() {
        let (producer, consumer) = pair();
        consumer.enable(8, None).unwrap();
        producer.send(8, b"0123456789").unwrap();

        let mut dst = [0u8; 4];
        assert_eq!(consumer.receive(WAIT, 8, &mut dst).unwrap(), 4);
        assert_eq!(&dst, b"0123");
        assert_eq!(consumer.receive(SHORT, 8, &mut dst).unwrap(), 4);
        assert_eq!(&dst, b"4567");
        assert_eq!(consumer.receive(SHORT, 8, &mut dst).unwrap(), 2);
        assert_eq!(&dst[..2], b"89");

        assert!(matches!(
            consumer.receive(SHORT, 8, &mut dst),
            Err(MuxError::Timeout)
        ));
    }

    #[test]
    fn receive_on_disabled_channel_reports_ignored() {
        let (producer, consumer) = pair();
        producer.send(6, b"x").unwrap();

        let mut dst = [0u8; 1];
        assert!(matches!(
            consumer.receive(WAIT, 6, &mut dst),
            Err(MuxError::Ignored { channel: 6 })
        ));
    }

    #[test]
    fn copy_peek_snapshot_are_non_destructive() {
        let (_producer, consumer) = pair();
        consumer.enable(2, None).unwrap();
        consumer.write(2, b"abcdef").unwrap();

        let mut dst = [0u8; 3];
        assert_eq!(consumer.copy(2, &mut dst).unwrap(), 3);
        assert_eq!(&dst, b"abc");
        assert_eq!(consumer.copy_at(2, 4, &mut dst).unwrap(), 2);
        assert_eq!(&dst[..2], b"ef");

        {
            let view = consumer.peek(2).unwrap();
            assert_eq!(view.channel(), 2);
            assert_eq!(&*view, b"abcdef");
        }

        let snapshot = consumer.snapshot(2).unwrap();
        assert_eq!(snapshot.as_ref(), b"abcdef");
        assert_eq!(consumer.length(2), Some(6));
        assert_eq!(consumer.last_received(2), 6);
    }

    #[test]
    fn clear_discards_data_and_freshness() {
        let (_producer, consumer) = pair();
        consumer.enable(2, Some(8)).unwrap();
        consumer.write(2, b"abcdef").unwrap();

        consumer.clear(2);
        assert_eq!(consumer.length(2), Some(0));
        assert_eq!(consumer.last_received(2), 0);
        assert_eq!(consumer.capacity(2), Some(8));
        assert!(matches!(consumer.select(SHORT), Err(MuxError::Timeout)));
    }

    #[test]
    fn operations_on_disabled_channel() {
        let (_producer, consumer) = pair();
        let mut dst = [0u8; 4];

        assert!(matches!(consumer.read(9, &mut dst), Err(MuxError::Disabled(9))));
        assert!(matches!(consumer.copy(9, &mut dst), Err(MuxError::Disabled(9))));
        assert!(matches!(consumer.write(9, b"x"), Err(MuxError::Disabled(9))));
        assert!(consumer.peek(9).is_none());
        assert!(consumer.snapshot(9).is_none());
        assert_eq!(consumer.length(9), None);
        assert_eq!(consumer.capacity(9), None);

        consumer.clear(9);
        consumer.ignore(9);
    }

    #[test]
    fn read_decrements_last_received() {
        let (_producer, consumer) = pair();
        consumer.enable(1, None).unwrap();
        consumer.write(1, b"123456").unwrap();

        let mut dst = [0u8; 4];
        consumer.read(1, &mut dst).unwrap();
        assert_eq!(consumer.last_received(1), 2);
        consumer.read(1, &mut dst).unwrap();
        assert_eq!(consumer.last_received(1), 0);
    }

    #[test]
    fn timeout_then_frame_arrives() {
        let (left, right) = UnixStream::pair().unwrap();
        let consumer = Multiplex::new(right);
        consumer.enable(1, None).unwrap();

        assert!(matches!(consumer.select(SHORT), Err(MuxError::Timeout)));

        let mut frame = BytesMut::new();
        encode_frame(1, b"late", &mut frame).unwrap();
        let mut left = left;
        left.write_all(&frame[..3]).unwrap();
        assert!(matches!(consumer.select(SHORT), Err(MuxError::Timeout)));

        left.write_all(&frame[3..]).unwrap();
        assert_eq!(consumer.select(WAIT).unwrap(), 1);
        assert_eq!(read_all(&consumer, 1), b"late");
    }

    #[test]
    fn closed_is_terminal_but_buffered_data_still_served() {
        let (producer, consumer) = pair();
        consumer.enable(1, None).unwrap();
        consumer.enable(2, None).unwrap();

        producer.send(1, b"last words").unwrap();
        drop(producer);

        assert_eq!(consumer.select(WAIT).unwrap(), 1);
        let err = consumer.select(WAIT).unwrap_err();
        assert!(err.is_closed());
        assert_eq!(err.status_code(), -1);

        consumer.write(2, b"local").unwrap();
        assert_eq!(consumer.select(WAIT).unwrap(), 2);
        assert!(matches!(consumer.select(WAIT), Err(MuxError::Closed)));

        assert_eq!(read_all(&consumer, 1), b"last words");
    }

    #[test]
    fn malformed_length_field_is_rejected_and_terminal() {
        let (mut left, right) = UnixStream::pair().unwrap();
        let consumer = Multiplex::new(right);
        consumer.enable(1, None).unwrap();

        left.write_all(&[0, 0, 0, 0, 1]).unwrap();
        assert!(matches!(
            consumer.select(WAIT),
            Err(MuxError::Frame(FrameError::InvalidLength(0)))
        ));
        assert!(matches!(consumer.select(SHORT), Err(MuxError::Closed)));
    }

    #[test]
    fn oversized_frame_rejected_before_buffering() {
        let (mut left, right) = UnixStream::pair().unwrap();
        let consumer =
            Multiplex::with_config(right, MuxConfig::default().with_max_payload_size(8));
        consumer.enable(1, None).unwrap();

        let mut header = BytesMut::new();
        header.put_u32(1_000_001);
        header.put_u8(1);
        left.write_all(&header).unwrap();

        assert!(matches!(
            consumer.select(WAIT),
            Err(MuxError::Frame(FrameError::PayloadTooLarge { size: 1_000_000, max: 8 }))
        ));
    }

    #[test]
    fn send_rejects_payload_over_limit() {
        let (left, mut right) = UnixStream::pair().unwrap();
        let producer = Multiplex::with_config(left, MuxConfig::default().with_max_payload_size(2));

        assert!(matches!(
            producer.send(1, b"too long"),
            Err(MuxError::Frame(FrameError::PayloadTooLarge { .. }))
        ));

        right.set_nonblocking(true).unwrap();
        let mut probe = [0u8; 1];
        let err = std::io::Read::read(&mut right, &mut probe).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::WouldBlock);
    }

    #[test]
    fn send_to_hung_up_peer_reports_closed() {
        let (producer, consumer) = pair();
        drop(consumer);

        assert!(matches!(producer.send(1, b"anyone?"), Err(MuxError::Closed)));
    }

    #[test]
    fn concurrent_selectors_each_get_a_distinct_frame() {
        const N: usize = 16;

        let (producer, consumer) = pair();
        let consumer = Arc::new(consumer);
        consumer.enable_range(0, 255, None).unwrap();

        let start = Arc::new(Barrier::new(N + 1));
        let selectors: Vec<_> = (0..N)
            .map(|_| {
                let consumer = Arc::clone(&consumer);
                let start = Arc::clone(&start);
                thread::spawn(move || {
                    start.wait();
                    consumer.select(Duration::from_secs(10)).unwrap()
                })
            })
            .collect();

        start.wait();
        for id in 0..N as u8 {
            producer.send(id, format!("frame-{id}").as_bytes()).unwrap();
        }

        let delivered: Vec<u8> = selectors
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .collect();
        let unique: BTreeSet<u8> = delivered.iter().copied().collect();

        assert_eq!(delivered.len(), N);
        assert_eq!(unique, (0..N as u8).collect::<BTreeSet<_>>());

        for id in 0..N as u8 {
            assert_eq!(read_all(&consumer, id), format!("frame-{id}").as_bytes());
        }
    }

    #[test]
    fn shared_instance_sends_and_receives_from_threads() {
        let (left, right) = UnixStream::pair().unwrap();
        let a = Arc::new(Multiplex::new(left));
        let b = Multiplex::new(right);
        a.enable(1, None).unwrap();
        b.enable(0, None).unwrap();

        let echo = {
            let a = Arc::clone(&a);
            thread::spawn(move || {
                for _ in 0..8 {
                    assert_eq!(a.select(WAIT).unwrap(), 1);
                    let data = a.snapshot(1).unwrap();
                    a.clear(1);
                    a.send(0, &data).unwrap();
                }
            })
        };

        for i in 0..8u8 {
            b.send(1, &[i; 3]).unwrap();
            let mut dst = [0u8; 3];
            let n = loop {
                match b.receive(WAIT, 0, &mut dst) {
                    Ok(n) => break n,
                    Err(err) if err.is_retryable() => continue,
                    Err(err) => panic!("receive failed: {err}"),
                }
            };
            assert_eq!(&dst[..n], &[i; 3]);
        }

        echo.join().unwrap();
    }

    #[test]
    fn into_inner_returns_stream() {
        let (left, mut right) = UnixStream::pair().unwrap();
        let mux = Multiplex::new(left);
        let mut stream = mux.into_inner();

        stream.write_all(b"raw").unwrap();
        let mut buf = [0u8; 3];
        std::io::Read::read_exact(&mut right, &mut buf).unwrap();
        assert_eq!(&buf, b"raw");
    }

    #[test]
    fn multiplex_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Multiplex<UnixStream>>();
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn roundtrip_any_channel_and_payload(
            channel in any::<u8>(),
            payload in prop::collection::vec(any::<u8>(), 0..4096)
        ) {
            let (producer, consumer) = pair();
            consumer.enable(channel, Some(16)).unwrap();

            producer.send(channel, &payload).unwrap();
            prop_assert_eq!(consumer.select(WAIT).unwrap(), channel);
            prop_assert_eq!(read_all(&consumer, channel), payload);
        }
    }
}
