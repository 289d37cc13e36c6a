//! Per-channel receive buffer with a grow/compact/shrink policy.

use tracing::trace;

/// A channel buffer could not be (re)allocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("cannot allocate channel buffer of {requested} bytes")]
pub struct AllocError {
    pub requested: usize,
}

/// Growable byte buffer holding a channel's unread payload.
///
/// The unread region is `data[offset..offset + length]`. `freshness` is the
/// size of the most recent append that no `select` has observed yet; it is
/// a "has new data" flag rather than an exact counter.
///
/// Invariants: `offset + length <= capacity` and `freshness <= length`.
#[derive(Debug)]
pub struct ChannelBuffer {
    /// Always fully initialized: `data.len()` is the capacity.
    data: Vec<u8>,
    initial: usize,
    offset: usize,
    length: usize,
    freshness: usize,
}

impl ChannelBuffer {
    /// Allocate an empty buffer. A zero capacity is bumped to one byte so the
    /// doubling step always makes progress.
    pub fn with_capacity(initial: usize) -> Result<Self, AllocError> {
        let initial = initial.max(1);
        Ok(Self {
            data: allocate(initial)?,
            initial,
            offset: 0,
            length: 0,
            freshness: 0,
        })
    }

    /// Current allocated size.
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Capacity the buffer was created with; the shrink floor.
    pub fn initial_capacity(&self) -> usize {
        self.initial
    }

    /// Index of the first unread byte.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Number of unread bytes.
    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    pub fn freshness(&self) -> usize {
        self.freshness
    }

    /// True if there is unread data no `select` has reported yet.
    pub fn has_fresh(&self) -> bool {
        self.length > 0 && self.freshness != 0
    }

    /// The unread region.
    pub fn unread(&self) -> &[u8] {
        &self.data[self.offset..self.offset + self.length]
    }

    /// Append `bytes` after the unread region and mark them fresh.
    ///
    /// Freshness is overwritten with `bytes.len()`, not accumulated. On
    /// allocation failure the buffer is left untouched.
    pub fn append(&mut self, bytes: &[u8]) -> Result<(), AllocError> {
        self.make_room(bytes.len())?;

        let start = self.offset + self.length;
        self.data[start..start + bytes.len()].copy_from_slice(bytes);
        self.length += bytes.len();
        self.freshness = bytes.len();
        Ok(())
    }

    /// Move up to `dst.len()` unread bytes into `dst`.
    pub fn read(&mut self, dst: &mut [u8]) -> usize {
        let n = dst.len().min(self.length);
        dst[..n].copy_from_slice(&self.data[self.offset..self.offset + n]);
        self.consume(n);
        n
    }

    /// Copy up to `dst.len()` unread bytes, starting `skip` bytes into the
    /// unread region, without consuming them.
    pub fn copy_to(&self, skip: usize, dst: &mut [u8]) -> usize {
        if skip >= self.length {
            return 0;
        }
        let start = self.offset + skip;
        let n = dst.len().min(self.length - skip);
        dst[..n].copy_from_slice(&self.data[start..start + n]);
        n
    }

    /// Drop all unread bytes and freshness, keeping the allocation.
    pub fn clear(&mut self) {
        self.offset = 0;
        self.length = 0;
        self.freshness = 0;
    }

    /// Return the freshness count and reset it; the data stays unread.
    pub fn take_fresh(&mut self) -> usize {
        std::mem::take(&mut self.freshness)
    }

    /// Re-mark up to `count` bytes as fresh.
    pub fn mark_fresh(&mut self, count: usize) {
        self.freshness = count.min(self.length);
    }

    fn consume(&mut self, n: usize) {
        self.offset += n;
        self.length -= n;
        self.freshness = self.freshness.saturating_sub(n);
        if self.length == 0 {
            self.offset = 0;
        }
    }

    /// Ensure `n` more bytes fit after the unread region.
    ///
    /// 1. Under 25% utilization for the prospective need: fall back to the
    ///    initial capacity.
    /// 2. Fits as is: nothing to do.
    /// 3. Fits once unread bytes move to the front: compact in place.
    /// 4. Otherwise double until it fits and move to a new allocation.
    fn make_room(&mut self, n: usize) -> Result<(), AllocError> {
        let overflow = AllocError {
            requested: usize::MAX,
        };
        let unread_after = self.length.checked_add(n).ok_or(overflow)?;
        let need = self.offset.checked_add(unread_after).ok_or(overflow)?;
        let capacity = self.capacity();

        let mut target = capacity;
        if need.checked_mul(4).is_some_and(|quarter| capacity > quarter) {
            target = self.initial;
        }

        if target >= need {
            if target != capacity {
                self.relocate(target)?;
            }
            return Ok(());
        }

        if target >= unread_after {
            if target == capacity {
                self.compact();
            } else {
                self.relocate(target)?;
            }
            return Ok(());
        }

        while target < need {
            target = target
                .checked_mul(2)
                .ok_or(AllocError { requested: need })?;
        }
        self.relocate(target)
    }

    fn compact(&mut self) {
        if self.offset > 0 {
            self.data
                .copy_within(self.offset..self.offset + self.length, 0);
            self.offset = 0;
        }
    }

    fn relocate(&mut self, capacity: usize) -> Result<(), AllocError> {
        let mut data = allocate(capacity)?;
        data[..self.length].copy_from_slice(self.unread());
        trace!(
            from = self.data.len(),
            to = capacity,
            unread = self.length,
            "resized channel buffer"
        );
        self.data = data;
        self.offset = 0;
        Ok(())
    }
}

fn allocate(size: usize) -> Result<Vec<u8>, AllocError> {
    let mut data = Vec::new();
    data.try_reserve_exact(size)
        .map_err(|_| AllocError { requested: size })?;
    data.resize(size, 0);
    Ok(data)
}
