// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A single-writer/single-reader byte ring partitioned into fixed-size chunks.
//!
//! Addresses are `u32` byte offsets into a backing array rather than raw
//! pointers -- the reserve/unreserve/index/read_from API below is an
//! offset-and-modulo rewrite of the original pointer-arithmetic ring, so
//! every boundary check is algebraic instead of an address comparison.
//!
//! Exactly one producer calls [`ChunkedRing::reserve`] /
//! [`ChunkedRing::unreserve`] (typically from a DMA-completion interrupt
//! handler); exactly one consumer calls [`ChunkedRing::size`],
//! [`ChunkedRing::index`], [`ChunkedRing::read_from`] and
//! [`ChunkedRing::clear`]. The two roles may run concurrently as long as
//! that split holds; this type provides no synchronization of its own.

use core::cell::Cell;

/// A chunked ring buffer over a caller-supplied backing array.
pub struct ChunkedRing<'a> {
    arr: &'a mut [u8],
    chunk_size: u32,
    start_addr: Cell<Option<u32>>,
    end_addr: Cell<Option<u32>>,
    next_reserve_addr: Cell<u32>,
}

impl<'a> ChunkedRing<'a> {
    /// Builds a ring over `arr`, partitioned into chunks of `chunk_size` bytes.
    ///
    /// `arr.len()` need not be a multiple of `chunk_size`; any remainder past
    /// the last whole chunk is simply never reserved.
    pub fn new(arr: &'a mut [u8], chunk_size: u32) -> Self {
        assert!(chunk_size > 0, "chunk_size must be non-zero");
        assert!(
            (arr.len() as u32) >= chunk_size,
            "backing array smaller than one chunk"
        );
        ChunkedRing {
            arr,
            chunk_size,
            start_addr: Cell::new(None),
            end_addr: Cell::new(None),
            next_reserve_addr: Cell::new(0),
        }
    }

    fn whole_chunks_len(&self) -> u32 {
        self.num_chunks() * self.chunk_size
    }

    /// Number of whole chunks the backing array holds.
    pub fn num_chunks(&self) -> u32 {
        (self.arr.len() as u32) / self.chunk_size
    }

    /// Size, in bytes, of one chunk.
    pub fn chunk_size(&self) -> u32 {
        self.chunk_size
    }

    /// Bytes of valid (unreserved) data currently in the ring.
    pub fn size(&self) -> u32 {
        match (self.start_addr.get(), self.end_addr.get()) {
            (Some(start), Some(end)) if end >= start => end - start + 1,
            (Some(start), Some(end)) => (self.whole_chunks_len() - start) + (end + 1),
            _ => 0,
        }
    }

    /// True when there is no valid data (possibly because it was all just
    /// invalidated by a [`reserve`](Self::reserve) call).
    pub fn is_empty(&self) -> bool {
        self.end_addr.get().is_none()
    }

    /// The address of the newest valid byte, or `None` if empty. Used as the
    /// trigger-address fallback when a hardware trigger fires with both DMA
    /// channels reporting zero pending transfer count.
    pub fn end_addr(&self) -> Option<u32> {
        self.end_addr.get()
    }

    /// Reserves the next chunk for writing and returns its start offset.
    ///
    /// If this chunk currently holds the oldest valid data (i.e. contains
    /// `start_addr`), `start_addr` is advanced past it -- or the ring is
    /// emptied outright if doing so would also invalidate `end_addr`. Up to
    /// two chunks may be outstanding (reserved but not yet unreserved) at
    /// once; callers must unreserve in the same order they reserved.
    pub fn reserve(&self) -> u32 {
        let this_chunk = self.next_reserve_addr.get();

        let mut next = this_chunk + self.chunk_size;
        if next >= self.whole_chunks_len() {
            next = 0;
        }
        self.next_reserve_addr.set(next);

        if Some(this_chunk) == self.start_addr.get() {
            let end = self
                .end_addr
                .get()
                .expect("start_addr set implies end_addr set");
            if end > this_chunk && end < this_chunk + self.chunk_size {
                // The chunk being overwritten also holds end_addr: emptying.
                self.start_addr.set(None);
                self.end_addr.set(None);
            } else {
                self.start_addr.set(Some(next));
            }
        }

        this_chunk
    }

    /// Marks the chunk starting at `addr` (a value previously returned by
    /// [`reserve`](Self::reserve)) as readable.
    pub fn unreserve(&self, addr: u32) {
        if self.end_addr.get().is_none() {
            self.start_addr.set(Some(addr));
        }
        self.end_addr.set(Some(addr + self.chunk_size - 1));
    }

    /// Distance of `addr` from `start_addr` following the wrap, or `None` if
    /// `addr` is outside the valid span (including inside a chunk that is
    /// currently reserved but not yet unreserved).
    pub fn index(&self, addr: u32) -> Option<u32> {
        let start = self.start_addr.get()?;
        let end = self.end_addr.get()?;
        if end >= start {
            if addr < start || addr > end {
                None
            } else {
                Some(addr - start)
            }
        } else if addr >= start {
            Some(addr - start)
        } else if addr > end {
            None
        } else {
            Some((self.whole_chunks_len() - start) + addr)
        }
    }

    /// Copies up to `max` bytes starting at `src + offset` (wrapping through
    /// the ring) into `dst`. `src + offset` must land inside the current
    /// valid span; returns the number of bytes actually copied, which is at
    /// most the number of valid bytes from that point to the end of data.
    pub fn read_from(&self, src: u32, offset: i32, dst: &mut [u8], max: usize) -> usize {
        let Some(src_idx) = self.index(src) else {
            return 0;
        };
        let total = self.size() as i64;
        let idx = src_idx as i64 + offset as i64;
        if idx < 0 || idx >= total {
            return 0;
        }
        let idx = idx as u32;
        let start = self.start_addr.get().expect("size()>0 implies start set");
        let len = self.whole_chunks_len();
        let from = (start + idx) % len;
        let remaining = (total as u32) - idx;

        let want = max.min(dst.len());
        let n = (remaining as usize).min(want);
        if n == 0 {
            return 0;
        }

        let first = ((len - from) as usize).min(n);
        dst[..first].copy_from_slice(&self.arr[from as usize..from as usize + first]);
        if first < n {
            dst[first..n].copy_from_slice(&self.arr[..n - first]);
        }
        n
    }

    /// Discards all valid data and rewinds reservation to the start of the
    /// backing array.
    pub fn clear(&self) {
        self.start_addr.set(None);
        self.end_addr.set(None);
        self.next_reserve_addr.set(0);
    }
}
