// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A plain power-of-two byte ring used for low-rate continuous streaming.
//!
//! Unlike [`super::ChunkedRing`], a full [`SimpleRing`] simply drops the
//! oldest byte and records that it did so; there is no reservation
//! protocol because the producer here is a timer interrupt writing one
//! byte at a time, not a DMA engine.

use core::cell::Cell;

/// Single-producer/single-consumer byte ring with power-of-two capacity.
pub struct SimpleRing<'a> {
    arr: &'a mut [u8],
    mask: u32,
    read_idx: Cell<u32>,
    write_idx: Cell<u32>,
    discarded: Cell<bool>,
}

impl<'a> SimpleRing<'a> {
    /// Builds a ring over `arr`. `arr.len()` must be a power of two no
    /// greater than 2^28, so 32-bit indices can wrap indefinitely without
    /// ever losing the invariant `size() == write_idx - read_idx`.
    pub fn new(arr: &'a mut [u8]) -> Self {
        let cap = arr.len() as u32;
        assert!(cap.is_power_of_two(), "capacity must be a power of two");
        assert!(cap <= 1 << 28, "capacity too large for 32-bit wraparound");
        SimpleRing {
            arr,
            mask: cap - 1,
            read_idx: Cell::new(0),
            write_idx: Cell::new(0),
            discarded: Cell::new(false),
        }
    }

    /// Total capacity in bytes.
    pub fn capacity(&self) -> u32 {
        self.mask + 1
    }

    /// Bytes currently buffered.
    pub fn size(&self) -> u32 {
        self.write_idx.get().wrapping_sub(self.read_idx.get())
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub fn is_full(&self) -> bool {
        self.size() == self.capacity()
    }

    /// Whether a byte has been dropped since the last [`clear`](Self::clear)
    /// or explicit [`clear_discarded`](Self::clear_discarded).
    pub fn discarded(&self) -> bool {
        self.discarded.get()
    }

    pub fn clear_discarded(&self) {
        self.discarded.set(false);
    }

    /// Pushes one byte. If the ring is full, the oldest byte is dropped and
    /// [`discarded`](Self::discarded) becomes true.
    pub fn put(&self, byte: u8) {
        if self.is_full() {
            self.read_idx.set(self.read_idx.get().wrapping_add(1));
            self.discarded.set(true);
        }
        let w = self.write_idx.get();
        self.arr[(w & self.mask) as usize] = byte;
        self.write_idx.set(w.wrapping_add(1));
    }

    /// Drains up to `dst.len()` bytes into `dst`, oldest first. Returns the
    /// number of bytes copied, which is `min(size(), dst.len())`.
    pub fn read_all(&self, dst: &mut [u8]) -> usize {
        let n = (self.size() as usize).min(dst.len());
        let r = self.read_idx.get();

        let first = ((self.capacity() - (r & self.mask)) as usize).min(n);
        let base = (r & self.mask) as usize;
        dst[..first].copy_from_slice(&self.arr[base..base + first]);
        if first < n {
            dst[first..n].copy_from_slice(&self.arr[..n - first]);
        }

        self.read_idx.set(r.wrapping_add(n as u32));
        n
    }

    /// Resets the ring to empty and clears the discarded flag.
    pub fn clear(&self) {
        self.read_idx.set(0);
        self.write_idx.set(0);
        self.discarded.set(false);
    }
}
