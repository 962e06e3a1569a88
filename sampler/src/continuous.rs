// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Low-rate timer-driven sampling with double-buffered streaming (§4.5).
//!
//! There is no DMA here: a repeating timer fires roughly once per sample
//! period and reads one ADC conversion per enabled channel directly. The
//! two [`SimpleRing`]s swap which one is "active" under a request/ack flag
//! rather than a lock, since the timer handler that writes to the active
//! ring must never block.

use core::sync::atomic::{AtomicBool, Ordering};

use scope_hal::Adc;
use scope_planner::SamplingParams;
use scope_ring::SimpleRing;

/// Timer-driven continuous sampler. Borrows its two backing arrays from the
/// caller (board bring-up), the same ownership split `ChunkedRing` uses.
pub struct ContinuousSampler<'a> {
    ring_a: SimpleRing<'a>,
    ring_b: SimpleRing<'a>,
    active_is_a: AtomicBool,
    swap_requested: AtomicBool,
    enabled_channels: u8,
    started: AtomicBool,
}

impl<'a> ContinuousSampler<'a> {
    pub fn new(buf_a: &'a mut [u8], buf_b: &'a mut [u8], params: &SamplingParams) -> Self {
        ContinuousSampler {
            ring_a: SimpleRing::new(buf_a),
            ring_b: SimpleRing::new(buf_b),
            active_is_a: AtomicBool::new(true),
            swap_requested: AtomicBool::new(false),
            enabled_channels: params.enabled_channels,
            started: AtomicBool::new(false),
        }
    }

    fn active(&self) -> &SimpleRing<'a> {
        if self.active_is_a.load(Ordering::Acquire) {
            &self.ring_a
        } else {
            &self.ring_b
        }
    }

    fn dormant(&self) -> &SimpleRing<'a> {
        if self.active_is_a.load(Ordering::Acquire) {
            &self.ring_b
        } else {
            &self.ring_a
        }
    }

    /// Timer-tick handler: reads one conversion per enabled channel and
    /// pushes it into the active ring. Called from IRQ context. Every
    /// enabled bit is checked on every tick (no cross-tick cursor), so a
    /// single enabled channel at a non-zero bit position still samples
    /// every tick rather than once every few ticks.
    pub fn on_timer_tick(&self, adc: &mut dyn Adc) {
        for ch in 0..8u8 {
            if self.enabled_channels & (1 << ch) != 0 {
                adc.select_channel(ch);
                let raw = adc.read_sample();
                let byte = (raw >> 4) as u8; // 12-bit conversion shifted to 8 bits
                self.active().put(byte);
            }
        }

        if self.swap_requested.load(Ordering::Acquire) {
            self.active_is_a.fetch_xor(true, Ordering::AcqRel);
            self.swap_requested.store(false, Ordering::Release);
        }
        self.started.store(true, Ordering::Release);
    }

    /// Consumer side: requests a swap. The caller busy-waits on
    /// [`swap_pending`](Self::swap_pending) to know the handler has
    /// observed it before draining the (now) dormant ring.
    pub fn request_swap(&self) {
        self.swap_requested.store(true, Ordering::Release);
    }

    pub fn swap_pending(&self) -> bool {
        self.swap_requested.load(Ordering::Acquire)
    }

    pub fn has_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Drains the dormant ring into `dst`, returning the byte count and
    /// whether it had discarded a sample (either of which marks the next
    /// outgoing frame `new_wavepoint`).
    pub fn drain_dormant(&self, dst: &mut [u8]) -> (usize, bool) {
        let dormant = self.dormant();
        let n = dormant.read_all(dst);
        let discarded = dormant.discarded();
        dormant.clear_discarded();
        (n, discarded)
    }
}
