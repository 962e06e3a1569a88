// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! DMA+IRQ triggered acquisition: pre-fill, trigger search, post-fill, lock,
//! emit (§4.6). This is the hardest subsystem in the firmware -- two
//! chained DMA channels keep a [`ChunkedRing`] full at the sampling rate
//! while a software or hardware trigger search runs concongruently, and a
//! final lock+copy phase hands a stable window to the host protocol.

use heapless::Deque;
use scope_hal::TriggerSnapshot;
use scope_planner::{SamplingParams, TriggerMode, TriggerType};
use scope_ring::ChunkedRing;

/// Maximum chunk size this sampler will ever scan in one pass (Glossary:
/// chunk size is clamped to 2048 bytes).
const MAX_CHUNK_SCAN_BYTES: usize = 2048;

/// Outstanding-chunk queue depth for the software trigger search. If the
/// hardware outruns the search, the oldest queued chunk is dropped and
/// scanning continues (§7 degraded operation) rather than blocking DMA.
const TRIGGER_QUEUE_DEPTH: usize = 8;

/// "Looked but didn't find" sentinel reported to the host for an AUTO
/// timeout, per §4.6/§8 invariant 11.
pub const TRIGGER_NOT_FOUND: i32 = -2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcqState {
    Prefill,
    TrigSearch,
    Postfill,
    Lock,
    Emit,
}

/// What the orchestrator must do in response to a DMA completion, decided
/// purely from ring/trigger state -- applying it to the real `Dma` handle
/// is the caller's job, which is what keeps this logic host-testable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DmaAction {
    /// `buffer_locked` is set: park this channel's writes in a scratch sink
    /// instead of the ring.
    RedirectToSink { len: u32 },
    /// Point the channel's next transfer at the freshly reserved chunk.
    ReserveNext { addr: u32, len: u32 },
}

/// The DMA+IRQ triggered sampler. Owns the ring and all trigger-search /
/// lock-phase bookkeeping; the two DMA channels and the PIO trigger block
/// remain owned by the board and are driven by the actions this type
/// returns.
pub struct NonContinuousSampler<'a> {
    ring: ChunkedRing<'a>,
    params: SamplingParams,
    state: AcqState,
    reserved_slots: [Option<u32>; 2],
    channel_stopped: [bool; 2],
    buffer_locked: bool,
    waiting_for_pre: bool,
    waiting_for_post: bool,
    trigger_addr: Option<u32>,
    trig_queue: Deque<u32, TRIGGER_QUEUE_DEPTH>,
    trigger_chunks_processed: u32,
    max_trigger_chunks: u32,
    /// Carries the last sample byte of the previous chunk across the
    /// chunk boundary so a transition isn't missed at a chunk seam.
    last_sample_byte: Option<u8>,
    scratch: [u8; MAX_CHUNK_SCAN_BYTES],
}

impl<'a> NonContinuousSampler<'a> {
    pub fn new(arr: &'a mut [u8], chunk_size: u32, params: SamplingParams) -> Self {
        let max_trigger_chunks = params.max_trigger_chunks;

        NonContinuousSampler {
            ring: ChunkedRing::new(arr, chunk_size),
            params,
            state: AcqState::Prefill,
            reserved_slots: [None, None],
            channel_stopped: [false, false],
            buffer_locked: false,
            waiting_for_pre: true,
            waiting_for_post: true,
            trigger_addr: None,
            trig_queue: Deque::new(),
            trigger_chunks_processed: 0,
            max_trigger_chunks,
            last_sample_byte: None,
            scratch: [0u8; MAX_CHUNK_SCAN_BYTES],
        }
    }

    pub fn state(&self) -> AcqState {
        self.state
    }

    fn trigger_search_active(&self) -> bool {
        matches!(self.state, AcqState::TrigSearch)
            && !self.params.is_logic_mode
            && matches!(self.params.trigger_mode, TriggerMode::Auto | TriggerMode::Normal)
    }

    fn chunk_size(&self) -> u32 {
        self.ring.chunk_size()
    }

    /// DMA completion handler (§4.6 "DMA handler invariants"), called for
    /// whichever channel (0 or 1) just finished.
    pub fn on_dma_complete(&mut self, channel_idx: usize) -> DmaAction {
        if self.buffer_locked {
            self.channel_stopped[channel_idx] = true;
            return DmaAction::RedirectToSink {
                len: self.chunk_size(),
            };
        }

        if let Some(addr) = self.reserved_slots[channel_idx].take() {
            self.ring.unreserve(addr);
            if self.trigger_search_active() && self.trig_queue.push_back(addr).is_err() {
                // Queue full: drop the oldest and keep scanning (§7).
                self.trig_queue.pop_front();
                let _ = self.trig_queue.push_back(addr);
            }
        }

        let next = self.ring.reserve();
        self.reserved_slots[channel_idx] = Some(next);
        self.update_predicates();

        DmaAction::ReserveNext {
            addr: next,
            len: self.chunk_size(),
        }
    }

    fn update_predicates(&mut self) {
        if self.waiting_for_pre && self.ring.size() >= self.params.min_pre_trigger_bytes {
            self.waiting_for_pre = false;
        }
        match self.trigger_addr {
            Some(addr) => {
                if self.waiting_for_post {
                    if let Some(idx) = self.ring.index(addr) {
                        if self.ring.size() - idx >= self.params.min_post_trigger_bytes {
                            self.waiting_for_post = false;
                        }
                    }
                }
            }
            None => {
                if self.waiting_for_post && self.ring.size() >= self.params.num_bytes_to_send {
                    self.waiting_for_post = false;
                }
            }
        }
    }

    /// Advances PREFILL -> TRIG_SEARCH once enough pre-trigger data has
    /// accumulated. Returns `true` if the state changed.
    pub fn poll_prefill(&mut self) -> bool {
        if self.state == AcqState::Prefill && !self.waiting_for_pre {
            self.state = AcqState::TrigSearch;
            true
        } else {
            false
        }
    }

    /// Drains the software trigger-search queue. Returns `true` once a
    /// transition was found (or the search was abandoned by AUTO timeout),
    /// at which point the caller should move to POSTFILL.
    pub fn poll_software_trigger(&mut self) -> bool {
        if self.state != AcqState::TrigSearch || self.params.is_logic_mode {
            return false;
        }
        if matches!(self.params.trigger_mode, TriggerMode::None) {
            self.state = AcqState::Postfill;
            return true;
        }

        let bps = self.params.bytes_per_sample();
        let lane = self.params.trigger_channel as usize;
        let level = self.params.trigger_level;

        while let Some(addr) = self.trig_queue.pop_front() {
            if self.trigger_chunks_processed >= self.max_trigger_chunks {
                // AUTO timeout (or NORMAL somehow exhausted, which should
                // not happen since its budget is unbounded): give up
                // looking and fall through to POSTFILL with no trigger.
                self.trigger_addr = None;
                self.state = AcqState::Postfill;
                return true;
            }
            self.trigger_chunks_processed += 1;

            let chunk_size = self.chunk_size() as usize;
            let n = self.ring.read_from(addr, 0, &mut self.scratch, chunk_size);

            let mut i = lane;
            let mut prev = self.last_sample_byte;
            while i < n {
                let curr = self.scratch[i];
                if let Some(p) = prev {
                    let fired = match self.params.trigger_type {
                        TriggerType::Rising => p < level && curr >= level,
                        TriggerType::Falling => p > level && curr <= level,
                    };
                    if fired {
                        self.trigger_addr = Some(addr + i as u32);
                        self.last_sample_byte = None;
                        self.state = AcqState::Postfill;
                        return true;
                    }
                }
                prev = Some(curr);
                i += bps as usize;
            }
            self.last_sample_byte = prev;
        }
        false
    }

    /// Hardware (PIO) trigger path for logic mode.
    pub fn on_hardware_trigger(&mut self, snapshot: TriggerSnapshot) {
        if self.state != AcqState::TrigSearch {
            return;
        }
        self.trigger_addr = if snapshot.dma_a_trans_count > 0 {
            Some(snapshot.dma_a_write_addr)
        } else if snapshot.dma_b_trans_count > 0 {
            Some(snapshot.dma_b_write_addr)
        } else {
            self.ring.end_addr()
        };
        self.state = AcqState::Postfill;
    }

    /// POSTFILL -> LOCK once enough post-trigger data has accumulated.
    pub fn poll_postfill(&mut self) -> bool {
        if self.state == AcqState::Postfill && !self.waiting_for_post {
            self.buffer_locked = true;
            self.state = AcqState::Lock;
            true
        } else {
            false
        }
    }

    /// LOCK -> EMIT once both DMA channels have observed the lock and
    /// diverted to the sink.
    pub fn poll_lock(&mut self) -> bool {
        if self.state == AcqState::Lock && self.channel_stopped[0] && self.channel_stopped[1] {
            self.state = AcqState::Emit;
            true
        } else {
            false
        }
    }

    /// Where emission should start reading from, and the sample-index
    /// reported to the host (`-2` for a not-found AUTO timeout).
    pub fn emission_window(&self) -> (Option<u32>, i32) {
        match self.trigger_addr {
            Some(addr) => (Some(addr), self.reported_trigger_index(addr)),
            None => (self.ring.end_addr(), TRIGGER_NOT_FOUND),
        }
    }

    fn sample_index_of(&self, addr: u32) -> i32 {
        let bps = self.params.bytes_per_sample().max(1);
        let byte_idx = self.ring.index(addr).unwrap_or(0);
        (byte_idx / bps) as i32
    }

    /// The hardware (PIO) trigger path latches `trigger_addr` about 4.5us
    /// after the physical edge; in logic mode that's the only trigger path,
    /// so the reported index is corrected back by that many samples before
    /// it reaches the host.
    fn lag_samples(&self) -> i32 {
        let by_rate = (self.params.real_sr_per_channel_hz as u64 * 45 / 10_000_000) as i32;
        by_rate.max(10)
    }

    fn reported_trigger_index(&self, addr: u32) -> i32 {
        let idx = self.sample_index_of(addr);
        if self.params.is_logic_mode {
            idx - self.lag_samples()
        } else {
            idx
        }
    }

    /// Copies up to `dst.len()` bytes of the emission window starting
    /// `offset` bytes past `min_pre_trigger_bytes` before the trigger (or
    /// ring start if untriggered), for building one outgoing SAMPLES frame.
    /// Returns the number of bytes copied.
    pub fn read_emission_bytes(&self, offset: u32, dst: &mut [u8]) -> usize {
        let (anchor, _) = self.emission_window();
        let Some(anchor) = anchor else { return 0 };
        let start_offset = -(self.params.min_pre_trigger_bytes as i32) + offset as i32;
        self.ring
            .read_from(anchor, start_offset, dst, dst.len())
    }

    /// Resets for the next acquisition cycle: clears the ring, unlocks, and
    /// returns to PREFILL.
    pub fn restart_cycle(&mut self) {
        self.ring.clear();
        self.state = AcqState::Prefill;
        self.reserved_slots = [None, None];
        self.channel_stopped = [false, false];
        self.buffer_locked = false;
        self.waiting_for_pre = true;
        self.waiting_for_post = true;
        self.trigger_addr = None;
        self.trig_queue.clear();
        self.trigger_chunks_processed = 0;
        self.last_sample_byte = None;
    }

    pub fn ring(&self) -> &ChunkedRing<'a> {
        &self.ring
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scope_planner::{Channel, RunMode, SamplerMode};

    fn params(trigger_mode: TriggerMode, trigger_type: TriggerType, level: u8) -> SamplingParams {
        let mut chans = [Channel::default(); 8];
        chans[0].enabled = true;
        SamplingParams {
            preferred_sr_per_channel_hz: 500_000,
            real_sr_per_channel_hz: 500_000,
            clkdiv_int: 0,
            num_bytes_to_send: 16,
            min_pre_trigger_bytes: 8,
            min_post_trigger_bytes: 8,
            max_trigger_chunks: match trigger_mode {
                TriggerMode::Normal => u32::MAX,
                TriggerMode::Auto => 4,
                TriggerMode::None => 0,
            },
            seq: 0,
            enabled_channels: 0b1,
            num_enabled_channels: 1,
            channels: chans,
            trigger_mode,
            trigger_channel: 0,
            trigger_type,
            trigger_level: level,
            run_mode: RunMode::Run,
            is_logic_mode: false,
            mode: SamplerMode::NonContinuous,
        }
    }

    #[test]
    fn locked_channel_is_redirected_to_sink_and_marked_stopped() {
        let mut backing = [0u8; 32];
        let mut s = NonContinuousSampler::new(&mut backing, 4, params(TriggerMode::Normal, TriggerType::Rising, 128));
        s.buffer_locked = true;
        let action = s.on_dma_complete(0);
        assert_eq!(action, DmaAction::RedirectToSink { len: 4 });
        assert!(s.channel_stopped[0]);
    }

    #[test]
    fn prefill_clears_once_ring_reaches_min_pre_bytes() {
        let mut backing = [0u8; 32];
        let mut s = NonContinuousSampler::new(&mut backing, 4, params(TriggerMode::Normal, TriggerType::Rising, 128));
        assert_eq!(s.state(), AcqState::Prefill);

        // The first completion per channel only arms the next reserve (the
        // initial DMA kickoff produced no data yet); the second completion
        // per channel is what unreserves a finished chunk.
        for ch in [0usize, 1, 0, 1] {
            s.on_dma_complete(ch);
        }
        // Two chunks of 4 bytes now unreserved: min_pre=8 satisfied.
        assert!(s.poll_prefill());
        assert_eq!(s.state(), AcqState::TrigSearch);
    }

    #[test]
    fn rising_edge_in_scanned_chunk_sets_trigger_addr() {
        let mut backing = [0u8; 32];
        for (i, b) in backing.iter_mut().enumerate() {
            *b = i as u8;
        }
        let mut s = NonContinuousSampler::new(&mut backing, 8, params(TriggerMode::Normal, TriggerType::Rising, 5));
        // Reserve+unreserve one chunk (bytes 0..8, ascending values 0..8);
        // level=5 fires between samples 4 and 5.
        let addr = s.ring.reserve();
        s.ring.unreserve(addr);
        s.reserved_slots[0] = Some(s.ring.reserve());
        let _ = s.trig_queue.push_back(addr);
        s.state = AcqState::TrigSearch;

        assert!(s.poll_software_trigger());
        // prev=4 < level(5), curr=5 >= level(5): the crossing sample is 5.
        assert_eq!(s.trigger_addr, Some(5));
        assert_eq!(s.state(), AcqState::Postfill);
    }

    #[test]
    fn auto_mode_timeout_reports_trigger_not_found() {
        let mut p = params(TriggerMode::Auto, TriggerType::Rising, 250);
        p.max_trigger_chunks = 1; // planner pinned the AUTO budget to 1 chunk
        let mut backing = [0u8; 32];
        let mut s = NonContinuousSampler::new(&mut backing, 8, p);
        assert_eq!(s.max_trigger_chunks, 1);

        let addr = s.ring.reserve();
        s.ring.unreserve(addr);
        let _ = s.trig_queue.push_back(addr);
        s.state = AcqState::TrigSearch;
        s.trigger_chunks_processed = 1; // already exhausted the AUTO budget

        assert!(s.poll_software_trigger());
        assert_eq!(s.trigger_addr, None);
        let (_, idx) = s.emission_window();
        assert_eq!(idx, TRIGGER_NOT_FOUND);
    }

    #[test]
    fn logic_mode_reported_trigger_index_subtracts_hardware_lag() {
        let mut backing = [0u8; 64];
        let mut p = params(TriggerMode::Normal, TriggerType::Rising, 128);
        p.is_logic_mode = true;
        p.real_sr_per_channel_hz = 1_000_000; // lag = max(10, 1e6*45/1e7) = 10
        let mut s = NonContinuousSampler::new(&mut backing, 8, p);

        let addr = s.ring.reserve();
        s.trigger_addr = Some(addr);

        let (_, idx) = s.emission_window();
        let raw = s.sample_index_of(addr);
        assert_eq!(idx, raw - 10);
    }

    #[test]
    fn analog_mode_reported_trigger_index_has_no_lag_correction() {
        let mut backing = [0u8; 64];
        let p = params(TriggerMode::Normal, TriggerType::Rising, 128);
        let mut s = NonContinuousSampler::new(&mut backing, 8, p);

        let addr = s.ring.reserve();
        s.trigger_addr = Some(addr);

        let (_, idx) = s.emission_window();
        assert_eq!(idx, s.sample_index_of(addr));
    }

    #[test]
    fn lock_waits_for_both_channels_to_stop() {
        let mut backing = [0u8; 32];
        let mut s = NonContinuousSampler::new(&mut backing, 4, params(TriggerMode::Normal, TriggerType::Rising, 128));
        s.state = AcqState::Lock;
        s.channel_stopped[0] = true;
        assert!(!s.poll_lock());
        s.channel_stopped[1] = true;
        assert!(s.poll_lock());
        assert_eq!(s.state(), AcqState::Emit);
    }

    #[test]
    fn restart_cycle_clears_trigger_and_lock_state() {
        let mut backing = [0u8; 32];
        let mut s = NonContinuousSampler::new(&mut backing, 4, params(TriggerMode::Normal, TriggerType::Rising, 128));
        s.trigger_addr = Some(4);
        s.buffer_locked = true;
        s.state = AcqState::Emit;

        s.restart_cycle();

        assert_eq!(s.state(), AcqState::Prefill);
        assert!(!s.buffer_locked);
        assert_eq!(s.trigger_addr, None);
    }
}
