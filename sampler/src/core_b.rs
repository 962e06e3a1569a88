// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Core B's dispatch loop (§4.8): rate-limits outgoing frames, refreshes
//! per-channel voltage range, services the restart handshake, and hands
//! off to whichever [`Strategy`] is currently active.
//!
//! Completion of a SINGLE acquisition needs to flip `AppState.run_mode`
//! back to STOP, but Core A owns `AppState` exclusively (§5). Rather than
//! route that through the full restart handshake, the board wiring shares
//! one `AtomicBool` the same way [`crate::continuous`] shares
//! `active_is_a`: Core B sets it, Core A's Supervisor pass checks and
//! clears it before replanning.

use core::sync::atomic::{AtomicBool, Ordering};

use scope_hal::{CoreFifo, CoreFifoError, CoreMessage, VoltageRangeSource};
use scope_planner::{RunMode, SamplingParams};

use crate::Strategy;

/// §4.8 step 1's frame-rate cap.
const FRAME_INTERVAL_MS: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartSignal {
    None,
    /// A `RESTART_REQUIRED`/`SAMPLING_STOPPED` round-trip just completed;
    /// the caller must build a new [`Strategy`] for the still-pending
    /// `RESTART_SAMPLING` params and hand it to
    /// [`CoreBLoop::apply_restart`].
    Requested,
}

pub struct CoreBLoop<'a> {
    strategy: Strategy<'a>,
    active_params: SamplingParams,
    last_emit_ms: u32,
}

impl<'a> CoreBLoop<'a> {
    pub fn new(strategy: Strategy<'a>, params: SamplingParams) -> Self {
        CoreBLoop {
            strategy,
            active_params: params,
            last_emit_ms: 0,
        }
    }

    pub fn active_params(&self) -> &SamplingParams {
        &self.active_params
    }

    pub fn strategy(&self) -> &Strategy<'a> {
        &self.strategy
    }

    pub fn strategy_mut(&mut self) -> &mut Strategy<'a> {
        &mut self.strategy
    }

    /// §4.8 step 3. Checks for a pending `RESTART_REQUIRED`; if present,
    /// drops the current strategy (stopping sampling immediately -- the
    /// backing rings are about to be rebuilt for the new params anyway),
    /// acks `SAMPLING_STOPPED`, and busy-waits for `RESTART_SAMPLING`.
    pub fn poll_restart(&mut self, fifo: &dyn CoreFifo) -> RestartSignal {
        if fifo.try_receive() != Some(CoreMessage::RestartRequired) {
            return RestartSignal::None;
        }

        self.strategy = Strategy::Null;
        while fifo.send(CoreMessage::SamplingStopped) == Err(CoreFifoError::WouldBlock) {}
        loop {
            if fifo.try_receive() == Some(CoreMessage::RestartSampling) {
                break;
            }
        }
        RestartSignal::Requested
    }

    /// Completes a [`RestartSignal::Requested`] cycle with the freshly
    /// built strategy for the new params.
    pub fn apply_restart(&mut self, strategy: Strategy<'a>, params: SamplingParams) {
        self.strategy = strategy;
        self.active_params = params;
    }

    /// §4.8 step 1: true once `>= 100ms` have elapsed since the last
    /// emitted frame. `now_ms` is a free-running millisecond tick; wrapping
    /// subtraction keeps this correct across rollover.
    pub fn ready_to_emit(&self, now_ms: u32) -> bool {
        now_ms.wrapping_sub(self.last_emit_ms) >= FRAME_INTERVAL_MS
    }

    pub fn mark_emitted(&mut self, now_ms: u32) {
        self.last_emit_ms = now_ms;
    }

    /// §4.8 step 2: re-reads each enabled channel's voltage range selector.
    pub fn refresh_voltage_ranges(&mut self, gpio: &dyn VoltageRangeSource) {
        for (i, ch) in self.active_params.channels.iter_mut().enumerate() {
            if ch.enabled {
                ch.voltage_range = gpio.read_range(i as u8);
            }
        }
    }

    /// §4.8 step 4: after a SINGLE acquisition finishes, flips the local
    /// `run_mode` mirror to STOP and raises `done` for Core A to observe.
    pub fn complete_single_shot(&mut self, done: &AtomicBool) {
        if self.active_params.run_mode == RunMode::Single {
            self.active_params.run_mode = RunMode::Stop;
            done.store(true, Ordering::Release);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scope_hal::mock::{MockCoreFifo, MockVoltageRangeSource};
    use scope_planner::{Channel, SamplerMode, TriggerMode, TriggerType};

    fn params(run_mode: RunMode) -> SamplingParams {
        let mut channels = [Channel::default(); 8];
        channels[0].enabled = true;
        SamplingParams {
            preferred_sr_per_channel_hz: 1000,
            real_sr_per_channel_hz: 1000,
            clkdiv_int: 0,
            num_bytes_to_send: 2000,
            min_pre_trigger_bytes: 1000,
            min_post_trigger_bytes: 1000,
            max_trigger_chunks: 0,
            seq: 0,
            enabled_channels: 0b1,
            num_enabled_channels: 1,
            channels,
            trigger_mode: TriggerMode::None,
            trigger_channel: 0,
            trigger_type: TriggerType::Rising,
            trigger_level: 128,
            run_mode,
            is_logic_mode: false,
            mode: SamplerMode::Null,
        }
    }

    #[test]
    fn frame_rate_cap_waits_a_full_hundred_milliseconds() {
        let core_b = CoreBLoop::new(Strategy::Null, params(RunMode::Run));
        assert!(!core_b.ready_to_emit(50));
        assert!(core_b.ready_to_emit(100));
    }

    #[test]
    fn ready_to_emit_survives_tick_wraparound() {
        let mut core_b = CoreBLoop::new(Strategy::Null, params(RunMode::Run));
        core_b.mark_emitted(u32::MAX - 10);
        assert!(!core_b.ready_to_emit(u32::MAX - 5)); // only 5ms elapsed
        assert!(core_b.ready_to_emit(89)); // wrapped past 0; 100ms elapsed
    }

    #[test]
    fn restart_required_drops_strategy_and_waits_for_resume() {
        let fifo = MockCoreFifo::new();
        let mut core_b = CoreBLoop::new(Strategy::Null, params(RunMode::Run));

        fifo.inject(CoreMessage::RestartRequired);
        fifo.inject(CoreMessage::RestartSampling);
        let signal = core_b.poll_restart(&fifo);

        assert_eq!(signal, RestartSignal::Requested);
        assert_eq!(fifo.take_sent(), Some(CoreMessage::SamplingStopped));
    }

    #[test]
    fn no_pending_message_is_a_no_op() {
        let fifo = MockCoreFifo::new();
        let mut core_b = CoreBLoop::new(Strategy::Null, params(RunMode::Run));
        assert_eq!(core_b.poll_restart(&fifo), RestartSignal::None);
    }

    #[test]
    fn voltage_ranges_refresh_only_enabled_channels() {
        let gpio = MockVoltageRangeSource::new([3u8; 8]);
        let mut core_b = CoreBLoop::new(Strategy::Null, params(RunMode::Run));
        core_b.refresh_voltage_ranges(&gpio);
        assert_eq!(core_b.active_params().channels[0].voltage_range, 3);
        assert_eq!(core_b.active_params().channels[1].voltage_range, 0);
    }

    #[test]
    fn single_shot_completion_flips_run_mode_and_raises_done() {
        let mut core_b = CoreBLoop::new(Strategy::Null, params(RunMode::Single));
        let done = AtomicBool::new(false);
        core_b.complete_single_shot(&done);
        assert_eq!(core_b.active_params().run_mode, RunMode::Stop);
        assert!(done.load(Ordering::Acquire));
    }

    #[test]
    fn continuous_run_mode_is_unaffected_by_complete_single_shot() {
        let mut core_b = CoreBLoop::new(Strategy::Null, params(RunMode::Run));
        let done = AtomicBool::new(false);
        core_b.complete_single_shot(&done);
        assert_eq!(core_b.active_params().run_mode, RunMode::Run);
        assert!(!done.load(Ordering::Acquire));
    }
}
