// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Core A's control loop (§4.7): drains incoming host messages into
//! `AppState`, replans `dormant_params`, and drives the restart handshake
//! with Core B across the inter-core FIFO.

use heapless::Deque;
use scope_hal::{CoreFifo, CoreFifoError, CoreMessage};
use scope_planner::{AppState, ConfigPlanner, RunMode, SamplingParams};
use scope_protocol::IncomingMessage;

/// Bound on messages drained per loop pass, so a flooding host can't starve
/// the replan/restart step.
const MAX_MESSAGES_PER_PASS: usize = 1000;

/// Which `SamplingParams` fields a restart hinges on (§4.7 step 2). All
/// other fields -- e.g. `seq`, per-channel `voltage_range` -- are allowed to
/// drift without tearing down the active acquisition.
fn restart_affecting_fields_differ(a: &SamplingParams, b: &SamplingParams) -> bool {
    a.mode != b.mode
        || a.real_sr_per_channel_hz != b.real_sr_per_channel_hz
        || a.enabled_channels != b.enabled_channels
        || a.min_pre_trigger_bytes != b.min_pre_trigger_bytes
        || a.run_mode != b.run_mode
        || a.is_logic_mode != b.is_logic_mode
        || (a.mode == scope_planner::SamplerMode::NonContinuous && a.trigger_mode != b.trigger_mode)
        || (a.is_logic_mode && (a.trigger_channel != b.trigger_channel || a.trigger_type != b.trigger_type))
}

/// Applies a decoded host message to `AppState`, marking the dirty flags
/// the Supervisor consults to decide whether a replan is even worth doing.
pub fn apply_incoming(state: &mut AppState, msg: &IncomingMessage) {
    match msg {
        IncomingMessage::SyncResponse(r) => {
            // Lower 2 bits: run mode. Upper of those 2 bits: app mode, where
            // anything non-zero means logic-analyzer mode (scoppy-message.c's
            // `process_sync_response_message`).
            state.run_mode = run_mode_from_wire(r.flags & 0x3);
            state.is_logic_mode = ((r.flags >> 2) & 0x3) > 0;
            state.trigger_mode = trigger_mode_from_wire(r.trigger.mode);
            state.trigger_channel = r.trigger.channel;
            state.trigger_type = trigger_type_from_wire(r.trigger.kind);
            state.trigger_level = (r.trigger.level.clamp(0, 255)) as u8;
            state.timebase_ps = (r.timebase_centi_us as u64) * 10_000;
            apply_channels(state, &r.channels);
            state.resync_required = false;
            state.app_dirty = true;
        }
        IncomingMessage::HorzScaleChanged { timebase_centi_us } => {
            state.timebase_ps = (*timebase_centi_us as u64) * 10_000;
            state.app_dirty = true;
        }
        IncomingMessage::ChannelsChanged { channels } => {
            apply_channels(state, channels);
            state.channels_dirty = true;
        }
        IncomingMessage::TriggerChanged(t) => {
            state.trigger_mode = trigger_mode_from_wire(t.mode);
            state.trigger_channel = t.channel;
            state.trigger_type = trigger_type_from_wire(t.kind);
            state.trigger_level = (t.level.clamp(0, 255)) as u8;
            state.app_dirty = true;
        }
        IncomingMessage::SigGen { .. } => {
            // Signal generator output is driven straight from the board
            // crate's `SignalGenerator`; it has no effect on sampling plan.
        }
        IncomingMessage::SelectedSampleRate { rate_hz } => {
            state.selected_sample_rate_hz = *rate_hz;
            state.app_dirty = true;
        }
        IncomingMessage::PreTriggerSamples { percent } => {
            state.pre_trigger_percent = *percent;
            state.app_dirty = true;
        }
    }
}

fn apply_channels(state: &mut AppState, channels: &[scope_protocol::ChannelConfig]) {
    for c in &mut state.channels {
        c.enabled = false;
    }
    for wire in channels {
        if let Some(c) = state.channels.get_mut(wire.ch_id as usize) {
            c.enabled = true;
            c.voltage_range = wire.range;
        }
    }
}

/// `0`/`1`/`2` -- values `RUN_MODE_RUN`/`RUN_MODE_STOP`/`RUN_MODE_SINGLE`
/// carry over unchanged from scoppy.h; the fourth 2-bit value has no defined
/// meaning, so it's treated as STOP rather than left unhandled.
fn run_mode_from_wire(v: u8) -> RunMode {
    match v {
        0 => RunMode::Run,
        2 => RunMode::Single,
        _ => RunMode::Stop,
    }
}

fn trigger_mode_from_wire(v: u8) -> scope_planner::TriggerMode {
    match v {
        1 => scope_planner::TriggerMode::Auto,
        2 => scope_planner::TriggerMode::Normal,
        _ => scope_planner::TriggerMode::None,
    }
}

fn trigger_type_from_wire(v: u8) -> scope_planner::TriggerType {
    match v {
        1 => scope_planner::TriggerType::Falling,
        _ => scope_planner::TriggerType::Rising,
    }
}

/// Result of one Supervisor loop pass, so the board main loop knows whether
/// to unwind back to the UNSYNCED top-level state (§4.7 step 4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorOutcome {
    Continue,
    ResyncRequested,
}

/// Core A's loop. Owns `AppState`, the planner's `active_params` mirror, and
/// the FIFO handshake; does not touch the sampler itself.
pub struct Supervisor {
    state: AppState,
    active_params: SamplingParams,
    dormant_params: SamplingParams,
}

impl Supervisor {
    pub fn new(initial_params: SamplingParams) -> Self {
        Supervisor {
            state: AppState::default(),
            active_params: initial_params,
            dormant_params: initial_params,
        }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut AppState {
        &mut self.state
    }

    pub fn active_params(&self) -> &SamplingParams {
        &self.active_params
    }

    /// Drains up to [`MAX_MESSAGES_PER_PASS`] messages from `inbox`,
    /// replans, and drives the restart handshake if needed. `inbox` yields
    /// already-decoded messages; framing and decode errors are handled by
    /// the caller before this point. Busy-waits on `fifo` for the
    /// `SAMPLING_STOPPED` ack, per §5's Core B suspension-point model.
    pub fn run_pass(
        &mut self,
        inbox: &mut Deque<IncomingMessage, 64>,
        fifo: &dyn CoreFifo,
    ) -> SupervisorOutcome {
        for _ in 0..MAX_MESSAGES_PER_PASS {
            let Some(msg) = inbox.pop_front() else {
                break;
            };
            apply_incoming(&mut self.state, &msg);
        }

        if self.state.resync_required {
            return SupervisorOutcome::ResyncRequested;
        }

        self.dormant_params = ConfigPlanner::plan(&self.state);

        if restart_affecting_fields_differ(&self.active_params, &self.dormant_params) {
            self.restart(fifo);
        }

        SupervisorOutcome::Continue
    }

    fn restart(&mut self, fifo: &dyn CoreFifo) {
        while fifo.send(CoreMessage::RestartRequired) == Err(CoreFifoError::WouldBlock) {}
        loop {
            if fifo.try_receive() == Some(CoreMessage::SamplingStopped) {
                break;
            }
        }

        core::mem::swap(&mut self.active_params, &mut self.dormant_params);
        self.dormant_params = self.active_params;

        while fifo.send(CoreMessage::RestartSampling) == Err(CoreFifoError::WouldBlock) {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scope_hal::mock::MockCoreFifo;
    use scope_planner::{Channel, RunMode, SamplerMode, TriggerMode, TriggerType};

    fn base_params() -> SamplingParams {
        SamplingParams {
            preferred_sr_per_channel_hz: 0,
            real_sr_per_channel_hz: 0,
            clkdiv_int: 0,
            num_bytes_to_send: 0,
            min_pre_trigger_bytes: 0,
            min_post_trigger_bytes: 0,
            max_trigger_chunks: 0,
            seq: 0,
            enabled_channels: 0,
            num_enabled_channels: 0,
            channels: [Channel::default(); 8],
            trigger_mode: TriggerMode::None,
            trigger_channel: 0,
            trigger_type: TriggerType::Rising,
            trigger_level: 128,
            run_mode: RunMode::Stop,
            is_logic_mode: false,
            mode: SamplerMode::Null,
        }
    }

    /// A `CoreFifo` test double standing in for an instantly-responsive
    /// Core B: every `RESTART_REQUIRED` is immediately answered with
    /// `SAMPLING_STOPPED`, so the handshake in [`Supervisor::restart`]
    /// never busy-waits in a single-threaded test.
    #[derive(Default)]
    struct EchoFifo {
        sent: core::cell::RefCell<heapless::Vec<CoreMessage, 8>>,
        inbound: core::cell::RefCell<Deque<CoreMessage, 8>>,
    }

    impl CoreFifo for EchoFifo {
        fn send(&self, msg: CoreMessage) -> Result<(), CoreFifoError> {
            let _ = self.sent.borrow_mut().push(msg);
            if msg == CoreMessage::RestartRequired {
                let _ = self.inbound.borrow_mut().push_back(CoreMessage::SamplingStopped);
            }
            Ok(())
        }

        fn try_receive(&self) -> Option<CoreMessage> {
            self.inbound.borrow_mut().pop_front()
        }
    }

    #[test]
    fn enabling_a_channel_triggers_a_restart_handshake() {
        let fifo = EchoFifo::default();
        let mut sv = Supervisor::new(base_params());
        let mut inbox: Deque<IncomingMessage, 64> = Deque::new();
        let mut channels = heapless::Vec::new();
        channels.push(scope_protocol::ChannelConfig { ch_id: 0, range: 1 }).unwrap();
        inbox
            .push_back(IncomingMessage::ChannelsChanged { channels })
            .unwrap();
        inbox
            .push_back(IncomingMessage::HorzScaleChanged {
                timebase_centi_us: 100_000,
            })
            .unwrap();

        let outcome = sv.run_pass(&mut inbox, &fifo);

        assert_eq!(outcome, SupervisorOutcome::Continue);
        assert!(sv.state().channels[0].enabled);
        assert_eq!(sv.state().timebase_ps, 1_000_000_000);
        assert_eq!(sv.active_params().enabled_channels, 0b1);
        assert_eq!(
            fifo.sent.borrow().as_slice(),
            [CoreMessage::RestartRequired, CoreMessage::RestartSampling]
        );
    }

    #[test]
    fn sync_response_applies_run_mode_and_logic_mode_from_flags() {
        let mut state = AppState::default();
        let msg = IncomingMessage::SyncResponse(scope_protocol::SyncResponse {
            flags: 0b0110, // app_mode = 0b01 (logic mode), run_mode = 0b10 (Single)
            channels: heapless::Vec::new(),
            range_lo_off: 0,
            range_hi_off: 0,
            timebase_centi_us: 0,
            trigger: scope_protocol::TriggerBlock {
                mode: 0,
                channel: 0,
                kind: 0,
                level: 0,
            },
        });

        apply_incoming(&mut state, &msg);

        assert_eq!(state.run_mode, RunMode::Single);
        assert!(state.is_logic_mode);
    }

    #[test]
    fn resync_required_short_circuits_the_pass() {
        let fifo = MockCoreFifo::new();
        let mut sv = Supervisor::new(base_params());
        sv.state_mut().resync_required = true;
        let mut inbox: Deque<IncomingMessage, 64> = Deque::new();

        let outcome = sv.run_pass(&mut inbox, &fifo);
        assert_eq!(outcome, SupervisorOutcome::ResyncRequested);
    }

    #[test]
    fn unrelated_field_changes_do_not_mark_restart_required() {
        let mut a = base_params();
        a.mode = SamplerMode::Continuous;
        a.real_sr_per_channel_hz = 1000;
        let mut b = a;
        b.seq = 7;
        b.channels[0].voltage_range = 3;
        assert!(!restart_affecting_fields_differ(&a, &b));

        b.real_sr_per_channel_hz = 2000;
        assert!(restart_affecting_fields_differ(&a, &b));
    }
}
