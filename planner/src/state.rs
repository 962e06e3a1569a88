// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

/// Widest channel count a board layout supports (8 logic-analyzer lines).
pub const MAX_CHANNELS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Run,
    Stop,
    Single,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerMode {
    None,
    Auto,
    Normal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerType {
    Rising,
    Falling,
}

/// Selects which sampler strategy drives an acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplerMode {
    /// No channels enabled; nothing is sampled.
    Null,
    Continuous,
    NonContinuous,
}

/// One analog or logic input. `voltage_range` indexes a board-specific
/// attenuator/gain selector and is read from GPIO once per acquisition, not
/// set by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Channel {
    pub enabled: bool,
    pub voltage_range: u8,
}

/// Host-declared acquisition intent. The planner's only input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppState {
    pub is_logic_mode: bool,
    pub run_mode: RunMode,
    pub timebase_ps: u64,
    /// `0` means "let the planner pick a rate".
    pub selected_sample_rate_hz: u32,
    pub pre_trigger_percent: u8,
    pub trigger_mode: TriggerMode,
    pub trigger_channel: u8,
    pub trigger_type: TriggerType,
    pub trigger_level: u8,
    pub channels: [Channel; MAX_CHANNELS],
    pub app_dirty: bool,
    pub channels_dirty: bool,
    pub resync_required: bool,
}

impl AppState {
    /// Pre-trigger percentage clamped into `0..=100`, per the planner-error
    /// clamp rule rather than the fatal-error path (an out-of-range percent
    /// from a buggy host is safely correctable).
    pub fn clamped_pre_trigger_percent(&self) -> u8 {
        self.pre_trigger_percent.min(100)
    }

    pub fn enabled_channel_count(&self) -> u32 {
        self.channels.iter().filter(|c| c.enabled).count() as u32
    }
}

impl Default for AppState {
    fn default() -> Self {
        AppState {
            is_logic_mode: false,
            run_mode: RunMode::Stop,
            timebase_ps: 1_000_000_000_000,
            selected_sample_rate_hz: 0,
            pre_trigger_percent: 50,
            trigger_mode: TriggerMode::None,
            trigger_channel: 0,
            trigger_type: TriggerType::Rising,
            trigger_level: 128,
            channels: [Channel::default(); MAX_CHANNELS],
            app_dirty: false,
            channels_dirty: false,
            resync_required: false,
        }
    }
}

/// The planner's output and the sampler's input. Every field is read-stable
/// between two cross-core barrier crossings -- Core B never observes a
/// partially updated instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplingParams {
    pub preferred_sr_per_channel_hz: u32,
    pub real_sr_per_channel_hz: u32,
    pub clkdiv_int: u32,
    /// Total across channels; always a multiple of `bytes_per_sample`.
    pub num_bytes_to_send: u32,
    pub min_pre_trigger_bytes: u32,
    pub min_post_trigger_bytes: u32,
    /// AUTO trigger search budget in chunks, so an AUTO search gives up and
    /// falls through to POSTFILL instead of scanning forever; `u32::MAX` for
    /// NORMAL (unbounded) and `0` for no trigger. Derived once here so the
    /// sampler never recomputes it mid-acquisition.
    pub max_trigger_chunks: u32,
    /// Continuous-mode outgoing frame counter. A fresh plan always starts
    /// this at zero; the sampler owns incrementing it.
    pub seq: u32,
    pub enabled_channels: u8,
    pub num_enabled_channels: u8,
    pub channels: [Channel; MAX_CHANNELS],
    pub trigger_mode: TriggerMode,
    pub trigger_channel: u8,
    pub trigger_type: TriggerType,
    pub trigger_level: u8,
    pub run_mode: RunMode,
    pub is_logic_mode: bool,
    pub mode: SamplerMode,
}

impl SamplingParams {
    pub fn bytes_per_sample(&self) -> u32 {
        if self.is_logic_mode {
            1
        } else {
            self.num_enabled_channels.max(1) as u32
        }
    }
}
