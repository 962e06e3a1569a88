// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The rate-selection ladder and clock-divider arithmetic.
//!
//! The thresholds and clamps below are hardware facts about this board's ADC
//! and PIO clock trees, not arbitrary choices -- they're kept as named
//! constants so the one true source of truth is this file, not the call
//! sites.

use crate::state::{
    AppState, Channel, RunMode, SamplerMode, SamplingParams, TriggerMode, TriggerType,
    MAX_CHANNELS,
};

const BASE_BYTES_PER_CHANNEL: u64 = 2000;
const SINGLE_SHOT_TOTAL_BYTES: u64 = 100_000;

const ADC_CLK_HZ: u64 = 48_000_000;
const SYS_CLK_HZ: u64 = 125_000_000;
/// PIO cycles consumed per captured logic sample by the trigger/capture
/// program; fixed by that program's instruction count.
const PIO_CYCLES_PER_SAMPLE: u64 = 2;
const MIN_LOGIC_CLKDIV: u32 = 5;
const MAX_CLKDIV: u32 = 63_999;
/// `clkdiv_int` values in this range measure a real rate half of what was
/// requested; coercing to zero (full speed) is closer to the intended rate
/// than clamping to the nearest achievable divider would be.
const SCOPE_CLKDIV_QUIRK_MAX: u32 = 95;

const MAX_SCOPE_SAMPLE_RATE_HZ: u64 = 500_000;

/// Per-channel rate thresholds for continuous streaming (§4.4.5); `sr_per_channel`
/// above each threshold steps up to the paired total rate.
const CONTINUOUS_LADDER: &[(u64, u64)] = &[
    (2500, 5000),
    (1000, 2500),
    (500, 1000),
    (200, 400),
    (100, 200),
    (50, 100),
    (20, 40),
    (10, 20),
    (5, 10),
];
const CONTINUOUS_FLOOR_HZ: u64 = 5;

/// Total-rate thresholds for non-continuous scope acquisitions below the
/// 1-second timebase boundary (§4.4.6).
const NON_CONTINUOUS_LADDER: &[(u64, u64)] = &[
    (400_000, 500_000),
    (300_000, 400_000),
    (250_000, 300_000),
    (200_000, 250_000),
    (150_000, 200_000),
    (125_000, 150_000),
    (100_000, 125_000),
    (75_000, 100_000),
];

fn quantize(ladder: &[(u64, u64)], value: u64, floor: Option<u64>) -> u64 {
    for &(threshold, step) in ladder {
        if value > threshold {
            return step;
        }
    }
    floor.unwrap_or(value)
}

/// `chunk_size = rate * bytes_per_sample * 10ms`, clamped to
/// `[bytes_per_sample, 2048]` and rounded down to a multiple of
/// `bytes_per_sample`.
pub fn chunk_size_bytes(real_sr_per_channel_hz: u32, bytes_per_sample: u32) -> u32 {
    let raw = (real_sr_per_channel_hz as u64 * bytes_per_sample as u64) / 100; // * 10ms
    let clamped = raw.clamp(bytes_per_sample as u64, 2048) as u32;
    (clamped / bytes_per_sample) * bytes_per_sample
}

fn calc_clkdiv_and_real_rate_scope(total_sr_hz: u64) -> (u32, u64) {
    let denom = total_sr_hz.max(1);
    let mut clkdiv = (ADC_CLK_HZ / denom).saturating_sub(1) as u32;
    if clkdiv > MAX_CLKDIV {
        clkdiv = MAX_CLKDIV;
    } else if clkdiv <= SCOPE_CLKDIV_QUIRK_MAX {
        clkdiv = 0;
    }
    let real_total = if clkdiv == 0 {
        ADC_CLK_HZ
    } else {
        ADC_CLK_HZ / (clkdiv as u64 + 1)
    };
    (clkdiv, real_total)
}

fn calc_clkdiv_and_real_rate_logic(total_sr_hz: u64) -> (u32, u64) {
    let denom = (total_sr_hz * PIO_CYCLES_PER_SAMPLE).max(1);
    let mut clkdiv = (SYS_CLK_HZ / denom) as u32;
    if clkdiv > MAX_CLKDIV {
        clkdiv = MAX_CLKDIV;
    } else if clkdiv < MIN_LOGIC_CLKDIV {
        clkdiv = MIN_LOGIC_CLKDIV;
    }
    let real_total = SYS_CLK_HZ / (clkdiv as u64 * PIO_CYCLES_PER_SAMPLE);
    (clkdiv, real_total)
}

/// Pure translation from host intent to sampling parameters.
pub struct ConfigPlanner;

impl ConfigPlanner {
    pub fn plan(state: &AppState) -> SamplingParams {
        let is_logic = state.is_logic_mode;
        let enabled_raw = state.enabled_channel_count();
        let num_enabled_channels = enabled_raw.max(1);
        let bytes_per_sample: u64 = if is_logic {
            1
        } else {
            num_enabled_channels as u64
        };

        let base_bytes_per_channel = if is_logic {
            BASE_BYTES_PER_CHANNEL * 2
        } else {
            BASE_BYTES_PER_CHANNEL
        };

        let mut num_bytes_per_channel = base_bytes_per_channel;
        let mut total_sr: u64;
        let mut continuous;

        if state.selected_sample_rate_hz != 0 {
            if matches!(state.run_mode, RunMode::Single) {
                num_bytes_per_channel = SINGLE_SHOT_TOTAL_BYTES / bytes_per_sample;
            }
            total_sr = state.selected_sample_rate_hz as u64 * bytes_per_sample;
            continuous = if is_logic {
                false
            } else {
                state.selected_sample_rate_hz < 2000
            };
        } else if matches!(state.run_mode, RunMode::Single) {
            num_bytes_per_channel = SINGLE_SHOT_TOTAL_BYTES / bytes_per_sample;
            let timebase = state.timebase_ps.max(1);
            let mut sr_per_channel =
                num_bytes_per_channel * 1_000_000_000_000u64 / timebase / 5;
            if sr_per_channel == 0 {
                sr_per_channel = 1;
            }
            // If that rate would take longer than 10s to acquire, spread the
            // acquisition across exactly 10s instead.
            if num_bytes_per_channel / sr_per_channel > 10 {
                sr_per_channel = num_bytes_per_channel / 10;
            }
            total_sr = sr_per_channel * bytes_per_sample;
            continuous = false;
        } else if state.timebase_ps >= 1_000_000_000_000 {
            let timebase = state.timebase_ps.max(1);
            if is_logic {
                // No dedicated ladder for slow logic timebases (documented
                // gap); fall back to the raw screen-spanning rate.
                let sr_per_channel =
                    num_bytes_per_channel * 1_000_000_000_000u64 / timebase / 3;
                total_sr = sr_per_channel * bytes_per_sample;
                continuous = false;
            } else {
                let sr_per_channel =
                    num_bytes_per_channel * 1_000_000_000_000u64 / timebase / 2;
                let quantized =
                    quantize(CONTINUOUS_LADDER, sr_per_channel, Some(CONTINUOUS_FLOOR_HZ));
                total_sr = quantized * bytes_per_sample;
                continuous = true;
            }
        } else {
            let timebase = state.timebase_ps.max(1);
            let divisor = if is_logic { 3 } else { 2 };
            let sr_per_channel = num_bytes_per_channel * 1_000_000_000_000u64 / timebase / divisor;
            let mut t = sr_per_channel * bytes_per_sample;
            if !is_logic {
                t = quantize(NON_CONTINUOUS_LADDER, t, None);
            }
            total_sr = t;
            continuous = false;
        }

        if !is_logic && total_sr > MAX_SCOPE_SAMPLE_RATE_HZ {
            total_sr = MAX_SCOPE_SAMPLE_RATE_HZ;
        } else if total_sr < bytes_per_sample {
            total_sr = bytes_per_sample;
        }

        let num_bytes_to_send = (num_bytes_per_channel * bytes_per_sample) as u32;
        let pre_percent = state.clamped_pre_trigger_percent() as u64;
        let min_pre_trigger_bytes = (num_bytes_to_send as u64 * pre_percent / 100) as u32;
        let min_post_trigger_bytes = num_bytes_to_send - min_pre_trigger_bytes;

        let preferred_sr_per_channel_hz = (total_sr / bytes_per_sample) as u32;

        let (clkdiv_int, real_total_sr) = if is_logic {
            calc_clkdiv_and_real_rate_logic(total_sr)
        } else {
            calc_clkdiv_and_real_rate_scope(total_sr)
        };
        let real_sr_per_channel_hz = (real_total_sr / bytes_per_sample) as u32;

        let chunk_size = chunk_size_bytes(real_sr_per_channel_hz, bytes_per_sample as u32);
        let max_trigger_chunks = match state.trigger_mode {
            TriggerMode::Normal => u32::MAX,
            TriggerMode::Auto => {
                let total_rate = real_sr_per_channel_hz as u64 * bytes_per_sample;
                (((total_rate * 15) / 100) / chunk_size.max(1) as u64).max(1) as u32
            }
            TriggerMode::None => 0,
        };

        let mode = if enabled_raw == 0 {
            SamplerMode::Null
        } else if continuous {
            SamplerMode::Continuous
        } else {
            SamplerMode::NonContinuous
        };

        let mut enabled_channels: u8 = 0;
        for (i, ch) in state.channels.iter().enumerate() {
            if ch.enabled {
                enabled_channels |= 1 << i;
            }
        }

        SamplingParams {
            preferred_sr_per_channel_hz,
            real_sr_per_channel_hz,
            clkdiv_int,
            num_bytes_to_send,
            min_pre_trigger_bytes,
            min_post_trigger_bytes,
            max_trigger_chunks,
            seq: 0,
            enabled_channels,
            num_enabled_channels: num_enabled_channels as u8,
            channels: state.channels,
            trigger_mode: state.trigger_mode,
            trigger_channel: state.trigger_channel,
            trigger_type: state.trigger_type,
            trigger_level: state.trigger_level,
            run_mode: state.run_mode,
            is_logic_mode: is_logic,
            mode,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channels(enabled: &[usize]) -> [Channel; MAX_CHANNELS] {
        let mut chans = [Channel::default(); MAX_CHANNELS];
        for &i in enabled {
            chans[i].enabled = true;
        }
        chans
    }

    fn base_state() -> AppState {
        AppState {
            channels: channels(&[0]),
            ..AppState::default()
        }
    }

    #[test]
    fn two_channel_slow_timebase_settles_on_continuous_5k_total() {
        let state = AppState {
            timebase_ps: 1_000_000_000_000,
            channels: channels(&[0, 1]),
            ..AppState::default()
        };
        let params = ConfigPlanner::plan(&state);
        assert_eq!(params.mode, SamplerMode::Continuous);
        assert_eq!(params.real_sr_per_channel_hz, 2500);
        assert_eq!(params.num_enabled_channels, 2);
    }

    #[test]
    fn user_selected_one_megahertz_two_channel_clamps_to_adc_limit() {
        let state = AppState {
            selected_sample_rate_hz: 1_000_000,
            channels: channels(&[0, 1]),
            trigger_mode: TriggerMode::Auto,
            trigger_type: TriggerType::Rising,
            trigger_level: 128,
            ..AppState::default()
        };
        let params = ConfigPlanner::plan(&state);
        assert_eq!(params.mode, SamplerMode::NonContinuous);
        assert_eq!(params.real_sr_per_channel_hz, 250_000);
        assert_eq!(params.num_bytes_to_send, 4000);
        assert_eq!(params.min_pre_trigger_bytes, 2000);
    }

    #[test]
    fn logic_ten_megahertz_clamps_clkdiv_to_minimum() {
        let state = AppState {
            is_logic_mode: true,
            selected_sample_rate_hz: 10_000_000,
            channels: channels(&[0, 1, 2, 3, 4, 5, 6, 7]),
            trigger_mode: TriggerMode::Normal,
            trigger_channel: 3,
            trigger_type: TriggerType::Rising,
            ..AppState::default()
        };
        let params = ConfigPlanner::plan(&state);
        assert_eq!(params.num_bytes_to_send, 8000);
        assert!(params.clkdiv_int >= MIN_LOGIC_CLKDIV);
    }

    #[test]
    fn single_shot_targets_roughly_ten_second_acquisition() {
        let state = AppState {
            run_mode: RunMode::Single,
            timebase_ps: 50_000_000_000, // 50 ms/div-ish slow sweep
            channels: channels(&[0]),
            ..AppState::default()
        };
        let params = ConfigPlanner::plan(&state);
        assert_eq!(params.run_mode, RunMode::Single);
        assert!(params.preferred_sr_per_channel_hz > 0);
    }

    #[test]
    fn planner_is_a_pure_function() {
        let state = base_state();
        let a = ConfigPlanner::plan(&state);
        let b = ConfigPlanner::plan(&state);
        assert_eq!(a, b);
    }

    #[test]
    fn pre_and_post_trigger_bytes_sum_to_total() {
        let state = AppState {
            pre_trigger_percent: 37,
            channels: channels(&[0, 1]),
            ..AppState::default()
        };
        let params = ConfigPlanner::plan(&state);
        assert_eq!(
            params.min_pre_trigger_bytes + params.min_post_trigger_bytes,
            params.num_bytes_to_send
        );
    }

    #[test]
    fn num_bytes_to_send_is_a_multiple_of_bytes_per_sample() {
        for n in 1..=5usize {
            let enabled: Vec<usize> = (0..n).collect();
            let state = AppState {
                channels: channels(&enabled),
                ..AppState::default()
            };
            let params = ConfigPlanner::plan(&state);
            let bps = params.bytes_per_sample();
            assert_eq!(params.num_bytes_to_send % bps, 0);
        }
    }

    #[test]
    fn scope_clkdiv_quirk_coerces_low_dividers_to_zero() {
        // total_sr chosen so the raw clkdiv computation lands at 94.
        let total_sr = ADC_CLK_HZ / 95;
        let (clkdiv, _) = calc_clkdiv_and_real_rate_scope(total_sr);
        assert_eq!(clkdiv, 0);
    }

    #[test]
    fn logic_clkdiv_below_minimum_clamps_to_five() {
        let (clkdiv, _) = calc_clkdiv_and_real_rate_logic(20_000_000);
        assert_eq!(clkdiv, MIN_LOGIC_CLKDIV);
    }

    #[test]
    fn scope_rate_above_half_megahertz_clamps() {
        let state = AppState {
            selected_sample_rate_hz: 600_000,
            channels: channels(&[0]),
            ..AppState::default()
        };
        let params = ConfigPlanner::plan(&state);
        assert_eq!(params.preferred_sr_per_channel_hz.min(500_000), params.preferred_sr_per_channel_hz);
    }

    #[test]
    fn no_enabled_channels_selects_null_mode() {
        let state = AppState::default();
        let params = ConfigPlanner::plan(&state);
        assert_eq!(params.mode, SamplerMode::Null);
    }

    #[test]
    fn chunk_size_rounds_down_to_sample_multiple_and_respects_cap() {
        assert_eq!(chunk_size_bytes(500_000, 2), 2048 - (2048 % 2));
        assert_eq!(chunk_size_bytes(100, 3), 3); // rounds down toward the floor
    }
}
