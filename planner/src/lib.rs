// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Translates host-declared acquisition intent ([`AppState`]) into the
//! concrete parameters the sampler drives hardware with ([`SamplingParams`]).
//!
//! [`ConfigPlanner::plan`] is a pure function: same input, same output,
//! every time, so Core A can safely recompute it on every pass through the
//! supervisor loop and diff the result against what Core B is currently
//! running.

#![cfg_attr(not(test), no_std)]

mod plan;
mod state;

pub use plan::{chunk_size_bytes, ConfigPlanner};
pub use state::{
    AppState, Channel, RunMode, SamplerMode, SamplingParams, TriggerMode, TriggerType,
    MAX_CHANNELS,
};
