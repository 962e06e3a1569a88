// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Acquisition strategies and the two-core control protocol.
//!
//! [`continuous`] and [`noncontinuous`] are the two sampler strategies
//! dispatched by [`Strategy`]; [`supervisor`] is Core A's control loop;
//! [`core_b`] is Core B's dispatch loop, which owns whichever strategy is
//! currently active and answers the restart handshake between cycles.

#![cfg_attr(not(test), no_std)]

pub mod continuous;
pub mod core_b;
pub mod noncontinuous;
pub mod supervisor;

pub use continuous::ContinuousSampler;
pub use core_b::{CoreBLoop, RestartSignal};
pub use noncontinuous::{AcqState, DmaAction, NonContinuousSampler, TRIGGER_NOT_FOUND};
pub use supervisor::{Supervisor, SupervisorOutcome};

/// Dispatch tag mirroring `scope_planner::SamplerMode`, but owning each
/// strategy's live state rather than just naming it.
pub enum Strategy<'a> {
    Null,
    Continuous(ContinuousSampler<'a>),
    NonContinuous(NonContinuousSampler<'a>),
}
