// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The inter-core FIFO (RP2040 SIO mailbox): a strictly-alternating
//! request/ack channel with a single message in flight.

/// Messages exchanged across the two cores during a parameter-change
/// handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoreMessage {
    None,
    RestartRequired,
    SamplingStopped,
    RestartSampling,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoreFifoError {
    /// The peer hasn't drained the previous message yet.
    WouldBlock,
}

/// One side of the two-core mailbox. Both cores use the same trait; which
/// messages each side actually sends is enforced by `Supervisor`/the
/// sampler core loop, not by this type.
pub trait CoreFifo {
    fn send(&self, msg: CoreMessage) -> Result<(), CoreFifoError>;

    /// Non-blocking receive; `None` if nothing is waiting.
    fn try_receive(&self) -> Option<CoreMessage>;
}
