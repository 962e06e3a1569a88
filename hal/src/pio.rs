// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Hardware (PIO-driven) trigger detection, used only in logic-analyzer mode.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerEdge {
    Rising,
    Falling,
}

/// DMA write-address/transfer-count pair latched at the instant the PIO
/// program's trigger IRQ fires, for both channels of the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerSnapshot {
    pub dma_a_write_addr: u32,
    pub dma_a_trans_count: u32,
    pub dma_b_write_addr: u32,
    pub dma_b_trans_count: u32,
}

pub trait PioTriggerClient {
    fn triggered(&self, snapshot: TriggerSnapshot);
}

/// The PIO program that watches the configured trigger GPIO for an edge and
/// raises an interrupt carrying a [`TriggerSnapshot`].
pub trait PioTrigger {
    fn load_program(&mut self, edge: TriggerEdge, gpio: u8);
    fn set_clkdiv(&mut self, clkdiv_int: u32);
    fn set_client(&mut self, client: &'static dyn PioTriggerClient);
    fn enable(&mut self);
    fn disable(&mut self);
}
