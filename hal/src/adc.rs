// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The ADC as used by both the continuous and non-continuous samplers:
//! round-robin free-running conversion feeding a FIFO, or one-shot reads
//! driven by a software timer.

/// Synchronous and free-running access to the on-chip ADC.
pub trait Adc {
    /// Selects the input to read on the next [`read_sample`](Self::read_sample).
    fn select_channel(&mut self, channel: u8);

    /// Blocks for one conversion on the currently selected channel and
    /// returns the raw 12-bit result.
    fn read_sample(&mut self) -> u16;

    /// Configures free-running round-robin conversion over the channels set
    /// in `channel_mask`, with results pushed 8-bit-shifted into the FIFO
    /// the DMA engine reads from.
    fn configure_round_robin(&mut self, channel_mask: u8);

    fn set_clkdiv(&mut self, clkdiv_int: u32);

    fn start_free_running(&mut self);
    fn stop(&mut self);

    /// Discards any conversions left in the FIFO.
    fn drain_fifo(&mut self);

    /// Re-initializes the ADC block. Required after every
    /// [`stop`](Self::stop): skipping it leaves round-robin sample
    /// ordering inconsistent on the next start.
    fn reinit(&mut self);
}
