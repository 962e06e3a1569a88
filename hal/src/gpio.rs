// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-channel voltage-range selection, read from a resistor-divider
//! selector wired to a handful of digital inputs.

/// Reads the externally-selected voltage range for a channel (2 bits per
/// channel in the board's default layout -- see §6).
pub trait VoltageRangeSource {
    /// Returns the range index (`0..=3`) currently selected for `channel`.
    fn read_range(&self, channel: u8) -> u8;
}
