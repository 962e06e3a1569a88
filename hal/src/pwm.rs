// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The PWM signal generator output (SIG_GEN message target).

/// A single PWM-driven signal generator channel.
pub trait SignalGenerator {
    /// Configures and starts output. `func` selects the waveform shape
    /// (board-specific enumeration, e.g. square/triangle); `duty_permille`
    /// is duty cycle in thousandths.
    fn configure(&mut self, func: u8, gpio: u8, freq_hz: u32, duty_permille: u16);

    fn stop(&mut self, gpio: u8);
}
