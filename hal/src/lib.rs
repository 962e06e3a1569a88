// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Hardware interface traits for the acquisition engine.
//!
//! Everything in `scope-sampler` is written against these traits rather
//! than against `rp2040-hal` directly, the same separation Tock draws
//! between a capsule and `kernel::hil`. The `scope-board` binary crate is
//! the only place concrete peripherals are wired in; every other crate can
//! be exercised on a host with the `mock` feature's fakes.

#![cfg_attr(not(any(test, feature = "mock")), no_std)]

mod adc;
mod dma;
mod fifo;
mod fatal;
mod gpio;
mod led;
mod pio;
mod pwm;
mod transport;

#[cfg(feature = "mock")]
pub mod mock;

pub use adc::Adc;
pub use dma::{Dma, DmaChannelId, DmaClient};
pub use fatal::{FatalCode, FatalHandler};
pub use fifo::{CoreFifo, CoreFifoError, CoreMessage};
pub use gpio::VoltageRangeSource;
pub use led::Led;
pub use pio::{PioTrigger, PioTriggerClient, TriggerEdge, TriggerSnapshot};
pub use pwm::SignalGenerator;
pub use transport::SerialTransport;

/// Board identity, read once at startup for the SYNC handshake.
pub trait BoardIdentity {
    fn chip_id(&self) -> u32;
    fn unique_id(&self) -> [u8; 8];
    fn fw_type(&self) -> u8;
    fn fw_version(&self) -> u8;
    fn build_number(&self) -> i32;
}
