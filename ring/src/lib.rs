// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Lock-free byte ring buffers for single-writer/single-reader streaming.
//!
//! Two shapes are provided:
//!
//! - [`ChunkedRing`]: a byte array partitioned into fixed-size chunks with
//!   explicit reserve/unreserve, used to stage DMA transfers ahead of a
//!   reader that only ever sees fully-written chunks.
//! - [`SimpleRing`]: a plain power-of-two byte ring that overwrites the
//!   oldest byte on overflow, used for low-rate continuous streaming.

#![cfg_attr(not(test), no_std)]

mod chunked;
mod simple;

pub use chunked::ChunkedRing;
pub use simple::SimpleRing;
