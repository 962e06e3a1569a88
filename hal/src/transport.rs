// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The USB/serial byte transport the host protocol is framed over. Kept as
//! an interface only -- the actual USB stack is out of scope (§1).

/// Non-blocking, partial-result byte I/O.
pub trait SerialTransport {
    /// Copies as many bytes as are currently available into `buf`, up to
    /// `buf.len()`, and returns the count. `0` means nothing is available
    /// right now, not end-of-stream.
    fn read_bytes(&mut self, buf: &mut [u8]) -> usize;

    /// Writes as many bytes of `buf` as the transport currently has room
    /// for and returns the count. After 2s of no progress (§7), callers
    /// should treat further drops as expected and not retry indefinitely.
    fn write_bytes(&mut self, buf: &[u8]) -> usize;
}
