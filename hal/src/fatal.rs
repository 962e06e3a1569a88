// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Escalation path for errors that cannot be locally recovered (§7).

/// Fatal error codes, signaled to the operator via a blink pattern and then
/// halted. Values are stable -- they're part of the field-diagnosis
/// contract, not an implementation detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatalCode {
    UnsupportedFirmwareVersion = 2,
    BadAppParams = 3,
    /// Debug builds only.
    IncomingParserError = 7,
}

/// Hands off to the board's fatal-error presentation (blink code) and never
/// returns.
pub trait FatalHandler {
    fn fatal(&self, code: FatalCode) -> !;
}
