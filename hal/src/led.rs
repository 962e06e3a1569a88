// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

/// The status LED. Fatal-error blink patterns are driven by repeated calls
/// to [`set`](Led::set) from the fatal handler's loop, not built into this
/// trait.
pub trait Led {
    fn set(&mut self, on: bool);
}
