// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Pin and peripheral assignment for this board layout. Mirrors the GPIO
//! map fixed by the original scoppy-pico hardware: logic-analyzer inputs on
//! GPIO 6-13, ADC inputs on GPIO 26-27, voltage-range selector inputs
//! starting at GPIO 2, signal-generator PWM output on GPIO 22, status LED
//! on GPIO 25.

/// First of two ADC input channels (GPIO 26/27, ADC0/ADC1).
pub const ADC_CH0_GPIO: u8 = 26;
pub const ADC_CH1_GPIO: u8 = 27;

/// Eight consecutive logic-analyzer input pins.
pub const LOGIC_ANALYZER_FIRST_GPIO: u8 = 6;
pub const LOGIC_ANALYZER_PIN_COUNT: u8 = 8;

/// Signal-generator PWM output.
pub const SIG_GEN_PWM_GPIO: u8 = 22;

/// First of four voltage-range selector inputs (2 bits per analog channel).
pub const VOLTAGE_RANGE_START_GPIO: u8 = 2;

/// Status LED.
pub const LED_GPIO: u8 = 25;

/// Firmware identity reported in SYNC (§4.9). `fw_type` distinguishes this
/// firmware family from the host's other supported devices on the wire;
/// `fw_version` gates protocol compatibility.
pub const FW_TYPE: u8 = 1;
pub const FW_VERSION: u8 = 1;
pub const BUILD_NUMBER: i32 = 1;
