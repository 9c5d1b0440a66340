// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Compile-time limits of the stack.
//!
//! Everything here sizes a fixed table or buffer. Nothing grows at run time.

/// Maximum packet size of endpoint 0, as advertised in the device
/// descriptor. Full-speed devices may use 8, 16, 32 or 64.
pub const EP0_MAX_PACKET_SIZE: u16 = 64;

/// Number of configuration slots. Configuration values `1..=MAX_CONFIGS`
/// can be registered; value 0 means "not configured".
pub const MAX_CONFIGS: usize = 2;

/// Number of string descriptor slots, including slot 0 (language IDs).
pub const MAX_STRINGS: usize = 16;

/// Number of interfaces a single configuration can hold.
pub const MAX_INTERFACES: usize = 4;

/// Size of the IN and OUT endpoint tables, EP0 included.
pub const MAX_ENDPOINTS: usize = 8;

/// Largest data stage EP0 can stage in either direction.
pub const CONTROL_BUFFER_SIZE: usize = 512;

/// Language ID placed in string descriptor 0 (English, United States).
pub const LANGID_EN_US: u16 = 0x0409;
