// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use thiserror::Error;

/// Failures reported while building descriptors and registering device
/// components.
///
/// These are all configuration-time faults. Errors caused by the host at
/// run time are never returned; they stall EP0 instead.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Error)]
pub enum Error {
    /// A descriptor or fragment would not fit in its buffer.
    #[error("{needed} bytes do not fit in a {capacity} byte descriptor buffer")]
    Overflow { needed: usize, capacity: usize },
    /// A descriptor length smaller than its own 2-byte header.
    #[error("descriptor length {0} is shorter than the descriptor header")]
    TooShort(u8),
    /// The view is empty, or holds a descriptor of the wrong type.
    #[error("invalid or uninitialized descriptor")]
    InvalidDescriptor,
    /// Endpoint number does not fit the endpoint lookup tables.
    #[error("endpoint address {0:#04x} is out of range")]
    EndpointOutOfRange(u8),
    /// Every string descriptor slot is in use.
    #[error("string descriptor table is full")]
    StringTableFull,
    /// String descriptors only carry ASCII text.
    #[error("string descriptors only support ASCII text")]
    NonAscii,
    /// Text too long to encode in a single string descriptor.
    #[error("string of {0} characters does not fit in a string descriptor")]
    StringTooLong(usize),
    /// Interface number out of range or already registered.
    #[error("interface slot {0} is out of range or already taken")]
    InterfaceSlot(u8),
    /// No configuration registered under this value.
    #[error("no configuration with value {0}")]
    NoConfiguration(u8),
    /// The configuration has no interface with this number.
    #[error("no interface {0} in this configuration")]
    NoInterface(u8),
    /// Transfer requested on an endpoint that is not open.
    #[error("endpoint {0:#04x} is not open")]
    EndpointClosed(u8),
    /// A control data stage larger than the EP0 staging buffer.
    #[error("control transfer of {0} bytes exceeds the EP0 buffer")]
    ControlOverflow(usize),
}

pub type Result<T> = core::result::Result<T, Error>;
