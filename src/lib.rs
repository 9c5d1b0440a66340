// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device-side USB 2.0 control logic.
//!
//! This crate answers the host during enumeration and carries class requests
//! to the drivers behind each interface. It decodes SETUP packets, runs the
//! EP0 control transfer state machine, dispatches the standard requests, and
//! assembles the descriptors the host reads, byte for byte as chapter 9 of
//! the USB 2.0 specification lays them out.
//!
//! It touches no hardware. A controller driver implements `UsbHardware` and
//! forwards controller events (SETUP received, packet sent, packet received,
//! bus reset, ...) to the `on_*` methods of a `Device`, all from one context.
//!
//! Setting up a device goes roughly like this:
//!
//! - Create a `Device` around the controller driver and `init` it with the
//!   fields of the device descriptor.
//! - For each configuration, wrap a buffer in a `ConfigDescriptor`, build its
//!   interfaces and endpoints with the `begin_*`/`end_*` pairs, and register
//!   a `UsbInterface` for each interface with `Configuration::end_interface`.
//! - `add_config` the configurations and let the controller attach.
//!
//! Only full and low speed devices are described: DEVICE_QUALIFIER and
//! OTHER_SPEED_CONFIGURATION requests stall. String descriptors carry ASCII
//! text only.
//!
//! Heap allocation happens only while the device is set up (string
//! descriptors and boxed interface drivers), never from an event.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod config;
pub mod configuration;
pub mod control;
pub mod descriptor;
pub mod device;
pub mod endpoint;
pub mod error;
pub mod hal;
pub mod setup;

#[cfg(test)]
mod mock;

pub use configuration::{Configuration, UsbInterface};
pub use control::{Control, ControlEndpoint, ControlHandler, Ep0State};
pub use descriptor::{
    ClassSpecificDescriptor, ClassSpecificType, ConfigAttributes, ConfigDescriptor, Descriptor,
    DescriptorType,
    DeviceDescriptor, EndpointDescriptor, EndpointType, InterfaceDescriptor, InterfaceInfo,
    StringDescriptor,
};
pub use device::{Device, DeviceInfo, DeviceState, DeviceStatus};
pub use endpoint::{Endpoint, EndpointIo, EndpointStatus, EndpointTable, InEndpoint, OutEndpoint};
pub use error::{Error, Result};
pub use hal::UsbHardware;
pub use setup::{Feature, Recipient, Request, RequestKind, SetupPacket, UsbDir};
