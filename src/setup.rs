// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! SETUP packet layout and the request codes carried in it.

use byteorder::LittleEndian;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use zerocopy::{AsBytes, FromBytes, LayoutVerified, Unaligned, U16};

/// USB deals in two different transfer directions, called OUT (host-to-device)
/// and IN (device-to-host). In the vast majority of cases, OUT is represented
/// by a 0 byte, and IN by an `0x80` byte.
#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive)]
pub enum UsbDir {
    Out = 0,
    In = 0x80,
}

impl UsbDir {
    pub const fn endpoint(self, num: u8) -> u8 {
        (num & 0x0F) | self as u8
    }

    pub const fn of_endpoint_addr(addr: u8) -> Self {
        if addr & Self::In as u8 != 0 {
            Self::In
        } else {
            Self::Out
        }
    }
}

/// Endpoint addresses of the control endpoint.
pub const EP0_IN_ADDR: u8 = UsbDir::In.endpoint(0);
pub const EP0_OUT_ADDR: u8 = UsbDir::Out.endpoint(0);

/// Target of a request, from the bottom bits of `request_type`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive)]
pub enum Recipient {
    Device = 0x00,
    Interface = 0x01,
    Endpoint = 0x02,
    Other = 0x03,
}

/// Who defines the meaning of a request, from bits 5..6 of `request_type`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive)]
pub enum RequestKind {
    Standard = 0x00,
    Class = 0x20,
    Vendor = 0x40,
    Reserved = 0x60,
}

impl RequestKind {
    pub const MASK: u8 = 0x60;
}

/// Standard request codes.
#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive)]
pub enum Request {
    GetStatus = 0x00,
    ClearFeature = 0x01,
    SetFeature = 0x03,
    /// Notifies the device that it's being moved to a different address on the
    /// bus. Always an OUT.
    SetAddress = 0x05,
    /// Asks the device to send a certain descriptor back to the host. Always
    /// used on an IN request.
    GetDescriptor = 0x06,
    SetDescriptor = 0x07,
    GetConfiguration = 0x08,
    /// Configures a device by choosing one of the options listed in its
    /// descriptors. Always an OUT.
    SetConfiguration = 0x09,
    GetInterface = 0x0A,
    SetInterface = 0x0B,
    SynchFrame = 0x0C,
}

/// Feature selectors for SET_FEATURE / CLEAR_FEATURE.
#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive)]
pub enum Feature {
    EndpointHalt = 0,
    RemoteWakeup = 1,
    TestMode = 2,
}

/// Layout of an 8-byte USB SETUP packet.
///
/// The 16-bit fields go over the wire low byte first, so they are stored as
/// little-endian and read back through `get`.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, AsBytes, FromBytes, Unaligned)]
pub struct SetupPacket {
    /// Direction in bit 7, `RequestKind` in bits 5..6, `Recipient` in bits
    /// 0..4.
    pub request_type: u8,
    /// Request. Standard setup requests are in the `Request` enum; classes and
    /// vendors define their own.
    pub request: u8,
    /// A simple argument of up to 16 bits, specific to the request.
    pub value: U16<LittleEndian>,
    /// Usually an interface number or endpoint address.
    pub index: U16<LittleEndian>,
    /// If data will be transferred after this request (in the direction given
    /// by `request_type`), this gives the number of bytes (OUT) or maximum
    /// number of bytes (IN).
    pub length: U16<LittleEndian>,
}

static_assertions::const_assert_eq!(core::mem::size_of::<SetupPacket>(), SetupPacket::SIZE);

impl SetupPacket {
    pub const SIZE: usize = 8;

    /// Reinterprets the raw bytes of a SETUP stage. Returns `None` unless
    /// given exactly 8 bytes.
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        LayoutVerified::<_, SetupPacket>::new_unaligned(bytes).map(|setup| *setup)
    }

    pub fn new(request_type: u8, request: u8, value: u16, index: u16, length: u16) -> Self {
        SetupPacket {
            request_type,
            request,
            value: U16::new(value),
            index: U16::new(index),
            length: U16::new(length),
        }
    }

    pub fn value(&self) -> u16 {
        self.value.get()
    }

    pub fn index(&self) -> u16 {
        self.index.get()
    }

    pub fn length(&self) -> u16 {
        self.length.get()
    }

    pub fn direction(&self) -> UsbDir {
        UsbDir::of_endpoint_addr(self.request_type)
    }

    pub fn recipient(&self) -> Option<Recipient> {
        Recipient::from_u8(self.request_type & 0x1F)
    }

    pub fn kind(&self) -> RequestKind {
        match self.request_type & RequestKind::MASK {
            0x00 => RequestKind::Standard,
            0x20 => RequestKind::Class,
            0x40 => RequestKind::Vendor,
            _ => RequestKind::Reserved,
        }
    }

    /// The standard request this packet carries, if it is one we know.
    pub fn standard_request(&self) -> Option<Request> {
        Request::from_u8(self.request)
    }

    /// Descriptor type and index of a GET_DESCRIPTOR request: the type is in
    /// the _top_ 8 bits of `value`, the index in the bottom 8.
    pub fn descriptor_type_and_index(&self) -> (u8, u8) {
        let value = self.value();
        ((value >> 8) as u8, value as u8)
    }

    /// Bottom byte of `index`, used as interface number or endpoint address.
    pub fn index_low(&self) -> u8 {
        self.index() as u8
    }
}
