// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Descriptor views over caller-owned byte buffers.
//!
//! A descriptor is never a free-standing struct here. It is a window onto a
//! fixed-capacity buffer that the application owns (typically a `static`),
//! plus accessors that interpret the bytes at fixed offsets. The fixed-layout
//! part of each descriptor is declared as a `zerocopy` struct and copied in
//! and out of the buffer, so the wire format is spelled out in one place.
//!
//! Views are `Copy` and share the buffer through `Cell<u8>`. That lets a
//! composite descriptor (configuration, interface) hand out a view of its
//! unused tail with `begin_*`, have the caller fill it in, and then take it
//! back with `end_*` while both views are alive. `end_*` is the only way a
//! composite grows: it checks the child, checks the running length against
//! the buffer capacity, and only then advances the cursor and bumps the
//! count field in the parent header.

use core::cell::Cell;

use byteorder::LittleEndian;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use zerocopy::{AsBytes, FromBytes, LayoutVerified, Unaligned, U16};

use crate::config::MAX_ENDPOINTS;
use crate::error::{Error, Result};
use crate::setup::UsbDir;

/// Types of USB descriptor.
#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive)]
#[repr(u8)]
pub enum DescriptorType {
    Device = 0x01,
    Configuration = 0x02,
    String = 0x03,
    Interface = 0x04,
    Endpoint = 0x05,
    DeviceQualifier = 0x06,
    OtherSpeedConfiguration = 0x07,
    Bos = 0x0F,
}

/// Descriptor types of class-specific descriptors.
#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive)]
#[repr(u8)]
pub enum ClassSpecificType {
    Undefined = 0x20,
    Device = 0x21,
    Configuration = 0x22,
    String = 0x23,
    Interface = 0x24,
    Endpoint = 0x25,
}

/// Types of transfer that can be indicated by the `attributes` field of an
/// endpoint descriptor.
#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive)]
#[repr(u8)]
pub enum EndpointType {
    Control = 0,
    Isochronous = 1,
    Bulk = 2,
    Interrupt = 3,
}

impl EndpointType {
    pub const MASK: u8 = 0x03;

    pub fn of_attributes(attributes: u8) -> Self {
        match attributes & Self::MASK {
            0 => EndpointType::Control,
            1 => EndpointType::Isochronous,
            2 => EndpointType::Bulk,
            _ => EndpointType::Interrupt,
        }
    }
}

bitflags::bitflags! {
    /// `bmAttributes` of a configuration descriptor.
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub struct ConfigAttributes: u8 {
        /// Must always be set (bus powered, in USB 1.0 terms).
        const RESERVED_ONE = 0x80;
        const SELF_POWERED = 0x40;
        const REMOTE_WAKEUP = 0x20;
    }
}

/// Every descriptor starts with these two bytes.
#[repr(C)]
#[derive(Copy, Clone, Debug, AsBytes, FromBytes, Unaligned)]
struct Header {
    length: u8,
    descriptor_type: u8,
}

/// Describes a device. This is the most broad description in USB and is
/// typically the first thing the host asks for.
#[repr(C)]
#[derive(Copy, Clone, Debug, AsBytes, FromBytes, Unaligned)]
struct DeviceFields {
    /// Length of this structure, must be 18.
    length: u8,
    /// Type of this descriptor, must be `Device`.
    descriptor_type: u8,
    /// Version of the device descriptor / USB protocol, in binary-coded
    /// decimal. This is typically `0x02_00` for USB 2.0.
    bcd_usb: U16<LittleEndian>,
    /// Class of device, giving a broad functional area.
    device_class: u8,
    /// Subclass of device, refining the class.
    device_subclass: u8,
    /// Protocol within the subclass.
    device_protocol: u8,
    /// Maximum packet size of EP0: 8, 16, 32 or 64.
    max_packet_size0: u8,
    vendor: U16<LittleEndian>,
    product: U16<LittleEndian>,
    /// Device version number, as BCD again.
    bcd_device: U16<LittleEndian>,
    /// Index of manufacturer name in string descriptor table.
    manufacturer_s: u8,
    /// Index of product name in string descriptor table.
    product_s: u8,
    /// Index of serial number in string descriptor table.
    serial_s: u8,
    /// Number of configurations supported by this device.
    num_configurations: u8,
}

/// Description of a single available device configuration.
#[repr(C)]
#[derive(Copy, Clone, Debug, AsBytes, FromBytes, Unaligned)]
struct ConfigFields {
    length: u8,
    descriptor_type: u8,
    /// Total length of all descriptors in this configuration, concatenated.
    /// Doubles as the append cursor while the configuration is assembled.
    total_length: U16<LittleEndian>,
    num_interfaces: u8,
    /// Number to use when requesting this configuration via a
    /// `SetConfiguration` request.
    configuration_value: u8,
    configuration_s: u8,
    /// See `ConfigAttributes`.
    attributes: u8,
    /// Maximum device power consumption in units of 2mA.
    max_power: u8,
}

/// Description of an interface within a configuration.
#[repr(C)]
#[derive(Copy, Clone, Debug, AsBytes, FromBytes, Unaligned)]
struct InterfaceFields {
    length: u8,
    descriptor_type: u8,
    interface_number: u8,
    /// Allows a single `interface_number` to have several alternate interface
    /// settings, where each alternate increments this field.
    alternate_setting: u8,
    num_endpoints: u8,
    interface_class: u8,
    interface_subclass: u8,
    interface_protocol: u8,
    interface_s: u8,
}

/// Describes an endpoint within an interface.
#[repr(C)]
#[derive(Copy, Clone, Debug, AsBytes, FromBytes, Unaligned)]
struct EndpointFields {
    length: u8,
    descriptor_type: u8,
    /// Address of this endpoint, where the bottom 4 bits give the endpoint
    /// number (0..15) and the top bit distinguishes IN (1) from OUT (0).
    endpoint_address: u8,
    /// Transfer type in the bottom 2 bits; isochronous endpoints also carry
    /// sync and usage bits.
    attributes: u8,
    max_packet_size: U16<LittleEndian>,
    /// Polling interval for interrupt/isochronous endpoints, in frames.
    interval: u8,
}

static_assertions::const_assert_eq!(core::mem::size_of::<Header>(), 2);
static_assertions::const_assert_eq!(core::mem::size_of::<DeviceFields>(), DeviceDescriptor::SIZE);
static_assertions::const_assert_eq!(core::mem::size_of::<ConfigFields>(), ConfigDescriptor::SIZE);
static_assertions::const_assert_eq!(
    core::mem::size_of::<InterfaceFields>(),
    InterfaceDescriptor::SIZE
);
static_assertions::const_assert_eq!(
    core::mem::size_of::<EndpointFields>(),
    EndpointDescriptor::DEFAULT_LENGTH
);

/// Largest fixed-layout struct above; sizes the scratch copy in `load`.
const MAX_FIELDS: usize = DeviceDescriptor::SIZE;

////////////////////////////////////////////////////////////////////////////
// Generic descriptor view.

/// A view over a fixed-capacity descriptor buffer.
#[derive(Copy, Clone)]
pub struct Descriptor<'a> {
    data: &'a [Cell<u8>],
}

impl<'a> Descriptor<'a> {
    /// Wraps a caller-owned buffer. The capacity of the view is the length of
    /// the buffer.
    pub fn new(buf: &'a mut [u8]) -> Self {
        Descriptor { data: Cell::from_mut(buf).as_slice_of_cells() }
    }

    /// A view with no buffer behind it. `is_valid` is false and every `init`
    /// fails.
    pub fn empty() -> Self {
        let none: &'a mut [u8] = &mut [];
        Descriptor::new(none)
    }

    fn from_cells(data: &'a [Cell<u8>]) -> Self {
        Descriptor { data }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn is_valid(&self) -> bool {
        !self.data.is_empty()
    }

    /// Stamps the header. This is the only way to mark a descriptor as
    /// populated, and it refuses lengths the buffer cannot hold.
    pub fn init(&self, length: u8, descriptor_type: u8) -> Result<()> {
        let needed = usize::from(length);
        if needed > self.capacity() {
            return Err(Error::Overflow { needed, capacity: self.capacity() });
        }
        if needed < core::mem::size_of::<Header>() {
            return Err(Error::TooShort(length));
        }
        self.store(0, &Header { length, descriptor_type });
        Ok(())
    }

    pub fn b_length(&self) -> u8 {
        self.byte(0)
    }

    pub fn b_descriptor_type(&self) -> u8 {
        self.byte(1)
    }

    pub fn descriptor_type(&self) -> Option<DescriptorType> {
        DescriptorType::from_u8(self.b_descriptor_type())
    }

    /// Copies up to `out.len()` bytes of the buffer out, returning the count.
    pub fn copy_to(&self, out: &mut [u8]) -> usize {
        let n = out.len().min(self.capacity());
        for (dst, src) in out[..n].iter_mut().zip(self.data) {
            *dst = src.get();
        }
        n
    }

    /// The descriptor's own bytes, `bLength` of them.
    pub fn bytes(&self) -> impl Iterator<Item = u8> + 'a {
        let data = self.data;
        let len = usize::from(self.b_length()).min(data.len());
        data[..len].iter().map(Cell::get)
    }

    fn byte(&self, offset: usize) -> u8 {
        self.data.get(offset).map_or(0, Cell::get)
    }

    /// Writes `bytes` at `offset`. Callers have already bounds checked.
    fn write(&self, offset: usize, bytes: &[u8]) {
        for (dst, src) in self.data[offset..offset + bytes.len()].iter().zip(bytes) {
            dst.set(*src);
        }
    }

    fn store<T: AsBytes>(&self, offset: usize, fields: &T) {
        self.write(offset, fields.as_bytes());
    }

    /// Reads the fixed-layout part of the descriptor back out. Returns `None`
    /// if the buffer is too small to hold a `T`.
    fn load<T: FromBytes + Unaligned + Copy>(&self) -> Option<T> {
        let mut scratch = [0u8; MAX_FIELDS];
        let n = self.copy_to(&mut scratch);
        LayoutVerified::<_, T>::new_unaligned_from_prefix(&scratch[..n])
            .map(|(fields, _)| *fields)
    }

    /// View of everything past `offset`, or an empty view if nothing is left.
    fn tail(&self, offset: usize) -> Descriptor<'a> {
        match self.data.get(offset..) {
            Some(rest) if !rest.is_empty() => Descriptor::from_cells(rest),
            _ => Descriptor::empty(),
        }
    }

    /// The first `len` bytes only.
    fn truncated(&self, len: usize) -> Descriptor<'a> {
        Descriptor::from_cells(&self.data[..len.min(self.data.len())])
    }
}

impl core::fmt::Debug for Descriptor<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Descriptor")
            .field("capacity", &self.capacity())
            .field("b_length", &self.b_length())
            .field("b_descriptor_type", &self.b_descriptor_type())
            .finish()
    }
}

/// Checks a child view handed back to an `end_*` call: it must be the view
/// `begin_*` handed out at the parent's cursor, and carry the expected type
/// in its header.
fn check_child(
    child: &Descriptor<'_>,
    cursor: &Descriptor<'_>,
    expected: impl Fn(u8) -> bool,
) -> Result<u16> {
    if !child.is_valid() || child.b_length() == 0 || !expected(child.b_descriptor_type()) {
        return Err(Error::InvalidDescriptor);
    }
    if !core::ptr::eq(child.data.as_ptr(), cursor.data.as_ptr()) {
        return Err(Error::InvalidDescriptor);
    }
    Ok(u16::from(child.b_length()))
}

fn add_length(cursor: u16, child: u16, capacity: usize) -> Result<u16> {
    let needed = usize::from(cursor) + usize::from(child);
    if needed > capacity {
        return Err(Error::Overflow { needed, capacity });
    }
    Ok(needed as u16)
}

////////////////////////////////////////////////////////////////////////////
// Device descriptor.

/// Field values of a device descriptor, minus the header.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DeviceDescriptorInfo {
    pub bcd_usb: u16,
    pub device_class: u8,
    pub device_subclass: u8,
    pub device_protocol: u8,
    pub max_packet_size0: u8,
    pub vendor_id: u16,
    pub product_id: u16,
    pub bcd_device: u16,
    pub manufacturer: u8,
    pub product: u8,
    pub serial_number: u8,
    pub num_configurations: u8,
}

#[derive(Copy, Clone, Debug)]
pub struct DeviceDescriptor<'a>(Descriptor<'a>);

impl<'a> DeviceDescriptor<'a> {
    pub const SIZE: usize = 18;

    pub const USB_1_0: u16 = 0x0100;
    pub const USB_1_1: u16 = 0x0110;
    pub const USB_2_0: u16 = 0x0200;
    pub const USB_2_1: u16 = 0x0210;

    pub fn new(buf: &'a mut [u8]) -> Self {
        DeviceDescriptor(Descriptor::new(buf))
    }

    pub fn init(&self, info: &DeviceDescriptorInfo) -> Result<()> {
        self.0.init(Self::SIZE as u8, DescriptorType::Device as u8)?;
        self.0.store(0, &DeviceFields {
            length: Self::SIZE as u8,
            descriptor_type: DescriptorType::Device as u8,
            bcd_usb: U16::new(info.bcd_usb),
            device_class: info.device_class,
            device_subclass: info.device_subclass,
            device_protocol: info.device_protocol,
            max_packet_size0: info.max_packet_size0,
            vendor: U16::new(info.vendor_id),
            product: U16::new(info.product_id),
            bcd_device: U16::new(info.bcd_device),
            manufacturer_s: info.manufacturer,
            product_s: info.product,
            serial_s: info.serial_number,
            num_configurations: info.num_configurations,
        });
        Ok(())
    }

    /// Reads the fields back, if the descriptor has been initialized.
    pub fn info(&self) -> Option<DeviceDescriptorInfo> {
        if self.0.descriptor_type() != Some(DescriptorType::Device) {
            return None;
        }
        let f: DeviceFields = self.0.load()?;
        Some(DeviceDescriptorInfo {
            bcd_usb: f.bcd_usb.get(),
            device_class: f.device_class,
            device_subclass: f.device_subclass,
            device_protocol: f.device_protocol,
            max_packet_size0: f.max_packet_size0,
            vendor_id: f.vendor.get(),
            product_id: f.product.get(),
            bcd_device: f.bcd_device.get(),
            manufacturer: f.manufacturer_s,
            product: f.product_s,
            serial_number: f.serial_s,
            num_configurations: f.num_configurations,
        })
    }

    pub fn descriptor(&self) -> Descriptor<'a> {
        self.0
    }
}

////////////////////////////////////////////////////////////////////////////
// Endpoint descriptor.

#[derive(Copy, Clone, Debug)]
pub struct EndpointDescriptor<'a>(Descriptor<'a>);

impl<'a> EndpointDescriptor<'a> {
    /// Standard endpoint descriptor length. Audio class endpoints use 9.
    pub const DEFAULT_LENGTH: usize = 7;

    pub fn new(buf: &'a mut [u8]) -> Self {
        EndpointDescriptor(Descriptor::new(buf))
    }

    /// Fills in the descriptor. `length` may exceed `DEFAULT_LENGTH` for
    /// endpoints carrying class-defined trailing bytes, which are zeroed.
    pub fn init(
        &self,
        length: u8,
        address: u8,
        attributes: u8,
        max_packet_size: u16,
        interval: u8,
    ) -> Result<()> {
        if usize::from(length) < Self::DEFAULT_LENGTH {
            return Err(Error::TooShort(length));
        }
        self.0.init(length, DescriptorType::Endpoint as u8)?;
        self.0.store(0, &EndpointFields {
            length,
            descriptor_type: DescriptorType::Endpoint as u8,
            endpoint_address: address,
            attributes,
            max_packet_size: U16::new(max_packet_size),
            interval,
        });
        for offset in Self::DEFAULT_LENGTH..usize::from(length) {
            self.0.write(offset, &[0]);
        }
        Ok(())
    }

    /// As `init`, for an IN endpoint: the direction bit is forced on.
    pub fn init_in(
        &self,
        number: u8,
        attributes: u8,
        max_packet_size: u16,
        interval: u8,
    ) -> Result<()> {
        self.init(
            Self::DEFAULT_LENGTH as u8,
            UsbDir::In.endpoint(number),
            attributes,
            max_packet_size,
            interval,
        )
    }

    /// As `init`, for an OUT endpoint: the direction bit is forced off.
    pub fn init_out(
        &self,
        number: u8,
        attributes: u8,
        max_packet_size: u16,
        interval: u8,
    ) -> Result<()> {
        self.init(
            Self::DEFAULT_LENGTH as u8,
            UsbDir::Out.endpoint(number),
            attributes,
            max_packet_size,
            interval,
        )
    }

    fn fields(&self) -> Option<EndpointFields> {
        self.0.load()
    }

    pub fn b_endpoint_address(&self) -> u8 {
        self.fields().map_or(0, |f| f.endpoint_address)
    }

    pub fn bm_attributes(&self) -> u8 {
        self.fields().map_or(0, |f| f.attributes)
    }

    pub fn w_max_packet_size(&self) -> u16 {
        self.fields().map_or(0, |f| f.max_packet_size.get())
    }

    pub fn b_interval(&self) -> u8 {
        self.fields().map_or(0, |f| f.interval)
    }

    pub fn number(&self) -> u8 {
        self.b_endpoint_address() & 0x0F
    }

    pub fn direction(&self) -> UsbDir {
        UsbDir::of_endpoint_addr(self.b_endpoint_address())
    }

    pub fn transfer_type(&self) -> EndpointType {
        EndpointType::of_attributes(self.bm_attributes())
    }

    pub fn descriptor(&self) -> Descriptor<'a> {
        self.0
    }
}

////////////////////////////////////////////////////////////////////////////
// Class-specific descriptor.

/// A class-defined descriptor: the standard header followed by an opaque
/// payload.
#[derive(Copy, Clone, Debug)]
pub struct ClassSpecificDescriptor<'a>(Descriptor<'a>);

impl<'a> ClassSpecificDescriptor<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        ClassSpecificDescriptor(Descriptor::new(buf))
    }

    pub fn init(&self, length: u8, kind: ClassSpecificType) -> Result<()> {
        self.0.init(length, kind as u8)
    }

    /// Stamps a header sized for `payload` and copies the payload in after it.
    pub fn init_with(&self, kind: ClassSpecificType, payload: &[u8]) -> Result<()> {
        let needed = 2 + payload.len();
        let length = u8::try_from(needed)
            .map_err(|_| Error::Overflow { needed, capacity: usize::from(u8::MAX) })?;
        self.init(length, kind)?;
        self.0.write(2, payload);
        Ok(())
    }

    /// Overwrites the bytes after the header. The payload must fit within
    /// the `bLength` already stamped by `init`, and within the buffer.
    pub fn set_payload(&self, payload: &[u8]) -> Result<()> {
        let needed = 2 + payload.len();
        let length = usize::from(self.0.b_length()).min(self.0.capacity());
        if !self.0.is_valid() || needed > length {
            return Err(Error::Overflow { needed, capacity: length });
        }
        self.0.write(2, payload);
        Ok(())
    }

    pub fn descriptor(&self) -> Descriptor<'a> {
        self.0
    }
}

////////////////////////////////////////////////////////////////////////////
// String descriptor.

/// A string descriptor: the header followed by UTF-16LE code units.
///
/// Only ASCII text is supported. Each character becomes one code unit with
/// a zero high byte; anything else is refused rather than mangled.
#[derive(Copy, Clone, Debug)]
pub struct StringDescriptor<'a>(Descriptor<'a>);

impl<'a> StringDescriptor<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        StringDescriptor(Descriptor::new(buf))
    }

    /// Bytes needed to hold `text`.
    pub fn size_for(text: &str) -> usize {
        2 + 2 * text.len()
    }

    pub fn init(&self, text: &str) -> Result<()> {
        if !text.is_ascii() {
            return Err(Error::NonAscii);
        }
        let length = u8::try_from(Self::size_for(text))
            .map_err(|_| Error::StringTooLong(text.len()))?;
        self.0.init(length, DescriptorType::String as u8)?;
        for (i, c) in text.bytes().enumerate() {
            self.0.write(2 + 2 * i, &[c, 0]);
        }
        Ok(())
    }

    /// Descriptor zero: the list of supported language IDs.
    pub fn init_langids(&self, langids: &[u16]) -> Result<()> {
        let needed = 2 + 2 * langids.len();
        let length = u8::try_from(needed).map_err(|_| Error::StringTooLong(langids.len()))?;
        self.0.init(length, DescriptorType::String as u8)?;
        for (i, id) in langids.iter().enumerate() {
            self.0.write(2 + 2 * i, &id.to_le_bytes());
        }
        Ok(())
    }

    pub fn descriptor(&self) -> Descriptor<'a> {
        self.0
    }
}

fn is_class_specific(descriptor_type: u8) -> bool {
    ClassSpecificType::from_u8(descriptor_type).is_some()
}

////////////////////////////////////////////////////////////////////////////
// Interface descriptor.

/// Field values of an interface descriptor.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct InterfaceInfo {
    pub number: u8,
    pub alternate_setting: u8,
    pub class: u8,
    pub subclass: u8,
    pub protocol: u8,
    pub string: u8,
}

/// An interface descriptor followed by its class-specific and endpoint
/// descriptors.
///
/// The view tracks how many bytes of its buffer are in use, and remembers
/// every endpoint descriptor appended to it, by direction and number.
#[derive(Clone, Debug)]
pub struct InterfaceDescriptor<'a> {
    desc: Descriptor<'a>,
    total_length: u16,
    in_eps: [Option<EndpointDescriptor<'a>>; MAX_ENDPOINTS],
    out_eps: [Option<EndpointDescriptor<'a>>; MAX_ENDPOINTS],
}

impl<'a> InterfaceDescriptor<'a> {
    pub const SIZE: usize = 9;

    pub fn new(buf: &'a mut [u8]) -> Self {
        Self::from_descriptor(Descriptor::new(buf))
    }

    fn from_descriptor(desc: Descriptor<'a>) -> Self {
        InterfaceDescriptor {
            desc,
            total_length: 0,
            in_eps: [None; MAX_ENDPOINTS],
            out_eps: [None; MAX_ENDPOINTS],
        }
    }

    pub fn init(&mut self, info: &InterfaceInfo) -> Result<()> {
        self.desc.init(Self::SIZE as u8, DescriptorType::Interface as u8)?;
        self.desc.store(0, &InterfaceFields {
            length: Self::SIZE as u8,
            descriptor_type: DescriptorType::Interface as u8,
            interface_number: info.number,
            alternate_setting: info.alternate_setting,
            num_endpoints: 0,
            interface_class: info.class,
            interface_subclass: info.subclass,
            interface_protocol: info.protocol,
            interface_s: info.string,
        });
        self.total_length = Self::SIZE as u16;
        self.in_eps = [None; MAX_ENDPOINTS];
        self.out_eps = [None; MAX_ENDPOINTS];
        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.desc.is_valid()
    }

    /// Returns a view of the unused part of the buffer for a class-specific
    /// descriptor. Empty if the buffer is already full.
    pub fn begin_cs_descriptor(&self) -> ClassSpecificDescriptor<'a> {
        ClassSpecificDescriptor(self.next())
    }

    pub fn end_cs_descriptor(&mut self, cs: &ClassSpecificDescriptor<'_>) -> Result<()> {
        let len = check_child(&cs.0, &self.next(), is_class_specific)?;
        self.total_length = add_length(self.total_length, len, self.desc.capacity())?;
        Ok(())
    }

    /// Returns a view of the unused part of the buffer for an endpoint
    /// descriptor. Empty if the buffer is already full.
    pub fn begin_ep(&self) -> EndpointDescriptor<'a> {
        EndpointDescriptor(self.next())
    }

    /// Appends the endpoint and registers it in the IN or OUT lookup table,
    /// by the direction bit of its address.
    pub fn end_ep(&mut self, ep: &EndpointDescriptor<'a>) -> Result<()> {
        let len = check_child(&ep.0, &self.next(), |t| t == DescriptorType::Endpoint as u8)?;
        let address = ep.b_endpoint_address();
        let number = usize::from(address & 0x0F);
        if number >= MAX_ENDPOINTS {
            return Err(Error::EndpointOutOfRange(address));
        }
        let mut fields: InterfaceFields = self.desc.load().ok_or(Error::InvalidDescriptor)?;
        self.total_length = add_length(self.total_length, len, self.desc.capacity())?;
        fields.num_endpoints += 1;
        self.desc.store(0, &fields);

        let registered = EndpointDescriptor(ep.0.truncated(usize::from(len)));
        match UsbDir::of_endpoint_addr(address) {
            UsbDir::In => self.in_eps[number] = Some(registered),
            UsbDir::Out => self.out_eps[number] = Some(registered),
        }
        Ok(())
    }

    fn next(&self) -> Descriptor<'a> {
        if usize::from(self.total_length) >= self.desc.capacity() {
            return Descriptor::empty();
        }
        self.desc.tail(usize::from(self.total_length))
    }

    fn fields(&self) -> Option<InterfaceFields> {
        self.desc.load()
    }

    pub fn b_interface_number(&self) -> u8 {
        self.fields().map_or(0, |f| f.interface_number)
    }

    pub fn b_alternate_setting(&self) -> u8 {
        self.fields().map_or(0, |f| f.alternate_setting)
    }

    pub fn b_num_endpoints(&self) -> u8 {
        self.fields().map_or(0, |f| f.num_endpoints)
    }

    pub fn b_interface_class(&self) -> u8 {
        self.fields().map_or(0, |f| f.interface_class)
    }

    pub fn b_interface_subclass(&self) -> u8 {
        self.fields().map_or(0, |f| f.interface_subclass)
    }

    pub fn b_interface_protocol(&self) -> u8 {
        self.fields().map_or(0, |f| f.interface_protocol)
    }

    pub fn i_interface(&self) -> u8 {
        self.fields().map_or(0, |f| f.interface_s)
    }

    /// Bytes in use: this descriptor plus everything appended after it.
    pub fn total_length(&self) -> u16 {
        self.total_length
    }

    pub fn in_endpoint(&self, number: u8) -> Option<EndpointDescriptor<'a>> {
        self.in_eps.get(usize::from(number)).copied().flatten()
    }

    pub fn out_endpoint(&self, number: u8) -> Option<EndpointDescriptor<'a>> {
        self.out_eps.get(usize::from(number)).copied().flatten()
    }

    pub fn descriptor(&self) -> Descriptor<'a> {
        self.desc
    }
}

////////////////////////////////////////////////////////////////////////////
// Configuration descriptor.

/// A configuration descriptor and, after it in the same buffer, everything
/// the host receives along with it.
///
/// `wTotalLength` in the header is the append cursor.
#[derive(Copy, Clone, Debug)]
pub struct ConfigDescriptor<'a>(Descriptor<'a>);

impl<'a> ConfigDescriptor<'a> {
    pub const SIZE: usize = 9;

    pub fn new(buf: &'a mut [u8]) -> Self {
        ConfigDescriptor(Descriptor::new(buf))
    }

    pub fn init(
        &self,
        configuration_value: u8,
        string: u8,
        attributes: ConfigAttributes,
        max_power: u8,
    ) -> Result<()> {
        self.0.init(Self::SIZE as u8, DescriptorType::Configuration as u8)?;
        self.0.store(0, &ConfigFields {
            length: Self::SIZE as u8,
            descriptor_type: DescriptorType::Configuration as u8,
            total_length: U16::new(Self::SIZE as u16),
            num_interfaces: 0,
            configuration_value,
            configuration_s: string,
            attributes: (attributes | ConfigAttributes::RESERVED_ONE).bits(),
            max_power,
        });
        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.0.is_valid()
    }

    fn fields(&self) -> Option<ConfigFields> {
        if self.0.descriptor_type() != Some(DescriptorType::Configuration) {
            return None;
        }
        self.0.load()
    }

    pub fn w_total_length(&self) -> u16 {
        self.fields().map_or(0, |f| f.total_length.get())
    }

    pub fn b_num_interfaces(&self) -> u8 {
        self.fields().map_or(0, |f| f.num_interfaces)
    }

    pub fn b_configuration_value(&self) -> u8 {
        self.fields().map_or(0, |f| f.configuration_value)
    }

    pub fn i_configuration(&self) -> u8 {
        self.fields().map_or(0, |f| f.configuration_s)
    }

    pub fn bm_attributes(&self) -> ConfigAttributes {
        ConfigAttributes::from_bits_retain(self.fields().map_or(0, |f| f.attributes))
    }

    pub fn b_max_power(&self) -> u8 {
        self.fields().map_or(0, |f| f.max_power)
    }

    /// Returns a view of the unused part of the buffer for the next
    /// interface. Empty if the configuration is full or uninitialized.
    pub fn begin_interface(&self) -> InterfaceDescriptor<'a> {
        InterfaceDescriptor::from_descriptor(self.next())
    }

    /// Appends a finished interface (with its endpoints and class-specific
    /// descriptors) to the configuration.
    pub fn end_interface(&self, iface: &InterfaceDescriptor<'_>) -> Result<()> {
        check_child(&iface.desc, &self.next(), |t| t == DescriptorType::Interface as u8)?;
        self.grow(iface.total_length(), true)
    }

    /// Returns a view of the unused part of the buffer for a class-specific
    /// descriptor at configuration level, such as an interface association.
    pub fn begin_cs_descriptor(&self) -> ClassSpecificDescriptor<'a> {
        ClassSpecificDescriptor(self.next())
    }

    pub fn end_cs_descriptor(&self, cs: &ClassSpecificDescriptor<'_>) -> Result<()> {
        let len = check_child(&cs.0, &self.next(), |_| true)?;
        self.grow(len, false)
    }

    fn grow(&self, len: u16, interface: bool) -> Result<()> {
        let mut fields = self.fields().ok_or(Error::InvalidDescriptor)?;
        let total = add_length(fields.total_length.get(), len, self.0.capacity())?;
        fields.total_length.set(total);
        if interface {
            fields.num_interfaces += 1;
        }
        self.0.store(0, &fields);
        Ok(())
    }

    fn next(&self) -> Descriptor<'a> {
        let total = usize::from(self.w_total_length());
        if total == 0 || total >= self.0.capacity() {
            return Descriptor::empty();
        }
        self.0.tail(total)
    }

    /// Copies `wTotalLength` bytes (or as many as fit) into `out`.
    pub fn copy_to(&self, out: &mut [u8]) -> usize {
        let total = usize::from(self.w_total_length()).min(out.len());
        self.0.copy_to(&mut out[..total])
    }

    pub fn descriptor(&self) -> Descriptor<'a> {
        self.0
    }
}
