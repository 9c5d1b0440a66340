// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Endpoint state and the per-direction transfer primitives.
//!
//! An endpoint here holds no transfer buffers. It remembers what it was
//! described as, whether it is open, and whether it is halted, and forwards
//! every operation to the hardware.

use core::ops::{Deref, DerefMut};

use crate::config::MAX_ENDPOINTS;
use crate::descriptor::EndpointType;
use crate::error::{Error, Result};
use crate::hal::UsbHardware;
use crate::setup::UsbDir;

bitflags::bitflags! {
    /// Status word reported by GET_STATUS on an endpoint.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
    pub struct EndpointStatus: u16 {
        const HALTED = 0x0001;
    }
}

#[derive(Clone, Debug)]
pub struct Endpoint {
    address: u8,
    attributes: u8,
    max_packet_size: u16,
    interval: u8,
    status: EndpointStatus,
    opened: bool,
    /// Number of the interface this endpoint belongs to; `None` for EP0.
    iface: Option<u8>,
}

impl Endpoint {
    pub fn new(
        address: u8,
        attributes: u8,
        max_packet_size: u16,
        interval: u8,
        iface: Option<u8>,
    ) -> Self {
        Endpoint {
            address,
            attributes,
            max_packet_size,
            interval,
            status: EndpointStatus::empty(),
            opened: false,
            iface,
        }
    }

    /// Opens the endpoint in hardware. Opening an open endpoint does nothing.
    pub fn open<H: UsbHardware>(&mut self, hw: &mut H) {
        if !self.opened {
            hw.open_endpoint(self.address, self.max_packet_size, self.transfer_type());
            self.opened = true;
        }
    }

    /// Closes the endpoint in hardware. Closing a closed endpoint does nothing.
    pub fn close<H: UsbHardware>(&mut self, hw: &mut H) {
        if self.opened {
            hw.close_endpoint(self.address);
            self.opened = false;
        }
    }

    /// Forgets hardware state after a bus reset, which disables every
    /// endpoint and clears every halt in the controller.
    pub(crate) fn bus_reset(&mut self) {
        self.opened = false;
        self.status = EndpointStatus::empty();
    }

    /// Drops the halt bit without touching the hardware. For EP0, whose
    /// stall the controller lifts by itself when the next SETUP arrives.
    pub(crate) fn clear_protocol_stall(&mut self) {
        self.status.remove(EndpointStatus::HALTED);
    }

    pub fn stall<H: UsbHardware>(&mut self, hw: &mut H) {
        hw.stall(self.address);
        self.status.insert(EndpointStatus::HALTED);
    }

    pub fn clear_stall<H: UsbHardware>(&mut self, hw: &mut H) {
        hw.clear_stall(self.address);
        self.status.remove(EndpointStatus::HALTED);
    }

    pub fn flush<H: UsbHardware>(&mut self, hw: &mut H) {
        hw.flush(self.address);
    }

    /// The 2-byte status word, as it goes over the wire.
    pub fn status_bytes(&self) -> [u8; 2] {
        self.status.bits().to_le_bytes()
    }

    pub fn status(&self) -> EndpointStatus {
        self.status
    }

    pub fn is_stalled(&self) -> bool {
        self.status.contains(EndpointStatus::HALTED)
    }

    pub fn is_open(&self) -> bool {
        self.opened
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    pub fn number(&self) -> u8 {
        self.address & 0x0F
    }

    pub fn direction(&self) -> UsbDir {
        UsbDir::of_endpoint_addr(self.address)
    }

    pub fn attributes(&self) -> u8 {
        self.attributes
    }

    pub fn transfer_type(&self) -> EndpointType {
        EndpointType::of_attributes(self.attributes)
    }

    pub fn max_packet_size(&self) -> u16 {
        self.max_packet_size
    }

    pub fn interval(&self) -> u8 {
        self.interval
    }

    pub fn iface(&self) -> Option<u8> {
        self.iface
    }
}

/// An endpoint that sends data to the host.
#[derive(Clone, Debug)]
pub struct InEndpoint(Endpoint);

impl InEndpoint {
    pub fn new(
        number: u8,
        attributes: u8,
        max_packet_size: u16,
        interval: u8,
        iface: Option<u8>,
    ) -> Self {
        let address = UsbDir::In.endpoint(number);
        InEndpoint(Endpoint::new(address, attributes, max_packet_size, interval, iface))
    }

    pub fn transmit<H: UsbHardware>(&self, hw: &mut H, data: &[u8]) {
        hw.transmit(self.0.address, data);
    }
}

/// An endpoint that receives data from the host.
#[derive(Clone, Debug)]
pub struct OutEndpoint(Endpoint);

impl OutEndpoint {
    pub fn new(
        number: u8,
        attributes: u8,
        max_packet_size: u16,
        interval: u8,
        iface: Option<u8>,
    ) -> Self {
        let address = UsbDir::Out.endpoint(number);
        OutEndpoint(Endpoint::new(address, attributes, max_packet_size, interval, iface))
    }

    pub fn receive<H: UsbHardware>(&self, hw: &mut H, len: usize) {
        hw.receive(self.0.address, len);
    }
}

impl Deref for InEndpoint {
    type Target = Endpoint;

    fn deref(&self) -> &Endpoint {
        &self.0
    }
}

impl DerefMut for InEndpoint {
    fn deref_mut(&mut self) -> &mut Endpoint {
        &mut self.0
    }
}

impl Deref for OutEndpoint {
    type Target = Endpoint;

    fn deref(&self) -> &Endpoint {
        &self.0
    }
}

impl DerefMut for OutEndpoint {
    fn deref_mut(&mut self) -> &mut Endpoint {
        &mut self.0
    }
}

/// The device's IN and OUT endpoint tables, indexed by endpoint number.
///
/// Slot 0 is always empty: EP0 lives in the control endpoint.
#[derive(Debug)]
pub struct EndpointTable {
    ins: [Option<InEndpoint>; MAX_ENDPOINTS],
    outs: [Option<OutEndpoint>; MAX_ENDPOINTS],
}

impl Default for EndpointTable {
    fn default() -> Self {
        Self::new()
    }
}

impl EndpointTable {
    pub const fn new() -> Self {
        const NO_IN: Option<InEndpoint> = None;
        const NO_OUT: Option<OutEndpoint> = None;
        EndpointTable {
            ins: [NO_IN; MAX_ENDPOINTS],
            outs: [NO_OUT; MAX_ENDPOINTS],
        }
    }

    /// Installs `ep` in IN slot `number`, closing whatever was there before
    /// and opening the newcomer.
    pub fn set_in<H: UsbHardware>(&mut self, hw: &mut H, number: u8, ep: Option<InEndpoint>) {
        let n = usize::from(number);
        assert!(n > 0 && n < MAX_ENDPOINTS, "IN endpoint slot {} out of range", n);
        if let Some(old) = self.ins[n].as_mut() {
            old.close(hw);
        }
        self.ins[n] = ep;
        if let Some(new) = self.ins[n].as_mut() {
            new.open(hw);
        }
    }

    /// OUT counterpart of `set_in`.
    pub fn set_out<H: UsbHardware>(&mut self, hw: &mut H, number: u8, ep: Option<OutEndpoint>) {
        let n = usize::from(number);
        assert!(n > 0 && n < MAX_ENDPOINTS, "OUT endpoint slot {} out of range", n);
        if let Some(old) = self.outs[n].as_mut() {
            old.close(hw);
        }
        self.outs[n] = ep;
        if let Some(new) = self.outs[n].as_mut() {
            new.open(hw);
        }
    }

    pub fn get_in(&self, number: u8) -> Option<&InEndpoint> {
        self.ins.get(usize::from(number)).and_then(Option::as_ref)
    }

    pub fn get_out(&self, number: u8) -> Option<&OutEndpoint> {
        self.outs.get(usize::from(number)).and_then(Option::as_ref)
    }

    /// Looks an endpoint up by address, direction bit included.
    pub fn get_mut(&mut self, address: u8) -> Option<&mut Endpoint> {
        let n = usize::from(address & 0x0F);
        match UsbDir::of_endpoint_addr(address) {
            UsbDir::In => self.ins.get_mut(n).and_then(Option::as_mut).map(|ep| &mut **ep),
            UsbDir::Out => self.outs.get_mut(n).and_then(Option::as_mut).map(|ep| &mut **ep),
        }
    }

    pub fn get(&self, address: u8) -> Option<&Endpoint> {
        let n = usize::from(address & 0x0F);
        match UsbDir::of_endpoint_addr(address) {
            UsbDir::In => self.get_in(n as u8).map(|ep| &**ep),
            UsbDir::Out => self.get_out(n as u8).map(|ep| &**ep),
        }
    }

    /// Closes and removes every endpoint owned by interface `iface`.
    pub fn release_iface<H: UsbHardware>(&mut self, hw: &mut H, iface: u8) {
        for n in 1..MAX_ENDPOINTS as u8 {
            if self.get_in(n).and_then(|ep| ep.iface()) == Some(iface) {
                self.set_in(hw, n, None);
            }
            if self.get_out(n).and_then(|ep| ep.iface()) == Some(iface) {
                self.set_out(hw, n, None);
            }
        }
    }
}

/// Access to the class endpoints, handed to interface callbacks so they can
/// move data on the endpoints they own.
pub struct EndpointIo<'x, H: UsbHardware> {
    hw: &'x mut H,
    table: &'x mut EndpointTable,
}

impl<'x, H: UsbHardware> EndpointIo<'x, H> {
    pub fn new(hw: &'x mut H, table: &'x mut EndpointTable) -> Self {
        EndpointIo { hw, table }
    }

    /// Queues `data` for the host on IN endpoint `address`.
    pub fn transmit(&mut self, address: u8, data: &[u8]) -> Result<()> {
        match self.table.get_in(address & 0x0F) {
            Some(ep) if ep.is_open() && UsbDir::of_endpoint_addr(address) == UsbDir::In => {
                ep.transmit(self.hw, data);
                Ok(())
            }
            _ => Err(Error::EndpointClosed(address)),
        }
    }

    /// Arms OUT endpoint `address` to receive up to `len` bytes.
    pub fn receive(&mut self, address: u8, len: usize) -> Result<()> {
        match self.table.get_out(address & 0x0F) {
            Some(ep) if ep.is_open() && UsbDir::of_endpoint_addr(address) == UsbDir::Out => {
                ep.receive(self.hw, len);
                Ok(())
            }
            _ => Err(Error::EndpointClosed(address)),
        }
    }

    pub fn stall(&mut self, address: u8) -> Result<()> {
        let ep = self.table.get_mut(address).ok_or(Error::EndpointClosed(address))?;
        ep.stall(self.hw);
        Ok(())
    }

    pub fn flush(&mut self, address: u8) -> Result<()> {
        let ep = self.table.get_mut(address).ok_or(Error::EndpointClosed(address))?;
        ep.flush(self.hw);
        Ok(())
    }

    pub fn endpoint(&self, address: u8) -> Option<&Endpoint> {
        self.table.get(address)
    }
}
