// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Configurations, and the class drivers behind their interfaces.

use alloc::boxed::Box;

use log::debug;

use crate::config::{MAX_ENDPOINTS, MAX_INTERFACES};
use crate::control::Control;
use crate::descriptor::{ConfigDescriptor, InterfaceDescriptor};
use crate::endpoint::{EndpointIo, EndpointTable, InEndpoint, OutEndpoint};
use crate::error::{Error, Result};
use crate::hal::UsbHardware;
use crate::setup::{Feature, Recipient, SetupPacket};

/// A class driver: the code behind one interface.
///
/// Only class and vendor requests reach an interface; standard requests are
/// answered by the device. All methods run in the same event context as the
/// rest of the stack and must return promptly.
pub trait UsbInterface<H: UsbHardware> {
    /// Handles a class or vendor request addressed to this interface (or,
    /// when this is the default interface, to the device).
    ///
    /// Returning `false` stalls the request. When returning `true` the
    /// interface either starts the data stage itself through `ctl`, or leaves
    /// it to the stack: requests without data are acknowledged, and an OUT
    /// data stage is received and delivered to `on_control_data_received`.
    fn handle_class_or_vendor_request(
        &mut self,
        req: &SetupPacket,
        ctl: &mut Control<'_, H>,
    ) -> bool;

    fn on_control_data_received(&mut self, _req: &SetupPacket, _data: &[u8]) {}

    fn on_control_data_sent(&mut self, _req: &SetupPacket) {}

    /// Class or vendor request aimed at one of this interface's endpoints.
    fn handle_endpoint_request(
        &mut self,
        _address: u8,
        _req: &SetupPacket,
        _ctl: &mut Control<'_, H>,
    ) -> bool {
        false
    }

    /// The interface's endpoints have just been opened.
    fn on_activate(&mut self, _io: &mut EndpointIo<'_, H>) {}

    /// The interface's endpoints have just been closed.
    fn on_deactivate(&mut self) {}

    /// A packet queued on IN endpoint `address` has been sent.
    fn on_data_in(&mut self, _address: u8, _io: &mut EndpointIo<'_, H>) {}

    /// `data` arrived on OUT endpoint `address`. The endpoint must be armed
    /// again to receive more.
    fn on_data_out(&mut self, _address: u8, _data: &[u8], _io: &mut EndpointIo<'_, H>) {}

    fn on_start_of_frame(&mut self) {}

    /// The host set or cleared a device feature.
    fn on_device_feature(&mut self, _feature: Feature, _enabled: bool) {}

    fn on_iso_in_incomplete(&mut self, _address: u8) {}

    fn on_iso_out_incomplete(&mut self, _address: u8) {}
}

struct Interface<'a, H: UsbHardware> {
    descriptor: InterfaceDescriptor<'a>,
    driver: Box<dyn UsbInterface<H> + 'a>,
}

/// One configuration: its descriptor and the interfaces registered into it.
pub struct Configuration<'a, H: UsbHardware> {
    descriptor: ConfigDescriptor<'a>,
    interfaces: [Option<Interface<'a, H>>; MAX_INTERFACES],
    /// Interface that receives EP0 data hooks and device-level events.
    /// `Some` while the configuration is active.
    current: Option<u8>,
}

impl<'a, H: UsbHardware> Configuration<'a, H> {
    /// Interface brought up when the configuration is selected.
    pub const DEFAULT_IFACE: u8 = 0;

    pub fn new(descriptor: ConfigDescriptor<'a>) -> Self {
        Configuration {
            descriptor,
            interfaces: core::array::from_fn(|_| None),
            current: None,
        }
    }

    pub fn descriptor(&self) -> &ConfigDescriptor<'a> {
        &self.descriptor
    }

    pub fn value(&self) -> u8 {
        self.descriptor.b_configuration_value()
    }

    pub fn begin_interface(&self) -> InterfaceDescriptor<'a> {
        self.descriptor.begin_interface()
    }

    /// Appends a finished interface to the configuration descriptor and
    /// registers `driver` to serve it.
    ///
    /// Fails if the interface number is out of range or already taken, or if
    /// the descriptor has no room left; in each case nothing is registered.
    pub fn end_interface(
        &mut self,
        descriptor: InterfaceDescriptor<'a>,
        driver: impl UsbInterface<H> + 'a,
    ) -> Result<()> {
        let number = descriptor.b_interface_number();
        let slot = usize::from(number);
        if slot >= MAX_INTERFACES || self.interfaces[slot].is_some() {
            return Err(Error::InterfaceSlot(number));
        }
        self.descriptor.end_interface(&descriptor)?;
        self.interfaces[slot] = Some(Interface {
            descriptor,
            driver: Box::new(driver),
        });
        Ok(())
    }

    pub fn has_interface(&self, number: u8) -> bool {
        self.interface(number).is_some()
    }

    pub fn is_active(&self) -> bool {
        self.current.is_some()
    }

    pub fn current_iface(&self) -> Option<u8> {
        self.current
    }

    fn interface(&self, number: u8) -> Option<&Interface<'a, H>> {
        self.interfaces.get(usize::from(number)).and_then(Option::as_ref)
    }

    fn interface_mut(&mut self, number: u8) -> Option<&mut Interface<'a, H>> {
        self.interfaces.get_mut(usize::from(number)).and_then(Option::as_mut)
    }

    fn current_mut(&mut self) -> Option<&mut Interface<'a, H>> {
        let n = self.current?;
        self.interface_mut(n)
    }

    /// Publishes interface `number`'s endpoints into the device tables, opens
    /// them, and makes it the current interface.
    pub fn init_iface(&mut self, number: u8, table: &mut EndpointTable, hw: &mut H) -> Result<()> {
        let iface = self.interface_mut(number).ok_or(Error::NoInterface(number))?;
        for n in 1..MAX_ENDPOINTS as u8 {
            if let Some(ep) = iface.descriptor.in_endpoint(n) {
                let ep = InEndpoint::new(
                    n,
                    ep.bm_attributes(),
                    ep.w_max_packet_size(),
                    ep.b_interval(),
                    Some(number),
                );
                table.set_in(hw, n, Some(ep));
            }
            if let Some(ep) = iface.descriptor.out_endpoint(n) {
                let ep = OutEndpoint::new(
                    n,
                    ep.bm_attributes(),
                    ep.w_max_packet_size(),
                    ep.b_interval(),
                    Some(number),
                );
                table.set_out(hw, n, Some(ep));
            }
        }
        debug!("interface {} up", number);
        iface.driver.on_activate(&mut EndpointIo::new(hw, table));
        self.current = Some(number);
        Ok(())
    }

    pub fn init_default_iface(&mut self, table: &mut EndpointTable, hw: &mut H) -> Result<()> {
        self.init_iface(Self::DEFAULT_IFACE, table, hw)
    }

    /// Closes the current interface's endpoints and tells it so.
    pub fn deinit(&mut self, table: &mut EndpointTable, hw: &mut H) {
        let Some(number) = self.current.take() else {
            return;
        };
        table.release_iface(hw, number);
        if let Some(iface) = self.interface_mut(number) {
            debug!("interface {} down", number);
            iface.driver.on_deactivate();
        }
    }

    pub fn alternate_setting(&self, number: u8) -> Option<u8> {
        self.interface(number).map(|i| i.descriptor.b_alternate_setting())
    }

    /// Offers a class or vendor request to interface `number`.
    pub fn setup_request(
        &mut self,
        number: u8,
        req: &SetupPacket,
        ctl: &mut Control<'_, H>,
    ) -> bool {
        match self.interface_mut(number) {
            Some(iface) => iface.driver.handle_class_or_vendor_request(req, ctl),
            None => false,
        }
    }

    /// Offers a class or vendor request for endpoint `address` to the
    /// interface that owns it.
    pub fn endpoint_request(
        &mut self,
        owner: u8,
        address: u8,
        req: &SetupPacket,
        ctl: &mut Control<'_, H>,
    ) -> bool {
        match self.interface_mut(owner) {
            Some(iface) => iface.driver.handle_endpoint_request(address, req, ctl),
            None => false,
        }
    }

    /// Interface an EP0 data stage belongs to: the one the request named, or
    /// the current interface for requests aimed elsewhere.
    fn data_stage_target(&mut self, req: &SetupPacket) -> Option<&mut Interface<'a, H>> {
        if req.recipient() == Some(Recipient::Interface) && self.has_interface(req.index_low()) {
            self.interface_mut(req.index_low())
        } else {
            self.current_mut()
        }
    }

    pub fn ep0_rx_ready(&mut self, req: &SetupPacket, data: &[u8]) {
        if let Some(iface) = self.data_stage_target(req) {
            iface.driver.on_control_data_received(req, data);
        }
    }

    pub fn ep0_tx_sent(&mut self, req: &SetupPacket) {
        if let Some(iface) = self.data_stage_target(req) {
            iface.driver.on_control_data_sent(req);
        }
    }

    pub fn data_in(&mut self, owner: u8, address: u8, table: &mut EndpointTable, hw: &mut H) {
        if let Some(iface) = self.interface_mut(owner) {
            iface.driver.on_data_in(address, &mut EndpointIo::new(hw, table));
        }
    }

    pub fn data_out(
        &mut self,
        owner: u8,
        address: u8,
        data: &[u8],
        table: &mut EndpointTable,
        hw: &mut H,
    ) {
        if let Some(iface) = self.interface_mut(owner) {
            iface.driver.on_data_out(address, data, &mut EndpointIo::new(hw, table));
        }
    }

    pub fn start_of_frame(&mut self) {
        if let Some(iface) = self.current_mut() {
            iface.driver.on_start_of_frame();
        }
    }

    pub fn device_feature(&mut self, feature: Feature, enabled: bool) {
        if let Some(iface) = self.current_mut() {
            iface.driver.on_device_feature(feature, enabled);
        }
    }

    pub fn iso_in_incomplete(&mut self, owner: u8, address: u8) {
        if let Some(iface) = self.interface_mut(owner) {
            iface.driver.on_iso_in_incomplete(address);
        }
    }

    pub fn iso_out_incomplete(&mut self, owner: u8, address: u8) {
        if let Some(iface) = self.interface_mut(owner) {
            iface.driver.on_iso_out_incomplete(address);
        }
    }
}
